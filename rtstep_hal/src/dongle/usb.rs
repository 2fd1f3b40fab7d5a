//! libusb-backed `Dongle` implementation, behind the `rt` feature.
//!
//! Grounded in the pack's own use of safe libusb bindings for host-side USB
//! access; control transfers use [`rusb::DeviceHandle::write_control`]/
//! [`read_control`], and the bulk transfer is driven from a dedicated
//! worker thread per submission so the caller never blocks — the same
//! "event thread runs the native async-USB pump" shape spec §4.6
//! describes, adapted to `rusb`'s synchronous transfer API (`rusb` 0.9
//! does not expose libusb's raw async submission safely, so one thread per
//! in-flight bulk transfer stands in for it; at most one is ever spawned,
//! matching the 0/1 in-flight invariant).

use super::{BulkCallback, BulkOutcome, Dongle, DongleError, DongleQuery};
use rtstep_common::protocol::{BoardRev, StateBits, StepCmd, BULK_OUT_ENDPOINT};
use rusb::{Direction, GlobalContext, Recipient, RequestType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CONTROL_TIMEOUT: Duration = Duration::from_secs(2);

/// The dongle exposes its vendor requests on interface 0; every control
/// transfer's `wIndex` names this interface, not the device.
const DONGLE_INTERFACE: u16 = 0;

fn vendor_out() -> u8 {
    rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Interface)
}

fn vendor_in() -> u8 {
    rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Interface)
}

/// Real USB-attached dongle, addressed through `rusb`'s synchronous
/// control/bulk transfer API.
pub struct UsbDongle {
    board_rev: BoardRev,
    handle: Arc<Mutex<rusb::DeviceHandle<GlobalContext>>>,
    in_flight: Arc<AtomicBool>,
    cancel_requested: Arc<AtomicBool>,
}

impl UsbDongle {
    pub fn new(handle: rusb::DeviceHandle<GlobalContext>, board_rev: BoardRev) -> Self {
        Self {
            board_rev,
            handle: Arc::new(Mutex::new(handle)),
            in_flight: Arc::new(AtomicBool::new(false)),
            cancel_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    fn control_out(&self, request: StepCmd, value: u16, index: u16) -> Result<(), DongleError> {
        let handle = self.handle.lock().unwrap();
        handle
            .write_control(vendor_out(), request as u8, value, index, &[], CONTROL_TIMEOUT)
            .map_err(|e| DongleError::ControlRequest(e.to_string()))?;
        Ok(())
    }
}

impl Dongle for UsbDongle {
    fn board_rev(&self) -> BoardRev {
        self.board_rev
    }

    fn set(&self) -> Result<(), DongleError> {
        self.control_out(StepCmd::Set, 0, DONGLE_INTERFACE)
    }

    fn query(&self) -> Result<DongleQuery, DongleError> {
        let handle = self.handle.lock().unwrap();
        if self.board_rev.supports_adc() {
            let mut buf = [0u8; 6];
            handle
                .read_control(vendor_in(), StepCmd::AdcQuery as u8, 0, DONGLE_INTERFACE, &mut buf, CONTROL_TIMEOUT)
                .map_err(|e| DongleError::ControlRequest(e.to_string()))?;
            Ok(DongleQuery {
                state_bits: StateBits::from_bits_truncate(u16::from_le_bytes([buf[0], buf[1]]) as u32),
                icount_period: u16::from_le_bytes([buf[2], buf[3]]),
                step_count: None,
                adc: Some([buf[4], buf[5], buf.get(6).copied().unwrap_or(0)]),
            })
        } else {
            let mut buf = [0u8; 8];
            handle
                .read_control(vendor_in(), StepCmd::Query as u8, 0, DONGLE_INTERFACE, &mut buf, CONTROL_TIMEOUT)
                .map_err(|e| DongleError::ControlRequest(e.to_string()))?;
            Ok(DongleQuery {
                state_bits: StateBits::from_bits_truncate(u16::from_le_bytes([buf[0], buf[1]]) as u32),
                icount_period: u16::from_le_bytes([buf[2], buf[3]]),
                step_count: Some(u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]])),
                adc: None,
            })
        }
    }

    fn abort_set(&self) -> Result<(), DongleError> {
        self.control_out(StepCmd::AbortSet, 0, DONGLE_INTERFACE)
    }

    fn abort_clear(&self) -> Result<(), DongleError> {
        self.control_out(StepCmd::AbortClear, 0, DONGLE_INTERFACE)
    }

    fn output_set(&self, n: u8) -> Result<(), DongleError> {
        match n {
            0 => self.control_out(StepCmd::Output0Set, 0, DONGLE_INTERFACE),
            1 => self.control_out(StepCmd::Output1Set, 0, DONGLE_INTERFACE),
            2 => self.control_out(StepCmd::Output2Set, 0, DONGLE_INTERFACE),
            _ => Err(DongleError::InvalidOutputNum(n)),
        }
    }

    fn output_clear(&self, n: u8) -> Result<(), DongleError> {
        match n {
            0 => self.control_out(StepCmd::Output0Clear, 0, DONGLE_INTERFACE),
            1 => self.control_out(StepCmd::Output1Clear, 0, DONGLE_INTERFACE),
            2 => self.control_out(StepCmd::Output2Clear, 0, DONGLE_INTERFACE),
            _ => Err(DongleError::InvalidOutputNum(n)),
        }
    }

    fn output_mode(&self, n: u8, pwm: bool) -> Result<(), DongleError> {
        let value = pwm as u16;
        match n {
            0 => self.control_out(StepCmd::Output0Mode, value, DONGLE_INTERFACE),
            1 => self.control_out(StepCmd::Output1Mode, value, DONGLE_INTERFACE),
            _ => Err(DongleError::InvalidOutputNum(n)),
        }
    }

    fn output_pwm(&self, n: u8, duty: u8) -> Result<(), DongleError> {
        match n {
            0 => self.control_out(StepCmd::Output0Pwm, duty as u16, DONGLE_INTERFACE),
            1 => self.control_out(StepCmd::Output1Pwm, duty as u16, DONGLE_INTERFACE),
            _ => Err(DongleError::InvalidOutputNum(n)),
        }
    }

    fn input_mode(&self, n: u8, adc: bool) -> Result<(), DongleError> {
        let value = adc as u16;
        match n {
            1 => self.control_out(StepCmd::Input1Mode, value, DONGLE_INTERFACE),
            2 => self.control_out(StepCmd::Input2Mode, value, DONGLE_INTERFACE),
            3 => self.control_out(StepCmd::Input3Mode, value, DONGLE_INTERFACE),
            _ => Err(DongleError::InvalidInputNum(n)),
        }
    }

    fn sync_start_set(&self) -> Result<(), DongleError> {
        self.control_out(StepCmd::SyncStartSet, 0, DONGLE_INTERFACE)
    }

    fn submit_bulk(
        &self,
        bytes: Vec<u8>,
        timeout: Duration,
        on_complete: BulkCallback,
    ) -> Result<(), DongleError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(DongleError::TransferInFlight);
        }
        self.cancel_requested.store(false, Ordering::Release);

        let handle = Arc::clone(&self.handle);
        let in_flight = Arc::clone(&self.in_flight);
        let cancel_requested = Arc::clone(&self.cancel_requested);

        std::thread::spawn(move || {
            let outcome = if cancel_requested.load(Ordering::Acquire) {
                BulkOutcome::Cancelled
            } else {
                let handle = handle.lock().unwrap();
                match handle.write_bulk(BULK_OUT_ENDPOINT, &bytes, timeout) {
                    Ok(n) if n == bytes.len() => BulkOutcome::Completed,
                    Ok(_) => BulkOutcome::Overflow,
                    Err(rusb::Error::Timeout) => BulkOutcome::TimedOut,
                    Err(rusb::Error::Pipe) => BulkOutcome::Stall,
                    Err(rusb::Error::NoDevice) => BulkOutcome::Disconnected,
                    Err(e) => BulkOutcome::Error(e.to_string()),
                }
            };
            in_flight.store(false, Ordering::Release);
            on_complete(outcome);
        });
        Ok(())
    }

    fn cancel_active(&self) -> Result<(), DongleError> {
        if !self.in_flight.load(Ordering::Acquire) {
            return Err(DongleError::NoTransferInFlight);
        }
        // `rusb`'s synchronous API offers no in-progress cancellation; the
        // in-flight `write_bulk` call is left to time out on its own
        // schedule, and the next submission is blocked until it does. A
        // libusb async-transfer backend would call `libusb_cancel_transfer`
        // here instead.
        self.cancel_requested.store(true, Ordering::Release);
        Ok(())
    }

    fn has_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}
