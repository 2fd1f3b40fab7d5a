//! In-memory `Dongle` backend: an axis-position integrator reacting to the
//! emitted step/dir bytes, with no hardware present. Used to exercise the
//! full pipeline — including spec §8's S1-S6 end-to-end scenarios —
//! without a dongle attached, the way the teacher ships a
//! `SimulationDriver` alongside its real HAL drivers.

use super::{BulkCallback, BulkOutcome, Dongle, DongleError, DongleQuery};
use rtstep_common::protocol::{BoardRev, StateBits};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One axis channel's step/direction bit assignment, for the simulator's
/// own bookkeeping only (a real dongle has no notion of "axes", just 8
/// data bits — this is purely a test convenience).
#[derive(Debug, Clone, Copy)]
pub struct SimAxisBits {
    pub step_bit: u8,
    pub dir_bit: u8,
    pub step_active_high: bool,
    pub dir_active_high: bool,
}

struct Channel {
    bits: SimAxisBits,
    position: i64,
    prev_active: bool,
}

struct SimState {
    state_bits: StateBits,
    icount_period: u16,
    step_count: u32,
    channels: Vec<Channel>,
}

/// Simulated dongle. `submit_bulk` integrates the byte stream against
/// each configured axis channel synchronously before invoking the
/// completion callback — callers must not hold a lock the callback itself
/// needs to acquire.
pub struct SimDongle {
    board_rev: BoardRev,
    state: Mutex<SimState>,
    in_flight: AtomicBool,
    cancel_requested: AtomicBool,
}

impl SimDongle {
    pub fn new(board_rev: BoardRev, axes: impl IntoIterator<Item = SimAxisBits>) -> Self {
        Self {
            board_rev,
            state: Mutex::new(SimState {
                state_bits: StateBits::EMPTY,
                icount_period: 0,
                step_count: 0,
                channels: axes
                    .into_iter()
                    .map(|bits| Channel {
                        bits,
                        position: 0,
                        prev_active: false,
                    })
                    .collect(),
            }),
            in_flight: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        }
    }

    /// Current integrated step position for channel `i`.
    pub fn position(&self, i: usize) -> i64 {
        self.state.lock().unwrap().channels[i].position
    }

    /// Force the next [`Dongle::query`] to report this icount period
    /// (spindle-sync test hook).
    pub fn set_icount_period(&self, period: u16) {
        self.state.lock().unwrap().icount_period = period;
    }

    /// Simulate an INPUT transition by setting or clearing a state bit
    /// directly (test hook for estop-on-input-transition scenarios).
    pub fn set_state_bit(&self, bit: StateBits, set: bool) {
        let mut s = self.state.lock().unwrap();
        if set {
            s.state_bits |= bit;
        } else {
            s.state_bits.remove(bit);
        }
    }
}

impl Dongle for SimDongle {
    fn board_rev(&self) -> BoardRev {
        self.board_rev
    }

    fn set(&self) -> Result<(), DongleError> {
        let mut s = self.state.lock().unwrap();
        s.state_bits = StateBits::EMPTY;
        s.step_count = 0;
        Ok(())
    }

    fn query(&self) -> Result<DongleQuery, DongleError> {
        let s = self.state.lock().unwrap();
        Ok(DongleQuery {
            state_bits: s.state_bits,
            icount_period: s.icount_period,
            step_count: if self.board_rev.supports_adc() {
                None
            } else {
                Some(s.step_count)
            },
            adc: if self.board_rev.supports_adc() {
                Some([0, 0, 0])
            } else {
                None
            },
        })
    }

    fn abort_set(&self) -> Result<(), DongleError> {
        self.state.lock().unwrap().state_bits |= StateBits::ABORT;
        Ok(())
    }

    fn abort_clear(&self) -> Result<(), DongleError> {
        self.state.lock().unwrap().state_bits.remove(StateBits::ABORT);
        Ok(())
    }

    fn output_set(&self, n: u8) -> Result<(), DongleError> {
        if n > 2 {
            return Err(DongleError::InvalidOutputNum(n));
        }
        Ok(())
    }

    fn output_clear(&self, n: u8) -> Result<(), DongleError> {
        if n > 2 {
            return Err(DongleError::InvalidOutputNum(n));
        }
        Ok(())
    }

    fn output_mode(&self, n: u8, _pwm: bool) -> Result<(), DongleError> {
        if n > 1 {
            return Err(DongleError::InvalidOutputNum(n));
        }
        Ok(())
    }

    fn output_pwm(&self, n: u8, _duty: u8) -> Result<(), DongleError> {
        if n > 1 {
            return Err(DongleError::InvalidOutputNum(n));
        }
        Ok(())
    }

    fn input_mode(&self, n: u8, _adc: bool) -> Result<(), DongleError> {
        if n > 3 {
            return Err(DongleError::InvalidInputNum(n));
        }
        Ok(())
    }

    fn sync_start_set(&self) -> Result<(), DongleError> {
        self.state.lock().unwrap().state_bits |= StateBits::SYNC_START;
        Ok(())
    }

    fn submit_bulk(
        &self,
        bytes: Vec<u8>,
        _timeout: Duration,
        on_complete: BulkCallback,
    ) -> Result<(), DongleError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(DongleError::TransferInFlight);
        }
        self.cancel_requested.store(false, Ordering::Release);

        let outcome = if self.cancel_requested.load(Ordering::Acquire) {
            BulkOutcome::Cancelled
        } else {
            let mut s = self.state.lock().unwrap();
            for &b in &bytes {
                for ch in &mut s.channels {
                    let active = (b & ch.bits.step_bit != 0) == ch.bits.step_active_high;
                    if active && !ch.prev_active {
                        let dir_active = (b & ch.bits.dir_bit != 0) == ch.bits.dir_active_high;
                        ch.position += if dir_active { 1 } else { -1 };
                    }
                    ch.prev_active = active;
                }
            }
            s.step_count = s.step_count.wrapping_add(bytes.len() as u32 / 2);
            s.state_bits |= StateBits::EMPTY;
            BulkOutcome::Completed
        };

        self.in_flight.store(false, Ordering::Release);
        on_complete(outcome);
        Ok(())
    }

    fn cancel_active(&self) -> Result<(), DongleError> {
        if !self.in_flight.load(Ordering::Acquire) {
            return Err(DongleError::NoTransferInFlight);
        }
        self.cancel_requested.store(true, Ordering::Release);
        Ok(())
    }

    fn has_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x_axis_bits() -> SimAxisBits {
        SimAxisBits {
            step_bit: rtstep_common::protocol::PIN_MAP[2],
            dir_bit: rtstep_common::protocol::PIN_MAP[3],
            step_active_high: true,
            dir_active_high: true,
        }
    }

    #[test]
    fn integrates_one_step_pulse_into_one_position_increment() {
        let dongle = SimDongle::new(BoardRev::A, [x_axis_bits()]);
        let step_bit = x_axis_bits().step_bit;
        let dir_bit = x_axis_bits().dir_bit;
        // idle, idle, pulse-high+dir, idle.
        let bytes = vec![0, 0, step_bit | dir_bit, dir_bit, 0, 0];
        let mut completed = None;
        dongle
            .submit_bulk(bytes, Duration::from_secs(1), Box::new(|o| completed = Some(o)))
            .unwrap();
        assert_eq!(completed, Some(BulkOutcome::Completed));
        assert_eq!(dongle.position(0), 1);
    }

    #[test]
    fn negative_direction_decrements_position() {
        let dongle = SimDongle::new(BoardRev::A, [x_axis_bits()]);
        let step_bit = x_axis_bits().step_bit;
        let bytes = vec![0, 0, step_bit, 0];
        let mut completed = None;
        dongle
            .submit_bulk(bytes, Duration::from_secs(1), Box::new(|o| completed = Some(o)))
            .unwrap();
        assert_eq!(completed, Some(BulkOutcome::Completed));
        assert_eq!(dongle.position(0), -1);
    }

    #[test]
    fn second_transfer_rejected_while_first_in_flight() {
        let dongle = SimDongle::new(BoardRev::A, [x_axis_bits()]);
        dongle.in_flight.store(true, Ordering::Release);
        let err = dongle
            .submit_bulk(vec![0, 0], Duration::from_secs(1), Box::new(|_| {}))
            .unwrap_err();
        assert!(matches!(err, DongleError::TransferInFlight));
    }

    #[test]
    fn abort_set_sets_state_bit() {
        let dongle = SimDongle::new(BoardRev::A, [x_axis_bits()]);
        dongle.abort_set().unwrap();
        assert!(dongle.query().unwrap().state_bits.contains(StateBits::ABORT));
    }

    #[test]
    fn board_rev_f_query_reports_adc_not_step_count() {
        let dongle = SimDongle::new(BoardRev::F, [x_axis_bits()]);
        let q = dongle.query().unwrap();
        assert!(q.adc.is_some());
        assert!(q.step_count.is_none());
    }
}
