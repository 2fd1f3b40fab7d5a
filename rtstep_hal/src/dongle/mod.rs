//! The `Dongle` trait: the boundary between `rtstep_engine`'s session and a
//! concrete USB-attached (or simulated) stepper-motor dongle (spec §4.6,
//! §6).
//!
//! A `Dongle` owns exactly one in-flight bulk transfer at a time and
//! reports completion through a caller-supplied callback, mirroring the
//! native async-USB event-pump model spec §4.6 assumes: the engine never
//! blocks on a transfer, it submits and is notified later.

pub mod sim;
#[cfg(feature = "rt")]
pub mod usb;

use rtstep_common::protocol::{BoardRev, StateBits};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DongleError {
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("control request error: {0}")]
    ControlRequest(String),
    #[error("a bulk transfer is already in flight")]
    TransferInFlight,
    #[error("no transfer is in flight to cancel")]
    NoTransferInFlight,
    #[error("invalid output number: {0}")]
    InvalidOutputNum(u8),
    #[error("invalid input number: {0}")]
    InvalidInputNum(u8),
}

/// Result of a completed (or aborted) bulk transfer, reported once to the
/// callback passed to [`Dongle::submit_bulk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    /// All bytes were clocked out to the dongle.
    Completed,
    /// Cancelled by [`Dongle::cancel_active`] — does not, by itself, raise
    /// estop (spec §8 boundary behavior).
    Cancelled,
    TimedOut,
    Stall,
    Overflow,
    Disconnected,
    Error(String),
}

/// One supervisory state query result (spec §4.6/§6): either the
/// `STEP_QUERY` or `STEP_ADC_QUERY` vendor request, depending on board
/// revision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DongleQuery {
    pub state_bits: StateBits,
    pub icount_period: u16,
    /// `STEP_QUERY`-only field (step count since `SET`).
    pub step_count: Option<u32>,
    /// `STEP_ADC_QUERY`-only field (board rev >= F).
    pub adc: Option<[u8; 3]>,
}

/// Completion callback signature for a submitted bulk transfer.
pub type BulkCallback = Box<dyn FnOnce(BulkOutcome) + Send>;

/// The wire-level operations `rtstep_engine`'s session drives. Control
/// requests are synchronous (they complete in well under a cycle); the
/// bulk transfer is asynchronous via callback, per spec §4.6.
pub trait Dongle: Send + Sync {
    fn board_rev(&self) -> BoardRev;

    /// `STEP_SET` — clear state bits and step counter.
    fn set(&self) -> Result<(), DongleError>;

    /// `STEP_QUERY` or `STEP_ADC_QUERY`, chosen by board revision.
    fn query(&self) -> Result<DongleQuery, DongleError>;

    fn abort_set(&self) -> Result<(), DongleError>;
    fn abort_clear(&self) -> Result<(), DongleError>;

    fn output_set(&self, n: u8) -> Result<(), DongleError>;
    fn output_clear(&self, n: u8) -> Result<(), DongleError>;
    fn output_mode(&self, n: u8, pwm: bool) -> Result<(), DongleError>;
    fn output_pwm(&self, n: u8, duty: u8) -> Result<(), DongleError>;
    fn input_mode(&self, n: u8, adc: bool) -> Result<(), DongleError>;

    fn sync_start_set(&self) -> Result<(), DongleError>;

    /// Submit the step/dir byte stream for the next bulk-out transfer.
    /// Returns immediately; `on_complete` fires exactly once, later, from
    /// whatever thread drives this backend's event pump.
    fn submit_bulk(
        &self,
        bytes: Vec<u8>,
        timeout: Duration,
        on_complete: BulkCallback,
    ) -> Result<(), DongleError>;

    /// Cancel the active bulk transfer, if any. The cancellation itself
    /// surfaces as a [`BulkOutcome::Cancelled`] completion.
    fn cancel_active(&self) -> Result<(), DongleError>;

    /// True while a bulk transfer is in flight (0 or 1 per spec §4.6).
    fn has_in_flight(&self) -> bool;
}

/// Per-byte bulk-transfer timeout plus the fixed component, per spec §4.6:
/// "Transfer timeout = bytes * 21.333us + 5s".
pub fn transfer_timeout(byte_count: usize) -> Duration {
    let per_byte = Duration::from_secs_f64(
        byte_count as f64 * rtstep_common::consts::TRANSFER_TIMEOUT_PER_BYTE_S,
    );
    per_byte + rtstep_common::consts::TRANSFER_TIMEOUT_FIXED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_grows_with_byte_count_and_has_fixed_floor() {
        let t0 = transfer_timeout(0);
        assert_eq!(t0, rtstep_common::consts::TRANSFER_TIMEOUT_FIXED);
        let t1000 = transfer_timeout(1000);
        assert!(t1000 > t0);
    }
}
