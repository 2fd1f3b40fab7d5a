//! System-wide numeric constants for the rt-stepper workspace.
//!
//! Single source of truth for epsilons, timing, and queue sizing. Imported
//! by all crates — no duplication permitted.

/// Below this velocity (and `vScale` below [`TC_SCALE_EPSILON`]), a TC is
/// considered PAUSED rather than CONST.
pub const TC_VEL_EPSILON: f64 = 1e-4;

/// Below this `vScale`, a TC is considered PAUSED.
pub const TC_SCALE_EPSILON: f64 = 1e-4;

/// Rotational companion (abc) is only interpolated when its magnitude
/// exceeds this threshold; below it the companion line is degenerate.
pub const ABC_MAG_EPSILON: f64 = 1e-6;

/// Safety margin subtracted from TC queue capacity to compute the "full"
/// threshold — tolerates a race between the sequencer appending and the
/// scheduler observing `full()`.
pub const TC_QUEUE_MARGIN: usize = 10;

/// Default TC queue capacity.
pub const TC_QUEUE_DEFAULT_SIZE: usize = 64;

/// High-watermark: once the producer has enqueued more than this many I/O
/// requests, it blocks until the in-flight count falls to [`REQ_MIN`].
pub const REQ_MAX: usize = 100;

/// Low-watermark that releases the hysteresis back-pressure wait.
pub const REQ_MIN: usize = 50;

/// I/O request step/dir buffer growth increment, in bytes.
pub const IO_BUF_GROWTH_BYTES: usize = 16 * 1024;

/// Re-arm period for all timed condition waits (back-pressure, I/O drain,
/// dongle-EMPTY, dongle-SYNC_START).
pub const WAIT_REARM: std::time::Duration = std::time::Duration::from_secs(2);

/// Supervisor thread polling interval.
pub const SUPERVISOR_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);

/// Native async-USB event pump timeout.
pub const EVENT_PUMP_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(100);

/// Step-clock frequency on PIC firmware (board revisions 1x/2x).
pub const STEP_CLOCK_HZ_PIC: f64 = 46_875.0;

/// Step-clock frequency on AVR firmware (board revision 3x and later).
pub const STEP_CLOCK_HZ_AVR: f64 = 62_500.0;

/// Per-byte bulk transfer timeout coefficient [seconds/byte], derived from
/// the older MCU's step-clock period (1 / 46_875 Hz).
pub const TRANSFER_TIMEOUT_PER_BYTE_S: f64 = 1.0 / STEP_CLOCK_HZ_PIC;

/// Fixed component of the bulk transfer timeout.
pub const TRANSFER_TIMEOUT_FIXED: std::time::Duration = std::time::Duration::from_secs(5);

/// Number of consecutive "|step| > 1" log messages the encoder emits before
/// going silent for the rest of the run.
pub const ENCODER_OVERFLOW_LOG_LIMIT: u32 = 5;

/// Headroom multiplier applied to axis `max_velocity`/`max_acceleration`
/// when the backlash ramp generator computes its own velocity/acceleration
/// caps (so the filter can still catch up after a commanded motion that
/// itself consumed the full budget).
pub const BACKLASH_HEADROOM: f64 = 1.05;

/// Number of samples in the icount moving average (spindle frequency
/// estimate).
pub const ICOUNT_AVG_SAMPLES: usize = 4;

/// USB vendor ID of the st4 dongle family.
pub const USB_VENDOR_ID: u16 = 0x04d8;

/// USB product ID of the st4 dongle family.
pub const USB_PRODUCT_ID: u16 = 0xff45;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn req_watermarks_ordered() {
        assert!(REQ_MIN < REQ_MAX);
    }

    #[test]
    fn step_clocks_distinct() {
        assert!(STEP_CLOCK_HZ_AVR > STEP_CLOCK_HZ_PIC);
    }

    #[test]
    fn epsilons_are_tiny_and_positive() {
        assert!(TC_VEL_EPSILON > 0.0 && TC_VEL_EPSILON < 1e-2);
        assert!(TC_SCALE_EPSILON > 0.0 && TC_SCALE_EPSILON < 1e-2);
    }
}
