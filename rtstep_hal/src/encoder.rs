//! Bit-plane step/direction encoder (spec §4.5).
//!
//! Maps each axis's commanded position (already backlash-corrected and
//! soft-limit clipped by the caller... actually clipped here, see
//! [`Encoder::sample_cycle`]) to a step-count delta against the axis's
//! running [master index](rtstep_common::glossary), and packs at most one
//! step pulse plus a direction level into a two-byte-per-cycle sample.
//! Pulses that would otherwise last a single sample are stretched to ~50%
//! duty cycle by retro-writing already-emitted bytes in the current
//! request buffer — safe because that buffer is producer-exclusive until
//! the I/O request is enqueued (spec §9 design note).

use rtstep_common::consts::{ENCODER_OVERFLOW_LOG_LIMIT, IO_BUF_GROWTH_BYTES};
use rtstep_common::protocol::PIN_MAP;

fn pin_bit(pin: u8) -> u8 {
    if pin == 0 {
        0
    } else {
        PIN_MAP[pin as usize]
    }
}

/// Pin assignment and polarity for one axis's step/direction pair.
#[derive(Debug, Clone, Copy)]
pub struct AxisPinMap {
    /// DB25 pin number (1..=9), 0 = axis has no direct pin (ganged follower).
    pub step_pin: u8,
    pub dir_pin: u8,
    pub step_active_high: bool,
    pub dir_active_high: bool,
    pub steps_per_unit: f64,
    pub min_pos_limit: f64,
    pub max_pos_limit: f64,
}

/// Per-axis running encoder state.
#[derive(Debug, Clone)]
struct AxisState {
    pin: AxisPinMap,
    /// Running integer step count since origin.
    master_index: i64,
    /// Byte offset of the first byte of the currently-unterminated pulse
    /// within the *current request buffer*, if one is pending.
    clk_tail: Option<usize>,
    /// Last direction commanded: -1, 0 (never moved), or +1.
    direction: i8,
    /// `|step| > 1` log messages emitted so far this run (bounded to
    /// [`ENCODER_OVERFLOW_LOG_LIMIT`]).
    overflow_logged: u32,
}

impl AxisState {
    fn new(pin: AxisPinMap) -> Self {
        Self {
            pin,
            master_index: 0,
            clk_tail: None,
            direction: 0,
            overflow_logged: 0,
        }
    }

    fn step_bit(&self) -> u8 {
        pin_bit(self.pin.step_pin)
    }

    fn dir_bit(&self) -> u8 {
        pin_bit(self.pin.dir_pin)
    }

    fn has_pins(&self) -> bool {
        self.pin.step_pin != 0
    }
}

/// Multi-axis bit-plane encoder. One instance is built per configured
/// machine (all axes); `sample_cycle` is called once per TP cycle while
/// filling an I/O request's byte buffer.
#[derive(Debug, Clone)]
pub struct Encoder {
    axes: Vec<AxisState>,
}

impl Encoder {
    pub fn new(pins: impl IntoIterator<Item = AxisPinMap>) -> Self {
        Self {
            axes: pins.into_iter().map(AxisState::new).collect(),
        }
    }

    /// Running master index (steps since origin) for axis `i`, if present.
    pub fn master_index(&self, i: usize) -> Option<i64> {
        self.axes.get(i).map(|a| a.master_index)
    }

    /// Re-seat axis `i`'s running master index to `value` without emitting
    /// any step pulses (G92-style position realignment). Any pulse already
    /// pending on this axis is dropped rather than stretched, since its
    /// start reference no longer corresponds to the post-realignment
    /// count.
    pub fn set_master_index(&mut self, i: usize, value: i64) {
        if let Some(axis) = self.axes.get_mut(i) {
            axis.master_index = value;
            axis.clk_tail = None;
        }
    }

    /// Reset every axis's master index and pending-pulse state (estop
    /// recovery, re-home).
    pub fn reset(&mut self) {
        for axis in &mut self.axes {
            axis.master_index = 0;
            axis.clk_tail = None;
            axis.direction = 0;
            axis.overflow_logged = 0;
        }
    }

    /// Append one two-byte sample to `buf`, one bit-pair per axis, given
    /// each axis's commanded position (`pos_cmd + backlash_filt`, in user
    /// units, *before* soft-limit clipping — clipping happens here per
    /// spec §4.5 step 2).
    ///
    /// `cmd_positions` must have one entry per axis this encoder was
    /// built with, in the same order.
    pub fn sample_cycle(&mut self, buf: &mut Vec<u8>, cmd_positions: &[f64]) {
        if buf.capacity() - buf.len() < 2 {
            buf.reserve(IO_BUF_GROWTH_BYTES);
        }

        let total_before = buf.len();
        let mut byte0 = 0u8;
        let mut byte1 = 0u8;

        for (axis, &cmd_pos) in self.axes.iter_mut().zip(cmd_positions) {
            if !axis.has_pins() {
                continue;
            }

            let step_bit = axis.step_bit();
            let dir_bit = axis.dir_bit();

            // Idle step level on both new bytes (active-low polarity means
            // idle is "bit set").
            if !axis.pin.step_active_high {
                byte0 |= step_bit;
                byte1 |= step_bit;
            }

            let clipped = cmd_pos.clamp(axis.pin.min_pos_limit, axis.pin.max_pos_limit);
            let target_steps = (clipped * axis.pin.steps_per_unit).round() as i64;
            let mut step = target_steps - axis.master_index;

            if step.abs() > 1 {
                if axis.overflow_logged < ENCODER_OVERFLOW_LOG_LIMIT {
                    tracing::warn!(
                        step,
                        step_pin = axis.pin.step_pin,
                        "encoder: |step| > 1 in a single cycle, forcing step = 0"
                    );
                    axis.overflow_logged += 1;
                }
                step = 0;
            }

            if step != 0 {
                if let Some(tail) = axis.clk_tail {
                    stretch_pulse(buf, tail, total_before, step_bit, axis.pin.step_active_high);
                }
                axis.clk_tail = Some(total_before);
                axis.direction = if step > 0 { 1 } else { -1 };
                set_active(&mut byte0, step_bit, axis.pin.step_active_high);
            }

            set_dir_bit(&mut byte0, &mut byte1, dir_bit, axis.direction, axis.pin.dir_active_high);

            axis.master_index += step;
        }

        buf.push(byte0);
        buf.push(byte1);
    }

    /// Terminate every axis's trailing pulse at I/O-request-enqueue time
    /// (spec §4.5 "Final pulse termination"), stretching it to 50% duty
    /// cycle against the buffer's current length and clearing `clk_tail`.
    pub fn finalize_request(&mut self, buf: &mut [u8]) {
        let total = buf.len();
        for axis in &mut self.axes {
            if let Some(tail) = axis.clk_tail.take() {
                stretch_pulse(buf, tail, total, axis.step_bit(), axis.pin.step_active_high);
            }
        }
    }
}

fn set_active(byte: &mut u8, bit: u8, active_high: bool) {
    if active_high {
        *byte |= bit;
    } else {
        *byte &= !bit;
    }
}

fn set_idle(byte: &mut u8, bit: u8, active_high: bool) {
    if active_high {
        *byte &= !bit;
    } else {
        *byte |= bit;
    }
}

fn set_dir_bit(byte0: &mut u8, byte1: &mut u8, bit: u8, direction: i8, active_high: bool) {
    // Convention: direction > 0 asserts the bit (subject to polarity);
    // direction <= 0 (including "never moved yet") de-asserts it.
    if direction > 0 {
        set_active(byte0, bit, active_high);
        set_active(byte1, bit, active_high);
    } else {
        set_idle(byte0, bit, active_high);
        set_idle(byte1, bit, active_high);
    }
}

/// Rewrite the first half of the pulse starting at `tail` (up to `total`)
/// to the active step level, stretching a single-sample pulse toward 50%
/// duty cycle (spec §4.5).
fn stretch_pulse(buf: &mut [u8], tail: usize, total: usize, step_bit: u8, active_high: bool) {
    let elapsed = total.saturating_sub(tail);
    let mid = tail + elapsed / 2;
    for b in buf.iter_mut().take(mid).skip(tail) {
        set_active(b, step_bit, active_high);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_axis_pin(steps_per_unit: f64) -> AxisPinMap {
        AxisPinMap {
            step_pin: 2,
            dir_pin: 3,
            step_active_high: true,
            dir_active_high: true,
            steps_per_unit,
            min_pos_limit: -1000.0,
            max_pos_limit: 1000.0,
        }
    }

    #[test]
    fn one_step_per_unit_crossing_produces_one_pulse() {
        let mut enc = Encoder::new([single_axis_pin(1.0)]);
        let mut buf = Vec::new();
        enc.sample_cycle(&mut buf, &[0.0]);
        enc.sample_cycle(&mut buf, &[1.0]);
        assert_eq!(enc.master_index(0), Some(1));
        let step_bit = PIN_MAP[2];
        // The pulse was recorded but not yet stretched (no subsequent step).
        assert_ne!(buf[2] & step_bit, 0);
    }

    #[test]
    fn unassigned_axis_contributes_no_bits_and_no_index() {
        let mut pin = single_axis_pin(1.0);
        pin.step_pin = 0;
        pin.dir_pin = 0;
        let mut enc = Encoder::new([pin]);
        let mut buf = Vec::new();
        enc.sample_cycle(&mut buf, &[5.0]);
        assert_eq!(enc.master_index(0), Some(0));
        assert_eq!(buf, vec![0u8, 0u8]);
    }

    #[test]
    fn overflow_forces_zero_step_and_logs_bounded() {
        let mut enc = Encoder::new([single_axis_pin(1.0)]);
        let mut buf = Vec::new();
        enc.sample_cycle(&mut buf, &[0.0]);
        // A jump of 5 steps in one cycle must never be emitted.
        enc.sample_cycle(&mut buf, &[5.0]);
        assert_eq!(enc.master_index(0), Some(0));
    }

    #[test]
    fn n_translation_steps_yield_n_pulses_over_two_n_bytes() {
        let n = 50;
        let mut enc = Encoder::new([single_axis_pin(1.0)]);
        let mut buf = Vec::new();
        for i in 0..=n {
            enc.sample_cycle(&mut buf, &[i as f64]);
        }
        enc.finalize_request(&mut buf);
        assert_eq!(enc.master_index(0), Some(n));
        assert_eq!(buf.len(), 2 * (n as usize + 1));

        let step_bit = PIN_MAP[2];
        let pulses = (0..buf.len()).filter(|&i| buf[i] & step_bit != 0).count();
        assert!(pulses > 0);
    }

    #[test]
    fn finalize_clears_pending_tail() {
        let mut enc = Encoder::new([single_axis_pin(1.0)]);
        let mut buf = Vec::new();
        enc.sample_cycle(&mut buf, &[0.0]);
        enc.sample_cycle(&mut buf, &[1.0]);
        assert!(enc.axes[0].clk_tail.is_some());
        enc.finalize_request(&mut buf);
        assert!(enc.axes[0].clk_tail.is_none());
    }

    #[test]
    fn reset_zeroes_master_index_and_pending_pulse() {
        let mut enc = Encoder::new([single_axis_pin(1.0)]);
        let mut buf = Vec::new();
        enc.sample_cycle(&mut buf, &[0.0]);
        enc.sample_cycle(&mut buf, &[1.0]);
        enc.reset();
        assert_eq!(enc.master_index(0), Some(0));
        assert!(enc.axes[0].clk_tail.is_none());
    }

    #[test]
    fn buffer_grows_in_16kib_chunks_when_nearly_full() {
        let mut enc = Encoder::new([single_axis_pin(1.0)]);
        let mut buf = Vec::new();
        enc.sample_cycle(&mut buf, &[0.0]);
        assert!(buf.capacity() >= rtstep_common::consts::IO_BUF_GROWTH_BYTES);
    }
}
