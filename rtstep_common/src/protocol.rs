//! Dongle wire protocol constants (spec §6).
//!
//! USB vendor-class control transfer requests, the bulk-out DB25 pin
//! mapping, and the state-bits word the dongle reports on every
//! supervisory query.

use bitflags::bitflags;

/// Dongle firmware generation. Gates which vendor requests and
/// supervisory fields are available — §4.6/§4.7 make ADC query support and
/// spindle-sync enablement conditional on "board revision > 'd'"/newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum BoardRev {
    /// PIC18F2455, original release.
    A,
    /// PIC18F2455, Microsoft OS descriptors.
    B,
    /// PIC18F2455, OUTPUT0-1 + USB suspend.
    C,
    /// PIC16F1459, INPUT0 frequency counter.
    D,
    /// PIC16F1459/PIC18F2455, index pulse threading.
    E,
    /// ATmega32U4, adds OUTPUT2, PWM outputs, ADC inputs.
    F,
}

impl BoardRev {
    /// True when this board supports [`StepCmd::AdcQuery`] in place of
    /// the plain [`StepCmd::Query`] (spec §4.6: "the newer returns
    /// {state_bits, icount_period, ADC1..3}").
    pub fn supports_adc(&self) -> bool {
        *self >= BoardRev::F
    }

    /// Step-clock frequency [Hz] for this board's firmware family.
    pub fn step_clock_hz(&self) -> f64 {
        if *self >= BoardRev::F {
            crate::consts::STEP_CLOCK_HZ_AVR
        } else {
            crate::consts::STEP_CLOCK_HZ_PIC
        }
    }
}

/// EP0 vendor setup command (`bRequest`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StepCmd {
    /// Clear state bits and step counter.
    Set = 0,
    /// Read `{state_bits:16, icount_period:16, step_count:32}`.
    Query = 1,
    /// Set un-synchronized (immediate) stop.
    AbortSet = 2,
    /// Clear un-synchronized stop.
    AbortClear = 3,
    /// Set digital OUTPUT0.
    Output0Set = 4,
    /// Clear digital OUTPUT0.
    Output0Clear = 5,
    /// Set digital OUTPUT1.
    Output1Set = 6,
    /// Clear digital OUTPUT1.
    Output1Clear = 7,
    /// Set synchronized start.
    SyncStartSet = 8,
    /// Set digital OUTPUT2 (board rev >= F).
    Output2Set = 9,
    /// Clear digital OUTPUT2 (board rev >= F).
    Output2Clear = 10,
    /// OUTPUT0 mode: digital (0) or PWM (1).
    Output0Mode = 11,
    /// OUTPUT0 PWM duty cycle, 0-255.
    Output0Pwm = 12,
    /// OUTPUT1 mode: digital (0) or PWM (1).
    Output1Mode = 13,
    /// OUTPUT1 PWM duty cycle, 0-255.
    Output1Pwm = 14,
    /// INPUT1 mode: digital (0) or ADC (1).
    Input1Mode = 15,
    /// INPUT2 mode: digital (0) or ADC (1).
    Input2Mode = 16,
    /// INPUT3 mode: digital (0) or ADC (1).
    Input3Mode = 17,
    /// Read `{state_bits:16, icount_period:16, adc1:8, adc2:8, adc3:8, reserved:8}`.
    AdcQuery = 18,
}

bitflags! {
    /// The dongle's reported state bits (active-high), combined with the
    /// user-level machine-state bits the session layers on top (ESTOP,
    /// PAUSED, HOMED, CANCEL — see `rtstep_engine::session`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateBits: u32 {
        /// Dongle step buffer aborted.
        const ABORT       = 0x01;
        /// Dongle step buffer empty.
        const EMPTY       = 0x02;
        /// Synchronized start armed/active.
        const SYNC_START  = 0x04;
        /// INPUT0 active-high level.
        const INPUT0      = 0x08;
        /// INPUT1 active-high level (invalid if INPUT1 configured as ADC).
        const INPUT1      = 0x10;
        /// INPUT2 active-high level (invalid if INPUT2 configured as ADC).
        const INPUT2      = 0x20;
        /// INPUT3 active-high level (invalid if INPUT3 configured as ADC).
        const INPUT3      = 0x40;
    }
}

impl StateBits {
    /// The INPUTn state bit for input number `n` (0..=3).
    pub fn input_bit(n: u8) -> Option<StateBits> {
        match n {
            0 => Some(StateBits::INPUT0),
            1 => Some(StateBits::INPUT1),
            2 => Some(StateBits::INPUT2),
            3 => Some(StateBits::INPUT3),
            _ => None,
        }
    }
}

/// DB25 pin numbers 1..=9 map to bulk-stream bit positions in this order;
/// index 0 is unused (pins are 1-based).
pub const PIN_MAP: [u8; 10] = [0, 0, 1, 2, 4, 8, 16, 32, 64, 128];

/// Bulk-out endpoint address (host → device).
pub const BULK_OUT_ENDPOINT: u8 = 0x01;

/// Maximum ICOUNT period value reported by the dongle (16-bit saturating).
pub const ICOUNT_MAX: u16 = 0xffff;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_rev_ordering_gates_adc() {
        assert!(!BoardRev::E.supports_adc());
        assert!(BoardRev::F.supports_adc());
    }

    #[test]
    fn board_rev_step_clock_switches_at_f() {
        assert_eq!(BoardRev::E.step_clock_hz(), crate::consts::STEP_CLOCK_HZ_PIC);
        assert_eq!(BoardRev::F.step_clock_hz(), crate::consts::STEP_CLOCK_HZ_AVR);
    }

    #[test]
    fn pin_map_matches_db25_bit_weights() {
        assert_eq!(PIN_MAP[2], 1);
        assert_eq!(PIN_MAP[9], 128);
    }

    #[test]
    fn input_bit_roundtrips() {
        assert_eq!(StateBits::input_bit(0), Some(StateBits::INPUT0));
        assert_eq!(StateBits::input_bit(4), None);
    }
}
