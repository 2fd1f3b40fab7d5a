//! Per-axis runtime state (spec §3 "Axis state"): config-derived pin
//! mapping plus the backlash ramp filter and the commanded
//! position/velocity the dispatcher drives each cycle.

use rtstep_common::config::AxisConfig;
use rtstep_hal::backlash::BacklashFilter;
use rtstep_hal::encoder::AxisPinMap;

/// One configured axis: its static config, its own [`BacklashFilter`], and
/// the commanded position/velocity for the current cycle.
#[derive(Debug, Clone)]
pub struct AxisRuntime {
    pub config: AxisConfig,
    pub backlash: BacklashFilter,
    pub pos_cmd: f64,
    pub vel_cmd: f64,
}

impl AxisRuntime {
    pub fn new(config: AxisConfig) -> Self {
        let backlash = BacklashFilter::new(
            config.backlash,
            config.max_velocity,
            config.max_acceleration,
            config.backlash_headroom,
        );
        Self {
            config,
            backlash,
            pos_cmd: 0.0,
            vel_cmd: 0.0,
        }
    }

    /// The pin/polarity/limit bundle [`rtstep_hal::encoder::Encoder`] needs
    /// for this axis.
    pub fn pin_map(&self) -> AxisPinMap {
        AxisPinMap {
            step_pin: self.config.step_pin,
            dir_pin: self.config.dir_pin,
            step_active_high: self.config.step_active_high,
            dir_active_high: self.config.direction_active_high,
            steps_per_unit: self.config.steps_per_unit,
            min_pos_limit: self.config.min_pos_limit,
            max_pos_limit: self.config.max_pos_limit,
        }
    }

    /// Advance this axis's backlash ramp by one cycle given the planner's
    /// freshly commanded coordinate value, returning `pos_cmd +
    /// backlash_filt` (spec §4.5 step 2's `cmd_pos`, pre soft-limit clip —
    /// the encoder itself performs the clip).
    pub fn advance(&mut self, commanded: f64, dt: f64) -> f64 {
        self.vel_cmd = (commanded - self.pos_cmd) / dt;
        self.pos_cmd = commanded;
        let offset = self.backlash.update(self.vel_cmd, dt);
        self.pos_cmd + offset
    }

    /// Zero the backlash ramp and commanded state (estop-recovery or home,
    /// spec §4.4 step 5).
    pub fn reset(&mut self) {
        self.backlash.reset();
        self.pos_cmd = 0.0;
        self.vel_cmd = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtstep_common::config::Coordinate;

    fn axis() -> AxisConfig {
        AxisConfig {
            name: "X".into(),
            coordinate: Coordinate::X,
            max_velocity: 1.0,
            max_acceleration: 10.0,
            steps_per_unit: 2000.0,
            backlash: 0.01,
            backlash_headroom: 1.05,
            min_pos_limit: -10.0,
            max_pos_limit: 10.0,
            step_pin: 2,
            dir_pin: 3,
            step_active_high: true,
            direction_active_high: true,
            abort_input: None,
        }
    }

    #[test]
    fn advance_tracks_commanded_position_and_adds_backlash() {
        let mut a = AxisRuntime::new(axis());
        let dt = 1.0 / 1000.0;
        let mut last = 0.0;
        for i in 1..=1000 {
            let commanded = i as f64 * dt; // ramps to 1.0 over 1000 cycles
            last = a.advance(commanded, dt);
        }
        assert!((a.pos_cmd - 1.0).abs() < 1e-9);
        assert!((last - a.pos_cmd).abs() <= 0.005 + 1e-6);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut a = AxisRuntime::new(axis());
        a.advance(0.5, 1.0 / 1000.0);
        a.reset();
        assert_eq!(a.pos_cmd, 0.0);
        assert_eq!(a.vel_cmd, 0.0);
        assert_eq!(a.backlash.offset(), 0.0);
    }
}
