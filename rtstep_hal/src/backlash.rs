//! Per-axis backlash-compensation ramp generator (spec §4.4).
//!
//! Produces a corrective offset `backlash_filt` that lags the commanded
//! axis position by half the backlash magnitude, in whichever direction the
//! axis last moved. The offset itself is driven there by a bounded,
//! trapezoidal (S-curve) velocity ramp rather than snapping, so the
//! correction never introduces its own step discontinuity.

/// Below this magnitude a remaining distance or velocity is treated as
/// zero — avoids `signum()` flapping on floating-point noise at rest.
const EPS: f64 = 1e-9;

/// One axis's backlash ramp state: target correction, filtered output, and
/// the ramp's own velocity.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacklashFilter {
    half_backlash: f64,
    v_max: f64,
    a_max: f64,

    backlash_corr: f64,
    backlash_filt: f64,
    backlash_vel: f64,
}

impl BacklashFilter {
    /// Build a filter for an axis with the given `backlash` magnitude
    /// (user units) and kinematic limits, headroom-scaled per spec §4.4
    /// step 2 (`1.05 * max_velocity`, `1.05 * max_acceleration` by
    /// default — `headroom` is the multiplier, normally
    /// [`rtstep_common::consts::BACKLASH_HEADROOM`]).
    pub fn new(backlash: f64, max_velocity: f64, max_acceleration: f64, headroom: f64) -> Self {
        Self {
            half_backlash: 0.5 * backlash,
            v_max: headroom * max_velocity,
            a_max: headroom * max_acceleration,
            backlash_corr: 0.0,
            backlash_filt: 0.0,
            backlash_vel: 0.0,
        }
    }

    /// Current corrective offset to add to the axis's commanded position.
    pub fn offset(&self) -> f64 {
        self.backlash_filt
    }

    /// Reset all ramp state to zero (estop-recovery or home, spec §4.4 step 5).
    pub fn reset(&mut self) {
        self.backlash_corr = 0.0;
        self.backlash_filt = 0.0;
        self.backlash_vel = 0.0;
    }

    /// Advance the ramp by one cycle given the axis's *commanded* velocity
    /// sign (spec §4.4 step 1) and the cycle time, returning the updated
    /// `backlash_filt`.
    pub fn update(&mut self, axis_vel: f64, dt: f64) -> f64 {
        if axis_vel > EPS {
            self.backlash_corr = self.half_backlash;
        } else if axis_vel < -EPS {
            self.backlash_corr = -self.half_backlash;
        }
        // else: direction didn't resolve this cycle, target unchanged.

        let to_go = self.backlash_corr - self.backlash_filt;
        if to_go.abs() <= EPS {
            self.backlash_vel = 0.0;
            self.backlash_filt = self.backlash_corr;
            return self.backlash_filt;
        }

        let dir = to_go.signum();
        // Speed component aligned with the direction of travel still
        // needed to reach the target; negative means the ramp is
        // currently moving *away* from a target that just reversed.
        let v = self.backlash_vel * dir;
        let dv_acc = self.a_max * dt;

        let new_v = if v < 0.0 {
            // Direction just reversed mid-ramp: keep applying acceleration
            // toward the (new) target until the wrong-way motion is killed.
            v + dv_acc
        } else {
            let s_to_go = to_go.abs();
            let ds_vel = v * dt;
            let ds_stop = 0.5 * (v + dv_acc) * (v + dv_acc) / self.a_max;
            let ds_acc = 0.5 * dv_acc * dt;

            if s_to_go <= ds_stop + ds_vel {
                if v <= dv_acc {
                    self.backlash_vel = 0.0;
                    self.backlash_filt = self.backlash_corr;
                    return self.backlash_filt;
                }
                v - dv_acc
            } else if s_to_go > ds_stop + ds_vel + ds_acc {
                (v + dv_acc).min(self.v_max)
            } else {
                v
            }
        };

        self.backlash_filt += dir * 0.5 * (v + new_v) * dt;
        self.backlash_vel = dir * new_v;

        // Defensive overshoot clamp (spec §4.4 step 4): the trapezoidal
        // step above should never cross the target, but floating-point
        // rounding at very small `to_go` could tip it over.
        let new_to_go = self.backlash_corr - self.backlash_filt;
        if new_to_go.signum() != dir && new_to_go.abs() > EPS {
            self.backlash_filt = self.backlash_corr;
            self.backlash_vel = 0.0;
        }

        self.backlash_filt
    }
}
