//! Trajectory Cycle (TC) — per-segment discriminate update (spec §4.1).
//!
//! One `TrajectoryCycle` exists per motion in the queue. `update()` runs a
//! single discriminate-based velocity/position update per caller cycle;
//! `pos()` queries the resulting commanded pose for the current progress.

use crate::consts::{ABC_MAG_EPSILON, TC_SCALE_EPSILON, TC_VEL_EPSILON};
use crate::geometry::{Circle, Line, MotionGeometry, PathGeometry, Pose};

/// Per-segment execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcState {
    /// Before the first cycle of a segment has run.
    Unset,
    Accel,
    Const,
    Decel,
    Paused,
    Done,
}

/// Which path geometry this TC advances along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcType {
    Linear,
    Circular,
}

/// Whether two adjacent motions overlap (`Blend`, G64) or the first fully
/// decelerates to zero before the second begins (`Stop`, G61).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermCond {
    Stop,
    Blend,
}

/// One trajectory segment's full runtime state.
#[derive(Debug, Clone)]
pub struct TrajectoryCycle {
    pub id: u32,
    pub kind: TcType,
    pub term_cond: TermCond,

    pub cycle_time: f64,
    /// Arc length of translation (or rotation magnitude, for a companion
    /// line run standalone) this TC must cover.
    pub target_pos: f64,
    pub v_max: f64,
    pub a_max: f64,
    pub v_scale: f64,
    /// Velocity credit borrowed by a blending successor TC.
    pub pre_v_max: f64,
    /// Acceleration credit borrowed by a blending successor TC.
    pub pre_a_max: f64,
    pub v_limit: f64,

    pub current_pos: f64,
    pub current_vel: f64,
    pub current_accel: f64,
    pub state: TcState,

    /// Primary translational path (XYZ).
    pub geometry: PathGeometry,
    /// Rotational (ABC) companion, interpolated in lockstep with `geometry`.
    pub abc: Line,
    /// Auxiliary-linear (UVW) companion, interpolated the same way.
    pub uvw: Line,

    /// When true, velocity/acceleration limits are rescaled to account for
    /// the coexistence of translation and rotation magnitude. Spec §9
    /// Open Question: the original ships with this branch disabled; kept
    /// here as an explicit, defaulted-off toggle rather than a silent
    /// behavior change. See DESIGN.md.
    pub rescale_for_abc: bool,
}

impl TrajectoryCycle {
    /// Radius of the circular geometry, if any (used by the centripetal
    /// velocity limit in `update()`).
    fn radius(&self) -> Option<f64> {
        match &self.geometry {
            PathGeometry::Circular(Circle { radius, .. }) => Some(*radius),
            PathGeometry::Linear(_) => None,
        }
    }

    /// Build a TC for a straight-line translational move.
    #[allow(clippy::too_many_arguments)]
    pub fn new_linear(
        id: u32,
        cycle_time: f64,
        line: Line,
        abc: Line,
        uvw: Line,
        v_max: f64,
        a_max: f64,
        v_limit: f64,
        term_cond: TermCond,
    ) -> Self {
        Self {
            id,
            kind: TcType::Linear,
            term_cond,
            cycle_time,
            target_pos: line.length(),
            v_max,
            a_max,
            v_scale: 1.0,
            pre_v_max: 0.0,
            pre_a_max: 0.0,
            v_limit,
            current_pos: 0.0,
            current_vel: 0.0,
            current_accel: 0.0,
            state: TcState::Unset,
            geometry: PathGeometry::Linear(line),
            abc,
            uvw,
            rescale_for_abc: false,
        }
    }

    /// Build a TC for a circular arc move.
    #[allow(clippy::too_many_arguments)]
    pub fn new_circular(
        id: u32,
        cycle_time: f64,
        circle: Circle,
        abc: Line,
        uvw: Line,
        v_max: f64,
        a_max: f64,
        v_limit: f64,
        term_cond: TermCond,
    ) -> Self {
        Self {
            id,
            kind: TcType::Circular,
            term_cond,
            cycle_time,
            target_pos: circle.length(),
            v_max,
            a_max,
            v_scale: 1.0,
            pre_v_max: 0.0,
            pre_a_max: 0.0,
            v_limit,
            current_pos: 0.0,
            current_vel: 0.0,
            current_accel: 0.0,
            state: TcState::Unset,
            geometry: PathGeometry::Circular(circle),
            abc,
            uvw,
            rescale_for_abc: false,
        }
    }

    /// True once this TC has fully retired (`DONE`, or trivially complete
    /// per the `targetPos <= 0` tie-break before the first cycle runs).
    pub fn is_done(&self) -> bool {
        self.state == TcState::Done || (self.state == TcState::Unset && self.target_pos <= 0.0)
    }

    /// Run one discriminate-based update (spec §4.1).
    pub fn update(&mut self) {
        if self.state == TcState::Done {
            self.current_vel = 0.0;
            self.current_accel = 0.0;
            return;
        }

        if self.target_pos <= 0.0 {
            // Tie-break: trivially complete.
            self.current_pos = 0.0;
            self.current_vel = 0.0;
            self.current_accel = 0.0;
            self.state = TcState::Done;
            return;
        }

        let to_go = self.target_pos - self.current_pos;

        let mut discr = 0.5 * self.cycle_time * self.current_vel - to_go;
        let new_vel = if discr > 0.0 {
            0.0
        } else {
            discr = 0.25 * self.cycle_time * self.cycle_time - 2.0 * discr / self.a_max;
            let discr = discr.max(0.0);
            -0.5 * self.a_max * self.cycle_time + self.a_max * discr.sqrt()
        };

        if new_vel <= 0.0 {
            self.current_pos = self.target_pos;
            self.current_vel = 0.0;
            self.current_accel = 0.0;
            self.state = TcState::Done;
            return;
        }

        let mut new_vel = new_vel;
        let mut scale_decel = false;

        let scaled_avail = (self.v_max - self.pre_v_max) * self.v_scale;
        if new_vel > scaled_avail {
            new_vel = scaled_avail.max(0.0);
            scale_decel = true;
        }

        if new_vel > self.v_limit {
            new_vel = self.v_limit;
        }

        if let Some(radius) = self.radius() {
            let centripetal_limit = (self.a_max * radius).max(0.0).sqrt();
            if new_vel > centripetal_limit {
                new_vel = centripetal_limit;
            }
        }

        let mut new_accel = (new_vel - self.current_vel) / self.cycle_time;
        let accel_floor = -self.a_max;
        let accel_ceil = self.a_max - self.pre_a_max;
        if new_accel < accel_floor {
            new_accel = accel_floor;
        } else if new_accel > accel_ceil {
            new_accel = accel_ceil;
        }
        new_vel = self.current_vel + new_accel * self.cycle_time;

        self.current_pos += 0.5 * (new_vel + self.current_vel) * self.cycle_time;

        let was_decel = self.state == TcState::Decel;
        self.state = if new_vel.abs() < TC_VEL_EPSILON && self.v_scale.abs() < TC_SCALE_EPSILON {
            TcState::Paused
        } else if new_accel > 0.0 {
            TcState::Accel
        } else if new_accel < 0.0 {
            if !scale_decel || was_decel {
                TcState::Decel
            } else {
                TcState::Const
            }
        } else {
            TcState::Const
        };

        self.current_vel = new_vel;
        self.current_accel = new_accel;
    }

    /// The commanded pose at the current progress, combining the primary
    /// translational path with the ABC/UVW companions yoked in lockstep
    /// (spec §4.1: "interpolate line_abc.point(currentPos * abc_mag /
    /// tmag); this yokes rotation to translation so both reach their
    /// endpoints simultaneously").
    pub fn pos(&self) -> Pose {
        if self.target_pos <= 0.0 {
            return Pose::from_parts(
                self.geometry.point_at_progress(0.0),
                self.uvw.start,
                self.abc.start,
            );
        }

        let xyz = self.geometry.point_at_progress(self.current_pos);

        let abc_mag = self.abc.length();
        let abc_pt = if abc_mag > ABC_MAG_EPSILON {
            self.abc.point(self.current_pos * abc_mag / self.target_pos)
        } else {
            self.abc.start
        };

        let uvw_mag = self.uvw.length();
        let uvw_pt = if uvw_mag > ABC_MAG_EPSILON {
            self.uvw.point(self.current_pos * uvw_mag / self.target_pos)
        } else {
            self.uvw.start
        };

        Pose::from_parts(xyz, uvw_pt, abc_pt)
    }

    /// Force this TC directly to a caller-given scalar position,
    /// recomputing velocity/acceleration consistent with `cycle_time`.
    ///
    /// Design-available hook (spec §9 `tcForceCycle`) — implemented and
    /// tested but not called by [`crate::tp::TrajectoryPlanner`].
    pub fn force_cycle(&mut self, pos: f64) {
        let clamped = pos.clamp(0.0, self.target_pos);
        let new_vel = (clamped - self.current_pos) / self.cycle_time;
        self.current_accel = (new_vel - self.current_vel) / self.cycle_time;
        self.current_vel = new_vel.max(0.0);
        self.current_pos = clamped;
        if self.current_pos >= self.target_pos {
            self.state = TcState::Done;
            self.current_vel = 0.0;
            self.current_accel = 0.0;
        }
    }

    /// Run the discriminate update against a trial cycle time without
    /// committing state, returning the position it would reach.
    ///
    /// Design-available hook (spec §9 `tcRunPreCycle`, for TC-to-TC time
    /// synchronization) — implemented and tested but not called by
    /// [`crate::tp::TrajectoryPlanner`].
    pub fn run_pre_cycle(&self, trial_dt: f64) -> f64 {
        let mut trial = self.clone();
        trial.cycle_time = trial_dt;
        trial.update();
        trial.current_pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Line;

    fn flat_line_tc(target: f64, cycle_time: f64, v_max: f64, a_max: f64) -> TrajectoryCycle {
        let line = Line::new([0.0, 0.0, 0.0], [target, 0.0, 0.0]);
        let abc = Line::new([0.0; 3], [0.0; 3]);
        let uvw = Line::new([0.0; 3], [0.0; 3]);
        TrajectoryCycle::new_linear(1, cycle_time, line, abc, uvw, v_max, a_max, v_max * 10.0, TermCond::Stop)
    }

    #[test]
    fn zero_target_completes_immediately() {
        let mut tc = flat_line_tc(0.0, 1.0 / 1000.0, 1.0, 10.0);
        assert!(!tc.is_done());
        tc.update();
        assert!(tc.is_done());
        assert_eq!(tc.current_pos, 0.0);
        assert_eq!(tc.current_vel, 0.0);
    }

    #[test]
    fn monotonic_position_and_terminates_at_target() {
        let target = 1.0;
        let mut tc = flat_line_tc(target, 1.0 / 23_437.5, 1.0, 10.0);
        let mut last_pos = tc.current_pos;
        let mut cycles = 0;
        while !tc.is_done() && cycles < 200_000 {
            tc.update();
            assert!(tc.current_pos + 1e-9 >= last_pos, "position went backwards");
            assert!(tc.current_pos <= target + 1e-9);
            assert!(tc.current_vel >= -1e-9);
            last_pos = tc.current_pos;
            cycles += 1;
        }
        assert!(tc.is_done());
        assert!((tc.current_pos - target).abs() < 1e-6);
        assert_eq!(tc.current_vel, 0.0);
        assert_eq!(tc.current_accel, 0.0);
    }

    #[test]
    fn scale_decel_does_not_force_decel_state_unless_already_decelerating() {
        // Start accelerating, then immediately scale vMax way down. The
        // resulting clamp must not itself flip state to DECEL.
        let mut tc = flat_line_tc(10.0, 1.0 / 1000.0, 10.0, 100.0);
        tc.update();
        assert_eq!(tc.state, TcState::Accel);
        tc.v_scale = 0.01; // drastic scale-down triggers the clamp branch
        tc.update();
        assert_ne!(tc.state, TcState::Decel);
    }

    #[test]
    fn circular_velocity_held_at_centripetal_limit() {
        let circle = Circle::new([1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 1.0], 0);
        let a_max = 4.0;
        let radius = circle.radius;
        let abc = Line::new([0.0; 3], [0.0; 3]);
        let uvw = Line::new([0.0; 3], [0.0; 3]);
        let mut tc = TrajectoryCycle::new_circular(
            1,
            1.0 / 1000.0,
            circle,
            abc,
            uvw,
            100.0,
            a_max,
            1000.0,
            TermCond::Stop,
        );
        let limit = (a_max * radius).sqrt();
        for _ in 0..5000 {
            if tc.is_done() {
                break;
            }
            tc.update();
            assert!(tc.current_vel <= limit + 1e-6);
        }
    }

    #[test]
    fn abc_companion_reaches_endpoint_with_translation() {
        let line = Line::new([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        let abc = Line::new([0.0, 0.0, 0.0], [90.0, 0.0, 0.0]);
        let uvw = Line::new([0.0; 3], [0.0; 3]);
        let mut tc = TrajectoryCycle::new_linear(1, 1.0 / 1000.0, line, abc, uvw, 1.0, 10.0, 10.0, TermCond::Stop);
        while !tc.is_done() {
            tc.update();
        }
        let pose = tc.pos();
        assert!((pose.a - 90.0).abs() < 1e-6);
        assert!((pose.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn force_cycle_snaps_to_target_and_marks_done() {
        let mut tc = flat_line_tc(5.0, 1.0 / 1000.0, 1.0, 10.0);
        tc.force_cycle(5.0);
        assert!(tc.is_done());
        assert_eq!(tc.current_vel, 0.0);
    }

    #[test]
    fn run_pre_cycle_does_not_mutate_self() {
        let tc = flat_line_tc(1.0, 1.0 / 1000.0, 1.0, 10.0);
        let before = tc.current_pos;
        let trial_pos = tc.run_pre_cycle(2.0 / 1000.0);
        assert_eq!(tc.current_pos, before);
        assert!(trial_pos > before);
    }
}
