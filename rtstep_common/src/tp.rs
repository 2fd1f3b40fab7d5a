//! Trajectory Planner (TP) — sequences [`TrajectoryCycle`] segments through
//! the [`TcQueue`] one cycle per tick (spec §4.3).

use crate::geometry::{Circle, Line, Pose, Vector3};
use crate::tc::{TcState, TermCond, TrajectoryCycle};
use crate::tc_queue::TcQueue;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TpError {
    #[error("TC queue full")]
    QueueFull,
}

/// Default per-segment motion limits a newly queued TC inherits until the
/// caller overrides them (`set_limits`).
#[derive(Debug, Clone, Copy)]
pub struct TpLimits {
    pub vel: f64,
    pub accel: f64,
    pub v_limit: f64,
}

/// Sequences queued linear/circular segments, applying STOP/BLEND
/// termination, velocity scaling (feed override), and pause/resume/abort.
pub struct TrajectoryPlanner {
    queue: TcQueue,
    cycle_time: f64,
    limits: TpLimits,
    term_cond: TermCond,
    next_id: u32,

    /// Start pose of the blending successor, captured the instant it
    /// begins accumulating motion, so its progress can be added as a
    /// delta on top of the current segment's own position.
    next_start: Option<Pose>,

    v_scale: f64,
    v_restore: f64,
    pausing: bool,

    /// Last composite pose reported by `getPos`, retained so a fully
    /// drained queue still reports where it stopped.
    last_pos: Pose,
}

impl TrajectoryPlanner {
    pub fn new(capacity: usize, cycle_time: f64, limits: TpLimits) -> Self {
        Self {
            queue: TcQueue::new(capacity),
            cycle_time,
            limits,
            term_cond: TermCond::Stop,
            next_id: 1,
            next_start: None,
            v_scale: 1.0,
            v_restore: 1.0,
            pausing: false,
            last_pos: Pose::default(),
        }
    }

    /// Change the default velocity/acceleration/vLimit new segments inherit.
    pub fn set_limits(&mut self, limits: TpLimits) {
        self.limits = limits;
    }

    /// Latch the termination condition applied to subsequently queued
    /// segments (G64/G61).
    pub fn set_term_cond(&mut self, cond: TermCond) {
        self.term_cond = cond;
    }

    /// Queue a straight-line move ending at `end`, with ABC/UVW companions
    /// running in lockstep (spec §4.1's position-query rule).
    pub fn add_line(
        &mut self,
        start: Pose,
        end: Pose,
    ) -> Result<(), TpError> {
        let line = Line::new(start.xyz(), end.xyz());
        let abc = Line::new(start.abc(), end.abc());
        let uvw = Line::new(start.uvw(), end.uvw());
        let tc = TrajectoryCycle::new_linear(
            self.next_id,
            self.cycle_time,
            line,
            abc,
            uvw,
            self.limits.vel,
            self.limits.accel,
            self.limits.v_limit,
            self.term_cond,
        );
        if !self.queue.push(tc) {
            return Err(TpError::QueueFull);
        }
        self.next_id += 1;
        Ok(())
    }

    /// Queue a circular-arc move ending at `end`, about `center` with unit
    /// `normal`, sweeping `turn` extra full turns.
    pub fn add_circle(
        &mut self,
        start: Pose,
        end: Pose,
        center: Vector3,
        normal: Vector3,
        turn: i32,
    ) -> Result<(), TpError> {
        let circle = Circle::new(start.xyz(), end.xyz(), center, normal, turn);
        let abc = Line::new(start.abc(), end.abc());
        let uvw = Line::new(start.uvw(), end.uvw());
        let tc = TrajectoryCycle::new_circular(
            self.next_id,
            self.cycle_time,
            circle,
            abc,
            uvw,
            self.limits.vel,
            self.limits.accel,
            self.limits.v_limit,
            self.term_cond,
        );
        if !self.queue.push(tc) {
            return Err(TpError::QueueFull);
        }
        self.next_id += 1;
        Ok(())
    }

    /// True when [`TcQueue::full`] back-pressure should hold off the
    /// producer from queuing further segments.
    pub fn queue_full(&self) -> bool {
        self.queue.full()
    }

    /// User-adjustable feed-rate multiplier (1.0 = no scaling).
    pub fn set_v_scale(&mut self, scale: f64) {
        self.v_scale = scale;
        if let Some(tc) = self.queue.current_mut() {
            tc.v_scale = scale;
        }
    }

    pub fn v_scale(&self) -> f64 {
        self.v_scale
    }

    /// Request a decelerate-to-pause; in-flight TCs ramp down to zero
    /// rather than snapping.
    pub fn pause(&mut self) {
        if !self.pausing {
            self.v_restore = self.v_scale;
            self.pausing = true;
            self.set_v_scale(0.0);
        }
    }

    /// Clear a pending/active pause, restoring the pre-pause feed scale.
    pub fn resume(&mut self) {
        if self.pausing {
            self.pausing = false;
            self.set_v_scale(self.v_restore);
        }
    }

    pub fn is_pausing(&self) -> bool {
        self.pausing
    }

    /// Flush the queue and force the active segment to decelerate to zero
    /// (estop/cancel).
    pub fn abort(&mut self) {
        if let Some(tc) = self.queue.current_mut() {
            // Force current segment to its own target so the next `isDone`
            // check retires it instead of leaving a half-run TC behind.
            let pos = tc.current_pos;
            tc.force_cycle(pos);
        }
        self.queue.clear();
        self.next_start = None;
        self.pausing = false;
        self.v_scale = 1.0;
    }

    /// Advance the currently executing TC by one cycle, handling BLEND
    /// overlap and retiring completed segments from the head.
    pub fn run_cycle(&mut self) {
        let current_done;
        let should_start_blend;
        {
            let current = match self.queue.current_mut() {
                Some(tc) => tc,
                None => return,
            };
            current.update();
            current_done = current.is_done();

            should_start_blend = current.term_cond == TermCond::Blend
                && current.state == TcState::Decel
                && self.next_start.is_none();
        }

        if should_start_blend {
            if let Some(next) = self.queue.next() {
                // Next TC hasn't advanced yet, so its own pos() is its start.
                self.next_start = Some(next.pos());
            }
        }

        if let Some(next) = self.queue.next_mut_if_blending() {
            next.update();
        }

        self.last_pos = self.compute_composite_pos();

        if current_done {
            self.queue.pop_done();
            self.next_start = None;
        }
    }

    /// Composite commanded pose: the current segment's own position, plus
    /// (while blending) however far the successor has already progressed
    /// past its own start — the "sum of active segments' contributions"
    /// rule from the planner contract.
    fn compute_composite_pos(&self) -> Pose {
        let current_pose = match self.queue.current() {
            Some(tc) => tc.pos(),
            None => return self.last_pos,
        };
        match (self.next_start, self.queue.next()) {
            (Some(next_start), Some(next)) => current_pose + (next.pos() - next_start),
            _ => current_pose,
        }
    }

    /// Composite commanded pose after the last `run_cycle`.
    pub fn get_pos(&self) -> Pose {
        self.last_pos
    }

    /// True once the queue is empty and no segment is active.
    pub fn is_done(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Id of the currently executing segment (queue head), if any — lets a
    /// caller detect the head retiring (and a new one taking over) across
    /// successive `run_cycle` calls without tracking queue internals
    /// itself (used by the dispatcher to cut I/O requests at segment
    /// boundaries, spec §4.7).
    pub fn current_id(&self) -> Option<u32> {
        self.queue.current().map(|tc| tc.id)
    }
}

impl TcQueue {
    /// Mutable access to the successor TC, but only when it should already
    /// be accumulating motion under BLEND overlap. Kept as an inherent
    /// extension on `TcQueue` (rather than widening its public API) since
    /// this blending rule is planner-specific, not a queue concern.
    fn next_mut_if_blending(&mut self) -> Option<&mut TrajectoryCycle> {
        let should_run = matches!(self.current(), Some(tc) if tc.term_cond == TermCond::Blend && tc.state == TcState::Decel);
        if should_run {
            self.next_mut()
        } else {
            None
        }
    }
}
