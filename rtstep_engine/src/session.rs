//! The session (spec §3 "Session", §4.6 "USB Streaming Engine", §6
//! "Embedding surface").
//!
//! `Session` is the owned handle `open()` returns (spec §9: no process-wide
//! singleton). It wraps an `Arc<SessionShared>` so the completion callback
//! fired by the `Dongle`'s event thread can resubmit the next queued
//! request without the caller holding anything open.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use rtstep_common::config::MachineConfig;
use rtstep_common::consts::{ICOUNT_AVG_SAMPLES, WAIT_REARM};
use rtstep_common::error::ResultCode;
use rtstep_common::geometry::Pose;
use rtstep_common::protocol::{BoardRev, StateBits};
use rtstep_common::tp::{TpLimits, TrajectoryPlanner};

use rtstep_hal::dongle::{transfer_timeout, BulkOutcome, Dongle};
use rtstep_hal::encoder::Encoder;

use crate::axis::AxisRuntime;
use crate::error::{EngineError, MCodeCallback};
use crate::io_queue::{IoQueue, IoRequest, TransferKind};

/// User-level machine-state bits (spec §3 "State-bit word", user-level
/// region).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachineFlags {
    pub estop: bool,
    pub paused: bool,
    pub homed: bool,
    pub cancel: bool,
}

/// An out-of-band request the supervisor thread drains on its next poll
/// (spec §4.6 "drains a queue of out-of-band control requests").
#[derive(Debug, Clone, Copy)]
pub enum ControlRequest {
    OutputSet(u8),
    OutputClear(u8),
    OutputMode { n: u8, pwm: bool },
    OutputPwm { n: u8, duty: u8 },
    InputMode { n: u8, adc: bool },
}

/// Moving average plus per-run min/max of the dongle's `icount_period`
/// (spec §4.6: "a four-sample moving average ... with per-run min and max
/// retained across one synchronous-feed segment").
#[derive(Debug, Clone)]
pub struct IcountStats {
    samples: VecDeque<u16>,
    pub avg: f64,
    pub min: u16,
    pub max: u16,
}

impl Default for IcountStats {
    fn default() -> Self {
        Self {
            samples: VecDeque::with_capacity(ICOUNT_AVG_SAMPLES),
            avg: 0.0,
            min: u16::MAX,
            max: 0,
        }
    }
}

impl IcountStats {
    /// Feed a freshly polled `icount_period`. A `0` reading (no edges seen
    /// yet) does not perturb the average or min/max.
    fn push(&mut self, period: u16) {
        if period == 0 {
            return;
        }
        self.min = self.min.min(period);
        self.max = self.max.max(period);
        if self.samples.len() == ICOUNT_AVG_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(period);
        self.avg = self.samples.iter().map(|&p| p as f64).sum::<f64>() / self.samples.len() as f64;
    }

    /// Reset per-run min/max for a new synchronous-feed segment, keeping
    /// the moving average's own sample window intact.
    fn reset_minmax(&mut self) {
        self.min = u16::MAX;
        self.max = 0;
    }
}

struct SessionState {
    axes: Vec<AxisRuntime>,
    encoder: Encoder,
    tp: TrajectoryPlanner,
    io_queue: IoQueue,
    in_flight: usize,
    next_request_id: u64,
    flags: MachineFlags,
    dongle_bits: StateBits,
    prev_input_bits: StateBits,
    icount: IcountStats,
    control_queue: VecDeque<ControlRequest>,
    sync_feed_per_sec: Option<f64>,
    /// End pose of the most recently queued (not yet necessarily executed)
    /// motion — the start pose of the next one.
    target_pose: Pose,
    paused_at_line: Option<u32>,
}

/// Shared session internals, reachable from the public [`Session`] handle
/// and from the completion-callback closures handed to the [`Dongle`].
pub(crate) struct SessionShared {
    pub(crate) dongle: Arc<dyn Dongle>,
    pub(crate) board_rev: BoardRev,
    pub(crate) config: MachineConfig,
    state: Mutex<SessionState>,
    cv: Condvar,
    mcode_callback: Mutex<Option<MCodeCallback>>,
    position_callback: Mutex<Option<Box<dyn Fn(Pose) + Send>>>,
    paused_callback: Mutex<Option<Box<dyn Fn(u32) + Send>>>,
    estop_callback: Mutex<Option<Box<dyn Fn() + Send>>>,
    pub(crate) shutdown: AtomicBool,
}

impl SessionShared {
    fn try_submit_next(self: &Arc<Self>) {
        let req = {
            let mut st = self.state.lock().unwrap();
            if st.in_flight > 0 {
                return;
            }
            match st.io_queue.pop_front() {
                Some(r) => {
                    st.in_flight = 1;
                    r
                }
                None => {
                    drop(st);
                    self.cv.notify_all();
                    return;
                }
            }
        };

        let timeout = transfer_timeout(req.buf.len());
        let pose = req.target_pose;
        let shared = Arc::clone(self);
        if let Err(e) = self.dongle.submit_bulk(
            req.buf,
            timeout,
            Box::new(move |outcome| shared.on_transfer_complete(outcome, pose)),
        ) {
            tracing::error!(error = %e, "bulk submit failed");
            let mut st = self.state.lock().unwrap();
            st.in_flight = 0;
            st.flags.estop = true;
            drop(st);
            self.cv.notify_all();
        }
    }

    fn on_transfer_complete(self: &Arc<Self>, outcome: BulkOutcome, pose: Pose) {
        let mut completed_pose = None;
        let mut raise_estop = false;
        {
            let mut st = self.state.lock().unwrap();
            st.in_flight = 0;
            match &outcome {
                BulkOutcome::Completed => {
                    st.target_pose = pose;
                    completed_pose = Some(pose);
                }
                BulkOutcome::Cancelled => {}
                _ => {
                    st.flags.estop = true;
                    raise_estop = true;
                }
            }
        }
        if let Some(p) = completed_pose {
            if let Some(cb) = self.position_callback.lock().unwrap().as_ref() {
                cb(p);
            }
        }
        if raise_estop {
            tracing::error!(?outcome, "bulk transfer failed, raising estop");
            let _ = self.dongle.abort_set();
            if let Some(cb) = self.estop_callback.lock().unwrap().as_ref() {
                cb();
            }
        }
        self.cv.notify_all();
        self.try_submit_next();
    }

    pub(crate) fn enqueue_request(self: &Arc<Self>, req: IoRequest) {
        {
            let mut st = self.state.lock().unwrap();
            st.io_queue.push(req);
        }
        self.try_submit_next();
    }

    pub(crate) fn next_request_id(&self) -> u64 {
        let mut st = self.state.lock().unwrap();
        let id = st.next_request_id;
        st.next_request_id += 1;
        id
    }

    /// Block until the I/O queue has drained back to `REQ_MIN` (spec §4.6
    /// hysteresis back-pressure), unless ESTOP/CANCEL cuts the wait short.
    ///
    /// Only engages once the queue has actually crossed `REQ_MAX`; once
    /// engaged, the wait holds until the low watermark (`REQ_MIN`), not
    /// merely until the queue dips back under `REQ_MAX` — that's the
    /// hysteresis spec §4.6 describes ("blocks ... until the in-flight
    /// count falls to REQ_MIN").
    pub(crate) fn apply_backpressure(self: &Arc<Self>) {
        let mut st = self.state.lock().unwrap();
        if !st.io_queue.over_high_watermark() {
            return;
        }
        while !st.io_queue.at_or_below_low_watermark() && !st.flags.estop && !st.flags.cancel {
            let (guard, _timed_out) = self.cv.wait_timeout(st, WAIT_REARM).unwrap();
            st = guard;
        }
    }

    /// Block until every queued/in-flight request has completed (spec §6
    /// `io_done_wait`).
    pub fn io_done_wait(self: &Arc<Self>) {
        let mut st = self.state.lock().unwrap();
        while (!st.io_queue.is_empty() || st.in_flight > 0) && !st.flags.estop {
            let (guard, _timed_out) = self.cv.wait_timeout(st, WAIT_REARM).unwrap();
            st = guard;
        }
    }

    fn wait_for_dongle_bit(self: &Arc<Self>, bit: StateBits) {
        let mut st = self.state.lock().unwrap();
        while !st.dongle_bits.contains(bit) && !st.flags.estop && !st.flags.cancel {
            let (guard, _timed_out) = self.cv.wait_timeout(st, WAIT_REARM).unwrap();
            st = guard;
        }
    }

    pub(crate) fn is_estop(&self) -> bool {
        self.state.lock().unwrap().flags.estop
    }

    pub(crate) fn is_cancel(&self) -> bool {
        self.state.lock().unwrap().flags.cancel
    }

    pub(crate) fn cancel_is_set_or_estop(&self) -> (bool, bool) {
        let st = self.state.lock().unwrap();
        (st.flags.cancel, st.flags.estop)
    }

    pub(crate) fn target_pose(&self) -> Pose {
        self.state.lock().unwrap().target_pose
    }

    pub(crate) fn sync_feed_per_sec(&self) -> Option<f64> {
        self.state.lock().unwrap().sync_feed_per_sec
    }

    pub(crate) fn paused_at_line(&self) -> Option<u32> {
        self.state.lock().unwrap().paused_at_line
    }

    pub(crate) fn clear_paused(&self) {
        let mut st = self.state.lock().unwrap();
        st.flags.paused = false;
        st.paused_at_line = None;
    }

    pub(crate) fn enter_paused(&self, line: u32) {
        let mut st = self.state.lock().unwrap();
        st.flags.paused = true;
        st.paused_at_line = Some(line);
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.state.lock().unwrap().flags.paused
    }

    pub(crate) fn invoke_paused_callback(&self, line: u32) {
        if let Some(cb) = self.paused_callback.lock().unwrap().as_ref() {
            cb(line);
        }
    }

    pub(crate) fn invoke_mcode_callback(&self, call: &crate::error::McodeCall) -> Result<(), String> {
        match self.mcode_callback.lock().unwrap().as_ref() {
            Some(cb) => cb(call),
            None => Ok(()),
        }
    }

    /// Queue one motion segment, returning the start pose it was appended
    /// after (spec §4.3 `addLine`/`addCircle`).
    pub(crate) fn push_line(&self, end: Pose, vel: f64, accel: f64, v_limit: f64) -> Result<Pose, EngineError> {
        let mut st = self.state.lock().unwrap();
        st.tp.set_limits(TpLimits { vel, accel, v_limit });
        let start = st.target_pose;
        st.tp.add_line(start, end).map_err(|_| EngineError::QueueFull)?;
        st.target_pose = end;
        Ok(start)
    }

    pub(crate) fn push_circle(
        &self,
        end: Pose,
        center: rtstep_common::geometry::Vector3,
        normal: rtstep_common::geometry::Vector3,
        turn: i32,
        vel: f64,
        accel: f64,
        v_limit: f64,
    ) -> Result<Pose, EngineError> {
        let mut st = self.state.lock().unwrap();
        st.tp.set_limits(TpLimits { vel, accel, v_limit });
        let start = st.target_pose;
        st.tp
            .add_circle(start, end, center, normal, turn)
            .map_err(|_| EngineError::QueueFull)?;
        st.target_pose = end;
        Ok(start)
    }

    pub(crate) fn set_term_cond(&self, cond: rtstep_common::tc::TermCond) {
        self.state.lock().unwrap().tp.set_term_cond(cond);
    }

    pub(crate) fn queue_full(&self) -> bool {
        self.state.lock().unwrap().tp.queue_full()
    }

    /// Run every queued TC to completion, cutting one `IoRequest` per
    /// segment id retiring (spec §4.7 "run TP cycles until done, encode and
    /// enqueue one I/O request" generalized across a blended batch — see
    /// `DESIGN.md`). Returns once the planner's queue is empty or
    /// ESTOP/CANCEL aborts it early.
    pub(crate) fn drain_motion(self: &Arc<Self>, pending: &[(u32, Pose)]) {
        let cycle_time = self.config.traj.cycle_time;
        let mut buf = Vec::new();
        let mut batch_index = 0usize;
        let mut last_id = {
            let st = self.state.lock().unwrap();
            st.tp.current_id()
        };

        loop {
            let mut st = self.state.lock().unwrap();
            if st.flags.estop || st.flags.cancel {
                st.tp.abort();
                drop(st);
                break;
            }
            if st.tp.is_done() {
                break;
            }
            step_cycle(&mut st, cycle_time, &mut buf);
            let id_now = st.tp.current_id();
            drop(st);

            if id_now != last_id {
                if let Some((line, pose)) = pending.get(batch_index).copied() {
                    self.cut_request(line, pose, &mut buf);
                }
                batch_index += 1;
                last_id = id_now;
            }
        }

        if !buf.is_empty() {
            if let Some((line, pose)) = pending.get(batch_index).copied() {
                self.cut_request(line, pose, &mut buf);
            }
        }
    }

    fn cut_request(self: &Arc<Self>, line: u32, pose: Pose, buf: &mut Vec<u8>) {
        {
            let mut st = self.state.lock().unwrap();
            st.encoder.finalize_request(buf);
        }
        let id = self.next_request_id();
        let mut req = IoRequest::new(id, line, pose, TransferKind::Normal);
        req.buf = std::mem::take(buf);
        self.enqueue_request(req);
    }

    pub(crate) fn estop(self: &Arc<Self>) {
        let mut st = self.state.lock().unwrap();
        if st.flags.estop {
            return;
        }
        st.flags.estop = true;
        st.tp.abort();
        drop(st);
        let _ = self.dongle.abort_set();
        if let Some(cb) = self.estop_callback.lock().unwrap().as_ref() {
            cb();
        }
        self.cv.notify_all();
    }

    pub(crate) fn estop_reset(self: &Arc<Self>) -> Result<(), EngineError> {
        self.dongle.abort_clear()?;
        self.dongle.set()?;
        let mut st = self.state.lock().unwrap();
        st.flags.estop = false;
        st.flags.cancel = false;
        st.flags.homed = false;
        st.io_queue.clear();
        st.encoder.reset();
        for axis in st.axes.iter_mut() {
            axis.reset();
        }
        st.icount = IcountStats::default();
        drop(st);
        self.cv.notify_all();
        Ok(())
    }

    pub(crate) fn home(&self) {
        let mut st = self.state.lock().unwrap();
        st.encoder.reset();
        for axis in st.axes.iter_mut() {
            axis.reset();
        }
        st.target_pose = Pose::default();
        st.flags.homed = true;
        st.flags.cancel = false;
    }

    pub(crate) fn is_homed(&self) -> bool {
        self.state.lock().unwrap().flags.homed
    }

    /// Spec §4.6 "Cancellation": flush the TC and I/O queues, cancel any
    /// in-flight transfer, and clear HOMED immediately.
    pub(crate) fn cancel(self: &Arc<Self>) {
        let mut st = self.state.lock().unwrap();
        st.flags.cancel = true;
        st.flags.homed = false;
        st.io_queue.clear();
        st.tp.abort();
        let was_in_flight = st.in_flight > 0;
        drop(st);
        if was_in_flight {
            let _ = self.dongle.cancel_active();
        } else {
            self.cv.notify_all();
        }
    }

    pub(crate) fn cancel_clear(&self) {
        self.state.lock().unwrap().flags.cancel = false;
    }

    pub(crate) fn position_get(&self) -> Pose {
        self.state.lock().unwrap().target_pose
    }

    /// Verify-mode motion: advance the previewed end pose without touching
    /// the trajectory planner or I/O pipeline (spec §4.7 "verify mode").
    pub(crate) fn set_target_pose_preview(&self, pose: Pose) {
        self.state.lock().unwrap().target_pose = pose;
    }

    /// Overwrite the commanded position directly (G92-style realignment),
    /// without emitting any step pulses — every axis's running master
    /// index is re-seated to match so the next real motion doesn't read as
    /// a multi-step jump.
    pub(crate) fn position_set(&self, pose: Pose) {
        let mut st = self.state.lock().unwrap();
        st.target_pose = pose;
        let n = st.axes.len();
        for i in 0..n {
            let coordinate = st.axes[i].config.coordinate.get(&pose);
            st.axes[i].reset();
            st.axes[i].pos_cmd = coordinate;
            let clipped = coordinate.clamp(st.axes[i].config.min_pos_limit, st.axes[i].config.max_pos_limit);
            let steps = (clipped * st.axes[i].config.steps_per_unit).round() as i64;
            st.encoder.set_master_index(i, steps);
        }
    }

    pub(crate) fn din_abort_enable(&self, n: u8) -> Result<(), EngineError> {
        if n > 3 {
            return Err(EngineError::Result(ResultCode::InvalidInputNum(n)));
        }
        // INPUT0 has no mode select and is always available as an abort
        // source; INPUT1..3 share their pin with ADC mode (spec §4.6/§6).
        let mut st = self.state.lock().unwrap();
        st.control_queue.push_back(ControlRequest::InputMode { n, adc: false });
        drop(st);
        Ok(())
    }

    pub(crate) fn dout_set(&self, n: u8) {
        self.state.lock().unwrap().control_queue.push_back(ControlRequest::OutputSet(n));
    }

    pub(crate) fn dout_clear(&self, n: u8) {
        self.state.lock().unwrap().control_queue.push_back(ControlRequest::OutputClear(n));
    }

    pub(crate) fn output_mode(&self, n: u8, pwm: bool) {
        self.state.lock().unwrap().control_queue.push_back(ControlRequest::OutputMode { n, pwm });
    }

    pub(crate) fn output_pwm(&self, n: u8, duty: u8) {
        self.state.lock().unwrap().control_queue.push_back(ControlRequest::OutputPwm { n, duty });
    }

    pub(crate) fn input_mode(&self, n: u8, adc: bool) {
        self.state.lock().unwrap().control_queue.push_back(ControlRequest::InputMode { n, adc });
    }

    pub(crate) fn pop_control_request(&self) -> Option<ControlRequest> {
        self.state.lock().unwrap().control_queue.pop_front()
    }

    pub(crate) fn adc_get(&self, n: u8) -> Result<StateBits, EngineError> {
        StateBits::input_bit(n).ok_or(EngineError::Result(ResultCode::InvalidInputNum(n)))
    }

    pub(crate) fn din_frequency(&self, board_rev: BoardRev) -> f64 {
        let st = self.state.lock().unwrap();
        if st.icount.avg <= 0.0 {
            0.0
        } else {
            board_rev.step_clock_hz() / st.icount.avg
        }
    }

    pub(crate) fn din_frequency_avg(&self, board_rev: BoardRev) -> f64 {
        self.din_frequency(board_rev)
    }

    pub(crate) fn din_frequency_max(&self, board_rev: BoardRev) -> f64 {
        let st = self.state.lock().unwrap();
        if st.icount.min == 0 {
            0.0
        } else {
            board_rev.step_clock_hz() / st.icount.min as f64
        }
    }

    pub(crate) fn din_frequency_min(&self, board_rev: BoardRev) -> f64 {
        let st = self.state.lock().unwrap();
        if st.icount.max == 0 {
            0.0
        } else {
            board_rev.step_clock_hz() / st.icount.max as f64
        }
    }

    /// Supervisor-thread entry point: apply one polled `DongleQuery`,
    /// updating state bits, the icount stats, and raising estop on a
    /// configured input transition (spec §4.6).
    pub(crate) fn apply_supervisor_poll(self: &Arc<Self>, bits: StateBits, icount_period: u16) {
        let mut raise = false;
        {
            let mut st = self.state.lock().unwrap();
            let prev = st.prev_input_bits;
            st.dongle_bits = bits;
            st.icount.push(icount_period);

            for n in 0..4u8 {
                if !self.config.task.input_abort[n as usize] {
                    continue;
                }
                if let Some(input_bit) = StateBits::input_bit(n) {
                    let was_low = !prev.contains(input_bit);
                    let now_high = bits.contains(input_bit);
                    if was_low && now_high {
                        st.flags.estop = true;
                        raise = true;
                    }
                }
            }
            st.prev_input_bits = bits;
        }
        self.cv.notify_all();
        if raise {
            tracing::warn!("configured input transition raised estop");
            let _ = self.dongle.abort_set();
            if let Some(cb) = self.estop_callback.lock().unwrap().as_ref() {
                cb();
            }
        }
    }

    pub(crate) fn dongle_disconnected(self: &Arc<Self>) {
        self.estop();
    }

    /// Spec §4.6 "Speed-feed synchronization".
    pub fn start_speed_feed_sync(self: &Arc<Self>, feed_per_revolution: f64) -> Result<(), EngineError> {
        let supported = {
            let st = self.state.lock().unwrap();
            self.board_rev > BoardRev::D && !self.config.task.input_abort[0] && st.icount.avg > 0.0
        };
        if !supported {
            tracing::warn!("speed-feed sync requested but unsupported by board revision/config; ignoring");
            return Ok(());
        }
        self.io_done_wait();
        self.wait_for_dongle_bit(StateBits::EMPTY);
        self.dongle.sync_start_set()?;
        self.wait_for_dongle_bit(StateBits::SYNC_START);

        let mut st = self.state.lock().unwrap();
        if st.flags.estop || st.flags.cancel {
            return Ok(());
        }
        let step_clock = self.board_rev.step_clock_hz();
        let feed_per_sec = step_clock / st.icount.avg * feed_per_revolution;
        st.sync_feed_per_sec = Some(feed_per_sec);
        st.icount.reset_minmax();
        Ok(())
    }

    pub fn stop_speed_feed_sync(&self) {
        self.state.lock().unwrap().sync_feed_per_sec = None;
    }
}

fn step_cycle(st: &mut SessionState, cycle_time: f64, buf: &mut Vec<u8>) {
    st.tp.run_cycle();
    let pose = st.tp.get_pos();
    let mut cmd_positions = Vec::with_capacity(st.axes.len());
    for axis in st.axes.iter_mut() {
        let commanded = axis.config.coordinate.get(&pose);
        cmd_positions.push(axis.advance(commanded, cycle_time));
    }
    st.encoder.sample_cycle(buf, &cmd_positions);
}

/// Owned session handle (spec §9 "make the session an owned aggregate").
/// Cloning shares the same underlying machine; every clone sees the same
/// state.
#[derive(Clone)]
pub struct Session {
    pub(crate) shared: Arc<SessionShared>,
}

impl Session {
    /// Spec §6 `open`: validate `config`, build per-axis runtime state and
    /// the trajectory planner, issue `STEP_SET`, and start the supervisor
    /// thread that polls dongle state every `SUPERVISOR_POLL_INTERVAL`.
    pub fn open(config: MachineConfig, dongle: Arc<dyn Dongle>) -> Result<(Session, JoinHandle<()>), EngineError> {
        config.validate()?;
        dongle.set()?;

        let axes: Vec<AxisRuntime> = config.axes.iter().cloned().map(AxisRuntime::new).collect();
        let encoder = Encoder::new(axes.iter().map(|a| a.pin_map()));

        let limits = TpLimits {
            vel: axes.iter().map(|a| a.config.max_velocity).fold(f64::INFINITY, f64::min),
            accel: axes
                .iter()
                .map(|a| a.config.max_acceleration)
                .fold(f64::INFINITY, f64::min),
            v_limit: axes.iter().map(|a| a.config.max_velocity).fold(f64::INFINITY, f64::min),
        };
        let tp = TrajectoryPlanner::new(config.traj.tc_queue_size, config.traj.cycle_time, limits);
        let io_queue = IoQueue::new(config.traj.req_max, config.traj.req_min);
        let board_rev = dongle.board_rev();

        let state = SessionState {
            axes,
            encoder,
            tp,
            io_queue,
            in_flight: 0,
            next_request_id: 1,
            flags: MachineFlags::default(),
            dongle_bits: StateBits::empty(),
            prev_input_bits: StateBits::empty(),
            icount: IcountStats::default(),
            control_queue: VecDeque::new(),
            sync_feed_per_sec: None,
            target_pose: Pose::default(),
            paused_at_line: None,
        };

        let shared = Arc::new(SessionShared {
            dongle,
            board_rev,
            config,
            state: Mutex::new(state),
            cv: Condvar::new(),
            mcode_callback: Mutex::new(None),
            position_callback: Mutex::new(None),
            paused_callback: Mutex::new(None),
            estop_callback: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        });

        let supervisor = crate::supervisor::spawn(Arc::clone(&shared));
        Ok((Session { shared }, supervisor))
    }

    pub fn estop(&self) {
        self.shared.estop();
    }

    pub fn estop_reset(&self) -> Result<(), EngineError> {
        self.shared.estop_reset()
    }

    pub fn home(&self) {
        self.shared.home();
    }

    pub fn is_homed(&self) -> bool {
        self.shared.is_homed()
    }

    pub fn is_estop(&self) -> bool {
        self.shared.is_estop()
    }

    pub fn cancel_set(&self) {
        self.shared.cancel();
    }

    /// Covers both `auto_cancel_clear` and `verify_cancel_clear`: the state
    /// bit word carries a single CANCEL region (spec §3), not one per
    /// dispatch mode.
    pub fn cancel_clear(&self) {
        self.shared.cancel_clear();
    }

    pub fn position_get(&self) -> Pose {
        self.shared.position_get()
    }

    pub fn position_set(&self, pose: Pose) {
        self.shared.position_set(pose);
    }

    pub fn din_abort_enable(&self, n: u8) -> Result<(), EngineError> {
        self.shared.din_abort_enable(n)
    }

    pub fn din_abort_disable(&self, n: u8) -> Result<(), EngineError> {
        if n > 3 {
            return Err(EngineError::Result(ResultCode::InvalidInputNum(n)));
        }
        Ok(())
    }

    pub fn din_frequency_get(&self, n: u8) -> Result<f64, EngineError> {
        StateBits::input_bit(n).ok_or(EngineError::Result(ResultCode::InvalidInputNum(n)))?;
        Ok(self.shared.din_frequency(self.shared.board_rev))
    }

    pub fn din_frequency_avg_get(&self, n: u8) -> Result<f64, EngineError> {
        StateBits::input_bit(n).ok_or(EngineError::Result(ResultCode::InvalidInputNum(n)))?;
        Ok(self.shared.din_frequency_avg(self.shared.board_rev))
    }

    pub fn din_frequency_max_get(&self, n: u8) -> Result<f64, EngineError> {
        StateBits::input_bit(n).ok_or(EngineError::Result(ResultCode::InvalidInputNum(n)))?;
        Ok(self.shared.din_frequency_max(self.shared.board_rev))
    }

    pub fn din_frequency_min_get(&self, n: u8) -> Result<f64, EngineError> {
        StateBits::input_bit(n).ok_or(EngineError::Result(ResultCode::InvalidInputNum(n)))?;
        Ok(self.shared.din_frequency_min(self.shared.board_rev))
    }

    pub fn dout_set(&self, n: u8) -> Result<(), EngineError> {
        if n > 2 {
            return Err(EngineError::Result(ResultCode::InvalidOutputNum(n)));
        }
        self.shared.dout_set(n);
        Ok(())
    }

    pub fn dout_clear(&self, n: u8) -> Result<(), EngineError> {
        if n > 2 {
            return Err(EngineError::Result(ResultCode::InvalidOutputNum(n)));
        }
        self.shared.dout_clear(n);
        Ok(())
    }

    pub fn output_mode(&self, n: u8, pwm: bool) -> Result<(), EngineError> {
        if n > 2 {
            return Err(EngineError::Result(ResultCode::InvalidOutputNum(n)));
        }
        self.shared.output_mode(n, pwm);
        Ok(())
    }

    pub fn output_pwm(&self, n: u8, duty: u8) -> Result<(), EngineError> {
        if n > 2 {
            return Err(EngineError::Result(ResultCode::InvalidOutputNum(n)));
        }
        self.shared.output_pwm(n, duty);
        Ok(())
    }

    pub fn input_mode(&self, n: u8, adc: bool) -> Result<(), EngineError> {
        StateBits::input_bit(n).ok_or(EngineError::Result(ResultCode::InvalidInputNum(n)))?;
        self.shared.input_mode(n, adc);
        Ok(())
    }

    pub fn adc_get(&self, n: u8) -> Result<StateBits, EngineError> {
        self.shared.adc_get(n)
    }

    pub fn io_done_wait(&self) {
        self.shared.io_done_wait();
    }

    pub fn start_speed_feed_sync(&self, feed_per_revolution: f64) -> Result<(), EngineError> {
        self.shared.start_speed_feed_sync(feed_per_revolution)
    }

    pub fn stop_speed_feed_sync(&self) {
        self.shared.stop_speed_feed_sync();
    }

    pub fn set_mcode_callback(&self, cb: MCodeCallback) {
        *self.shared.mcode_callback.lock().unwrap() = Some(cb);
    }

    pub fn set_position_callback(&self, cb: Box<dyn Fn(Pose) + Send>) {
        *self.shared.position_callback.lock().unwrap() = Some(cb);
    }

    pub fn set_paused_callback(&self, cb: Box<dyn Fn(u32) + Send>) {
        *self.shared.paused_callback.lock().unwrap() = Some(cb);
    }

    pub fn set_estop_callback(&self, cb: Box<dyn Fn() + Send>) {
        *self.shared.estop_callback.lock().unwrap() = Some(cb);
    }

    /// Signal shutdown and join the supervisor thread (spec §4.6/§5: "the
    /// supervisor thread is joined before the USB handle is released").
    pub fn close(&self, supervisor: JoinHandle<()>) {
        self.shared.shutdown.store(true, Ordering::Release);
        let _ = supervisor.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtstep_common::config::{AxisConfig, Coordinate, TaskConfig, TrajConfig};
    use rtstep_hal::dongle::sim::SimDongle;

    fn one_axis_config() -> MachineConfig {
        MachineConfig {
            axes: vec![AxisConfig {
                name: "X".into(),
                coordinate: Coordinate::X,
                max_velocity: 1.0,
                max_acceleration: 10.0,
                steps_per_unit: 2000.0,
                backlash: 0.0,
                backlash_headroom: 1.05,
                min_pos_limit: -10.0,
                max_pos_limit: 10.0,
                step_pin: 2,
                dir_pin: 3,
                step_active_high: true,
                direction_active_high: true,
                abort_input: None,
            }],
            traj: TrajConfig {
                cycle_time: 1.0 / 1000.0,
                ..TrajConfig::default()
            },
            task: TaskConfig::default(),
        }
    }

    #[test]
    fn open_runs_set_and_reports_not_homed() {
        let dongle = Arc::new(SimDongle::new(BoardRev::F, []));
        let (session, supervisor) = Session::open(one_axis_config(), dongle).unwrap();
        assert!(!session.is_homed());
        session.close(supervisor);
    }

    #[test]
    fn home_sets_homed_flag() {
        let dongle = Arc::new(SimDongle::new(BoardRev::F, []));
        let (session, supervisor) = Session::open(one_axis_config(), dongle).unwrap();
        session.home();
        assert!(session.is_homed());
        session.close(supervisor);
    }

    #[test]
    fn estop_then_reset_clears_estop_but_not_homed_until_explicit_home() {
        let dongle = Arc::new(SimDongle::new(BoardRev::F, []));
        let (session, supervisor) = Session::open(one_axis_config(), dongle).unwrap();
        session.home();
        session.estop();
        assert!(session.is_estop());
        session.estop_reset().unwrap();
        assert!(!session.is_estop());
        assert!(!session.is_homed());
        session.close(supervisor);
    }

    #[test]
    fn cancel_clears_homed_immediately() {
        let dongle = Arc::new(SimDongle::new(BoardRev::F, []));
        let (session, supervisor) = Session::open(one_axis_config(), dongle).unwrap();
        session.home();
        session.cancel_set();
        assert!(!session.is_homed());
        session.close(supervisor);
    }

    #[test]
    fn position_set_updates_target_pose() {
        let dongle = Arc::new(SimDongle::new(BoardRev::F, []));
        let (session, supervisor) = Session::open(one_axis_config(), dongle).unwrap();
        let pose = Pose::from_parts([2.0, 0.0, 0.0], [0.0; 3], [0.0; 3]);
        session.position_set(pose);
        assert_eq!(session.position_get().x, 2.0);
        session.close(supervisor);
    }
}
