//! The per-command dispatch loop (spec §4.7) plus the embedding-surface
//! entry points that drive it (`mdi_cmd`, `auto_cmd`, `verify_cmd`).
//!
//! A strictly literal reading of §4.7 — "push one line or arc, run TP
//! cycles until done, encode and enqueue one I/O request" — never gives
//! [`rtstep_common::tp::TrajectoryPlanner`]'s BLEND overlap a chance to
//! engage: that logic only activates once a second segment is already
//! queued behind the one decelerating. This dispatcher therefore collects
//! a maximal run of consecutive motion commands before draining, cutting
//! one `IoRequest` per TC id retiring rather than one per interpreter
//! command. A run of length one degrades to the literal per-command model
//! (the common STOP-terminated case). See `DESIGN.md`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rtstep_common::error::{EngineOutcome, ResultCode};
use rtstep_common::geometry::Pose;

use crate::command::{CommandKind, DispatchMode, InterpreterCommand};
use crate::error::{EngineError, McodeCall};
use crate::session::{Session, SessionShared};

impl Session {
    /// Run a single interpreter command outside of any file context (spec
    /// §6 `mdi_cmd`). Pause/resume bookkeeping still applies, mirroring
    /// `auto_cmd`'s semantics for a one-command "program".
    pub fn mdi_cmd(&self, command: &InterpreterCommand) -> Result<EngineOutcome, EngineError> {
        run_program(self, std::slice::from_ref(command), DispatchMode::Auto)
    }

    /// Run `commands` from the beginning, or from a previously saved pause
    /// point if one is set (spec §6 `auto_cmd`, §8 scenario S6).
    pub fn auto_cmd(&self, commands: &[InterpreterCommand]) -> Result<EngineOutcome, EngineError> {
        run_program(self, commands, DispatchMode::Auto)
    }

    /// Position-only preview: update the commanded end pose for each
    /// motion command without touching the trajectory planner, I/O queue,
    /// or dongle (spec §6 `verify_cmd`).
    pub fn verify_cmd(&self, commands: &[InterpreterCommand]) -> Result<EngineOutcome, EngineError> {
        run_program(self, commands, DispatchMode::Verify)
    }

    pub fn auto_cancel_set(&self) {
        self.cancel_set();
    }

    pub fn auto_cancel_clear(&self) {
        self.cancel_clear();
    }

    pub fn verify_cancel_set(&self) {
        self.cancel_set();
    }

    pub fn verify_cancel_clear(&self) {
        self.cancel_clear();
    }
}

fn run_program(
    session: &Session,
    commands: &[InterpreterCommand],
    mode: DispatchMode,
) -> Result<EngineOutcome, EngineError> {
    let shared = &session.shared;

    // Entry guard: a latched ESTOP short-circuits every new operation
    // without touching the pipeline at all (spec §8 scenario S4).
    if shared.is_estop() {
        return Ok(EngineOutcome::Canceled);
    }

    let start = if shared.is_paused() {
        let resume_after = shared.paused_at_line().unwrap_or(0);
        shared.clear_paused();
        commands
            .iter()
            .position(|c| c.line > resume_after)
            .unwrap_or(commands.len())
    } else {
        0
    };

    let mut i = start;
    while i < commands.len() {
        // Pre-command check (spec §4.7): ESTOP and CANCEL both end the run
        // gracefully (OK), they do not fail it — only a fresh call made
        // while ESTOP is already latched reports CANCELED (the guard
        // above).
        if shared.is_estop() || shared.is_cancel() {
            return Ok(EngineOutcome::Ok);
        }

        if mode == DispatchMode::Auto {
            shared.apply_backpressure();
        }

        match &commands[i].kind {
            CommandKind::LinearMove { .. } | CommandKind::CircularMove { .. } => {
                let end = collect_motion_batch(commands, i);
                if mode == DispatchMode::Verify {
                    for cmd in &commands[i..end] {
                        shared.set_target_pose_preview(end_pose(cmd));
                    }
                } else {
                    run_motion_batch(shared, &commands[i..end])?;
                }
                i = end;
            }
            CommandKind::Pause => {
                if mode == DispatchMode::Auto {
                    shared.io_done_wait();
                    if shared.is_cancel() {
                        return Ok(EngineOutcome::Ok);
                    }
                    let line = commands[i].line;
                    shared.enter_paused(line);
                    shared.invoke_paused_callback(line);
                    return Ok(EngineOutcome::Paused { line });
                }
                i += 1;
            }
            CommandKind::SetTermCond(cond) => {
                shared.set_term_cond(*cond);
                i += 1;
            }
            CommandKind::Delay(secs) => {
                if mode == DispatchMode::Auto {
                    shared.io_done_wait();
                    thread::sleep(Duration::from_secs_f64(secs.max(0.0)));
                }
                i += 1;
            }
            CommandKind::SystemCmd { code, args } => {
                if mode == DispatchMode::Auto {
                    let call = McodeCall {
                        code: *code,
                        line: commands[i].line,
                        args: args.clone(),
                    };
                    if let Err(msg) = shared.invoke_mcode_callback(&call) {
                        return Err(EngineError::Result(ResultCode::InterpreterError(msg)));
                    }
                }
                i += 1;
            }
            CommandKind::End => return Ok(EngineOutcome::End),
            CommandKind::StartSpeedFeedSync { feed_per_revolution } => {
                if mode == DispatchMode::Auto {
                    shared.start_speed_feed_sync(*feed_per_revolution)?;
                }
                i += 1;
            }
            CommandKind::StopSpeedFeedSync => {
                if mode == DispatchMode::Auto {
                    shared.stop_speed_feed_sync();
                }
                i += 1;
            }
            CommandKind::Unknown(message) => {
                tracing::warn!(message = %message, line = commands[i].line, "unrecognized interpreter command, skipping");
                i += 1;
            }
        }
    }

    Ok(EngineOutcome::Ok)
}

/// End of the maximal run of consecutive motion commands starting at
/// `start` (exclusive index).
fn collect_motion_batch(commands: &[InterpreterCommand], start: usize) -> usize {
    let mut j = start;
    while j < commands.len()
        && matches!(
            commands[j].kind,
            CommandKind::LinearMove { .. } | CommandKind::CircularMove { .. }
        )
    {
        j += 1;
    }
    j
}

fn end_pose(cmd: &InterpreterCommand) -> Pose {
    match &cmd.kind {
        CommandKind::LinearMove { end, .. } => *end,
        CommandKind::CircularMove { end, .. } => *end,
        _ => unreachable!("end_pose called on a non-motion command"),
    }
}

/// Queue every command in `cmds` (re-draining mid-batch if the TC queue
/// fills), then run the planner to completion, cutting one `IoRequest` per
/// TC id retiring.
fn run_motion_batch(shared: &Arc<SessionShared>, cmds: &[InterpreterCommand]) -> Result<(), EngineError> {
    let mut pending = Vec::with_capacity(cmds.len());

    for cmd in cmds {
        if shared.queue_full() {
            shared.drain_motion(&pending);
            pending.clear();
        }

        let feed_clip = shared.sync_feed_per_sec();
        match &cmd.kind {
            CommandKind::LinearMove { end, vel, accel } => {
                let vel = feed_clip.map_or(*vel, |f| f.min(*vel));
                shared.push_line(*end, vel, *accel, vel)?;
            }
            CommandKind::CircularMove {
                end,
                center,
                normal,
                turn,
                vel,
                accel,
            } => {
                let vel = feed_clip.map_or(*vel, |f| f.min(*vel));
                shared.push_circle(*end, *center, *normal, *turn, vel, *accel, vel)?;
            }
            _ => unreachable!("run_motion_batch called on a non-motion command"),
        }
        pending.push((cmd.line, end_pose(cmd)));
    }

    if !pending.is_empty() {
        shared.drain_motion(&pending);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtstep_common::config::{AxisConfig, Coordinate, MachineConfig, TaskConfig, TrajConfig};
    use rtstep_common::protocol::BoardRev;
    use rtstep_common::tc::TermCond;
    use rtstep_hal::dongle::sim::SimDongle;

    fn one_axis_config() -> MachineConfig {
        MachineConfig {
            axes: vec![AxisConfig {
                name: "X".into(),
                coordinate: Coordinate::X,
                max_velocity: 1.0,
                max_acceleration: 10.0,
                steps_per_unit: 200.0,
                backlash: 0.0,
                backlash_headroom: 1.05,
                min_pos_limit: -100.0,
                max_pos_limit: 100.0,
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

    fn linear(line: u32, x: f64) -> InterpreterCommand {
        InterpreterCommand {
            line,
            kind: CommandKind::LinearMove {
                end: Pose::from_parts([x, 0.0, 0.0], [0.0; 3], [0.0; 3]),
                vel: 1.0,
                accel: 10.0,
            },
        }
    }

    #[test]
    fn single_line_program_reaches_end_and_advances_position() {
        let dongle = Arc::new(SimDongle::new(BoardRev::F, []));
        let (session, supervisor) = Session::open(one_axis_config(), dongle).unwrap();
        session.home();
        let commands = vec![linear(1, 1.0), InterpreterCommand { line: 2, kind: CommandKind::End }];
        let outcome = session.auto_cmd(&commands).unwrap();
        assert_eq!(outcome, EngineOutcome::End);
        assert!((session.position_get().x - 1.0).abs() < 1e-3);
        session.close(supervisor);
    }

    #[test]
    fn pause_returns_paused_outcome_and_resumes_after() {
        let dongle = Arc::new(SimDongle::new(BoardRev::F, []));
        let (session, supervisor) = Session::open(one_axis_config(), dongle).unwrap();
        session.home();
        let commands = vec![
            linear(1, 1.0),
            InterpreterCommand { line: 2, kind: CommandKind::Pause },
            linear(3, 2.0),
            InterpreterCommand { line: 4, kind: CommandKind::End },
        ];
        let outcome = session.auto_cmd(&commands).unwrap();
        assert_eq!(outcome, EngineOutcome::Paused { line: 2 });

        let outcome2 = session.auto_cmd(&commands).unwrap();
        assert_eq!(outcome2, EngineOutcome::End);
        assert!((session.position_get().x - 2.0).abs() < 1e-3);
        session.close(supervisor);
    }

    #[test]
    fn cancel_mid_program_ends_run_with_ok_and_clears_homed() {
        let dongle = Arc::new(SimDongle::new(BoardRev::F, []));
        let (session, supervisor) = Session::open(one_axis_config(), dongle).unwrap();
        session.home();
        session.cancel_set();
        let commands = vec![linear(1, 1.0), InterpreterCommand { line: 2, kind: CommandKind::End }];
        let outcome = session.auto_cmd(&commands).unwrap();
        assert_eq!(outcome, EngineOutcome::Ok);
        assert!(!session.is_homed());
        session.close(supervisor);
    }

    #[test]
    fn estop_before_call_returns_canceled_immediately() {
        let dongle = Arc::new(SimDongle::new(BoardRev::F, []));
        let (session, supervisor) = Session::open(one_axis_config(), dongle).unwrap();
        session.estop();
        let commands = vec![linear(1, 1.0)];
        let outcome = session.auto_cmd(&commands).unwrap();
        assert_eq!(outcome, EngineOutcome::Canceled);
        session.close(supervisor);
    }

    #[test]
    fn verify_mode_updates_position_without_driving_io() {
        let dongle = Arc::new(SimDongle::new(BoardRev::F, []));
        let (session, supervisor) = Session::open(one_axis_config(), dongle).unwrap();
        session.home();
        let commands = vec![linear(1, 5.0)];
        let outcome = session.verify_cmd(&commands).unwrap();
        assert_eq!(outcome, EngineOutcome::Ok);
        assert!((session.position_get().x - 5.0).abs() < 1e-9);
        session.close(supervisor);
    }

    #[test]
    fn blend_batch_runs_two_segments_through_one_drain() {
        let dongle = Arc::new(SimDongle::new(BoardRev::F, []));
        let (session, supervisor) = Session::open(one_axis_config(), dongle).unwrap();
        session.home();
        let commands = vec![
            InterpreterCommand { line: 1, kind: CommandKind::SetTermCond(TermCond::Blend) },
            linear(2, 1.0),
            linear(3, 2.0),
            InterpreterCommand { line: 4, kind: CommandKind::End },
        ];
        let outcome = session.auto_cmd(&commands).unwrap();
        assert_eq!(outcome, EngineOutcome::End);
        assert!((session.position_get().x - 2.0).abs() < 1e-3);
        session.close(supervisor);
    }
}
