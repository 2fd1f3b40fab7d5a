//! The interpreter command shape the dispatcher consumes (spec §1, §4.7).
//!
//! The G-code interpreter itself is an explicit external collaborator —
//! this module defines nothing about parsing G-code, only the ordered list
//! of motion/IO/system operations a dispatcher-driven run consumes, one per
//! source line.

use rtstep_common::geometry::{Pose, Vector3};
use rtstep_common::tc::TermCond;

/// One interpreter-emitted operation, tagged with its 1-based source line
/// number for pause/resume bookkeeping (spec §4.7, §8 scenario S6).
#[derive(Debug, Clone)]
pub struct InterpreterCommand {
    pub line: u32,
    pub kind: CommandKind,
}

#[derive(Debug, Clone)]
pub enum CommandKind {
    LinearMove {
        end: Pose,
        vel: f64,
        accel: f64,
    },
    CircularMove {
        end: Pose,
        center: Vector3,
        normal: Vector3,
        turn: i32,
        vel: f64,
        accel: f64,
    },
    /// M0/M1/M60.
    Pause,
    /// G64 (`Blend`) / G61 (`Stop`).
    SetTermCond(TermCond),
    /// G4 dwell, seconds.
    Delay(f64),
    /// Any M-code handled by the registered plugin rather than natively.
    SystemCmd { code: u32, args: Vec<f64> },
    /// M2/M30.
    End,
    StartSpeedFeedSync { feed_per_revolution: f64 },
    StopSpeedFeedSync,
    /// An interpreter op this build doesn't recognize — logged and
    /// treated as OK so older command lists keep running (spec §7
    /// "never-propagated-up").
    Unknown(String),
}

/// Whether the dispatcher should drive the full pipeline or only preview
/// the resulting position (spec §4.7 "auto mode" vs "verify mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Auto,
    Verify,
}
