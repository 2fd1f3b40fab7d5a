//! Shared result-code taxonomy (spec §7).
//!
//! Distinguishes local/recoverable errors, control-flow results, and fatal
//! errors. Control-flow results (`PROGRAM_PAUSED`, program-end,
//! I/O-canceled) are folded into [`EngineOutcome`] as non-error OK-family
//! values rather than `Result::Err`, per the design note that exceptions
//! should not conflate control flow with failure.

use thiserror::Error;

/// Local/recoverable, and fatal-to-current-run result codes.
///
/// `UnknownMessage` is deliberately never propagated as an error by callers —
/// it is logged and treated as OK so that programs keep running in the
/// presence of interpreter ops newer than this build knows about.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResultCode {
    /// USB device unavailable (not found, permission denied, busy).
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A control or bulk transfer exceeded its timeout.
    #[error("I/O timeout")]
    IoTimeout,

    /// A control transfer failed for a reason other than timeout.
    #[error("control request error: {0}")]
    ControlRequest(String),

    /// Output pin number out of range for the configured dongle.
    #[error("invalid output number: {0}")]
    InvalidOutputNum(u8),

    /// Input pin number out of range for the configured dongle.
    #[error("invalid input number: {0}")]
    InvalidInputNum(u8),

    /// G-code file could not be opened or read.
    #[error("invalid G-code file: {0}")]
    InvalidGcodeFile(String),

    /// Interpreter reported a fatal error for the current run.
    #[error("interpreter error: {0}")]
    InterpreterError(String),

    /// Device disconnected mid-transfer.
    #[error("device disconnected")]
    Disconnected,

    /// Bulk transfer reported STALL.
    #[error("transfer stall")]
    TransferStall,

    /// Bulk transfer reported a generic error.
    #[error("transfer error: {0}")]
    TransferError(String),

    /// Bulk transfer reported buffer overflow.
    #[error("transfer overflow")]
    TransferOverflow,

    /// Unrecognized interpreter message kind — never propagated as a
    /// failure, logged and treated as OK by the dispatcher.
    #[error("unknown message type: {0}")]
    UnknownMessage(String),
}

/// Control-flow family, folded into the success path.
///
/// A dispatcher operation returns `Ok(EngineOutcome::...)`, never
/// `Err(ResultCode::ProgramPaused)` — pause, end, and cancellation are
/// normal outcomes of running a program, not failures.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutcome {
    /// The operation ran to completion with nothing unusual to report.
    Ok,
    /// The program hit M0/M1/M60 and is paused at the given source line.
    /// A later `auto_cmd` on the same file resumes from here.
    Paused {
        /// 1-based source line number to resume from.
        line: u32,
    },
    /// The program reached M2/M30 and ended normally.
    End,
    /// The operation was cut short by user cancel or estop.
    Canceled,
}

impl EngineOutcome {
    /// True for [`EngineOutcome::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, EngineOutcome::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_is_ok_only_for_ok_variant() {
        assert!(EngineOutcome::Ok.is_ok());
        assert!(!EngineOutcome::Paused { line: 12 }.is_ok());
        assert!(!EngineOutcome::End.is_ok());
        assert!(!EngineOutcome::Canceled.is_ok());
    }

    #[test]
    fn result_code_display_carries_detail() {
        let e = ResultCode::InvalidOutputNum(9);
        assert!(e.to_string().contains('9'));
    }
}
