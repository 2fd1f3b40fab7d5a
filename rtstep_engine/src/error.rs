//! Engine-level error and the M-code plugin callback shape (spec §4.7,
//! §7; [`SPEC_FULL.md`] "Error handling"/"M-code plugin callback shape").
//!
//! `EngineError` wraps the fatal/local-recoverable [`ResultCode`] kinds.
//! The control-flow family (`PROGRAM_PAUSED`, end, canceled) never appears
//! here — it travels as [`rtstep_common::EngineOutcome`] on the `Ok` side
//! of every public operation's `Result`.

use rtstep_common::error::ResultCode;
use rtstep_hal::dongle::DongleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Result(#[from] ResultCode),

    #[error(transparent)]
    Dongle(#[from] DongleError),

    #[error("trajectory planner queue is full")]
    QueueFull,

    #[error("no session is open")]
    NotOpen,

    #[error("config error: {0}")]
    Config(#[from] rtstep_common::config::ConfigError),
}

/// One M-code system-command callout, handed to the registered
/// [`MCodeCallback`] for `SYSTEM_CMD` interpreter commands (spec §4.7).
#[derive(Debug, Clone)]
pub struct McodeCall {
    pub code: u32,
    pub line: u32,
    pub args: Vec<f64>,
}

/// Plugin callback signature the dispatcher invokes for `SYSTEM_CMD`;
/// the plugin itself is an external collaborator (spec §1).
pub type MCodeCallback = Box<dyn Fn(&McodeCall) -> Result<(), String> + Send>;
