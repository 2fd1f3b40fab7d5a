//! Binary-boundary error type: wraps every lower-crate error plus the
//! handful of failure modes unique to loading a config/program file from
//! disk and parsing the exercising-program format (see [`crate::program`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] rtstep_common::config::ConfigError),

    #[error(transparent)]
    Engine(#[from] rtstep_engine::error::EngineError),

    #[error(transparent)]
    Dongle(#[from] rtstep_hal::dongle::DongleError),

    #[error("program line {line}: {message}")]
    Program { line: u32, message: String },

    #[error("the `usb` driver requires this binary to be built with --features rt")]
    UsbFeatureDisabled,

    #[error("no rt-stepper dongle found (vid={vid:#06x} pid={pid:#06x})")]
    UsbNotFound { vid: u16, pid: u16 },
}
