//! Motion pipeline core: session state, the trajectory-to-I/O dispatcher,
//! and the supervisor side channel (spec §1 OVERVIEW).
//!
//! This crate owns the parts of the pipeline that run regardless of which
//! `Dongle` backend (`rtstep_hal::dongle::sim::SimDongle`, or the `rt`
//! feature's `rtstep_hal::dongle::usb::UsbDongle`) is plugged in below it.
//! The G-code interpreter and any M-code plugin are external collaborators,
//! represented here only by [`command::InterpreterCommand`] and
//! [`error::MCodeCallback`].

pub mod axis;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod io_queue;
pub mod session;
pub mod supervisor;

pub mod prelude {
    pub use crate::command::{CommandKind, DispatchMode, InterpreterCommand};
    pub use crate::error::{EngineError, MCodeCallback, McodeCall};
    pub use crate::io_queue::{IoQueue, IoRequest, TransferKind};
    pub use crate::session::{ControlRequest, MachineFlags, Session};
}
