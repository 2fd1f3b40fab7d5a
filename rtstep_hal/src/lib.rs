//! rt-stepper hardware abstraction layer.
//!
//! Bridges the planner's scalar per-axis positions (`rtstep_common::tc`) to
//! the dongle's bit-plane step/direction wire format, by way of the
//! per-axis backlash ramp generator, and ships two interchangeable dongle
//! backends: an in-memory simulation and a real USB device driven through
//! `rusb` (behind the `rt` feature).
//!
//! # Module Structure
//!
//! - [`backlash`] - per-axis S-curve backlash-compensation ramp
//! - [`encoder`] - bit-plane step/direction encoder with pulse stretching
//! - [`dongle`] - the `Dongle` trait and its simulation/USB backends

pub mod backlash;
pub mod dongle;
pub mod encoder;

pub mod prelude {
    pub use crate::backlash::BacklashFilter;
    pub use crate::dongle::{transfer_timeout, BulkCallback, BulkOutcome, Dongle, DongleError, DongleQuery};
    pub use crate::encoder::{AxisPinMap, Encoder};
}
