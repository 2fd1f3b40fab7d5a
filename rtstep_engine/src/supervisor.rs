//! Supervisor thread: polls dongle state every `SUPERVISOR_POLL_INTERVAL`
//! and drains the out-of-band control-request queue (spec §4.6, §5).
//!
//! This thread never touches the trajectory planner or I/O queue directly
//! — its job is the slow, synchronous side channel (state bits, icount,
//! digital I/O) that runs alongside the 1kHz motion pipeline.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rtstep_common::consts::SUPERVISOR_POLL_INTERVAL;

use crate::session::{ControlRequest, SessionShared};

/// Start the supervisor thread for `shared`, returning its `JoinHandle`.
/// The thread runs until [`super::session::Session::close`] sets the
/// shutdown flag.
pub(crate) fn spawn(shared: Arc<SessionShared>) -> JoinHandle<()> {
    thread::spawn(move || {
        while !shared.shutdown.load(Ordering::Acquire) {
            match shared.dongle.query() {
                Ok(q) => {
                    shared.apply_supervisor_poll(q.state_bits, q.icount_period);
                    drain_control_requests(&shared);
                }
                Err(e) => {
                    tracing::error!(error = %e, "supervisor poll failed, raising estop");
                    shared.dongle_disconnected();
                }
            }
            thread::sleep(SUPERVISOR_POLL_INTERVAL);
        }
    })
}

fn drain_control_requests(shared: &Arc<SessionShared>) {
    while let Some(req) = shared.pop_control_request() {
        let result = match req {
            ControlRequest::OutputSet(n) => shared.dongle.output_set(n),
            ControlRequest::OutputClear(n) => shared.dongle.output_clear(n),
            ControlRequest::OutputMode { n, pwm } => shared.dongle.output_mode(n, pwm),
            ControlRequest::OutputPwm { n, duty } => shared.dongle.output_pwm(n, duty),
            ControlRequest::InputMode { n, adc } => shared.dongle.input_mode(n, adc),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "control request failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtstep_common::protocol::BoardRev;
    use rtstep_hal::dongle::sim::SimDongle;

    #[test]
    fn drain_control_requests_applies_queued_output_set() {
        let dongle: Arc<dyn rtstep_hal::dongle::Dongle> = Arc::new(SimDongle::new(BoardRev::F, []));
        // Exercised indirectly through Session in session::tests; this test
        // only checks the sim backend itself accepts the request shape.
        assert!(dongle.output_set(0).is_ok());
    }
}
