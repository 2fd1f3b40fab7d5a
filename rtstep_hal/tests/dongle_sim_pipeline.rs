//! Exercises the encoder and the simulation dongle together as the engine
//! would: fill one request buffer with a cycle-by-cycle encoded move, then
//! submit it and check the simulated axis position lands where commanded.

use rtstep_common::protocol::{BoardRev, PIN_MAP};
use rtstep_hal::dongle::sim::{SimAxisBits, SimDongle};
use rtstep_hal::dongle::{BulkOutcome, Dongle};
use rtstep_hal::encoder::{AxisPinMap, Encoder};
use std::time::Duration;

fn x_pin() -> AxisPinMap {
    AxisPinMap {
        step_pin: 2,
        dir_pin: 3,
        step_active_high: true,
        dir_active_high: true,
        steps_per_unit: 2000.0,
        min_pos_limit: -100.0,
        max_pos_limit: 100.0,
    }
}

fn x_sim_bits() -> SimAxisBits {
    SimAxisBits {
        step_bit: PIN_MAP[2],
        dir_bit: PIN_MAP[3],
        step_active_high: true,
        dir_active_high: true,
    }
}

#[test]
fn one_inch_move_at_2000_steps_per_inch_produces_2000_step_pulses() {
    let mut enc = Encoder::new([x_pin()]);
    let mut buf = Vec::new();

    let cycle_time = 0.001;
    let feed = 1.0; // in/s
    let total_time = 1.0; // 1 inch at 1 in/s
    let cycles = (total_time / cycle_time).round() as usize;

    for i in 0..=cycles {
        let pos = (i as f64 * cycle_time * feed).min(1.0);
        enc.sample_cycle(&mut buf, &[pos]);
    }
    enc.finalize_request(&mut buf);

    assert_eq!(enc.master_index(0), Some(2000));

    let dongle = SimDongle::new(BoardRev::A, [x_sim_bits()]);
    let mut outcome = None;
    dongle
        .submit_bulk(buf, Duration::from_secs(5), Box::new(|o| outcome = Some(o)))
        .unwrap();
    assert_eq!(outcome, Some(BulkOutcome::Completed));
    assert_eq!(dongle.position(0), 2000);
}

#[test]
fn second_submission_is_rejected_while_first_in_flight_then_succeeds_after() {
    let dongle = SimDongle::new(BoardRev::A, [x_sim_bits()]);
    let step_bit = x_sim_bits().step_bit;

    let mut first_outcome = None;
    dongle
        .submit_bulk(vec![0, 0, step_bit, 0], Duration::from_secs(1), Box::new(|o| first_outcome = Some(o)))
        .unwrap();
    assert_eq!(first_outcome, Some(BulkOutcome::Completed));
    assert!(!dongle.has_in_flight());

    let mut second_outcome = None;
    dongle
        .submit_bulk(vec![0, 0], Duration::from_secs(1), Box::new(|o| second_outcome = Some(o)))
        .unwrap();
    assert_eq!(second_outcome, Some(BulkOutcome::Completed));
}

#[test]
fn board_revision_gates_query_payload_shape() {
    let old_board = SimDongle::new(BoardRev::C, std::iter::empty::<SimAxisBits>());
    let q = old_board.query().unwrap();
    assert!(q.step_count.is_some());
    assert!(q.adc.is_none());

    let new_board = SimDongle::new(BoardRev::F, std::iter::empty::<SimAxisBits>());
    let q = new_board.query().unwrap();
    assert!(q.step_count.is_none());
    assert!(q.adc.is_some());
}
