//! Property test for TC invariant 1 (spec §8): across arbitrary
//! target/velocity/acceleration combinations, `current_pos` is
//! non-decreasing and bounded by `target_pos`, and `current_vel` never
//! goes negative.

use proptest::prelude::*;
use rtstep_common::geometry::Line;
use rtstep_common::tc::{TcState, TermCond, TrajectoryCycle};

fn run_to_done(target: f64, cycle_time: f64, v_max: f64, a_max: f64) -> TrajectoryCycle {
    let line = Line::new([0.0, 0.0, 0.0], [target, 0.0, 0.0]);
    let abc = Line::new([0.0; 3], [0.0; 3]);
    let uvw = Line::new([0.0; 3], [0.0; 3]);
    let mut tc = TrajectoryCycle::new_linear(
        1,
        cycle_time,
        line,
        abc,
        uvw,
        v_max,
        a_max,
        v_max * 10.0,
        TermCond::Stop,
    );

    let mut last_pos = tc.current_pos;
    let mut cycles = 0;
    while !tc.is_done() && cycles < 1_000_000 {
        tc.update();
        assert!(
            tc.current_pos + 1e-9 >= last_pos,
            "current_pos went backwards: {} -> {}",
            last_pos,
            tc.current_pos
        );
        assert!(tc.current_pos <= target + 1e-6, "current_pos overshot target");
        assert!(tc.current_vel >= -1e-9, "current_vel went negative");
        last_pos = tc.current_pos;
        cycles += 1;
    }
    assert!(tc.is_done(), "TC failed to reach DONE within the cycle budget");
    assert_eq!(tc.state, TcState::Done);
    tc
}

proptest! {
    #[test]
    fn monotonic_and_bounded_for_arbitrary_limits(
        target in 0.0f64..1000.0,
        v_max in 0.01f64..100.0,
        a_max in 0.01f64..1000.0,
    ) {
        let cycle_time = 1.0 / 23_437.5;
        let tc = run_to_done(target, cycle_time, v_max, a_max);
        prop_assert!((tc.current_pos - target).abs() < 1e-3);
        prop_assert_eq!(tc.current_vel, 0.0);
        prop_assert_eq!(tc.current_accel, 0.0);
    }

    #[test]
    fn coincident_endpoints_complete_trivially(
        v_max in 0.01f64..100.0,
        a_max in 0.01f64..1000.0,
    ) {
        // start == end => zero-length line => targetPos <= 0 tie-break (spec §4.1).
        let line = Line::new([3.0, -1.0, 0.5], [3.0, -1.0, 0.5]);
        let abc = Line::new([0.0; 3], [0.0; 3]);
        let uvw = Line::new([0.0; 3], [0.0; 3]);
        let mut tc = TrajectoryCycle::new_linear(1, 1.0 / 1000.0, line, abc, uvw, v_max, a_max, v_max * 10.0, TermCond::Stop);
        prop_assert!(tc.is_done());
        tc.update();
        prop_assert!(tc.is_done());
        prop_assert_eq!(tc.current_vel, 0.0);
    }
}
