//! Property test for the backlash-filter bound invariant (spec §8
//! invariant 5): `|backlash_filt| <= half_backlash + eps` at every cycle,
//! for arbitrary backlash magnitude, kinematic limits, and commanded
//! direction sequences.

use proptest::prelude::*;
use rtstep_hal::backlash::BacklashFilter;

proptest! {
    #[test]
    fn offset_never_exceeds_half_backlash(
        backlash in 0.0f64..0.05,
        v_max in 0.01f64..10.0,
        a_max in 0.01f64..100.0,
        dirs in proptest::collection::vec(-1.0f64..=1.0, 1..200),
    ) {
        let mut f = BacklashFilter::new(backlash, v_max, a_max, 1.05);
        let dt = 1.0 / 1000.0;
        let half = 0.5 * backlash;
        for &d in &dirs {
            let offset = f.update(d, dt);
            prop_assert!(offset.abs() <= half + 1e-6, "offset {} exceeded half-backlash {}", offset, half);
        }
    }

    #[test]
    fn holding_direction_converges_to_target(
        backlash in 0.0f64..0.05,
        v_max in 0.01f64..10.0,
        a_max in 0.01f64..100.0,
    ) {
        let mut f = BacklashFilter::new(backlash, v_max, a_max, 1.05);
        let dt = 1.0 / 1000.0;
        for _ in 0..20_000 {
            f.update(1.0, dt);
        }
        prop_assert!((f.offset() - 0.5 * backlash).abs() < 1e-4);
    }
}
