//! Fix-rate properties
//!
//! Tenet: every reported rate stays inside its range for any input the
//! fixer can produce, including over-reported fix counts.

use mend_core::FixRateWeights;
use mend_verify::rates::{file_fix_rate, remaining_count, FileTally, FixRateCalculator};
use proptest::prelude::*;

fn tally() -> impl Strategy<Value = FileTally> {
    (0usize..200, 0usize..250, 0usize..50, any::<bool>(), any::<bool>()).prop_map(
        |(original, fixed, new, compiled, tests_passed)| FileTally {
            original,
            fixed,
            new,
            compiled,
            tests_passed,
        },
    )
}

proptest! {
    #[test]
    fn total_fix_rate_is_a_percentage(tallies in proptest::collection::vec(tally(), 0..20)) {
        let rates = FixRateCalculator::default().aggregate(&tallies);
        for value in [
            rates.traditional_fix_rate,
            rates.dynamic_fix_rate,
            rates.total_fix_rate,
            rates.weighted_fix_rate,
        ] {
            prop_assert!((0.0..=100.0).contains(&value), "{rates:?}");
        }
        prop_assert!((0.0..=1.0).contains(&rates.compile_rate));
        prop_assert!((0.0..=1.0).contains(&rates.test_rate));
    }

    #[test]
    fn custom_weights_stay_in_range(
        tallies in proptest::collection::vec(tally(), 1..10),
        traditional in 0.0f64..1.0,
        share in 0.0f64..1.0,
    ) {
        let weights = FixRateWeights {
            traditional,
            dynamic: 1.0 - traditional,
            compile_share: share,
            remaining_penalty: 1.2,
        };
        let rates = FixRateCalculator::new(weights).aggregate(&tallies);
        prop_assert!((0.0..=100.0).contains(&rates.total_fix_rate));
    }

    #[test]
    fn remaining_never_exceeds_original(original in 0usize..500, fixed in 0usize..600) {
        let remaining = remaining_count(original, fixed);
        prop_assert!(remaining <= original);
        prop_assert_eq!(remaining, original.saturating_sub(fixed));
    }

    #[test]
    fn file_rate_is_a_percentage(fixed in 0usize..300, original in 0usize..300, new in 0usize..300) {
        let rate = file_fix_rate(fixed, original, new);
        prop_assert!((0.0..=100.0).contains(&rate));
    }
}
