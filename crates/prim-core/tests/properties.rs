//! Property-based tests for apply/map
//! Outcomes are positional: what happens at position i depends only on element i.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use proptest::prelude::*;
use prim_core::{apply_elementwise, map_elementwise, Context, LimitedPool, PrimError, SubmitOptions};

/// One pool for every case; building a thread pool per case is wasted time.
fn shared_pool() -> &'static LimitedPool {
    static POOL: OnceLock<LimitedPool> = OnceLock::new();
    POOL.get_or_init(|| LimitedPool::new("proptest", 4).expect("pool"))
}

fn scale(v: &i64) -> i64 {
    v.wrapping_mul(3).wrapping_add(1)
}

fn failing_at(failing: &BTreeSet<usize>) -> impl Fn(&Context, &(usize, i64)) -> Result<i64, PrimError> + Sync + '_ {
    move |_, (index, v)| {
        if failing.contains(index) {
            Err(PrimError::msg(format!("fail@{}", index)))
        } else {
            Ok(scale(v))
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: when every transform succeeds, apply equals the sequential map
    /// and reports no error.
    #[test]
    fn prop_apply_all_succeed_matches_sequential(items in prop::collection::vec(any::<i64>(), 0..200)) {
        let expected: Vec<i64> = items.iter().map(scale).collect();
        let mut actual = items.clone();
        let result = apply_elementwise(
            &Context::background(),
            &mut actual,
            |_, v: &i64| Ok(scale(v)),
            Some(shared_pool()),
            &SubmitOptions::default(),
        );
        prop_assert!(result.is_ok());
        prop_assert_eq!(actual, expected);
    }

    /// Property: failing positions keep their input, others are transformed,
    /// and the error names one of the failing positions.
    #[test]
    fn prop_apply_failures_are_positional(
        values in prop::collection::vec(any::<i64>(), 1..150),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 0..5),
    ) {
        let failing: BTreeSet<usize> = picks.iter().map(|p| p.index(values.len())).collect();
        let mut items: Vec<(usize, i64)> = values.iter().copied().enumerate().collect();
        let fail = failing_at(&failing);

        let result = apply_elementwise(
            &Context::background(),
            &mut items,
            |ctx, item: &(usize, i64)| fail(ctx, item).map(|v| (item.0, v)),
            Some(shared_pool()),
            &SubmitOptions::default(),
        );

        for (index, (pos, v)) in items.iter().enumerate() {
            prop_assert_eq!(*pos, index);
            if failing.contains(&index) {
                prop_assert_eq!(*v, values[index]);
            } else {
                prop_assert_eq!(*v, scale(&values[index]));
            }
        }
        match result {
            Ok(()) => prop_assert!(failing.is_empty()),
            Err(err) => {
                let names: Vec<String> = failing.iter().map(|i| format!("fail@{}", i)).collect();
                prop_assert!(names.contains(&err.to_string()), "unexpected error {}", err);
            }
        }
    }

    /// Property: map never touches its input and leaves `R::default()` at
    /// failing positions.
    #[test]
    fn prop_map_defaults_at_failures(
        values in prop::collection::vec(any::<i64>(), 1..150),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 0..5),
    ) {
        let failing: BTreeSet<usize> = picks.iter().map(|p| p.index(values.len())).collect();
        let items: Vec<(usize, i64)> = values.iter().copied().enumerate().collect();
        let before = items.clone();

        let results = match map_elementwise(
            &Context::background(),
            &items,
            failing_at(&failing),
            Some(shared_pool()),
            &SubmitOptions::default(),
        ) {
            Ok(results) => {
                prop_assert!(failing.is_empty());
                results
            }
            Err(err) => {
                prop_assert!(!failing.is_empty());
                prop_assert!(!err.error().is_cancellation());
                err.into_results()
            }
        };

        prop_assert_eq!(&items, &before);
        prop_assert_eq!(results.len(), values.len());
        for (index, r) in results.iter().enumerate() {
            if failing.contains(&index) {
                prop_assert_eq!(*r, 0);
            } else {
                prop_assert_eq!(*r, scale(&values[index]));
            }
        }
    }

    /// Property: the identity transform leaves the collection identical.
    #[test]
    fn prop_identity_round_trip(items in prop::collection::vec(".{0,12}", 0..100)) {
        let mut actual = items.clone();
        apply_elementwise(
            &Context::background(),
            &mut actual,
            |_, s: &String| Ok(s.clone()),
            Some(shared_pool()),
            &SubmitOptions::default(),
        ).unwrap();
        prop_assert_eq!(actual, items);
    }
}
