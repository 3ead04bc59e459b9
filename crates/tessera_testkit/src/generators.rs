//! Property-based test generators using proptest.
//!
//! Provides strategies for object sets, readiness scripts and workloads,
//! plus the outcome a scripted transaction must reach.

use proptest::prelude::*;
use tessera_core::Outcome;

/// Strategy for generating short object names.
///
/// Drawn from a small alphabet so that random transactions overlap often.
pub fn object_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e]{1,2}").expect("Invalid regex")
}

/// Strategy for generating the object set of one transaction.
pub fn object_set_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(object_name_strategy(), 1..=max.max(1))
        .prop_map(|set| set.into_iter().collect())
}

/// Strategy for generating a workload: a sequence of transactions given as
/// object sets.
pub fn workload_strategy(
    transactions: usize,
    objects_per_txn: usize,
) -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(object_set_strategy(objects_per_txn), 1..=transactions.max(1))
}

/// When an instruction fires its signal, in milliseconds after commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyPlan {
    /// Reports ready at the given tick.
    ReadyAt(u64),
    /// Never reports.
    Never,
    /// Cancels at the given tick.
    CancelAt(u64),
}

impl ReadyPlan {
    /// Returns the tick this plan fires at, if any.
    pub fn tick(self) -> Option<u64> {
        match self {
            Self::ReadyAt(tick) | Self::CancelAt(tick) => Some(tick),
            Self::Never => None,
        }
    }
}

/// Strategy for generating one instruction's plan within `horizon_ms`.
pub fn ready_plan_strategy(horizon_ms: u64) -> impl Strategy<Value = ReadyPlan> {
    prop_oneof![
        6 => (0..=horizon_ms).prop_map(ReadyPlan::ReadyAt),
        1 => Just(ReadyPlan::Never),
        1 => (0..=horizon_ms).prop_map(ReadyPlan::CancelAt),
    ]
}

/// Strategy for generating the plans of one transaction.
pub fn ready_plans_strategy(
    instructions: usize,
    horizon_ms: u64,
) -> impl Strategy<Value = Vec<ReadyPlan>> {
    prop::collection::vec(ready_plan_strategy(horizon_ms), 1..=instructions.max(1))
}

/// Returns the outcome a committed transaction reaches when its
/// instructions follow `plans` and it times out after `timeout_ms`.
///
/// Signals fired at a tick are observed before the timeout check at the
/// same tick; a cancel observed together with the last ready wins.
pub fn expected_outcome(plans: &[ReadyPlan], timeout_ms: u64) -> Outcome {
    let cancel_at = plans
        .iter()
        .filter_map(|plan| match plan {
            ReadyPlan::CancelAt(tick) => Some(*tick),
            _ => None,
        })
        .min();
    let all_ready_at = plans
        .iter()
        .map(|plan| match plan {
            ReadyPlan::ReadyAt(tick) => Some(*tick),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .map(|ticks| ticks.into_iter().max().unwrap_or(0));

    match (cancel_at, all_ready_at) {
        (Some(cancel), _) if cancel <= timeout_ms => Outcome::Cancelled,
        (None, Some(ready)) if ready <= timeout_ms => Outcome::Ready,
        _ => Outcome::TimedOut,
    }
}

/// Configuration for property-based tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_outcome_cases() {
        use ReadyPlan::*;
        assert_eq!(expected_outcome(&[ReadyAt(0), ReadyAt(99)], 100), Outcome::Ready);
        assert_eq!(expected_outcome(&[ReadyAt(100)], 100), Outcome::Ready);
        assert_eq!(expected_outcome(&[ReadyAt(101)], 100), Outcome::TimedOut);
        assert_eq!(expected_outcome(&[ReadyAt(5), Never], 100), Outcome::TimedOut);
        assert_eq!(expected_outcome(&[ReadyAt(5), CancelAt(50)], 100), Outcome::Cancelled);
        assert_eq!(expected_outcome(&[CancelAt(150)], 100), Outcome::TimedOut);
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn object_sets_are_unique_and_bounded(set in object_set_strategy(4)) {
            prop_assert!(!set.is_empty() && set.len() <= 4);
            let mut sorted = set.clone();
            sorted.dedup();
            prop_assert_eq!(sorted, set);
        }

        #[test]
        fn plans_stay_within_horizon(plans in ready_plans_strategy(5, 150)) {
            for plan in plans {
                if let Some(tick) = plan.tick() {
                    prop_assert!(tick <= 150);
                }
            }
        }
    }
}
