//! Property-based tests for the patience rule.
//!
//! Invariants checked for arbitrary accuracy histories:
//! - training never halts before `patience + 1` epochs
//! - a strictly decreasing history halts at exactly `patience + 1`
//! - halting happens at the first epoch where the trailing window of
//!   `patience` accuracies is non-increasing
//! - a strictly increasing history never halts

use jkgat_nn::EarlyStopping;
use proptest::prelude::*;

/// Length of the non-increasing run that ends at the last element.
fn trailing_run(history: &[f64]) -> usize {
    let mut run = 1;
    for w in history.windows(2).rev() {
        if w[0] >= w[1] {
            run += 1;
        } else {
            break;
        }
    }
    run
}

fn accuracies(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    // Accuracies on a 1/20 grid so ties are common.
    prop::collection::vec((0u32..=20).prop_map(|k| f64::from(k) / 20.0), 1..max_len)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn never_halts_before_patience(patience in 1usize..12, history in accuracies(40)) {
        let stop = EarlyStopping::new(patience);
        if let Some(epoch) = stop.halting_epoch(&history) {
            prop_assert!(epoch > patience);
        }
    }

    #[test]
    fn decreasing_history_halts_at_patience(patience in 1usize..12, start in 0.5f64..1.0) {
        let history: Vec<f64> = (0..patience + 5).map(|i| start - 0.01 * i as f64).collect();
        let stop = EarlyStopping::new(patience);
        prop_assert_eq!(stop.halting_epoch(&history), Some(patience + 1));
    }

    #[test]
    fn halts_when_trailing_run_reaches_patience(patience in 1usize..12, history in accuracies(40)) {
        let stop = EarlyStopping::new(patience);
        let expected = (patience + 1..=history.len())
            .find(|&len| trailing_run(&history[..len]) >= patience);
        prop_assert_eq!(stop.halting_epoch(&history), expected);
    }

    #[test]
    fn increasing_history_runs_to_completion(patience in 2usize..12, len in 1usize..40) {
        let history: Vec<f64> = (0..len).map(|i| i as f64 / 100.0).collect();
        prop_assert_eq!(EarlyStopping::new(patience).halting_epoch(&history), None);
    }
}

#[test]
fn halts_on_plateau_after_improvement() {
    // 0-based epochs 3..=5 are flat: the window [0.7, 0.7, 0.7] closes at epoch 5.
    let history = [0.3, 0.5, 0.6, 0.7, 0.7, 0.7, 0.8];
    assert_eq!(EarlyStopping::new(3).halting_epoch(&history), Some(6));
}
