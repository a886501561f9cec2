//! Property tests: progress discipline and privacy preservation under
//! randomized inputs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use kanon::SharedProgressListener;

use crate::dataset::{ragged_ages, DatasetBuilder, AGE_HIERARCHY};

fn recording() -> (SharedProgressListener, Arc<Mutex<Vec<f64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let listener: SharedProgressListener = {
        let seen = Arc::clone(&seen);
        Arc::new(move |progress: f64| seen.lock().expect("no poison").push(progress))
    };
    (listener, seen)
}

#[test]
fn batched_iteration_reports_monotone_progress() {
    let result = ragged_ages().anonymize(2, 0.4);
    let handle = result.output().expect("no lock").expect("available");
    let (listener, seen) = recording();

    result
        .optimize_iterative_fast_with(&handle, 0.5, f64::NAN, listener)
        .expect("iteration runs");

    let seen = seen.lock().expect("no poison");
    assert_eq!(seen.first(), Some(&0.0));
    assert_eq!(seen.last(), Some(&1.0));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress regressed: {seen:?}");
    assert!(seen.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn single_step_reports_monotone_progress() {
    let result = ragged_ages().anonymize(2, 0.4);
    let handle = result.output().expect("no lock").expect("available");
    let (listener, seen) = recording();

    result
        .optimize_with(&handle, 0.5, listener)
        .expect("step runs");

    let seen = seen.lock().expect("no poison");
    assert!(!seen.is_empty());
    assert_eq!(seen.last(), Some(&1.0));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress regressed: {seen:?}");
}

/// Ages drawn from the hierarchy's domain.
const AGE_POOL: [&str; 7] = ["25", "31", "36", "52", "57", "77", "78"];

fn build(ages: &[usize]) -> DatasetBuilder {
    let mut builder = DatasetBuilder::new(&["age"]).quasi_identifier("age", AGE_HIERARCHY);
    for &index in ages {
        builder = builder.row(&[AGE_POOL[index]]);
    }
    builder
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// One local-recoding step never increases the outlier count, returns
    /// exactly the decrease it produced, and leaves every released row in a
    /// class of at least k rows.
    #[test]
    fn recoding_preserves_privacy(ages in proptest::collection::vec(0usize..7, 2..12)) {
        let result = build(&ages).anonymize(2, 1.0);
        let handle = result.output().expect("no lock").expect("always satisfiable");
        let before = handle.outlier_count();

        if result.is_optimizable(&handle) {
            let optimized = result.optimize(&handle).expect("in-memory step");
            prop_assert_eq!(handle.outlier_count(), before - optimized);
        }

        let mut classes: HashMap<String, usize> = HashMap::new();
        for row in 0..handle.num_rows() {
            if handle.is_outlier(row) {
                continue;
            }
            let value = handle.value(row, "age").expect("decodable");
            *classes.entry(value).or_insert(0) += 1;
        }
        for (value, size) in classes {
            prop_assert!(size >= 2, "class '{}' of size {} violates k = 2", value, size);
        }
    }

    /// Iterative refinement terminates within the iteration cap and never
    /// loses privacy.
    #[test]
    fn iteration_terminates_and_preserves_privacy(
        ages in proptest::collection::vec(0usize..7, 2..12),
        adaption in 0.0f64..=0.5,
    ) {
        let result = build(&ages).anonymize(2, 1.0);
        let handle = result.output().expect("no lock").expect("always satisfiable");
        let before = handle.outlier_count();

        result
            .optimize_iterative(&handle, 0.0, 4, adaption)
            .expect("bounded iteration");

        prop_assert!(handle.outlier_count() <= before);
    }
}
