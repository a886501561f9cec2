//! End-to-end scenarios: handle protocol, local recoding, rollback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kanon::{KanonError, NoopListener, SharedProgressListener};

use crate::dataset::{adaption_ages, clean_ages, ragged_ages};

fn recording() -> (SharedProgressListener, Arc<Mutex<Vec<f64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let listener: SharedProgressListener = {
        let seen = Arc::clone(&seen);
        Arc::new(move |progress: f64| seen.lock().expect("no poison").push(progress))
    };
    (listener, seen)
}

fn silent() -> SharedProgressListener {
    Arc::new(NoopListener)
}

// --- Handle protocol ---

#[test]
fn cached_handle_is_reused_until_released() {
    let result = clean_ages().anonymize(2, 0.0);
    let node = result.global_optimum().expect("satisfiable").clone();

    let first = result.output().expect("no lock").expect("available");
    let second = result.output_for(&node).expect("cache hit");
    assert!(Arc::ptr_eq(&first, &second), "one materialization, one handle");

    first.release();
    let unforked = result
        .output_for_fork(&node, false)
        .expect("lock acquired after release");
    assert!(result.registry().is_locked());
    unforked.release();
    assert!(!result.registry().is_locked());
}

#[test]
fn fork_is_rejected_while_locked_and_state_is_unchanged() {
    let result = clean_ages().anonymize(2, 0.0);
    let node = result.global_optimum().expect("satisfiable").clone();

    let locked = result.output_for_fork(&node, false).expect("lock free");
    let err = result.output_for(&node).unwrap_err();
    assert!(matches!(err, KanonError::BufferLocked));

    // The registry still points at the same locked handle.
    let (held, held_node) = result.registry().locked().expect("still locked");
    assert!(Arc::ptr_eq(&held, &locked));
    assert_eq!(held_node, node.id());
}

#[test]
fn forked_outputs_of_other_nodes_are_isolated() {
    let result = ragged_ages().anonymize(2, 0.4);
    let optimum = result.global_optimum().expect("satisfiable").clone();
    let top = result.lattice().node(&[2]).expect("in range");

    let target = result.output_for(&optimum).expect("first fork");
    let bystander = result.output_for(&top).expect("second fork");
    let bystander_before = bystander.buffer_fingerprint();

    assert!(result.optimize(&target).expect("step runs") > 0);
    assert_eq!(bystander.buffer_fingerprint(), bystander_before);
}

// --- Local recoding ---

#[test]
fn zero_outliers_leave_the_buffer_untouched() {
    let result = clean_ages().anonymize(2, 0.0);
    let handle = result.output().expect("no lock").expect("available");
    assert_eq!(handle.outlier_count(), 0);
    assert!(!result.is_optimizable(&handle));

    let before = handle.buffer_fingerprint();
    assert_eq!(result.optimize(&handle).expect("no-op"), 0);
    assert_eq!(result.optimize_fast(&handle, 0.5).expect("no-op"), 0);
    assert_eq!(handle.buffer_fingerprint(), before);
    assert!(!handle.is_optimized());
}

#[test]
fn record_bounded_step_recodes_the_outliers() {
    let result = ragged_ages().anonymize(2, 0.4);
    let handle = result.output().expect("no lock").expect("available");
    let before = handle.outlier_count();
    assert_eq!(before, 2);

    let optimized = result.optimize_fast(&handle, 0.5).expect("step runs");
    assert_eq!(optimized, 2);
    assert_eq!(handle.outlier_count(), before - optimized);
    assert!(handle.is_optimized());
}

#[test]
fn optimized_rows_still_satisfy_the_model() {
    let result = ragged_ages().anonymize(2, 0.4);
    let handle = result.output().expect("no lock").expect("available");
    assert!(result.optimize(&handle).expect("step runs") > 0);

    // Every released (non-suppressed) row must sit in a class of >= k rows
    // of the same generalized quasi-identifier value.
    let mut classes: HashMap<String, usize> = HashMap::new();
    for row in 0..handle.num_rows() {
        if handle.is_outlier(row) {
            continue;
        }
        let age = handle.value(row, "age").expect("decodable");
        *classes.entry(age).or_insert(0) += 1;
    }
    assert!(!classes.is_empty());
    for (value, size) in classes {
        assert!(size >= 2, "class '{value}' of size {size} violates k = 2");
    }
}

#[test]
fn second_step_after_fixpoint_stays_at_zero() {
    let result = ragged_ages().anonymize(2, 0.4);
    let handle = result.output().expect("no lock").expect("available");
    assert!(result.optimize(&handle).expect("first step") > 0);

    // Nothing optimizable remains: repeated steps are no-ops.
    assert_eq!(result.optimize(&handle).expect("fixpoint"), 0);
    assert_eq!(result.optimize(&handle).expect("still fixpoint"), 0);
}

#[test]
fn wrong_input_data_is_rejected_before_any_mutation() {
    let recoder = ragged_ages().anonymize(2, 0.4);
    let other = clean_ages().anonymize(2, 0.0);
    let foreign = other.output().expect("no lock").expect("available");

    let before = foreign.buffer_fingerprint();
    let err = recoder.optimize(&foreign).unwrap_err();
    assert!(matches!(err, KanonError::WrongInputData));
    assert_eq!(foreign.buffer_fingerprint(), before);
}

// --- Adaption escape ---

#[test]
fn adaption_unlocks_recoding_at_higher_factor() {
    let result = adaption_ages().anonymize(2, 1.0);
    let handle = result.output().expect("no lock").expect("available");
    assert_eq!(handle.outlier_count(), 3);

    // Suppression-leaning factors keep every outlier suppressed; at 0.5 the
    // two band-mates are recoded into their shared level-1 class.
    assert_eq!(result.optimize_with(&handle, 0.0, silent()).expect("step"), 0);
    assert_eq!(result.optimize_with(&handle, 0.25, silent()).expect("step"), 0);
    assert_eq!(result.optimize_with(&handle, 0.5, silent()).expect("step"), 2);
    assert_eq!(handle.outlier_count(), 1);
    assert_eq!(handle.value(4, "age").as_deref(), Some("60-79"));
    assert_eq!(handle.value(5, "age").as_deref(), Some("60-79"));
}

#[test]
fn iterative_adaption_escapes_the_fixpoint() {
    let result = adaption_ages().anonymize(2, 1.0);
    let handle = result.output().expect("no lock").expect("available");
    let (listener, seen) = recording();

    result
        .optimize_iterative_with(&handle, 0.0, 5, 0.25, listener)
        .expect("iteration runs");

    assert_eq!(handle.outlier_count(), 1);
    let seen = seen.lock().expect("no poison");
    assert_eq!(seen.first(), Some(&0.0));
    assert_eq!(seen.last(), Some(&1.0));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress regressed: {seen:?}");
    assert!(seen.iter().all(|p| (0.0..=1.0).contains(p)));
}

// --- Rollback ---

#[test]
fn merge_fault_surfaces_rollback_and_handle_can_be_rebuilt() {
    let result = ragged_ages().anonymize(2, 0.4);
    let node = result.global_optimum().expect("satisfiable").clone();
    let handle = result.output_for(&node).expect("materializes");
    assert_eq!(handle.outlier_count(), 2);

    handle.fault_truncate_microaggregated();
    let err = result.optimize(&handle).unwrap_err();
    assert!(err.requires_rebuild(), "got: {err}");
    assert!(!handle.is_optimized());

    // Rebuilding: release the damaged handle and re-materialize the node.
    handle.release();
    let rebuilt = result.output_for(&node).expect("re-materializes");
    assert!(!Arc::ptr_eq(&handle, &rebuilt));
    assert_eq!(rebuilt.outlier_count(), 2);
    assert!(result.is_optimizable(&rebuilt));
}
