//! Local recoding: single-step and iterative refinement.
//!
//! A step projects the configuration, definition, and data manager onto the
//! outlier rows of an existing output, runs a fresh search over the
//! projection, and merges the inner optimum back into the output's buffers.
//! Everything before the merge is side-effect free with respect to the
//! caller's buffers; any failure inside the merge leaves them in an unknown
//! state and surfaces as a rollback-required error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use kanon_data::OUTLIER_MASK;
use kanon_error::{KanonError, Result};
use kanon_types::{
    GeneralizationVector, NoopListener, ProgressListener, RowSet, SharedProgressListener,
};

use crate::{AnonymizationResult, Anonymizer, OutputHandle};

/// Forwards progress while clamping it to `[0, 1]` and never letting it
/// decrease. Non-finite fractions are dropped.
pub(crate) struct MonotoneListener {
    inner: SharedProgressListener,
    last: AtomicU64,
}

impl MonotoneListener {
    pub(crate) fn new(inner: SharedProgressListener) -> Self {
        Self {
            inner,
            last: AtomicU64::new(0.0f64.to_bits()),
        }
    }
}

impl ProgressListener for MonotoneListener {
    fn progress(&self, fraction: f64) {
        if !fraction.is_finite() {
            return;
        }
        let clamped = fraction.clamp(0.0, 1.0);
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let next = f64::from_bits(current).max(clamped);
            match self.last.compare_exchange(
                current,
                next.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.inner.progress(next);
                    return;
                }
                Err(observed) => current = observed,
            }
        }
    }
}

/// Linearly maps `[0, 1]` sub-progress onto `[min, min + span]`. A NaN span
/// forwards sub-progress unchanged.
struct BandListener {
    inner: SharedProgressListener,
    min: f64,
    span: f64,
}

impl ProgressListener for BandListener {
    fn progress(&self, fraction: f64) {
        if self.span.is_nan() {
            self.inner.progress(fraction);
        } else {
            self.inner.progress(self.min + fraction * self.span);
        }
    }
}

/// Suppression limit for the projected configuration when a target fraction
/// of all records is requested: the requested absolute count, relative to
/// the outlier set, clamped to `[0, 1]`, subtracted from one.
pub(crate) fn clamped_suppression_limit(records: f64, total_rows: usize, outliers: usize) -> f64 {
    let absolute = records * total_rows as f64;
    let relative = (absolute / outliers as f64).clamp(0.0, 1.0);
    1.0 - relative
}

/// Single local-recoding step over the outlier rows of `handle`.
pub(crate) fn optimize_fast(
    result: &AnonymizationResult,
    handle: &Arc<OutputHandle>,
    records: f64,
    gs_factor: f64,
    listener: &SharedProgressListener,
) -> Result<usize> {
    // Argument validation. No state changes past this block's failures.
    if !records.is_nan() && (records <= 0.0 || records > 1.0) {
        return Err(KanonError::RecordsOutOfRange { value: records });
    }
    if !gs_factor.is_nan() && !(0.0..=1.0).contains(&gs_factor) {
        return Err(KanonError::GsFactorOutOfRange { value: gs_factor });
    }
    if handle.input_fingerprint() != result.input_fingerprint() {
        return Err(KanonError::WrongInputData);
    }

    if !result.is_optimizable(handle) {
        return Ok(0);
    }

    // Collect the outlier rows.
    let total_rows = handle.num_rows();
    let mut rows = RowSet::create(total_rows);
    for row in 0..total_rows {
        if handle.is_outlier(row) {
            rows.add(row);
        }
    }

    // Project the configuration onto the outlier rows. Everything used from
    // here on is either stateless or a fresh copy.
    let mut config = result.configuration().subset_for(&rows, gs_factor);
    if !records.is_nan() {
        config.set_max_outliers(clamped_suppression_limit(records, total_rows, rows.size()))?;
    }

    // Clone the definition (isolating its stateful microaggregation
    // functions) and project the manager.
    let definition = result.data_definition().clone();
    let manager = Arc::new(result.manager().subset_instance(&rows)?);

    // Run a fresh search over the projection, inheriting tuning from the
    // anonymizer that produced this result.
    let mut anonymizer = Anonymizer::new();
    anonymizer.set_listener(Arc::new(MonotoneListener::new(Arc::clone(listener))));
    if let Some(outer) = result.anonymizer() {
        anonymizer.inherit_from(outer);
    }
    debug!(outliers = rows.size(), total_rows, "local recoding step started");
    let inner = match anonymizer.anonymize(manager, definition, config) {
        Ok(inner) => inner,
        // Data is already resident; I/O at this point is an engine defect.
        Err(KanonError::Io(_)) => return Err(KanonError::internal("unexpected IO")),
        Err(other) => return Err(other),
    };

    let Some(optimum) = inner.global_optimum().cloned() else {
        return Ok(0);
    };

    // Apply the inner optimum, reusing the outer handle's microaggregation
    // dictionary so codes stay comparable.
    let transformation = inner.solution_space().transformation(optimum.generalization())?;
    let dictionary = handle.microaggregated_dictionary();
    let data = {
        let mut checker = inner.checker().lock();
        checker.apply_with_dictionary(&transformation, &dictionary)?
    };

    // Merge the projected rows back, walking the row set in ascending order;
    // the dense enumeration index is the inner buffer's row index. From here
    // on the caller's buffers are being mutated: any failure requires a
    // rebuild of the handle.
    let mut buffers = handle.buffers().write();
    let merge = (|| -> Result<usize> {
        let new_generalized = data.buffer_generalized.matrix();
        let new_microaggregated = data.buffer_microaggregated.matrix();
        let mut optimized = 0usize;
        for (new_index, old_index) in rows.iter().enumerate() {
            if buffers.generalized.num_rows() != 0 {
                buffers
                    .generalized
                    .matrix_mut()
                    .copy_row_from(old_index, new_generalized, new_index)?;
                if new_generalized.get(new_index, 0) & OUTLIER_MASK == 0 {
                    optimized += 1;
                }
            }
            if buffers.microaggregated.num_rows() != 0 {
                buffers
                    .microaggregated
                    .matrix_mut()
                    .copy_row_from(old_index, new_microaggregated, new_index)?;
            }
        }
        buffers.levels = GeneralizationVector::from_slice(optimum.generalization());
        Ok(optimized)
    })();
    drop(buffers);

    match merge {
        Ok(optimized) => {
            if optimized != 0 {
                handle.set_optimized();
            }
            info!(optimized, outliers = rows.size(), "local recoding step finished");
            Ok(optimized)
        }
        Err(cause) => {
            warn!(%cause, "merge failed; caller must rebuild the handle");
            Err(KanonError::rollback_required(cause.to_string()))
        }
    }
}

/// Greedy iterative refinement with fixpoint escape through factor adaption.
pub(crate) fn optimize_iterative(
    result: &AnonymizationResult,
    handle: &Arc<OutputHandle>,
    mut gs_factor: f64,
    max_iterations: usize,
    adaption_factor: f64,
    listener: &SharedProgressListener,
) -> Result<()> {
    if gs_factor < 0.0 || gs_factor > 1.0 {
        return Err(KanonError::GsFactorOutOfRange { value: gs_factor });
    }
    if adaption_factor < 0.0 || adaption_factor > 1.0 {
        return Err(KanonError::AdaptionOutOfRange {
            value: adaption_factor,
        });
    }
    if max_iterations == 0 {
        return Err(KanonError::MaxIterationsZero);
    }

    let goal = handle.outlier_count();
    let mut total = 0usize;
    let mut current = usize::MAX;
    let mut iterations = 0usize;

    let progress = MonotoneListener::new(Arc::clone(listener));
    progress.progress(0.0);

    while result.is_optimizable(handle) && iterations < max_iterations && current > 0 {
        current =
            result.optimize_fast_with(handle, f64::NAN, gs_factor, Arc::new(NoopListener))?;
        total += current;

        // At a fixpoint, raise the factor and force another attempt while
        // the factor stays valid.
        if current == 0 && adaption_factor > 0.0 {
            gs_factor += adaption_factor;
            if gs_factor <= 1.0 {
                current = usize::MAX;
            }
        }
        iterations += 1;

        let by_rows = if goal == 0 {
            0.0
        } else {
            total as f64 / goal as f64
        };
        let by_iterations = iterations as f64 / max_iterations as f64;
        progress.progress(by_rows.max(by_iterations));
    }

    progress.progress(1.0);
    Ok(())
}

/// Batched iterative refinement: one fraction-bounded step per round until a
/// round optimizes nothing or the handle stops being optimizable.
pub(crate) fn optimize_iterative_fast(
    result: &AnonymizationResult,
    handle: &Arc<OutputHandle>,
    records: f64,
    gs_factor: f64,
    listener: &SharedProgressListener,
) -> Result<()> {
    if !gs_factor.is_nan() && !(0.0..=1.0).contains(&gs_factor) {
        return Err(KanonError::GsFactorOutOfRange { value: gs_factor });
    }
    if records < 0.0 || records > 1.0 {
        return Err(KanonError::RecordsOutOfRange { value: records });
    }

    let goal = handle.outlier_count();
    let mut total = 0usize;
    let mut current = usize::MAX;

    let progress: SharedProgressListener = Arc::new(MonotoneListener::new(Arc::clone(listener)));
    progress.progress(0.0);

    while result.is_optimizable(handle) && current > 0 {
        // Map the step's sub-progress onto its band of the overall range.
        let min = if goal == 0 {
            0.0
        } else {
            total as f64 / goal as f64
        };
        let band: SharedProgressListener = Arc::new(BandListener {
            inner: Arc::clone(&progress),
            min,
            span: records,
        });

        current = result.optimize_fast_with(handle, records, gs_factor, band)?;
        total += current;

        if goal != 0 {
            progress.progress(total as f64 / goal as f64);
        }
    }

    progress.progress(1.0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn suppression_limit_clamps_relative_fraction() {
        // 50 requested records against 10 outliers: the whole outlier set
        // may be optimized, so nothing may remain suppressed.
        assert_eq!(clamped_suppression_limit(0.5, 100, 10), 0.0);
        // 10 requested records against 40 outliers: a quarter of the set.
        assert_eq!(clamped_suppression_limit(0.1, 100, 40), 0.75);
        // Tiny requests stay within [0, 1).
        let limit = clamped_suppression_limit(0.01, 100, 50);
        assert!(limit > 0.0 && limit < 1.0);
    }

    #[test]
    fn monotone_listener_never_regresses() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            Arc::new(move |p: f64| seen.lock().expect("no poison").push(p))
        };
        let listener = MonotoneListener::new(sink);
        listener.progress(0.2);
        listener.progress(0.1);
        listener.progress(f64::NAN);
        listener.progress(1.4);
        listener.progress(1.0);
        let seen = seen.lock().expect("no poison");
        assert_eq!(*seen, vec![0.2, 0.2, 1.0, 1.0]);
    }

    #[test]
    fn band_listener_maps_and_forwards() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            Arc::new(move |p: f64| seen.lock().expect("no poison").push(p))
        };
        let band = BandListener {
            inner: sink,
            min: 0.5,
            span: 0.2,
        };
        band.progress(0.0);
        band.progress(1.0);
        let nan_band = BandListener {
            inner: {
                let seen = Arc::clone(&seen);
                Arc::new(move |p: f64| seen.lock().expect("no poison").push(p))
            },
            min: 0.5,
            span: f64::NAN,
        };
        nan_band.progress(0.25);
        let seen = seen.lock().expect("no poison");
        assert_eq!(*seen, vec![0.5, 0.7, 0.25]);
    }
}
