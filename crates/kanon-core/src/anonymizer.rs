//! Level-wise lattice search.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use kanon_check::{AnonymizationConfig, GroupifyChecker, LossMetric, Metric, NodeChecker};
use kanon_data::{AggregateFunction, DataDefinition, DataManager};
use kanon_error::Result;
use kanon_lattice::{Lattice, SolutionSpace};
use kanon_types::{Loss, NoopListener, PropertyKind, SharedProgressListener};

use crate::AnonymizationResult;

/// Default number of equivalence-class snapshots retained across checks.
pub const DEFAULT_HISTORY_SIZE: usize = 200;

/// Default snapshot size relative to the dataset.
pub const DEFAULT_SNAPSHOT_SIZE_DATASET: f64 = 0.2;

/// Default snapshot size relative to the parent snapshot.
pub const DEFAULT_SNAPSHOT_SIZE_SNAPSHOT: f64 = 0.8;

/// Runs the anonymization search over a full solution space.
///
/// The traversal is a bottom-up level-wise sweep: every node is checked in
/// ascending level order, anonymity classifications are propagated to
/// neighbors in their predictive direction, and the optimum is the anonymous
/// node with minimal information loss. Progress is reported synchronously
/// through the attached listener.
#[derive(Clone)]
pub struct Anonymizer {
    listener: SharedProgressListener,
    history_size: usize,
    snapshot_size_dataset: f64,
    snapshot_size_snapshot: f64,
}

impl Anonymizer {
    /// Create an anonymizer with default budgets and a silent listener.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listener: Arc::new(NoopListener),
            history_size: DEFAULT_HISTORY_SIZE,
            snapshot_size_dataset: DEFAULT_SNAPSHOT_SIZE_DATASET,
            snapshot_size_snapshot: DEFAULT_SNAPSHOT_SIZE_SNAPSHOT,
        }
    }

    /// Attach a progress listener.
    pub fn set_listener(&mut self, listener: SharedProgressListener) {
        self.listener = listener;
    }

    /// Set the history budget for checker scratch reuse.
    pub fn set_history_size(&mut self, history_size: usize) {
        self.history_size = history_size;
    }

    /// The configured history budget.
    #[must_use]
    pub fn history_size(&self) -> usize {
        self.history_size
    }

    /// Copy tuning (budgets, snapshot sizing) from another anonymizer,
    /// keeping this instance's listener.
    pub fn inherit_from(&mut self, other: &Self) {
        self.history_size = other.history_size;
        self.snapshot_size_dataset = other.snapshot_size_dataset;
        self.snapshot_size_snapshot = other.snapshot_size_snapshot;
    }

    /// Search the full solution space of `manager` for the optimal
    /// transformation under `config`.
    pub fn anonymize(
        &self,
        manager: Arc<DataManager>,
        definition: DataDefinition,
        mut config: AnonymizationConfig,
    ) -> Result<AnonymizationResult> {
        let started = Instant::now();
        config.initialize(&manager);

        let space = Arc::new(SolutionSpace::new(manager.min_levels(), manager.max_levels())?);
        let lattice = Arc::new(Lattice::new(Arc::clone(&space)));

        let mut metric = LossMetric::new();
        metric.initialize(
            &manager,
            &definition,
            manager.data_generalized(),
            manager.hierarchies(),
            &config,
        );
        let mut checker = GroupifyChecker::new(
            Arc::clone(&manager),
            Box::new(metric),
            &config,
            self.history_size,
            self.snapshot_size_dataset,
            self.snapshot_size_snapshot,
        );

        // Bottom-up sweep in ascending (level, id) order.
        let mut order: Vec<(u32, u64)> = (0..space.size())
            .map(|id| (space.transformation_by_id(id).level(), id))
            .collect();
        order.sort_unstable();

        let total = order.len();
        let mut best: Option<(Loss, u64)> = None;
        self.listener.progress(0.0);
        for (done, &(_, id)) in order.iter().enumerate() {
            let transformation = space.transformation_by_id(id);
            transformation.set_property(PropertyKind::Visited);

            // A node already classified as violating cannot be a candidate
            // and is not re-checked.
            if transformation.has_property(PropertyKind::NotAnonymous) {
                self.listener.progress((done + 1) as f64 / total as f64);
                continue;
            }

            let outcome = checker.apply(&transformation)?.properties;
            transformation.set_checked(&outcome);
            if outcome.privacy_model_fulfilled {
                transformation.propagate_to_neighbors(PropertyKind::Anonymous);
                let candidate = (outcome.information_loss, id);
                if best.map_or(true, |current| candidate < current) {
                    best = Some(candidate);
                }
            } else {
                transformation.propagate_to_neighbors(PropertyKind::NotAnonymous);
            }
            if let Some(fulfilled) = outcome.minimal_class_size_fulfilled {
                let kind = if fulfilled {
                    PropertyKind::KAnonymous
                } else {
                    PropertyKind::NotKAnonymous
                };
                transformation.propagate_to_neighbors(kind);
            }
            self.listener.progress((done + 1) as f64 / total as f64);
        }
        self.listener.progress(1.0);

        let optimum = best.map(|(loss, id)| {
            debug!(id, loss = loss.get(), "global optimum selected");
            lattice.node_by_id(id)
        });
        lattice.set_optimum(optimum.clone());

        let duration = started.elapsed();
        info!(
            nodes = total,
            rows = manager.num_rows(),
            found = optimum.is_some(),
            elapsed_ms = duration.as_millis() as u64,
            "anonymization search finished"
        );

        Ok(AnonymizationResult::from_run(
            self.clone(),
            manager,
            Box::new(checker),
            definition,
            config,
            lattice,
            duration,
        ))
    }
}

impl Default for Anonymizer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Anonymizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anonymizer")
            .field("history_size", &self.history_size)
            .field("snapshot_size_dataset", &self.snapshot_size_dataset)
            .field("snapshot_size_snapshot", &self.snapshot_size_snapshot)
            .finish_non_exhaustive()
    }
}

/// Collect the microaggregation functions declared in `definition`, keyed by
/// attribute name.
#[must_use]
pub fn aggregate_functions(definition: &DataDefinition) -> Vec<(String, AggregateFunction)> {
    definition
        .quasi_identifiers_with_microaggregation()
        .into_iter()
        .filter_map(|name| {
            definition
                .microaggregation_function(&name)
                .map(|function| (name, function))
        })
        .collect()
}
