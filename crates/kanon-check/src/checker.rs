//! The groupify checker: applies one transformation and classifies it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use kanon_data::{Data, DataManager, DataMatrix, Dictionary, OUTLIER_MASK};
use kanon_error::{KanonError, Result};
use kanon_lattice::Transformation;
use kanon_types::CheckOutcome;

use crate::{AnonymizationConfig, Metric, PrivacyModel};

/// Buffers and classification produced by applying one transformation.
#[derive(Debug)]
pub struct TransformedData {
    /// Generalized quasi-identifier codes; bit 31 of column 0 marks
    /// suppressed rows.
    pub buffer_generalized: Data,
    /// Per-class aggregates for microaggregated attributes. Zero rows when
    /// no attribute is microaggregated.
    pub buffer_microaggregated: Data,
    /// Scored classification of the node.
    pub properties: CheckOutcome,
}

/// Applies transformations and produces scored [`TransformedData`] bundles.
pub trait NodeChecker: Send {
    /// Apply `transformation`, interning microaggregates into the manager's
    /// own dictionary.
    fn apply(&mut self, transformation: &Transformation<'_>) -> Result<TransformedData>;

    /// Apply `transformation`, interning microaggregates into `dictionary`
    /// so the produced codes stay comparable with an existing buffer.
    fn apply_with_dictionary(
        &mut self,
        transformation: &Transformation<'_>,
        dictionary: &Arc<Dictionary>,
    ) -> Result<TransformedData>;

    /// Drop scratch state retained from previous applications.
    fn reset(&mut self);

    /// The input buffer checks run against, for provenance comparison.
    fn input_buffer(&self) -> &DataMatrix;
}

type ClassKey = SmallVec<[u32; 8]>;

/// Equivalence-class based checker.
///
/// Groups rows by their generalized quasi-identifier tuple, evaluates every
/// privacy model per class, marks rows of violating classes as outliers, and
/// scores the result through the metric. Scratch allocations are reused
/// across applications up to the configured history budget.
pub struct GroupifyChecker {
    manager: Arc<DataManager>,
    metric: Box<dyn Metric>,
    models: Vec<Arc<dyn PrivacyModel>>,
    max_outliers: f64,
    minimal_group_size: Option<usize>,
    history_size: usize,
    snapshot_size_dataset: f64,
    snapshot_size_snapshot: f64,
    groups: HashMap<ClassKey, Vec<usize>>,
}

impl GroupifyChecker {
    /// Create a checker over `manager`.
    ///
    /// `metric` must already be initialized. `history_size` bounds how many
    /// equivalence classes of scratch state are kept across applications;
    /// the snapshot fractions are carried for checkers layered on top.
    #[must_use]
    pub fn new(
        manager: Arc<DataManager>,
        metric: Box<dyn Metric>,
        config: &AnonymizationConfig,
        history_size: usize,
        snapshot_size_dataset: f64,
        snapshot_size_snapshot: f64,
    ) -> Self {
        Self {
            manager,
            metric,
            models: config.privacy_models().to_vec(),
            max_outliers: config.max_outliers(),
            minimal_group_size: config.minimal_group_size(),
            history_size,
            snapshot_size_dataset,
            snapshot_size_snapshot,
            groups: HashMap::new(),
        }
    }

    /// The manager this checker runs against.
    #[must_use]
    pub fn manager(&self) -> &Arc<DataManager> {
        &self.manager
    }

    /// Configured snapshot sizing, relative to the dataset.
    #[must_use]
    pub fn snapshot_size_dataset(&self) -> f64 {
        self.snapshot_size_dataset
    }

    /// Configured snapshot sizing, relative to the parent snapshot.
    #[must_use]
    pub fn snapshot_size_snapshot(&self) -> f64 {
        self.snapshot_size_snapshot
    }

    fn generalize_rows(&self, levels: &[u32]) -> Result<DataMatrix> {
        let input = self.manager.data_generalized().matrix();
        let hierarchies = self.manager.hierarchies();
        if levels.len() != hierarchies.len() {
            return Err(KanonError::shape_mismatch(
                format!("{} generalization levels", hierarchies.len()),
                format!("{} generalization levels", levels.len()),
            ));
        }
        let mut out = DataMatrix::new(input.num_rows(), input.num_columns());
        for row in 0..input.num_rows() {
            for (col, hierarchy) in hierarchies.iter().enumerate() {
                let code = input.get(row, col);
                let generalized = hierarchy.generalize(code, levels[col]).ok_or_else(|| {
                    KanonError::internal(format!(
                        "code {code} has no level {} in hierarchy {col}",
                        levels[col]
                    ))
                })?;
                out.set(row, col, generalized);
            }
        }
        Ok(out)
    }

    fn microaggregate(
        &self,
        classes: &HashMap<ClassKey, Vec<usize>>,
        dictionary: &Arc<Dictionary>,
    ) -> Result<Data> {
        let analyzed = self.manager.data_analyzed();
        if analyzed.num_columns() == 0 {
            return Ok(Data::empty());
        }
        let input = analyzed.matrix();
        let mut out = DataMatrix::new(input.num_rows(), input.num_columns());
        for rows in classes.values() {
            for (col, (_, function)) in self.manager.microaggregation().iter().enumerate() {
                let values: Vec<String> = rows
                    .iter()
                    .map(|&row| {
                        analyzed
                            .dictionary()
                            .value(col, input.get(row, col))
                            .ok_or_else(|| {
                                KanonError::internal(format!(
                                    "analyzed code {} not in dictionary column {col}",
                                    input.get(row, col)
                                ))
                            })
                    })
                    .collect::<Result<_>>()?;
                let refs: Vec<&str> = values.iter().map(String::as_str).collect();
                let aggregate = function.aggregate(&refs);
                let code = dictionary.register(col, &aggregate);
                for &row in rows {
                    out.set(row, col, code);
                }
            }
        }
        Data::new(out, analyzed.header().to_vec(), Arc::clone(dictionary))
    }
}

impl NodeChecker for GroupifyChecker {
    fn apply(&mut self, transformation: &Transformation<'_>) -> Result<TransformedData> {
        let dictionary = Arc::clone(self.manager.data_analyzed().dictionary());
        self.apply_with_dictionary(transformation, &dictionary)
    }

    fn apply_with_dictionary(
        &mut self,
        transformation: &Transformation<'_>,
        dictionary: &Arc<Dictionary>,
    ) -> Result<TransformedData> {
        let levels = transformation.generalization();
        let mut generalized = self.generalize_rows(levels)?;
        let total_rows = generalized.num_rows();

        // Group rows into equivalence classes by generalized tuple.
        self.groups.clear();
        for row in 0..total_rows {
            let key: ClassKey = SmallVec::from_slice(generalized.row(row));
            self.groups.entry(key).or_default().push(row);
        }

        // Classify every class against every model.
        let mut outlier_rows = 0usize;
        let mut smallest_class = usize::MAX;
        let mut violating: Vec<&Vec<usize>> = Vec::new();
        for rows in self.groups.values() {
            smallest_class = smallest_class.min(rows.len());
            if !self.models.iter().all(|m| m.is_anonymous(rows.len())) {
                outlier_rows += rows.len();
                violating.push(rows);
            }
        }

        // The suppression budget decides whether the node is anonymous.
        let budget = (total_rows as f64 * self.max_outliers).floor() as usize;
        let privacy_model_fulfilled = outlier_rows <= budget;

        // Mark rows of violating classes as suppressed.
        for rows in &violating {
            for &row in *rows {
                let masked = generalized.get(row, 0) | OUTLIER_MASK;
                generalized.set(row, 0, masked);
            }
        }
        drop(violating);

        let minimal_class_size_fulfilled = self
            .minimal_group_size
            .map(|size| total_rows == 0 || smallest_class >= size);

        let score = self.metric.score(levels, outlier_rows, total_rows);
        let buffer_microaggregated = self.microaggregate(&self.groups, dictionary)?;
        let source = self.manager.data_generalized();
        let buffer_generalized = Data::new(
            generalized,
            source.header().to_vec(),
            Arc::clone(source.dictionary()),
        )?;

        debug!(
            id = transformation.id(),
            level = transformation.level(),
            outliers = outlier_rows,
            fulfilled = privacy_model_fulfilled,
            loss = score.loss.get(),
            "transformation applied"
        );

        Ok(TransformedData {
            buffer_generalized,
            buffer_microaggregated,
            properties: CheckOutcome {
                privacy_model_fulfilled,
                minimal_class_size_fulfilled,
                information_loss: score.loss,
                lower_bound: score.lower_bound,
            },
        })
    }

    fn reset(&mut self) {
        if self.groups.len() > self.history_size {
            self.groups = HashMap::new();
        } else {
            self.groups.clear();
        }
    }

    fn input_buffer(&self) -> &DataMatrix {
        self.manager.data_generalized().matrix()
    }
}

impl fmt::Debug for GroupifyChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupifyChecker")
            .field("rows", &self.manager.num_rows())
            .field("models", &self.models.len())
            .field("max_outliers", &self.max_outliers)
            .field("history_size", &self.history_size)
            .finish_non_exhaustive()
    }
}
