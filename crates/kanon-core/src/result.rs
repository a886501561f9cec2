//! The result facade: output materialization and optimization entry points.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use kanon_check::{AnonymizationConfig, GroupifyChecker, Metric, NodeChecker};
use kanon_data::{DataDefinition, DataManager, InputHandle};
use kanon_error::{KanonError, Result};
use kanon_lattice::{Lattice, LatticeNode, SolutionSpace};
use kanon_types::{NoopListener, PropertyKind, SharedProgressListener};

use crate::anonymizer::aggregate_functions;
use crate::{optimize, Anonymizer, OutputHandle, ResultRegistry};

/// Encapsulates one finished anonymization run.
///
/// Hands out materialized output handles per lattice node (forked or under
/// the buffer lock) and drives local-recoding refinement of existing
/// outputs. Not internally synchronized across entry points: callers sharing
/// one result across threads must serialize access.
pub struct AnonymizationResult {
    anonymizer: Option<Anonymizer>,
    registry: Arc<ResultRegistry>,
    manager: Arc<DataManager>,
    checker: Mutex<Box<dyn NodeChecker>>,
    definition: DataDefinition,
    config: AnonymizationConfig,
    lattice: Arc<Lattice>,
    solution_space: Arc<SolutionSpace>,
    optimal_node: Option<LatticeNode>,
    duration: Duration,
    input_fingerprint: u64,
}

impl AnonymizationResult {
    /// Wrap a just-finished run.
    pub(crate) fn from_run(
        anonymizer: Anonymizer,
        manager: Arc<DataManager>,
        checker: Box<dyn NodeChecker>,
        definition: DataDefinition,
        config: AnonymizationConfig,
        lattice: Arc<Lattice>,
        duration: Duration,
    ) -> Self {
        let registry = Arc::new(ResultRegistry::new());
        registry.create_input_subset(config.subset().cloned());
        let input_fingerprint = checker.input_buffer().fingerprint();
        let solution_space = Arc::clone(lattice.solution_space());
        let optimal_node = lattice.optimum();
        Self {
            anonymizer: Some(anonymizer),
            registry,
            manager,
            checker: Mutex::new(checker),
            definition,
            config,
            lattice,
            solution_space,
            optimal_node,
            duration,
            input_fingerprint,
        }
    }

    /// Reconstruct a result from deserialized state.
    ///
    /// Performs, in order: attach the definition to the input handle, record
    /// the input subset, set the optimum on the lattice, build a fresh data
    /// manager, expose the manager matrices through the input handle, lock
    /// the input handle, initialize the configuration and the metric, and
    /// construct a node checker with the given budgets.
    #[allow(clippy::too_many_arguments)]
    pub fn from_serialized(
        input: &InputHandle,
        definition: DataDefinition,
        lattice: Arc<Lattice>,
        history_size: usize,
        snapshot_size_dataset: f64,
        snapshot_size_snapshot: f64,
        mut metric: Box<dyn Metric>,
        mut config: AnonymizationConfig,
        optimum: Option<LatticeNode>,
        duration: Duration,
        solution_space: Arc<SolutionSpace>,
    ) -> Result<Self> {
        if !Arc::ptr_eq(lattice.solution_space(), &solution_space) {
            return Err(KanonError::invalid_argument(
                "lattice does not belong to the given solution space",
            ));
        }

        input.set_definition(definition.clone());

        let registry = Arc::new(ResultRegistry::new());
        registry.create_input_subset(config.subset().cloned());

        lattice.set_optimum(optimum.clone());

        let functions = aggregate_functions(&definition);
        let manager = Arc::new(DataManager::new(
            input.header(),
            input.data(),
            input.dictionary(),
            &definition,
            &functions,
        )?);

        input.update(
            manager.data_generalized().matrix().clone(),
            manager.data_analyzed().matrix().clone(),
            manager.data_static().matrix().clone(),
        );
        input.set_locked(true);

        config.initialize(&manager);
        metric.initialize(
            &manager,
            &definition,
            manager.data_generalized(),
            manager.hierarchies(),
            &config,
        );

        let checker = GroupifyChecker::new(
            Arc::clone(&manager),
            metric,
            &config,
            history_size,
            snapshot_size_dataset,
            snapshot_size_snapshot,
        );
        let input_fingerprint = checker.input_buffer().fingerprint();

        Ok(Self {
            anonymizer: None,
            registry,
            manager,
            checker: Mutex::new(Box::new(checker)),
            definition,
            config,
            lattice,
            solution_space,
            optimal_node: optimum,
            duration,
            input_fingerprint,
        })
    }

    /// The global optimum, or `None` when the configuration is
    /// unsatisfiable.
    #[must_use]
    pub fn global_optimum(&self) -> Option<&LatticeNode> {
        self.optimal_node.as_ref()
    }

    /// Whether a solution is available.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.optimal_node.is_some()
    }

    /// The configuration of the run.
    #[must_use]
    pub fn configuration(&self) -> &AnonymizationConfig {
        &self.config
    }

    /// The data definition of the run.
    #[must_use]
    pub fn data_definition(&self) -> &DataDefinition {
        &self.definition
    }

    /// The annotated lattice.
    #[must_use]
    pub fn lattice(&self) -> &Arc<Lattice> {
        &self.lattice
    }

    /// The registry tracking live output handles.
    #[must_use]
    pub fn registry(&self) -> &Arc<ResultRegistry> {
        &self.registry
    }

    /// Wall-clock duration of the search, in milliseconds.
    #[must_use]
    pub fn duration_millis(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Forked output for the global optimum, or `None` when unsatisfiable.
    pub fn output(&self) -> Result<Option<Arc<OutputHandle>>> {
        self.output_fork(true)
    }

    /// Output for the global optimum with explicit fork control.
    pub fn output_fork(&self, fork: bool) -> Result<Option<Arc<OutputHandle>>> {
        match &self.optimal_node {
            None => Ok(None),
            Some(node) => self.output_for_fork(node, fork).map(Some),
        }
    }

    /// Forked output for `node`.
    pub fn output_for(&self, node: &LatticeNode) -> Result<Arc<OutputHandle>> {
        self.output_for_fork(node, true)
    }

    /// Output for `node` with explicit fork control.
    ///
    /// With `fork = true` the returned handle owns a private copy of both
    /// buffers; any number may coexist, but not while an unforked handle is
    /// outstanding. With `fork = false` the handle shares the checker's
    /// buffer and takes the registry's buffer lock until released.
    pub fn output_for_fork(&self, node: &LatticeNode, fork: bool) -> Result<Arc<OutputHandle>> {
        // Lock guard: forking is illegal while an unforked handle exists.
        let locked = self.registry.locked();
        if fork && locked.is_some() {
            return Err(KanonError::BufferLocked);
        }

        // Unforked path: reuse the locked handle when it matches and has not
        // been locally recoded; otherwise release it and continue.
        if !fork {
            if let Some((handle, locked_node)) = locked {
                if locked_node == node.id() && !handle.is_optimized() {
                    return Ok(handle);
                }
                self.registry.release(&handle);
            }
        }

        // Handle cache: a recoded handle is released, not returned, so a
        // fresh request re-applies the unoptimized transformation.
        if let Some(handle) = self.registry.output_handle(node.id()) {
            if !handle.is_optimized() {
                return Ok(handle);
            }
            self.registry.release(&handle);
        }

        // Apply the transformation.
        let transformation = self.solution_space.transformation(node.generalization())?;
        let mut data = {
            let mut checker = self.checker.lock();
            let data = checker.apply(&transformation)?;
            checker.reset();
            data
        };
        transformation.set_checked(&data.properties);
        debug!(node = node.id(), fork, "output materialized");

        // Back-annotate the lattice unless a prior check fully resolved the
        // node's score range.
        let resolved = self.lattice.is_checked(node.id())
            && matches!(
                (
                    self.lattice.highest_score(node.id()),
                    self.lattice.lowest_score(node.id()),
                ),
                (Some(high), Some(low)) if high == low
            );
        if !resolved {
            self.lattice.set_checked(node.id());
            self.lattice
                .set_anonymous(node.id(), transformation.has_property(PropertyKind::Anonymous));
            let loss = transformation
                .information_loss()
                .unwrap_or(data.properties.information_loss);
            self.lattice.set_highest_score(node.id(), loss);
            self.lattice.set_lowest_score(node.id(), loss);
            let bound = transformation
                .lower_bound()
                .unwrap_or(data.properties.lower_bound);
            self.lattice.set_lower_bound(node.id(), bound);
            self.lattice.estimate_information_loss();
        }

        // Fork the buffers when requested.
        if fork {
            data.buffer_generalized = data.buffer_generalized.fork();
            data.buffer_microaggregated = data.buffer_microaggregated.fork();
        }

        let handle = Arc::new(OutputHandle::new(
            &self.registry,
            Arc::clone(&self.manager),
            data.buffer_generalized,
            data.buffer_microaggregated,
            node.clone(),
            self.definition.clone(),
            self.input_fingerprint,
            fork,
        )?);
        self.registry.register_output(node.id(), Arc::clone(&handle));
        if !fork {
            self.registry.set_lock(Arc::clone(&handle), node.id());
        }
        Ok(handle)
    }

    /// Whether local recoding can be applied to `handle`.
    ///
    /// Requires matching input data, local-recoding support from every
    /// configured model, and outliers to work on. The minimal-group-size
    /// rejection (`outliers < size`) runs before the zero-outlier rejection;
    /// the inequality direction is deliberate and load-bearing, surprising
    /// as it reads for a size floor.
    #[must_use]
    pub fn is_optimizable(&self, handle: &Arc<OutputHandle>) -> bool {
        if handle.input_fingerprint() != self.input_fingerprint {
            return false;
        }
        if !self.config.is_local_recoding_supported() {
            return false;
        }
        let outliers = handle.outlier_count();
        if let Some(size) = self.config.minimal_group_size() {
            if outliers < size {
                return false;
            }
        }
        if outliers == 0 {
            return false;
        }
        true
    }

    /// Optimize `handle` with balanced weighting and no progress reporting.
    pub fn optimize(&self, handle: &Arc<OutputHandle>) -> Result<usize> {
        self.optimize_with(handle, 0.5, Arc::new(NoopListener))
    }

    /// Optimize `handle` with the given generalization/suppression factor.
    pub fn optimize_with(
        &self,
        handle: &Arc<OutputHandle>,
        gs_factor: f64,
        listener: SharedProgressListener,
    ) -> Result<usize> {
        self.optimize_fast_with(handle, f64::NAN, gs_factor, listener)
    }

    /// Optimize roughly `records` of all rows, leaving the
    /// generalization/suppression factor configured.
    pub fn optimize_fast(&self, handle: &Arc<OutputHandle>, records: f64) -> Result<usize> {
        self.optimize_fast_with(handle, records, f64::NAN, Arc::new(NoopListener))
    }

    /// Single local-recoding step. See the crate docs for the full protocol.
    ///
    /// `records` of NaN means no bound, `gs_factor` of NaN leaves the
    /// configured factor. Returns the number of optimized records.
    pub fn optimize_fast_with(
        &self,
        handle: &Arc<OutputHandle>,
        records: f64,
        gs_factor: f64,
        listener: SharedProgressListener,
    ) -> Result<usize> {
        optimize::optimize_fast(self, handle, records, gs_factor, &listener)
    }

    /// Iterative refinement without progress reporting.
    pub fn optimize_iterative(
        &self,
        handle: &Arc<OutputHandle>,
        gs_factor: f64,
        max_iterations: usize,
        adaption_factor: f64,
    ) -> Result<()> {
        self.optimize_iterative_with(
            handle,
            gs_factor,
            max_iterations,
            adaption_factor,
            Arc::new(NoopListener),
        )
    }

    /// Iterative refinement: repeat single steps, raising the factor by
    /// `adaption_factor` at a fixpoint, until no step optimizes anything,
    /// `max_iterations` is reached, or the handle stops being optimizable.
    pub fn optimize_iterative_with(
        &self,
        handle: &Arc<OutputHandle>,
        gs_factor: f64,
        max_iterations: usize,
        adaption_factor: f64,
        listener: SharedProgressListener,
    ) -> Result<()> {
        optimize::optimize_iterative(
            self,
            handle,
            gs_factor,
            max_iterations,
            adaption_factor,
            &listener,
        )
    }

    /// Batched iterative refinement without progress reporting.
    pub fn optimize_iterative_fast(&self, handle: &Arc<OutputHandle>, records: f64) -> Result<()> {
        self.optimize_iterative_fast_with(handle, records, f64::NAN, Arc::new(NoopListener))
    }

    /// Batched iterative refinement: optimize `records` of all rows per step
    /// until a step yields nothing or the handle stops being optimizable.
    pub fn optimize_iterative_fast_with(
        &self,
        handle: &Arc<OutputHandle>,
        records: f64,
        gs_factor: f64,
        listener: SharedProgressListener,
    ) -> Result<()> {
        optimize::optimize_iterative_fast(self, handle, records, gs_factor, &listener)
    }

    pub(crate) fn checker(&self) -> &Mutex<Box<dyn NodeChecker>> {
        &self.checker
    }

    pub(crate) fn manager(&self) -> &Arc<DataManager> {
        &self.manager
    }

    pub(crate) fn anonymizer(&self) -> Option<&Anonymizer> {
        self.anonymizer.as_ref()
    }

    pub(crate) fn solution_space(&self) -> &Arc<SolutionSpace> {
        &self.solution_space
    }

    pub(crate) fn input_fingerprint(&self) -> u64 {
        self.input_fingerprint
    }
}

impl fmt::Debug for AnonymizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnonymizationResult")
            .field("available", &self.is_available())
            .field("optimum", &self.optimal_node.as_ref().map(LatticeNode::id))
            .field("rows", &self.manager.num_rows())
            .field("duration_ms", &self.duration_millis())
            .finish_non_exhaustive()
    }
}
