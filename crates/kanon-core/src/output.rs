//! Materialized anonymized view over one lattice node.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use kanon_data::{Data, DataDefinition, DataManager, Dictionary, OUTLIER_MASK, REMOVE_OUTLIER_MASK};
use kanon_error::{KanonError, Result};
use kanon_lattice::LatticeNode;
use kanon_types::GeneralizationVector;

use crate::ResultRegistry;

pub(crate) struct OutputBuffers {
    pub generalized: Data,
    pub microaggregated: Data,
    /// Generalization levels currently materialized in the buffers. Starts
    /// as the node's vector; local recoding pushes the inner optimum here.
    pub levels: GeneralizationVector,
}

/// A materialized anonymized dataset, produced from one lattice node.
///
/// *Forked* handles own a private deep copy of both buffers and may coexist
/// freely. The single *unforked* handle shares the checker's buffer and
/// holds the registry's buffer lock until released. Local recoding mutates
/// the buffers in place and sets the `optimized` flag.
pub struct OutputHandle {
    registry: Weak<ResultRegistry>,
    manager: Arc<DataManager>,
    node: LatticeNode,
    definition: DataDefinition,
    input_fingerprint: u64,
    forked: bool,
    optimized: AtomicBool,
    buffers: RwLock<OutputBuffers>,
}

impl OutputHandle {
    pub(crate) fn new(
        registry: &Arc<ResultRegistry>,
        manager: Arc<DataManager>,
        generalized: Data,
        microaggregated: Data,
        node: LatticeNode,
        definition: DataDefinition,
        input_fingerprint: u64,
        forked: bool,
    ) -> Result<Self> {
        let rows = manager.num_rows();
        if generalized.num_rows() != rows {
            return Err(KanonError::shape_mismatch(
                format!("{rows} generalized rows"),
                format!("{} generalized rows", generalized.num_rows()),
            ));
        }
        if microaggregated.num_rows() != 0 && microaggregated.num_rows() != rows {
            return Err(KanonError::shape_mismatch(
                format!("{rows} microaggregated rows"),
                format!("{} microaggregated rows", microaggregated.num_rows()),
            ));
        }
        let levels = GeneralizationVector::from_slice(node.generalization());
        Ok(Self {
            registry: Arc::downgrade(registry),
            manager,
            node,
            definition,
            input_fingerprint,
            forked,
            optimized: AtomicBool::new(false),
            buffers: RwLock::new(OutputBuffers {
                generalized,
                microaggregated,
                levels,
            }),
        })
    }

    /// The lattice node this output was produced from.
    #[must_use]
    pub fn node(&self) -> &LatticeNode {
        &self.node
    }

    /// The data definition in effect when the output was produced.
    #[must_use]
    pub fn definition(&self) -> &DataDefinition {
        &self.definition
    }

    /// Number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.manager.num_rows()
    }

    /// Number of columns of the full dataset view.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.manager.header().len()
    }

    /// Column names, in input order.
    #[must_use]
    pub fn header(&self) -> &[String] {
        self.manager.header()
    }

    /// Whether `row` is an outlier (marked for suppression).
    #[must_use]
    pub fn is_outlier(&self, row: usize) -> bool {
        let buffers = self.buffers.read();
        buffers.generalized.matrix().get(row, 0) & OUTLIER_MASK != 0
    }

    /// Number of outlier rows.
    #[must_use]
    pub fn outlier_count(&self) -> usize {
        (0..self.num_rows()).filter(|&row| self.is_outlier(row)).count()
    }

    /// Decoded value of `attribute` at `row`.
    ///
    /// Quasi-identifier values of outlier rows read as `"*"`; static
    /// attributes are carried through unchanged.
    #[must_use]
    pub fn value(&self, row: usize, attribute: &str) -> Option<String> {
        let buffers = self.buffers.read();
        if let Some(col) = buffers.generalized.column_of(attribute) {
            // The outlier mask lives on column 0 and suppresses the whole
            // row's quasi-identifiers.
            if self.is_outlier_locked(&buffers, row) {
                return Some("*".to_owned());
            }
            let code = buffers.generalized.matrix().get(row, col) & REMOVE_OUTLIER_MASK;
            return buffers.generalized.dictionary().value(col, code);
        }
        if let Some(col) = buffers.microaggregated.column_of(attribute) {
            if self.is_outlier_locked(&buffers, row) {
                return Some("*".to_owned());
            }
            let code = buffers.microaggregated.matrix().get(row, col);
            return buffers.microaggregated.dictionary().value(col, code);
        }
        drop(buffers);
        let static_data = self.manager.data_static();
        let col = static_data.column_of(attribute)?;
        static_data
            .dictionary()
            .value(col, static_data.matrix().get(row, col))
    }

    fn is_outlier_locked(&self, buffers: &OutputBuffers, row: usize) -> bool {
        buffers.generalized.matrix().get(row, 0) & OUTLIER_MASK != 0
    }

    /// Generalization levels currently materialized in the buffers.
    #[must_use]
    pub fn generalization(&self) -> GeneralizationVector {
        self.buffers.read().levels.clone()
    }

    /// Whether local recoding has mutated this output.
    #[must_use]
    pub fn is_optimized(&self) -> bool {
        self.optimized.load(Ordering::Acquire)
    }

    pub(crate) fn set_optimized(&self) {
        self.optimized.store(true, Ordering::Release);
    }

    /// Whether this handle owns a private buffer copy.
    #[must_use]
    pub fn is_forked(&self) -> bool {
        self.forked
    }

    /// Fingerprint of the input buffer this output was derived from.
    #[must_use]
    pub fn input_fingerprint(&self) -> u64 {
        self.input_fingerprint
    }

    /// Combined content fingerprint of both output buffers.
    #[must_use]
    pub fn buffer_fingerprint(&self) -> u64 {
        let buffers = self.buffers.read();
        buffers.generalized.matrix().fingerprint()
            ^ buffers.microaggregated.matrix().fingerprint().rotate_left(1)
    }

    /// The dictionary microaggregated codes decode through.
    #[must_use]
    pub fn microaggregated_dictionary(&self) -> Arc<Dictionary> {
        Arc::clone(self.buffers.read().microaggregated.dictionary())
    }

    /// Release this handle from its registry, clearing the buffer lock when
    /// this handle holds it.
    pub fn release(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self);
        }
    }

    pub(crate) fn buffers(&self) -> &RwLock<OutputBuffers> {
        &self.buffers
    }

    /// Truncate the microaggregated buffer to a single row, leaving the
    /// merge walk to fail mid-copy. Test-only.
    #[cfg(feature = "fault-injection")]
    pub fn fault_truncate_microaggregated(&self) {
        use kanon_data::DataMatrix;
        let mut buffers = self.buffers.write();
        let cols = buffers.microaggregated.num_columns();
        let header = buffers.microaggregated.header().to_vec();
        let dictionary = Arc::clone(buffers.microaggregated.dictionary());
        buffers.microaggregated = Data::new(DataMatrix::new(1, cols), header, dictionary)
            .expect("header length unchanged");
    }
}

impl fmt::Debug for OutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputHandle")
            .field("node", &self.node.id())
            .field("rows", &self.num_rows())
            .field("forked", &self.forked)
            .field("optimized", &self.is_optimized())
            .finish_non_exhaustive()
    }
}
