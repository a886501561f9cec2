//! Core of the kanon anonymization engine.
//!
//! Wires the data, lattice, and checking layers into the public result
//! facade:
//!
//! - [`Anonymizer`]: level-wise search over the full solution space.
//! - [`AnonymizationResult`]: output materialization and local recoding.
//! - [`OutputHandle`]: one materialized anonymized dataset.
//! - [`ResultRegistry`]: live-handle tracking and the buffer lock.

pub mod anonymizer;
mod optimize;
pub mod output;
pub mod registry;
pub mod result;

pub use anonymizer::{
    aggregate_functions, Anonymizer, DEFAULT_HISTORY_SIZE, DEFAULT_SNAPSHOT_SIZE_DATASET,
    DEFAULT_SNAPSHOT_SIZE_SNAPSHOT,
};
pub use output::OutputHandle;
pub use registry::ResultRegistry;
pub use result::AnonymizationResult;
