//! Data layer of the kanon anonymization engine.
//!
//! Owns the row matrices, the append-only dictionaries shared between the
//! data manager and every output buffer, the materialized generalization
//! hierarchies, and subset projection for local recoding.
//!
//! # Key types
//!
//! - [`DataMatrix`]: dense `u32` code matrix with checked row copies.
//! - [`Dictionary`]: per-column append-only string interning.
//! - [`Data`]: a matrix bound to its header and dictionary; fork = deep copy
//!   of the matrix, shared dictionary.
//! - [`Hierarchy`]: materialized `value code × level → code` table.
//! - [`DataDefinition`]: attribute roles, hierarchies, microaggregation.
//! - [`DataManager`]: the three row matrices plus projection over a
//!   [`RowSet`](kanon_types::RowSet).
//! - [`InputHandle`]: buffered ownership of the raw input while results
//!   exist.

pub mod data;
pub mod definition;
pub mod dictionary;
pub mod hierarchy;
pub mod input;
pub mod manager;
pub mod matrix;

pub use data::{Data, OUTLIER_MASK, REMOVE_OUTLIER_MASK};
pub use definition::{AggregateFunction, AttributeRole, DataDefinition};
pub use dictionary::Dictionary;
pub use hierarchy::Hierarchy;
pub use input::InputHandle;
pub use manager::DataManager;
pub use matrix::DataMatrix;
