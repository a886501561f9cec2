//! Scenario tests for the kanon engine.
//!
//! [`DatasetBuilder`] assembles small synthetic datasets with hierarchies,
//! microaggregation, and sensitive attributes, then runs the full pipeline.
//! The scenario and property tests live in the `scenarios` and `properties`
//! modules.

pub mod dataset;

pub use dataset::DatasetBuilder;

#[cfg(test)]
mod properties;
#[cfg(test)]
mod scenarios;
