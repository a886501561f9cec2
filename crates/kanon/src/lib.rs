//! Public API facade for kanon.
//!
//! Re-exports the engine surface: configure privacy models and a data
//! definition, run [`Anonymizer::anonymize`], then pull output handles and
//! refine them with local recoding through [`AnonymizationResult`].

pub use kanon_check::{
    AnonymizationConfig, GroupifyChecker, KAnonymity, LossMetric, Metric, MetricScore,
    NodeChecker, PrivacyModel, TransformedData,
};
pub use kanon_core::{
    aggregate_functions, AnonymizationResult, Anonymizer, OutputHandle, ResultRegistry,
    DEFAULT_HISTORY_SIZE, DEFAULT_SNAPSHOT_SIZE_DATASET, DEFAULT_SNAPSHOT_SIZE_SNAPSHOT,
};
pub use kanon_data::{
    AggregateFunction, AttributeRole, Data, DataDefinition, DataManager, DataMatrix, Dictionary,
    Hierarchy, InputHandle, OUTLIER_MASK, REMOVE_OUTLIER_MASK,
};
pub use kanon_error::{KanonError, Result};
pub use kanon_lattice::{Lattice, LatticeNode, SolutionSpace, Transformation};
pub use kanon_types::{
    level_of, CheckOutcome, Direction, GeneralizationVector, Loss, NoopListener, ProgressListener,
    PropertyKind, PropertySet, RowSet, SharedProgressListener,
};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn zip_hierarchy() -> Vec<Vec<String>> {
        [
            ["13053", "1305*", "130**", "*"],
            ["13058", "1305*", "130**", "*"],
            ["13063", "1306*", "130**", "*"],
            ["13068", "1306*", "130**", "*"],
        ]
        .iter()
        .map(|row| row.iter().map(|s| (*s).to_owned()).collect())
        .collect()
    }

    fn anonymize(zips: &[&str], k: usize) -> AnonymizationResult {
        let header = vec!["zip".to_owned()];
        let dictionary = Arc::new(Dictionary::new(1));
        let mut values = Vec::new();
        for zip in zips {
            values.push(dictionary.register(0, zip));
        }
        let matrix =
            DataMatrix::from_values(zips.len(), 1, values).expect("one value per row");

        let mut definition = DataDefinition::new();
        definition.set_quasi_identifier("zip", zip_hierarchy());

        let manager = Arc::new(
            DataManager::new(&header, &matrix, &dictionary, &definition, &[])
                .expect("manager builds"),
        );

        let mut config = AnonymizationConfig::new();
        config.add_model(Arc::new(KAnonymity::new(k).expect("valid k")));

        Anonymizer::new()
            .anonymize(manager, definition, config)
            .expect("search runs")
    }

    #[test]
    fn public_api_end_to_end() {
        let result = anonymize(&["13053", "13058", "13063", "13068"], 2);
        let optimum = result.global_optimum().expect("satisfiable");
        // Pairs form at the first masking level.
        assert_eq!(optimum.generalization(), &[1]);

        let handle = result.output().expect("no lock").expect("available");
        assert_eq!(handle.value(0, "zip").as_deref(), Some("1305*"));
        assert_eq!(handle.value(2, "zip").as_deref(), Some("1306*"));
        assert_eq!(handle.outlier_count(), 0);
    }

    #[test]
    fn public_api_unsatisfiable_returns_no_output() {
        // One row can never be 2-anonymous without suppression, but the top
        // level groups everything; with k above the row count nothing works.
        let result = anonymize(&["13053"], 2);
        assert!(!result.is_available());
        assert!(result.global_optimum().is_none());
        assert!(result.output().expect("no lock").is_none());
    }

    #[test]
    fn public_api_nodes_are_addressable() {
        let result = anonymize(&["13053", "13058", "13063", "13068"], 2);
        let lattice = result.lattice();
        let top = lattice.node(&[3]).expect("in range");
        let handle = result.output_for(&top).expect("materializes");
        assert_eq!(handle.value(0, "zip").as_deref(), Some("*"));
    }
}
