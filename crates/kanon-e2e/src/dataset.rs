//! Synthetic dataset assembly for scenario tests.

use std::sync::Arc;

use kanon::{
    AggregateFunction, AnonymizationConfig, AnonymizationResult, Anonymizer, DataDefinition,
    DataManager, DataMatrix, Dictionary, KAnonymity,
};

/// Assembles a small dataset, its definition, and a k-anonymity
/// configuration, then runs the full pipeline.
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    header: Vec<String>,
    definition: DataDefinition,
    rows: Vec<Vec<String>>,
}

impl DatasetBuilder {
    /// Start a dataset with the given column names.
    #[must_use]
    pub fn new(header: &[&str]) -> Self {
        Self {
            header: header.iter().map(|s| (*s).to_owned()).collect(),
            definition: DataDefinition::new(),
            rows: Vec::new(),
        }
    }

    /// Declare a generalizing quasi-identifier with its hierarchy rows
    /// (`[level0, level1, ...]` per distinct value).
    #[must_use]
    pub fn quasi_identifier(mut self, name: &str, hierarchy: &[&[&str]]) -> Self {
        let hierarchy = hierarchy
            .iter()
            .map(|row| row.iter().map(|s| (*s).to_owned()).collect())
            .collect();
        self.definition.set_quasi_identifier(name, hierarchy);
        self
    }

    /// Declare a microaggregated quasi-identifier.
    #[must_use]
    pub fn microaggregated(mut self, name: &str, function: AggregateFunction) -> Self {
        self.definition.set_microaggregated(name, function);
        self
    }

    /// Declare a sensitive attribute.
    #[must_use]
    pub fn sensitive(mut self, name: &str) -> Self {
        self.definition.set_sensitive(name);
        self
    }

    /// Append one data row, in header order.
    #[must_use]
    pub fn row(mut self, values: &[&str]) -> Self {
        assert_eq!(values.len(), self.header.len(), "row arity mismatch");
        self.rows.push(values.iter().map(|s| (*s).to_owned()).collect());
        self
    }

    /// Encode the rows and build the data manager.
    #[must_use]
    pub fn manager(&self) -> Arc<DataManager> {
        let dictionary = Arc::new(Dictionary::new(self.header.len()));
        let mut values = Vec::new();
        for row in &self.rows {
            for (col, value) in row.iter().enumerate() {
                values.push(dictionary.register(col, value));
            }
        }
        let matrix = DataMatrix::from_values(self.rows.len(), self.header.len(), values)
            .expect("row-major encoding matches the declared shape");
        let functions: Vec<(String, AggregateFunction)> = self
            .definition
            .quasi_identifiers_with_microaggregation()
            .into_iter()
            .filter_map(|name| {
                self.definition
                    .microaggregation_function(&name)
                    .map(|function| (name, function))
            })
            .collect();
        Arc::new(
            DataManager::new(&self.header, &matrix, &dictionary, &self.definition, &functions)
                .expect("synthetic datasets are well-formed"),
        )
    }

    /// Run the pipeline under k-anonymity with the given suppression limit.
    #[must_use]
    pub fn anonymize(&self, k: usize, max_outliers: f64) -> AnonymizationResult {
        let mut config = AnonymizationConfig::new();
        config.add_model(Arc::new(KAnonymity::new(k).expect("valid k")));
        config
            .set_max_outliers(max_outliers)
            .expect("limit in range");
        Anonymizer::new()
            .anonymize(self.manager(), self.definition.clone(), config)
            .expect("synthetic datasets anonymize without I/O")
    }
}

/// Age hierarchy used across the scenario tests.
pub const AGE_HIERARCHY: &[&[&str]] = &[
    &["25", "20-39", "*"],
    &["31", "20-39", "*"],
    &["36", "20-39", "*"],
    &["52", "40-59", "*"],
    &["57", "40-59", "*"],
    &["77", "60-79", "*"],
    &["78", "60-79", "*"],
];

/// Five rows whose level-1 classes are sizes 3 and 2: anonymous under k = 2
/// without suppression.
#[must_use]
pub fn clean_ages() -> DatasetBuilder {
    let mut builder = DatasetBuilder::new(&["age", "disease"])
        .quasi_identifier("age", AGE_HIERARCHY)
        .sensitive("disease");
    for (age, disease) in [
        ("25", "flu"),
        ("31", "cold"),
        ("36", "flu"),
        ("52", "cold"),
        ("57", "flu"),
    ] {
        builder = builder.row(&[age, disease]);
    }
    builder
}

/// Five rows leaving two level-1 singletons (52 and 77), plus a
/// microaggregated weight column.
#[must_use]
pub fn ragged_ages() -> DatasetBuilder {
    let mut builder = DatasetBuilder::new(&["age", "weight"])
        .quasi_identifier("age", AGE_HIERARCHY)
        .microaggregated("weight", AggregateFunction::ArithmeticMean);
    for (age, weight) in [
        ("25", "60"),
        ("31", "70"),
        ("36", "80"),
        ("52", "90"),
        ("77", "65"),
    ] {
        builder = builder.row(&[age, weight]);
    }
    builder
}

/// Seven rows whose optimum keeps three suppressed singletons; only a
/// generalization-leaning factor recodes two of them into a shared band.
#[must_use]
pub fn adaption_ages() -> DatasetBuilder {
    let mut builder =
        DatasetBuilder::new(&["age"]).quasi_identifier("age", AGE_HIERARCHY);
    for age in ["25", "25", "31", "31", "77", "78", "52"] {
        builder = builder.row(&[age]);
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assembles_manager() {
        let manager = clean_ages().manager();
        assert_eq!(manager.num_rows(), 5);
        assert_eq!(manager.data_generalized().header(), ["age".to_owned()]);
        assert_eq!(manager.data_static().header(), ["disease".to_owned()]);
    }

    #[test]
    fn ragged_dataset_has_microaggregation() {
        let manager = ragged_ages().manager();
        assert_eq!(manager.data_analyzed().header(), ["weight".to_owned()]);
        assert_eq!(manager.microaggregation().len(), 1);
    }

    #[test]
    #[should_panic(expected = "row arity mismatch")]
    fn row_arity_is_enforced() {
        let _ = DatasetBuilder::new(&["a", "b"]).row(&["only"]);
    }
}
