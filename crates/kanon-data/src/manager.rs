//! The data manager: three row matrices plus materialized hierarchies.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use kanon_error::{KanonError, Result};
use kanon_types::RowSet;

use crate::{
    AggregateFunction, AttributeRole, Data, DataDefinition, DataMatrix, Dictionary, Hierarchy,
};

/// Owns the three row matrices of one dataset, split by attribute role:
///
/// - *generalized*: quasi-identifiers transformed through hierarchies;
/// - *analyzed*: quasi-identifiers transformed by microaggregation;
/// - *static*: everything else, carried through unchanged.
///
/// Each buffer gets its own dictionary, code-compatible with the input
/// dictionary for the columns it covers; hierarchy materialization appends
/// generalized values to the generalized buffer's dictionary. Subset
/// projection re-indexes rows densely in ascending order and shares the
/// dictionaries and hierarchies of the parent manager.
pub struct DataManager {
    header: Vec<String>,
    num_rows: usize,
    data_generalized: Data,
    data_analyzed: Data,
    data_static: Data,
    hierarchies: Arc<Vec<Hierarchy>>,
    microaggregation: Vec<(String, AggregateFunction)>,
    min_levels: Vec<u32>,
    max_levels: Vec<u32>,
}

impl DataManager {
    /// Build a manager from the encoded input.
    ///
    /// `functions` maps microaggregated attribute names to their aggregate
    /// functions (typically collected from the definition by the caller).
    pub fn new(
        header: &[String],
        data: &DataMatrix,
        dictionary: &Arc<Dictionary>,
        definition: &DataDefinition,
        functions: &[(String, AggregateFunction)],
    ) -> Result<Self> {
        if header.len() != data.num_columns() {
            return Err(KanonError::shape_mismatch(
                format!("{} columns", header.len()),
                format!("{} columns", data.num_columns()),
            ));
        }

        let mut generalized_cols = Vec::new();
        let mut analyzed_cols = Vec::new();
        let mut static_cols = Vec::new();
        let mut microaggregation = Vec::new();
        for (col, name) in header.iter().enumerate() {
            match definition.role_of(name) {
                AttributeRole::Generalizing { .. } => generalized_cols.push(col),
                AttributeRole::Microaggregated { function } => {
                    analyzed_cols.push(col);
                    let function = functions
                        .iter()
                        .find(|(n, _)| n == name)
                        .map_or(function, |(_, f)| *f);
                    microaggregation.push((name.clone(), function));
                }
                AttributeRole::Insensitive | AttributeRole::Sensitive => static_cols.push(col),
            }
        }

        let data_generalized = project_columns(header, data, dictionary, &generalized_cols)?;
        let data_analyzed = project_columns(header, data, dictionary, &analyzed_cols)?;
        let data_static = project_columns(header, data, dictionary, &static_cols)?;

        let mut hierarchies = Vec::with_capacity(generalized_cols.len());
        let mut min_levels = Vec::with_capacity(generalized_cols.len());
        let mut max_levels = Vec::with_capacity(generalized_cols.len());
        for (qi_pos, &col) in generalized_cols.iter().enumerate() {
            let name = &header[col];
            let strings = definition.hierarchy_of(name).ok_or_else(|| {
                KanonError::invalid_argument(format!("no hierarchy for quasi-identifier '{name}'"))
            })?;
            let hierarchy =
                materialize_hierarchy(name, strings, data_generalized.dictionary(), qi_pos)?;
            let min = definition.minimum_level(name);
            let max = definition
                .maximum_level(name)
                .unwrap_or(hierarchy.height() - 1);
            if min > max || max >= hierarchy.height() {
                return Err(KanonError::invalid_argument(format!(
                    "level limits [{min}, {max}] invalid for '{name}' of height {}",
                    hierarchy.height()
                )));
            }
            min_levels.push(min);
            max_levels.push(max);
            hierarchies.push(hierarchy);
        }

        debug!(
            rows = data.num_rows(),
            generalized = generalized_cols.len(),
            analyzed = analyzed_cols.len(),
            static_count = static_cols.len(),
            "data manager constructed"
        );

        Ok(Self {
            header: header.to_vec(),
            num_rows: data.num_rows(),
            data_generalized,
            data_analyzed,
            data_static,
            hierarchies: Arc::new(hierarchies),
            microaggregation,
            min_levels,
            max_levels,
        })
    }

    /// Full dataset header, in input column order.
    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Quasi-identifier buffer transformed by generalization.
    #[must_use]
    pub fn data_generalized(&self) -> &Data {
        &self.data_generalized
    }

    /// Quasi-identifier buffer transformed by microaggregation.
    #[must_use]
    pub fn data_analyzed(&self) -> &Data {
        &self.data_analyzed
    }

    /// Buffer of attributes carried through unchanged.
    #[must_use]
    pub fn data_static(&self) -> &Data {
        &self.data_static
    }

    /// Hierarchies, aligned with the generalized buffer's columns.
    #[must_use]
    pub fn hierarchies(&self) -> &[Hierarchy] {
        &self.hierarchies
    }

    /// Microaggregation functions, aligned with the analyzed buffer's
    /// columns.
    #[must_use]
    pub fn microaggregation(&self) -> &[(String, AggregateFunction)] {
        &self.microaggregation
    }

    /// Minimum searched level per generalized column.
    #[must_use]
    pub fn min_levels(&self) -> &[u32] {
        &self.min_levels
    }

    /// Maximum searched level per generalized column.
    #[must_use]
    pub fn max_levels(&self) -> &[u32] {
        &self.max_levels
    }

    /// Project this manager onto the selected rows.
    ///
    /// Rows are re-indexed densely in ascending order; dictionaries and
    /// hierarchies stay shared with the parent, microaggregation functions
    /// are fresh copies.
    pub fn subset_instance(&self, rows: &RowSet) -> Result<Self> {
        if rows.length() != self.num_rows {
            return Err(KanonError::shape_mismatch(
                format!("row set over {} rows", self.num_rows),
                format!("row set over {} rows", rows.length()),
            ));
        }
        Ok(Self {
            header: self.header.clone(),
            num_rows: rows.size(),
            data_generalized: self.data_generalized.select_rows(rows),
            data_analyzed: self.data_analyzed.select_rows(rows),
            data_static: self.data_static.select_rows(rows),
            hierarchies: Arc::clone(&self.hierarchies),
            microaggregation: self.microaggregation.clone(),
            min_levels: self.min_levels.clone(),
            max_levels: self.max_levels.clone(),
        })
    }
}

impl fmt::Debug for DataManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataManager")
            .field("rows", &self.num_rows)
            .field("generalized", &self.data_generalized.header())
            .field("analyzed", &self.data_analyzed.header())
            .field("static", &self.data_static.header())
            .finish_non_exhaustive()
    }
}

/// Copy `cols` of `data` into a fresh buffer whose dictionary is seeded with
/// the input dictionary's values in code order, so the copied codes stay
/// valid.
fn project_columns(
    header: &[String],
    data: &DataMatrix,
    dictionary: &Arc<Dictionary>,
    cols: &[usize],
) -> Result<Data> {
    let dict = Dictionary::new(cols.len());
    for (j, &col) in cols.iter().enumerate() {
        for code in 0..dictionary.column_len(col) {
            let code = u32::try_from(code).expect("dictionary column overflow");
            let value = dictionary.value(col, code).ok_or_else(|| {
                KanonError::internal(format!("dictionary hole at column {col} code {code}"))
            })?;
            let seeded = dict.register(j, &value);
            if seeded != code {
                return Err(KanonError::internal(format!(
                    "dictionary column {col} not code-dense: {value} -> {seeded} != {code}"
                )));
            }
        }
    }
    let mut matrix = DataMatrix::new(data.num_rows(), cols.len());
    for row in 0..data.num_rows() {
        for (j, &col) in cols.iter().enumerate() {
            matrix.set(row, j, data.get(row, col));
        }
    }
    let names = cols.iter().map(|&c| header[c].clone()).collect();
    Data::new(matrix, names, Arc::new(dict))
}

/// Materialize a string hierarchy against the generalized buffer's
/// dictionary, appending generalized values as new codes.
fn materialize_hierarchy(
    attribute: &str,
    strings: &[Vec<String>],
    dictionary: &Arc<Dictionary>,
    column: usize,
) -> Result<Hierarchy> {
    // Registering generalized values appends codes past this bound; only
    // the seeded input values get table rows.
    let seeded = dictionary.column_len(column);
    let mut table = Vec::with_capacity(seeded);
    for code in 0..seeded {
        let code = u32::try_from(code).expect("dictionary column overflow");
        let value = dictionary.value(column, code).ok_or_else(|| {
            KanonError::internal(format!("dictionary hole at column {column} code {code}"))
        })?;
        let row = strings
            .iter()
            .find(|row| row.first().is_some_and(|v| *v == value))
            .ok_or_else(|| KanonError::HierarchyGap {
                attribute: attribute.to_owned(),
                value: value.clone(),
            })?;
        table.push(
            row.iter()
                .map(|generalized| dictionary.register(column, generalized))
                .collect(),
        );
    }
    Hierarchy::new(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age_hierarchy() -> Vec<Vec<String>> {
        [
            ["30", "30-39", "*"],
            ["34", "30-39", "*"],
            ["45", "40-49", "*"],
        ]
        .iter()
        .map(|row| row.iter().map(|s| (*s).to_owned()).collect())
        .collect()
    }

    fn build() -> (DataManager, Arc<Dictionary>) {
        let header: Vec<String> = ["age", "disease", "weight"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();
        let dictionary = Arc::new(Dictionary::new(3));
        let rows = [
            ["30", "flu", "70"],
            ["34", "cold", "80"],
            ["45", "flu", "75"],
        ];
        let mut values = Vec::new();
        for row in &rows {
            for (col, value) in row.iter().enumerate() {
                values.push(dictionary.register(col, value));
            }
        }
        let matrix = DataMatrix::from_values(3, 3, values).expect("shape");

        let mut definition = DataDefinition::new();
        definition.set_quasi_identifier("age", age_hierarchy());
        definition.set_microaggregated("weight", AggregateFunction::ArithmeticMean);
        definition.set_sensitive("disease");

        let functions = vec![("weight".to_owned(), AggregateFunction::ArithmeticMean)];
        let manager = DataManager::new(&header, &matrix, &dictionary, &definition, &functions)
            .expect("manager builds");
        (manager, dictionary)
    }

    #[test]
    fn columns_partition_by_role() {
        let (manager, _) = build();
        assert_eq!(manager.data_generalized().header(), ["age".to_owned()]);
        assert_eq!(manager.data_analyzed().header(), ["weight".to_owned()]);
        assert_eq!(manager.data_static().header(), ["disease".to_owned()]);
        assert_eq!(manager.num_rows(), 3);
        assert_eq!(manager.microaggregation().len(), 1);
    }

    #[test]
    fn hierarchy_materializes_against_buffer_dictionary() {
        let (manager, _) = build();
        let hierarchy = &manager.hierarchies()[0];
        assert_eq!(hierarchy.height(), 3);
        let dict = manager.data_generalized().dictionary();
        let code_30 = dict.code_of(0, "30").expect("seeded");
        let generalized = hierarchy.generalize(code_30, 1).expect("level 1");
        assert_eq!(dict.value(0, generalized).as_deref(), Some("30-39"));
        let top = hierarchy.generalize(code_30, 2).expect("level 2");
        assert_eq!(dict.value(0, top).as_deref(), Some("*"));
        // Level 0 maps to the seeded code itself.
        assert_eq!(hierarchy.generalize(code_30, 0), Some(code_30));
    }

    #[test]
    fn hierarchy_gap_is_reported() {
        let header = vec!["age".to_owned()];
        let dictionary = Arc::new(Dictionary::new(1));
        let matrix =
            DataMatrix::from_values(1, 1, vec![dictionary.register(0, "99")]).expect("shape");
        let mut definition = DataDefinition::new();
        definition.set_quasi_identifier("age", age_hierarchy());
        let err = DataManager::new(&header, &matrix, &dictionary, &definition, &[]).unwrap_err();
        assert!(matches!(err, KanonError::HierarchyGap { .. }));
    }

    #[test]
    fn subset_projects_densely_and_shares_dictionaries() {
        let (manager, _) = build();
        let mut rows = RowSet::create(3);
        rows.add(0);
        rows.add(2);
        let subset = manager.subset_instance(&rows).expect("projection");
        assert_eq!(subset.num_rows(), 2);
        assert!(Arc::ptr_eq(
            manager.data_generalized().dictionary(),
            subset.data_generalized().dictionary()
        ));
        // Dense row 1 of the subset is input row 2.
        assert_eq!(
            subset.data_generalized().matrix().row(1),
            manager.data_generalized().matrix().row(2)
        );
        // Wrong domain size is rejected.
        assert!(manager.subset_instance(&RowSet::create(2)).is_err());
    }

    #[test]
    fn level_limits_validated_against_height() {
        let header = vec!["age".to_owned()];
        let dictionary = Arc::new(Dictionary::new(1));
        let matrix =
            DataMatrix::from_values(1, 1, vec![dictionary.register(0, "30")]).expect("shape");
        let mut definition = DataDefinition::new();
        definition.set_quasi_identifier("age", age_hierarchy());
        definition
            .set_generalization_levels("age", 0, 7)
            .expect("declared attribute");
        assert!(DataManager::new(&header, &matrix, &dictionary, &definition, &[]).is_err());
    }
}
