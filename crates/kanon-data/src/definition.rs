//! Attribute roles, hierarchies, and microaggregation functions.

use std::collections::BTreeMap;
use std::fmt;

use kanon_error::{KanonError, Result};

/// Aggregate applied per equivalence class to a microaggregated attribute.
///
/// Functions intern their results into whatever dictionary the caller
/// supplies at application time, so clones of a definition are isolated from
/// the original's dictionary state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// Mean of the numeric interpretations. Falls back to the mode when no
    /// value parses as a number.
    ArithmeticMean,
    /// Most frequent value; ties break to the lexicographically smallest.
    Mode,
}

impl AggregateFunction {
    /// Aggregate the values of one equivalence class into a single value.
    #[must_use]
    pub fn aggregate(&self, values: &[&str]) -> String {
        match self {
            Self::ArithmeticMean => {
                let parsed: Vec<f64> = values.iter().filter_map(|v| v.parse().ok()).collect();
                if parsed.is_empty() {
                    Self::Mode.aggregate(values)
                } else {
                    let mean = parsed.iter().sum::<f64>() / parsed.len() as f64;
                    format!("{mean}")
                }
            }
            Self::Mode => {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for value in values {
                    *counts.entry(value).or_insert(0) += 1;
                }
                counts
                    .into_iter()
                    .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
                    .map(|(value, _)| value.to_owned())
                    .unwrap_or_default()
            }
        }
    }
}

/// Role of an attribute in the anonymization process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeRole {
    /// Quasi-identifier transformed by generalization through a hierarchy.
    /// `hierarchy` rows are `[level0, level1, ...]` value strings.
    Generalizing { hierarchy: Vec<Vec<String>> },
    /// Quasi-identifier transformed by per-class microaggregation.
    Microaggregated { function: AggregateFunction },
    /// Released unchanged.
    Insensitive,
    /// Kept out of the quasi-identifier set but carried through.
    Sensitive,
}

#[derive(Debug, Clone)]
struct AttributeDefinition {
    name: String,
    role: AttributeRole,
    min_level: Option<u32>,
    max_level: Option<u32>,
}

/// Per-attribute roles for one dataset.
///
/// Cloning a definition derives fresh copies of its microaggregation
/// functions; the clone is isolated from the original.
#[derive(Debug, Clone, Default)]
pub struct DataDefinition {
    attributes: Vec<AttributeDefinition>,
}

impl DataDefinition {
    /// An empty definition; undeclared attributes default to insensitive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert(&mut self, name: &str, role: AttributeRole) {
        if let Some(existing) = self.attributes.iter_mut().find(|a| a.name == name) {
            existing.role = role;
        } else {
            self.attributes.push(AttributeDefinition {
                name: name.to_owned(),
                role,
                min_level: None,
                max_level: None,
            });
        }
    }

    /// Declare a generalizing quasi-identifier with its hierarchy.
    pub fn set_quasi_identifier(&mut self, name: &str, hierarchy: Vec<Vec<String>>) {
        self.upsert(name, AttributeRole::Generalizing { hierarchy });
    }

    /// Declare a microaggregated quasi-identifier.
    pub fn set_microaggregated(&mut self, name: &str, function: AggregateFunction) {
        self.upsert(name, AttributeRole::Microaggregated { function });
    }

    /// Declare an insensitive attribute.
    pub fn set_insensitive(&mut self, name: &str) {
        self.upsert(name, AttributeRole::Insensitive);
    }

    /// Declare a sensitive attribute.
    pub fn set_sensitive(&mut self, name: &str) {
        self.upsert(name, AttributeRole::Sensitive);
    }

    /// Restrict the generalization levels searched for `name`.
    pub fn set_generalization_levels(&mut self, name: &str, min: u32, max: u32) -> Result<()> {
        if min > max {
            return Err(KanonError::invalid_argument(format!(
                "minimum level {min} exceeds maximum level {max} for '{name}'"
            )));
        }
        let attr = self
            .attributes
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or_else(|| KanonError::UnknownAttribute {
                name: name.to_owned(),
            })?;
        attr.min_level = Some(min);
        attr.max_level = Some(max);
        Ok(())
    }

    /// Role of `name`, defaulting to insensitive when undeclared.
    #[must_use]
    pub fn role_of(&self, name: &str) -> AttributeRole {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map_or(AttributeRole::Insensitive, |a| a.role.clone())
    }

    /// Hierarchy of a generalizing quasi-identifier.
    #[must_use]
    pub fn hierarchy_of(&self, name: &str) -> Option<&Vec<Vec<String>>> {
        self.attributes.iter().find(|a| a.name == name).and_then(|a| match &a.role {
            AttributeRole::Generalizing { hierarchy } => Some(hierarchy),
            _ => None,
        })
    }

    /// Quasi-identifiers transformed by microaggregation, in declaration
    /// order.
    #[must_use]
    pub fn quasi_identifiers_with_microaggregation(&self) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|a| matches!(a.role, AttributeRole::Microaggregated { .. }))
            .map(|a| a.name.clone())
            .collect()
    }

    /// Microaggregation function of `name`, if declared.
    #[must_use]
    pub fn microaggregation_function(&self, name: &str) -> Option<AggregateFunction> {
        self.attributes.iter().find(|a| a.name == name).and_then(|a| match a.role {
            AttributeRole::Microaggregated { function } => Some(function),
            _ => None,
        })
    }

    /// Declared minimum generalization level of `name` (default 0).
    #[must_use]
    pub fn minimum_level(&self, name: &str) -> u32 {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.min_level)
            .unwrap_or(0)
    }

    /// Declared maximum generalization level of `name`, if restricted.
    #[must_use]
    pub fn maximum_level(&self, name: &str) -> Option<u32> {
        self.attributes.iter().find(|a| a.name == name).and_then(|a| a.max_level)
    }
}

impl fmt::Display for DataDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for attr in &self.attributes {
            let role = match &attr.role {
                AttributeRole::Generalizing { hierarchy } => {
                    format!("generalizing ({} levels)", hierarchy.first().map_or(0, Vec::len))
                }
                AttributeRole::Microaggregated { function } => {
                    format!("microaggregated ({function:?})")
                }
                AttributeRole::Insensitive => "insensitive".to_owned(),
                AttributeRole::Sensitive => "sensitive".to_owned(),
            };
            writeln!(f, "{}: {role}", attr.name)?;
        }
        Ok(())
    }
}
