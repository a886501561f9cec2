//! Materialized generalization hierarchies.

use std::fmt;

use kanon_error::{KanonError, Result};

/// Generalization hierarchy of one quasi-identifier, materialized against a
/// dictionary: `table[value_code][level]` is the code of the value
/// generalized to `level`. Level 0 is the value itself.
#[derive(Clone)]
pub struct Hierarchy {
    table: Vec<Vec<u32>>,
    height: u32,
}

impl Hierarchy {
    /// Build from a materialized table. All rows must share one height ≥ 1.
    pub fn new(table: Vec<Vec<u32>>) -> Result<Self> {
        let height = table.first().map_or(1, Vec::len);
        if height == 0 {
            return Err(KanonError::invalid_argument("hierarchy height must be >= 1"));
        }
        if let Some(bad) = table.iter().find(|row| row.len() != height) {
            return Err(KanonError::shape_mismatch(
                format!("{height} levels"),
                format!("{} levels", bad.len()),
            ));
        }
        Ok(Self {
            table,
            height: u32::try_from(height).expect("hierarchy height overflow"),
        })
    }

    /// Number of levels, including level 0.
    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of distinct level-0 values covered.
    #[inline]
    #[must_use]
    pub fn num_values(&self) -> usize {
        self.table.len()
    }

    /// Code of `code` generalized to `level`, or `None` when the code or
    /// level is outside the table.
    #[inline]
    #[must_use]
    pub fn generalize(&self, code: u32, level: u32) -> Option<u32> {
        self.table
            .get(code as usize)
            .and_then(|row| row.get(level as usize))
            .copied()
    }
}

impl fmt::Debug for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hierarchy")
            .field("values", &self.table.len())
            .field("height", &self.height)
            .finish()
    }
}
