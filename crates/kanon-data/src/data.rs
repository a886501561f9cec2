//! A code matrix bound to its header and dictionary.

use std::fmt;
use std::sync::Arc;

use kanon_error::{KanonError, Result};
use kanon_types::RowSet;

use crate::{DataMatrix, Dictionary};

/// High bit of column 0 marks a row as an outlier (suppressed).
pub const OUTLIER_MASK: u32 = 1 << 31;

/// Clears the outlier bit from a column-0 code.
pub const REMOVE_OUTLIER_MASK: u32 = !OUTLIER_MASK;

/// A matrix plus the header naming its columns and the dictionary decoding
/// its cells.
///
/// Forking copies the matrix and shares the dictionary: dictionaries are
/// append-only for the lifetime of a result, so sharing is safe and keeps
/// codes comparable across forks.
#[derive(Clone)]
pub struct Data {
    matrix: DataMatrix,
    header: Vec<String>,
    dictionary: Arc<Dictionary>,
}

impl Data {
    /// Bind `matrix` to `header` and `dictionary`.
    pub fn new(matrix: DataMatrix, header: Vec<String>, dictionary: Arc<Dictionary>) -> Result<Self> {
        if matrix.num_columns() != header.len() {
            return Err(KanonError::shape_mismatch(
                format!("{} header entries", matrix.num_columns()),
                format!("{} header entries", header.len()),
            ));
        }
        Ok(Self {
            matrix,
            header,
            dictionary,
        })
    }

    /// A zero-column, zero-row buffer. Stands in for an absent
    /// microaggregated buffer; merge loops skip it via `num_rows() == 0`.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            matrix: DataMatrix::new(0, 0),
            header: Vec::new(),
            dictionary: Arc::new(Dictionary::new(0)),
        }
    }

    /// The code matrix.
    #[inline]
    #[must_use]
    pub fn matrix(&self) -> &DataMatrix {
        &self.matrix
    }

    /// Mutable access to the code matrix.
    #[inline]
    pub fn matrix_mut(&mut self) -> &mut DataMatrix {
        &mut self.matrix
    }

    /// Column names.
    #[inline]
    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// The shared dictionary.
    #[inline]
    #[must_use]
    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.matrix.num_rows()
    }

    /// Number of columns.
    #[inline]
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.matrix.num_columns()
    }

    /// Position of `attribute` in this buffer, if present.
    #[must_use]
    pub fn column_of(&self, attribute: &str) -> Option<usize> {
        self.header.iter().position(|name| name == attribute)
    }

    /// Deep-copy the matrix; share header and dictionary.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self {
            matrix: self.matrix.clone(),
            header: self.header.clone(),
            dictionary: Arc::clone(&self.dictionary),
        }
    }

    /// Project the selected rows, preserving ascending order. The dictionary
    /// stays shared.
    #[must_use]
    pub fn select_rows(&self, rows: &RowSet) -> Self {
        Self {
            matrix: self.matrix.select_rows(rows),
            header: self.header.clone(),
            dictionary: Arc::clone(&self.dictionary),
        }
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("rows", &self.matrix.num_rows())
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Data {
        let dict = Arc::new(Dictionary::new(2));
        dict.register(0, "a");
        dict.register(1, "b");
        let matrix = DataMatrix::from_values(2, 2, vec![0, 0, 0, 0]).expect("shape");
        Data::new(matrix, vec!["x".to_owned(), "y".to_owned()], dict).expect("valid")
    }

    #[test]
    fn header_must_match_columns() {
        let dict = Arc::new(Dictionary::new(1));
        let matrix = DataMatrix::new(1, 2);
        assert!(Data::new(matrix, vec!["only".to_owned()], dict).is_err());
    }

    #[test]
    fn fork_shares_dictionary_but_not_matrix() {
        let original = sample();
        let mut forked = original.fork();
        assert!(Arc::ptr_eq(original.dictionary(), forked.dictionary()));
        forked.matrix_mut().set(0, 0, 7);
        assert_eq!(original.matrix().get(0, 0), 0);
        assert_eq!(forked.matrix().get(0, 0), 7);
    }

    #[test]
    fn empty_buffer_has_no_rows() {
        let empty = Data::empty();
        assert_eq!(empty.num_rows(), 0);
        assert_eq!(empty.num_columns(), 0);
    }

    #[test]
    fn outlier_mask_is_high_bit() {
        assert_eq!(OUTLIER_MASK, 0x8000_0000);
        assert_eq!(17 & REMOVE_OUTLIER_MASK, 17);
        assert_eq!((17 | OUTLIER_MASK) & REMOVE_OUTLIER_MASK, 17);
    }

    #[test]
    fn column_lookup() {
        let data = sample();
        assert_eq!(data.column_of("y"), Some(1));
        assert_eq!(data.column_of("z"), None);
    }
}
