//! Dense row-major code matrix.

use std::fmt;

use xxhash_rust::xxh3::Xxh3;

use kanon_error::{KanonError, Result};
use kanon_types::RowSet;

/// Dense row-major matrix of `u32` attribute codes.
#[derive(Clone, PartialEq, Eq)]
pub struct DataMatrix {
    rows: usize,
    cols: usize,
    values: Vec<u32>,
}

impl DataMatrix {
    /// Create a zero-filled matrix.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: vec![0; rows * cols],
        }
    }

    /// Create a matrix from row-major values.
    pub fn from_values(rows: usize, cols: usize, values: Vec<u32>) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(KanonError::shape_mismatch(
                format!("{rows}x{cols} = {} values", rows * cols),
                format!("{} values", values.len()),
            ));
        }
        Ok(Self { rows, cols, values })
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.cols
    }

    /// Whether the matrix holds no cells.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Read one cell.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> u32 {
        assert!(row < self.rows && col < self.cols, "cell ({row}, {col}) out of range");
        self.values[row * self.cols + col]
    }

    /// Write one cell.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is out of range.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: u32) {
        assert!(row < self.rows && col < self.cols, "cell ({row}, {col}) out of range");
        self.values[row * self.cols + col] = value;
    }

    /// Borrow one row.
    #[inline]
    #[must_use]
    pub fn row(&self, row: usize) -> &[u32] {
        &self.values[row * self.cols..(row + 1) * self.cols]
    }

    /// Replace the row at `dst_row` with `src`'s row at `src_row`.
    ///
    /// Checked: fails with a shape mismatch instead of writing anything when
    /// the column counts differ or either row index is out of range.
    pub fn copy_row_from(&mut self, dst_row: usize, src: &Self, src_row: usize) -> Result<()> {
        if self.cols != src.cols {
            return Err(KanonError::shape_mismatch(
                format!("{} columns", self.cols),
                format!("{} columns", src.cols),
            ));
        }
        if dst_row >= self.rows || src_row >= src.rows {
            return Err(KanonError::shape_mismatch(
                format!("row < {} (dst) and row < {} (src)", self.rows, src.rows),
                format!("dst {dst_row}, src {src_row}"),
            ));
        }
        let from = src_row * src.cols;
        let to = dst_row * self.cols;
        self.values[to..to + self.cols].copy_from_slice(&src.values[from..from + src.cols]);
        Ok(())
    }

    /// Project the selected rows into a new matrix, preserving ascending
    /// row order.
    #[must_use]
    pub fn select_rows(&self, rows: &RowSet) -> Self {
        let mut out = Self::new(rows.size(), self.cols);
        for (dense, row) in rows.iter().enumerate() {
            out.values[dense * self.cols..(dense + 1) * self.cols].copy_from_slice(self.row(row));
        }
        out
    }

    /// Content fingerprint over the dimensions and every cell.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.update(&(self.rows as u64).to_le_bytes());
        hasher.update(&(self.cols as u64).to_le_bytes());
        for value in &self.values {
            hasher.update(&value.to_le_bytes());
        }
        hasher.digest()
    }
}

impl fmt::Debug for DataMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataMatrix")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataMatrix {
        DataMatrix::from_values(3, 2, vec![1, 2, 3, 4, 5, 6]).expect("valid shape")
    }

    #[test]
    fn from_values_validates_shape() {
        assert!(DataMatrix::from_values(2, 2, vec![1, 2, 3]).is_err());
    }

    #[test]
    fn get_set_roundtrip() {
        let mut m = sample();
        assert_eq!(m.get(1, 0), 3);
        m.set(1, 0, 42);
        assert_eq!(m.get(1, 0), 42);
        assert_eq!(m.row(2), &[5, 6]);
    }

    #[test]
    fn copy_row_from_copies_one_row() {
        let src = sample();
        let mut dst = DataMatrix::new(3, 2);
        dst.copy_row_from(2, &src, 0).expect("shapes match");
        assert_eq!(dst.row(2), &[1, 2]);
        assert_eq!(dst.row(0), &[0, 0]);
    }

    #[test]
    fn copy_row_from_rejects_column_mismatch() {
        let src = sample();
        let mut dst = DataMatrix::new(3, 3);
        let err = dst.copy_row_from(0, &src, 0).unwrap_err();
        assert!(matches!(err, KanonError::ShapeMismatch { .. }));
    }

    #[test]
    fn copy_row_from_rejects_row_out_of_range() {
        let src = sample();
        let mut dst = sample();
        assert!(dst.copy_row_from(0, &src, 3).is_err());
        assert!(dst.copy_row_from(3, &src, 0).is_err());
    }

    #[test]
    fn select_rows_is_dense_and_ascending() {
        let m = sample();
        let mut rows = RowSet::create(3);
        rows.add(0);
        rows.add(2);
        let projected = m.select_rows(&rows);
        assert_eq!(projected.num_rows(), 2);
        assert_eq!(projected.row(0), &[1, 2]);
        assert_eq!(projected.row(1), &[5, 6]);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = sample();
        let mut b = sample();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.set(0, 0, 99);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
