//! Per-column append-only string interning.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

/// Append-only dictionary mapping attribute values to dense `u32` codes,
/// one value space per column.
///
/// Shared by reference (`Arc`) between the data manager and every output
/// buffer, so codes written during local recoding stay comparable with the
/// codes of the original run. There is deliberately no removal API.
pub struct Dictionary {
    columns: RwLock<Vec<ColumnDict>>,
}

#[derive(Default)]
struct ColumnDict {
    values: Vec<String>,
    index: HashMap<String, u32>,
}

impl Dictionary {
    /// Create a dictionary with `num_columns` empty value spaces.
    #[must_use]
    pub fn new(num_columns: usize) -> Self {
        let mut columns = Vec::with_capacity(num_columns);
        columns.resize_with(num_columns, ColumnDict::default);
        Self {
            columns: RwLock::new(columns),
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.read().len()
    }

    /// Intern `value` in `column`, returning its code. Re-registering an
    /// existing value returns the original code.
    ///
    /// # Panics
    ///
    /// Panics if `column` is out of range.
    pub fn register(&self, column: usize, value: &str) -> u32 {
        let mut columns = self.columns.write();
        let dict = &mut columns[column];
        if let Some(&code) = dict.index.get(value) {
            return code;
        }
        let code = u32::try_from(dict.values.len()).expect("dictionary column overflow");
        dict.values.push(value.to_owned());
        dict.index.insert(value.to_owned(), code);
        code
    }

    /// Code of `value` in `column`, if interned.
    #[must_use]
    pub fn code_of(&self, column: usize, value: &str) -> Option<u32> {
        self.columns.read().get(column)?.index.get(value).copied()
    }

    /// Value behind `code` in `column`, if any.
    #[must_use]
    pub fn value(&self, column: usize, code: u32) -> Option<String> {
        self.columns
            .read()
            .get(column)?
            .values
            .get(code as usize)
            .cloned()
    }

    /// Number of values interned in `column`.
    #[must_use]
    pub fn column_len(&self, column: usize) -> usize {
        self.columns.read().get(column).map_or(0, |c| c.values.len())
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = self.columns.read();
        f.debug_struct("Dictionary")
            .field("columns", &columns.len())
            .field(
                "sizes",
                &columns.iter().map(|c| c.values.len()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
