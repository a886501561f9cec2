//! Buffered ownership of the raw input dataset.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{DataDefinition, DataMatrix, Dictionary};

/// The raw encoded input plus the manager views derived from it.
///
/// While anonymization results exist, the handle is *locked*: the input is
/// read-only to outsiders. After a result attaches, [`update`](Self::update)
/// exposes the three manager matrices through the handle.
pub struct InputHandle {
    header: Vec<String>,
    data: DataMatrix,
    dictionary: Arc<Dictionary>,
    definition: RwLock<Option<DataDefinition>>,
    views: RwLock<Option<InputViews>>,
    locked: AtomicBool,
}

/// The three manager matrices, as exposed through the input handle.
#[derive(Debug, Clone)]
pub struct InputViews {
    pub generalized: DataMatrix,
    pub analyzed: DataMatrix,
    pub static_values: DataMatrix,
}

impl InputHandle {
    /// Wrap the encoded input.
    #[must_use]
    pub fn new(header: Vec<String>, data: DataMatrix, dictionary: Arc<Dictionary>) -> Self {
        Self {
            header,
            data,
            dictionary,
            definition: RwLock::new(None),
            views: RwLock::new(None),
            locked: AtomicBool::new(false),
        }
    }

    /// Column names.
    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// The raw encoded matrix.
    #[must_use]
    pub fn data(&self) -> &DataMatrix {
        &self.data
    }

    /// The input dictionary.
    #[must_use]
    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    /// Number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.data.num_rows()
    }

    /// Attach the data definition.
    pub fn set_definition(&self, definition: DataDefinition) {
        *self.definition.write() = Some(definition);
    }

    /// The attached definition, if any.
    #[must_use]
    pub fn definition(&self) -> Option<DataDefinition> {
        self.definition.read().clone()
    }

    /// Expose the three manager matrices through this handle.
    pub fn update(&self, generalized: DataMatrix, analyzed: DataMatrix, static_values: DataMatrix) {
        *self.views.write() = Some(InputViews {
            generalized,
            analyzed,
            static_values,
        });
    }

    /// The exposed manager matrices, if a result has attached.
    #[must_use]
    pub fn views(&self) -> Option<InputViews> {
        self.views.read().clone()
    }

    /// Lock or unlock the handle.
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::Release);
    }

    /// Whether the handle is locked by a live result.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Content fingerprint of the raw input matrix.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        self.data.fingerprint()
    }
}

impl fmt::Debug for InputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputHandle")
            .field("rows", &self.data.num_rows())
            .field("columns", &self.header.len())
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> InputHandle {
        let dictionary = Arc::new(Dictionary::new(1));
        let code = dictionary.register(0, "v");
        let matrix = DataMatrix::from_values(2, 1, vec![code, code]).expect("shape");
        InputHandle::new(vec!["a".to_owned()], matrix, dictionary)
    }

    #[test]
    fn starts_unlocked_without_definition() {
        let h = handle();
        assert!(!h.is_locked());
        assert!(h.definition().is_none());
        assert!(h.views().is_none());
        assert_eq!(h.num_rows(), 2);
    }

    #[test]
    fn lock_cycle() {
        let h = handle();
        h.set_locked(true);
        assert!(h.is_locked());
        h.set_locked(false);
        assert!(!h.is_locked());
    }

    #[test]
    fn update_exposes_views() {
        let h = handle();
        h.update(DataMatrix::new(2, 1), DataMatrix::new(2, 0), DataMatrix::new(2, 0));
        let views = h.views().expect("views attached");
        assert_eq!(views.generalized.num_rows(), 2);
    }
}
