//! Tracking of live output handles and the buffer lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use kanon_types::RowSet;

use crate::OutputHandle;

/// Buffer lock state: at most one unforked output handle exists at a time.
enum LockState {
    /// Any forked output may be created.
    Free,
    /// `handle` is the single unforked output, produced from `node`.
    Locked { handle: Arc<OutputHandle>, node: u64 },
}

/// Tracks live output handles per lattice node and enforces the buffer lock.
///
/// The lock is a two-state machine: `Free | Locked{handle, node}`. Creating
/// a forked output is legal only in `Free`; releasing the locked handle
/// returns to `Free` and is a no-op for any other handle.
pub struct ResultRegistry {
    lock: Mutex<LockState>,
    outputs: Mutex<HashMap<u64, Arc<OutputHandle>>>,
    input_subset: Mutex<Option<RowSet>>,
}

impl ResultRegistry {
    /// Create an empty registry in the `Free` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(LockState::Free),
            outputs: Mutex::new(HashMap::new()),
            input_subset: Mutex::new(None),
        }
    }

    /// The locked handle and its node, when in the `Locked` state.
    #[must_use]
    pub fn locked(&self) -> Option<(Arc<OutputHandle>, u64)> {
        match &*self.lock.lock() {
            LockState::Free => None,
            LockState::Locked { handle, node } => Some((Arc::clone(handle), *node)),
        }
    }

    /// Whether an unforked handle is outstanding.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked().is_some()
    }

    /// Transition to `Locked{handle, node}`.
    pub(crate) fn set_lock(&self, handle: Arc<OutputHandle>, node: u64) {
        debug!(node, "buffer locked by unforked handle");
        *self.lock.lock() = LockState::Locked { handle, node };
    }

    /// Record a live handle for `node`.
    pub(crate) fn register_output(&self, node: u64, handle: Arc<OutputHandle>) {
        self.outputs.lock().insert(node, handle);
    }

    /// The live handle for `node`, if any.
    #[must_use]
    pub fn output_handle(&self, node: u64) -> Option<Arc<OutputHandle>> {
        self.outputs.lock().get(&node).map(Arc::clone)
    }

    /// Release `handle`: drop it from the handle cache and, when it holds
    /// the buffer lock, return to `Free`. A no-op for unknown handles.
    pub fn release(&self, handle: &OutputHandle) {
        let mut outputs = self.outputs.lock();
        if let Some(existing) = outputs.get(&handle.node().id()) {
            if std::ptr::eq(Arc::as_ptr(existing), handle) {
                outputs.remove(&handle.node().id());
            }
        }
        drop(outputs);

        let mut lock = self.lock.lock();
        if let LockState::Locked { handle: locked, node } = &*lock {
            if std::ptr::eq(Arc::as_ptr(locked), handle) {
                debug!(node = *node, "buffer lock released");
                *lock = LockState::Free;
            }
        }
    }

    /// Record the input subset the configuration restricts analysis to.
    pub fn create_input_subset(&self, subset: Option<RowSet>) {
        *self.input_subset.lock() = subset;
    }

    /// The recorded input subset, if any.
    #[must_use]
    pub fn input_subset(&self) -> Option<RowSet> {
        self.input_subset.lock().clone()
    }
}

impl Default for ResultRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResultRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultRegistry")
            .field("locked", &self.is_locked())
            .field("outputs", &self.outputs.lock().len())
            .finish_non_exhaustive()
    }
}
