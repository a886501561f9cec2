//! User-facing lattice view.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use kanon_error::Result;
use kanon_types::{level_of, GeneralizationVector, Loss};

use crate::SolutionSpace;

/// Cheap, copyable identity of one lattice node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatticeNode {
    id: u64,
    generalization: GeneralizationVector,
    level: u32,
}

impl LatticeNode {
    /// Unique id within the solution space.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The generalization vector.
    #[must_use]
    pub fn generalization(&self) -> &[u32] {
        &self.generalization
    }

    /// Sum of the generalization components.
    #[inline]
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct NodeState {
    checked: bool,
    anonymous: Option<bool>,
    highest_score: Option<Loss>,
    lowest_score: Option<Loss>,
    lower_bound: Option<Loss>,
}

/// The annotated lattice a finished search hands to the result facade.
///
/// Carries the global optimum, per-node check annotations, and the global
/// information-loss bound estimate.
pub struct Lattice {
    space: Arc<SolutionSpace>,
    states: RwLock<HashMap<u64, NodeState>>,
    optimum: RwLock<Option<LatticeNode>>,
    minimum_loss: RwLock<Option<Loss>>,
    maximum_loss: RwLock<Option<Loss>>,
}

impl Lattice {
    /// Create an unannotated lattice over `space`.
    #[must_use]
    pub fn new(space: Arc<SolutionSpace>) -> Self {
        Self {
            space,
            states: RwLock::new(HashMap::new()),
            optimum: RwLock::new(None),
            minimum_loss: RwLock::new(None),
            maximum_loss: RwLock::new(None),
        }
    }

    /// The underlying solution space.
    #[must_use]
    pub fn solution_space(&self) -> &Arc<SolutionSpace> {
        &self.space
    }

    /// The node for a user-facing generalization vector.
    pub fn node(&self, generalization: &[u32]) -> Result<LatticeNode> {
        let index = self.space.to_internal(generalization)?;
        Ok(LatticeNode {
            id: self.space.id_of(&index),
            generalization: GeneralizationVector::from_slice(generalization),
            level: level_of(generalization),
        })
    }

    /// The node behind an id.
    #[must_use]
    pub fn node_by_id(&self, id: u64) -> LatticeNode {
        let index = self.space.index_of(id);
        let generalization = self.space.from_internal(&index);
        let level = level_of(&generalization);
        LatticeNode {
            id,
            generalization,
            level,
        }
    }

    /// Set the global optimum.
    pub fn set_optimum(&self, node: Option<LatticeNode>) {
        *self.optimum.write() = node;
    }

    /// The global optimum, if the search found one.
    #[must_use]
    pub fn optimum(&self) -> Option<LatticeNode> {
        self.optimum.read().clone()
    }

    /// Whether the node has been fully evaluated.
    #[must_use]
    pub fn is_checked(&self, id: u64) -> bool {
        self.states.read().get(&id).is_some_and(|s| s.checked)
    }

    /// Mark the node as fully evaluated.
    pub fn set_checked(&self, id: u64) {
        self.states.write().entry(id).or_default().checked = true;
    }

    /// Anonymity classification, if annotated.
    #[must_use]
    pub fn anonymous(&self, id: u64) -> Option<bool> {
        self.states.read().get(&id).and_then(|s| s.anonymous)
    }

    /// Annotate the anonymity classification.
    pub fn set_anonymous(&self, id: u64, anonymous: bool) {
        self.states.write().entry(id).or_default().anonymous = Some(anonymous);
    }

    /// Highest known score of the node.
    #[must_use]
    pub fn highest_score(&self, id: u64) -> Option<Loss> {
        self.states.read().get(&id).and_then(|s| s.highest_score)
    }

    /// Lowest known score of the node.
    #[must_use]
    pub fn lowest_score(&self, id: u64) -> Option<Loss> {
        self.states.read().get(&id).and_then(|s| s.lowest_score)
    }

    /// Lower bound of the node.
    #[must_use]
    pub fn lower_bound(&self, id: u64) -> Option<Loss> {
        self.states.read().get(&id).and_then(|s| s.lower_bound)
    }

    /// Set the highest known score.
    pub fn set_highest_score(&self, id: u64, loss: Loss) {
        self.states.write().entry(id).or_default().highest_score = Some(loss);
    }

    /// Set the lowest known score.
    pub fn set_lowest_score(&self, id: u64, loss: Loss) {
        self.states.write().entry(id).or_default().lowest_score = Some(loss);
    }

    /// Set the lower bound.
    pub fn set_lower_bound(&self, id: u64, loss: Loss) {
        self.states.write().entry(id).or_default().lower_bound = Some(loss);
    }

    /// Re-estimate the global information-loss bounds from every annotated
    /// node.
    pub fn estimate_information_loss(&self) {
        let states = self.states.read();
        let mut minimum: Option<Loss> = None;
        let mut maximum: Option<Loss> = None;
        for state in states.values() {
            if let Some(low) = state.lower_bound.or(state.lowest_score) {
                minimum = Some(minimum.map_or(low, |m| m.min(low)));
            }
            if let Some(high) = state.highest_score {
                maximum = Some(maximum.map_or(high, |m| m.max(high)));
            }
        }
        drop(states);
        *self.minimum_loss.write() = minimum;
        *self.maximum_loss.write() = maximum;
    }

    /// Estimated global minimum information loss.
    #[must_use]
    pub fn minimum_information_loss(&self) -> Option<Loss> {
        *self.minimum_loss.read()
    }

    /// Estimated global maximum information loss.
    #[must_use]
    pub fn maximum_information_loss(&self) -> Option<Loss> {
        *self.maximum_loss.read()
    }
}

impl fmt::Debug for Lattice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lattice")
            .field("size", &self.space.size())
            .field("annotated", &self.states.read().len())
            .field("optimum", &self.optimum.read().as_ref().map(LatticeNode::id))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice() -> Lattice {
        let space = Arc::new(SolutionSpace::new(&[0, 0], &[2, 1]).expect("valid ranges"));
        Lattice::new(space)
    }

    #[test]
    fn node_identity_roundtrips() {
        let l = lattice();
        let node = l.node(&[2, 1]).expect("in range");
        assert_eq!(node.level(), 3);
        let again = l.node_by_id(node.id());
        assert_eq!(again, node);
    }

    #[test]
    fn optimum_starts_unset() {
        let l = lattice();
        assert!(l.optimum().is_none());
        let node = l.node(&[1, 0]).expect("in range");
        l.set_optimum(Some(node.clone()));
        assert_eq!(l.optimum(), Some(node));
    }

    #[test]
    fn annotations_accumulate() {
        let l = lattice();
        let node = l.node(&[1, 1]).expect("in range");
        assert!(!l.is_checked(node.id()));
        l.set_checked(node.id());
        l.set_anonymous(node.id(), true);
        l.set_highest_score(node.id(), Loss::new(0.5));
        l.set_lowest_score(node.id(), Loss::new(0.5));
        l.set_lower_bound(node.id(), Loss::new(0.25));
        assert!(l.is_checked(node.id()));
        assert_eq!(l.anonymous(node.id()), Some(true));
        assert_eq!(l.highest_score(node.id()), Some(Loss::new(0.5)));
        assert_eq!(l.lowest_score(node.id()), Some(Loss::new(0.5)));
    }

    #[test]
    fn estimate_spans_annotated_nodes() {
        let l = lattice();
        let a = l.node(&[0, 0]).expect("in range");
        let b = l.node(&[2, 1]).expect("in range");
        l.set_lowest_score(a.id(), Loss::new(0.1));
        l.set_highest_score(a.id(), Loss::new(0.1));
        l.set_lower_bound(b.id(), Loss::new(0.05));
        l.set_highest_score(b.id(), Loss::new(0.9));
        l.estimate_information_loss();
        assert_eq!(l.minimum_information_loss(), Some(Loss::new(0.05)));
        assert_eq!(l.maximum_information_loss(), Some(Loss::new(0.9)));
    }
}
