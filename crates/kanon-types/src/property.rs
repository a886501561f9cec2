//! Predictive lattice properties.
//!
//! A property set on one transformation may be implied for its neighbors:
//! direction `Up` means every successor (more generalized node) logically
//! carries it too, `Down` means every predecessor does. The lattice exploits
//! this to classify nodes without checking them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Propagation direction of a predictive property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Successors inherit the property.
    Up,
    /// Predecessors inherit the property.
    Down,
    /// The property says nothing about neighbors.
    None,
}

/// The predictive properties tracked per lattice node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertyKind {
    /// Satisfies every configured privacy model.
    Anonymous,
    /// Violates at least one configured privacy model.
    NotAnonymous,
    /// Satisfies the minimal-class-size constraint without suppression.
    KAnonymous,
    /// Violates the minimal-class-size constraint without suppression.
    NotKAnonymous,
    /// Has been fully evaluated by the node checker.
    Checked,
    /// The checker must snapshot this node's state.
    ForceSnapshot,
    /// Cannot improve on the best known score.
    InsufficientUtility,
    /// All successors have been pruned from the search.
    SuccessorsPruned,
    /// Touched by the search traversal.
    Visited,
}

impl PropertyKind {
    /// All kinds, in bit order.
    pub const ALL: [Self; 9] = [
        Self::Anonymous,
        Self::NotAnonymous,
        Self::KAnonymous,
        Self::NotKAnonymous,
        Self::Checked,
        Self::ForceSnapshot,
        Self::InsufficientUtility,
        Self::SuccessorsPruned,
        Self::Visited,
    ];

    /// Bit position of this kind inside a [`PropertySet`].
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// Propagation direction.
    ///
    /// Anonymity is monotone under generalization (merging classes never
    /// shrinks them), so `Anonymous`/`KAnonymous` propagate up and their
    /// negations down. The bookkeeping kinds do not propagate.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Anonymous | Self::KAnonymous | Self::InsufficientUtility => Direction::Up,
            Self::NotAnonymous | Self::NotKAnonymous => Direction::Down,
            Self::Checked | Self::ForceSnapshot | Self::SuccessorsPruned | Self::Visited => {
                Direction::None
            }
        }
    }

    /// Stable display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Anonymous => "ANONYMOUS",
            Self::NotAnonymous => "NOT_ANONYMOUS",
            Self::KAnonymous => "K_ANONYMOUS",
            Self::NotKAnonymous => "NOT_K_ANONYMOUS",
            Self::Checked => "CHECKED",
            Self::ForceSnapshot => "FORCE_SNAPSHOT",
            Self::InsufficientUtility => "INSUFFICIENT_UTILITY",
            Self::SuccessorsPruned => "SUCCESSORS_PRUNED",
            Self::Visited => "VISITED",
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bitmap of [`PropertyKind`]s set on one lattice node.
///
/// Properties are monotone: once set, never unset. There is deliberately no
/// `remove`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySet(u16);

impl PropertySet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Whether `kind` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, kind: PropertyKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Set `kind`. Idempotent.
    #[inline]
    pub fn insert(&mut self, kind: PropertyKind) {
        self.0 |= kind.bit();
    }

    /// Whether no property is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the set kinds in bit order.
    pub fn iter(self) -> impl Iterator<Item = PropertyKind> {
        PropertyKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_distinct() {
        let mut seen = 0u16;
        for kind in PropertyKind::ALL {
            assert_eq!(seen & kind.bit(), 0, "duplicate bit for {kind}");
            seen |= kind.bit();
        }
    }

    #[test]
    fn directions() {
        assert_eq!(PropertyKind::Anonymous.direction(), Direction::Up);
        assert_eq!(PropertyKind::NotAnonymous.direction(), Direction::Down);
        assert_eq!(PropertyKind::KAnonymous.direction(), Direction::Up);
        assert_eq!(PropertyKind::NotKAnonymous.direction(), Direction::Down);
        assert_eq!(PropertyKind::Checked.direction(), Direction::None);
        assert_eq!(PropertyKind::Visited.direction(), Direction::None);
    }

    #[test]
    fn insert_is_monotone_and_idempotent() {
        let mut set = PropertySet::EMPTY;
        assert!(set.is_empty());
        set.insert(PropertyKind::Checked);
        set.insert(PropertyKind::Checked);
        set.insert(PropertyKind::Anonymous);
        assert!(set.contains(PropertyKind::Checked));
        assert!(set.contains(PropertyKind::Anonymous));
        assert!(!set.contains(PropertyKind::NotAnonymous));
        let kinds: Vec<PropertyKind> = set.iter().collect();
        assert_eq!(kinds, vec![PropertyKind::Anonymous, PropertyKind::Checked]);
    }
}
