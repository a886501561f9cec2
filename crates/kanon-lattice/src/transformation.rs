//! Identity of one point in the generalization lattice.

use std::fmt;

use smallvec::SmallVec;
use tracing::trace;

use kanon_types::{level_of, CheckOutcome, Direction, GeneralizationVector, Loss, PropertyKind};

use crate::SolutionSpace;

/// One point in the generalization lattice.
///
/// The identity (`generalization`, `index`, `id`, `level`) is fixed at
/// construction; the two vector forms are kept in lockstep by deriving both
/// from the owning [`SolutionSpace`]. Scores and property bits live in the
/// space's tables and only ever transition monotonically: a property, once
/// set, is never unset, and scores are write-once.
pub struct Transformation<'a> {
    space: &'a SolutionSpace,
    generalization: GeneralizationVector,
    index: GeneralizationVector,
    id: u64,
    level: u32,
}

impl<'a> Transformation<'a> {
    pub(crate) fn new(
        space: &'a SolutionSpace,
        generalization: GeneralizationVector,
        index: GeneralizationVector,
    ) -> Self {
        let id = space.id_of(&index);
        let level = level_of(&generalization);
        Self {
            space,
            generalization,
            index,
            id,
            level,
        }
    }

    /// The user-facing generalization vector.
    #[must_use]
    pub fn generalization(&self) -> &[u32] {
        &self.generalization
    }

    /// The vector in the lattice's internal coordinate system.
    #[must_use]
    pub fn index(&self) -> &[u32] {
        &self.index
    }

    /// Unique id within the solution space.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sum of the generalization components.
    #[inline]
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Cached information loss, if checked.
    #[must_use]
    pub fn information_loss(&self) -> Option<Loss> {
        self.space.information_loss(self.id)
    }

    /// Cached lower bound, if checked.
    #[must_use]
    pub fn lower_bound(&self) -> Option<Loss> {
        self.space.lower_bound(self.id)
    }

    /// Whether this transformation carries `kind`.
    #[must_use]
    pub fn has_property(&self, kind: PropertyKind) -> bool {
        self.space.has_property(self.id, kind)
    }

    /// Set `kind` on this transformation.
    pub fn set_property(&self, kind: PropertyKind) {
        self.space.set_property(self.id, kind);
    }

    /// Record a completed check: sets `Checked`, the anonymity
    /// classification, the minimal-class-size classification when the
    /// outcome carries one, and both scores.
    pub fn set_checked(&self, outcome: &CheckOutcome) {
        self.set_property(PropertyKind::Checked);

        if outcome.privacy_model_fulfilled {
            self.set_property(PropertyKind::Anonymous);
        } else {
            self.set_property(PropertyKind::NotAnonymous);
        }

        if let Some(fulfilled) = outcome.minimal_class_size_fulfilled {
            if fulfilled {
                self.set_property(PropertyKind::KAnonymous);
            } else {
                self.set_property(PropertyKind::NotKAnonymous);
            }
        }

        self.space.set_information_loss(self.id, outcome.information_loss);
        self.space.set_lower_bound(self.id, outcome.lower_bound);
        trace!(id = self.id, level = self.level, "transformation checked");
    }

    /// Write `kind` into the property bitmap of every direct neighbor in the
    /// property's propagation direction.
    ///
    /// The neighbor id list is snapshotted before any write, so re-indexing
    /// during the writes cannot invalidate the enumeration. Neighbor bitmaps
    /// are written directly, without materializing a `Transformation` per
    /// neighbor.
    pub fn propagate_to_neighbors(&self, kind: PropertyKind) {
        let neighbors = match kind.direction() {
            Direction::Up => self.space.successors_of(&self.index),
            Direction::Down => self.space.predecessors_of(&self.index),
            Direction::None => return,
        };
        let ids: SmallVec<[u64; 8]> =
            neighbors.iter().map(|index| self.space.id_of(index)).collect();
        for id in ids {
            self.space.set_property(id, kind);
        }
    }
}

impl fmt::Display for Transformation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Transformation {{")?;
        writeln!(f, " - Index: {:?}", self.index.as_slice())?;
        writeln!(f, " - Id: {}", self.id)?;
        writeln!(f, " - Generalization: {:?}", self.generalization.as_slice())?;
        writeln!(f, " - Level: {}", self.level)?;
        writeln!(f, " - Properties:")?;
        for kind in self.space.properties_of(self.id).iter() {
            writeln!(f, "   * {}: {:?}", kind.label(), kind.direction())?;
        }
        write!(f, "}}")
    }
}

impl fmt::Debug for Transformation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformation")
            .field("id", &self.id)
            .field("generalization", &self.generalization.as_slice())
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}
