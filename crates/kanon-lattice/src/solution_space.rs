//! Coordinate systems and per-node state of the search space.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::warn;

use kanon_error::{KanonError, Result};
use kanon_types::{GeneralizationVector, Loss, PropertyKind, PropertySet};

use crate::Transformation;

/// The space of all generalization vectors between the configured per-column
/// minimum and maximum levels.
///
/// Two coordinate systems are kept in lockstep: the user-facing
/// *generalization* vector (absolute hierarchy levels) and the *internal*
/// index (levels shifted by the per-column minimum). Node ids are the
/// mixed-radix encoding of the internal index, which makes them monotone in
/// every coordinate and unique within the space.
///
/// Property bits and scores live here, keyed by id, so they can be written
/// without materializing a [`Transformation`] per node. Scores are
/// write-once: a second write with a different value is ignored and logged,
/// so no caller ever observes two distinct non-null values for one node.
pub struct SolutionSpace {
    min_levels: GeneralizationVector,
    max_levels: GeneralizationVector,
    strides: SmallVec<[u64; 8]>,
    size: u64,
    properties: RwLock<HashMap<u64, PropertySet>>,
    losses: RwLock<HashMap<u64, Loss>>,
    lower_bounds: RwLock<HashMap<u64, Loss>>,
}

impl SolutionSpace {
    /// Create a space over the given per-column level ranges (inclusive).
    pub fn new(min_levels: &[u32], max_levels: &[u32]) -> Result<Self> {
        if min_levels.len() != max_levels.len() {
            return Err(KanonError::shape_mismatch(
                format!("{} level minima", max_levels.len()),
                format!("{} level minima", min_levels.len()),
            ));
        }
        let mut size: u64 = 1;
        for (dim, (&min, &max)) in min_levels.iter().zip(max_levels).enumerate() {
            if min > max {
                return Err(KanonError::invalid_argument(format!(
                    "column {dim}: minimum level {min} exceeds maximum level {max}"
                )));
            }
            size = size
                .checked_mul(u64::from(max - min) + 1)
                .ok_or_else(|| KanonError::invalid_argument("solution space size overflows u64"))?;
        }
        // Row-major strides: the last column varies fastest.
        let dims = min_levels.len();
        let mut strides: SmallVec<[u64; 8]> = SmallVec::with_capacity(dims);
        let mut stride = 1u64;
        for dim in (0..dims).rev() {
            strides.push(stride);
            stride *= u64::from(max_levels[dim] - min_levels[dim]) + 1;
        }
        strides.reverse();
        Ok(Self {
            min_levels: SmallVec::from_slice(min_levels),
            max_levels: SmallVec::from_slice(max_levels),
            strides,
            size,
            properties: RwLock::new(HashMap::new()),
            losses: RwLock::new(HashMap::new()),
            lower_bounds: RwLock::new(HashMap::new()),
        })
    }

    /// Number of quasi-identifier columns.
    #[inline]
    #[must_use]
    pub fn num_dimensions(&self) -> usize {
        self.min_levels.len()
    }

    /// Total number of transformations in the space.
    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Per-column minimum levels.
    #[must_use]
    pub fn min_levels(&self) -> &[u32] {
        &self.min_levels
    }

    /// Per-column maximum levels.
    #[must_use]
    pub fn max_levels(&self) -> &[u32] {
        &self.max_levels
    }

    /// Highest reachable transformation level (sum of maxima).
    #[must_use]
    pub fn max_level(&self) -> u32 {
        self.max_levels.iter().sum()
    }

    /// Convert a user-facing vector to internal coordinates.
    pub fn to_internal(&self, generalization: &[u32]) -> Result<GeneralizationVector> {
        if generalization.len() != self.num_dimensions() {
            return Err(KanonError::TransformationOutOfBounds {
                detail: format!(
                    "expected {} components, got {}",
                    self.num_dimensions(),
                    generalization.len()
                ),
            });
        }
        let mut index = GeneralizationVector::with_capacity(generalization.len());
        for (dim, &level) in generalization.iter().enumerate() {
            if level < self.min_levels[dim] || level > self.max_levels[dim] {
                return Err(KanonError::TransformationOutOfBounds {
                    detail: format!(
                        "component {dim} = {level} outside [{}, {}]",
                        self.min_levels[dim], self.max_levels[dim]
                    ),
                });
            }
            index.push(level - self.min_levels[dim]);
        }
        Ok(index)
    }

    /// Convert internal coordinates back to a user-facing vector.
    #[must_use]
    pub fn from_internal(&self, index: &[u32]) -> GeneralizationVector {
        index
            .iter()
            .zip(&self.min_levels)
            .map(|(&i, &min)| i + min)
            .collect()
    }

    /// Mixed-radix id of an internal index.
    #[must_use]
    pub fn id_of(&self, index: &[u32]) -> u64 {
        index
            .iter()
            .zip(&self.strides)
            .map(|(&i, &stride)| u64::from(i) * stride)
            .sum()
    }

    /// Internal index behind an id.
    #[must_use]
    pub fn index_of(&self, id: u64) -> GeneralizationVector {
        let mut rest = id;
        let mut index = GeneralizationVector::with_capacity(self.num_dimensions());
        for &stride in &self.strides {
            index.push(u32::try_from(rest / stride).expect("index component overflow"));
            rest %= stride;
        }
        index
    }

    /// The transformation for a user-facing vector.
    pub fn transformation(&self, generalization: &[u32]) -> Result<Transformation<'_>> {
        let index = self.to_internal(generalization)?;
        Ok(Transformation::new(self, SmallVec::from_slice(generalization), index))
    }

    /// The transformation behind an id.
    #[must_use]
    pub fn transformation_by_id(&self, id: u64) -> Transformation<'_> {
        let index = self.index_of(id);
        let generalization = self.from_internal(&index);
        Transformation::new(self, generalization, index)
    }

    /// Internal indices of the direct successors of `index`.
    #[must_use]
    pub fn successors_of(&self, index: &[u32]) -> Vec<GeneralizationVector> {
        let mut out = Vec::new();
        for dim in 0..index.len() {
            if index[dim] < self.max_levels[dim] - self.min_levels[dim] {
                let mut successor = SmallVec::from_slice(index);
                successor[dim] += 1;
                out.push(successor);
            }
        }
        out
    }

    /// Internal indices of the direct predecessors of `index`.
    #[must_use]
    pub fn predecessors_of(&self, index: &[u32]) -> Vec<GeneralizationVector> {
        let mut out = Vec::new();
        for dim in 0..index.len() {
            if index[dim] > 0 {
                let mut predecessor = SmallVec::from_slice(index);
                predecessor[dim] -= 1;
                out.push(predecessor);
            }
        }
        out
    }

    /// Whether the node behind `id` carries `kind`.
    #[must_use]
    pub fn has_property(&self, id: u64, kind: PropertyKind) -> bool {
        self.properties
            .read()
            .get(&id)
            .is_some_and(|set| set.contains(kind))
    }

    /// Set `kind` on the node behind `id`. Monotone and idempotent.
    pub fn set_property(&self, id: u64, kind: PropertyKind) {
        self.properties.write().entry(id).or_default().insert(kind);
    }

    /// The full property set of the node behind `id`.
    #[must_use]
    pub fn properties_of(&self, id: u64) -> PropertySet {
        self.properties.read().get(&id).copied().unwrap_or_default()
    }

    /// Cached information loss of the node behind `id`.
    #[must_use]
    pub fn information_loss(&self, id: u64) -> Option<Loss> {
        self.losses.read().get(&id).copied()
    }

    /// Cache the information loss of the node behind `id`. First write wins;
    /// a conflicting second write is dropped with a warning.
    pub fn set_information_loss(&self, id: u64, loss: Loss) {
        set_once(&self.losses, id, loss, "information loss");
    }

    /// Cached lower bound of the node behind `id`.
    #[must_use]
    pub fn lower_bound(&self, id: u64) -> Option<Loss> {
        self.lower_bounds.read().get(&id).copied()
    }

    /// Cache the lower bound of the node behind `id`. First write wins.
    pub fn set_lower_bound(&self, id: u64, bound: Loss) {
        set_once(&self.lower_bounds, id, bound, "lower bound");
    }
}

fn set_once(table: &RwLock<HashMap<u64, Loss>>, id: u64, value: Loss, what: &str) {
    let mut table = table.write();
    match table.entry(id) {
        std::collections::hash_map::Entry::Vacant(entry) => {
            entry.insert(value);
        }
        std::collections::hash_map::Entry::Occupied(entry) => {
            let existing = *entry.get();
            if existing != value {
                warn!(
                    id,
                    existing = existing.get(),
                    rejected = value.get(),
                    "conflicting {what} write dropped"
                );
            }
        }
    }
}

impl fmt::Debug for SolutionSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolutionSpace")
            .field("dimensions", &self.num_dimensions())
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
