//! The generalization search space.
//!
//! - [`SolutionSpace`]: bijection between user-facing generalization vectors
//!   and internal lattice coordinates, plus the per-node property and score
//!   tables.
//! - [`Transformation`]: identity of one point in the space, with monotone
//!   property/score transitions and neighbor propagation.
//! - [`Lattice`] / [`LatticeNode`]: the user-facing view the search and the
//!   result facade annotate.

pub mod lattice;
pub mod solution_space;
pub mod transformation;

pub use lattice::{Lattice, LatticeNode};
pub use solution_space::SolutionSpace;
pub use transformation::Transformation;
