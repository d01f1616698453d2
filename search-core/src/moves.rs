//! Joint moves.
//!
//! A joint move assigns one legal-index to every role; it is the label on a
//! search-tree edge. The indices are kept inline (games rarely exceed a
//! handful of roles) so edges can be compared and copied without touching
//! the heap.

use smallvec::SmallVec;

/// Index of a role within a game (0-based).
pub type RoleIndex = usize;

/// A game-specific legal move identifier, dense per role.
pub type LegalIndex = u16;

/// One legal-index per role, describing a single transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JointMove {
    indices: SmallVec<[LegalIndex; 4]>,
}

impl JointMove {
    /// A joint move with every role's index set to 0.
    pub fn new(role_count: usize) -> Self {
        Self {
            indices: SmallVec::from_elem(0, role_count),
        }
    }

    /// Build from explicit per-role indices.
    pub fn from_indices(indices: &[LegalIndex]) -> Self {
        Self {
            indices: SmallVec::from_slice(indices),
        }
    }

    /// Number of roles this move covers.
    #[inline]
    pub fn role_count(&self) -> usize {
        self.indices.len()
    }

    /// The legal-index chosen for `role`.
    #[inline]
    pub fn get(&self, role: RoleIndex) -> LegalIndex {
        self.indices[role]
    }

    /// Set the legal-index for `role`.
    #[inline]
    pub fn set(&mut self, role: RoleIndex, legal: LegalIndex) {
        self.indices[role] = legal;
    }

    /// Iterate over the per-role indices.
    pub fn iter(&self) -> impl Iterator<Item = LegalIndex> + '_ {
        self.indices.iter().copied()
    }
}
