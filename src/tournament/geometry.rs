// Locks are laid out like a binary heap, root at index 0.

use crate::error::{Result, TournamentError};
use crate::sync::peterson::Role;

pub const MAX_PARTICIPANTS: usize = 16;

/// One step of a participant's path through the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duel {
    pub level: usize,
    pub role: Role,
    /// Position within the lock array.
    pub lock_index: usize,
}

/// Shape of a tree for a validated participant count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeGeometry {
    participants: usize,
    levels: usize,
}

impl TreeGeometry {
    pub fn new(participants: usize) -> Result<Self> {
        if participants == 0
            || participants > MAX_PARTICIPANTS
            || !participants.is_power_of_two()
        {
            return Err(TournamentError::InvalidCount(participants));
        }
        Ok(Self {
            participants,
            levels: participants.trailing_zeros() as usize,
        })
    }

    pub fn participants(&self) -> usize {
        self.participants
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn lock_count(&self) -> usize {
        self.participants - 1
    }

    /// Which side of the node at `level` the participant plays.
    pub fn role(&self, participant: usize, level: usize) -> Role {
        let bit = self.levels - level - 1;
        if (participant >> bit) & 1 == 0 {
            Role::Zero
        } else {
            Role::One
        }
    }

    /// Node position within `level`.
    pub fn node_offset(&self, participant: usize, level: usize) -> usize {
        participant >> (self.levels - level)
    }

    pub fn lock_index(&self, participant: usize, level: usize) -> usize {
        self.node_offset(participant, level) + (1 << level) - 1
    }

    pub fn duel(&self, participant: usize, level: usize) -> Duel {
        Duel {
            level,
            role: self.role(participant, level),
            lock_index: self.lock_index(participant, level),
        }
    }

    /// Duels in acquisition order: deepest level first, root last.
    pub fn leaf_to_root(&self, participant: usize) -> impl Iterator<Item = Duel> + '_ {
        (0..self.levels).rev().map(move |l| self.duel(participant, l))
    }

    /// Duels in release order: root first.
    pub fn root_to_leaf(&self, participant: usize) -> impl Iterator<Item = Duel> + '_ {
        (0..self.levels).map(move |l| self.duel(participant, l))
    }

    /// The participant met at `level`'s node, had it won its own subtree.
    pub fn opponent(&self, participant: usize, level: usize) -> usize {
        participant ^ (1 << (self.levels - level - 1))
    }
}
