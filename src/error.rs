use thiserror::Error;

use crate::sync::peterson::LockId;
use crate::tournament::ParticipantState;

/// Failure of a single pool operation.
///
/// `InvalidId` and `InvalidRole` are caught before any shared state is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("lock id {0} is outside the pool")]
    InvalidId(usize),

    #[error("role {0} is neither 0 nor 1")]
    InvalidRole(usize),

    /// The slot was never created, or it has been destroyed.
    #[error("lock {0} is not active")]
    Inactive(LockId),

    #[error("no free lock slot left in the pool")]
    Exhausted,

    #[error("lock {0} was already destroyed")]
    AlreadyInactive(LockId),
}

/// Failure of a tournament operation.
#[derive(Debug, Error)]
pub enum TournamentError {
    /// Participant count is not a power of two in `1..=16`.
    #[error("participant count {0} is not a power of two between 1 and 16")]
    InvalidCount(usize),

    /// Not enough free slots. `rollback_failures` counts locks of this attempt
    /// that could not be destroyed again.
    #[error("not enough free lock slots to form the group")]
    Exhausted { rollback_failures: usize },

    #[error("failed to spawn participant {index}")]
    SpawnFailed {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    /// No participant with this index exists in the formed group.
    #[error("participant {0} is not part of a formed group")]
    NotFormed(usize),

    #[error("participant cannot {op} while {state:?}")]
    InvalidState {
        op: &'static str,
        state: ParticipantState,
    },

    /// A pairwise lock on the participant's path refused the operation.
    ///
    /// `rollback_failures` counts already won levels whose release failed
    /// while backing out.
    #[error("pairwise lock {lock} at level {level} failed")]
    Failed {
        level: usize,
        lock: LockId,
        #[source]
        source: PoolError,
        rollback_failures: usize,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A spawned participant panicked while running the group body.
    #[error("participant {0} panicked")]
    Panicked(usize),
}

pub type PoolResult<T> = std::result::Result<T, PoolError>;

pub type Result<T> = std::result::Result<T, TournamentError>;
