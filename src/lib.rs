//! Software-only mutual exclusion for up to 16 execution contexts.
//!
//! [`sync::peterson::LockPool`] is a fixed table of two-role Peterson locks.
//! [`tournament::Tournament`] stacks `n - 1` of them into a binary tree so that
//! `n` participants (a power of two) exclude each other by winning duels from
//! their leaf up to the root.

pub mod config;
pub mod error;
pub mod sync;
pub mod tournament;

pub use error::{PoolError, TournamentError};
pub use sync::peterson::{LockId, LockPool, Role, CAPACITY};
pub use tournament::{form_group, Participant, PairwiseLocks, Tournament, MAX_PARTICIPANTS};

#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
