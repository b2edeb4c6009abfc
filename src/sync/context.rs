use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of an execution context, unique for the life of the process.
///
/// Zero is never handed out so it can stand for "no context" in an atomic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

static NEXT: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: ContextId = ContextId(NEXT.fetch_add(1, Ordering::Relaxed));
}

impl ContextId {
    pub fn current() -> Self {
        CURRENT.with(|id| *id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub(crate) fn from_raw(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}
