pub mod context;
pub mod peterson;
pub mod preempt;

/// A lock held by one party at a time, released explicitly or through its guard.
///
/// The requirements are
/// 1. Mutual Exclusion - at most one holder is between `acquire()` and `release()`.
/// 2. No Starvation - assuming the scheduler eventually runs every context, a waiting
///    holder is admitted within a bounded number of its peers' critical sections.
pub trait Mutex {
    type Error: std::fmt::Display;

    fn acquire(&self) -> Result<(), Self::Error>;
    fn release(&self) -> Result<(), Self::Error>;

    fn lock(&self) -> Result<MutexGuard<'_, Self>, Self::Error>
    where
        Self: Sized,
    {
        self.acquire()?;
        Ok(MutexGuard { mutex: self })
    }
}

/// Releases the mutex when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct MutexGuard<'a, M: Mutex> {
    mutex: &'a M,
}

impl<M: Mutex> Drop for MutexGuard<'_, M> {
    fn drop(&mut self) {
        // Drop cannot report, so the failure at least reaches the log
        if let Err(e) = self.mutex.release() {
            tracing::warn!(error = %e, "release on guard drop failed");
        }
    }
}

/// Hands the rest of the caller's time slice back to the scheduler.
///
/// This is the only point where a waiting `acquire` suspends.
pub trait Yield {
    fn yield_now(&self);
}

/// Yields the OS thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadYield;

impl Yield for ThreadYield {
    fn yield_now(&self) {
        std::thread::yield_now()
    }
}

impl<F: Fn()> Yield for F {
    fn yield_now(&self) {
        self()
    }
}
