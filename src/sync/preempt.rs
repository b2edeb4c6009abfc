// Stands in for switching interrupts off: a nesting depth per context plus a
// CAS claim per slot. The claim only covers a few stores, never a wait.

use std::cell::Cell;
use std::hint;
use std::sync::atomic::{fence, AtomicBool, Ordering};

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Keeps the current context's mask depth raised until dropped.
#[must_use]
pub struct PreemptGuard {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl PreemptGuard {
    pub fn push() -> Self {
        DEPTH.with(|d| d.set(d.get() + 1));
        Self {
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for PreemptGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| {
            let depth = d.get();
            debug_assert!(depth > 0, "unbalanced preemption unmask");
            d.set(depth.saturating_sub(1));
        });
    }
}

/// Whether the current context is inside at least one masked section.
pub fn is_masked() -> bool {
    DEPTH.with(|d| d.get() > 0)
}

pub fn depth() -> usize {
    DEPTH.with(|d| d.get())
}

/// Claim word embedded in every slot.
#[derive(Debug, Default)]
pub struct SlotMask {
    busy: AtomicBool,
}

impl SlotMask {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Masks the current context and claims the slot.
    ///
    /// Everything written before the returned guard drops is published by a
    /// full fence, both on entry and on exit.
    pub fn enter(&self) -> MaskedSection<'_> {
        let preempt = PreemptGuard::push();
        while self
            .busy
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
        fence(Ordering::SeqCst);
        MaskedSection {
            mask: self,
            _preempt: preempt,
        }
    }
}

/// A claimed slot; dropping it publishes the writes and unmasks.
#[must_use]
pub struct MaskedSection<'a> {
    mask: &'a SlotMask,
    // Dropped after `drop` below runs, so the depth falls last.
    _preempt: PreemptGuard,
}

impl Drop for MaskedSection<'_> {
    fn drop(&mut self) {
        fence(Ordering::SeqCst);
        self.mask.busy.store(false, Ordering::Release);
    }
}
