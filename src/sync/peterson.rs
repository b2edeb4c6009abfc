use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;

use super::context::ContextId;
use super::preempt::{self, SlotMask};
use super::{Mutex, ThreadYield, Yield};
use crate::error::{PoolError, PoolResult};

/// Number of lock instances that can be live at once.
pub const CAPACITY: usize = 15;

const NO_OWNER: u64 = 0;

/// Handle of a slot in a [`LockPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockId(usize);

impl LockId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for LockId {
    fn from(raw: usize) -> Self {
        Self(raw)
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One of the two parties of a Peterson lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Zero = 0,
    One = 1,
}

impl Role {
    pub fn peer(self) -> Self {
        match self {
            Role::Zero => Role::One,
            Role::One => Role::Zero,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    fn as_turn(self) -> u8 {
        self as u8
    }
}

impl TryFrom<usize> for Role {
    type Error = PoolError;
    fn try_from(raw: usize) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Role::Zero),
            1 => Ok(Role::One),
            other => Err(PoolError::InvalidRole(other)),
        }
    }
}

impl TryFrom<u8> for Role {
    type Error = PoolError;
    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Role::try_from(usize::from(raw))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// State of one Peterson lock.
///
/// `active == false` implies both `wants` are false.
struct Slot {
    index: usize,
    active: AtomicBool,
    wants: [AtomicBool; 2],
    turn: AtomicU8,
    owner: AtomicU64,
    mask: SlotMask,
}

impl Slot {
    fn new(index: usize) -> Self {
        Self {
            index,
            active: AtomicBool::new(false),
            wants: [AtomicBool::new(false), AtomicBool::new(false)],
            turn: AtomicU8::new(0),
            owner: AtomicU64::new(NO_OWNER),
            mask: SlotMask::new(),
        }
    }

    fn id(&self) -> LockId {
        LockId(self.index)
    }

    fn clear(&self) {
        self.wants[0].store(false, Ordering::SeqCst);
        self.wants[1].store(false, Ordering::SeqCst);
        self.turn.store(0, Ordering::SeqCst);
        self.owner.store(NO_OWNER, Ordering::SeqCst);
    }

    /// `role` must keep waiting while the peer wants in and `role` yielded last.
    fn must_wait(&self, role: Role) -> bool {
        self.wants[role.peer().index()].load(Ordering::SeqCst)
            && self.turn.load(Ordering::SeqCst) == role.as_turn()
    }
}

/// Fixed table of two-role Peterson locks.
///
/// Slots are claimed and released with atomic swaps, never under a lock, so the
/// pool can be the first synchronisation primitive a system builds.
pub struct LockPool<Y = ThreadYield> {
    slots: [Slot; CAPACITY],
    yielder: Y,
}

impl LockPool {
    pub fn new() -> Self {
        Self::with_yield(ThreadYield)
    }

    /// The process-wide pool.
    pub fn global() -> &'static LockPool {
        static POOL: OnceLock<LockPool> = OnceLock::new();
        POOL.get_or_init(LockPool::new)
    }
}

impl Default for LockPool {
    fn default() -> Self {
        Self::new()
    }
}

impl<Y: Yield> LockPool<Y> {
    /// A pool whose waiters suspend through `yielder`.
    pub fn with_yield(yielder: Y) -> Self {
        Self {
            slots: std::array::from_fn(Slot::new),
            yielder,
        }
    }

    pub fn capacity(&self) -> usize {
        CAPACITY
    }

    /// Claims the first inactive slot.
    pub fn create(&self) -> PoolResult<LockId> {
        for slot in &self.slots {
            if slot.active.load(Ordering::Relaxed) {
                continue;
            }
            let _masked = slot.mask.enter();
            if slot.active.swap(true, Ordering::SeqCst) {
                continue;
            }
            slot.clear();
            tracing::debug!(lock = %slot.id(), "created peterson lock");
            return Ok(slot.id());
        }
        tracing::debug!("peterson lock pool exhausted");
        Err(PoolError::Exhausted)
    }

    /// Enters the lock as `role`, waiting for the peer to leave or to yield priority.
    ///
    /// Fails with `Inactive` if the slot is not live, including when it is
    /// destroyed while this call waits.
    pub fn acquire(&self, id: LockId, role: Role) -> PoolResult<()> {
        let slot = self.slot(id)?;
        {
            let _masked = slot.mask.enter();
            if !slot.active.load(Ordering::SeqCst) {
                return Err(PoolError::Inactive(id));
            }
            slot.wants[role.index()].store(true, Ordering::SeqCst);
            slot.turn.store(role.as_turn(), Ordering::SeqCst);
        }

        while slot.must_wait(role) {
            if !slot.active.load(Ordering::SeqCst) {
                return Err(PoolError::Inactive(id));
            }
            debug_assert!(!preempt::is_masked(), "yielding with preemption masked");
            self.yielder.yield_now();
        }
        {
            // `destroy` deactivates before clearing `wants`, so a wait ended by
            // the clearing still sees the slot inactive here.
            let _masked = slot.mask.enter();
            if !slot.active.load(Ordering::SeqCst) {
                return Err(PoolError::Inactive(id));
            }
            slot.owner.store(ContextId::current().as_u64(), Ordering::SeqCst);
        }
        tracing::trace!(lock = %id, %role, "acquired");
        Ok(())
    }

    /// Leaves the lock as `role`.
    ///
    /// The caller must currently hold `id` as `role`; this is not checked.
    pub fn release(&self, id: LockId, role: Role) -> PoolResult<()> {
        let slot = self.slot(id)?;
        let _masked = slot.mask.enter();
        if !slot.active.load(Ordering::SeqCst) {
            return Err(PoolError::Inactive(id));
        }
        slot.wants[role.index()].store(false, Ordering::SeqCst);
        slot.owner.store(NO_OWNER, Ordering::SeqCst);
        tracing::trace!(lock = %id, %role, "released");
        Ok(())
    }

    /// Deactivates the slot, then clears it.
    ///
    /// Destroying a lock somebody still holds leaves that holder's release
    /// failing with `Inactive`.
    pub fn destroy(&self, id: LockId) -> PoolResult<()> {
        let slot = self.slot(id)?;
        let _masked = slot.mask.enter();
        if !slot.active.swap(false, Ordering::SeqCst) {
            return Err(PoolError::AlreadyInactive(id));
        }
        slot.clear();
        tracing::debug!(lock = %id, "destroyed peterson lock");
        Ok(())
    }

    pub fn free_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !s.active.load(Ordering::SeqCst))
            .count()
    }

    pub fn is_active(&self, id: LockId) -> PoolResult<bool> {
        Ok(self.slot(id)?.active.load(Ordering::SeqCst))
    }

    /// Context that last won the lock and has not yet released it.
    pub fn holder(&self, id: LockId) -> PoolResult<Option<ContextId>> {
        Ok(ContextId::from_raw(self.slot(id)?.owner.load(Ordering::SeqCst)))
    }

    /// Whether `role` has announced interest in (or holds) the lock.
    pub fn is_interested(&self, id: LockId, role: Role) -> PoolResult<bool> {
        Ok(self.slot(id)?.wants[role.index()].load(Ordering::SeqCst))
    }

    fn slot(&self, id: LockId) -> PoolResult<&Slot> {
        self.slots.get(id.0).ok_or(PoolError::InvalidId(id.0))
    }
}

/// One role's view of one pool lock.
pub struct PetersonHandle<'p, Y = ThreadYield> {
    pool: &'p LockPool<Y>,
    id: LockId,
    role: Role,
}

impl<'p, Y: Yield> PetersonHandle<'p, Y> {
    pub fn new(pool: &'p LockPool<Y>, id: LockId, role: Role) -> Self {
        Self { pool, id, role }
    }
}

impl<Y: Yield> Mutex for PetersonHandle<'_, Y> {
    type Error = PoolError;
    fn acquire(&self) -> PoolResult<()> {
        self.pool.acquire(self.id, self.role)
    }
    fn release(&self) -> PoolResult<()> {
        self.pool.release(self.id, self.role)
    }
}
