pub mod geometry;
pub mod spawn;

use std::cell::Cell;
use std::thread;

use crate::error::{PoolError, PoolResult, Result, TournamentError};
use crate::sync::peterson::{LockId, LockPool, Role};
use crate::sync::{Mutex, Yield};

pub use geometry::{Duel, TreeGeometry, MAX_PARTICIPANTS};
use spawn::StartGate;
pub use spawn::{Spawner, ThreadSpawner};

/// The pool operations a tournament is built from.
pub trait PairwiseLocks {
    fn create(&self) -> PoolResult<LockId>;
    fn acquire(&self, id: LockId, role: Role) -> PoolResult<()>;
    fn release(&self, id: LockId, role: Role) -> PoolResult<()>;
    fn destroy(&self, id: LockId) -> PoolResult<()>;
}

impl<Y: Yield> PairwiseLocks for LockPool<Y> {
    fn create(&self) -> PoolResult<LockId> {
        LockPool::create(self)
    }
    fn acquire(&self, id: LockId, role: Role) -> PoolResult<()> {
        LockPool::acquire(self, id, role)
    }
    fn release(&self, id: LockId, role: Role) -> PoolResult<()> {
        LockPool::release(self, id, role)
    }
    fn destroy(&self, id: LockId) -> PoolResult<()> {
        LockPool::destroy(self, id)
    }
}

/// A formed group: the tree's backing locks, fixed for the group's lifetime.
///
/// Dropping the group destroys its locks; [`Tournament::dissolve`] does the
/// same but reports failures.
pub struct Tournament<'p, L: PairwiseLocks> {
    locks: &'p L,
    geometry: TreeGeometry,
    lock_ids: Vec<LockId>,
}

impl<'p, L: PairwiseLocks> Tournament<'p, L> {
    /// Validates `participants` and creates its `participants - 1` locks.
    ///
    /// If the pool runs out part way, every lock created so far is destroyed
    /// again before `Exhausted` is returned.
    pub fn form(locks: &'p L, participants: usize) -> Result<Self> {
        let geometry = TreeGeometry::new(participants)?;
        let mut lock_ids = Vec::with_capacity(geometry.lock_count());
        for _ in 0..geometry.lock_count() {
            match locks.create() {
                Ok(id) => lock_ids.push(id),
                Err(e) => {
                    tracing::warn!(
                        participants,
                        created = lock_ids.len(),
                        error = %e,
                        "lock allocation failed, rolling back"
                    );
                    let rollback_failures = destroy_all(locks, &lock_ids);
                    return Err(match e {
                        PoolError::Exhausted => TournamentError::Exhausted { rollback_failures },
                        other => TournamentError::Pool(other),
                    });
                }
            }
        }
        tracing::debug!(
            participants,
            levels = geometry.levels(),
            ?lock_ids,
            "tournament formed"
        );
        Ok(Self {
            locks,
            geometry,
            lock_ids,
        })
    }

    pub fn participants(&self) -> usize {
        self.geometry.participants()
    }

    pub fn levels(&self) -> usize {
        self.geometry.levels()
    }

    /// Backing locks in heap order, root first.
    pub fn lock_ids(&self) -> &[LockId] {
        &self.lock_ids
    }

    /// The view of participant `index`.
    ///
    /// Two live views of the same index are a caller error, just like two
    /// contexts claiming the same index.
    pub fn participant(&self, index: usize) -> Result<Participant<'_, L>> {
        if index >= self.participants() {
            return Err(TournamentError::NotFormed(index));
        }
        Ok(Participant::new(self.locks, self.geometry, &self.lock_ids, index))
    }

    /// Runs `body` once per participant, each on its own thread, and collects
    /// the results in index order.
    pub fn run<F, T>(&self, body: F) -> Result<Vec<T>>
    where
        L: Sync,
        F: Fn(Participant<'_, L>) -> T + Sync,
        T: Send,
    {
        self.run_with(&ThreadSpawner::default(), body)
    }

    /// Spawns participants `1..n` through `spawner`; the calling context
    /// plays participant 0.
    ///
    /// No participant starts `body` until all spawns succeeded. If one fails,
    /// the ones already spawned exit without running `body`.
    pub fn run_with<S, F, T>(&self, spawner: &S, body: F) -> Result<Vec<T>>
    where
        L: Sync,
        S: Spawner,
        F: Fn(Participant<'_, L>) -> T + Sync,
        T: Send,
    {
        let gate = StartGate::new();
        let body = &body;
        let gate_ref = &gate;
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.participants() - 1);
            for index in 1..self.participants() {
                let spawned =
                    spawner.spawn_scoped(scope, format!("participant-{index}"), move || {
                        if !gate_ref.wait() {
                            return None;
                        }
                        Some(body(Participant::new(
                            self.locks,
                            self.geometry,
                            &self.lock_ids,
                            index,
                        )))
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(source) => {
                        tracing::warn!(index, error = %source, "spawn failed, aborting group start");
                        gate.abort();
                        for handle in handles {
                            let _ = handle.join();
                        }
                        return Err(TournamentError::SpawnFailed { index, source });
                    }
                }
            }
            gate.open();
            tracing::debug!(participants = self.participants(), "all participants started");

            let first = body(Participant::new(
                self.locks,
                self.geometry,
                &self.lock_ids,
                0,
            ));
            let joined = handles
                .into_iter()
                .map(|handle| handle.join())
                .collect::<Vec<_>>();

            let mut results = Vec::with_capacity(self.participants());
            results.push(first);
            for (offset, outcome) in joined.into_iter().enumerate() {
                match outcome {
                    Ok(Some(value)) => results.push(value),
                    _ => return Err(TournamentError::Panicked(offset + 1)),
                }
            }
            Ok(results)
        })
    }

    /// Destroys the backing locks, returning the first failure.
    pub fn dissolve(mut self) -> Result<()> {
        let lock_ids = std::mem::take(&mut self.lock_ids);
        let mut first_err = None;
        for id in lock_ids {
            if let Err(e) = self.locks.destroy(id) {
                tracing::warn!(lock = %id, error = %e, "destroy failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(TournamentError::Pool(e)),
            None => Ok(()),
        }
    }
}

impl<L: PairwiseLocks> Drop for Tournament<'_, L> {
    fn drop(&mut self) {
        destroy_all(self.locks, &self.lock_ids);
    }
}

/// Destroys `ids`, returning how many refused.
fn destroy_all<L: PairwiseLocks>(locks: &L, ids: &[LockId]) -> usize {
    ids.iter()
        .filter(|&&id| match locks.destroy(id) {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!(lock = %id, error = %e, "destroy during cleanup failed");
                true
            }
        })
        .count()
}

/// Forms a group of `participants`, runs `body` on each, and dissolves it.
///
/// Any failure on the way leaves the pool as it was found.
pub fn form_group<L, F, T>(locks: &L, participants: usize, body: F) -> Result<Vec<T>>
where
    L: PairwiseLocks + Sync,
    F: Fn(Participant<'_, L>) -> T + Sync,
    T: Send,
{
    let tournament = Tournament::form(locks, participants)?;
    let results = tournament.run(body)?;
    tournament.dissolve()?;
    Ok(results)
}

pub fn form_group_with<L, S, F, T>(
    locks: &L,
    participants: usize,
    spawner: &S,
    body: F,
) -> Result<Vec<T>>
where
    L: PairwiseLocks + Sync,
    S: Spawner,
    F: Fn(Participant<'_, L>) -> T + Sync,
    T: Send,
{
    let tournament = Tournament::form(locks, participants)?;
    let results = tournament.run_with(spawner, body)?;
    tournament.dissolve()?;
    Ok(results)
}

/// Where a participant is in its acquire/release cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    Formed,
    Acquiring,
    Holding,
    Releasing,
}

/// One context's handle on a formed group.
pub struct Participant<'t, L: PairwiseLocks> {
    locks: &'t L,
    geometry: TreeGeometry,
    lock_ids: &'t [LockId],
    index: usize,
    state: Cell<ParticipantState>,
}

impl<'t, L: PairwiseLocks> Participant<'t, L> {
    fn new(locks: &'t L, geometry: TreeGeometry, lock_ids: &'t [LockId], index: usize) -> Self {
        Self {
            locks,
            geometry,
            lock_ids,
            index,
            state: Cell::new(ParticipantState::Formed),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn participants(&self) -> usize {
        self.geometry.participants()
    }

    pub fn state(&self) -> ParticipantState {
        self.state.get()
    }

    /// Backing lock and role this participant uses at `level`.
    pub fn lock_at(&self, level: usize) -> (LockId, Role) {
        let duel = self.geometry.duel(self.index, level);
        (self.lock_ids[duel.lock_index], duel.role)
    }

    /// Wins every duel from the leaf pairing to the root.
    ///
    /// If a level fails, the levels already won are released again, nearest
    /// the failure first, and the participant is back to `Formed`.
    pub fn acquire(&self) -> Result<()> {
        self.expect(ParticipantState::Formed, "acquire")?;
        self.state.set(ParticipantState::Acquiring);
        for duel in self.geometry.leaf_to_root(self.index) {
            let lock = self.lock_ids[duel.lock_index];
            if let Err(source) = self.locks.acquire(lock, duel.role) {
                tracing::warn!(
                    participant = self.index,
                    level = duel.level,
                    %lock,
                    error = %source,
                    "acquire failed, rolling back"
                );
                let rollback_failures = self.roll_back(duel.level);
                self.state.set(ParticipantState::Formed);
                return Err(TournamentError::Failed {
                    level: duel.level,
                    lock,
                    source,
                    rollback_failures,
                });
            }
        }
        self.state.set(ParticipantState::Holding);
        tracing::trace!(participant = self.index, "holding tournament lock");
        Ok(())
    }

    /// Leaves every duel, root first.
    ///
    /// Stops at the first pool failure; the participant is `Formed` afterwards
    /// either way.
    pub fn release(&self) -> Result<()> {
        self.expect(ParticipantState::Holding, "release")?;
        self.state.set(ParticipantState::Releasing);
        for duel in self.geometry.root_to_leaf(self.index) {
            let lock = self.lock_ids[duel.lock_index];
            if let Err(source) = self.locks.release(lock, duel.role) {
                self.state.set(ParticipantState::Formed);
                return Err(TournamentError::Failed {
                    level: duel.level,
                    lock,
                    source,
                    rollback_failures: 0,
                });
            }
        }
        self.state.set(ParticipantState::Formed);
        tracing::trace!(participant = self.index, "released tournament lock");
        Ok(())
    }

    // Releases the levels below `failed_level`, nearest first, and counts the
    // releases the pool refused.
    fn roll_back(&self, failed_level: usize) -> usize {
        let mut failures = 0;
        for level in failed_level + 1..self.geometry.levels() {
            let (lock, role) = self.lock_at(level);
            if let Err(e) = self.locks.release(lock, role) {
                tracing::warn!(
                    participant = self.index,
                    level,
                    %lock,
                    error = %e,
                    "rollback release failed"
                );
                failures += 1;
            }
        }
        failures
    }

    fn expect(&self, wanted: ParticipantState, op: &'static str) -> Result<()> {
        let state = self.state.get();
        if state != wanted {
            return Err(TournamentError::InvalidState { op, state });
        }
        Ok(())
    }
}

impl<L: PairwiseLocks> Mutex for Participant<'_, L> {
    type Error = TournamentError;
    fn acquire(&self) -> Result<()> {
        Participant::acquire(self)
    }
    fn release(&self) -> Result<()> {
        Participant::release(self)
    }
}

impl<L: PairwiseLocks> Drop for Participant<'_, L> {
    fn drop(&mut self) {
        if self.state.get() == ParticipantState::Holding {
            tracing::warn!(participant = self.index, "dropped while holding, releasing");
            if let Err(e) = Participant::release(self) {
                tracing::warn!(participant = self.index, error = %e, "release on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use crate::sync::peterson::CAPACITY;
    use rand::Rng;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
    use std::thread::{Scope, ScopedJoinHandle};
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Create(LockId),
        Acquire(LockId, Role),
        Release(LockId, Role),
        Destroy(LockId),
    }

    /// Real pool underneath, every call recorded, failures injectable.
    #[derive(Default)]
    struct Recording {
        pool: LockPool,
        calls: std::sync::Mutex<Vec<Call>>,
        creates: AtomicUsize,
        fail_create_at: Option<usize>,
        fail_acquire_of: std::sync::Mutex<Option<LockId>>,
        refuse_releases: AtomicBool,
        refuse_destroys: AtomicBool,
    }

    impl Recording {
        fn failing_create_at(n: usize) -> Self {
            Self {
                fail_create_at: Some(n),
                ..Self::default()
            }
        }

        fn fail_acquire_of(&self, id: LockId) {
            *self.fail_acquire_of.lock().unwrap() = Some(id);
        }

        fn take_calls(&self) -> Vec<Call> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl PairwiseLocks for Recording {
        fn create(&self) -> PoolResult<LockId> {
            if Some(self.creates.fetch_add(1, Ordering::SeqCst)) == self.fail_create_at {
                return Err(PoolError::Exhausted);
            }
            let id = self.pool.create()?;
            self.record(Call::Create(id));
            Ok(id)
        }
        fn acquire(&self, id: LockId, role: Role) -> PoolResult<()> {
            self.record(Call::Acquire(id, role));
            if *self.fail_acquire_of.lock().unwrap() == Some(id) {
                return Err(PoolError::Inactive(id));
            }
            self.pool.acquire(id, role)
        }
        fn release(&self, id: LockId, role: Role) -> PoolResult<()> {
            self.record(Call::Release(id, role));
            if self.refuse_releases.load(Ordering::SeqCst) {
                return Err(PoolError::Inactive(id));
            }
            self.pool.release(id, role)
        }
        fn destroy(&self, id: LockId) -> PoolResult<()> {
            self.record(Call::Destroy(id));
            if self.refuse_destroys.load(Ordering::SeqCst) {
                return Err(PoolError::AlreadyInactive(id));
            }
            self.pool.destroy(id)
        }
    }

    /// Lets `allowed` spawns through, then fails.
    struct FailingSpawner {
        allowed: usize,
        spawned: AtomicUsize,
    }

    impl Spawner for FailingSpawner {
        fn spawn_scoped<'scope, 'env, F, T>(
            &self,
            scope: &'scope Scope<'scope, 'env>,
            name: String,
            f: F,
        ) -> io::Result<ScopedJoinHandle<'scope, T>>
        where
            F: FnOnce() -> T + Send + 'scope,
            T: Send + 'scope,
        {
            if self.spawned.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err(io::Error::other("out of execution contexts"));
            }
            ThreadSpawner::default().spawn_scoped(scope, name, f)
        }
    }

    #[test]
    fn forming_four_hands_out_each_index_once() {
        crate::init_test_logging();
        let pool = LockPool::new();
        let seen = form_group(&pool, 4, |p| {
            (
                p.index(),
                pool.free_slots(),
                thread::current().name().map(str::to_owned),
            )
        })
        .unwrap();

        assert_eq!(
            seen.iter().map(|(i, _, _)| *i).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert!(seen.iter().all(|(_, free, _)| *free == CAPACITY - 3));
        for (i, _, name) in &seen[1..] {
            assert_eq!(name.as_deref(), Some(format!("participant-{i}").as_str()));
        }
        assert_eq!(pool.free_slots(), CAPACITY);
    }

    #[test]
    fn invalid_counts_create_nothing() {
        let locks = Recording::default();
        for n in [0, 3, 5, 6, 17, 32] {
            assert!(matches!(
                Tournament::form(&locks, n),
                Err(TournamentError::InvalidCount(m)) if m == n
            ));
        }
        assert!(locks.take_calls().is_empty());
        assert_eq!(locks.pool.free_slots(), CAPACITY);
    }

    #[test]
    fn acquire_climbs_and_release_descends() {
        let locks = Recording::default();
        let t = Tournament::form(&locks, 4).unwrap();
        let ids = t.lock_ids().to_vec();
        assert_eq!(ids.len(), 3);
        locks.take_calls();

        let p0 = t.participant(0).unwrap();
        p0.acquire().unwrap();
        assert_eq!(
            locks.take_calls(),
            vec![
                Call::Acquire(ids[1], Role::Zero),
                Call::Acquire(ids[0], Role::Zero)
            ]
        );
        p0.release().unwrap();
        assert_eq!(
            locks.take_calls(),
            vec![
                Call::Release(ids[0], Role::Zero),
                Call::Release(ids[1], Role::Zero)
            ]
        );

        let p3 = t.participant(3).unwrap();
        p3.acquire().unwrap();
        p3.release().unwrap();
        assert_eq!(
            locks.take_calls(),
            vec![
                Call::Acquire(ids[2], Role::One),
                Call::Acquire(ids[0], Role::One),
                Call::Release(ids[0], Role::One),
                Call::Release(ids[2], Role::One)
            ]
        );
    }

    #[test]
    fn exhausted_pool_is_left_as_found() {
        let pool = LockPool::new();
        let _hogs = (0..CAPACITY - 2)
            .map(|_| pool.create().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(pool.free_slots(), 2);
        assert!(matches!(
            Tournament::form(&pool, 4),
            Err(TournamentError::Exhausted {
                rollback_failures: 0
            })
        ));
        assert_eq!(pool.free_slots(), 2);
        // The remaining slots still serve a smaller group
        assert!(form_group(&pool, 2, |p| p.index()).is_ok());
        assert_eq!(pool.free_slots(), 2);
    }

    #[test]
    fn failed_last_create_destroys_the_earlier_ones() {
        let locks = Recording::failing_create_at(2);
        assert!(matches!(
            Tournament::form(&locks, 4),
            Err(TournamentError::Exhausted {
                rollback_failures: 0
            })
        ));
        let calls = locks.take_calls();
        let created = calls
            .iter()
            .filter_map(|c| match c {
                Call::Create(id) => Some(*id),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(created.len(), 2);
        assert_eq!(
            calls[2..],
            [Call::Destroy(created[0]), Call::Destroy(created[1])]
        );
        assert_eq!(locks.pool.free_slots(), CAPACITY);
    }

    #[test]
    fn failure_at_root_releases_won_levels_nearest_first() {
        let locks = Recording::default();
        let t = Tournament::form(&locks, 8).unwrap();
        let p = t.participant(5).unwrap();
        let (root, _) = p.lock_at(0);
        let (mid, mid_role) = p.lock_at(1);
        let (leaf, leaf_role) = p.lock_at(2);
        locks.fail_acquire_of(root);
        locks.take_calls();

        match p.acquire() {
            Err(TournamentError::Failed {
                level: 0,
                lock,
                source: PoolError::Inactive(_),
                rollback_failures: 0,
            }) => assert_eq!(lock, root),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            locks.take_calls()[3..],
            [Call::Release(mid, mid_role), Call::Release(leaf, leaf_role)]
        );
        assert_eq!(p.state(), ParticipantState::Formed);
        assert!(!locks.pool.is_interested(mid, mid_role).unwrap());
        assert!(!locks.pool.is_interested(leaf, leaf_role).unwrap());
    }

    #[test]
    fn refused_cleanup_destroys_are_counted() {
        let locks = Recording::failing_create_at(2);
        locks.refuse_destroys.store(true, Ordering::SeqCst);
        assert!(matches!(
            Tournament::form(&locks, 4),
            Err(TournamentError::Exhausted {
                rollback_failures: 2
            })
        ));
    }

    #[test]
    fn refused_rollback_releases_are_counted() {
        let locks = Recording::default();
        let t = Tournament::form(&locks, 8).unwrap();
        let p = t.participant(2).unwrap();
        let (root, _) = p.lock_at(0);
        locks.fail_acquire_of(root);
        locks.refuse_releases.store(true, Ordering::SeqCst);
        assert!(matches!(
            p.acquire(),
            Err(TournamentError::Failed {
                level: 0,
                rollback_failures: 2,
                ..
            })
        ));
        assert_eq!(p.state(), ParticipantState::Formed);
    }

    #[test]
    fn run_leaves_the_group_formed() {
        let pool = LockPool::new();
        let t = Tournament::form(&pool, 2).unwrap();
        for _ in 0..2 {
            let seen = t.run(|p| p.lock().map(|_guard| p.index())).unwrap();
            assert_eq!(seen.len(), 2);
            assert!(seen.iter().all(|r| r.is_ok()));
        }
        assert_eq!(pool.free_slots(), CAPACITY - 1);
        t.dissolve().unwrap();
        assert_eq!(pool.free_slots(), CAPACITY);
    }

    #[test]
    fn destroyed_backing_lock_fails_the_climb() {
        let pool = LockPool::new();
        let t = Tournament::form(&pool, 2).unwrap();
        let root = t.lock_ids()[0];
        pool.destroy(root).unwrap();
        let p = t.participant(0).unwrap();
        assert!(matches!(
            p.acquire(),
            Err(TournamentError::Failed {
                level: 0,
                source: PoolError::Inactive(_),
                ..
            })
        ));
        drop(p);
        assert!(matches!(
            t.dissolve(),
            Err(TournamentError::Pool(PoolError::AlreadyInactive(id))) if id == root
        ));
    }

    #[test]
    fn spawn_failure_starts_nobody_and_frees_locks() {
        crate::init_test_logging();
        let pool = LockPool::new();
        let ran = AtomicUsize::new(0);
        let spawner = FailingSpawner {
            allowed: 1,
            spawned: AtomicUsize::new(0),
        };
        let res = form_group_with(&pool, 4, &spawner, |_| {
            ran.fetch_add(1, Ordering::SeqCst);
        });
        assert!(matches!(
            res,
            Err(TournamentError::SpawnFailed { index: 2, .. })
        ));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(pool.free_slots(), CAPACITY);
    }

    #[test]
    fn panicking_participant_is_reported() {
        let pool = LockPool::new();
        let res = form_group(&pool, 4, |p| {
            if p.index() == 2 {
                panic!("participant body failed");
            }
        });
        assert!(matches!(res, Err(TournamentError::Panicked(2))));
        assert_eq!(pool.free_slots(), CAPACITY);
    }

    #[test]
    fn state_machine_rejects_out_of_order_calls() {
        let pool = LockPool::new();
        let t = Tournament::form(&pool, 2).unwrap();
        assert!(matches!(t.participant(2), Err(TournamentError::NotFormed(2))));

        let p = t.participant(1).unwrap();
        assert!(matches!(
            p.release(),
            Err(TournamentError::InvalidState {
                op: "release",
                state: ParticipantState::Formed
            })
        ));
        p.acquire().unwrap();
        assert_eq!(p.state(), ParticipantState::Holding);
        assert!(matches!(
            p.acquire(),
            Err(TournamentError::InvalidState {
                op: "acquire",
                state: ParticipantState::Holding
            })
        ));
        p.release().unwrap();
        assert_eq!(p.state(), ParticipantState::Formed);
    }

    #[test]
    fn guard_and_drop_release_the_tree() {
        let pool = LockPool::new();
        let t = Tournament::form(&pool, 2).unwrap();
        {
            let p0 = t.participant(0).unwrap();
            let guard = p0.lock().unwrap();
            drop(guard);
            assert_eq!(p0.state(), ParticipantState::Formed);
            p0.acquire().unwrap();
            // Dropped while holding
        }
        let p1 = t.participant(1).unwrap();
        p1.acquire().unwrap();
        p1.release().unwrap();
        drop(p1);
        drop(t);
        assert_eq!(pool.free_slots(), CAPACITY);
    }

    #[test]
    fn lone_participant_needs_no_locks() {
        let pool = LockPool::new();
        let res = form_group(&pool, 1, |p| {
            assert_eq!(pool.free_slots(), CAPACITY);
            p.acquire().and_then(|()| p.release())
        })
        .unwrap();
        assert_eq!(res.len(), 1);
        assert!(res[0].is_ok());
    }

    fn mutual_exclusion(n: usize, work: i32) {
        crate::init_test_logging();
        let pool = LockPool::new();
        let incr = AtomicI32::new(0);
        let decr = AtomicI32::new(0);
        let inside = AtomicUsize::new(0);
        form_group(&pool, n, |p| {
            let mut rng = rand::thread_rng();
            for _ in 0..work {
                let _guard = p.lock().unwrap();
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                if p.index() % 2 == 0 {
                    let i = incr.load(Ordering::Relaxed);
                    let d = decr.load(Ordering::Relaxed);
                    incr.store(i + 1, Ordering::Relaxed);
                    decr.store(d - 1, Ordering::Relaxed);
                } else {
                    let d = decr.load(Ordering::Relaxed);
                    let i = incr.load(Ordering::Relaxed);
                    decr.store(d - 1, Ordering::Relaxed);
                    incr.store(i + 1, Ordering::Relaxed);
                }
                if rng.gen_ratio(1, 200) {
                    thread::sleep(Duration::from_micros(rng.gen_range(0..=100)));
                }
                inside.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .unwrap();
        assert_eq!(incr.load(Ordering::Relaxed), work * n as i32);
        assert_eq!(decr.load(Ordering::Relaxed), -work * n as i32);
        assert_eq!(pool.free_slots(), CAPACITY);
    }

    #[test]
    fn mutual_exclusion_of_two() {
        mutual_exclusion(2, 20_000);
    }

    #[test]
    fn mutual_exclusion_of_four() {
        mutual_exclusion(4, 5_000);
    }

    #[test]
    fn mutual_exclusion_of_sixteen() {
        // Uses every slot of the pool
        mutual_exclusion(16, 300);
    }

    #[test]
    fn every_participant_gets_in() {
        const ROUNDS: usize = 200;
        let pool = LockPool::new();
        let entries = (0..8).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>();
        form_group(&pool, 8, |p| {
            for _ in 0..ROUNDS {
                p.acquire().unwrap();
                entries[p.index()].fetch_add(1, Ordering::SeqCst);
                p.release().unwrap();
            }
        })
        .unwrap();
        assert!(entries.iter().all(|e| e.load(Ordering::SeqCst) == ROUNDS));
    }
}
