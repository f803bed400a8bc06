//! Shard metadata locks.

use std::sync::Arc;

use fnv::FnvHashMap as HashMap;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::{DistributionLocks, LockMode, ShardId};

#[derive(Debug, Default, Clone, Copy)]
struct LockState {
    share: usize,
    exclusive: bool,
}

impl LockState {
    fn grantable(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Share => !self.exclusive,
            LockMode::Exclusive => !self.exclusive && self.share == 0,
        }
    }

    fn is_free(&self) -> bool {
        !self.exclusive && self.share == 0
    }
}

/// Lock table shared by all planners.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<ShardId, LockState>>,
    released: Condvar,
}

impl LockManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn acquire(&self, shard_id: ShardId, mode: LockMode) {
        let mut locks = self.locks.lock();
        while !locks.entry(shard_id).or_default().grantable(mode) {
            self.released.wait(&mut locks);
        }
        Self::grant(&mut locks, shard_id, mode);
    }

    fn try_acquire(&self, shard_id: ShardId, mode: LockMode) -> bool {
        let mut locks = self.locks.lock();
        if locks.entry(shard_id).or_default().grantable(mode) {
            Self::grant(&mut locks, shard_id, mode);
            true
        } else {
            false
        }
    }

    fn grant(locks: &mut HashMap<ShardId, LockState>, shard_id: ShardId, mode: LockMode) {
        let state = locks.entry(shard_id).or_default();
        match mode {
            LockMode::Share => state.share += 1,
            LockMode::Exclusive => state.exclusive = true,
        }
    }

    fn release(&self, shard_id: ShardId, mode: LockMode) {
        let mut locks = self.locks.lock();
        if let Some(state) = locks.get_mut(&shard_id) {
            match mode {
                LockMode::Share => state.share = state.share.saturating_sub(1),
                LockMode::Exclusive => state.exclusive = false,
            }
            if state.is_free() {
                locks.remove(&shard_id);
            }
        }
        self.released.notify_all();
    }

    /// Number of share holders of a shard.
    pub fn share_holders(&self, shard_id: ShardId) -> usize {
        self.locks
            .lock()
            .get(&shard_id)
            .map(|state| state.share)
            .unwrap_or_default()
    }
}

/// Locks taken by one planning and execution unit. Released on drop.
#[derive(Debug)]
pub struct ShardLocks {
    manager: Arc<LockManager>,
    held: Mutex<Vec<(ShardId, LockMode)>>,
}

impl ShardLocks {
    pub fn new(manager: Arc<LockManager>) -> Self {
        Self {
            manager,
            held: Mutex::new(vec![]),
        }
    }

    /// Acquire without waiting. Returns `false` if the lock is taken.
    pub fn try_lock_shard_metadata(&self, shard_id: ShardId, mode: LockMode) -> bool {
        let acquired = self.manager.try_acquire(shard_id, mode);
        if acquired {
            self.held.lock().push((shard_id, mode));
        }
        acquired
    }

    /// Shards locked by this unit, in acquisition order.
    pub fn held(&self) -> Vec<ShardId> {
        self.held.lock().iter().map(|(shard_id, _)| *shard_id).collect()
    }

    /// End of the unit: release everything.
    pub fn release_all(&self) {
        let held = std::mem::take(&mut *self.held.lock());
        for (shard_id, mode) in held {
            self.manager.release(shard_id, mode);
        }
    }
}

impl DistributionLocks for ShardLocks {
    fn lock_shard_metadata(&self, shard_id: ShardId, mode: LockMode) {
        trace!("locking metadata of shard {} [{:?}]", shard_id, mode);
        self.manager.acquire(shard_id, mode);
        self.held.lock().push((shard_id, mode));
    }
}

impl Drop for ShardLocks {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod test {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn test_share_locks_coexist() {
        let manager = LockManager::new();
        let first = ShardLocks::new(manager.clone());
        let second = ShardLocks::new(manager.clone());

        first.lock_shard_metadata(ShardId(1), LockMode::Share);
        second.lock_shard_metadata(ShardId(1), LockMode::Share);
        assert_eq!(manager.share_holders(ShardId(1)), 2);

        drop(first);
        assert_eq!(manager.share_holders(ShardId(1)), 1);
        assert_eq!(second.held(), vec![ShardId(1)]);
    }

    #[test]
    fn test_exclusive_waits_for_share() {
        let manager = LockManager::new();
        let planner = ShardLocks::new(manager.clone());
        let rebalancer = ShardLocks::new(manager.clone());

        planner.lock_shard_metadata(ShardId(7), LockMode::Share);
        assert!(!rebalancer.try_lock_shard_metadata(ShardId(7), LockMode::Exclusive));

        // Unrelated shards don't contend.
        assert!(rebalancer.try_lock_shard_metadata(ShardId(8), LockMode::Exclusive));

        let handle = thread::spawn(move || {
            rebalancer.lock_shard_metadata(ShardId(7), LockMode::Exclusive);
            rebalancer.held()
        });

        thread::sleep(Duration::from_millis(20));
        planner.release_all();

        let held = handle.join().unwrap();
        assert_eq!(held, vec![ShardId(8), ShardId(7)]);
        assert_eq!(manager.share_holders(ShardId(7)), 0);
    }
}
