//! Page-level shared/exclusive locks for strict two-phase locking.

use std::collections::{HashMap, HashSet};

use log::trace;
use parking_lot::Mutex;

use crate::common::{PageId, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// One transaction's lock on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockState {
    pub tid: TransactionId,
    pub mode: LockMode,
}

#[derive(Debug, Default)]
struct LockTable {
    /// Holders of each locked page. Either every entry is shared or there is
    /// exactly one exclusive entry.
    locks: HashMap<PageId, Vec<LockState>>,
    /// The page each blocked transaction last failed to lock
    waiting: HashMap<TransactionId, PageId>,
    /// Pages locked by each transaction
    held: HashMap<TransactionId, HashSet<PageId>>,
}

impl LockTable {
    fn grant(&mut self, tid: TransactionId, page_id: PageId, mode: LockMode) -> bool {
        let states = self.locks.entry(page_id).or_default();
        match states.iter_mut().find(|state| state.tid == tid) {
            Some(state) => state.mode = mode,
            None => states.push(LockState { tid, mode }),
        }
        self.held.entry(tid).or_default().insert(page_id);
        self.waiting.remove(&tid);
        trace!("{} granted {:?} on {}", tid, mode, page_id);
        true
    }

    fn wait(&mut self, tid: TransactionId, page_id: PageId) -> bool {
        self.waiting.insert(tid, page_id);
        trace!("{} waiting on {}", tid, page_id);
        false
    }

    fn release(&mut self, tid: TransactionId, page_id: PageId) -> bool {
        let Some(states) = self.locks.get_mut(&page_id) else {
            return false;
        };
        let before = states.len();
        states.retain(|state| state.tid != tid);
        let removed = states.len() != before;
        if states.is_empty() {
            self.locks.remove(&page_id);
        }

        if let Some(pages) = self.held.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                self.held.remove(&tid);
            }
        }
        if removed {
            trace!("{} released {}", tid, page_id);
        }
        removed
    }

    /// Returns whether any transaction blocking the chain rooted at `holder`
    /// waits on a page in `held_by_requester`.
    fn waits_for_any(
        &self,
        holder: TransactionId,
        held_by_requester: &HashSet<PageId>,
        requester: TransactionId,
        visited: &mut HashSet<TransactionId>,
    ) -> bool {
        if !visited.insert(holder) {
            return false;
        }
        let Some(wait_page) = self.waiting.get(&holder) else {
            return false;
        };
        if held_by_requester.contains(wait_page) {
            return true;
        }
        self.locks.get(wait_page).is_some_and(|states| {
            states.iter().any(|state| {
                state.tid != requester
                    && self.waits_for_any(state.tid, held_by_requester, requester, visited)
            })
        })
    }
}

/// LockManager grants page locks to transactions and detects deadlocks.
///
/// Acquisition never blocks: a request that cannot be granted is recorded as
/// waiting and `false` is returned, leaving the caller to retry or abort.
/// All state sits behind a single mutex, so every decision is made against a
/// consistent view of the lock and wait tables.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to take a shared lock on `page_id` for `tid`.
    ///
    /// A transaction that already holds either lock on the page keeps it.
    pub fn acquire_shared(&self, tid: TransactionId, page_id: PageId) -> bool {
        let mut table = self.table.lock();
        let holders = match table.locks.get(&page_id) {
            Some(states) if !states.is_empty() => states,
            _ => return table.grant(tid, page_id, LockMode::Shared),
        };

        if holders.iter().any(|state| state.tid == tid) {
            // Already shared, or exclusive which covers shared
            table.waiting.remove(&tid);
            return true;
        }
        if holders.iter().any(|state| state.mode == LockMode::Exclusive) {
            return table.wait(tid, page_id);
        }
        table.grant(tid, page_id, LockMode::Shared)
    }

    /// Tries to take an exclusive lock on `page_id` for `tid`, upgrading a
    /// shared lock it holds alone.
    pub fn acquire_exclusive(&self, tid: TransactionId, page_id: PageId) -> bool {
        let mut table = self.table.lock();
        let holders = match table.locks.get(&page_id) {
            Some(states) if !states.is_empty() => states,
            _ => return table.grant(tid, page_id, LockMode::Exclusive),
        };

        if holders.iter().any(|state| state.tid != tid) {
            return table.wait(tid, page_id);
        }
        if holders.iter().any(|state| state.mode == LockMode::Exclusive) {
            table.waiting.remove(&tid);
            return true;
        }
        table.grant(tid, page_id, LockMode::Exclusive)
    }

    /// Releases `tid`'s lock on `page_id`. Returns false if it held none.
    pub fn release(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.table.lock().release(tid, page_id)
    }

    /// Releases every lock held by `tid` and forgets what it was waiting on.
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.table.lock();
        let pages: Vec<PageId> = table
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();
        for page_id in pages {
            table.release(tid, page_id);
        }
        table.waiting.remove(&tid);
    }

    /// Returns whether `tid` waiting for `page_id` would close a cycle in the
    /// waits-for graph.
    ///
    /// Starting from every other holder of `page_id`, follows wait records
    /// through the holders of each awaited page. Reaching a transaction that
    /// waits on a page `tid` holds means `tid` and that chain wait on each
    /// other.
    pub fn would_deadlock(&self, tid: TransactionId, page_id: PageId) -> bool {
        let table = self.table.lock();
        let Some(holders) = table.locks.get(&page_id) else {
            return false;
        };
        let held = match table.held.get(&tid) {
            Some(pages) if !pages.is_empty() => pages,
            _ => return false,
        };

        let mut visited = HashSet::new();
        holders.iter().any(|state| {
            state.tid != tid && table.waits_for_any(state.tid, held, tid, &mut visited)
        })
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_mode(tid, page_id).is_some()
    }

    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        self.table
            .lock()
            .locks
            .get(&page_id)?
            .iter()
            .find(|state| state.tid == tid)
            .map(|state| state.mode)
    }

    pub fn holders(&self, page_id: PageId) -> Vec<LockState> {
        self.table
            .lock()
            .locks
            .get(&page_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_exclusively_locked(&self, page_id: PageId) -> bool {
        self.table
            .lock()
            .locks
            .get(&page_id)
            .is_some_and(|states| states.iter().any(|s| s.mode == LockMode::Exclusive))
    }

    /// Returns the pages `tid` holds a lock on.
    pub fn pages_held_by(&self, tid: TransactionId) -> Vec<PageId> {
        self.table
            .lock()
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn waiting_on(&self, tid: TransactionId) -> Option<PageId> {
        self.table.lock().waiting.get(&tid).copied()
    }

    /// Forgets that `tid` is waiting, e.g. when it gives up on a request.
    pub fn clear_wait(&self, tid: TransactionId) {
        self.table.lock().waiting.remove(&tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32) -> PageId {
        PageId::new(1, n)
    }

    #[test]
    fn test_shared_locks_are_compatible() {
        let lm = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        assert!(lm.acquire_shared(t1, page(0)));
        assert!(lm.acquire_shared(t2, page(0)));
        assert_eq!(lm.holders(page(0)).len(), 2);
        assert!(!lm.is_exclusively_locked(page(0)));
    }

    #[test]
    fn test_exclusive_blocks_others() {
        let lm = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        assert!(lm.acquire_exclusive(t1, page(0)));
        assert!(!lm.acquire_shared(t2, page(0)));
        assert!(!lm.acquire_exclusive(t2, page(0)));
        assert_eq!(lm.waiting_on(t2), Some(page(0)));

        // The holder may re-request either mode
        assert!(lm.acquire_shared(t1, page(0)));
        assert!(lm.acquire_exclusive(t1, page(0)));
        assert_eq!(lm.lock_mode(t1, page(0)), Some(LockMode::Exclusive));

        assert!(lm.release(t1, page(0)));
        assert!(lm.acquire_exclusive(t2, page(0)));
        assert_eq!(lm.waiting_on(t2), None);
    }

    #[test]
    fn test_upgrade_sole_shared_holder() {
        let lm = LockManager::new();
        let t1 = TransactionId::new();

        assert!(lm.acquire_shared(t1, page(0)));
        assert!(lm.acquire_exclusive(t1, page(0)));
        assert_eq!(
            lm.holders(page(0)),
            vec![LockState {
                tid: t1,
                mode: LockMode::Exclusive
            }]
        );
    }

    #[test]
    fn test_upgrade_blocked_by_other_reader() {
        let lm = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        assert!(lm.acquire_shared(t1, page(0)));
        assert!(lm.acquire_shared(t2, page(0)));
        assert!(!lm.acquire_exclusive(t1, page(0)));
        assert_eq!(lm.lock_mode(t1, page(0)), Some(LockMode::Shared));

        // Both readers wanting to upgrade wait on each other
        assert!(!lm.acquire_exclusive(t2, page(0)));
        assert!(lm.would_deadlock(t2, page(0)));
    }

    #[test]
    fn test_release() {
        let lm = LockManager::new();
        let t1 = TransactionId::new();

        assert!(!lm.release(t1, page(0)));
        lm.acquire_shared(t1, page(0));
        assert!(lm.release(t1, page(0)));
        assert!(lm.holders(page(0)).is_empty());
        assert!(lm.pages_held_by(t1).is_empty());
    }

    #[test]
    fn test_release_all() {
        let lm = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        lm.acquire_shared(t1, page(0));
        lm.acquire_exclusive(t1, page(1));
        lm.acquire_exclusive(t1, page(2));
        assert!(!lm.acquire_shared(t2, page(1)));
        let mut held = lm.pages_held_by(t1);
        held.sort_by_key(|pid| pid.page_no());
        assert_eq!(held, vec![page(0), page(1), page(2)]);

        lm.release_all(t1);
        lm.release_all(t2);
        assert!(lm.pages_held_by(t1).is_empty());
        assert!(!lm.holds_lock(t1, page(1)));
        assert_eq!(lm.waiting_on(t2), None);
        assert!(lm.acquire_exclusive(t2, page(1)));
    }

    #[test]
    fn test_two_way_deadlock() {
        let lm = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        assert!(lm.acquire_exclusive(t1, page(0)));
        assert!(lm.acquire_exclusive(t2, page(1)));

        assert!(!lm.acquire_exclusive(t1, page(1)));
        assert!(!lm.would_deadlock(t1, page(1)));

        assert!(!lm.acquire_exclusive(t2, page(0)));
        assert!(lm.would_deadlock(t2, page(0)));
    }

    #[test]
    fn test_three_way_deadlock() {
        let lm = LockManager::new();
        let (t1, t2, t3) = (
            TransactionId::new(),
            TransactionId::new(),
            TransactionId::new(),
        );

        lm.acquire_exclusive(t1, page(0));
        lm.acquire_exclusive(t2, page(1));
        lm.acquire_exclusive(t3, page(2));

        assert!(!lm.acquire_exclusive(t1, page(1)));
        assert!(!lm.acquire_exclusive(t2, page(2)));
        assert!(!lm.would_deadlock(t2, page(2)));

        assert!(!lm.acquire_exclusive(t3, page(0)));
        assert!(lm.would_deadlock(t3, page(0)));
    }

    #[test]
    fn test_waiting_without_cycle() {
        let lm = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        lm.acquire_exclusive(t1, page(0));
        assert!(!lm.acquire_shared(t2, page(0)));
        // t2 holds nothing, so it cannot be part of a cycle
        assert!(!lm.would_deadlock(t2, page(0)));

        lm.clear_wait(t2);
        assert_eq!(lm.waiting_on(t2), None);
    }
}
