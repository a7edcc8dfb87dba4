//! Page-granularity lock manager.
//!
//! Each page has its own mutex/condvar pair, created lazily in a shared
//! registry. Shared locks are held by a set of transactions, exclusive locks by
//! exactly one. Before a request blocks, the requester's wait-for edges are
//! added to a global [`WaitForGraph`]; if that would close a cycle the request
//! fails with [`StorageError::Deadlock`] instead of waiting.
//!
//! Lock order: page state -> wait-for graph -> transaction record.

use crate::concurrency::wait_for::WaitForGraph;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use dashmap::DashMap;
use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read operations.
    Shared,
    /// Exclusive lock for write operations.
    Exclusive,
}

impl LockMode {
    /// Checks if this lock mode is compatible with another.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

/// Holders of one page's lock. `shared` and `exclusive` are never both set.
#[derive(Debug, Default)]
struct LockState {
    shared: HashSet<TransactionId>,
    exclusive: Option<TransactionId>,
}

impl LockState {
    fn can_grant(&self, tid: TransactionId, mode: LockMode) -> bool {
        self.conflicting_holders(tid, mode).is_empty()
    }

    /// Holders other than `tid` whose lock is incompatible with `mode`. A sole
    /// shared holder asking for exclusive conflicts with nobody (upgrade).
    fn conflicting_holders(&self, tid: TransactionId, mode: LockMode) -> Vec<TransactionId> {
        self.shared
            .iter()
            .map(|holder| (*holder, LockMode::Shared))
            .chain(self.exclusive.map(|holder| (holder, LockMode::Exclusive)))
            .filter(|(holder, held)| *holder != tid && !mode.is_compatible_with(held))
            .map(|(holder, _)| holder)
            .collect()
    }

    fn grant(&mut self, tid: TransactionId, mode: LockMode) {
        match mode {
            LockMode::Shared => {
                if self.exclusive != Some(tid) {
                    self.shared.insert(tid);
                }
            }
            LockMode::Exclusive => {
                self.shared.clear();
                self.exclusive = Some(tid);
            }
        }
    }

    fn release(&mut self, tid: TransactionId) {
        if self.exclusive == Some(tid) {
            self.exclusive = None;
        }
        self.shared.remove(&tid);
    }

    fn mode_of(&self, tid: TransactionId) -> Option<LockMode> {
        if self.exclusive == Some(tid) {
            Some(LockMode::Exclusive)
        } else if self.shared.contains(&tid) {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    fn is_free(&self) -> bool {
        self.exclusive.is_none() && self.shared.is_empty()
    }
}

#[derive(Debug, Default)]
struct PageLock {
    state: Mutex<LockState>,
    cv: Condvar,
}

/// Per-transaction bookkeeping, created on first use.
#[derive(Debug, Default)]
struct TxnLocks {
    held: Mutex<HashSet<PageId>>,
    waiting_on: Mutex<Option<PageId>>,
    interrupted: AtomicBool,
}

pub struct LockManager {
    page_locks: DashMap<PageId, Arc<PageLock>>,
    transactions: DashMap<TransactionId, Arc<TxnLocks>>,
    wait_for: Mutex<WaitForGraph>,
}

impl LockManager {
    /// Creates a lock manager with no locks held.
    pub fn new() -> Self {
        Self {
            page_locks: DashMap::new(),
            transactions: DashMap::new(),
            wait_for: Mutex::new(WaitForGraph::new()),
        }
    }

    fn page_lock(&self, pid: PageId) -> Arc<PageLock> {
        Arc::clone(self.page_locks.entry(pid).or_default().value())
    }

    fn record(&self, tid: TransactionId) -> Arc<TxnLocks> {
        Arc::clone(self.transactions.entry(tid).or_default().value())
    }

    /// Acquires `mode` on `pid` for `tid`, blocking while a conflicting lock
    /// is held by another transaction.
    ///
    /// Fails with [`StorageError::Deadlock`] if waiting would close a cycle in
    /// the wait-for graph, and with [`StorageError::Interrupted`] if
    /// [`LockManager::interrupt`] is called for `tid`. Neither failure grants
    /// anything. Grants are not FIFO.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> StorageResult<()> {
        let page_lock = self.page_lock(pid);
        let record = self.record(tid);
        let mut state = page_lock.state.lock();

        while !state.can_grant(tid, mode) {
            let holders = state.conflicting_holders(tid, mode);
            {
                let mut graph = self.wait_for.lock();
                if !graph.add_waits(tid, pid, &holders) {
                    graph.resolve_wait(tid, pid);
                    warn!(
                        "{} denied {:?} lock on {}: waiting on {:?} would deadlock",
                        tid, mode, pid, holders
                    );
                    return Err(StorageError::Deadlock { tid, page_id: pid });
                }
            }

            *record.waiting_on.lock() = Some(pid);
            if record.interrupted.swap(false, Ordering::SeqCst) {
                *record.waiting_on.lock() = None;
                self.wait_for.lock().resolve_wait(tid, pid);
                warn!("{} interrupted while waiting for {}", tid, pid);
                return Err(StorageError::Interrupted(tid));
            }

            trace!("{} waiting for {:?} lock on {}", tid, mode, pid);
            page_lock.cv.wait(&mut state);
            *record.waiting_on.lock() = None;
        }

        state.grant(tid, mode);
        self.wait_for.lock().resolve_wait(tid, pid);
        record.held.lock().insert(pid);
        trace!("{} granted {:?} lock on {}", tid, mode, pid);
        Ok(())
    }

    /// Releases whatever lock `tid` holds on `pid` and wakes the page's waiters.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let Some(page_lock) = self.page_locks.get(&pid).map(|e| Arc::clone(e.value())) else {
            return;
        };

        {
            let mut state = page_lock.state.lock();
            state.release(tid);
            self.wait_for.lock().release(tid, pid);
            if let Some(record) = self.transactions.get(&tid) {
                record.held.lock().remove(&pid);
            }
        }
        page_lock.cv.notify_all();
        drop(page_lock);

        // Drop the registry entry once nobody holds, waits on, or references it.
        self.page_locks
            .remove_if(&pid, |_, lock| Arc::strong_count(lock) == 1 && lock.state.lock().is_free());
    }

    /// Releases every lock held by `tid` and forgets the transaction.
    pub fn release_all(&self, tid: TransactionId) {
        let pages: Vec<PageId> = self
            .transactions
            .get(&tid)
            .map(|record| record.held.lock().iter().copied().collect())
            .unwrap_or_default();

        for pid in &pages {
            self.release(tid, *pid);
        }
        self.wait_for.lock().remove_transaction(tid);
        self.transactions.remove(&tid);
        debug!("{} released {} page locks", tid, pages.len());
    }

    /// Cancels the current (or next) blocking wait of `tid`.
    ///
    /// The interrupt stays pending until `tid` next has to block; an interrupt
    /// that races with a grant is kept for the following wait.
    pub fn interrupt(&self, tid: TransactionId) {
        let record = self.record(tid);
        record.interrupted.store(true, Ordering::SeqCst);
        let waiting_on = *record.waiting_on.lock();

        if let Some(pid) = waiting_on {
            let page_lock = self.page_lock(pid);
            let _state = page_lock.state.lock();
            page_lock.cv.notify_all();
        }
    }

    /// Whether `tid` holds any lock on `pid`.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.transactions
            .get(&tid)
            .is_some_and(|record| record.held.lock().contains(&pid))
    }

    /// The mode `tid` holds `pid` in, if any.
    pub fn lock_mode(&self, tid: TransactionId, pid: PageId) -> Option<LockMode> {
        let page_lock = self.page_locks.get(&pid).map(|e| Arc::clone(e.value()))?;
        let state = page_lock.state.lock();
        state.mode_of(tid)
    }

    /// Transaction currently holding `pid` exclusively, if any.
    pub fn exclusive_holder(&self, pid: PageId) -> Option<TransactionId> {
        let page_lock = self.page_locks.get(&pid).map(|e| Arc::clone(e.value()))?;
        let state = page_lock.state.lock();
        state.exclusive
    }

    /// Every page `tid` holds a lock on, in no particular order.
    pub fn held_pages(&self, tid: TransactionId) -> Vec<PageId> {
        self.transactions
            .get(&tid)
            .map(|record| record.held.lock().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `tid` is currently blocked inside [`LockManager::acquire`].
    pub fn is_waiting(&self, tid: TransactionId) -> bool {
        self.transactions
            .get(&tid)
            .is_some_and(|record| record.waiting_on.lock().is_some())
    }

    /// Number of pages with a live lock object.
    pub fn tracked_pages(&self) -> usize {
        self.page_locks.len()
    }

    /// Whether the wait-for graph still knows about `tid`.
    pub fn in_wait_graph(&self, tid: TransactionId) -> bool {
        self.wait_for.lock().contains(tid)
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
