//! Fixed-capacity page cache.
//!
//! Every page access goes through [`BufferPool::get_page`], which first takes
//! the matching page lock from the pool's [`LockManager`] and then serves the
//! page from memory or loads it from the table's [`HeapFile`]. Dirty pages are
//! never written back by eviction; they reach disk only on commit or an
//! explicit flush (no-steal).

use crate::access::{HeapFile, RecordId, Tuple};
use crate::catalog::{Catalog, TableId};
use crate::concurrency::lock::LockManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, Page, PageId};
use crate::transaction::{Permission, TransactionId};
use dashmap::DashMap;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Shared handle to a cached page. Callers must drop it before their
/// transaction completes.
pub type PageRef = Arc<RwLock<HeapPage>>;

pub struct BufferPool {
    capacity: usize,
    pages: Mutex<HashMap<PageId, PageRef>>,
    /// Pages each running transaction has requested with write permission.
    dirtied: DashMap<TransactionId, HashSet<PageId>>,
    lock_manager: LockManager,
    catalog: Arc<Catalog>,
}

impl BufferPool {
    /// Creates an empty pool holding at most `capacity` pages.
    pub fn new(capacity: usize, catalog: Arc<Catalog>) -> Self {
        Self {
            capacity,
            pages: Mutex::new(HashMap::with_capacity(capacity)),
            dirtied: DashMap::new(),
            lock_manager: LockManager::new(),
            catalog,
        }
    }

    /// Locks `pid` for `tid` with `perm` and returns the cached page, loading
    /// it from disk on a miss.
    ///
    /// May block on the page lock. Fails with `Deadlock` or `Interrupted`
    /// from the lock manager, and with `PoolExhausted` if the page must be
    /// loaded but no resident page can be evicted.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> StorageResult<PageRef> {
        self.lock_manager.acquire(tid, pid, perm.into())?;
        if perm.is_write() {
            self.dirtied.entry(tid).or_default().insert(pid);
        }

        if let Some(page) = self.pages.lock().get(&pid) {
            return Ok(Arc::clone(page));
        }

        let file = self.catalog.database_file(pid.table_id)?;
        let page = file.read_page(pid)?;
        self.install(pid, Arc::new(RwLock::new(page)), false)
    }

    /// Puts `page` in the cache. An already resident copy wins unless
    /// `replace` is set.
    fn install(&self, pid: PageId, page: PageRef, replace: bool) -> StorageResult<PageRef> {
        let mut pages = self.pages.lock();
        match pages.get(&pid) {
            Some(resident) if !replace => return Ok(Arc::clone(resident)),
            Some(_) => {}
            None => {
                if pages.len() >= self.capacity {
                    self.evict_page(&mut pages)?;
                }
            }
        }
        pages.insert(pid, Arc::clone(&page));
        Ok(page)
    }

    /// Drops the first clean page that no transaction holds exclusively.
    ///
    /// Outstanding read handles do not keep a page resident: a clean page
    /// matches its on-disk image, so a later `get_page` simply reloads it.
    fn evict_page(&self, pages: &mut HashMap<PageId, PageRef>) -> StorageResult<()> {
        let victim = pages
            .iter()
            .find(|(pid, page)| {
                self.lock_manager.exclusive_holder(**pid).is_none()
                    && page.try_read().is_some_and(|p| p.is_dirty().is_none())
            })
            .map(|(pid, _)| *pid);

        match victim {
            Some(pid) => {
                pages.remove(&pid);
                debug!("evicted {}", pid);
                Ok(())
            }
            None => {
                warn!(
                    "buffer pool exhausted: none of {} resident pages can be evicted",
                    pages.len()
                );
                Err(StorageError::PoolExhausted {
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Adds `tuple` to table `table_id` on behalf of `tid` and returns where it
    /// was stored. The tuple's record id is updated as well.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> StorageResult<RecordId> {
        let file = self.catalog.database_file(table_id)?;
        let touched = file.insert_tuple(self, tid, tuple)?;
        self.absorb_dirty(tid, touched)?;
        tuple.record_id().ok_or(StorageError::MissingRecordId)
    }

    /// Removes `tuple` from the table its record id points into.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> StorageResult<()> {
        let record_id = tuple.record_id().ok_or(StorageError::MissingRecordId)?;
        let file = self.catalog.database_file(record_id.page_id.table_id)?;
        let touched = file.delete_tuple(self, tid, tuple)?;
        self.absorb_dirty(tid, touched)
    }

    /// Marks pages modified by `tid` dirty and makes sure the modified copies
    /// are the resident ones.
    fn absorb_dirty(&self, tid: TransactionId, touched: Vec<PageRef>) -> StorageResult<()> {
        for page in touched {
            let pid = {
                let mut guard = page.write();
                guard.mark_dirty(Some(tid));
                guard.id()
            };
            self.dirtied.entry(tid).or_default().insert(pid);
            self.install(pid, page, true)?;
        }
        Ok(())
    }

    /// Writes `pid` back to its file if it is cached and dirty.
    pub fn flush_page(&self, pid: PageId) -> StorageResult<()> {
        let Some(page) = self.pages.lock().get(&pid).cloned() else {
            return Ok(());
        };

        let mut page = page.write();
        if page.is_dirty().is_some() {
            let file = self.catalog.database_file(pid.table_id)?;
            file.write_page(&page)?;
            page.mark_dirty(None);
        }
        Ok(())
    }

    /// Writes back every page `tid` has dirtied, leaving them cached.
    pub fn flush_pages(&self, tid: TransactionId) -> StorageResult<()> {
        for pid in self.dirtied_by(tid) {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Writes back every dirty resident page, then empties the cache.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let resident: Vec<PageId> = self.pages.lock().keys().copied().collect();
        for pid in resident {
            self.flush_page(pid)?;
        }
        self.pages.lock().clear();
        Ok(())
    }

    /// Drops `pid` from the cache without writing it.
    pub fn discard_page(&self, pid: PageId) {
        self.pages.lock().remove(&pid);
    }

    /// Ends `tid`: on commit its dirtied pages are written to disk, and in
    /// either case they leave the cache and every lock of `tid` is released.
    ///
    /// If a commit write fails the error is returned before anything is
    /// released: `tid` keeps its locks and its pages stay cached, so the caller
    /// can retry the commit or abort instead.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> StorageResult<()> {
        let dirtied = self.dirtied_by(tid);

        if commit {
            for pid in &dirtied {
                if let Err(e) = self.flush_page(*pid) {
                    warn!("{} commit failed writing {}: {}", tid, pid, e);
                    return Err(e);
                }
            }
        }

        {
            let mut pages = self.pages.lock();
            for pid in &dirtied {
                pages.remove(pid);
            }
        }
        self.dirtied.remove(&tid);
        self.lock_manager.release_all(tid);

        debug!(
            "{} {} ({} dirtied pages)",
            tid,
            if commit { "committed" } else { "aborted" },
            dirtied.len()
        );
        Ok(())
    }

    fn dirtied_by(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pids: Vec<PageId> = self
            .dirtied
            .get(&tid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        pids.sort();
        pids
    }

    /// Whether `tid` holds any lock on `pid`.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds_lock(tid, pid)
    }

    /// Releases one page lock before the transaction ends. This gives up
    /// two-phase locking for that page; use with care.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.lock_manager.release(tid, pid);
    }

    /// Number of pages currently cached.
    pub fn resident_pages(&self) -> usize {
        self.pages.lock().len()
    }

    /// Maximum number of cached pages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether `pid` is resident, without locking or loading it.
    pub fn is_cached(&self, pid: PageId) -> bool {
        self.pages.lock().contains_key(&pid)
    }

    /// Page lock table shared by every transaction using this pool.
    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    /// Catalog used to resolve table ids to files.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Resolves the file backing `table_id`.
    pub fn heap_file(&self, table_id: TableId) -> StorageResult<Arc<HeapFile>> {
        self.catalog.database_file(table_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{Field, TupleDesc, Type};
    use anyhow::Result;
    use tempfile::{tempdir, TempDir};

    const PAGE: usize = 256;

    struct Fixture {
        _dir: TempDir,
        pool: BufferPool,
        file: Arc<HeapFile>,
    }

    fn setup(capacity: usize, pages: u32) -> Result<Fixture> {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempdir()?;
        let desc = Arc::new(TupleDesc::unnamed(&[Type::Int, Type::Int]));
        let file = Arc::new(HeapFile::create(&dir.path().join("t.dat"), desc, PAGE)?);
        for _ in 0..pages {
            file.append_empty_page()?;
        }

        let catalog = Arc::new(Catalog::new());
        catalog.add_table(Arc::clone(&file), "t")?;
        let pool = BufferPool::new(capacity, catalog);
        Ok(Fixture {
            _dir: dir,
            pool,
            file,
        })
    }

    fn row(file: &HeapFile, a: i32, b: i32) -> Tuple {
        Tuple::new(
            Arc::clone(file.tuple_desc()),
            vec![Field::Int(a), Field::Int(b)],
        )
        .unwrap()
    }

    fn pid(file: &HeapFile, n: u32) -> PageId {
        PageId::new(file.id(), n)
    }

    #[test]
    fn test_cache_hit_returns_same_page() -> Result<()> {
        let f = setup(4, 1)?;
        let tid = TransactionId::new(1);

        let a = f.pool.get_page(tid, pid(&f.file, 0), Permission::ReadOnly)?;
        let b = f.pool.get_page(tid, pid(&f.file, 0), Permission::ReadOnly)?;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(f.pool.resident_pages(), 1);
        assert!(f.pool.holds_lock(tid, pid(&f.file, 0)));
        Ok(())
    }

    #[test]
    fn test_clean_page_evicted_at_capacity() -> Result<()> {
        let f = setup(1, 2)?;
        let tid = TransactionId::new(1);

        f.pool.get_page(tid, pid(&f.file, 0), Permission::ReadOnly)?;
        f.pool.get_page(tid, pid(&f.file, 1), Permission::ReadOnly)?;

        assert_eq!(f.pool.resident_pages(), 1);
        assert!(f.pool.is_cached(pid(&f.file, 1)));
        assert!(!f.pool.is_cached(pid(&f.file, 0)));
        Ok(())
    }

    #[test]
    fn test_dirty_page_is_never_evicted() -> Result<()> {
        let f = setup(1, 2)?;
        let tid = TransactionId::new(1);

        f.pool.insert_tuple(tid, f.file.id(), &mut row(&f.file, 1, 1))?;
        let err = f
            .pool
            .get_page(tid, pid(&f.file, 1), Permission::ReadOnly)
            .unwrap_err();
        assert!(matches!(err, StorageError::PoolExhausted { capacity: 1 }));
        assert!(f.pool.is_cached(pid(&f.file, 0)));
        Ok(())
    }

    #[test]
    fn test_clean_page_with_live_handle_is_evicted() -> Result<()> {
        let f = setup(1, 2)?;
        let tid = TransactionId::new(1);

        let held = f.pool.get_page(tid, pid(&f.file, 0), Permission::ReadOnly)?;
        let next = f.pool.get_page(tid, pid(&f.file, 1), Permission::ReadOnly)?;
        assert_eq!(next.read().id(), pid(&f.file, 1));
        assert!(!f.pool.is_cached(pid(&f.file, 0)));

        // The old handle still reads its copy; fetching again reloads it.
        assert_eq!(held.read().id(), pid(&f.file, 0));
        let again = f.pool.get_page(tid, pid(&f.file, 0), Permission::ReadOnly)?;
        assert!(!Arc::ptr_eq(&held, &again));
        assert_eq!(f.pool.resident_pages(), 1);
        Ok(())
    }

    #[test]
    fn test_exclusively_locked_page_is_not_evicted() -> Result<()> {
        let f = setup(1, 2)?;
        let writer = TransactionId::new(1);
        let reader = TransactionId::new(2);

        f.pool.get_page(writer, pid(&f.file, 0), Permission::ReadWrite)?;
        let err = f
            .pool
            .get_page(reader, pid(&f.file, 1), Permission::ReadOnly)
            .unwrap_err();
        assert!(matches!(err, StorageError::PoolExhausted { capacity: 1 }));
        assert!(f.pool.is_cached(pid(&f.file, 0)));

        f.pool.release_page(writer, pid(&f.file, 0));
        f.pool.get_page(reader, pid(&f.file, 1), Permission::ReadOnly)?;
        assert!(!f.pool.is_cached(pid(&f.file, 0)));
        Ok(())
    }

    #[test]
    fn test_failed_commit_keeps_locks_and_pages() -> Result<()> {
        let f = setup(4, 1)?;
        let tid = TransactionId::new(1);

        f.pool.insert_tuple(tid, f.file.id(), &mut row(&f.file, 1, 2))?;
        f.pool.catalog().clear();
        let err = f.pool.transaction_complete(tid, true).unwrap_err();
        assert!(matches!(err, StorageError::TableNotFound(_)));
        assert!(f.pool.holds_lock(tid, pid(&f.file, 0)));
        assert!(f.pool.is_cached(pid(&f.file, 0)));

        f.pool.catalog().add_table(Arc::clone(&f.file), "t")?;
        f.pool.transaction_complete(tid, true)?;
        assert!(!f.pool.holds_lock(tid, pid(&f.file, 0)));
        assert_eq!(f.file.read_page(pid(&f.file, 0))?.iter().count(), 1);
        Ok(())
    }

    #[test]
    fn test_commit_writes_dirty_pages() -> Result<()> {
        let f = setup(4, 0)?;
        let tid = TransactionId::new(1);

        let rid = f.pool.insert_tuple(tid, f.file.id(), &mut row(&f.file, 7, 8))?;
        assert_eq!(rid.page_id, pid(&f.file, 0));
        f.pool.transaction_complete(tid, true)?;

        assert_eq!(f.pool.resident_pages(), 0);
        assert!(!f.pool.holds_lock(tid, rid.page_id));
        let on_disk = f.file.read_page(rid.page_id)?;
        assert_eq!(on_disk.tuple(rid.slot), Some(&row(&f.file, 7, 8)));
        Ok(())
    }

    #[test]
    fn test_abort_discards_dirty_pages() -> Result<()> {
        let f = setup(4, 1)?;
        let tid = TransactionId::new(1);

        f.pool.insert_tuple(tid, f.file.id(), &mut row(&f.file, 7, 8))?;
        f.pool.transaction_complete(tid, false)?;

        assert_eq!(f.pool.resident_pages(), 0);
        assert_eq!(f.file.read_page(pid(&f.file, 0))?.iter().count(), 0);

        let reader = TransactionId::new(2);
        let page = f.pool.get_page(reader, pid(&f.file, 0), Permission::ReadOnly)?;
        assert_eq!(page.read().iter().count(), 0);
        Ok(())
    }

    #[test]
    fn test_flush_page_clears_dirty_flag() -> Result<()> {
        let f = setup(4, 1)?;
        let tid = TransactionId::new(1);

        f.pool.insert_tuple(tid, f.file.id(), &mut row(&f.file, 1, 2))?;
        f.pool.flush_pages(tid)?;

        let page = f.pool.get_page(tid, pid(&f.file, 0), Permission::ReadOnly)?;
        assert_eq!(page.read().is_dirty(), None);
        assert_eq!(f.file.read_page(pid(&f.file, 0))?.iter().count(), 1);
        Ok(())
    }

    #[test]
    fn test_flush_all_pages_empties_cache() -> Result<()> {
        let f = setup(4, 2)?;
        let tid = TransactionId::new(1);

        f.pool.get_page(tid, pid(&f.file, 1), Permission::ReadOnly)?;
        f.pool.insert_tuple(tid, f.file.id(), &mut row(&f.file, 3, 4))?;
        assert_eq!(f.pool.resident_pages(), 2);

        f.pool.flush_all_pages()?;
        assert_eq!(f.pool.resident_pages(), 0);
        assert_eq!(f.file.read_page(pid(&f.file, 0))?.iter().count(), 1);
        Ok(())
    }

    #[test]
    fn test_discard_page_drops_changes() -> Result<()> {
        let f = setup(4, 1)?;
        let tid = TransactionId::new(1);

        f.pool.insert_tuple(tid, f.file.id(), &mut row(&f.file, 3, 4))?;
        f.pool.discard_page(pid(&f.file, 0));
        assert!(!f.pool.is_cached(pid(&f.file, 0)));

        let page = f.pool.get_page(tid, pid(&f.file, 0), Permission::ReadOnly)?;
        assert_eq!(page.read().iter().count(), 0);
        Ok(())
    }

    #[test]
    fn test_delete_tuple_through_pool() -> Result<()> {
        let f = setup(4, 1)?;
        let tid = TransactionId::new(1);

        let mut tuple = row(&f.file, 5, 6);
        f.pool.insert_tuple(tid, f.file.id(), &mut tuple)?;
        f.pool.delete_tuple(tid, &tuple)?;
        f.pool.transaction_complete(tid, true)?;

        assert_eq!(f.file.read_page(pid(&f.file, 0))?.iter().count(), 0);
        Ok(())
    }

    #[test]
    fn test_unknown_table() -> Result<()> {
        let f = setup(4, 0)?;
        let tid = TransactionId::new(1);
        let err = f
            .pool
            .get_page(tid, PageId::new(TableId(u32::MAX), 0), Permission::ReadOnly)
            .unwrap_err();
        assert!(matches!(err, StorageError::TableNotFound(_)));
        Ok(())
    }

    #[test]
    fn test_release_page() -> Result<()> {
        let f = setup(4, 1)?;
        let tid = TransactionId::new(1);
        f.pool.get_page(tid, pid(&f.file, 0), Permission::ReadWrite)?;
        assert!(f.pool.holds_lock(tid, pid(&f.file, 0)));

        f.pool.release_page(tid, pid(&f.file, 0));
        assert!(!f.pool.holds_lock(tid, pid(&f.file, 0)));
        Ok(())
    }
}
