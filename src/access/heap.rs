use crate::access::scan::HeapScan;
use crate::access::tuple::{Tuple, TupleDesc};
use crate::catalog::TableId;
use crate::storage::buffer::{BufferPool, PageRef};
use crate::storage::disk::PageManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::heap_page::slots_per_page;
use crate::storage::page::{HeapPage, Page, PageId};
use crate::transaction::{Permission, TransactionId};
use log::debug;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One table's backing file: a flat sequence of heap pages.
///
/// Direct page I/O (`read_page`, `write_page`) bypasses locking and caching and
/// is meant for the buffer pool. Tuple access goes through [`BufferPool`].
#[derive(Debug)]
pub struct HeapFile {
    id: TableId,
    path: PathBuf,
    desc: Arc<TupleDesc>,
    page_size: usize,
    pages: Mutex<PageManager>,
    /// Serializes page appends.
    append: Mutex<()>,
}

impl HeapFile {
    /// Creates an empty file at `path`, truncating any existing one.
    pub fn create(path: &Path, desc: Arc<TupleDesc>, page_size: usize) -> StorageResult<Self> {
        Self::check_geometry(&desc, page_size)?;
        let pm = PageManager::create(path, page_size)?;
        Self::with_manager(pm, path, desc, page_size)
    }

    /// Opens the file at `path`, creating it empty if missing.
    pub fn open(path: &Path, desc: Arc<TupleDesc>, page_size: usize) -> StorageResult<Self> {
        Self::check_geometry(&desc, page_size)?;
        let pm = PageManager::open(path, page_size)?;
        Self::with_manager(pm, path, desc, page_size)
    }

    fn with_manager(
        pm: PageManager,
        path: &Path,
        desc: Arc<TupleDesc>,
        page_size: usize,
    ) -> StorageResult<Self> {
        let path = std::fs::canonicalize(path)?;
        Ok(Self {
            id: table_id_for(&path),
            path,
            desc,
            page_size,
            pages: Mutex::new(pm),
            append: Mutex::new(()),
        })
    }

    fn check_geometry(desc: &TupleDesc, page_size: usize) -> StorageResult<()> {
        if desc.num_fields() == 0 {
            return Err(StorageError::InvalidConfig(
                "a table needs at least one field".to_string(),
            ));
        }
        if slots_per_page(page_size, desc.size()) == 0 {
            return Err(StorageError::InvalidConfig(format!(
                "page size {} cannot hold a {} byte tuple",
                page_size,
                desc.size()
            )));
        }
        Ok(())
    }

    /// Forces a table id, to exercise id collisions.
    #[cfg(test)]
    pub(crate) fn with_id(mut self, id: TableId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> StorageResult<u32> {
        self.pages.lock().num_pages()
    }

    /// Reads and decodes page `pid` straight from disk.
    pub fn read_page(&self, pid: PageId) -> StorageResult<HeapPage> {
        if pid.table_id != self.id {
            return Err(StorageError::PageNotFound(pid));
        }

        let mut buf = vec![0u8; self.page_size];
        {
            let mut pm = self.pages.lock();
            if pid.page_number >= pm.num_pages()? {
                return Err(StorageError::PageNotFound(pid));
            }
            pm.read_page(pid.page_number, &mut buf)?;
        }
        HeapPage::from_bytes(pid, Arc::clone(&self.desc), &buf)
    }

    /// Writes `page` to its slot in the file.
    pub fn write_page(&self, page: &HeapPage) -> StorageResult<()> {
        let pid = page.id();
        if pid.table_id != self.id {
            return Err(StorageError::PageNotFound(pid));
        }
        self.pages.lock().write_page(pid.page_number, &page.page_data())
    }

    /// Appends an all-empty page and returns its number.
    pub fn append_empty_page(&self) -> StorageResult<u32> {
        let page_number = self
            .pages
            .lock()
            .append_page(&HeapPage::empty_page_data(self.page_size))?;
        debug!("table {} appended page {}", self.id, page_number);
        Ok(page_number)
    }

    /// Stores `tuple` in the first page with a free slot, appending a page when
    /// none has room. Every page examined is locked for writing through `pool`.
    ///
    /// Returns the page that was modified; the tuple's record id is set.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> StorageResult<Vec<PageRef>> {
        if tuple.desc().as_ref() != self.desc.as_ref() {
            return Err(StorageError::SchemaMismatch(format!(
                "tuple does not match the descriptor of table {}",
                self.id
            )));
        }

        let mut checked = 0;
        loop {
            let num_pages = self.num_pages()?;
            for page_number in checked..num_pages {
                let pid = PageId::new(self.id, page_number);
                let page_ref = pool.get_page(tid, pid, Permission::ReadWrite)?;
                {
                    let mut page = page_ref.write();
                    if page.num_empty_slots() == 0 {
                        continue;
                    }
                    page.insert_tuple(tuple)?;
                    page.mark_dirty(Some(tid));
                }
                return Ok(vec![page_ref]);
            }
            checked = num_pages;

            let _append = self.append.lock();
            // another inserter may have appended while we were probing
            if self.num_pages()? == num_pages {
                self.append_empty_page()?;
            }
        }
    }

    /// Clears the slot holding `tuple` and returns the modified page.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> StorageResult<Vec<PageRef>> {
        let record_id = tuple.record_id().ok_or(StorageError::MissingRecordId)?;
        if record_id.page_id.table_id != self.id {
            return Err(StorageError::ForeignTuple {
                record_id,
                table_id: self.id,
            });
        }

        let page_ref = pool.get_page(tid, record_id.page_id, Permission::ReadWrite)?;
        {
            let mut page = page_ref.write();
            page.delete_tuple(tuple)?;
            page.mark_dirty(Some(tid));
        }
        Ok(vec![page_ref])
    }

    /// Lazy scan of every stored tuple, reading pages through `pool`.
    pub fn scan<'a>(&'a self, pool: &'a BufferPool, tid: TransactionId) -> HeapScan<'a> {
        HeapScan::new(self, pool, tid)
    }
}

/// Stable id derived from the canonical path of a table file.
fn table_id_for(path: &Path) -> TableId {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    let h = hasher.finish();
    TableId((h ^ (h >> 32)) as u32)
}
