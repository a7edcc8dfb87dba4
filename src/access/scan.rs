//! Sequential table scan.

use crate::access::heap::HeapFile;
use crate::access::tuple::Tuple;
use crate::storage::buffer::BufferPool;
use crate::storage::error::StorageResult;
use crate::storage::page::PageId;
use crate::transaction::{Permission, TransactionId};
use std::vec;

/// Forward iterator over every tuple of a [`HeapFile`], in page then slot order.
///
/// Pages are fetched read-only through the buffer pool one at a time, when the
/// previous page is used up. Each page's tuples are copied out so no page
/// handle is held between calls.
pub struct HeapScan<'a> {
    file: &'a HeapFile,
    pool: &'a BufferPool,
    tid: TransactionId,
    next_page: u32,
    current: vec::IntoIter<Tuple>,
}

impl<'a> HeapScan<'a> {
    pub(crate) fn new(file: &'a HeapFile, pool: &'a BufferPool, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            next_page: 0,
            current: Vec::new().into_iter(),
        }
    }

    /// Restarts the scan at the first page.
    pub fn rewind(&mut self) {
        self.next_page = 0;
        self.current = Vec::new().into_iter();
    }

    fn load_next_page(&mut self) -> StorageResult<bool> {
        if self.next_page >= self.file.num_pages()? {
            return Ok(false);
        }
        // A page that fails to load is retried by the next call.
        let pid = PageId::new(self.file.id(), self.next_page);
        let page = self.pool.get_page(self.tid, pid, Permission::ReadOnly)?;
        let tuples: Vec<Tuple> = page.read().iter().cloned().collect();
        self.current = tuples.into_iter();
        self.next_page += 1;
        Ok(true)
    }
}

impl Iterator for HeapScan<'_> {
    type Item = StorageResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tuple) = self.current.next() {
                return Some(Ok(tuple));
            }
            match self.load_next_page() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
