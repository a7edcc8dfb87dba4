pub mod heap_page;

use crate::catalog::TableId;
use crate::transaction::TransactionId;
use std::fmt;

/// Identifies one page of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table_id: TableId,
    pub page_number: u32,
}

impl PageId {
    pub fn new(table_id: TableId, page_number: u32) -> Self {
        Self {
            table_id,
            page_number,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}:{}", self.table_id.0, self.page_number)
    }
}

/// In-memory form of one fixed-size block.
pub trait Page {
    fn id(&self) -> PageId;

    /// The transaction that last dirtied this page, if it is dirty.
    fn is_dirty(&self) -> Option<TransactionId>;

    /// Marks the page dirty on behalf of `tid`, or clean when `None`.
    fn mark_dirty(&mut self, tid: Option<TransactionId>);

    /// Encodes the page into exactly one page worth of bytes.
    fn page_data(&self) -> Vec<u8>;
}

pub use heap_page::HeapPage;
