//! Storage layer error types.

use crate::access::RecordId;
use crate::catalog::TableId;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur in the storage and locking core.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{tid} aborted: granting a lock on {page_id} would deadlock")]
    Deadlock { tid: TransactionId, page_id: PageId },

    #[error("{0} was interrupted while waiting for a lock")]
    Interrupted(TransactionId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer pool exhausted: no clean page to evict among {capacity} resident pages")]
    PoolExhausted { capacity: usize },

    #[error("Tuple {record_id} does not belong to table {table_id}")]
    ForeignTuple {
        record_id: RecordId,
        table_id: TableId,
    },

    #[error("Tuple has no record id; it was never stored")]
    MissingRecordId,

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    #[error("Table not found: {0}")]
    TableNotFound(TableId),

    #[error("Table not found: {0:?}")]
    TableNameNotFound(String),

    #[error("Page is full: {0}")]
    PageFull(PageId),

    #[error("Invalid slot: {slot} (slots per page: {max})")]
    InvalidSlot { slot: usize, max: usize },

    #[error("Slot {slot} of {page_id} is empty")]
    SlotEmpty { page_id: PageId, slot: usize },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StorageError {
    /// Whether the owning transaction must be rolled back.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            StorageError::Deadlock { .. } | StorageError::Interrupted(_)
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
