//! Storage layer.
//!
//! - **PageManager**: whole-page reads and writes against one file
//! - **HeapPage**: slotted page of fixed-size tuples with an occupancy bitmap
//! - **BufferPool**: bounded page cache that takes page locks on every access
//!   and keeps dirty pages in memory until commit

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::{BufferPool, PageRef};
pub use disk::{PageManager, DEFAULT_PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::{HeapPage, Page, PageId};
