pub mod page_manager;

pub use page_manager::PageManager;

/// Bytes per page unless a table is created with an explicit page size.
pub const DEFAULT_PAGE_SIZE: usize = 4096;
