//! Engine configuration.

use crate::storage::disk::DEFAULT_PAGE_SIZE;
use crate::storage::error::{StorageError, StorageResult};

/// Number of pages the buffer pool caches unless configured otherwise.
pub const DEFAULT_POOL_PAGES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Size in bytes of every page of every table.
    pub page_size: usize,
    /// Buffer pool capacity, in pages.
    pub buffer_pool_pages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_pages: DEFAULT_POOL_PAGES,
        }
    }
}

impl Config {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_buffer_pool_pages(mut self, pages: usize) -> Self {
        self.buffer_pool_pages = pages;
        self
    }

    /// Rejects settings no table could work with. Whether a page fits a given
    /// tuple is checked when the table is opened.
    pub fn validate(&self) -> StorageResult<()> {
        if self.buffer_pool_pages == 0 {
            return Err(StorageError::InvalidConfig(
                "buffer pool needs at least one page".to_string(),
            ));
        }
        if self.page_size < 2 {
            return Err(StorageError::InvalidConfig(format!(
                "page size {} leaves no room for a header byte and a tuple",
                self.page_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.buffer_pool_pages, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = Config::default()
            .with_page_size(512)
            .with_buffer_pool_pages(3);
        assert_eq!(config.page_size, 512);
        assert_eq!(config.buffer_pool_pages, 3);
    }

    #[test]
    fn test_validate_rejects_degenerate_settings() {
        assert!(matches!(
            Config::default().with_buffer_pool_pages(0).validate(),
            Err(StorageError::InvalidConfig(_))
        ));
        assert!(Config::default().with_page_size(1).validate().is_err());
    }
}
