use crate::access::{HeapFile, TupleDesc};
use crate::catalog::{Catalog, TableId};
use crate::config::Config;
use crate::storage::buffer::BufferPool;
use anyhow::{bail, Context, Result};
use log::info;
use std::path::Path;
use std::sync::Arc;

/// Entry point that wires a catalog and a buffer pool together.
pub struct Database {
    config: Config,
    catalog: Arc<Catalog>,
    buffer_pool: BufferPool,
}

impl Database {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(Catalog::new());
        let buffer_pool = BufferPool::new(config.buffer_pool_pages, Arc::clone(&catalog));
        info!(
            "database ready: {} byte pages, {} page buffer pool",
            config.page_size, config.buffer_pool_pages
        );

        Ok(Self {
            config,
            catalog,
            buffer_pool,
        })
    }

    /// Creates an empty table file at `path` (truncating any existing one) and
    /// registers it as `name`.
    pub fn create_table(&self, path: &Path, desc: TupleDesc, name: &str) -> Result<TableId> {
        let file = HeapFile::create(path, Arc::new(desc), self.config.page_size)
            .with_context(|| format!("Failed to create table file {:?}", path))?;
        Ok(self.catalog.add_table(Arc::new(file), name)?)
    }

    /// Registers the existing table file at `path` as `name`.
    pub fn open_table(&self, path: &Path, desc: TupleDesc, name: &str) -> Result<TableId> {
        if !path.exists() {
            bail!("Table file does not exist at {:?}", path);
        }
        let file = HeapFile::open(path, Arc::new(desc), self.config.page_size)
            .with_context(|| format!("Failed to open table file {:?}", path))?;
        Ok(self.catalog.add_table(Arc::new(file), name)?)
    }

    pub fn table(&self, name: &str) -> Result<Arc<HeapFile>> {
        let table_id = self.catalog.table_id(name)?;
        Ok(self.catalog.database_file(table_id)?)
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Writes every dirty cached page to disk.
    pub fn flush(&self) -> Result<()> {
        self.buffer_pool.flush_all_pages()?;
        Ok(())
    }
}
