//! In-memory table registry.
//!
//! Maps table ids to the [`HeapFile`] that stores them, and table names to ids.
//! The buffer pool resolves every page miss through it.

pub mod table_info;

pub use table_info::{TableId, TableInfo};

use crate::access::{HeapFile, TupleDesc};
use crate::storage::error::{StorageError, StorageResult};
use dashmap::DashMap;
use log::info;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Catalog {
    tables: DashMap<TableId, TableInfo>,
    names: DashMap<String, TableId>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `file` under `name`. A table previously registered under the
    /// same name, or a previous name of the same file, is replaced.
    ///
    /// Fails with `InvalidConfig` if a different file already holds the same
    /// table id; nothing is changed in that case.
    pub fn add_table(&self, file: Arc<HeapFile>, name: &str) -> StorageResult<TableId> {
        let table_id = file.id();
        if let Some(existing) = self.tables.get(&table_id) {
            if existing.file.path() != file.path() {
                return Err(StorageError::InvalidConfig(format!(
                    "{} is already used by {:?}, cannot register {:?}",
                    table_id,
                    existing.file.path(),
                    file.path()
                )));
            }
        }

        if let Some((_, old_id)) = self.names.remove(name) {
            if old_id != table_id {
                self.tables.remove(&old_id);
            }
        }
        if let Some(previous) = self.tables.insert(table_id, TableInfo::new(name, file)) {
            if previous.table_name != name {
                self.names.remove(&previous.table_name);
            }
        }
        self.names.insert(name.to_string(), table_id);

        info!("registered table {:?} as {}", name, table_id);
        Ok(table_id)
    }

    /// File backing `table_id`.
    pub fn database_file(&self, table_id: TableId) -> StorageResult<Arc<HeapFile>> {
        self.tables
            .get(&table_id)
            .map(|info| Arc::clone(&info.file))
            .ok_or(StorageError::TableNotFound(table_id))
    }

    /// Id registered under `name`.
    pub fn table_id(&self, name: &str) -> StorageResult<TableId> {
        self.names
            .get(name)
            .map(|id| *id)
            .ok_or_else(|| StorageError::TableNameNotFound(name.to_string()))
    }

    pub fn table_name(&self, table_id: TableId) -> StorageResult<String> {
        self.tables
            .get(&table_id)
            .map(|info| info.table_name.clone())
            .ok_or(StorageError::TableNotFound(table_id))
    }

    pub fn tuple_desc(&self, table_id: TableId) -> StorageResult<Arc<TupleDesc>> {
        self.tables
            .get(&table_id)
            .map(|info| Arc::clone(info.tuple_desc()))
            .ok_or(StorageError::TableNotFound(table_id))
    }

    pub fn table_info(&self, table_id: TableId) -> Option<TableInfo> {
        self.tables.get(&table_id).map(|info| info.clone())
    }

    /// Ids of every registered table, ascending.
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Forgets every table. Files on disk are untouched.
    pub fn clear(&self) {
        self.tables.clear();
        self.names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Type;
    use anyhow::Result;
    use tempfile::tempdir;

    fn file(dir: &std::path::Path, name: &str) -> Result<Arc<HeapFile>> {
        let desc = Arc::new(TupleDesc::new(&[Type::Int], &["x"]));
        Ok(Arc::new(HeapFile::create(&dir.join(name), desc, 256)?))
    }

    #[test]
    fn test_lookup_by_id_and_name() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::new();
        let users = file(dir.path(), "users.dat")?;

        let id = catalog.add_table(Arc::clone(&users), "users")?;
        assert_eq!(id, users.id());
        assert_eq!(catalog.table_id("users")?, id);
        assert_eq!(catalog.table_name(id)?, "users");
        assert_eq!(catalog.tuple_desc(id)?.field_name(0), Some("x"));
        assert!(Arc::ptr_eq(&catalog.database_file(id)?, &users));
        Ok(())
    }

    #[test]
    fn test_missing_table() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.database_file(TableId(42)),
            Err(StorageError::TableNotFound(TableId(42)))
        ));
        assert!(matches!(
            catalog.table_id("nope"),
            Err(StorageError::TableNameNotFound(_))
        ));
    }

    #[test]
    fn test_same_name_replaces_table() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::new();
        let old = catalog.add_table(file(dir.path(), "a.dat")?, "t")?;
        let new = catalog.add_table(file(dir.path(), "b.dat")?, "t")?;

        assert_ne!(old, new);
        assert_eq!(catalog.table_id("t")?, new);
        assert!(catalog.database_file(old).is_err());
        assert_eq!(catalog.table_ids(), vec![new]);
        Ok(())
    }

    #[test]
    fn test_rename_drops_old_name() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::new();
        let f = file(dir.path(), "a.dat")?;
        catalog.add_table(Arc::clone(&f), "first")?;
        catalog.add_table(f, "second")?;

        assert!(catalog.table_id("first").is_err());
        assert_eq!(catalog.table_ids().len(), 1);
        Ok(())
    }

    #[test]
    fn test_id_collision_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::new();
        let a = file(dir.path(), "a.dat")?;
        let desc = Arc::new(TupleDesc::new(&[Type::Int], &["x"]));
        let b = HeapFile::create(&dir.path().join("b.dat"), desc, 256)?.with_id(a.id());

        let id = catalog.add_table(Arc::clone(&a), "a")?;
        let err = catalog.add_table(Arc::new(b), "b").unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig(_)));

        assert!(Arc::ptr_eq(&catalog.database_file(id)?, &a));
        assert_eq!(catalog.table_id("a")?, id);
        assert!(catalog.table_id("b").is_err());
        Ok(())
    }

    #[test]
    fn test_clear() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::new();
        catalog.add_table(file(dir.path(), "a.dat")?, "a")?;
        catalog.add_table(file(dir.path(), "b.dat")?, "b")?;
        assert_eq!(catalog.table_ids().len(), 2);

        catalog.clear();
        assert!(catalog.table_ids().is_empty());
        assert!(catalog.table_id("a").is_err());
        Ok(())
    }
}
