//! Table identity and registration records.

use crate::access::{HeapFile, TupleDesc};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A table known to the catalog.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub table_id: TableId,
    pub table_name: String,
    pub file: Arc<HeapFile>,
}

impl TableInfo {
    pub fn new(table_name: &str, file: Arc<HeapFile>) -> Self {
        Self {
            table_id: file.id(),
            table_name: table_name.to_string(),
            file,
        }
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        self.file.tuple_desc()
    }
}
