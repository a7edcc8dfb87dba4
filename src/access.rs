//! Access layer for tuple-oriented operations.
//!
//! - **HeapFile**: one table's pages on disk, with tuple insert/delete
//! - **HeapScan**: restartable sequential scan of a heap file
//! - **Tuple** / **TupleDesc**: fixed-width records and their schema
//! - **Field** / **Type**: column values and their on-disk encoding

pub mod heap;
pub mod scan;
pub mod tuple;
pub mod value;

pub use heap::HeapFile;
pub use scan::HeapScan;
pub use tuple::{RecordId, TdItem, Tuple, TupleDesc};
pub use value::{Field, Type, STRING_LEN};
