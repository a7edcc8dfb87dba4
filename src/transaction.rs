//! Transaction identity as seen by the storage core.
//!
//! Transaction ids are allocated by an external transaction manager; the
//! storage core only compares and hashes them. A monotonic generator is
//! provided for callers that have no id source of their own.

pub mod id;
pub mod permission;

pub use id::{TransactionId, TransactionIdGenerator};
pub use permission::Permission;
