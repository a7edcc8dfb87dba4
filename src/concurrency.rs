//! Concurrency control.
//!
//! Page-level shared/exclusive locking with deadlock detection over a
//! transaction wait-for graph.

pub mod lock;
pub mod wait_for;

pub use lock::{LockManager, LockMode};
pub use wait_for::WaitForGraph;
