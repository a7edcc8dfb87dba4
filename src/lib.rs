pub mod access;
pub mod catalog;
pub mod concurrency;
pub mod config;
pub mod database;
pub mod storage;
pub mod transaction;

pub use config::Config;
pub use database::Database;
