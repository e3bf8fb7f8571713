//! 持久化存储实现

pub mod sqlite;

pub use sqlite::SqliteStore;
