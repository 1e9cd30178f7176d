mod connection;
mod repository;

pub use connection::{DatabaseConnection, DatabasePool, PoolStatistics};
pub use repository::SqliteStore;
