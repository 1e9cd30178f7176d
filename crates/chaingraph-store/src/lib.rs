pub mod error;
pub mod memory;
pub mod model;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{ExecutionRecord, ExecutionStatus, FlowEdgeSpec, FlowNodeSpec, FlowSnapshot};
pub use sqlite::{DatabaseConnection, DatabasePool, PoolStatistics, SqliteStore};
pub use traits::ExecutionStore;
