//! The execution store adapter contract (spec §4.G). The engine/worker
//! layers depend only on this trait; [`crate::memory::InMemoryStore`] and
//! [`crate::sqlite::SqliteStore`] are two interchangeable implementations.

use crate::error::Result;
use crate::model::{ExecutionRecord, ExecutionStatus, FlowSnapshot};
use async_trait::async_trait;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_execution(&self, record: ExecutionRecord) -> Result<()>;

    /// Rejects illegal transitions with [`crate::error::StoreError::StaleTransition`].
    async fn set_status(&self, execution_id: &str, new_status: ExecutionStatus) -> Result<()>;

    async fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord>;

    async fn load_flow(&self, flow_id: &str) -> Result<FlowSnapshot>;

    async fn append_breakpoint(&self, execution_id: &str, node_id: &str) -> Result<()>;

    async fn remove_breakpoint(&self, execution_id: &str, node_id: &str) -> Result<()>;

    /// Executions with no live parent, for the orphan-sweeping worker
    /// (spec §4.E).
    async fn list_orphans(&self) -> Result<Vec<String>>;

    /// Non-terminal `RUNNING` executions, for the stale-lease scan that
    /// feeds crash recovery (spec §4.E).
    async fn list_running(&self) -> Result<Vec<ExecutionRecord>>;
}
