//! In-memory [`ExecutionStore`], used by tests and local/single-process
//! runs that don't need durability across restarts.

use crate::error::{Result, StoreError};
use crate::model::{ExecutionRecord, ExecutionStatus, FlowSnapshot};
use crate::traits::ExecutionStore;
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct InMemoryStore {
    executions: DashMap<String, ExecutionRecord>,
    flows: DashMap<String, FlowSnapshot>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a flow definition so `load_flow` can resolve it. Flow authoring
    /// lives outside the execution store's contract; this is the test/local
    /// entry point for it.
    pub fn put_flow(&self, snapshot: FlowSnapshot) {
        self.flows.insert(snapshot.flow_id.clone(), snapshot);
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn create_execution(&self, record: ExecutionRecord) -> Result<()> {
        self.executions.insert(record.id.clone(), record);
        Ok(())
    }

    async fn set_status(&self, execution_id: &str, new_status: ExecutionStatus) -> Result<()> {
        let mut entry = self
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
        if !entry.status.can_transition_to(new_status) {
            return Err(StoreError::StaleTransition {
                execution_id: execution_id.to_string(),
                from: entry.status,
                to: new_status,
            });
        }
        entry.status = new_status;
        entry.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord> {
        self.executions
            .get(execution_id)
            .map(|e| e.clone())
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))
    }

    async fn load_flow(&self, flow_id: &str) -> Result<FlowSnapshot> {
        self.flows
            .get(flow_id)
            .map(|f| f.clone())
            .ok_or_else(|| StoreError::NoSuchFlow(flow_id.to_string()))
    }

    async fn append_breakpoint(&self, execution_id: &str, node_id: &str) -> Result<()> {
        let mut entry = self
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
        if !entry.breakpoints.iter().any(|b| b == node_id) {
            entry.breakpoints.push(node_id.to_string());
        }
        Ok(())
    }

    async fn remove_breakpoint(&self, execution_id: &str, node_id: &str) -> Result<()> {
        let mut entry = self
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
        entry.breakpoints.retain(|b| b != node_id);
        Ok(())
    }

    async fn list_orphans(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = self
            .executions
            .iter()
            .filter(|e| !e.status.is_terminal())
            .filter(|e| {
                e.parent_execution_id
                    .as_ref()
                    .map(|parent| self.executions.get(parent).map(|p| p.status.is_terminal()).unwrap_or(true))
                    .unwrap_or(false)
            })
            .map(|e| e.id.clone())
            .collect();
        Ok(ids)
    }

    async fn list_running(&self) -> Result<Vec<ExecutionRecord>> {
        Ok(self
            .executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Running)
            .map(|e| e.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryStore::new();
        let record = ExecutionRecord::new("exec-1", "flow-1", None, 0);
        store.create_execution(record.clone()).await.unwrap();
        let fetched = store.get_execution("exec-1").await.unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched.status, ExecutionStatus::Idle);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let store = InMemoryStore::new();
        store.create_execution(ExecutionRecord::new("exec-1", "flow-1", None, 0)).await.unwrap();
        let err = store.set_status("exec-1", ExecutionStatus::Running).await.unwrap_err();
        assert!(matches!(err, StoreError::StaleTransition { .. }));
    }

    #[tokio::test]
    async fn legal_transition_chain_succeeds() {
        let store = InMemoryStore::new();
        store.create_execution(ExecutionRecord::new("exec-1", "flow-1", None, 0)).await.unwrap();
        for status in [
            ExecutionStatus::Creating,
            ExecutionStatus::Created,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
        ] {
            store.set_status("exec-1", status).await.unwrap();
        }
        assert_eq!(store.get_execution("exec-1").await.unwrap().status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn orphan_with_terminal_parent_is_listed() {
        let store = InMemoryStore::new();
        store.create_execution(ExecutionRecord::new("parent", "flow-1", None, 0)).await.unwrap();
        store.set_status("parent", ExecutionStatus::Creating).await.unwrap();
        store.set_status("parent", ExecutionStatus::Created).await.unwrap();
        store.set_status("parent", ExecutionStatus::Running).await.unwrap();
        store.set_status("parent", ExecutionStatus::Stopped).await.unwrap();

        store
            .create_execution(ExecutionRecord::new("child", "flow-1", Some("parent".to_string()), 1))
            .await
            .unwrap();

        let orphans = store.list_orphans().await.unwrap();
        assert_eq!(orphans, vec!["child".to_string()]);
    }

    #[tokio::test]
    async fn breakpoints_add_and_remove() {
        let store = InMemoryStore::new();
        store.create_execution(ExecutionRecord::new("exec-1", "flow-1", None, 0)).await.unwrap();
        store.append_breakpoint("exec-1", "node-a").await.unwrap();
        store.append_breakpoint("exec-1", "node-a").await.unwrap();
        assert_eq!(store.get_execution("exec-1").await.unwrap().breakpoints, vec!["node-a".to_string()]);
        store.remove_breakpoint("exec-1", "node-a").await.unwrap();
        assert!(store.get_execution("exec-1").await.unwrap().breakpoints.is_empty());
    }
}
