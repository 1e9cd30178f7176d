//! sqlx-backed repository implementing [`ExecutionStore`] against SQLite.

use super::connection::DatabasePool;
use crate::error::{Result, StoreError};
use crate::model::{ExecutionRecord, ExecutionStatus, FlowEdgeSpec, FlowNodeSpec, FlowSnapshot};
use crate::traits::ExecutionStore;
use async_trait::async_trait;
use sqlx::FromRow;

const TERMINAL_STATUSES: &str = "('COMPLETED','FAILED','STOPPED','RESTARTED')";

fn status_to_sql(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Idle => "IDLE",
        ExecutionStatus::Creating => "CREATING",
        ExecutionStatus::Created => "CREATED",
        ExecutionStatus::Running => "RUNNING",
        ExecutionStatus::Paused => "PAUSED",
        ExecutionStatus::Completed => "COMPLETED",
        ExecutionStatus::Failed => "FAILED",
        ExecutionStatus::Stopped => "STOPPED",
        ExecutionStatus::Restarted => "RESTARTED",
    }
}

fn status_from_sql(raw: &str) -> Result<ExecutionStatus> {
    Ok(match raw {
        "IDLE" => ExecutionStatus::Idle,
        "CREATING" => ExecutionStatus::Creating,
        "CREATED" => ExecutionStatus::Created,
        "RUNNING" => ExecutionStatus::Running,
        "PAUSED" => ExecutionStatus::Paused,
        "COMPLETED" => ExecutionStatus::Completed,
        "FAILED" => ExecutionStatus::Failed,
        "STOPPED" => ExecutionStatus::Stopped,
        "RESTARTED" => ExecutionStatus::Restarted,
        other => return Err(StoreError::Backend(format!("unknown status '{other}'"))),
    })
}

#[derive(FromRow)]
struct ExecutionRow {
    id: String,
    flow_id: String,
    status: String,
    depth: i64,
    parent_execution_id: Option<String>,
    context: String,
    breakpoints: String,
    created_at: String,
    updated_at: String,
}

impl ExecutionRow {
    fn into_record(self) -> Result<ExecutionRecord> {
        Ok(ExecutionRecord {
            id: self.id,
            flow_id: self.flow_id,
            status: status_from_sql(&self.status)?,
            depth: self.depth as u32,
            parent_execution_id: self.parent_execution_id,
            context: serde_json::from_str(&self.context)?,
            breakpoints: serde_json::from_str(&self.breakpoints)?,
            created_at: self.created_at.parse()?,
            updated_at: self.updated_at.parse()?,
        })
    }
}

#[derive(FromRow)]
struct FlowSnapshotRow {
    flow_id: String,
    nodes: String,
    edges: String,
}

impl FlowSnapshotRow {
    fn into_snapshot(self) -> Result<FlowSnapshot> {
        let nodes: Vec<FlowNodeSpec> = serde_json::from_str(&self.nodes)?;
        let edges: Vec<FlowEdgeSpec> = serde_json::from_str(&self.edges)?;
        Ok(FlowSnapshot { flow_id: self.flow_id, nodes, edges })
    }
}

/// The durable, sqlx-backed [`ExecutionStore`].
pub struct SqliteStore {
    pool: DatabasePool,
}

impl SqliteStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Seed a flow definition, upserting by `flow_id`.
    pub async fn put_flow(&self, snapshot: FlowSnapshot) -> Result<()> {
        let nodes = serde_json::to_string(&snapshot.nodes)?;
        let edges = serde_json::to_string(&snapshot.edges)?;
        sqlx::query(
            "INSERT INTO flow_snapshots (flow_id, nodes, edges) VALUES (?, ?, ?)
             ON CONFLICT(flow_id) DO UPDATE SET nodes = excluded.nodes, edges = excluded.edges",
        )
        .bind(&snapshot.flow_id)
        .bind(&nodes)
        .bind(&edges)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for SqliteStore {
    async fn create_execution(&self, record: ExecutionRecord) -> Result<()> {
        let context = serde_json::to_string(&record.context)?;
        let breakpoints = serde_json::to_string(&record.breakpoints)?;
        sqlx::query(
            "INSERT INTO executions
                (id, flow_id, status, depth, parent_execution_id, context, breakpoints, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.flow_id)
        .bind(status_to_sql(record.status))
        .bind(record.depth as i64)
        .bind(&record.parent_execution_id)
        .bind(&context)
        .bind(&breakpoints)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, execution_id: &str, new_status: ExecutionStatus) -> Result<()> {
        let current = self.get_execution(execution_id).await?;
        if !current.status.can_transition_to(new_status) {
            return Err(StoreError::StaleTransition {
                execution_id: execution_id.to_string(),
                from: current.status,
                to: new_status,
            });
        }
        let updated_at = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query("UPDATE executions SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(status_to_sql(new_status))
            .bind(&updated_at)
            .bind(execution_id)
            .bind(status_to_sql(current.status))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::StaleTransition {
                execution_id: execution_id.to_string(),
                from: current.status,
                to: new_status,
            });
        }
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord> {
        let row = sqlx::query_as::<_, ExecutionRow>("SELECT * FROM executions WHERE id = ?")
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
        row.into_record()
    }

    async fn load_flow(&self, flow_id: &str) -> Result<FlowSnapshot> {
        let row = sqlx::query_as::<_, FlowSnapshotRow>("SELECT * FROM flow_snapshots WHERE flow_id = ?")
            .bind(flow_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NoSuchFlow(flow_id.to_string()))?;
        row.into_snapshot()
    }

    async fn append_breakpoint(&self, execution_id: &str, node_id: &str) -> Result<()> {
        let mut record = self.get_execution(execution_id).await?;
        if !record.breakpoints.iter().any(|b| b == node_id) {
            record.breakpoints.push(node_id.to_string());
        }
        let breakpoints = serde_json::to_string(&record.breakpoints)?;
        sqlx::query("UPDATE executions SET breakpoints = ? WHERE id = ?")
            .bind(&breakpoints)
            .bind(execution_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_breakpoint(&self, execution_id: &str, node_id: &str) -> Result<()> {
        let mut record = self.get_execution(execution_id).await?;
        record.breakpoints.retain(|b| b != node_id);
        let breakpoints = serde_json::to_string(&record.breakpoints)?;
        sqlx::query("UPDATE executions SET breakpoints = ? WHERE id = ?")
            .bind(&breakpoints)
            .bind(execution_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_orphans(&self) -> Result<Vec<String>> {
        let query = format!(
            "SELECT e.id AS id FROM executions e
             LEFT JOIN executions p ON e.parent_execution_id = p.id
             WHERE e.status NOT IN {TERMINAL_STATUSES}
               AND e.parent_execution_id IS NOT NULL
               AND (p.id IS NULL OR p.status IN {TERMINAL_STATUSES})"
        );
        #[derive(FromRow)]
        struct IdRow {
            id: String,
        }
        let rows: Vec<IdRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    async fn list_running(&self) -> Result<Vec<ExecutionRecord>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as("SELECT * FROM executions WHERE status = 'RUNNING'")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| r.into_record()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::connection::DatabaseConnection;

    async fn store() -> SqliteStore {
        let conn = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        conn.run_migrations().await.unwrap();
        SqliteStore::new(conn.pool().clone())
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store().await;
        let record = ExecutionRecord::new("exec-1", "flow-1", None, 0);
        store.create_execution(record.clone()).await.unwrap();
        let fetched = store.get_execution("exec-1").await.unwrap();
        assert_eq!(fetched.id, "exec-1");
        assert_eq!(fetched.status, ExecutionStatus::Idle);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let store = store().await;
        store.create_execution(ExecutionRecord::new("exec-1", "flow-1", None, 0)).await.unwrap();
        let err = store.set_status("exec-1", ExecutionStatus::Completed).await.unwrap_err();
        assert!(matches!(err, StoreError::StaleTransition { .. }));
    }

    #[tokio::test]
    async fn flow_snapshot_round_trips() {
        let store = store().await;
        let snapshot = FlowSnapshot {
            flow_id: "flow-1".to_string(),
            nodes: vec![FlowNodeSpec { node_type: "add".to_string(), metadata: serde_json::json!({}) }],
            edges: vec![],
        };
        store.put_flow(snapshot).await.unwrap();
        let loaded = store.load_flow("flow-1").await.unwrap();
        assert_eq!(loaded.nodes.len(), 1);
    }

    #[tokio::test]
    async fn orphan_detection_matches_terminal_parent() {
        let store = store().await;
        store.create_execution(ExecutionRecord::new("parent", "flow-1", None, 0)).await.unwrap();
        store.set_status("parent", ExecutionStatus::Creating).await.unwrap();
        store.set_status("parent", ExecutionStatus::Created).await.unwrap();
        store.set_status("parent", ExecutionStatus::Running).await.unwrap();
        store.set_status("parent", ExecutionStatus::Stopped).await.unwrap();

        store.create_execution(ExecutionRecord::new("child", "flow-1", Some("parent".to_string()), 1)).await.unwrap();

        let orphans = store.list_orphans().await.unwrap();
        assert_eq!(orphans, vec!["child".to_string()]);
    }
}
