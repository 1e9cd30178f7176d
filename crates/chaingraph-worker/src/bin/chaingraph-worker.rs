//! Worker process entrypoint: loads configuration from the environment,
//! wires the bus/store adapters, and runs the control plane, worker
//! runtime, and orphan sweeper side by side until shutdown (spec §6 exit
//! codes, §4.E lifecycle).

use chaingraph_bus::{Broker, InMemoryBroker};
use chaingraph_store::{DatabaseConnection, ExecutionStore, InMemoryStore, SqliteStore};
use chaingraph_worker::{health, ControlPlane, Sweeper, WorkerConfig, WorkerRuntime};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match WorkerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    tracing_subscriber::fmt().with_env_filter(config.log_level.clone()).init();
    tracing::info!(worker_id = %config.worker_id, concurrency = config.worker_concurrency, "starting chaingraph-worker");

    if config.message_bus_brokers.iter().any(|b| b != "memory") {
        tracing::warn!(
            brokers = ?config.message_bus_brokers,
            "only the in-memory broker is wired up in this workspace; external MESSAGE_BUS_BROKERS are ignored"
        );
    }

    let store: Arc<dyn ExecutionStore> = match build_store(&config.database_url).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize execution store");
            return ExitCode::from(1);
        }
    };
    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());

    let control_plane = Arc::new(ControlPlane::new(store.clone(), broker.clone()));
    let runtime = WorkerRuntime::new(
        config.worker_id.clone(),
        store.clone(),
        broker.clone(),
        chaingraph_worker::demo_nodes::demo_registry(),
        config.worker_concurrency,
    );
    let sweeper = Arc::new(Sweeper::new(
        store.clone(),
        broker.clone(),
        Duration::from_millis(config.worker_timeout_ms),
        Duration::from_secs(10),
    ));

    let health_state = health::HealthState {
        worker_id: config.worker_id.clone(),
        concurrency: runtime.concurrency_permits(),
        max_concurrency: config.worker_concurrency,
    };
    let health_router = health::router(health_state);
    let health_listener = match tokio::net::TcpListener::bind("0.0.0.0:0").await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind health listener");
            return ExitCode::from(1);
        }
    };
    tracing::info!(addr = ?health_listener.local_addr().ok(), "worker health endpoint listening");

    let control_plane_task = tokio::spawn(control_plane.run());
    let runtime_task = tokio::spawn(runtime.run());
    let sweeper_task = tokio::spawn(sweeper.run());
    let health_task = tokio::spawn(async move {
        let _ = axum::serve(health_listener, health_router.into_make_service()).await;
    });

    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
            control_plane_task.abort();
            runtime_task.abort();
            sweeper_task.abort();
            health_task.abort();
            ExitCode::from(130)
        }
        _ = control_plane_task => {
            tracing::error!("control plane task exited unexpectedly");
            ExitCode::from(1)
        }
        _ = runtime_task => {
            tracing::error!("worker runtime task exited unexpectedly");
            ExitCode::from(1)
        }
    }
}

async fn build_store(database_url: &str) -> anyhow::Result<Arc<dyn ExecutionStore>> {
    if database_url == "sqlite::memory:" {
        return Ok(Arc::new(InMemoryStore::new()));
    }
    let conn = DatabaseConnection::new(database_url).await?;
    conn.run_migrations().await?;
    Ok(Arc::new(SqliteStore::new(conn.pool().clone())))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install CTRL-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
