//! Event Stream Service entrypoint: loads configuration from the
//! environment, wires the bus consumer and connection registry, and serves
//! the duplex WebSocket endpoint until shutdown (spec §4.F, §6).

use chaingraph_bus::{Broker, InMemoryBroker};
use chaingraph_stream::{dispatch::Dispatcher, registry::Registry, ws, StreamConfig};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match StreamConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    tracing_subscriber::fmt().with_env_filter(config.log_level.clone()).init();
    tracing::info!(port = config.port, ws_path = %config.ws_path, "starting chaingraph-stream");

    if config.message_bus_brokers.iter().any(|b| b != "memory") {
        tracing::warn!(
            brokers = ?config.message_bus_brokers,
            "only the in-memory broker is wired up in this workspace; external MESSAGE_BUS_BROKERS are ignored"
        );
    }

    // A dedicated process only makes sense against a shared broker; in this
    // workspace the worker and stream service run against the same
    // in-memory broker instance when colocated, so a standalone run here
    // only ever sees its own (empty) topic. That's expected for the binary
    // in isolation; chaingraph-worker's bin is the one driving executions.
    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
    let registry = Registry::new(config.max_connections);

    let dispatcher = Dispatcher::new(broker.clone(), registry.clone());
    let dispatcher_task = tokio::spawn(dispatcher.run());

    let reaper_task = tokio::spawn(ws::idle_reaper(
        registry.clone(),
        config.idle_timeout_secs as i64,
        Duration::from_secs(10),
    ));

    let state = ws::StreamState { registry: registry.clone(), outbox_buffer_size: config.connection_buffer_size };
    let router = ws::router(state, &config.ws_path);

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, port = config.port, "failed to bind event stream listener");
            return ExitCode::from(1);
        }
    };
    tracing::info!(addr = ?listener.local_addr().ok(), "event stream service listening");

    let server_task = tokio::spawn(async move {
        let _ = axum::serve(listener, router.into_make_service()).await;
    });

    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
            dispatcher_task.abort();
            reaper_task.abort();
            server_task.abort();
            ExitCode::from(130)
        }
        _ = server_task => {
            tracing::error!("event stream server exited unexpectedly");
            ExitCode::from(1)
        }
        _ = dispatcher_task => {
            tracing::error!("event dispatcher exited unexpectedly");
            ExitCode::from(1)
        }
    }
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
