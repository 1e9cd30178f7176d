//! `GET /healthz` for the worker process (ambient stack item grounded on
//! `orchestrator::api::handlers::health`), reporting liveness plus a
//! snapshot of in-flight execution capacity.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct HealthState {
    pub worker_id: String,
    pub concurrency: Arc<Semaphore>,
    pub max_concurrency: usize,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    worker_id: String,
    available_permits: usize,
    max_concurrency: usize,
}

async fn healthz(State(state): State<HealthState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        worker_id: state.worker_id.clone(),
        available_permits: state.concurrency.available_permits(),
        max_concurrency: state.max_concurrency,
    })
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/healthz", get(healthz)).with_state(state)
}
