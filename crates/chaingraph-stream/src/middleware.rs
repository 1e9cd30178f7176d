//! HTTP middleware for the event stream server (spec §6 ambient stack),
//! grounded on `orchestrator::api::middleware::{cors, logging}`.

use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Permissive CORS: the event stream is read by browser clients on
/// whatever origin the editor frontend is served from.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::permissive()
}

pub fn logging_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_construct_without_panicking() {
        let _cors = cors_layer();
        let _trace = logging_layer();
    }
}
