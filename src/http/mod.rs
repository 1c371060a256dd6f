//! HTTP surface (C9, spec §6/§4.9): route glue wiring axum handlers,
//! request validation, and the middleware stack onto `AppState`.

pub mod routes;
pub mod schema;

use crate::state::AppState;
use axum::extract::{MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the full router: routes plus the ambient middleware stack
/// (tracing, permissive CORS — no auth in scope per the Non-goals).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", axum::routing::get(routes::health))
        .route("/metrics", axum::routing::get(routes::metrics))
        .route("/v1/chat/completions", axum::routing::post(routes::chat_completions))
        .layer(middleware::from_fn_with_state(state.clone(), record_http_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Records every response into the `llm_gateway_http_request*` metrics
/// (spec §4.8), regardless of which handler served it.
async fn record_http_metrics(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let route = req.extensions().get::<MatchedPath>().map(|p| p.as_str().to_string()).unwrap_or_else(|| req.uri().path().to_string());
    let start = Instant::now();

    let response = next.run(req).await;

    state.metrics().observe_http_request(&method, &route, response.status().as_u16(), start.elapsed().as_secs_f64());
    response
}
