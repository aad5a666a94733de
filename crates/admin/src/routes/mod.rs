//! HTTP routes for the garage back office.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                  - Liveness check
//! GET  /health/ready                            - Readiness check (store reachable)
//!
//! # Catalog
//! GET  /api/inventory                           - Items with stock status (?include_inactive=true)
//! GET  /api/inventory/low-stock                 - Active items at or below minimum
//! GET  /api/inventory/{item_id}                 - Single item
//! POST /api/inventory                           - Add item (manager)
//! POST /api/inventory/{item_id}/deactivate      - Soft-delete item (manager)
//!
//! # Ledger
//! POST /api/inventory/transaction               - Record an inward/outward movement
//! POST /api/inventory/consumption               - Record materials used by an order
//!
//! # Reporting
//! GET  /api/inventory/{item_id}/history         - Movements, newest first
//! GET  /api/inventory/{item_id}/reconciliation  - Replay ledger for one item (manager)
//! GET  /api/inventory/reconciliation            - Replay ledger for every item (manager)
//! ```

pub mod inventory;

use axum::{
    Router,
    extract::State,
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::from_fn,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultOnResponse, OnResponse, TraceLayer},
};
use tracing::Span;

use crate::middleware::{REQUEST_ID_HEADER, request_id_middleware, security_headers_middleware};
use crate::state::AppState;

/// Inventory API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Catalog
        .route("/api/inventory", get(inventory::list_items).post(inventory::add_item))
        .route("/api/inventory/low-stock", get(inventory::list_low_stock))
        .route("/api/inventory/{item_id}", get(inventory::get_item))
        .route(
            "/api/inventory/{item_id}/deactivate",
            post(inventory::deactivate_item),
        )
        // Ledger
        .route("/api/inventory/transaction", post(inventory::record_transaction))
        .route("/api/inventory/consumption", post(inventory::record_consumption))
        // Reporting
        .route("/api/inventory/{item_id}/history", get(inventory::item_history))
        .route(
            "/api/inventory/{item_id}/reconciliation",
            get(inventory::reconcile_item),
        )
        .route("/api/inventory/reconciliation", get(inventory::reconcile_all))
}

/// Build the full application: health checks, API routes and middleware.
///
/// Sentry layers are added by the binary so tests can run without a client.
pub fn app(state: AppState, cors_origins: &[String]) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes());

    if let Some(cors) = cors_layer(cors_origins) {
        router = router.layer(cors);
    }

    router
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                        request_id = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}

/// CORS for configured browser origins; `None` leaves CORS off entirely.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring unusable CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static(REQUEST_ID_HEADER),
            ])
            .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)]),
    )
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.inventory().health_check().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
