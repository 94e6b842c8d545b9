//! HTTP front
//!
//! `/health` and `/stats` are answered locally; every other request is
//! dispatched to one machine and answered with the outcome:
//!
//! | Outcome                       | Status |
//! |-------------------------------|--------|
//! | Forwarded                     | 202    |
//! | Rejected (NoEligibleMachine)  | 503    |
//! | Rejected (ForwardingFailure)  | 502    |

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use balance_core::{DispatchOutcome, RejectReason};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::dispatcher::Dispatcher;
use crate::stats::StatsSnapshot;
use crate::transport::ForwardRequest;

/// Headers that describe the inbound connection rather than the request
const SKIPPED_HEADERS: [header::HeaderName; 4] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
];

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .fallback(dispatch_request)
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "balance-dispatcher",
        "machines": state.dispatcher.registry().ids(),
        "max_queue_depth": state.dispatcher.threshold().max(),
    }))
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.dispatcher.stats())
}

pub async fn dispatch_request(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut headers = headers;
    for name in &SKIPPED_HEADERS {
        headers.remove(name);
    }

    let request = ForwardRequest::new(method.as_str(), path_and_query)
        .with_headers(headers)
        .with_body(body);

    let outcome = state.dispatcher.dispatch(request).await;
    (status_for(&outcome), Json(outcome))
}

fn status_for(outcome: &DispatchOutcome) -> StatusCode {
    match outcome {
        DispatchOutcome::Forwarded { .. } => StatusCode::ACCEPTED,
        DispatchOutcome::Rejected {
            reason: RejectReason::NoEligibleMachine,
        } => StatusCode::SERVICE_UNAVAILABLE,
        DispatchOutcome::Rejected {
            reason: RejectReason::ForwardingFailure { .. },
        } => StatusCode::BAD_GATEWAY,
    }
}
