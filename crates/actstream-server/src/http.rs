//! Thin JSON-over-HTTP adapter for the four tool-server operations, plus a
//! read-only `/metrics` endpoint (spec §4.9, §6). Hosts that invoke the
//! assistant process out-of-proc use this; in-process callers use
//! [`crate::tool_server::ToolServer`] directly. Both paths share the same
//! `AppState`, so the latency-budget and validation logic is never
//! duplicated.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use actstream_error::{CoreError, ErrorBody};

use crate::tool_server::{AppState, ToolServer};

/// Wraps a `CoreError` so it can be returned directly from an axum handler.
struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            CoreError::Overloaded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CoreError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody::from(self.0))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct LogEventRequest {
    pub customer: String,
    pub activity: String,
    #[serde(default)]
    pub features: Option<Value>,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub event_id: Uuid,
}

async fn log_event_handler(State(state): State<Arc<AppState>>, Json(req): Json<LogEventRequest>) -> ApiResult<AckResponse> {
    let event_id = state.log_event(&req.customer, &req.activity, req.features, req.link).await?;
    Ok(Json(AckResponse { event_id }))
}

#[derive(Debug, Deserialize)]
pub struct GetContextRequest {
    pub customer: String,
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

async fn get_context_handler(State(state): State<Arc<AppState>>, Json(req): Json<GetContextRequest>) -> ApiResult<Option<Value>> {
    let value = state.get_context(&req.customer, req.max_bytes).await?;
    Ok(Json(value))
}

#[derive(Debug, Deserialize)]
pub struct SubmitQueryRequest {
    pub template: String,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    #[serde(default)]
    pub byte_cap: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub ticket_id: Uuid,
}

async fn submit_query_handler(State(state): State<Arc<AppState>>, Json(req): Json<SubmitQueryRequest>) -> ApiResult<TicketResponse> {
    let ticket_id = state.submit_query(&req.template, req.params, req.byte_cap).await?;
    Ok(Json(TicketResponse { ticket_id }))
}

#[derive(Debug, Deserialize)]
pub struct LogInsightRequest {
    pub customer: String,
    pub subject: String,
    pub metric: String,
    pub value: Value,
    pub provenance_hash: String,
}

#[derive(Debug, Serialize)]
pub struct InsightAckResponse {
    pub atom_id: Uuid,
}

async fn log_insight_handler(State(state): State<Arc<AppState>>, Json(req): Json<LogInsightRequest>) -> ApiResult<InsightAckResponse> {
    let atom_id = state.log_insight(&req.customer, &req.subject, &req.metric, req.value, &req.provenance_hash).await?;
    Ok(Json(InsightAckResponse { atom_id }))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<crate::metrics::MetricsDocument> {
    Json(state.metrics_document())
}

async fn ticket_handler(State(state): State<Arc<AppState>>, axum::extract::Path(ticket_id): axum::extract::Path<Uuid>) -> ApiResult<Value> {
    let entry = state.tickets.get(ticket_id).ok_or_else(|| CoreError::not_found(format!("no ticket {ticket_id}")))?;
    let (ticket, result, error) = entry;
    Ok(Json(serde_json::json!({
        "ticket": ticket,
        "result": result,
        "error": error,
    })))
}

/// Builds the router for the four tools, `/metrics`, and ticket polling.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tools/log_event", post(log_event_handler))
        .route("/tools/get_context", post(get_context_handler))
        .route("/tools/submit_query", post(submit_query_handler))
        .route("/tools/log_insight", post(log_insight_handler))
        .route("/tickets/:ticket_id", get(ticket_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
