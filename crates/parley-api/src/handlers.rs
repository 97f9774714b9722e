//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path parameters or a JSON body via axum
//! extractors, calls into the conversational router, and returns JSON.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use parley_chat::{check_health, HealthReport};

use crate::error::ApiError;
use crate::state::AppState;

/// Requestor used when a `/converse` body omits one.
pub const DEFAULT_REQUESTOR: &str = "user";

// =============================================================================
// Request / response types
// =============================================================================

/// Request body for POST /converse.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConverseRequest {
    pub query: String,
    #[serde(default)]
    pub requestor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConverseResponse {
    pub reply: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubjectsResponse {
    pub subjects: Vec<String>,
}

/// A single template, as returned by GET /prompts/{key} and /responses/{key}.
#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateResponse {
    pub key: String,
    pub template: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub report: HealthReport,
    pub uptime_secs: u64,
}

// =============================================================================
// Handler functions
// =============================================================================

/// POST /converse - answer one conversational turn.
pub async fn converse(
    State(state): State<AppState>,
    Json(body): Json<ConverseRequest>,
) -> Result<Json<ConverseResponse>, ApiError> {
    let query = body.query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("Field 'query' must not be empty".to_string()));
    }

    let requestor = body
        .requestor
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REQUESTOR);

    debug!(requestor, "Converse request");
    let reply = state.router.converse(query, requestor).await;
    Ok(Json(ConverseResponse { reply }))
}

/// GET /subjects - registered subject names.
pub async fn subjects(State(state): State<AppState>) -> Json<SubjectsResponse> {
    Json(SubjectsResponse {
        subjects: state.router.get_subjects(),
    })
}

/// GET /prompts/{key}
pub async fn get_prompt(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let template = state.router.get_prompt(&key).await?;
    Ok(Json(TemplateResponse { key, template }))
}

/// GET /responses/{key}
pub async fn get_response(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let template = state.router.get_response(&key).await?;
    Ok(Json(TemplateResponse { key, template }))
}

/// GET /hc - probe every configured data source.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = check_health(
        state.router.catalog(),
        state.relational.as_ref(),
        state.document.as_ref(),
        state.router.model_name(),
    )
    .await;

    Json(HealthResponse {
        report,
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
