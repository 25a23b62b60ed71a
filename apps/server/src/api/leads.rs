use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use leadpulse_core::leads::{LatencyUpdate, Lead, NewLead, SubmitOutcome};
use serde::Deserialize;

const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<String>,
}

impl RecentQuery {
    /// Integers past the i64 range saturate so they clamp like any other
    /// out-of-range limit. Anything that is not an integer is rejected.
    fn limit(&self) -> Result<Option<i64>, ApiError> {
        let raw = match self.limit.as_deref().map(str::trim) {
            None | Some("") => return Ok(None),
            Some(raw) => raw,
        };
        if let Ok(limit) = raw.parse::<i64>() {
            return Ok(Some(limit));
        }
        let (negative, digits) = match raw.strip_prefix('-') {
            Some(digits) => (true, digits),
            None => (false, raw.strip_prefix('+').unwrap_or(raw)),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ApiError::BadRequest(format!(
                "limit must be an integer, got '{raw}'"
            )));
        }
        Ok(Some(if negative { i64::MIN } else { i64::MAX }))
    }
}

async fn submit_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<NewLead>, JsonRejection>,
) -> ApiResult<Json<SubmitOutcome>> {
    let Json(mut new_lead) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if let Some(value) = headers.get(IDEMPOTENCY_HEADER) {
        let key = value
            .to_str()
            .map_err(|_| ApiError::BadRequest("Idempotency-Key must be ASCII".to_string()))?;
        new_lead.idempotency_key = Some(key.to_string());
    }
    let outcome = state.lead_service.submit(new_lead).await?;
    Ok(Json(outcome))
}

async fn recent_submissions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Lead>>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let leads = state.lead_service.recent(query.limit()?)?;
    Ok(Json(leads))
}

async fn record_latency(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<LatencyUpdate>, JsonRejection>,
) -> ApiResult<Json<Lead>> {
    let Path(id) = id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let Json(update) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let lead = state.lead_service.record_latency(id, update).await?;
    Ok(Json(lead))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/submit-form", post(submit_form))
        .route("/submissions", get(recent_submissions))
        .route("/submissions/{id}/latency", post(record_latency))
}
