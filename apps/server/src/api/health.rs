use std::sync::Arc;

use crate::main_lib::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    subscribers: usize,
}

async fn healthz() -> &'static str {
    "ok"
}

/// Number of live stream subscribers.
async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        subscribers: state.event_bus.subscriber_count().await,
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
}
