use axum::{extract::State, Json};
use serde_json::json;
use tokio::time::{timeout, Duration};

use crate::error::ApiError;
use crate::SharedState;

const READINESS_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn livez() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn readyz(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.readiness.load(std::sync::atomic::Ordering::SeqCst) {
        return Err(ApiError::Store("shutting_down".into()));
    }

    // Cheap single-row read doubles as the store ping.
    timeout(READINESS_TIMEOUT, state.store.list_candidates(None, 1))
        .await
        .map_err(|_| ApiError::Store("store_ping_timeout".into()))
        .and_then(|result| {
            result.map_err(|err| ApiError::Store(format!("store ping failed: {err}")))
        })?;

    Ok(Json(json!({
        "status": "ok",
        "store": "ok",
        "epoch": state.epoch.current(),
        "application": env!("CARGO_PKG_NAME"),
    })))
}
