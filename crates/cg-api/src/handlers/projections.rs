use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

/// Rebuild the named projection against the current epoch. Dropping first
/// forces a fresh snapshot even when the epoch has not moved.
pub async fn refresh(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    _auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.projections.drop_projection(&name).await;
    let projection = state.projections.ensure(&name).await?;
    Ok(Json(json!({
        "name": projection.name,
        "epoch": projection.epoch,
        "nodes": projection.node_count(),
    })))
}

pub async fn drop(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    _auth: AuthUser,
) -> Json<serde_json::Value> {
    let dropped = state.projections.drop_projection(&name).await;
    Json(json!({ "name": name, "dropped": dropped }))
}
