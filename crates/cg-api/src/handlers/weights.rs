use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::json;

use cg_common::weighting::{CancelToken, RecalcReport};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecalcRequest {
    /// Recompute a single candidate instead of the whole graph.
    #[serde(default)]
    pub candidate_uid: Option<String>,
    /// Resume a previous batch after this uid (from `last_processed`).
    #[serde(default)]
    pub resume_from: Option<String>,
}

pub async fn recalc(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Json(request): Json<RecalcRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(uid) = &request.candidate_uid {
        if request.resume_from.is_some() {
            return Err(ApiError::BadRequest(
                "candidate_uid and resume_from are mutually exclusive".into(),
            ));
        }
        let outcome = state
            .weighting
            .recalc_for_candidate(uid, chrono::Utc::now())
            .await?;
        return Ok(Json(json!({
            "candidate_uid": uid,
            "examined": outcome.examined,
            "updated": outcome.updated,
        })));
    }

    // Fresh token per batch; the cancel endpoint flags the stored one.
    let cancel = CancelToken::new();
    {
        let mut slot = state
            .recalc_cancel
            .lock()
            .map_err(|_| ApiError::Internal("cancel token lock poisoned".into()))?;
        *slot = cancel.clone();
    }

    let report: RecalcReport = state
        .weighting
        .recalc_all(request.resume_from.as_deref(), &cancel)
        .await?;
    Ok(Json(serde_json::to_value(report).map_err(|err| {
        ApiError::Internal(format!("failed to serialize report: {err}"))
    })?))
}

/// Flag the in-flight batch recompute for cooperative cancellation. The
/// report of the cancelled run carries the resume cursor.
pub async fn cancel_recalc(
    State(state): State<SharedState>,
    _auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .recalc_cancel
        .lock()
        .map_err(|_| ApiError::Internal("cancel token lock poisoned".into()))?
        .cancel();
    Ok(Json(json!({ "cancelled": true })))
}
