use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use cg_common::candidates::{CandidateProfile, IngestOutcome, ResumePayload};
use cg_common::matching::RelatedCandidate;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

pub async fn ingest(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Json(payload): Json<ResumePayload>,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    let outcome = state.candidates.ingest(&payload).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn profile(
    State(state): State<SharedState>,
    Path(uid): Path<String>,
    _auth: AuthUser,
) -> Result<Json<CandidateProfile>, ApiError> {
    Ok(Json(state.candidates.profile(&uid).await?))
}

#[derive(Debug, Deserialize)]
pub struct RelatedQuery {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_projection")]
    pub projection: String,
}

const fn default_top_k() -> usize {
    10
}

const fn default_max_hops() -> usize {
    4
}

fn default_projection() -> String {
    "candidate-feature-full".to_string()
}

pub async fn related(
    State(state): State<SharedState>,
    Path(uid): Path<String>,
    Query(query): Query<RelatedQuery>,
    _auth: AuthUser,
) -> Result<Json<Vec<RelatedCandidate>>, ApiError> {
    let ranked = state
        .engine
        .related_candidates(
            &uid,
            query.top_k.min(100),
            query.max_hops.min(8),
            &query.projection,
            state.request_deadline(),
        )
        .await?;
    Ok(Json(ranked))
}
