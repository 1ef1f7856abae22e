use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use cg_common::graph::NodeRecord;
use cg_common::matching::{MatchCriteria, MatchResult, PathResult, SearchCriteria};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

pub async fn match_candidates(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Json(criteria): Json<MatchCriteria>,
) -> Result<Json<Vec<MatchResult>>, ApiError> {
    let ranked = state
        .engine
        .match_candidates(&criteria, state.request_deadline())
        .await?;
    Ok(Json(ranked))
}

pub async fn search(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Json(criteria): Json<SearchCriteria>,
) -> Result<Json<Vec<NodeRecord>>, ApiError> {
    let hits = state
        .engine
        .search(&criteria, state.request_deadline())
        .await?;
    Ok(Json(hits))
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub from: String,
    pub to: String,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_projection")]
    pub projection: String,
}

const fn default_max_hops() -> usize {
    4
}

fn default_projection() -> String {
    "candidate-feature-full".to_string()
}

/// "No path within max_hops" is a 200 with `path: null`, not an error.
#[derive(Debug, Serialize)]
pub struct PathResponse {
    pub path: Option<PathResult>,
}

pub async fn shortest_path(
    State(state): State<SharedState>,
    Query(query): Query<PathQuery>,
    _auth: AuthUser,
) -> Result<Json<PathResponse>, ApiError> {
    let path = state
        .engine
        .shortest_path(
            &query.from,
            &query.to,
            query.max_hops.min(8),
            &query.projection,
            state.request_deadline(),
        )
        .await?;
    Ok(Json(PathResponse { path }))
}
