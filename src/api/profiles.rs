// Profile endpoints - aggregates and dimension scores

use super::{ApiError, AppState};
use crate::store::{DimensionScoreRow, UserAggregateRow};
use axum::{
    extract::{Path, State},
    Json,
};

/// GET /api/profiles/:user_id - the rolling aggregate for one user
pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserAggregateRow>, ApiError> {
    state
        .store
        .get_user_aggregate(&user_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no profile for user {user_id}")))
}

/// GET /api/profiles/:user_id/scores - current scores (possibly empty)
pub async fn get_scores(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<DimensionScoreRow>>, ApiError> {
    Ok(Json(state.store.get_dimension_scores(&user_id)?))
}

/// POST /api/profiles/:user_id/scores - run a full re-evaluation
///
/// Blocks for the provider round trip; the caller applies its own timeout.
pub async fn generate_scores(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<DimensionScoreRow>>, ApiError> {
    let scores = state.extractor.generate_scores(&user_id).await?;
    Ok(Json(scores))
}
