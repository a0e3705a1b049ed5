// Agent endpoints - adaptation preview and the live chat boundary

use super::{ApiError, AppState};
use crate::agent::composer::{active_directives, compose, ActiveDirective};
use crate::agent::AdaptedReply;
use crate::llm::ChatMessage;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct AdaptationResponse {
    pub user_id: String,
    pub directives: Vec<ActiveDirective>,
    pub prompt: String,
}

/// GET /api/agent/adaptation/:user_id - preview how the agent would adapt,
/// without calling the provider
pub async fn get_adaptation(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<AdaptationResponse>, ApiError> {
    let composer = state.agent.composer();
    let scores = composer.scores_for(&user_id)?;
    let facts = composer.facts_for(&user_id)?;

    Ok(Json(AdaptationResponse {
        user_id,
        directives: active_directives(&scores),
        prompt: compose(&scores, &facts),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    /// Caller-held prior turns, oldest first
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// POST /api/agent/chat - profile-adapted reply
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<AdaptedReply>, ApiError> {
    let reply = state
        .agent
        .chat(&request.user_id, &request.message, request.history)
        .await?;
    Ok(Json(reply))
}
