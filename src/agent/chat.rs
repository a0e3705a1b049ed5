//! Live chat boundary
//!
//! Sends a user message to the generation provider under the adapted system
//! prompt and reports which adaptations applied. Stateless with respect to
//! the conversation relations: the ingestion builder is the only writer of
//! conversations and messages, so callers carry chat history in the request.

use super::composer::{active_directives, PromptComposer};
use crate::error::{CoreError, CoreResult};
use crate::llm::{ChatMessage, LanguageModel};
use serde::Serialize;
use std::sync::Arc;

/// A profile-adapted reply
#[derive(Debug, Clone, Serialize)]
pub struct AdaptedReply {
    pub response: String,
    /// Human-readable list of the adaptations that were active
    pub adaptations_applied: Vec<String>,
    pub profile_summary: String,
}

pub struct LiveAgent {
    composer: PromptComposer,
    llm: Arc<dyn LanguageModel>,
}

impl LiveAgent {
    pub fn new(composer: PromptComposer, llm: Arc<dyn LanguageModel>) -> Self {
        Self { composer, llm }
    }

    /// The prompt composer, shared with the adaptation preview endpoint
    pub fn composer(&self) -> &PromptComposer {
        &self.composer
    }

    /// Answer one message under the user's adapted system prompt.
    ///
    /// `history` is the caller-held prior conversation, oldest first.
    pub async fn chat(
        &self,
        user_id: &str,
        message: &str,
        history: Vec<ChatMessage>,
    ) -> CoreResult<AdaptedReply> {
        if message.trim().is_empty() {
            return Err(CoreError::Validation("empty message".to_string()));
        }

        let scores = self.composer.scores_for(user_id)?;
        let facts = self.composer.facts_for(user_id)?;
        let system_prompt = super::composer::compose(&scores, &facts);

        let mut messages = history;
        messages.push(ChatMessage::user(message));

        let response = self
            .llm
            .generate(&system_prompt, &messages)
            .await
            .map_err(|e| CoreError::Generation(e.to_string()))?;

        let adaptations_applied = if scores.is_empty() {
            vec!["No profile available - using default behavior".to_string()]
        } else {
            let active = active_directives(&scores);
            if active.is_empty() {
                vec!["All dimensions mid-tier - using default behavior".to_string()]
            } else {
                active
                    .iter()
                    .map(|d| format!("{}: {}-tier directive", d.dimension, d.tier))
                    .collect()
            }
        };

        let profile_summary = format!(
            "{} conversation(s) analyzed, {} dimension(s) scored",
            facts.total_conversations,
            scores.len()
        );

        Ok(AdaptedReply {
            response,
            adaptations_applied,
            profile_summary,
        })
    }
}
