//! Behavioral score extraction
//!
//! Builds a bounded transcript from a user's stored messages, asks the
//! provider for one rating per dimension against a fixed schema, validates
//! the result, and replaces the user's stored scores wholesale. Each call is
//! a full re-evaluation: no blending with history, no confidence-weighted
//! merge. A failed call leaves existing scores untouched.

use crate::error::{CoreError, CoreResult};
use crate::llm::LanguageModel;
use crate::scoring::dimensions::{Dimension, MAX_SCORE, MIN_SCORE};
use crate::store::{now_rfc3339, DimensionScoreRow, SampledMessage, Store};
use crate::util::truncate_chars;
use std::sync::Arc;

pub struct ScoreExtractor {
    store: Arc<Store>,
    llm: Arc<dyn LanguageModel>,
    /// Bounded prefix size; a cost/latency tradeoff, not a claim of
    /// statistical representativeness
    sample_limit: usize,
    /// Per-message character cap in the transcript
    max_message_chars: usize,
}

impl ScoreExtractor {
    pub fn new(
        store: Arc<Store>,
        llm: Arc<dyn LanguageModel>,
        sample_limit: usize,
        max_message_chars: usize,
    ) -> Self {
        Self {
            store,
            llm,
            sample_limit,
            max_message_chars,
        }
    }

    /// Produce and persist a validated, confidence-scored rating per
    /// dimension from the user's conversation history.
    pub async fn generate_scores(&self, user_id: &str) -> CoreResult<Vec<DimensionScoreRow>> {
        let messages = self.store.sample_messages(user_id, self.sample_limit)?;
        if messages.is_empty() {
            return Err(CoreError::NotFound(format!(
                "no messages for user {user_id}"
            )));
        }

        let transcript = build_transcript(&messages, self.max_message_chars);
        let prompt = format!(
            "Analyze this conversation history and rate the user (not the assistant) \
             on each behavioral dimension.\n\n\
             ## Conversation history\n{transcript}\n\n\
             ## Instructions\n\
             Rate only from evidence in the history. Return a JSON array with one entry \
             per dimension you can assess, each shaped as \
             {{\"dimension\", \"score\", \"confidence\", \"evidence_summary\"}}."
        );

        tracing::debug!(
            "Scoring user {} from {} sampled message(s)",
            user_id,
            messages.len()
        );

        let value = self
            .llm
            .classify(&prompt, &classification_schema())
            .await
            .map_err(|e| CoreError::Generation(e.to_string()))?;

        let scores = parse_scores(user_id, &value)?;
        self.store.replace_dimension_scores(user_id, &scores)?;

        tracing::info!("Generated {} dimension score(s) for user {}", scores.len(), user_id);
        Ok(scores)
    }
}

/// Role-tagged transcript with per-message truncation
fn build_transcript(messages: &[SampledMessage], max_chars: usize) -> String {
    let mut lines = Vec::with_capacity(messages.len());
    for message in messages {
        let truncated = truncate_chars(&message.content, max_chars);
        let marker = if truncated.len() < message.content.len() {
            "... [truncated]"
        } else {
            ""
        };
        lines.push(format!(
            "[{}]: {}{}",
            message.role.to_uppercase(),
            truncated,
            marker
        ));
    }
    lines.join("\n\n")
}

/// The fixed structured-output schema sent with every classification call
fn classification_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "dimension": {
                    "type": "string",
                    "enum": Dimension::ALL.iter().map(|d| d.as_str()).collect::<Vec<_>>()
                },
                "score": { "type": "number", "minimum": MIN_SCORE, "maximum": MAX_SCORE },
                "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                "evidence_summary": { "type": "string" }
            },
            "required": ["dimension", "score", "confidence", "evidence_summary"]
        }
    })
}

/// Validate the provider's structured output into score rows.
///
/// The whole call fails on anything outside the closed dimension set; there
/// is no partial persist of a half-valid response.
fn parse_scores(user_id: &str, value: &serde_json::Value) -> CoreResult<Vec<DimensionScoreRow>> {
    // Tolerate providers that wrap the array in an object
    let entries = value
        .as_array()
        .or_else(|| value.get("scores").and_then(|v| v.as_array()))
        .ok_or_else(|| CoreError::Generation("provider returned no score array".to_string()))?;

    if entries.is_empty() {
        return Err(CoreError::Generation(
            "provider returned an empty score array".to_string(),
        ));
    }

    let now = now_rfc3339();
    let mut scores = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = entry
            .get("dimension")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::Generation("score entry without dimension".to_string()))?;
        let dimension = Dimension::parse(name)
            .ok_or_else(|| CoreError::Generation(format!("unknown dimension: {name}")))?;

        let score = entry
            .get("score")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| CoreError::Generation(format!("{name}: missing numeric score")))?
            .clamp(MIN_SCORE, MAX_SCORE);
        let confidence = entry
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);
        let evidence_summary = entry
            .get("evidence_summary")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        scores.push(DimensionScoreRow {
            user_id: user_id.to_string(),
            dimension,
            score,
            confidence,
            evidence_summary,
            updated_at: now.clone(),
        });
    }

    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ProviderError};
    use crate::pipeline::builder::apply_chunk;
    use crate::records::ConversationRecord;
    use crate::store::test_support::temp_store;
    use async_trait::async_trait;

    /// Deterministic provider stub: classify returns the canned value,
    /// generate echoes a fixed reply
    struct StubModel {
        classification: serde_json::Value,
    }

    #[async_trait]
    impl LanguageModel for StubModel {
        async fn classify(
            &self,
            _prompt: &str,
            _schema: &serde_json::Value,
        ) -> Result<serde_json::Value, ProviderError> {
            Ok(self.classification.clone())
        }

        async fn generate(
            &self,
            _system: &str,
            _messages: &[ChatMessage],
        ) -> Result<String, ProviderError> {
            Ok("ok".to_string())
        }
    }

    fn seeded_store() -> (Arc<Store>, tempfile::TempDir) {
        let (store, dir) = temp_store();
        let store = Arc::new(store);
        let records: Vec<ConversationRecord> = (0..3)
            .map(|idx| ConversationRecord {
                user_id: "u1".into(),
                conversation_id: "c1".into(),
                model: None,
                language: None,
                conversation_turn: Some(idx + 1),
                message_index: idx,
                role: if idx % 2 == 0 { "user" } else { "assistant" }.into(),
                content: "please hurry up".into(),
                redacted: false,
            })
            .collect();
        apply_chunk(&store, &records).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn user_without_messages_is_not_found() {
        let (store, _dir) = temp_store();
        let extractor = ScoreExtractor::new(
            Arc::new(store),
            Arc::new(StubModel {
                classification: serde_json::json!([]),
            }),
            200,
            500,
        );

        let err = extractor.generate_scores("ghost").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn valid_response_is_persisted_and_flags_profile() {
        let (store, _dir) = seeded_store();
        let extractor = ScoreExtractor::new(
            store.clone(),
            Arc::new(StubModel {
                classification: serde_json::json!([
                    {"dimension": "Patience", "score": 2, "confidence": 0.9,
                     "evidence_summary": "repeatedly asks to hurry"},
                    {"dimension": "Verbosity", "score": 8, "confidence": 0.7,
                     "evidence_summary": "long detailed messages"}
                ]),
            }),
            200,
            500,
        );

        let scores = extractor.generate_scores("u1").await.unwrap();
        assert_eq!(scores.len(), 2);

        let stored = store.get_dimension_scores("u1").unwrap();
        assert_eq!(stored[0].dimension, Dimension::Patience);
        assert_eq!(stored[0].score, 2.0);
        assert!(store
            .get_user_aggregate("u1")
            .unwrap()
            .unwrap()
            .profile_generated);
    }

    #[tokio::test]
    async fn unknown_dimension_fails_whole_call() {
        let (store, _dir) = seeded_store();
        let extractor = ScoreExtractor::new(
            store.clone(),
            Arc::new(StubModel {
                classification: serde_json::json!([
                    {"dimension": "Charisma", "score": 5, "confidence": 0.5,
                     "evidence_summary": ""}
                ]),
            }),
            200,
            500,
        );

        let err = extractor.generate_scores("u1").await.unwrap_err();
        assert!(matches!(err, CoreError::Generation(_)));
        // Nothing persisted, flag untouched
        assert!(store.get_dimension_scores("u1").unwrap().is_empty());
        assert!(!store
            .get_user_aggregate("u1")
            .unwrap()
            .unwrap()
            .profile_generated);
    }

    #[tokio::test]
    async fn empty_array_is_a_generation_error() {
        let (store, _dir) = seeded_store();
        let extractor = ScoreExtractor::new(
            store,
            Arc::new(StubModel {
                classification: serde_json::json!([]),
            }),
            200,
            500,
        );
        let err = extractor.generate_scores("u1").await.unwrap_err();
        assert!(matches!(err, CoreError::Generation(_)));
    }

    #[test]
    fn scores_and_confidence_are_clamped() {
        let value = serde_json::json!([
            {"dimension": "Patience", "score": 42, "confidence": 1.8,
             "evidence_summary": ""}
        ]);
        let scores = parse_scores("u1", &value).unwrap();
        assert_eq!(scores[0].score, MAX_SCORE);
        assert_eq!(scores[0].confidence, 1.0);
    }

    #[test]
    fn transcript_tags_roles_and_truncates() {
        let messages = vec![
            SampledMessage {
                role: "user".into(),
                content: "abcdefghij".into(),
            },
            SampledMessage {
                role: "assistant".into(),
                content: "ok".into(),
            },
        ];
        let transcript = build_transcript(&messages, 4);
        assert!(transcript.starts_with("[USER]: abcd... [truncated]"));
        assert!(transcript.contains("[ASSISTANT]: ok"));
    }
}
