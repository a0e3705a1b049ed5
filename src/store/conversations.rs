//! Conversation and message persistence
//!
//! Conversations merge on conflict: turn_count takes the running max and
//! message_count the running sum, so stored counters are independent of how
//! chunk boundaries sliced the conversation. Messages are append-only; a
//! primary-key collision means the same chunk was submitted twice and is
//! surfaced as a duplicate-key failure, never silently deduplicated.

use super::{now_rfc3339, Store};
use crate::error::{CoreError, CoreResult};
use crate::records::ConversationRecord;
use rusqlite::{params, ErrorCode, OptionalExtension};
use serde::Serialize;

/// One conversation row as stored
#[derive(Debug, Clone, Serialize)]
pub struct ConversationRow {
    pub conversation_id: String,
    pub user_id: String,
    pub model: Option<String>,
    pub language: Option<String>,
    pub turn_count: i64,
    pub message_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Outcome of merging one chunk's view of a conversation into the stored row
#[derive(Debug, Clone, Copy)]
pub struct ConversationMerge {
    /// True when this chunk created the conversation
    pub created: bool,
    /// How much the stored turn_count grew (0 when the chunk's max was not
    /// higher than what was already stored)
    pub turn_delta: i64,
}

/// Role-tagged message content sampled for transcript building
#[derive(Debug, Clone)]
pub struct SampledMessage {
    pub role: String,
    pub content: String,
}

impl Store {
    /// Merge one chunk's view of a conversation into the stored row.
    ///
    /// Identity attributes (user_id, model, language) are first-writer-wins;
    /// counters merge with max/sum. The returned turn delta feeds the user
    /// aggregate merge so avg_turns stays recomputable from sums.
    pub fn merge_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
        model: Option<&str>,
        language: Option<&str>,
        turn_count: i64,
        message_count: i64,
    ) -> CoreResult<ConversationMerge> {
        let conn = self.conn()?;
        let now = now_rfc3339();

        let existing_turns: Option<i64> = conn
            .query_row(
                "SELECT turn_count FROM conversations WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()?;

        match existing_turns {
            None => {
                conn.execute(
                    "INSERT INTO conversations
                     (conversation_id, user_id, model, language, turn_count, message_count, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                    params![conversation_id, user_id, model, language, turn_count, message_count, now],
                )?;
                Ok(ConversationMerge {
                    created: true,
                    turn_delta: turn_count,
                })
            }
            Some(old_turns) => {
                conn.execute(
                    "UPDATE conversations
                     SET turn_count = MAX(turn_count, ?2),
                         message_count = message_count + ?3,
                         model = COALESCE(model, ?4),
                         language = COALESCE(language, ?5),
                         updated_at = ?6
                     WHERE conversation_id = ?1",
                    params![conversation_id, turn_count, message_count, model, language, now],
                )?;
                Ok(ConversationMerge {
                    created: false,
                    turn_delta: (turn_count - old_turns).max(0),
                })
            }
        }
    }

    pub fn get_conversation(&self, conversation_id: &str) -> CoreResult<ConversationRow> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT conversation_id, user_id, model, language, turn_count, message_count, created_at, updated_at
             FROM conversations WHERE conversation_id = ?1",
            params![conversation_id],
            |row| {
                Ok(ConversationRow {
                    conversation_id: row.get(0)?,
                    user_id: row.get(1)?,
                    model: row.get(2)?,
                    language: row.get(3)?,
                    turn_count: row.get(4)?,
                    message_count: row.get(5)?,
                    created_at: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| CoreError::NotFound(format!("conversation {conversation_id}")))
    }

    /// Insert a chunk's messages as new rows inside one transaction.
    ///
    /// A primary-key collision rolls the batch back and fails with a
    /// duplicate-key error naming the colliding message.
    pub fn insert_messages(&self, records: &[ConversationRecord]) -> CoreResult<usize> {
        let conn = self.conn()?;
        let now = now_rfc3339();

        conn.execute("BEGIN TRANSACTION", [])?;

        let result = (|| -> CoreResult<usize> {
            let mut stmt = conn.prepare(
                "INSERT INTO messages
                 (conversation_id, message_index, role, content, conversation_turn, redacted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for record in records {
                stmt.execute(params![
                    record.conversation_id,
                    record.message_index,
                    record.role,
                    record.content,
                    record.conversation_turn,
                    record.redacted as i64,
                    now,
                ])
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(code, _)
                        if code.code == ErrorCode::ConstraintViolation =>
                    {
                        CoreError::DuplicateKey(format!(
                            "message ({}, {}) already ingested",
                            record.conversation_id, record.message_index
                        ))
                    }
                    other => CoreError::from(other),
                })?;
            }
            Ok(records.len())
        })();

        match result {
            Ok(count) => {
                conn.execute("COMMIT", [])?;
                Ok(count)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    /// Sample a bounded prefix of a user's messages for transcript building.
    ///
    /// Ordered by (conversation_id, message_index) ascending: a deterministic
    /// prefix, not a representative sample.
    pub fn sample_messages(&self, user_id: &str, limit: usize) -> CoreResult<Vec<SampledMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT m.role, m.content
             FROM messages m
             JOIN conversations c ON m.conversation_id = c.conversation_id
             WHERE c.user_id = ?1
             ORDER BY m.conversation_id ASC, m.message_index ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            Ok(SampledMessage {
                role: row.get(0)?,
                content: row.get(1)?,
            })
        })?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;

    fn record(conv: &str, idx: i64, turn: i64) -> ConversationRecord {
        ConversationRecord {
            user_id: "u1".into(),
            conversation_id: conv.into(),
            model: Some("model-a".into()),
            language: Some("English".into()),
            conversation_turn: Some(turn),
            message_index: idx,
            role: if idx % 2 == 0 { "user" } else { "assistant" }.into(),
            content: format!("message {idx}"),
            redacted: false,
        }
    }

    #[test]
    fn merge_creates_then_merges_counters() {
        let (store, _dir) = temp_store();

        let first = store
            .merge_conversation("c1", "u1", Some("model-a"), Some("English"), 2, 2)
            .unwrap();
        assert!(first.created);
        assert_eq!(first.turn_delta, 2);

        // A later chunk with one more message and a higher turn counter
        let second = store
            .merge_conversation("c1", "u1", None, None, 3, 1)
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.turn_delta, 1);

        let row = store.get_conversation("c1").unwrap();
        assert_eq!(row.turn_count, 3);
        assert_eq!(row.message_count, 3);
        // First-writer identity attributes survive the None merge
        assert_eq!(row.model.as_deref(), Some("model-a"));
    }

    #[test]
    fn merge_never_shrinks_counters() {
        let (store, _dir) = temp_store();
        store
            .merge_conversation("c1", "u1", None, None, 5, 4)
            .unwrap();

        // Re-ingesting an earlier slice must not move turn_count down
        let merge = store
            .merge_conversation("c1", "u1", None, None, 2, 2)
            .unwrap();
        assert_eq!(merge.turn_delta, 0);

        let row = store.get_conversation("c1").unwrap();
        assert_eq!(row.turn_count, 5);
        assert_eq!(row.message_count, 6);
    }

    #[test]
    fn duplicate_message_fails_and_rolls_back() {
        let (store, _dir) = temp_store();
        store
            .merge_conversation("c1", "u1", None, None, 1, 1)
            .unwrap();
        store.insert_messages(&[record("c1", 0, 1)]).unwrap();

        // Re-submitting the same chunk plus a new message: the whole batch
        // is rejected, the new message is not kept
        let err = store
            .insert_messages(&[record("c1", 0, 1), record("c1", 1, 1)])
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey(_)));
        assert!(err.to_string().contains("(c1, 0)"));

        let sampled = store.sample_messages("u1", 10).unwrap();
        assert_eq!(sampled.len(), 1);
    }

    #[test]
    fn sampling_is_ordered_and_bounded() {
        let (store, _dir) = temp_store();
        store
            .merge_conversation("c1", "u1", None, None, 2, 3)
            .unwrap();
        store
            .insert_messages(&[record("c1", 2, 2), record("c1", 0, 1), record("c1", 1, 1)])
            .unwrap();

        let sampled = store.sample_messages("u1", 2).unwrap();
        assert_eq!(sampled.len(), 2);
        assert_eq!(sampled[0].content, "message 0");
        assert_eq!(sampled[1].content, "message 1");
    }
}
