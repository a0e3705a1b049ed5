//! User aggregates and dimension scores
//!
//! Aggregates are rolling statistics over every ingested chunk for a user.
//! They are always read-merge-written by the builder; this module only
//! provides the typed fetch/put halves plus the transactional score replace
//! used by the extractor.

use super::{now_rfc3339, Store};
use crate::error::{CoreError, CoreResult};
use crate::scoring::dimensions::Dimension;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

/// Rolling per-user statistics
#[derive(Debug, Clone, Serialize)]
pub struct UserAggregateRow {
    pub user_id: String,
    pub total_conversations: i64,
    pub total_messages: i64,
    /// Running sum of current per-conversation turn counts; kept so the
    /// averages below can be recomputed from sums after any merge
    pub total_turns: i64,
    pub languages: Vec<String>,
    pub models_used: Vec<String>,
    pub avg_turns_per_conversation: f64,
    pub avg_messages_per_conversation: f64,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
    pub profile_generated: bool,
    pub updated_at: String,
}

impl UserAggregateRow {
    /// Empty aggregate for a user seen for the first time
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_conversations: 0,
            total_messages: 0,
            total_turns: 0,
            languages: Vec::new(),
            models_used: Vec::new(),
            avg_turns_per_conversation: 0.0,
            avg_messages_per_conversation: 0.0,
            first_seen: None,
            last_seen: None,
            profile_generated: false,
            updated_at: now_rfc3339(),
        }
    }
}

/// One current score for a (user, dimension) pair
#[derive(Debug, Clone, Serialize)]
pub struct DimensionScoreRow {
    pub user_id: String,
    pub dimension: Dimension,
    pub score: f64,
    pub confidence: f64,
    pub evidence_summary: String,
    pub updated_at: String,
}

fn decode_set(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn encode_set(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

fn aggregate_from_row(row: &Row<'_>) -> rusqlite::Result<UserAggregateRow> {
    let languages: String = row.get(4)?;
    let models: String = row.get(5)?;
    Ok(UserAggregateRow {
        user_id: row.get(0)?,
        total_conversations: row.get(1)?,
        total_messages: row.get(2)?,
        total_turns: row.get(3)?,
        languages: decode_set(&languages),
        models_used: decode_set(&models),
        avg_turns_per_conversation: row.get(6)?,
        avg_messages_per_conversation: row.get(7)?,
        first_seen: row.get(8)?,
        last_seen: row.get(9)?,
        profile_generated: row.get::<_, i64>(10)? != 0,
        updated_at: row.get(11)?,
    })
}

const AGGREGATE_COLUMNS: &str = "user_id, total_conversations, total_messages, total_turns, \
     languages, models_used, avg_turns_per_conversation, avg_messages_per_conversation, \
     first_seen, last_seen, profile_generated, updated_at";

impl Store {
    pub fn get_user_aggregate(&self, user_id: &str) -> CoreResult<Option<UserAggregateRow>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {AGGREGATE_COLUMNS} FROM user_aggregates WHERE user_id = ?1"),
                params![user_id],
                aggregate_from_row,
            )
            .optional()?)
    }

    /// Write back a merged aggregate row wholesale
    pub fn put_user_aggregate(&self, row: &UserAggregateRow) -> CoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO user_aggregates
             (user_id, total_conversations, total_messages, total_turns, languages, models_used,
              avg_turns_per_conversation, avg_messages_per_conversation,
              first_seen, last_seen, profile_generated, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                row.user_id,
                row.total_conversations,
                row.total_messages,
                row.total_turns,
                encode_set(&row.languages),
                encode_set(&row.models_used),
                row.avg_turns_per_conversation,
                row.avg_messages_per_conversation,
                row.first_seen,
                row.last_seen,
                row.profile_generated as i64,
                row.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Current scores for a user, in canonical dimension order
    pub fn get_dimension_scores(&self, user_id: &str) -> CoreResult<Vec<DimensionScoreRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, dimension, score, confidence, evidence_summary, updated_at
             FROM dimension_scores WHERE user_id = ?1",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let dimension: String = row.get(1)?;
            Ok((dimension, row.get::<_, f64>(2)?, row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?, row.get::<_, String>(5)?))
        })?;

        let mut scores = Vec::new();
        for row in rows {
            let (dimension, score, confidence, evidence_summary, updated_at) = row?;
            let Some(dimension) = Dimension::parse(&dimension) else {
                // Rows are only written through the closed set; skip anything
                // a foreign writer may have left behind
                continue;
            };
            scores.push(DimensionScoreRow {
                user_id: user_id.to_string(),
                dimension,
                score,
                confidence,
                evidence_summary,
                updated_at,
            });
        }

        // Canonical order regardless of storage order
        scores.sort_by_key(|s| {
            Dimension::ALL
                .iter()
                .position(|d| *d == s.dimension)
                .unwrap_or(Dimension::ALL.len())
        });
        Ok(scores)
    }

    /// Replace a user's scores wholesale and mark the profile generated.
    ///
    /// All rows are written inside one transaction: either every returned
    /// dimension persists or none does, so a failed regeneration can never
    /// leave a half-updated score set behind.
    pub fn replace_dimension_scores(
        &self,
        user_id: &str,
        scores: &[DimensionScoreRow],
    ) -> CoreResult<()> {
        let conn = self.conn()?;
        conn.execute("BEGIN TRANSACTION", [])?;

        let result = (|| -> CoreResult<()> {
            let mut stmt = conn.prepare(
                "INSERT INTO dimension_scores
                 (user_id, dimension, score, confidence, evidence_summary, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id, dimension) DO UPDATE SET
                     score = excluded.score,
                     confidence = excluded.confidence,
                     evidence_summary = excluded.evidence_summary,
                     updated_at = excluded.updated_at",
            )?;
            for score in scores {
                stmt.execute(params![
                    user_id,
                    score.dimension.as_str(),
                    score.score,
                    score.confidence,
                    score.evidence_summary,
                    score.updated_at,
                ])?;
            }

            conn.execute(
                "UPDATE user_aggregates SET profile_generated = 1, updated_at = ?2 WHERE user_id = ?1",
                params![user_id, now_rfc3339()],
            )?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;

    #[test]
    fn aggregate_round_trips_sets_and_averages() {
        let (store, _dir) = temp_store();
        let mut row = UserAggregateRow::empty("u1");
        row.total_conversations = 2;
        row.total_messages = 7;
        row.total_turns = 5;
        row.languages = vec!["English".into(), "German".into()];
        row.models_used = vec!["model-a".into()];
        row.avg_turns_per_conversation = 2.5;
        row.avg_messages_per_conversation = 3.5;
        row.first_seen = Some("2024-01-01T00:00:00+00:00".into());

        store.put_user_aggregate(&row).unwrap();
        let fetched = store.get_user_aggregate("u1").unwrap().unwrap();
        assert_eq!(fetched.total_messages, 7);
        assert_eq!(fetched.languages, vec!["English", "German"]);
        assert!(!fetched.profile_generated);
    }

    #[test]
    fn missing_aggregate_is_none() {
        let (store, _dir) = temp_store();
        assert!(store.get_user_aggregate("ghost").unwrap().is_none());
    }

    #[test]
    fn replace_scores_is_wholesale_and_sets_flag() {
        let (store, _dir) = temp_store();
        store
            .put_user_aggregate(&UserAggregateRow::empty("u1"))
            .unwrap();

        let score = |d: Dimension, v: f64| DimensionScoreRow {
            user_id: "u1".into(),
            dimension: d,
            score: v,
            confidence: 0.8,
            evidence_summary: "short replies".into(),
            updated_at: now_rfc3339(),
        };

        store
            .replace_dimension_scores("u1", &[score(Dimension::Patience, 2.0)])
            .unwrap();
        store
            .replace_dimension_scores(
                "u1",
                &[score(Dimension::Patience, 9.0), score(Dimension::Verbosity, 8.0)],
            )
            .unwrap();

        let scores = store.get_dimension_scores("u1").unwrap();
        assert_eq!(scores.len(), 2);
        // Canonical order: Patience before Verbosity
        assert_eq!(scores[0].dimension, Dimension::Patience);
        assert_eq!(scores[0].score, 9.0);

        let aggregate = store.get_user_aggregate("u1").unwrap().unwrap();
        assert!(aggregate.profile_generated);
    }
}
