//! Conversation and aggregate builder
//!
//! Converts one flat chunk of records into normalized conversation/message
//! rows and merges incremental statistics into the per-user aggregates.
//! Every combine is a commutative monoid (counts as sums, turn counts as
//! max, language/model sets as unions), so the stored state is independent
//! of how chunk boundaries sliced the input and of chunk arrival order.

use crate::error::{CoreError, CoreResult};
use crate::records::ConversationRecord;
use crate::store::{now_rfc3339, Store, UserAggregateRow};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Per-chunk counts returned to the caller for progress display
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChunkOutcome {
    /// Records persisted from this chunk
    pub processed: usize,
    /// Distinct conversations touched by this chunk
    pub conversations: usize,
    /// Distinct users touched by this chunk
    pub users: usize,
}

/// What one chunk contributed to a single user's aggregate
#[derive(Debug, Default)]
struct UserDelta {
    new_conversations: i64,
    messages: i64,
    turn_delta: i64,
    languages: BTreeSet<String>,
    models: BTreeSet<String>,
}

/// Persist one chunk: conversation merges, then message inserts, then
/// aggregate merges. The three relation writes are sequential without a
/// wrapping transaction; a failure partway leaves prior writes visible,
/// which later chunks repair by merging.
pub fn apply_chunk(store: &Store, records: &[ConversationRecord]) -> CoreResult<ChunkOutcome> {
    if records.is_empty() {
        return Err(CoreError::Validation("empty chunk".to_string()));
    }
    for record in records {
        if record.user_id.is_empty() || record.conversation_id.is_empty() {
            return Err(CoreError::Validation(format!(
                "record at message_index {} is missing user_id or conversation_id",
                record.message_index
            )));
        }
    }

    // Group by conversation; BTreeMap keeps processing order deterministic
    let mut by_conversation: BTreeMap<&str, Vec<&ConversationRecord>> = BTreeMap::new();
    for record in records {
        by_conversation
            .entry(record.conversation_id.as_str())
            .or_default()
            .push(record);
    }

    // 1. Merge conversations, collecting per-user deltas as we go
    let mut user_deltas: BTreeMap<String, UserDelta> = BTreeMap::new();
    for (conversation_id, group) in &by_conversation {
        let first = group[0];
        let turn_count = group
            .iter()
            .map(|r| r.conversation_turn.unwrap_or(0))
            .max()
            .unwrap_or(0);
        let message_count = group.len() as i64;

        let merge = store.merge_conversation(
            conversation_id,
            &first.user_id,
            first.model.as_deref(),
            first.language.as_deref(),
            turn_count,
            message_count,
        )?;

        let delta = user_deltas.entry(first.user_id.clone()).or_default();
        if merge.created {
            delta.new_conversations += 1;
        }
        delta.turn_delta += merge.turn_delta;
        delta.messages += message_count;
        for record in group {
            if let Some(language) = &record.language {
                delta.languages.insert(language.clone());
            }
            if let Some(model) = &record.model {
                delta.models.insert(model.clone());
            }
        }
    }

    // 2. Insert messages (duplicate submission of the same chunk fails here)
    store.insert_messages(records)?;

    // 3. Read-merge-write each touched aggregate
    let users = user_deltas.len();
    for (user_id, delta) in user_deltas {
        let mut aggregate = store
            .get_user_aggregate(&user_id)?
            .unwrap_or_else(|| UserAggregateRow::empty(&user_id));
        merge_aggregate(&mut aggregate, &delta);
        store.put_user_aggregate(&aggregate)?;
    }

    Ok(ChunkOutcome {
        processed: records.len(),
        conversations: by_conversation.len(),
        users,
    })
}

/// Fold one chunk's deltas into an aggregate row and recompute the averages
/// from the merged sums
fn merge_aggregate(aggregate: &mut UserAggregateRow, delta: &UserDelta) {
    let now = now_rfc3339();

    aggregate.total_conversations += delta.new_conversations;
    aggregate.total_messages += delta.messages;
    aggregate.total_turns += delta.turn_delta;

    union_into(&mut aggregate.languages, &delta.languages);
    union_into(&mut aggregate.models_used, &delta.models);

    if aggregate.total_conversations > 0 {
        aggregate.avg_turns_per_conversation =
            aggregate.total_turns as f64 / aggregate.total_conversations as f64;
        aggregate.avg_messages_per_conversation =
            aggregate.total_messages as f64 / aggregate.total_conversations as f64;
    }

    // first_seen is set once; last_seen always advances
    if aggregate.first_seen.is_none() {
        aggregate.first_seen = Some(now.clone());
    }
    aggregate.last_seen = Some(now.clone());
    aggregate.updated_at = now;
}

/// Set union keeping the stored vector sorted and deduplicated
fn union_into(target: &mut Vec<String>, additions: &BTreeSet<String>) {
    let mut set: BTreeSet<String> = target.drain(..).collect();
    set.extend(additions.iter().cloned());
    target.extend(set);
}
