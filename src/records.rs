// Data models for the flat conversation-message input format
//
// One ConversationRecord per newline-delimited JSON line. We only declare
// the fields the pipeline cares about; Serde ignores extras, which keeps
// ingestion robust to exporter changes.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A single flat message record, immutable once ingested.
///
/// `message_index` defines intra-conversation order and must be unique per
/// conversation; `conversation_turn` is the exporter's turn counter and may
/// be absent (treated as 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub user_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub conversation_turn: Option<i64>,
    pub message_index: i64,
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub redacted: bool,
}

/// Read a newline-delimited JSON dataset fully into memory.
///
/// A malformed line fails the whole upload before any chunk is submitted.
/// Blank lines are skipped.
pub fn read_ndjson(path: &Path) -> CoreResult<Vec<ConversationRecord>> {
    let file = File::open(path)
        .map_err(|e| CoreError::Validation(format!("cannot open {}: {e}", path.display())))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| CoreError::Storage(e.to_string()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: ConversationRecord = serde_json::from_str(trimmed).map_err(|e| {
            CoreError::Validation(format!("malformed record on line {}: {e}", lineno + 1))
        })?;
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_record_with_optional_fields_missing() {
        let json = r#"{"user_id":"u1","conversation_id":"c1","message_index":0,"role":"user","content":"hi"}"#;
        let record: ConversationRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.conversation_turn, None);
        assert!(!record.redacted);
    }

    #[test]
    fn reads_ndjson_and_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"user_id":"u1","conversation_id":"c1","message_index":0,"role":"user","content":"hi","conversation_turn":1}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"user_id":"u1","conversation_id":"c1","message_index":1,"role":"assistant","content":"hello"}}"#
        )
        .unwrap();

        let records = read_ndjson(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].conversation_turn, Some(1));
    }

    #[test]
    fn malformed_line_fails_the_whole_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"user_id":"u1","conversation_id":"c1","message_index":0,"role":"user","content":"hi"}}"#
        )
        .unwrap();
        writeln!(file, "not json").unwrap();

        let err = read_ndjson(file.path()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(err.to_string().contains("line 2"));
    }
}
