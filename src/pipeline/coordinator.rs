//! Chunked ingestion coordinator
//!
//! Owns the job lifecycle. A record set of any size is ingested as a
//! sequence of fixed-size chunks so no single submission risks an oversized
//! transaction or an all-or-nothing failure. Chunk failures are surfaced to
//! the caller untouched; nothing is retried or rolled back here.
//!
//! # Single writer per job
//!
//! Submissions for the same job are serialized through a per-job async lock
//! rather than trusting caller discipline; concurrent submissions queue
//! instead of racing the aggregate merge.

use super::builder::{self, ChunkOutcome};
use crate::error::{CoreError, CoreResult};
use crate::records::ConversationRecord;
use crate::store::{Job, JobStatus, Store};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct IngestCoordinator {
    store: Arc<Store>,
    stale_job_window: Duration,
    job_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IngestCoordinator {
    pub fn new(store: Arc<Store>, stale_job_window: Duration) -> Self {
        Self {
            store,
            stale_job_window,
            job_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a job for an upload. `total_records` is the caller's estimate;
    /// reconciling it against actual content is a display-time concern.
    pub fn create_job(&self, filename: &str, total_records: i64) -> CoreResult<Job> {
        let job = self.store.insert_job(filename, total_records)?;
        tracing::info!(
            "Created ingestion job {} for {} ({} records expected)",
            job.id,
            filename,
            total_records
        );
        Ok(job)
    }

    /// Submit one chunk for processing.
    ///
    /// Fails with a validation error on an empty chunk or a terminal job.
    /// On success the job's processed_records advances by the chunk length;
    /// on failure prior chunks stay persisted and the caller decides whether
    /// to retry or mark the job failed.
    pub async fn submit_chunk(
        &self,
        job_id: &str,
        records: &[ConversationRecord],
    ) -> CoreResult<ChunkOutcome> {
        if records.is_empty() {
            return Err(CoreError::Validation("empty chunk".to_string()));
        }

        let lock = self.lock_for(job_id);
        let _guard = lock.lock().await;

        let job = self.store.get_job(job_id)?;
        if job.status.is_terminal() {
            return Err(CoreError::Validation(format!(
                "job {job_id} is already {}",
                job.status.as_str()
            )));
        }

        let outcome = builder::apply_chunk(&self.store, records)?;
        self.store
            .advance_job_progress(job_id, records.len() as i64)?;

        tracing::debug!(
            "Job {}: chunk of {} records persisted ({} conversations, {} users)",
            job_id,
            outcome.processed,
            outcome.conversations,
            outcome.users
        );
        Ok(outcome)
    }

    /// Caller-driven lifecycle transition (completed/failed, recovery counts)
    pub fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        processed_records: Option<i64>,
        error_message: Option<&str>,
    ) -> CoreResult<Job> {
        let job = self
            .store
            .set_job_status(job_id, status, processed_records, error_message)?;
        tracing::info!("Job {} -> {}", job_id, status.as_str());
        Ok(job)
    }

    /// Close out `processing` jobs whose client crashed. Invoked by an
    /// external reconciler; there is no background scheduler here.
    pub fn reap_stale(&self, older_than: Option<Duration>) -> CoreResult<u64> {
        self.store
            .reap_stale_jobs(older_than.unwrap_or(self.stale_job_window))
    }

    fn lock_for(&self, job_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.job_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;

    fn record(user: &str, conv: &str, idx: i64) -> ConversationRecord {
        ConversationRecord {
            user_id: user.into(),
            conversation_id: conv.into(),
            model: None,
            language: None,
            conversation_turn: Some(idx + 1),
            message_index: idx,
            role: "user".into(),
            content: "hi".into(),
            redacted: false,
        }
    }

    fn coordinator() -> (IngestCoordinator, tempfile::TempDir) {
        let (store, dir) = temp_store();
        (
            IngestCoordinator::new(Arc::new(store), Duration::from_secs(3600)),
            dir,
        )
    }

    #[tokio::test]
    async fn submit_chunk_advances_progress() {
        let (coordinator, _dir) = coordinator();
        let job = coordinator.create_job("data.jsonl", 4).unwrap();

        let outcome = coordinator
            .submit_chunk(&job.id, &[record("u1", "c1", 0), record("u1", "c1", 1)])
            .await
            .unwrap();
        assert_eq!(outcome.processed, 2);

        coordinator
            .submit_chunk(&job.id, &[record("u2", "c2", 0), record("u2", "c2", 1)])
            .await
            .unwrap();

        let job = coordinator
            .update_job_status(&job.id, JobStatus::Completed, None, None)
            .unwrap();
        assert_eq!(job.processed_records, 4);
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn empty_chunk_is_a_validation_error() {
        let (coordinator, _dir) = coordinator();
        let job = coordinator.create_job("data.jsonl", 0).unwrap();
        let err = coordinator.submit_chunk(&job.id, &[]).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let (coordinator, _dir) = coordinator();
        let err = coordinator
            .submit_chunk("missing", &[record("u1", "c1", 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn terminal_job_rejects_chunks() {
        let (coordinator, _dir) = coordinator();
        let job = coordinator.create_job("data.jsonl", 2).unwrap();
        coordinator
            .update_job_status(&job.id, JobStatus::Failed, None, Some("caller aborted"))
            .unwrap();

        let err = coordinator
            .submit_chunk(&job.id, &[record("u1", "c1", 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn failed_chunk_does_not_advance_progress() {
        let (coordinator, _dir) = coordinator();
        let job = coordinator.create_job("data.jsonl", 3).unwrap();

        coordinator
            .submit_chunk(&job.id, &[record("u1", "c1", 0)])
            .await
            .unwrap();
        // Same chunk again: duplicate message, no progress movement
        let err = coordinator
            .submit_chunk(&job.id, &[record("u1", "c1", 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey(_)));

        let job = coordinator.store.get_job(&job.id).unwrap();
        assert_eq!(job.processed_records, 1);
        assert_eq!(job.status, JobStatus::Processing);
    }
}
