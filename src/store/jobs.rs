//! Ingestion job rows and lifecycle transitions
//!
//! The job state machine is pending -> processing -> completed | failed.
//! Completed and failed are terminal. `processed_records` only ever grows;
//! it reflects the sum of chunk sizes across successful submissions.

use super::{now_rfc3339, Store};
use crate::error::{CoreError, CoreResult};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> CoreResult<JobStatus> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(CoreError::Validation(format!("unknown job status: {other}"))),
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One ingestion job, created per uploaded file
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub filename: String,
    pub status: JobStatus,
    pub total_records: i64,
    pub processed_records: i64,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let status_text: String = row.get(2)?;
    Ok(Job {
        id: row.get(0)?,
        filename: row.get(1)?,
        // Status text is only ever written from JobStatus::as_str
        status: JobStatus::parse(&status_text).unwrap_or(JobStatus::Failed),
        total_records: row.get(3)?,
        processed_records: row.get(4)?,
        error_message: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const JOB_COLUMNS: &str =
    "id, filename, status, total_records, processed_records, error_message, created_at, updated_at";

impl Store {
    /// Insert a new job in `processing` state. `total_records` is the
    /// caller's estimate and is stored untouched.
    pub fn insert_job(&self, filename: &str, total_records: i64) -> CoreResult<Job> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_rfc3339();

        conn.execute(
            "INSERT INTO ingestion_jobs (id, filename, status, total_records, processed_records, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
            params![id, filename, JobStatus::Processing.as_str(), total_records, now],
        )?;

        self.get_job(&id)
    }

    pub fn get_job(&self, id: &str) -> CoreResult<Job> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM ingestion_jobs WHERE id = ?1"),
            params![id],
            job_from_row,
        )
        .optional()?
        .ok_or_else(|| CoreError::NotFound(format!("job {id}")))
    }

    /// Most recent jobs first
    pub fn list_jobs(&self, limit: usize) -> CoreResult<Vec<Job>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM ingestion_jobs ORDER BY created_at DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], job_from_row)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    /// Advance progress after a successful chunk. Monotonic by construction:
    /// the delta is the size of the chunk that just succeeded.
    pub fn advance_job_progress(&self, id: &str, delta: i64) -> CoreResult<Job> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE ingestion_jobs
             SET processed_records = processed_records + ?2, updated_at = ?3
             WHERE id = ?1",
            params![id, delta, now_rfc3339()],
        )?;

        if updated == 0 {
            return Err(CoreError::NotFound(format!("job {id}")));
        }
        self.get_job(id)
    }

    /// Caller-driven status transition.
    ///
    /// Terminal states reject further transitions. An absolute
    /// `processed_records` is clamped to max(current, given) so recovery
    /// reporting can never move progress backwards.
    pub fn set_job_status(
        &self,
        id: &str,
        status: JobStatus,
        processed_records: Option<i64>,
        error_message: Option<&str>,
    ) -> CoreResult<Job> {
        let current = self.get_job(id)?;
        if current.status.is_terminal() {
            return Err(CoreError::Validation(format!(
                "job {id} is already {}",
                current.status.as_str()
            )));
        }

        let processed = processed_records
            .map(|p| p.max(current.processed_records))
            .unwrap_or(current.processed_records);

        let conn = self.conn()?;
        conn.execute(
            "UPDATE ingestion_jobs
             SET status = ?2, processed_records = ?3, error_message = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                status.as_str(),
                processed,
                error_message,
                now_rfc3339()
            ],
        )?;

        self.get_job(id)
    }

    /// Mark `processing` jobs with no activity inside the window as failed.
    ///
    /// A crashed client leaves its job in `processing` forever; an external
    /// reconciler calls this to close those out. Returns the number reaped.
    pub fn reap_stale_jobs(&self, older_than: Duration) -> CoreResult<u64> {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| CoreError::Validation(format!("staleness window: {e}")))?;
        let cutoff_str = cutoff.to_rfc3339();

        let conn = self.conn()?;
        let reaped = conn.execute(
            "UPDATE ingestion_jobs
             SET status = 'failed',
                 error_message = 'reaped: no activity inside staleness window',
                 updated_at = ?2
             WHERE status = 'processing' AND updated_at < ?1",
            params![cutoff_str, now_rfc3339()],
        )?;

        if reaped > 0 {
            tracing::info!("Reaped {} stale ingestion job(s)", reaped);
        }
        Ok(reaped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;

    #[test]
    fn insert_and_get_job() {
        let (store, _dir) = temp_store();
        let job = store.insert_job("conversations.jsonl", 1500).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.total_records, 1500);
        assert_eq!(job.processed_records, 0);

        let fetched = store.get_job(&job.id).unwrap();
        assert_eq!(fetched.filename, "conversations.jsonl");
    }

    #[test]
    fn get_missing_job_is_not_found() {
        let (store, _dir) = temp_store();
        let err = store.get_job("nope").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn progress_accumulates_across_chunks() {
        let (store, _dir) = temp_store();
        let job = store.insert_job("data.jsonl", 1200).unwrap();

        store.advance_job_progress(&job.id, 500).unwrap();
        let job = store.advance_job_progress(&job.id, 500).unwrap();
        assert_eq!(job.processed_records, 1000);
    }

    #[test]
    fn terminal_jobs_reject_transitions() {
        let (store, _dir) = temp_store();
        let job = store.insert_job("data.jsonl", 10).unwrap();

        store
            .set_job_status(&job.id, JobStatus::Completed, Some(10), None)
            .unwrap();
        let err = store
            .set_job_status(&job.id, JobStatus::Failed, None, Some("late"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn processed_records_never_decreases() {
        let (store, _dir) = temp_store();
        let job = store.insert_job("data.jsonl", 100).unwrap();
        store.advance_job_progress(&job.id, 60).unwrap();

        // Recovery report with a stale lower count keeps the higher value
        let job = store
            .set_job_status(&job.id, JobStatus::Failed, Some(20), Some("chunk 2 failed"))
            .unwrap();
        assert_eq!(job.processed_records, 60);
        assert_eq!(job.error_message.as_deref(), Some("chunk 2 failed"));
    }

    #[test]
    fn reap_only_touches_stale_processing_jobs() {
        let (store, _dir) = temp_store();
        let stale = store.insert_job("old.jsonl", 10).unwrap();
        let fresh = store.insert_job("new.jsonl", 10).unwrap();

        // Backdate the stale job's activity timestamp
        let conn = store.conn().unwrap();
        conn.execute(
            "UPDATE ingestion_jobs SET updated_at = '2000-01-01T00:00:00+00:00' WHERE id = ?1",
            rusqlite::params![stale.id],
        )
        .unwrap();
        drop(conn);

        let reaped = store
            .reap_stale_jobs(Duration::from_secs(3600))
            .unwrap();
        assert_eq!(reaped, 1);
        assert_eq!(store.get_job(&stale.id).unwrap().status, JobStatus::Failed);
        assert_eq!(
            store.get_job(&fresh.id).unwrap().status,
            JobStatus::Processing
        );
    }
}
