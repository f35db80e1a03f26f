//! Job write operations: upsert, flush, terminal transitions, errors, purge.

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::record::{unix_timestamp, DlJobRecord, JobInfo};

use super::super::db::JobStore;

impl JobStore {
    /// Register a freshly created job: the live record backs later flushes,
    /// and its first snapshot is written out immediately.
    pub async fn upsert_job(&self, record: &Arc<DlJobRecord>) -> Result<()> {
        self.live
            .lock()
            .unwrap()
            .insert(record.id.clone(), Arc::clone(record));
        self.write_snapshot(&record.snapshot()).await
    }

    /// Persist the live record's current counters and flags.
    pub async fn flush(&self, id: &str) -> Result<()> {
        let record = self
            .live_record(id)
            .ok_or_else(|| anyhow!("job {} not registered", id))?;
        self.write_snapshot(&record.snapshot()).await
    }

    /// Stamp the terminal time on the live record. Call `flush` afterwards
    /// to make the terminal state durable.
    pub async fn mark_finished(&self, id: &str) -> Result<()> {
        let record = self
            .live_record(id)
            .ok_or_else(|| anyhow!("job {} not registered", id))?;
        record.mark_finished_now();
        Ok(())
    }

    /// Set the one-shot aborted flag and persist it.
    pub async fn abort(&self, id: &str) -> Result<()> {
        let record = self
            .live_record(id)
            .ok_or_else(|| anyhow!("job {} not registered", id))?;
        record.set_aborted();
        self.write_snapshot(&record.snapshot()).await
    }

    /// Record one failed object for the job.
    pub async fn record_error(&self, id: &str, obj_name: &str, message: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dl_errors (job_id, obj_name, message, recorded_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(id)
        .bind(obj_name)
        .bind(message)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop the job and its error rows, and forget the live record.
    pub async fn purge(&self, id: &str) -> Result<()> {
        self.live.lock().unwrap().remove(id);
        sqlx::query(r#"DELETE FROM dl_errors WHERE job_id = ?1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query(r#"DELETE FROM dl_jobs WHERE id = ?1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub(crate) async fn write_snapshot(&self, info: &JobInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dl_jobs (
                id, xaction_id, description, started_time, finished_time,
                scheduled, finished, skipped, errors, total,
                aborted, all_dispatched
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                finished_time = excluded.finished_time,
                scheduled = excluded.scheduled,
                finished = excluded.finished,
                skipped = excluded.skipped,
                errors = excluded.errors,
                aborted = excluded.aborted,
                all_dispatched = excluded.all_dispatched
            "#,
        )
        .bind(&info.id)
        .bind(&info.xact_id)
        .bind(&info.description)
        .bind(info.started_time)
        .bind(info.finished_time)
        .bind(info.scheduled)
        .bind(info.finished)
        .bind(info.skipped)
        .bind(info.errors)
        .bind(info.total)
        .bind(info.aborted)
        .bind(info.all_dispatched)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
