//! Job read operations: get, list, per-object errors.

use anyhow::Result;
use sqlx::Row;

use crate::record::JobInfo;

use super::super::db::JobStore;
use super::super::types::{JobFilter, ObjErr};

fn info_from_row(row: &sqlx::sqlite::SqliteRow) -> JobInfo {
    JobInfo {
        id: row.get("id"),
        xact_id: row.get("xaction_id"),
        description: row.get("description"),
        started_time: row.get("started_time"),
        finished_time: row.get("finished_time"),
        scheduled: row.get("scheduled"),
        finished: row.get("finished"),
        skipped: row.get("skipped"),
        errors: row.get("errors"),
        total: row.get("total"),
        aborted: row.get("aborted"),
        all_dispatched: row.get("all_dispatched"),
    }
}

impl JobStore {
    /// Fetch one job. A live record wins over the persisted row so status
    /// readers see the freshest counters.
    pub async fn get(&self, id: &str) -> Result<Option<JobInfo>> {
        if let Some(record) = self.live_record(id) {
            return Ok(Some(record.snapshot()));
        }
        let row = sqlx::query(
            r#"
            SELECT id, xaction_id, description, started_time, finished_time,
                   scheduled, finished, skipped, errors, total,
                   aborted, all_dispatched
            FROM dl_jobs
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(info_from_row))
    }

    /// List jobs matching `filter`, newest first, with live counters
    /// overlaid where available.
    pub async fn list(&self, filter: JobFilter) -> Result<Vec<JobInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT id, xaction_id, description, started_time, finished_time,
                   scheduled, finished, skipped, errors, total,
                   aborted, all_dispatched
            FROM dl_jobs
            ORDER BY started_time DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut info = info_from_row(row);
            if let Some(record) = self.live_record(&info.id) {
                info = record.snapshot();
            }
            if filter.matches(&info) {
                out.push(info);
            }
        }
        Ok(out)
    }

    /// Per-object failures recorded for the job, in insertion order.
    pub async fn list_errors(&self, id: &str) -> Result<Vec<ObjErr>> {
        let rows = sqlx::query(
            r#"
            SELECT obj_name, message, recorded_at
            FROM dl_errors
            WHERE job_id = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ObjErr {
                obj_name: row.get("obj_name"),
                message: row.get("message"),
                recorded_at: row.get("recorded_at"),
            })
            .collect())
    }
}
