//! Live per-job progress record: atomic counters, one-shot lifecycle flags,
//! and plain snapshots for the store and for status readers.
//!
//! One dispatcher task and any number of workers mutate the record
//! concurrently; readers may observe any consistent prefix of updates.
//! There is deliberately no job-level lock.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::DlError;

/// Current time as Unix seconds.
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Mutable in place; everything else on the record is fixed at creation.
/// `finished` also includes skipped objects.
#[derive(Debug)]
pub struct DlJobRecord {
    pub id: String,
    pub xact_id: String,
    pub description: String,
    pub started_time: i64,
    /// Total items this target will download, -1 when unknown (backend jobs).
    pub total: i64,

    finished_time: AtomicI64,
    scheduled: AtomicI64,
    finished: AtomicI64,
    skipped: AtomicI64,
    errors: AtomicI64,
    aborted: AtomicBool,
    all_dispatched: AtomicBool,
}

impl DlJobRecord {
    pub fn new(id: &str, xact_id: &str, description: &str, total: i64) -> Self {
        Self {
            id: id.to_string(),
            xact_id: xact_id.to_string(),
            description: description.to_string(),
            started_time: unix_timestamp(),
            total,
            finished_time: AtomicI64::new(0),
            scheduled: AtomicI64::new(0),
            finished: AtomicI64::new(0),
            skipped: AtomicI64::new(0),
            errors: AtomicI64::new(0),
            aborted: AtomicBool::new(false),
            all_dispatched: AtomicBool::new(false),
        }
    }

    pub fn inc_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_finished(&self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scheduled(&self) -> i64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    pub fn aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// One-shot; returns true on the transition.
    pub fn set_aborted(&self) -> bool {
        !self.aborted.swap(true, Ordering::Relaxed)
    }

    pub fn all_dispatched(&self) -> bool {
        self.all_dispatched.load(Ordering::Acquire)
    }

    /// Release ordering so the flag is observable only after the last
    /// `inc_scheduled` for the job.
    pub fn set_all_dispatched(&self) {
        self.all_dispatched.store(true, Ordering::Release);
    }

    pub fn mark_finished_now(&self) {
        let _ = self.finished_time.compare_exchange(
            0,
            unix_timestamp(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    /// Plain copy of the record for persistence and status responses.
    pub fn snapshot(&self) -> JobInfo {
        JobInfo {
            id: self.id.clone(),
            xact_id: self.xact_id.clone(),
            description: self.description.clone(),
            started_time: self.started_time,
            finished_time: self.finished_time.load(Ordering::Relaxed),
            scheduled: self.scheduled.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            total: self.total,
            aborted: self.aborted.load(Ordering::Relaxed),
            all_dispatched: self.all_dispatched.load(Ordering::Acquire),
        }
    }

    /// Integrity check, evaluated once the job is finalized. Mismatches are
    /// logged by the caller and never change the job outcome.
    pub fn valid(&self) -> Result<(), DlError> {
        if self.aborted.load(Ordering::Relaxed) || !self.all_dispatched() {
            return Ok(());
        }
        let (a, b, c) = (
            self.scheduled.load(Ordering::Relaxed),
            self.finished.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        );
        if a != b + c {
            return Err(DlError::Integrity(format!("{} != {} + {}", a, b, c)));
        }
        Ok(())
    }
}

/// Immutable snapshot of a job record, as persisted and as returned to
/// status readers. `total == -1` means unknown and must not be coerced to 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    #[serde(rename = "xaction_id")]
    pub xact_id: String,
    pub description: String,
    pub started_time: i64,
    pub finished_time: i64,
    pub scheduled: i64,
    pub finished: i64,
    pub skipped: i64,
    pub errors: i64,
    pub total: i64,
    pub aborted: bool,
    pub all_dispatched: bool,
}

impl JobInfo {
    pub fn is_running(&self) -> bool {
        self.finished_time == 0
    }
}

/// Status response for one job: the record snapshot plus the names currently
/// being fetched on this target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResp {
    #[serde(flatten)]
    pub job: JobInfo,
    #[serde(rename = "current_tasks")]
    pub currently_downloading: Vec<String>,
}
