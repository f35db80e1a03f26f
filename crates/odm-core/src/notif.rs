//! Job notifications: periodic progress and a terminal completion callback.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::DlError;
use crate::record::StatusResp;

/// Terminal callback, invoked exactly once per job with the final status and
/// the first fatal error, if any.
pub type FinishedCb = Arc<dyn Fn(&StatusResp, Option<&DlError>) + Send + Sync>;

/// Periodic progress callback.
pub type ProgressCb = Arc<dyn Fn(&StatusResp) + Send + Sync>;

/// Notifier installed on a job. Built via [`NotifDownload::finished`] or
/// [`NotifDownload::with_progress`] so the required callbacks always exist.
pub struct NotifDownload {
    f: FinishedCb,
    p: Option<ProgressCb>,
    interval: Duration,
    fired: AtomicBool,
}

impl NotifDownload {
    /// Terminal-only notifier.
    pub fn finished(f: FinishedCb) -> Self {
        Self {
            f,
            p: None,
            interval: Duration::ZERO,
            fired: AtomicBool::new(false),
        }
    }

    /// Terminal plus periodic progress at `interval`.
    pub fn with_progress(f: FinishedCb, p: ProgressCb, interval: Duration) -> Self {
        Self {
            f,
            p: Some(p),
            interval,
            fired: AtomicBool::new(false),
        }
    }

    pub fn upon_progress(&self) -> bool {
        self.p.is_some()
    }

    pub fn progress_interval(&self) -> Duration {
        self.interval
    }

    /// Clone of the progress callback, for the dispatcher's ticker task.
    pub fn progress_cb(&self) -> Option<ProgressCb> {
        self.p.clone()
    }

    pub fn on_progress(&self, status: &StatusResp) {
        if let Some(p) = &self.p {
            p(status);
        }
    }

    /// Deliver the terminal notification. Idempotent: only the first call
    /// fires the callback.
    pub fn on_finished(&self, status: &StatusResp, err: Option<&DlError>) {
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        (self.f)(status, err);
    }
}

impl fmt::Debug for NotifDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifDownload")
            .field("upon_progress", &self.upon_progress())
            .field("interval", &self.interval)
            .field("fired", &self.fired.load(Ordering::Relaxed))
            .finish()
    }
}
