//! Shared state and behavior of every job variant.

use std::sync::Arc;
use std::time::Duration;

use crate::bucket::Bucket;
use crate::cluster::Cluster;
use crate::config::DlConfig;
use crate::error::DlError;
use crate::notif::NotifDownload;
use crate::payload::{parse_duration, DlBase};
use crate::record::{DlJobRecord, StatusResp};
use crate::store::JobStore;
use crate::throttler::Throttler;
use crate::xact::Xact;

/// Common head of all job variants: identity, bucket, timeout, throttler,
/// live record, transaction handle, and the optional notifier.
pub struct BaseDlJob {
    pub(crate) id: String,
    pub(crate) bck: Bucket,
    pub(crate) timeout: Duration,
    pub(crate) description: String,
    pub(crate) throttler: Arc<Throttler>,
    pub(crate) record: Arc<DlJobRecord>,
    pub(crate) xact: Arc<Xact>,
    pub(crate) notif: Option<NotifDownload>,
}

impl BaseDlJob {
    /// `total` is the variant's item count for this target (-1 unknown).
    /// The cluster-wide bytes/hour bound is split evenly across active
    /// targets here so it holds without coordination; an unbounded
    /// connection limit falls back to the configured worker-pool size.
    pub fn new(
        cluster: &dyn Cluster,
        id: &str,
        bck: Bucket,
        payload: &DlBase,
        description: String,
        total: i64,
        cfg: &DlConfig,
    ) -> Result<Self, DlError> {
        let timeout = match &payload.timeout {
            Some(s) => parse_duration(s)?,
            None => Duration::from_secs(cfg.job_timeout_secs),
        };
        let mut limits = payload.limits;
        if limits.bytes_per_hour > 0 {
            let n = cluster.smap().count_active_targets().max(1);
            limits.bytes_per_hour /= n as i64;
        }
        if limits.connections == 0 {
            limits.connections = cfg.default_connections;
        }

        let xact = Arc::new(Xact::new(format!("dl-{}", id)));
        let record = Arc::new(DlJobRecord::new(id, xact.id(), &description, total));
        Ok(Self {
            id: id.to_string(),
            bck,
            timeout,
            description,
            throttler: Arc::new(Throttler::new(limits)),
            record,
            xact,
            notif: None,
        })
    }

    pub(crate) fn label(&self) -> String {
        let s = format!("dl-job[{}]-{}", self.id, self.bck);
        if self.description.is_empty() {
            s
        } else {
            format!("{}-{}", s, self.description)
        }
    }

    pub(crate) fn active_stats(&self) -> StatusResp {
        StatusResp {
            job: self.record.snapshot(),
            currently_downloading: self.xact.currently_downloading(),
        }
    }

    /// Currently, "add" means "set": a job carries at most one notifier.
    pub(crate) fn add_notif(&mut self, n: NotifDownload) {
        debug_assert!(self.notif.is_none(), "notifier already installed");
        self.notif = Some(n);
    }

    /// Terminal teardown: stop the throttler, persist the finished state,
    /// then deliver the terminal notification. Store failures are logged;
    /// the notification carries the first fatal error, if any.
    pub(crate) async fn cleanup(&mut self, label: &str, store: &JobStore, err: Option<&DlError>) {
        self.throttler.stop();
        self.record.mark_finished_now();
        if let Err(e) = self.record.valid() {
            tracing::warn!("{}: {}", label, e);
        }
        if let Err(e) = store.mark_finished(&self.id).await {
            tracing::error!("{}: mark finished: {:#}", label, e);
        }
        if let Err(e) = store.flush(&self.id).await {
            tracing::error!("{}: flush: {:#}", label, e);
        }
        let status = self.active_stats();
        if let Some(n) = &self.notif {
            n.on_finished(&status, err);
        }
    }
}
