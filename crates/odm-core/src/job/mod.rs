//! Download jobs: four enumeration strategies behind one batch-producing
//! contract.
//!
//! A job yields successive batches of work items via `gen_next`; items are
//! pre-filtered by cluster ownership, so everything a job hands out belongs
//! to this target. The dispatcher drives the job to completion.

mod backend;
mod base;
mod range;
mod slice;

pub use backend::BackendDlJob;
pub use base::BaseDlJob;
pub use range::RangeDlJob;
pub use slice::{SliceDlJob, SliceKind};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::bucket::Bucket;
use crate::cluster::{make_dl_obj, Smap};
use crate::error::DlError;
use crate::notif::NotifDownload;
use crate::record::{DlJobRecord, StatusResp};
use crate::store::JobStore;
use crate::throttler::Throttler;
use crate::xact::Xact;

/// Upper bound on the number of items per `gen_next` batch.
pub const BATCH_SIZE: usize = 10_000;

/// One unit of work: fetch `link` and store it as `obj_name` in the job's
/// bucket. An empty link means the bucket's remote backend serves the
/// object by name (`from_remote` is then always true).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlObj {
    pub obj_name: String,
    pub link: String,
    pub from_remote: bool,
}

/// The polymorphic job contract shared by all four variants.
///
/// `gen_next` is monotone: once it returns `None`, every further call
/// returns `None`. Batches never exceed [`BATCH_SIZE`]; a range or backend
/// job may return one (possibly empty) partial batch right before
/// exhausting.
#[async_trait]
pub trait DlJob: Send + Sync {
    fn base(&self) -> &BaseDlJob;
    fn base_mut(&mut self) -> &mut BaseDlJob;

    /// Log-friendly name, e.g. `range-dl-job[j1]-ais/b-25000-imgs`.
    fn label(&self) -> String;

    /// Total items this target will download, or -1 when unknown.
    fn len(&self) -> i64;

    /// Whether post-download reconciliation with the source listing is
    /// required. Only backend jobs ever say yes.
    fn sync(&self) -> bool {
        false
    }

    /// Source-listing membership predicate. Meaningful only for backend
    /// jobs; the dispatcher must not call it on other variants.
    fn check_obj(&self, _obj_name: &str) -> bool {
        debug_assert!(false, "check_obj called on a non-backend job");
        false
    }

    /// Produce the next batch, or `None` when enumeration is complete.
    async fn gen_next(&mut self) -> Result<Option<Vec<DlObj>>, DlError>;

    fn id(&self) -> &str {
        &self.base().id
    }

    fn bucket(&self) -> &Bucket {
        &self.base().bck
    }

    fn timeout(&self) -> Duration {
        self.base().timeout
    }

    fn description(&self) -> &str {
        &self.base().description
    }

    fn throttler(&self) -> &Arc<Throttler> {
        &self.base().throttler
    }

    fn record(&self) -> &Arc<DlJobRecord> {
        &self.base().record
    }

    fn xact(&self) -> &Arc<Xact> {
        &self.base().xact
    }

    fn notif(&self) -> Option<&NotifDownload> {
        self.base().notif.as_ref()
    }

    fn add_notif(&mut self, n: NotifDownload) {
        self.base_mut().add_notif(n);
    }

    /// Counter snapshot plus the names currently in flight.
    fn active_stats(&self) -> StatusResp {
        self.base().active_stats()
    }

    /// Stop the throttler, persist the terminal state, and deliver the
    /// terminal notification. Called exactly once by the dispatcher.
    async fn cleanup(&mut self, store: &JobStore, err: Option<&DlError>) {
        let label = self.label();
        self.base_mut().cleanup(&label, store, err).await;
    }
}

/// Derives the stored object name for a generated link: everything after
/// the last `/` (a literal split, so query strings stay part of the name),
/// placed under `dir` when one was requested.
pub(crate) fn object_name(dir: &str, link: &str) -> String {
    let trimmed = link.trim_end_matches('/');
    let base = trimmed
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed);
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", dir, base)
    }
}

/// Builds the ownership-filtered work list for list jobs from the caller's
/// `name -> url` map. Names and links must be non-empty; objects owned by
/// other targets simply do not appear.
pub(crate) fn build_dl_objs(
    smap: &Smap,
    sid: &str,
    bck: &Bucket,
    objects: &BTreeMap<String, String>,
) -> Result<Vec<DlObj>, DlError> {
    let mut objs = Vec::with_capacity(objects.len());
    for (name, link) in objects {
        let name = name.trim_start_matches('/');
        if name.is_empty() {
            return Err(DlError::Validation("empty object name".into()));
        }
        if link.is_empty() {
            return Err(DlError::Validation(format!("object {}: empty link", name)));
        }
        if let Ok(obj) = make_dl_obj(smap, sid, bck, name, link) {
            objs.push(obj);
        }
    }
    Ok(objs)
}
