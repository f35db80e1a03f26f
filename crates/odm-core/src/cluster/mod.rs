//! Cluster collaborator seam: the map of active targets, the owning-target
//! view of this process, and the remote-backend listing interface.
//!
//! The engine never mutates the cluster map; it reads a shared snapshot and
//! asks the backend for paged listings.

pub mod hrw;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::bucket::Bucket;

pub use hrw::{hrw_target, make_dl_obj};

/// Immutable snapshot of the active targets in the cluster.
#[derive(Debug, Clone, Default)]
pub struct Smap {
    pub version: u64,
    /// Target id -> opaque (the engine only needs the ids).
    pub targets: BTreeMap<String, ()>,
}

impl Smap {
    pub fn new(version: u64, target_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            version,
            targets: target_ids.into_iter().map(|id| (id, ())).collect(),
        }
    }

    pub fn count_active_targets(&self) -> usize {
        self.targets.len()
    }
}

/// One entry of a remote-bucket listing page.
#[derive(Debug, Clone)]
pub struct LsoEntry {
    pub name: String,
    pub size: i64,
}

/// Paged listing request carried across `list_objects` calls.
#[derive(Debug, Clone, Default)]
pub struct LsoMsg {
    pub prefix: String,
    pub continuation_token: String,
    pub page_size: usize,
}

/// One page of a remote-bucket listing. An empty continuation token means
/// the listing is exhausted.
#[derive(Debug, Clone, Default)]
pub struct LsoResult {
    pub entries: Vec<LsoEntry>,
    pub continuation_token: String,
}

/// Remote backend bound to a bucket.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch one listing page; the token in `msg` resumes a prior call.
    async fn list_objects(&self, bck: &Bucket, msg: &LsoMsg) -> anyhow::Result<LsoResult>;

    /// Direct source URL for a named object, used by workers to fetch
    /// remote-backend objects through the plain transport.
    fn object_url(&self, bck: &Bucket, obj_name: &str) -> String;

    /// Largest page the backend will serve.
    fn max_page_size(&self) -> usize;
}

/// The storage-target collaborator: this process's identity in the cluster
/// map plus backend resolution for remote buckets.
pub trait Cluster: Send + Sync {
    /// This target's id.
    fn sid(&self) -> &str;

    /// Current cluster map snapshot.
    fn smap(&self) -> Arc<Smap>;

    /// Backend bound to the given remote bucket.
    fn backend(&self, bck: &Bucket) -> anyhow::Result<Arc<dyn Backend>>;
}
