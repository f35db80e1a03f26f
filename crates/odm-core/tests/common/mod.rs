//! Shared fakes for engine integration tests: a fixed cluster view, a paged
//! remote listing, and an in-memory object fetcher.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use odm_core::bucket::Bucket;
use odm_core::cluster::{Backend, Cluster, LsoEntry, LsoMsg, LsoResult, Smap};
use odm_core::fetcher::{FetchOutcome, ObjectFetcher};

pub struct MockCluster {
    sid: String,
    smap: Arc<Smap>,
    backend: Option<Arc<dyn Backend>>,
}

impl MockCluster {
    pub fn new(sid: &str, smap: Smap) -> Self {
        Self {
            sid: sid.to_string(),
            smap: Arc::new(smap),
            backend: None,
        }
    }

    pub fn with_backend(mut self, backend: impl Backend + 'static) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }
}

impl Cluster for MockCluster {
    fn sid(&self) -> &str {
        &self.sid
    }

    fn smap(&self) -> Arc<Smap> {
        Arc::clone(&self.smap)
    }

    fn backend(&self, bck: &Bucket) -> anyhow::Result<Arc<dyn Backend>> {
        self.backend
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no backend attached for bucket {}", bck))
    }
}

/// Serves fixed listing pages; the continuation token is the next page
/// index, empty after the last page.
pub struct PagedBackend {
    pages: Vec<Vec<String>>,
}

impl PagedBackend {
    pub fn new(pages: Vec<Vec<String>>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl Backend for PagedBackend {
    async fn list_objects(&self, _bck: &Bucket, msg: &LsoMsg) -> anyhow::Result<LsoResult> {
        let idx: usize = if msg.continuation_token.is_empty() {
            0
        } else {
            msg.continuation_token.parse()?
        };
        let Some(page) = self.pages.get(idx) else {
            return Ok(LsoResult::default());
        };
        let continuation_token = if idx + 1 < self.pages.len() {
            (idx + 1).to_string()
        } else {
            String::new()
        };
        Ok(LsoResult {
            entries: page
                .iter()
                .map(|name| LsoEntry {
                    name: name.clone(),
                    size: 1,
                })
                .collect(),
            continuation_token,
        })
    }

    fn object_url(&self, bck: &Bucket, obj_name: &str) -> String {
        format!("http://remote/{}/{}", bck.name, obj_name)
    }

    fn max_page_size(&self) -> usize {
        1_000
    }
}

/// Fetcher that never touches the network: records every `(name, link)` it
/// sees, optionally sleeping, failing, or reporting skips per object name.
#[derive(Default)]
pub struct MockFetcher {
    pub fetched: Mutex<Vec<(String, String)>>,
    pub fail: HashSet<String>,
    pub skip: HashSet<String>,
    pub delay: Duration,
    pub reconciled_with: Mutex<Option<usize>>,
}

impl MockFetcher {
    pub fn fetched_names(&self) -> Vec<String> {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectFetcher for MockFetcher {
    async fn fetch(&self, _bck: &Bucket, obj_name: &str, link: &str) -> anyhow::Result<FetchOutcome> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.contains(obj_name) {
            anyhow::bail!("HTTP 404");
        }
        self.fetched
            .lock()
            .unwrap()
            .push((obj_name.to_string(), link.to_string()));
        if self.skip.contains(obj_name) {
            Ok(FetchOutcome::Skipped { bytes: 1 })
        } else {
            Ok(FetchOutcome::Finished { bytes: 1 })
        }
    }

    async fn reconcile(
        &self,
        _bck: &Bucket,
        _in_scope: &(dyn for<'a> Fn(&'a str) -> bool + Sync),
        source_names: &HashSet<String>,
    ) -> anyhow::Result<u64> {
        *self.reconciled_with.lock().unwrap() = Some(source_names.len());
        Ok(0)
    }
}
