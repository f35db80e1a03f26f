//! In-process fakes for unit tests: a fixed cluster view and a paged
//! remote-backend listing.

use async_trait::async_trait;
use std::sync::Arc;

use crate::bucket::Bucket;
use crate::cluster::{Backend, Cluster, LsoEntry, LsoMsg, LsoResult, Smap};

/// Cluster view with a fixed map and at most one backend.
pub(crate) struct StaticCluster {
    sid: String,
    smap: Arc<Smap>,
    backend: Option<Arc<dyn Backend>>,
}

impl StaticCluster {
    pub(crate) fn new(sid: &str, smap: Smap) -> Self {
        Self {
            sid: sid.to_string(),
            smap: Arc::new(smap),
            backend: None,
        }
    }

    pub(crate) fn with_backend(mut self, backend: impl Backend + 'static) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }
}

impl Cluster for StaticCluster {
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

/// Serves a fixed sequence of listing pages; the continuation token is the
/// next page index, empty after the last page.
pub(crate) struct PagedBackend {
    pages: Vec<Vec<String>>,
    max_page_size: usize,
}

impl PagedBackend {
    pub(crate) fn new(pages: Vec<Vec<String>>, max_page_size: usize) -> Self {
        Self {
            pages,
            max_page_size,
        }
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
        self.max_page_size
    }
}
