//! Backend jobs: enumerate a remote bucket's listing page by page.
//!
//! The item universe is unknown up front (`len() == -1`); each `gen_next`
//! keeps paging until a batch fills or the listing's continuation token
//! runs out.

use async_trait::async_trait;
use std::sync::Arc;

use crate::bucket::Bucket;
use crate::cluster::{make_dl_obj, Cluster, LsoMsg};
use crate::config::DlConfig;
use crate::error::DlError;
use crate::payload::BackendBody;

use super::{BaseDlJob, DlJob, DlObj, BATCH_SIZE};

pub struct BackendDlJob {
    base: BaseDlJob,
    cluster: Arc<dyn Cluster>,
    prefix: String,
    suffix: String,
    continuation_token: String,
    sync: bool,
    done: bool,
}

impl BackendDlJob {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        id: &str,
        bck: Bucket,
        body: &BackendBody,
        cfg: &DlConfig,
    ) -> Result<Self, DlError> {
        if !bck.is_remote() {
            return Err(DlError::Validation(
                "bucket download requires a remote bucket".into(),
            ));
        }
        if bck.is_http() {
            return Err(DlError::Validation(
                "bucket download does not support HTTP buckets".into(),
            ));
        }
        let description = body.describe(&bck);
        let base = BaseDlJob::new(cluster.as_ref(), id, bck, &body.base, description, -1, cfg)?;
        Ok(Self {
            base,
            cluster,
            prefix: body.prefix.clone(),
            suffix: body.suffix.clone(),
            continuation_token: String::new(),
            sync: body.sync,
            done: false,
        })
    }

    /// Pages through the remote listing until a batch fills or the listing
    /// is over; entries failing the prefix/suffix filter or hashing to
    /// another target are dropped on the floor.
    async fn next_objs(&mut self) -> Result<Vec<DlObj>, DlError> {
        let backend = self
            .cluster
            .backend(&self.base.bck)
            .map_err(DlError::enumeration)?;
        let smap = self.cluster.smap();
        let sid = self.cluster.sid();

        let mut objs = Vec::new();
        while objs.len() < BATCH_SIZE {
            let msg = LsoMsg {
                prefix: self.prefix.clone(),
                continuation_token: std::mem::take(&mut self.continuation_token),
                page_size: backend.max_page_size(),
            };
            let lst = backend
                .list_objects(&self.base.bck, &msg)
                .await
                .map_err(DlError::enumeration)?;
            self.continuation_token = lst.continuation_token;

            for entry in lst.entries {
                if !self.check_obj(&entry.name) {
                    continue;
                }
                if let Ok(obj) = make_dl_obj(&smap, sid, &self.base.bck, &entry.name, "") {
                    objs.push(obj);
                }
            }
            if self.continuation_token.is_empty() {
                self.done = true;
                break;
            }
        }
        Ok(objs)
    }
}

#[async_trait]
impl DlJob for BackendDlJob {
    fn base(&self) -> &BaseDlJob {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDlJob {
        &mut self.base
    }

    fn label(&self) -> String {
        format!("backend-{}-{}-{}", self.base.label(), self.prefix, self.suffix)
    }

    fn len(&self) -> i64 {
        -1
    }

    fn sync(&self) -> bool {
        self.sync
    }

    fn check_obj(&self, obj_name: &str) -> bool {
        obj_name.starts_with(&self.prefix) && obj_name.ends_with(&self.suffix)
    }

    async fn gen_next(&mut self) -> Result<Option<Vec<DlObj>>, DlError> {
        if self.done {
            return Ok(None);
        }
        Ok(Some(self.next_objs().await?))
    }
}
