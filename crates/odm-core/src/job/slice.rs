//! List jobs: a prebuilt, ownership-filtered array of work items.
//! Single-object jobs are the degenerate one-entry case.

use async_trait::async_trait;

use crate::bucket::Bucket;
use crate::cluster::Cluster;
use crate::config::DlConfig;
use crate::error::DlError;
use crate::payload::{MultiBody, SingleBody};

use super::{build_dl_objs, BaseDlJob, DlJob, DlObj, BATCH_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceKind {
    Single,
    Multi,
}

impl SliceKind {
    fn prefix(self) -> &'static str {
        match self {
            SliceKind::Single => "single",
            SliceKind::Multi => "multi",
        }
    }
}

/// Finite job over a materialized item array; `gen_next` hands out
/// contiguous chunks until the array is drained.
pub struct SliceDlJob {
    base: BaseDlJob,
    kind: SliceKind,
    objs: Vec<DlObj>,
    current: usize,
}

impl SliceDlJob {
    pub fn new_single(
        cluster: &dyn Cluster,
        id: &str,
        bck: Bucket,
        body: &SingleBody,
        cfg: &DlConfig,
    ) -> Result<Self, DlError> {
        let mut objects = std::collections::BTreeMap::new();
        objects.insert(body.object_name.clone(), body.link.clone());
        let objs = build_dl_objs(&cluster.smap(), cluster.sid(), &bck, &objects)?;
        let description = body.describe(&bck);
        Self::with_objs(cluster, id, bck, &body.base, description, SliceKind::Single, objs, cfg)
    }

    pub fn new_multi(
        cluster: &dyn Cluster,
        id: &str,
        bck: Bucket,
        body: &MultiBody,
        cfg: &DlConfig,
    ) -> Result<Self, DlError> {
        if body.objects.is_empty() {
            return Err(DlError::Validation("no objects to download".into()));
        }
        let objs = build_dl_objs(&cluster.smap(), cluster.sid(), &bck, &body.objects)?;
        let description = body.describe(&bck);
        Self::with_objs(cluster, id, bck, &body.base, description, SliceKind::Multi, objs, cfg)
    }

    #[allow(clippy::too_many_arguments)]
    fn with_objs(
        cluster: &dyn Cluster,
        id: &str,
        bck: Bucket,
        payload: &crate::payload::DlBase,
        description: String,
        kind: SliceKind,
        objs: Vec<DlObj>,
        cfg: &DlConfig,
    ) -> Result<Self, DlError> {
        let base = BaseDlJob::new(cluster, id, bck, payload, description, objs.len() as i64, cfg)?;
        Ok(Self {
            base,
            kind,
            objs,
            current: 0,
        })
    }
}

#[async_trait]
impl DlJob for SliceDlJob {
    fn base(&self) -> &BaseDlJob {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDlJob {
        &mut self.base
    }

    fn label(&self) -> String {
        format!("{}-{}", self.kind.prefix(), self.base.label())
    }

    fn len(&self) -> i64 {
        self.objs.len() as i64
    }

    async fn gen_next(&mut self) -> Result<Option<Vec<DlObj>>, DlError> {
        if self.current == self.objs.len() {
            return Ok(None);
        }
        let end = (self.current + BATCH_SIZE).min(self.objs.len());
        let batch = self.objs[self.current..end].to_vec();
        self.current = end;
        Ok(Some(batch))
    }
}
