//! Range jobs: enumerate a Bash-brace template without materializing it.
//!
//! The owned-item count is established at creation with one precount pass
//! over an independent template cursor; enumeration then streams batches,
//! silently skipping links that hash to other targets.

use async_trait::async_trait;
use std::sync::Arc;

use crate::bucket::Bucket;
use crate::cluster::{make_dl_obj, Cluster};
use crate::config::DlConfig;
use crate::error::DlError;
use crate::payload::RangeBody;
use crate::template::{ParsedTemplate, TemplateIter};

use super::{object_name, BaseDlJob, DlJob, DlObj, BATCH_SIZE};

pub struct RangeDlJob {
    base: BaseDlJob,
    cluster: Arc<dyn Cluster>,
    iter: TemplateIter,
    /// Destination directory (prefix) from the request.
    dir: String,
    /// Items this target owns, established by the precount pass.
    count: i64,
    done: bool,
}

impl RangeDlJob {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        id: &str,
        bck: Bucket,
        body: &RangeBody,
        cfg: &DlConfig,
    ) -> Result<Self, DlError> {
        let tpl = ParsedTemplate::parse(&body.template)?;
        let count = count_owned(cluster.as_ref(), &bck, &tpl, &body.subdir);
        let description = body.describe(&bck);
        let base = BaseDlJob::new(cluster.as_ref(), id, bck, &body.base, description, count, cfg)?;
        Ok(Self {
            base,
            cluster,
            iter: tpl.iter(),
            dir: body.subdir.clone(),
            count,
            done: false,
        })
    }

    fn next_objs(&mut self) -> Vec<DlObj> {
        let smap = self.cluster.smap();
        let sid = self.cluster.sid();
        let mut objs = Vec::new();
        while objs.len() < BATCH_SIZE {
            let Some(link) = self.iter.next() else {
                self.done = true;
                break;
            };
            let name = object_name(&self.dir, &link);
            if let Ok(obj) = make_dl_obj(&smap, sid, &self.base.bck, &name, &link) {
                objs.push(obj);
            }
        }
        objs
    }
}

/// One full pass over its own cursor, counting links this target owns.
fn count_owned(cluster: &dyn Cluster, bck: &Bucket, tpl: &ParsedTemplate, dir: &str) -> i64 {
    let smap = cluster.smap();
    let sid = cluster.sid();
    tpl.iter()
        .filter(|link| {
            let name = object_name(dir, link);
            make_dl_obj(&smap, sid, bck, &name, link).is_ok()
        })
        .count() as i64
}

#[async_trait]
impl DlJob for RangeDlJob {
    fn base(&self) -> &BaseDlJob {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDlJob {
        &mut self.base
    }

    fn label(&self) -> String {
        format!("range-{}-{}-{}", self.base.label(), self.count, self.dir)
    }

    fn len(&self) -> i64 {
        self.count
    }

    async fn gen_next(&mut self) -> Result<Option<Vec<DlObj>>, DlError> {
        if self.done {
            return Ok(None);
        }
        Ok(Some(self.next_objs()))
    }
}
