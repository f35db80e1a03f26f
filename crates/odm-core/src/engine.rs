//! Per-target engine facade: create jobs from payloads, run them on
//! dedicated dispatcher tasks, and serve abort/status/list requests.

use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::bucket::Bucket;
use crate::cluster::Cluster;
use crate::config::DlConfig;
use crate::dispatcher;
use crate::fetcher::ObjectFetcher;
use crate::job::{BackendDlJob, DlJob, RangeDlJob, SliceDlJob};
use crate::notif::NotifDownload;
use crate::payload::DlBody;
use crate::record::{DlJobRecord, JobInfo, StatusResp};
use crate::store::{JobFilter, JobStore};
use crate::throttler::Throttler;
use crate::xact::Xact;

struct JobHandle {
    record: Arc<DlJobRecord>,
    xact: Arc<Xact>,
    throttler: Arc<Throttler>,
    task: Option<JoinHandle<()>>,
}

/// One engine per storage target. Cheap handles (records, throttlers) stay
/// registered after a job finishes so status keeps working until `purge`.
pub struct Engine {
    cluster: Arc<dyn Cluster>,
    store: JobStore,
    fetcher: Arc<dyn ObjectFetcher>,
    cfg: DlConfig,
    jobs: Mutex<HashMap<String, JobHandle>>,
}

impl Engine {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        store: JobStore,
        fetcher: Arc<dyn ObjectFetcher>,
        cfg: DlConfig,
    ) -> Self {
        Self {
            cluster,
            store,
            fetcher,
            cfg,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Validate the payload, create the job, and start dispatching it.
    /// Creation errors (bad bucket kind, unparseable template, bad payload)
    /// surface here; everything later is visible only via status.
    pub async fn submit(&self, id: &str, bck: Bucket, body: DlBody) -> Result<()> {
        self.submit_with_notif(id, bck, body, None).await
    }

    pub async fn submit_with_notif(
        &self,
        id: &str,
        bck: Bucket,
        body: DlBody,
        notif: Option<NotifDownload>,
    ) -> Result<()> {
        let registered = self.jobs.lock().unwrap().contains_key(id);
        if registered || self.store.get(id).await?.is_some() {
            bail!("job id {} already in use", id);
        }

        let mut job: Box<dyn DlJob> = match &body {
            DlBody::Single(b) => Box::new(SliceDlJob::new_single(
                self.cluster.as_ref(),
                id,
                bck,
                b,
                &self.cfg,
            )?),
            DlBody::Multi(b) => Box::new(SliceDlJob::new_multi(
                self.cluster.as_ref(),
                id,
                bck,
                b,
                &self.cfg,
            )?),
            DlBody::Range(b) => Box::new(RangeDlJob::new(
                Arc::clone(&self.cluster),
                id,
                bck,
                b,
                &self.cfg,
            )?),
            DlBody::Backend(b) => Box::new(BackendDlJob::new(
                Arc::clone(&self.cluster),
                id,
                bck,
                b,
                &self.cfg,
            )?),
        };
        if let Some(n) = notif {
            job.add_notif(n);
        }

        let record = Arc::clone(job.record());
        self.store.upsert_job(&record).await?;

        let handle = JobHandle {
            record,
            xact: Arc::clone(job.xact()),
            throttler: Arc::clone(job.throttler()),
            task: Some(tokio::spawn(dispatcher::run(
                job,
                Arc::clone(&self.cluster),
                self.store.clone(),
                Arc::clone(&self.fetcher),
            ))),
        };
        self.jobs.lock().unwrap().insert(id.to_string(), handle);
        Ok(())
    }

    /// One-shot abort: stop enumerating, fail pending throttler waits, and
    /// cancel in-flight fetches. Persisted immediately.
    pub async fn abort(&self, id: &str) -> Result<()> {
        let throttler = {
            let jobs = self.jobs.lock().unwrap();
            let handle = jobs.get(id).ok_or_else(|| anyhow!("job {} not found", id))?;
            handle.record.set_aborted();
            Arc::clone(&handle.throttler)
        };
        throttler.stop();
        self.store.abort(id).await
    }

    /// Counter snapshot plus currently-downloading names. Falls back to the
    /// store for jobs that finished in an earlier process lifetime.
    pub async fn status(&self, id: &str) -> Result<StatusResp> {
        {
            let jobs = self.jobs.lock().unwrap();
            if let Some(handle) = jobs.get(id) {
                return Ok(StatusResp {
                    job: handle.record.snapshot(),
                    currently_downloading: handle.xact.currently_downloading(),
                });
            }
        }
        let info = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("job {} not found", id))?;
        Ok(StatusResp {
            job: info,
            currently_downloading: Vec::new(),
        })
    }

    pub async fn list(&self, filter: JobFilter) -> Result<Vec<JobInfo>> {
        self.store.list(filter).await
    }

    /// Per-object failures recorded for the job.
    pub async fn errors(&self, id: &str) -> Result<Vec<crate::store::ObjErr>> {
        self.store.list_errors(id).await
    }

    /// Await the job's dispatcher task. Mostly for embedders and tests that
    /// need a completion edge rather than polling status.
    pub async fn wait(&self, id: &str) -> Result<()> {
        let task = {
            let mut jobs = self.jobs.lock().unwrap();
            let handle = jobs.get_mut(id).ok_or_else(|| anyhow!("job {} not found", id))?;
            handle.task.take()
        };
        match task {
            Some(task) => task.await.map_err(|e| anyhow!("dispatcher join: {}", e)),
            None => Ok(()),
        }
    }

    /// Drop a finished job from the registry and the store.
    pub async fn purge(&self, id: &str) -> Result<()> {
        {
            let jobs = self.jobs.lock().unwrap();
            if let Some(handle) = jobs.get(id) {
                if handle.record.snapshot().is_running() {
                    bail!("job {} is still running", id);
                }
            }
        }
        self.store.purge(id).await?;
        self.jobs.lock().unwrap().remove(id);
        Ok(())
    }
}
