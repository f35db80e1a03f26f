//! Per-job control loop: pull batches from the enumerator, hand items to
//! workers through the throttler, keep the counters and the store current,
//! and finalize exactly once.
//!
//! States: running -> (draining | aborted) -> finalized. No ordering is
//! guaranteed across workers of the same job.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::bucket::Bucket;
use crate::cluster::Cluster;
use crate::error::DlError;
use crate::fetcher::{FetchOutcome, ObjectFetcher};
use crate::job::{DlJob, DlObj, BATCH_SIZE};
use crate::record::{DlJobRecord, StatusResp};
use crate::store::JobStore;
use crate::throttler::Throttler;
use crate::xact::Xact;

/// Drive `job` to completion. Spawned once per job by the engine; never
/// returns an error, every failure ends up in the record and the store.
pub async fn run(
    mut job: Box<dyn DlJob>,
    cluster: Arc<dyn Cluster>,
    store: JobStore,
    fetcher: Arc<dyn ObjectFetcher>,
) {
    let label = job.label();
    let record = Arc::clone(job.record());
    let throttler = Arc::clone(job.throttler());
    let xact = Arc::clone(job.xact());
    let bck = job.bucket().clone();

    tracing::info!("{}: started (len: {})", label, job.len());

    let watchdog = spawn_watchdog(&label, job.timeout(), &record, &throttler);
    let progress = spawn_progress_ticker(&mut job, &record, &xact);

    // For sync jobs, remember every admitted name so reconciliation can
    // tell stale local objects from freshly listed ones.
    let mut seen: Option<HashSet<String>> = job.sync().then(HashSet::new);

    let mut workers = JoinSet::new();
    let mut fatal: Option<DlError> = None;
    let mut dispatched_all = false;

    'dispatch: loop {
        if record.aborted() {
            break;
        }
        match job.gen_next().await {
            Err(e) => {
                tracing::error!("{}: {}", label, e);
                fatal = Some(e);
                record.set_aborted();
                throttler.stop();
                break;
            }
            Ok(None) => {
                dispatched_all = true;
                break;
            }
            Ok(Some(batch)) => {
                debug_assert!(batch.len() <= BATCH_SIZE);
                for obj in batch {
                    if record.aborted() {
                        break 'dispatch;
                    }
                    if let Some(seen) = seen.as_mut() {
                        seen.insert(obj.obj_name.clone());
                    }
                    record.inc_scheduled();
                    let token = match throttler.acquire(0).await {
                        Ok(token) => token,
                        Err(_) => {
                            // Stopped mid-abort: the item was scheduled, so
                            // it must resolve; count it as aborted.
                            record.inc_errors();
                            if let Err(e) = store
                                .record_error(&record.id, &obj.obj_name, "job aborted")
                                .await
                            {
                                tracing::error!("{}: record error: {:#}", label, e);
                            }
                            continue;
                        }
                    };
                    workers.spawn(worker_run(
                        obj,
                        token,
                        bck.clone(),
                        Arc::clone(&cluster),
                        Arc::clone(&fetcher),
                        Arc::clone(&throttler),
                        Arc::clone(&record),
                        Arc::clone(&xact),
                        store.clone(),
                    ));
                    reap_finished(&mut workers, &label);
                }
            }
        }
    }
    if dispatched_all {
        record.set_all_dispatched();
    }

    while let Some(res) = workers.join_next().await {
        if let Err(e) = res {
            tracing::error!("{}: worker join: {}", label, e);
        }
    }

    if dispatched_all && fatal.is_none() && !record.aborted() && job.sync() {
        if let Some(seen) = &seen {
            let in_scope = |name: &str| job.check_obj(name);
            match fetcher.reconcile(&bck, &in_scope, seen).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("{}: deleted {} objects absent from source", label, n),
                Err(e) => tracing::warn!("{}: reconcile: {:#}", label, e),
            }
        }
    }

    if let Some(w) = watchdog {
        w.abort();
    }
    if let Some(p) = progress {
        p.abort();
    }

    job.cleanup(&store, fatal.as_ref()).await;
    tracing::info!("{}: finished {:?}", label, record.snapshot());
}

/// The job-level timeout aborts the whole job on expiry.
fn spawn_watchdog(
    label: &str,
    timeout: Duration,
    record: &Arc<DlJobRecord>,
    throttler: &Arc<Throttler>,
) -> Option<tokio::task::JoinHandle<()>> {
    if timeout.is_zero() {
        return None;
    }
    let label = label.to_string();
    let record = Arc::clone(record);
    let throttler = Arc::clone(throttler);
    Some(tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if record.set_aborted() {
            tracing::warn!("{}: timed out after {:?}, aborting", label, timeout);
            throttler.stop();
        }
    }))
}

fn spawn_progress_ticker(
    job: &mut Box<dyn DlJob>,
    record: &Arc<DlJobRecord>,
    xact: &Arc<Xact>,
) -> Option<tokio::task::JoinHandle<()>> {
    let notif = job.notif()?;
    let cb = notif.progress_cb()?;
    let every = notif.progress_interval();
    let every = if every.is_zero() {
        Duration::from_secs(10)
    } else {
        every
    };
    let record = Arc::clone(record);
    let xact = Arc::clone(xact);
    Some(tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.tick().await; // immediate first tick carries no progress
        loop {
            tick.tick().await;
            let status = StatusResp {
                job: record.snapshot(),
                currently_downloading: xact.currently_downloading(),
            };
            cb(&status);
        }
    }))
}

fn reap_finished(workers: &mut JoinSet<()>, label: &str) {
    while let Some(res) = workers.try_join_next() {
        if let Err(e) = res {
            tracing::error!("{}: worker join: {}", label, e);
        }
    }
}

/// One per-object worker: fetch, settle counters, settle the throttler.
#[allow(clippy::too_many_arguments)]
async fn worker_run(
    obj: DlObj,
    token: crate::throttler::ThrottleToken,
    bck: Bucket,
    cluster: Arc<dyn Cluster>,
    fetcher: Arc<dyn ObjectFetcher>,
    throttler: Arc<Throttler>,
    record: Arc<DlJobRecord>,
    xact: Arc<Xact>,
    store: JobStore,
) {
    xact.obj_started(&obj.obj_name);
    let result = fetch_one(&obj, &bck, &cluster, fetcher.as_ref(), &throttler, &record).await;
    xact.obj_done(&obj.obj_name);

    let mut actual_bytes = 0i64;
    match result {
        Ok(outcome) => {
            actual_bytes = outcome.bytes() as i64;
            record.inc_finished();
            if matches!(outcome, FetchOutcome::Skipped { .. }) {
                record.inc_skipped();
            }
        }
        Err(e) => {
            record.inc_errors();
            if !e.is_aborted() {
                tracing::warn!("{}", e);
            }
            if let Err(se) = store
                .record_error(&record.id, &obj.obj_name, &e.to_string())
                .await
            {
                tracing::error!("record error for {}: {:#}", obj.obj_name, se);
            }
        }
    }
    throttler.release(token, actual_bytes);
}

async fn fetch_one(
    obj: &DlObj,
    bck: &Bucket,
    cluster: &Arc<dyn Cluster>,
    fetcher: &dyn ObjectFetcher,
    throttler: &Throttler,
    record: &DlJobRecord,
) -> Result<FetchOutcome, DlError> {
    if record.aborted() {
        return Err(DlError::Aborted);
    }
    let link = if obj.from_remote {
        let backend = cluster
            .backend(bck)
            .map_err(|e| DlError::fetch(&obj.obj_name, e))?;
        backend.object_url(bck, &obj.obj_name)
    } else {
        obj.link.clone()
    };
    tokio::select! {
        res = fetcher.fetch(bck, &obj.obj_name, &link) => {
            res.map_err(|e| DlError::fetch(&obj.obj_name, format!("{:#}", e)))
        }
        _ = throttler.cancelled() => Err(DlError::Aborted),
    }
}
