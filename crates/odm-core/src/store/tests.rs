//! Tests for the job store (in-memory DB helper from db, temp files for
//! the restart test).

use std::sync::Arc;

use crate::record::DlJobRecord;
use crate::store::db::open_memory;
use crate::store::{JobFilter, JobStore};

fn record(id: &str, total: i64) -> Arc<DlJobRecord> {
    Arc::new(DlJobRecord::new(id, &format!("x-{}", id), "test job", total))
}

#[tokio::test]
async fn upsert_get_roundtrip() {
    let store = open_memory().await.unwrap();
    let rec = record("j1", 5);
    store.upsert_job(&rec).await.unwrap();

    let info = store.get("j1").await.unwrap().expect("job exists");
    assert_eq!(info, rec.snapshot());
    assert!(store.get("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn flush_persists_latest_counters() {
    let store = open_memory().await.unwrap();
    let rec = record("j1", 3);
    store.upsert_job(&rec).await.unwrap();

    rec.inc_scheduled();
    rec.inc_scheduled();
    rec.inc_finished();
    store.flush("j1").await.unwrap();

    // Read through the persisted row, bypassing the live overlay.
    store.live.lock().unwrap().clear();
    let info = store.get("j1").await.unwrap().unwrap();
    assert_eq!(info.scheduled, 2);
    assert_eq!(info.finished, 1);
    assert_eq!(info.total, 3);
}

#[tokio::test]
async fn terminal_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.db");

    let expected = {
        let store = JobStore::open_at(&path).await.unwrap();
        let rec = record("j1", 2);
        store.upsert_job(&rec).await.unwrap();
        rec.inc_scheduled();
        rec.inc_scheduled();
        rec.inc_finished();
        rec.inc_errors();
        rec.set_all_dispatched();
        store.mark_finished("j1").await.unwrap();
        store.flush("j1").await.unwrap();
        rec.snapshot()
    };
    assert!(expected.finished_time > 0);

    let store = JobStore::open_at(&path).await.unwrap();
    let info = store.get("j1").await.unwrap().expect("row survived restart");
    assert_eq!(info, expected);
}

#[tokio::test]
async fn abort_sets_flag_on_live_record_and_row() {
    let store = open_memory().await.unwrap();
    let rec = record("j1", -1);
    store.upsert_job(&rec).await.unwrap();

    store.abort("j1").await.unwrap();
    assert!(rec.aborted());

    store.live.lock().unwrap().clear();
    let info = store.get("j1").await.unwrap().unwrap();
    assert!(info.aborted);
}

#[tokio::test]
async fn list_filters_by_activity_and_id_prefix() {
    let store = open_memory().await.unwrap();
    let done = record("batch-a", 1);
    let running = record("batch-b", 1);
    let other = record("adhoc-1", 1);
    store.upsert_job(&done).await.unwrap();
    store.upsert_job(&running).await.unwrap();
    store.upsert_job(&other).await.unwrap();
    store.mark_finished("batch-a").await.unwrap();
    store.flush("batch-a").await.unwrap();

    let all = store.list(JobFilter::All).await.unwrap();
    assert_eq!(all.len(), 3);

    let active = store.list(JobFilter::Active).await.unwrap();
    let active_ids: Vec<&str> = active.iter().map(|j| j.id.as_str()).collect();
    assert!(active_ids.contains(&"batch-b"));
    assert!(active_ids.contains(&"adhoc-1"));
    assert!(!active_ids.contains(&"batch-a"));

    let batch = store
        .list(JobFilter::ByIdPrefix("batch-".to_string()))
        .await
        .unwrap();
    let batch_ids: Vec<&str> = batch.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(batch.len(), 2);
    assert!(batch_ids.contains(&"batch-a"));
    assert!(batch_ids.contains(&"batch-b"));
}

#[tokio::test]
async fn object_errors_recorded_in_order() {
    let store = open_memory().await.unwrap();
    let rec = record("j1", 2);
    store.upsert_job(&rec).await.unwrap();

    store.record_error("j1", "a.bin", "HTTP 404").await.unwrap();
    store.record_error("j1", "b.bin", "connect timeout").await.unwrap();

    let errs = store.list_errors("j1").await.unwrap();
    assert_eq!(errs.len(), 2);
    assert_eq!(errs[0].obj_name, "a.bin");
    assert_eq!(errs[0].message, "HTTP 404");
    assert_eq!(errs[1].obj_name, "b.bin");
}

#[tokio::test]
async fn purge_removes_job_and_errors() {
    let store = open_memory().await.unwrap();
    let rec = record("j1", 1);
    store.upsert_job(&rec).await.unwrap();
    store.record_error("j1", "a", "x").await.unwrap();

    store.purge("j1").await.unwrap();
    assert!(store.get("j1").await.unwrap().is_none());
    assert!(store.list_errors("j1").await.unwrap().is_empty());
    assert!(store.flush("j1").await.is_err(), "live record forgotten");
}
