//! Integration tests: submit jobs against a mock cluster, backend, and
//! fetcher, and drive them through the engine to completion or abort.

mod common;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use odm_core::bucket::{Bucket, Provider};
use odm_core::cluster::Smap;
use odm_core::config::DlConfig;
use odm_core::engine::Engine;
use odm_core::notif::NotifDownload;
use odm_core::payload::{BackendBody, DlBase, DlBody, MultiBody, RangeBody, SingleBody};
use odm_core::store::{JobFilter, JobStore};
use tempfile::TempDir;

use common::{MockCluster, MockFetcher, PagedBackend};

struct Env {
    engine: Engine,
    fetcher: Arc<MockFetcher>,
    _state: TempDir,
}

async fn env_with(cluster: MockCluster, fetcher: MockFetcher) -> Env {
    let state = tempfile::tempdir().unwrap();
    let store = JobStore::open_at(state.path().join("jobs.db")).await.unwrap();
    let fetcher = Arc::new(fetcher);
    let engine = Engine::new(
        Arc::new(cluster),
        store,
        Arc::clone(&fetcher) as Arc<dyn odm_core::fetcher::ObjectFetcher>,
        DlConfig::default(),
    );
    Env {
        engine,
        fetcher,
        _state: state,
    }
}

async fn single_target_env() -> Env {
    env_with(
        MockCluster::new("t1", Smap::new(1, ["t1".to_string()])),
        MockFetcher::default(),
    )
    .await
}

fn single_body(name: &str, link: &str) -> DlBody {
    DlBody::Single(SingleBody {
        base: DlBase::default(),
        object_name: name.to_string(),
        link: link.to_string(),
    })
}

#[tokio::test]
async fn single_job_runs_to_completion() {
    let env = single_target_env().await;
    let bck = Bucket::new("b", Provider::Ais);

    env.engine
        .submit("j1", bck, single_body("a.bin", "http://x/a"))
        .await
        .unwrap();
    env.engine.wait("j1").await.unwrap();

    let status = env.engine.status("j1").await.unwrap();
    assert_eq!(status.job.total, 1);
    assert_eq!(status.job.scheduled, 1);
    assert_eq!(status.job.finished, 1);
    assert_eq!(status.job.errors, 0);
    assert!(status.job.all_dispatched);
    assert!(!status.job.aborted);
    assert!(status.job.finished_time > 0);
    assert!(status.currently_downloading.is_empty());

    let fetched = env.fetcher.fetched.lock().unwrap().clone();
    assert_eq!(fetched, vec![("a.bin".to_string(), "http://x/a".to_string())]);
}

#[tokio::test]
async fn multi_job_downloads_only_owned_slice() {
    let smap = Smap::new(1, ["t1".to_string(), "t2".to_string(), "t3".to_string()]);
    let mut objects = BTreeMap::new();
    for i in 0..30 {
        objects.insert(format!("obj-{}", i), format!("http://src/obj-{}", i));
    }
    let body = MultiBody {
        base: DlBase::default(),
        objects: objects.clone(),
    };

    let mut grand_total = 0i64;
    for sid in ["t1", "t2", "t3"] {
        let env = env_with(
            MockCluster::new(sid, smap.clone()),
            MockFetcher::default(),
        )
        .await;
        env.engine
            .submit("j1", Bucket::new("b", Provider::Ais), DlBody::Multi(body.clone()))
            .await
            .unwrap();
        env.engine.wait("j1").await.unwrap();

        let status = env.engine.status("j1").await.unwrap();
        assert!(status.job.all_dispatched, "target {} must finish", sid);
        assert_eq!(
            status.job.scheduled, status.job.total,
            "target {}: finite job schedules exactly its slice",
            sid
        );
        assert_eq!(status.job.finished + status.job.errors, status.job.scheduled);
        assert_eq!(status.job.errors, 0);
        grand_total += status.job.total;

        let names = env.fetcher.fetched_names();
        assert_eq!(names.len() as i64, status.job.total);
        assert!(names.iter().all(|n| objects.contains_key(n)));
    }
    assert_eq!(grand_total, 30, "slices partition the object set");
}

#[tokio::test]
async fn empty_slice_terminates_immediately() {
    // Two-target map, but this engine only owns what hashes to it; with a
    // single foreign object the job can come up empty.
    let smap = Smap::new(1, ["t1".to_string(), "t2".to_string()]);
    let bck = Bucket::new("b", Provider::Ais);

    // Find a name owned by t2 so t1 has nothing to do.
    let foreign = (0..)
        .map(|i| format!("obj-{}", i))
        .find(|name| {
            odm_core::cluster::hrw_target(&smap, &bck, name) == Some("t2")
        })
        .unwrap();

    let env = env_with(MockCluster::new("t1", smap.clone()), MockFetcher::default()).await;
    env.engine
        .submit("j1", bck, single_body(&foreign, "http://x/f"))
        .await
        .unwrap();
    env.engine.wait("j1").await.unwrap();

    let status = env.engine.status("j1").await.unwrap();
    assert_eq!(status.job.total, 0);
    assert_eq!(status.job.scheduled, 0);
    assert!(status.job.all_dispatched);
    assert!(env.fetcher.fetched_names().is_empty());
}

#[tokio::test]
async fn fetch_errors_do_not_stop_the_job() {
    let mut fetcher = MockFetcher::default();
    fetcher.fail.insert("b".to_string());
    let env = env_with(
        MockCluster::new("t1", Smap::new(1, ["t1".to_string()])),
        fetcher,
    )
    .await;

    let mut objects = BTreeMap::new();
    for name in ["a", "b", "c"] {
        objects.insert(name.to_string(), format!("http://x/{}", name));
    }
    env.engine
        .submit(
            "j1",
            Bucket::new("b", Provider::Ais),
            DlBody::Multi(MultiBody {
                base: DlBase::default(),
                objects,
            }),
        )
        .await
        .unwrap();
    env.engine.wait("j1").await.unwrap();

    let status = env.engine.status("j1").await.unwrap();
    assert_eq!(status.job.scheduled, 3);
    assert_eq!(status.job.finished, 2);
    assert_eq!(status.job.errors, 1);
    assert!(status.job.all_dispatched);
    assert!(!status.job.aborted);

    let errs = env.engine.errors("j1").await.unwrap();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].obj_name, "b");

    let jobs = env
        .engine
        .list(JobFilter::ByIdPrefix("j1".to_string()))
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, "j1");
    assert!(env
        .engine
        .list(JobFilter::ByIdPrefix("zz".to_string()))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn skipped_objects_count_as_finished() {
    let mut fetcher = MockFetcher::default();
    fetcher.skip.insert("a".to_string());
    let env = env_with(
        MockCluster::new("t1", Smap::new(1, ["t1".to_string()])),
        fetcher,
    )
    .await;

    let mut objects = BTreeMap::new();
    objects.insert("a".to_string(), "http://x/a".to_string());
    objects.insert("b".to_string(), "http://x/b".to_string());
    env.engine
        .submit(
            "j1",
            Bucket::new("b", Provider::Ais),
            DlBody::Multi(MultiBody {
                base: DlBase::default(),
                objects,
            }),
        )
        .await
        .unwrap();
    env.engine.wait("j1").await.unwrap();

    let status = env.engine.status("j1").await.unwrap();
    assert_eq!(status.job.finished, 2, "skips are a subset of finishes");
    assert_eq!(status.job.skipped, 1);
    assert_eq!(status.job.errors, 0);
}

#[tokio::test]
async fn backend_job_pages_filters_and_reconciles() {
    let pages = vec![
        vec!["foo-1".to_string(), "foo-2".to_string()],
        vec!["bar-3".to_string(), "foo-3".to_string()],
    ];
    let cluster = MockCluster::new("t1", Smap::new(1, ["t1".to_string()]))
        .with_backend(PagedBackend::new(pages));
    let env = env_with(cluster, MockFetcher::default()).await;

    env.engine
        .submit(
            "j1",
            Bucket::new("rb", Provider::Amazon),
            DlBody::Backend(BackendBody {
                base: DlBase::default(),
                prefix: "foo-".to_string(),
                suffix: String::new(),
                sync: true,
            }),
        )
        .await
        .unwrap();
    env.engine.wait("j1").await.unwrap();

    let status = env.engine.status("j1").await.unwrap();
    assert_eq!(status.job.total, -1, "backend jobs never learn a total");
    assert_eq!(status.job.scheduled, 3);
    assert_eq!(status.job.finished, 3);
    assert!(status.job.all_dispatched);

    // Remote objects are fetched through backend-resolved links, in page order.
    let fetched = env.fetcher.fetched.lock().unwrap().clone();
    let names: Vec<&str> = fetched.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["foo-1", "foo-2", "foo-3"]);
    assert!(fetched.iter().all(|(n, l)| l == &format!("http://remote/rb/{}", n)));

    // Sync job: reconciliation saw every admitted name.
    assert_eq!(*env.fetcher.reconciled_with.lock().unwrap(), Some(3));
}

#[tokio::test]
async fn backend_job_rejected_on_non_remote_bucket() {
    let env = single_target_env().await;
    let err = env
        .engine
        .submit(
            "j1",
            Bucket::new("b", Provider::Ais),
            DlBody::Backend(BackendBody {
                base: DlBase::default(),
                prefix: String::new(),
                suffix: String::new(),
                sync: false,
            }),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("remote bucket"));
    assert!(
        env.engine.status("j1").await.is_err(),
        "no job record persisted on validation failure"
    );
}

#[tokio::test]
async fn abort_stops_scheduling_and_notifies_once() {
    let notifications = Arc::new(AtomicUsize::new(0));
    let fetcher = MockFetcher {
        delay: Duration::from_millis(100),
        ..MockFetcher::default()
    };
    let env = env_with(
        MockCluster::new("t1", Smap::new(1, ["t1".to_string()])),
        fetcher,
    )
    .await;

    let body = DlBody::Range(RangeBody {
        base: DlBase {
            limits: odm_core::payload::Limits {
                bytes_per_hour: 0,
                connections: 2,
            },
            ..DlBase::default()
        },
        template: "img-{0..499}.jpg".to_string(),
        subdir: String::new(),
    });

    let hits = Arc::clone(&notifications);
    let notif = NotifDownload::finished(Arc::new(move |status, _err| {
        hits.fetch_add(1, Ordering::Relaxed);
        assert!(status.job.aborted);
    }));
    env.engine
        .submit_with_notif("j1", Bucket::new("b", Provider::Ais), body, Some(notif))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    env.engine.abort("j1").await.unwrap();
    env.engine.wait("j1").await.unwrap();

    let status = env.engine.status("j1").await.unwrap();
    assert!(status.job.aborted);
    assert!(!status.job.all_dispatched);
    assert!(
        status.job.scheduled < 500,
        "abort must stop further scheduling (scheduled: {})",
        status.job.scheduled
    );
    // Every scheduled item resolved one way or the other before finalize.
    assert_eq!(status.job.finished + status.job.errors, status.job.scheduled);
    assert_eq!(notifications.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn job_timeout_triggers_abort() {
    let fetcher = MockFetcher {
        delay: Duration::from_millis(200),
        ..MockFetcher::default()
    };
    let env = env_with(
        MockCluster::new("t1", Smap::new(1, ["t1".to_string()])),
        fetcher,
    )
    .await;

    let body = DlBody::Range(RangeBody {
        base: DlBase {
            timeout: Some("50ms".to_string()),
            ..DlBase::default()
        },
        template: "o-{0..9}".to_string(),
        subdir: String::new(),
    });
    env.engine
        .submit("j1", Bucket::new("b", Provider::Ais), body)
        .await
        .unwrap();
    env.engine.wait("j1").await.unwrap();

    let status = env.engine.status("j1").await.unwrap();
    assert!(status.job.aborted, "timeout expiry aborts the job");
    assert!(status.job.finished_time > 0);
}

#[tokio::test]
async fn duplicate_job_id_rejected() {
    let env = single_target_env().await;
    let bck = Bucket::new("b", Provider::Ais);
    env.engine
        .submit("j1", bck.clone(), single_body("a", "http://x/a"))
        .await
        .unwrap();
    let err = env
        .engine
        .submit("j1", bck, single_body("b", "http://x/b"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already in use"));

    env.engine.wait("j1").await.unwrap();
    env.engine.purge("j1").await.unwrap();
    assert!(env.engine.status("j1").await.is_err());
}

#[tokio::test]
async fn progress_notifications_fire_while_running() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let fetcher = MockFetcher {
        delay: Duration::from_millis(30),
        ..MockFetcher::default()
    };
    let env = env_with(
        MockCluster::new("t1", Smap::new(1, ["t1".to_string()])),
        fetcher,
    )
    .await;

    let t = Arc::clone(&ticks);
    let notif = NotifDownload::with_progress(
        Arc::new(|_, _| {}),
        Arc::new(move |_status| {
            t.fetch_add(1, Ordering::Relaxed);
        }),
        Duration::from_millis(20),
    );
    let body = DlBody::Range(RangeBody {
        base: DlBase {
            limits: odm_core::payload::Limits {
                bytes_per_hour: 0,
                connections: 1,
            },
            ..DlBase::default()
        },
        template: "o-{0..4}".to_string(),
        subdir: String::new(),
    });
    env.engine
        .submit_with_notif("j1", Bucket::new("b", Provider::Ais), body, Some(notif))
        .await
        .unwrap();
    env.engine.wait("j1").await.unwrap();

    assert!(
        ticks.load(Ordering::Relaxed) >= 2,
        "5 x 30ms of work at a 20ms interval should tick at least twice"
    );
}
