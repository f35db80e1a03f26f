//! SQLite-backed job store: connection, migrations, live-record registry.
//! Job reads and writes live in `jobs`.

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::record::DlJobRecord;

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the SQLite-backed job store. Cheap to clone; writes for one
/// job id are serialized by the underlying pool and row locks.
#[derive(Clone)]
pub struct JobStore {
    pub(crate) pool: Pool<Sqlite>,
    /// Live records whose atomic counters back `flush`.
    pub(crate) live: Arc<Mutex<HashMap<String, Arc<DlJobRecord>>>>,
}

impl JobStore {
    /// Open (or create) the default store under the XDG state directory
    /// (`~/.local/state/odm/jobs.db`) and run migrations.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("odm")?;
        let state_dir = xdg_dirs.get_state_home().join("odm");
        let db_path = state_dir.join("jobs.db");

        tokio::fs::create_dir_all(&state_dir).await?;

        let uri = path_to_sqlite_uri(&db_path) + "?mode=rwc";
        Self::connect(&uri).await
    }

    /// Open (or create) the store at a specific path. Creates parent dirs if
    /// needed. Intended for tests and embedders with their own layout.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        Self::connect(&uri).await
    }

    async fn connect(uri: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(uri)
            .await?;
        let store = JobStore {
            pool,
            live: Arc::new(Mutex::new(HashMap::new())),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dl_jobs (
                id TEXT PRIMARY KEY,
                xaction_id TEXT NOT NULL,
                description TEXT NOT NULL,
                started_time INTEGER NOT NULL,
                finished_time INTEGER NOT NULL DEFAULT 0,
                scheduled INTEGER NOT NULL DEFAULT 0,
                finished INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                errors INTEGER NOT NULL DEFAULT 0,
                total INTEGER NOT NULL,
                aborted INTEGER NOT NULL DEFAULT 0,
                all_dispatched INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dl_errors (
                job_id TEXT NOT NULL,
                obj_name TEXT NOT NULL,
                message TEXT NOT NULL,
                recorded_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub(crate) fn live_record(&self, id: &str) -> Option<Arc<DlJobRecord>> {
        self.live.lock().unwrap().get(id).cloned()
    }
}

#[cfg(test)]
/// Open an in-memory store for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<JobStore> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let store = JobStore {
        pool,
        live: Arc::new(Mutex::new(HashMap::new())),
    };
    store.migrate().await?;
    Ok(store)
}
