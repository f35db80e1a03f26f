//! Per-object fetch seam and the bundled curl-based implementation.
//!
//! The dispatcher only knows the [`ObjectFetcher`] trait: fetch one object's
//! bytes, store them under the bucket, report whether anything new was
//! written. [`CurlFetcher`] implements it against a local bucket directory,
//! detecting already-present byte-identical objects by SHA-256 compare.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bucket::Bucket;

/// Result of one successful per-object fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Bytes were fetched and stored.
    Finished { bytes: u64 },
    /// The object already existed locally with identical content.
    Skipped { bytes: u64 },
}

impl FetchOutcome {
    pub fn bytes(self) -> u64 {
        match self {
            FetchOutcome::Finished { bytes } | FetchOutcome::Skipped { bytes } => bytes,
        }
    }
}

/// Transport seam: fetch `link` and store it as `obj_name` in `bck`.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch(&self, bck: &Bucket, obj_name: &str, link: &str) -> Result<FetchOutcome>;

    /// Delete local objects that fall inside the reconciliation scope but
    /// are absent from the source listing. Returns the number deleted.
    /// Only meaningful for stores with local object layout; the default
    /// does nothing.
    async fn reconcile(
        &self,
        _bck: &Bucket,
        _in_scope: &(dyn for<'a> Fn(&'a str) -> bool + Sync),
        _source_names: &HashSet<String>,
    ) -> Result<u64> {
        Ok(0)
    }
}

/// Fetches objects over HTTP(S) with libcurl into a local directory tree
/// (`<root>/<provider>/<bucket>/<object-name>`). Writes go to a `.part`
/// file first; the final rename only happens for new or changed content.
pub struct CurlFetcher {
    root: PathBuf,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl CurlFetcher {
    pub fn new(root: impl Into<PathBuf>, cfg: &crate::config::DlConfig) -> Self {
        Self {
            root: root.into(),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            request_timeout: Duration::from_secs(cfg.request_timeout_secs),
        }
    }

    fn bucket_dir(&self, bck: &Bucket) -> PathBuf {
        self.root.join(bck.provider.as_str()).join(&bck.name)
    }

    fn object_path(&self, bck: &Bucket, obj_name: &str) -> PathBuf {
        self.bucket_dir(bck).join(obj_name)
    }
}

#[async_trait]
impl ObjectFetcher for CurlFetcher {
    async fn fetch(&self, bck: &Bucket, obj_name: &str, link: &str) -> Result<FetchOutcome> {
        let final_path = self.object_path(bck, obj_name);
        let temp_path = part_path(&final_path);
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = link.to_string();
        let connect_timeout = self.connect_timeout;
        let request_timeout = self.request_timeout;
        let (bytes, digest) = tokio::task::spawn_blocking({
            let temp_path = temp_path.clone();
            move || download_to(&url, &temp_path, connect_timeout, request_timeout)
        })
        .await
        .context("fetch task join")??;

        if final_path.exists() {
            let existing = sha256_path(&final_path)?;
            if existing == digest {
                tokio::fs::remove_file(&temp_path).await.ok();
                tracing::debug!(obj = obj_name, "already present, byte-identical");
                return Ok(FetchOutcome::Skipped { bytes });
            }
        }
        tokio::fs::rename(&temp_path, &final_path)
            .await
            .with_context(|| format!("finalize {}", final_path.display()))?;
        Ok(FetchOutcome::Finished { bytes })
    }

    async fn reconcile(
        &self,
        bck: &Bucket,
        in_scope: &(dyn for<'a> Fn(&'a str) -> bool + Sync),
        source_names: &HashSet<String>,
    ) -> Result<u64> {
        let dir = self.bucket_dir(bck);
        if !dir.exists() {
            return Ok(0);
        }
        let mut deleted = 0u64;
        for entry in walkdir::WalkDir::new(&dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().is_some_and(|e| e == "part") {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&dir) else {
                continue;
            };
            let name = rel.to_string_lossy().replace('\\', "/");
            if in_scope(&name) && !source_names.contains(name.as_str()) {
                tokio::fs::remove_file(entry.path()).await?;
                tracing::debug!(obj = %name, "deleted: absent from source");
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

fn part_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.push_str(".part");
    final_path.with_file_name(name)
}

/// Blocking GET with libcurl, streaming the body into `path`. Returns the
/// byte count and the SHA-256 of the content as lowercase hex.
fn download_to(
    url: &str,
    path: &Path,
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<(u64, String)> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;

    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(connect_timeout)?;
    easy.low_speed_limit(1024)?;
    easy.low_speed_time(Duration::from_secs(60))?;
    easy.timeout(request_timeout)?;

    let mut sink = std::io::BufWriter::new(file);
    let mut hasher = Sha256::new();
    let mut bytes = 0u64;
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            hasher.update(data);
            bytes += data.len() as u64;
            match sink.write_all(data) {
                Ok(()) => Ok(data.len()),
                Err(e) => {
                    tracing::warn!("object write failed: {}", e);
                    Ok(0) // abort transfer
                }
            }
        })?;
        transfer.perform().context("GET request failed")?;
    }
    sink.flush().context("flush object file")?;

    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        anyhow::bail!("GET {} returned HTTP {}", url, code);
    }
    Ok((bytes, hex::encode(hasher.finalize())))
}

/// SHA-256 of a file as lowercase hex, read in bounded chunks.
fn sha256_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
