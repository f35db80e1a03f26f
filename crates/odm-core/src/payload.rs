//! Download request payloads, as accepted from the control plane.
//!
//! Each job kind has its own body; common fields (description, timeout,
//! limits) are flattened into all of them. Timeouts are Go-style duration
//! strings (`"1h30m"`, `"45s"`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::bucket::Bucket;
use crate::error::DlError;

/// Per-job resource bounds. Zero means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default)]
    pub bytes_per_hour: i64,
    #[serde(default)]
    pub connections: usize,
}

/// Fields shared by every request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DlBase {
    #[serde(default)]
    pub description: Option<String>,
    /// Go-style duration string; absent falls back to the configured default.
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub limits: Limits,
}

/// Download a single object from one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleBody {
    #[serde(flatten)]
    pub base: DlBase,
    pub object_name: String,
    pub link: String,
}

/// Download an explicit `name -> url` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiBody {
    #[serde(flatten)]
    pub base: DlBase,
    pub objects: BTreeMap<String, String>,
}

/// Download a Bash-brace template expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeBody {
    #[serde(flatten)]
    pub base: DlBase,
    pub template: String,
    /// Destination directory prefix inside the bucket.
    #[serde(default)]
    pub subdir: String,
}

/// Download (a filtered slice of) the bucket's remote backend listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendBody {
    #[serde(flatten)]
    pub base: DlBase,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    /// Also delete local objects absent from the source listing.
    #[serde(default)]
    pub sync: bool,
}

/// A download request, one of the four job kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DlBody {
    Single(SingleBody),
    Multi(MultiBody),
    Range(RangeBody),
    Backend(BackendBody),
}

impl DlBody {
    pub fn base(&self) -> &DlBase {
        match self {
            DlBody::Single(b) => &b.base,
            DlBody::Multi(b) => &b.base,
            DlBody::Range(b) => &b.base,
            DlBody::Backend(b) => &b.base,
        }
    }

    /// Description for the job record: the caller's, or a generated one.
    pub fn describe(&self, bck: &Bucket) -> String {
        match self {
            DlBody::Single(b) => b.describe(bck),
            DlBody::Multi(b) => b.describe(bck),
            DlBody::Range(b) => b.describe(bck),
            DlBody::Backend(b) => b.describe(bck),
        }
    }
}

fn caller_description(base: &DlBase) -> Option<String> {
    base.description.clone().filter(|d| !d.is_empty())
}

impl SingleBody {
    pub fn describe(&self, bck: &Bucket) -> String {
        caller_description(&self.base)
            .unwrap_or_else(|| format!("{} -> {}/{}", self.link, bck, self.object_name))
    }
}

impl MultiBody {
    pub fn describe(&self, bck: &Bucket) -> String {
        caller_description(&self.base)
            .unwrap_or_else(|| format!("multi-download -> {} ({} objects)", bck, self.objects.len()))
    }
}

impl RangeBody {
    pub fn describe(&self, bck: &Bucket) -> String {
        caller_description(&self.base)
            .unwrap_or_else(|| format!("{} -> {}/{}", self.template, bck, self.subdir))
    }
}

impl BackendBody {
    pub fn describe(&self, bck: &Bucket) -> String {
        caller_description(&self.base)
            .unwrap_or_else(|| format!("remote bucket {} (prefix: {:?})", bck, self.prefix))
    }
}

/// Parses a Go-style duration string: one or more `<int><unit>` groups with
/// units `ms`, `s`, `m`, `h`, e.g. `"1h30m"`, `"45s"`, `"500ms"`.
pub fn parse_duration(s: &str) -> Result<Duration, DlError> {
    let bad = || DlError::Validation(format!("bad duration {:?}", s));
    if s.is_empty() {
        return Err(bad());
    }
    let mut total_ms: u64 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(bad());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| bad())?;
        rest = &rest[digits..];
        let (unit_ms, len) = if rest.starts_with("ms") {
            (1, 2)
        } else if rest.starts_with('s') {
            (1_000, 1)
        } else if rest.starts_with('m') {
            (60_000, 1)
        } else if rest.starts_with('h') {
            (3_600_000, 1)
        } else {
            return Err(bad());
        };
        rest = &rest[len..];
        total_ms = total_ms.saturating_add(value.saturating_mul(unit_ms));
    }
    Ok(Duration::from_millis(total_ms))
}
