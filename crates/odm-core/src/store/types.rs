//! Types used by the job store.

use crate::record::JobInfo;

/// Listing filter for [`super::JobStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFilter {
    All,
    /// Jobs that have not finished yet.
    Active,
    /// Jobs whose id starts with the given prefix.
    ByIdPrefix(String),
}

impl JobFilter {
    pub(crate) fn matches(&self, info: &JobInfo) -> bool {
        match self {
            JobFilter::All => true,
            JobFilter::Active => info.is_running(),
            JobFilter::ByIdPrefix(prefix) => info.id.starts_with(prefix.as_str()),
        }
    }
}

/// One recorded per-object download failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjErr {
    pub obj_name: String,
    pub message: String,
    pub recorded_at: i64,
}
