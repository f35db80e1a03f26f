//! Bucket identity: name plus backend provider.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend provider bound to a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Native bucket, no remote backend.
    Ais,
    #[serde(rename = "aws")]
    Amazon,
    Gcp,
    Azure,
    /// Ad-hoc HTTP(S) backend.
    Http,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Ais => "ais",
            Provider::Amazon => "aws",
            Provider::Gcp => "gcp",
            Provider::Azure => "azure",
            Provider::Http => "ht",
        }
    }
}

/// Bucket identifier `(name, provider)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub provider: Provider,
}

impl Bucket {
    pub fn new(name: impl Into<String>, provider: Provider) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }

    /// True when the bucket has an external backend (anything but native).
    pub fn is_remote(&self) -> bool {
        self.provider != Provider::Ais
    }

    /// True when the backend is ad-hoc HTTP.
    pub fn is_http(&self) -> bool {
        self.provider == Provider::Http
    }

    /// Unique name used for hashing and log lines, e.g. `aws/imagenet`.
    pub fn uname(&self) -> String {
        format!("{}/{}", self.provider.as_str(), self.name)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uname())
    }
}
