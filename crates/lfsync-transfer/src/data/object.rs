use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use lfsync_store::Oid;
use serde::{Deserialize, Serialize};

/// Actions are treated as expired this long before the server's deadline,
/// so a transfer is not started on a link about to lapse.
const EXPIRY_SKEW_SECS: i64 = 5;

/// Which way a batch moves bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local store to remote.
    Upload,
    /// Remote to local store.
    Download,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upload => "upload",
            Direction::Download => "download",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Object identity as sent to the batch endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub oid:  Oid,
    pub size: u64,
}

/// A time-limited link granted by the remote for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub href:       String,
    #[serde(default, rename = "header", skip_serializing_if = "BTreeMap::is_empty")]
    pub headers:    BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Action {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href:       href.into(),
            headers:    BTreeMap::new(),
            expires_at: None,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|deadline| now + TimeDelta::seconds(EXPIRY_SKEW_SECS) >= deadline)
    }

    pub fn is_expired(&self) -> bool { self.is_expired_at(Utc::now()) }
}

/// Server-asserted metadata for one object, with the actions it granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectResource {
    pub oid:     Oid,
    pub size:    u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<String, Action>,
}

impl ObjectResource {
    pub fn new(oid: Oid, size: u64) -> Self {
        Self {
            oid,
            size,
            actions: BTreeMap::new(),
        }
    }

    pub fn with_action(mut self, name: impl Into<String>, action: Action) -> Self {
        self.actions.insert(name.into(), action);
        self
    }

    pub fn action(&self, name: &str) -> Option<&Action> { self.actions.get(name) }
}

/// Per-object rejection reported inside an otherwise successful batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObjectError {
    pub code:    u16,
    pub message: String,
}

/// Result of one batch negotiation, keyed by object.
pub type Authorization = HashMap<Oid, Result<ObjectResource, RemoteObjectError>>;
