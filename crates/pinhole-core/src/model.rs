use serde::{Deserialize, Serialize};

/// A stored shortened-URL record.
///
/// Records are soft-deleted: `deleted` flips to `true` and the record stays
/// in place as a tombstone, so resolvers can tell "never existed" apart
/// from "existed and was removed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Short code, the unique key of the record.
    pub id: String,
    /// Original URL the short code resolves to.
    pub url: String,
    /// Owner of the record, assigned once at creation.
    #[serde(rename = "userid")]
    pub user_id: String,
    /// Tombstone flag.
    #[serde(default)]
    pub deleted: bool,
}

impl UrlRecord {
    /// Creates a live record owned by `user_id`.
    pub fn new(id: impl Into<String>, url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            user_id: user_id.into(),
            deleted: false,
        }
    }

    /// Rewrites `id` as a full short URL under `base_url`.
    ///
    /// Exactly one separating `/` is produced whether or not `base_url`
    /// carries a trailing slash.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.id = format!("{}/{}", base_url.trim_end_matches('/'), self.id);
        self
    }
}

/// One user's request to soft-delete a set of their records.
///
/// Produced by a delete call and consumed exactly once by the background
/// sweeper; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDeleteRequest {
    pub user_id: String,
    pub ids: Vec<String>,
}

impl BatchDeleteRequest {
    pub fn new(user_id: impl Into<String>, ids: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ids,
        }
    }
}

/// Aggregate counts over the whole store, computed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Total number of records, tombstones included.
    pub urls: i64,
    /// Number of distinct record owners.
    pub users: i64,
}
