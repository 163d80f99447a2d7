use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Stats, UrlRecord};

/// Contract implemented by every storage engine.
///
/// Exactly one engine backs a running process; callers hold it as
/// `Arc<dyn Storage>` and never branch on the concrete backend. Engines
/// differ in durability and scaling, never in operation semantics.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stores one record under its `id`.
    ///
    /// Re-putting an existing `id` leaves the stored `url`, `user_id`, and
    /// `deleted` state untouched: the first writer of an `id` wins, and a
    /// `put` can never resurrect a tombstoned record.
    async fn put(&self, record: UrlRecord) -> Result<()>;

    /// Stores several records as one unit.
    ///
    /// Atomic on the relational engine; the in-memory and file-log engines
    /// apply records in order and stop at the first failure without
    /// undoing earlier ones.
    async fn put_batch(&self, records: Vec<UrlRecord>) -> Result<()>;

    /// Resolves `id` to its original URL.
    ///
    /// Returns `Err(NotFound)` for an unknown `id` and `Err(Gone)` for a
    /// tombstoned one; the URL of a deleted record is never handed out.
    async fn get(&self, id: &str) -> Result<String>;

    /// Lists the user's live records, each `id` rewritten as
    /// `base_url + "/" + id`.
    ///
    /// Returns `Err(NotFound)` when the user owns no live records, so
    /// callers can distinguish an empty result from a transport failure.
    async fn list_user_urls(&self, base_url: &str, user_id: &str) -> Result<Vec<UrlRecord>>;

    /// Tombstones the user's matching live records.
    ///
    /// Ids that do not exist, belong to someone else, or are already
    /// deleted are skipped silently; repeating the call is harmless.
    async fn delete_user_urls(&self, ids: &[String], user_id: &str) -> Result<()>;

    /// Aggregate counts over all records, tombstones included.
    async fn stats(&self) -> Result<Stats>;

    /// Liveness probe against the backing medium.
    async fn ping(&self) -> Result<()>;

    /// Flushes and releases engine resources.
    ///
    /// Called once at shutdown; no earlier operation depends on it.
    async fn close(&self) -> Result<()>;
}
