use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use pinhole_core::{Result, Stats, Storage, StorageError, UrlRecord};

/// In-memory implementation of the storage contract using DashMap.
///
/// DashMap provides better concurrency than RwLock<HashMap> because it
/// uses sharded locks, allowing concurrent reads and writes to different
/// buckets without blocking.
///
/// Two maps are kept: `by_id` is authoritative, `by_user` is an index of
/// copies appended at insert time. The copies are never updated when a
/// record is tombstoned, so every read that goes through `by_user`
/// re-validates against `by_id` before returning anything. Guards on one
/// map are always dropped before the other map is touched.
///
/// Everything lives on the heap of one process; a restart loses all
/// records.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    by_id: DashMap<String, UrlRecord>,
    by_user: DashMap<String, Vec<UrlRecord>>,
}

impl InMemoryStorage {
    /// Creates an empty in-memory engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty engine sized for `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            by_id: DashMap::with_capacity(capacity),
            by_user: DashMap::new(),
        }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn put(&self, record: UrlRecord) -> Result<()> {
        let mut inserted = false;
        self.by_id
            .entry(record.id.clone())
            .or_insert_with(|| {
                inserted = true;
                record.clone()
            });

        // First writer wins: a re-put of a known id changes nothing, so the
        // user index is only appended for the insert that actually landed.
        if inserted {
            self.by_user
                .entry(record.user_id.clone())
                .or_default()
                .push(record);
        }
        Ok(())
    }

    async fn put_batch(&self, records: Vec<UrlRecord>) -> Result<()> {
        for record in records {
            self.put(record).await?;
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<String> {
        match self.by_id.get(id) {
            Some(record) if record.deleted => Err(StorageError::Gone(id.to_string())),
            Some(record) => Ok(record.url.clone()),
            None => Err(StorageError::NotFound(id.to_string())),
        }
    }

    async fn list_user_urls(&self, base_url: &str, user_id: &str) -> Result<Vec<UrlRecord>> {
        // Copy out of the index first so no by_user guard is held while
        // by_id is consulted.
        let candidates: Vec<UrlRecord> = match self.by_user.get(user_id) {
            Some(records) => records.clone(),
            None => return Err(StorageError::NotFound(format!("no URLs for user {user_id}"))),
        };

        let mut records = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            // by_id is authoritative for tombstones; the index copy is not.
            if let Some(current) = self.by_id.get(&candidate.id) {
                if !current.deleted {
                    records.push(current.clone().with_base_url(base_url));
                }
            }
        }

        if records.is_empty() {
            return Err(StorageError::NotFound(format!("no URLs for user {user_id}")));
        }
        Ok(records)
    }

    async fn delete_user_urls(&self, ids: &[String], user_id: &str) -> Result<()> {
        for id in ids {
            if let Some(mut record) = self.by_id.get_mut(id) {
                if record.user_id == user_id && !record.deleted {
                    record.deleted = true;
                }
            }
        }
        Ok(())
    }

    async fn stats(&self) -> Result<Stats> {
        let mut owners = HashSet::new();
        for record in self.by_id.iter() {
            owners.insert(record.user_id.clone());
        }

        Ok(Stats {
            urls: self.by_id.len() as i64,
            users: owners.len() as i64,
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
