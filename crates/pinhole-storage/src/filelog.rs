use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pinhole_core::{Result, Stats, Storage, StorageError, UrlRecord};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tracing::debug;

/// Append-only file-log implementation of the storage contract.
///
/// Durable state is a single log of JSON-encoded records, one per line,
/// in append order. A put appends a line and fsyncs it before the call
/// returns, so an acknowledged record survives a crash. Reads scan the
/// whole file through a fresh handle, so their cost grows with the size
/// of the log.
///
/// Deletion cannot happen in place on an append-only file. The log is
/// rewritten through a sibling temp file that is fsynced and atomically
/// renamed over the original, see [`FileLogStorage::compact`] for the
/// same mechanism used as maintenance.
///
/// One async mutex serializes every operation, including the whole
/// scan-then-rewrite sequence in delete, so readers never observe a
/// half-rewritten log.
#[derive(Debug)]
pub struct FileLogStorage {
    path: PathBuf,
    inner: Mutex<LogFile>,
}

#[derive(Debug)]
struct LogFile {
    appender: File,
}

impl FileLogStorage {
    /// Opens the log at `path`, creating an empty one if missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let appender = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(map_io_error)?;

        Ok(Self {
            path,
            inner: Mutex::new(LogFile { appender }),
        })
    }

    /// Returns the path of the backing log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the log without tombstoned records.
    ///
    /// Compaction physically drops soft-deleted records, so their ids read
    /// as `NotFound` afterwards instead of `Gone`.
    pub async fn compact(&self) -> Result<()> {
        let mut log = self.inner.lock().await;

        let records = self.read_all().await?;
        let live: Vec<UrlRecord> = records.into_iter().filter(|r| !r.deleted).collect();
        self.rewrite(&mut log, &live).await?;

        debug!(remaining = live.len(), "compacted log");
        Ok(())
    }

    /// Reads every record in the log, in append order. Callers hold the
    /// engine lock.
    async fn read_all(&self) -> Result<Vec<UrlRecord>> {
        let file = File::open(&self.path).await.map_err(map_io_error)?;
        let mut lines = BufReader::new(file).lines();

        let mut records = Vec::new();
        while let Some(line) = lines.next_line().await.map_err(map_io_error)? {
            if line.is_empty() {
                continue;
            }
            // A line that does not parse, including one torn by a crash
            // mid-append, makes the log unreadable rather than silently
            // shrinking it.
            let record = serde_json::from_str(&line).map_err(map_json_error)?;
            records.push(record);
        }
        Ok(records)
    }

    async fn append_record(log: &mut LogFile, record: &UrlRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record).map_err(map_json_error)?;
        line.push(b'\n');

        log.appender.write_all(&line).await.map_err(map_io_error)?;
        // Durability before acknowledgment.
        log.appender.sync_all().await.map_err(map_io_error)?;
        Ok(())
    }

    /// Replaces the log's contents through a sibling temp file and an
    /// atomic rename, then re-points the append handle at the new file.
    ///
    /// The rename is the commit point: a crash before it leaves the old
    /// log untouched, a crash after it leaves the fully rewritten one. No
    /// in-between state is ever on disk.
    async fn rewrite(&self, log: &mut LogFile, records: &[UrlRecord]) -> Result<()> {
        let tmp_path = rewrite_path(&self.path);

        let tmp = File::create(&tmp_path).await.map_err(map_io_error)?;
        let mut writer = BufWriter::new(tmp);
        for record in records {
            let mut line = serde_json::to_vec(record).map_err(map_json_error)?;
            line.push(b'\n');
            writer.write_all(&line).await.map_err(map_io_error)?;
        }
        writer.flush().await.map_err(map_io_error)?;
        writer.get_ref().sync_all().await.map_err(map_io_error)?;

        fs::rename(&tmp_path, &self.path).await.map_err(map_io_error)?;

        // The old append handle still points at the renamed-away inode.
        log.appender = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(map_io_error)?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FileLogStorage {
    async fn put(&self, record: UrlRecord) -> Result<()> {
        let mut log = self.inner.lock().await;
        Self::append_record(&mut log, &record).await
    }

    async fn put_batch(&self, records: Vec<UrlRecord>) -> Result<()> {
        let mut log = self.inner.lock().await;
        for record in &records {
            // Stops at the first failure; earlier records stay appended.
            Self::append_record(&mut log, record).await?;
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<String> {
        let _log = self.inner.lock().await;

        // Duplicate-id lines can exist because put appends unconditionally;
        // the earliest line is the authoritative record.
        for record in self.read_all().await? {
            if record.id == id {
                if record.deleted {
                    return Err(StorageError::Gone(id.to_string()));
                }
                return Ok(record.url);
            }
        }
        Err(StorageError::NotFound(id.to_string()))
    }

    async fn list_user_urls(&self, base_url: &str, user_id: &str) -> Result<Vec<UrlRecord>> {
        let _log = self.inner.lock().await;

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for record in self.read_all().await? {
            if !seen.insert(record.id.clone()) {
                continue;
            }
            if record.user_id == user_id && !record.deleted {
                records.push(record.with_base_url(base_url));
            }
        }

        if records.is_empty() {
            return Err(StorageError::NotFound(format!("no URLs for user {user_id}")));
        }
        Ok(records)
    }

    async fn delete_user_urls(&self, ids: &[String], user_id: &str) -> Result<()> {
        let mut log = self.inner.lock().await;

        let mut records = self.read_all().await?;
        let mut tombstoned = 0usize;
        for record in &mut records {
            if record.user_id == user_id && !record.deleted && ids.contains(&record.id) {
                record.deleted = true;
                tombstoned += 1;
            }
        }

        // Nothing matched; skipping the rewrite keeps re-deletes cheap.
        if tombstoned == 0 {
            return Ok(());
        }

        self.rewrite(&mut log, &records).await?;
        debug!(user_id, tombstoned, "rewrote log with tombstones");
        Ok(())
    }

    async fn stats(&self) -> Result<Stats> {
        let _log = self.inner.lock().await;

        let mut ids = HashSet::new();
        let mut owners = HashSet::new();
        for record in self.read_all().await? {
            // Duplicate lines describe one record; tombstones still count.
            if ids.insert(record.id) {
                owners.insert(record.user_id);
            }
        }

        Ok(Stats {
            urls: ids.len() as i64,
            users: owners.len() as i64,
        })
    }

    async fn ping(&self) -> Result<()> {
        fs::metadata(&self.path).await.map_err(map_io_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let log = self.inner.lock().await;
        log.appender.sync_all().await.map_err(map_io_error)?;
        Ok(())
    }
}

fn rewrite_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".rewrite");
    PathBuf::from(tmp)
}

fn map_io_error(err: std::io::Error) -> StorageError {
    StorageError::Io(err.to_string())
}

fn map_json_error(err: serde_json::Error) -> StorageError {
    StorageError::Serialization(err.to_string())
}
