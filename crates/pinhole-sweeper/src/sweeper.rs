use std::sync::Arc;

use pinhole_core::{BatchDeleteRequest, Storage};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error};

use crate::config::SweeperConfig;
use crate::queue::DeleteQueue;

/// Background batch-delete processor.
///
/// The sweeper drains the delete queue into an accumulator and flushes it
/// when `batch_size` requests have piled up or on the periodic tick,
/// whichever comes first. A flush issues one concurrent
/// `delete_user_urls` call per accumulated request and waits for all of
/// them; per-request failures are logged and swallowed, because the
/// producing API call was answered long before the sweeper ran.
///
/// Shutdown performs no final flush: requests still accumulated or queued
/// when the signal arrives are dropped. Delivery is at-most-once.
pub struct Sweeper;

impl Sweeper {
    /// Spawns the processor over `storage`, returning the producer queue
    /// and the handle that stops it.
    pub fn spawn(storage: Arc<dyn Storage>, config: SweeperConfig) -> (DeleteQueue, SweeperHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(storage, config, rx, shutdown_rx));

        (
            DeleteQueue::new(tx),
            SweeperHandle {
                shutdown: shutdown_tx,
                task,
            },
        )
    }
}

/// Stops the sweeper. Dropping the handle without calling
/// [`SweeperHandle::shutdown`] stops the loop the same way, minus the
/// join.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals shutdown and waits for the loop to exit.
    ///
    /// An in-flight flush completes first; anything accumulated but not
    /// yet flushed is dropped.
    pub async fn shutdown(self) {
        // The receiver is already gone if the loop exited on queue closure.
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "sweeper task failed to join");
        }
    }
}

async fn run(
    storage: Arc<dyn Storage>,
    config: SweeperConfig,
    mut requests: mpsc::UnboundedReceiver<BatchDeleteRequest>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut batch: Vec<BatchDeleteRequest> = Vec::new();
    let mut ticker = tokio::time::interval(config.flush_interval);

    loop {
        tokio::select! {
            // Fires on the signal or when the handle is dropped.
            _ = shutdown.changed() => {
                debug!(dropped = batch.len(), "sweeper shutting down");
                return;
            }
            request = requests.recv() => match request {
                Some(request) => {
                    batch.push(request);
                    if batch.len() >= config.batch_size {
                        flush(&storage, &mut batch).await;
                    }
                }
                None => {
                    // Every producer handle is gone; pending requests are
                    // dropped just as on an explicit shutdown.
                    debug!(dropped = batch.len(), "delete queue closed");
                    return;
                }
            },
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush(&storage, &mut batch).await;
                }
            }
        }
    }
}

/// Issues one delete per accumulated request, concurrently, and waits for
/// every one of them before returning.
async fn flush(storage: &Arc<dyn Storage>, batch: &mut Vec<BatchDeleteRequest>) {
    debug!(requests = batch.len(), "flushing delete batch");

    let mut deletes = JoinSet::new();
    for request in batch.drain(..) {
        let storage = Arc::clone(storage);
        deletes.spawn(async move {
            if let Err(err) = storage
                .delete_user_urls(&request.ids, &request.user_id)
                .await
            {
                // The producer was already answered; the failure ends here.
                error!(user_id = %request.user_id, error = %err, "batch delete failed");
            }
        });
    }

    while let Some(joined) = deletes.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "delete task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use pinhole_core::{Result, Stats, StorageError, UrlRecord};
    use pinhole_storage::InMemoryStorage;

    use super::*;

    /// Storage double that records delete calls; other operations are
    /// inert.
    #[derive(Default)]
    struct RecordingStorage {
        deletes: Mutex<Vec<(String, Vec<String>)>>,
        fail: bool,
    }

    impl RecordingStorage {
        fn new() -> Self {
            Self::default()
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn delete_count(&self) -> usize {
            self.deletes.lock().unwrap().len()
        }

        fn deletes(&self) -> Vec<(String, Vec<String>)> {
            self.deletes.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Storage for RecordingStorage {
        async fn put(&self, _record: UrlRecord) -> Result<()> {
            Ok(())
        }

        async fn put_batch(&self, _records: Vec<UrlRecord>) -> Result<()> {
            Ok(())
        }

        async fn get(&self, id: &str) -> Result<String> {
            Err(StorageError::NotFound(id.to_string()))
        }

        async fn list_user_urls(&self, _base_url: &str, user_id: &str) -> Result<Vec<UrlRecord>> {
            Err(StorageError::NotFound(user_id.to_string()))
        }

        async fn delete_user_urls(&self, ids: &[String], user_id: &str) -> Result<()> {
            self.deletes
                .lock()
                .unwrap()
                .push((user_id.to_string(), ids.to_vec()));
            if self.fail {
                return Err(StorageError::Query("injected failure".into()));
            }
            Ok(())
        }

        async fn stats(&self) -> Result<Stats> {
            Ok(Stats { urls: 0, users: 0 })
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn request(user_id: &str, ids: &[&str]) -> BatchDeleteRequest {
        BatchDeleteRequest::new(user_id, ids.iter().map(|s| s.to_string()).collect())
    }

    async fn wait_for_deletes(storage: &RecordingStorage, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while storage.delete_count() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for the sweeper to flush");
    }

    /// Interval long enough that only the size threshold can trigger a
    /// flush within a test run.
    fn size_only_config(batch_size: usize) -> SweeperConfig {
        SweeperConfig::builder()
            .batch_size(batch_size)
            .flush_interval(Duration::from_secs(3600))
            .build()
    }

    #[tokio::test]
    async fn reaching_batch_size_flushes_immediately() {
        let storage = Arc::new(RecordingStorage::new());
        let (queue, handle) = Sweeper::spawn(storage.clone(), size_only_config(3));

        for i in 0..3 {
            queue.enqueue(request(&format!("user-{i}"), &["abc12345"]));
        }

        wait_for_deletes(&storage, 3).await;
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn timer_flushes_partial_batches() {
        let storage = Arc::new(RecordingStorage::new());
        let config = SweeperConfig::builder()
            .batch_size(100)
            .flush_interval(Duration::from_millis(25))
            .build();
        let (queue, handle) = Sweeper::spawn(storage.clone(), config);

        queue.enqueue(request("user-1", &["abc12345", "def67890"]));

        wait_for_deletes(&storage, 1).await;
        let deletes = storage.deletes();
        assert_eq!(deletes[0].0, "user-1");
        assert_eq!(deletes[0].1, vec!["abc12345", "def67890"]);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn each_request_becomes_one_delete_call() {
        let storage = Arc::new(RecordingStorage::new());
        let (queue, handle) = Sweeper::spawn(storage.clone(), size_only_config(3));

        queue.enqueue(request("user-1", &["abc12345"]));
        queue.enqueue(request("user-2", &["def67890"]));
        queue.enqueue(request("user-3", &["ghi13579"]));

        wait_for_deletes(&storage, 3).await;

        // Flush order is unspecified, the per-user grouping is not.
        let mut users: Vec<String> = storage.deletes().into_iter().map(|(user, _)| user).collect();
        users.sort();
        assert_eq!(users, vec!["user-1", "user-2", "user-3"]);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn requests_above_the_threshold_wait_for_the_next_flush() {
        let storage = Arc::new(RecordingStorage::new());
        let (queue, handle) = Sweeper::spawn(storage.clone(), size_only_config(3));

        for i in 0..4 {
            queue.enqueue(request(&format!("user-{i}"), &["abc12345"]));
        }

        wait_for_deletes(&storage, 3).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(storage.delete_count(), 3);

        // Shutdown drops the overflow request rather than flushing it.
        handle.shutdown().await;
        assert_eq!(storage.delete_count(), 3);
    }

    #[tokio::test]
    async fn shutdown_drops_accumulated_requests() {
        let storage = Arc::new(RecordingStorage::new());
        let (queue, handle) = Sweeper::spawn(storage.clone(), size_only_config(100));

        queue.enqueue(request("user-1", &["abc12345"]));
        queue.enqueue(request("user-2", &["def67890"]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        handle.shutdown().await;
        assert_eq!(storage.delete_count(), 0);
    }

    #[tokio::test]
    async fn delete_failures_do_not_stop_the_sweeper() {
        let storage = Arc::new(RecordingStorage::failing());
        let config = SweeperConfig::builder()
            .batch_size(100)
            .flush_interval(Duration::from_millis(25))
            .build();
        let (queue, handle) = Sweeper::spawn(storage.clone(), config);

        queue.enqueue(request("user-1", &["abc12345"]));
        wait_for_deletes(&storage, 1).await;

        // The failed flush must not have killed the loop.
        queue.enqueue(request("user-2", &["def67890"]));
        wait_for_deletes(&storage, 2).await;

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_is_dropped() {
        let storage = Arc::new(RecordingStorage::new());
        let (queue, handle) = Sweeper::spawn(storage.clone(), size_only_config(1));

        handle.shutdown().await;
        queue.enqueue(request("user-1", &["abc12345"]));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(storage.delete_count(), 0);
    }

    #[tokio::test]
    async fn tombstones_reach_the_memory_engine() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        storage
            .put(UrlRecord::new("abc12345", "https://example.com/a", "user-1"))
            .await
            .unwrap();

        let config = SweeperConfig::builder()
            .batch_size(100)
            .flush_interval(Duration::from_millis(25))
            .build();
        let (queue, handle) = Sweeper::spawn(storage.clone(), config);

        queue.enqueue(request("user-1", &["abc12345"]));

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match storage.get("abc12345").await {
                    Err(StorageError::Gone(_)) => break,
                    _ => tokio::time::sleep(Duration::from_millis(10)).await,
                }
            }
        })
        .await
        .expect("timed out waiting for the tombstone");

        let err = storage
            .list_user_urls("http://localhost:8080", "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        handle.shutdown().await;
    }
}
