use pinhole_core::BatchDeleteRequest;
use tokio::sync::mpsc;
use tracing::warn;

/// Producer handle for the sweeper's input queue.
///
/// `enqueue` is fire-and-forget: the channel is unbounded, so the request
/// path never blocks on the sweeper, and no outcome flows back to the
/// caller. Requests handed in after the sweeper has stopped are logged
/// and dropped.
#[derive(Debug, Clone)]
pub struct DeleteQueue {
    tx: mpsc::UnboundedSender<BatchDeleteRequest>,
}

impl DeleteQueue {
    pub(crate) fn new(tx: mpsc::UnboundedSender<BatchDeleteRequest>) -> Self {
        Self { tx }
    }

    /// Hands one delete request to the sweeper.
    pub fn enqueue(&self, request: BatchDeleteRequest) {
        if let Err(err) = self.tx.send(request) {
            warn!(user_id = %err.0.user_id, "sweeper stopped, delete request dropped");
        }
    }
}
