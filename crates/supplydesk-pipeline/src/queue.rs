//! Bounded hand-off from the gateway to the extraction worker.
//!
//! One consumer task owns the receiving end, so submissions are extracted
//! one at a time in arrival order. Anything that cannot be queued is picked
//! up later by the pending-dispatch sweep or the recovery sweep.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::context::PipelineContext;
use crate::worker::{self, ProcessOutcome};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("extraction queue is full")]
    Full,
    #[error("extraction queue is closed")]
    Closed,
}

/// Sending half of the extraction queue.
#[derive(Debug, Clone)]
pub struct ExtractionQueue {
    sender: mpsc::Sender<i64>,
}

/// Creates the queue and the receiver to hand to [`spawn_extraction_consumer`].
#[must_use]
pub fn extraction_queue(capacity: usize) -> (ExtractionQueue, mpsc::Receiver<i64>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ExtractionQueue { sender }, receiver)
}

impl ExtractionQueue {
    /// Queues a submission without waiting for capacity.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] when the queue is at capacity, or
    /// [`QueueError::Closed`] when the consumer has stopped.
    pub fn enqueue(&self, submission_id: i64) -> Result<(), QueueError> {
        self.sender.try_send(submission_id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

/// Spawns the single consumer that runs extraction for queued submissions.
///
/// The task ends when every [`ExtractionQueue`] handle has been dropped.
pub fn spawn_extraction_consumer(
    ctx: PipelineContext,
    mut receiver: mpsc::Receiver<i64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(submission_id) = receiver.recv().await {
            match worker::process(&ctx, submission_id).await {
                Ok(ProcessOutcome::Completed(summary)) => tracing::info!(
                    submission_id,
                    products = summary.products,
                    auto_approved = summary.auto_approved,
                    pending_review = summary.pending_review,
                    held = summary.held,
                    "extraction completed"
                ),
                Ok(ProcessOutcome::Failed { error }) => {
                    tracing::warn!(submission_id, error = %error, "extraction failed; queued for recovery");
                }
                Ok(ProcessOutcome::Superseded) => {
                    tracing::info!(submission_id, "extraction result superseded");
                }
                Err(e) => {
                    // Already claimed by another path (manual process, recovery).
                    tracing::debug!(submission_id, error = %e, "skipping queued submission");
                }
            }
        }
        tracing::info!("extraction queue closed; consumer stopping");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_reports_full_queue() {
        let (queue, _receiver) = extraction_queue(1);
        assert_eq!(queue.enqueue(1), Ok(()));
        assert_eq!(queue.enqueue(2), Err(QueueError::Full));
    }

    #[tokio::test]
    async fn enqueue_reports_closed_queue() {
        let (queue, receiver) = extraction_queue(4);
        drop(receiver);
        assert_eq!(queue.enqueue(1), Err(QueueError::Closed));
    }
}
