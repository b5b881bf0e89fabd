//! Ingestion pipeline: raw messages → cipher worker → pending writer.
//!
//! Two bounded queues connect three stages. Submitters push onto the
//! encryption queue; one cipher worker seals each message and forwards it
//! onto the pending queue; one writer appends to the scheduler's buffer.
//! Single consumers on both queues keep the buffer in queue order.
//!
//! # Delivery semantics
//!
//! Absorption of a batch runs in its own task. The caller waits at most
//! `submit_deadline` for it; on expiry the caller gets
//! [`PipelineError::SubmissionTimeout`] but the task and every message it
//! already queued keep going. Nothing is rolled back, so a timed-out batch
//! may still be mined in full. Callers that retry after a timeout can
//! produce duplicates.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

use msgchain_crypto::{CipherError, CipherKey};
use msgchain_types::{Clock, EncryptedMessage, Message, Timestamp};

use crate::metrics::NodeMetrics;
use crate::scheduler::MiningScheduler;
use crate::shutdown::ShutdownController;
use crate::tracing_spans::submit_span;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The deadline passed before the batch reached the pending buffer.
    /// Queued messages are still processed.
    #[error("submission timed out after {0:?}; queued messages are still being processed")]
    SubmissionTimeout(Duration),

    #[error("ingestion pipeline is shut down")]
    Closed,

    #[error("submission task failed: {0}")]
    Task(String),
}

/// Queue sizes and the caller-visible deadline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub encryption_queue_capacity: usize,
    pub pending_queue_capacity: usize,
    pub submit_deadline: Duration,
}

/// A message the cipher stage refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedMessage {
    /// Index of the message within the submitted batch.
    pub position: usize,
    pub error: CipherError,
}

/// Outcome of a batch that was fully absorbed before the deadline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmitReport {
    /// Messages now in the pending buffer (or already mined).
    pub accepted: usize,
    pub rejected: Vec<RejectedMessage>,
}

/// The encryption step of the cipher worker.
pub trait MessageSealer: Send + Sync + 'static {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

impl MessageSealer for CipherKey {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.encrypt(plaintext)
    }
}

type Ack = oneshot::Sender<Result<(), CipherError>>;

struct RawEnvelope {
    message: Message,
    ack: Ack,
}

struct SealedEnvelope {
    message: EncryptedMessage,
    ack: Ack,
}

pub struct IngestionPipeline {
    encrypt_tx: mpsc::Sender<RawEnvelope>,
    scheduler: Arc<MiningScheduler>,
    clock: Arc<dyn Clock>,
    metrics: Arc<NodeMetrics>,
    submit_deadline: Duration,
}

impl IngestionPipeline {
    /// Build the pipeline and spawn its cipher worker and pending writer.
    ///
    /// Both workers stop on shutdown; the returned handles let the owner
    /// join them.
    pub fn spawn(
        config: &PipelineConfig,
        sealer: impl MessageSealer,
        scheduler: Arc<MiningScheduler>,
        clock: Arc<dyn Clock>,
        metrics: Arc<NodeMetrics>,
        shutdown: &ShutdownController,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (encrypt_tx, encrypt_rx) = mpsc::channel(config.encryption_queue_capacity);
        let (pending_tx, pending_rx) = mpsc::channel(config.pending_queue_capacity);

        let cipher_handle = tokio::spawn(cipher_worker(
            sealer,
            encrypt_rx,
            pending_tx,
            shutdown.subscribe(),
        ));
        let writer_handle = tokio::spawn(pending_writer(
            pending_rx,
            Arc::clone(&scheduler),
            shutdown.subscribe(),
        ));

        let pipeline = Self {
            encrypt_tx,
            scheduler,
            clock,
            metrics,
            submit_deadline: config.submit_deadline,
        };
        (pipeline, vec![cipher_handle, writer_handle])
    }

    /// Stamp, encrypt and buffer a batch.
    ///
    /// Returns once every message of the batch is in the pending buffer or
    /// rejected by the cipher stage, or with `SubmissionTimeout` once the
    /// deadline passes, whichever comes first. See the module docs for what
    /// a timeout does and does not mean.
    pub async fn submit(&self, batch: Vec<Message>) -> Result<SubmitReport, PipelineError> {
        let now = self.clock.now();
        let span = submit_span(batch.len());
        let task = tokio::spawn(
            absorb(
                self.encrypt_tx.clone(),
                Arc::clone(&self.scheduler),
                Arc::clone(&self.metrics),
                batch,
                now,
            )
            .instrument(span),
        );

        match tokio::time::timeout(self.submit_deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(PipelineError::Task(join_error.to_string())),
            Err(_) => {
                self.metrics.submission_timeouts.inc();
                tracing::warn!(
                    deadline_ms = self.submit_deadline.as_millis() as u64,
                    "submission timed out, batch continues in background"
                );
                Err(PipelineError::SubmissionTimeout(self.submit_deadline))
            }
        }
    }

    pub fn submit_deadline(&self) -> Duration {
        self.submit_deadline
    }
}

async fn absorb(
    encrypt_tx: mpsc::Sender<RawEnvelope>,
    scheduler: Arc<MiningScheduler>,
    metrics: Arc<NodeMetrics>,
    batch: Vec<Message>,
    now: Timestamp,
) -> Result<SubmitReport, PipelineError> {
    let mut acks = Vec::with_capacity(batch.len());

    for message in batch {
        let (ack, ack_rx) = oneshot::channel();
        let envelope = RawEnvelope {
            message: message.stamped(now),
            ack,
        };
        match encrypt_tx.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(envelope)) => {
                tracing::debug!("encryption queue full, forcing a mining pass");
                scheduler.mine().await;
                encrypt_tx
                    .send(envelope)
                    .await
                    .map_err(|_| PipelineError::Closed)?;
            }
            Err(TrySendError::Closed(_)) => return Err(PipelineError::Closed),
        }
        acks.push(ack_rx);
    }

    let mut report = SubmitReport::default();
    for (position, ack_rx) in acks.into_iter().enumerate() {
        match ack_rx.await {
            Ok(Ok(())) => {
                report.accepted += 1;
                metrics.messages_accepted.inc();
            }
            Ok(Err(error)) => {
                metrics.messages_rejected.inc();
                report.rejected.push(RejectedMessage { position, error });
            }
            Err(_) => return Err(PipelineError::Closed),
        }
    }

    tracing::debug!(
        accepted = report.accepted,
        rejected = report.rejected.len(),
        "batch absorbed"
    );
    Ok(report)
}

async fn cipher_worker<S: MessageSealer>(
    sealer: S,
    mut encrypt_rx: mpsc::Receiver<RawEnvelope>,
    pending_tx: mpsc::Sender<SealedEnvelope>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        let envelope = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                tracing::debug!("cipher worker shutting down");
                break;
            }
            envelope = encrypt_rx.recv() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let RawEnvelope { message, ack } = envelope;
        match sealer.seal(&message.sealing_plaintext()) {
            Ok(ciphertext) => {
                let sealed = SealedEnvelope {
                    message: EncryptedMessage::seal(message, ciphertext),
                    ack,
                };
                if pending_tx.send(sealed).await.is_err() {
                    tracing::debug!("pending writer gone, cipher worker exiting");
                    break;
                }
            }
            Err(error) => {
                tracing::warn!(
                    sender = %message.sender,
                    receiver = %message.receiver,
                    %error,
                    "message rejected by cipher stage"
                );
                let _ = ack.send(Err(error));
            }
        }
    }
}

async fn pending_writer(
    mut pending_rx: mpsc::Receiver<SealedEnvelope>,
    scheduler: Arc<MiningScheduler>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        let sealed = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                tracing::debug!("pending writer shutting down");
                break;
            }
            sealed = pending_rx.recv() => match sealed {
                Some(sealed) => sealed,
                None => break,
            },
        };

        scheduler.enqueue(sealed.message).await;
        let _ = sealed.ack.send(Ok(()));
    }
}
