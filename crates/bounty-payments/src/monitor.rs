//! Confirmation polling for submitted transactions.
//!
//! [`ConfirmationMonitor::spawn`] starts a tokio task that polls
//! [`ChainClient::get_transaction_status`] until the transaction reaches the
//! confirmation threshold, reverts, or the deadline passes. The returned
//! [`MonitorHandle`] streams progress and the final [`MonitorOutcome`], and
//! can be cancelled at any time.

use crate::chains::{resolve_confirmations, ChainClient};
use crate::config::MonitorConfig;
use crate::error::PaymentError;
use crate::types::{ConfirmationStatus, TransactionReference};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

/// How a monitoring run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// Threshold reached.
    Confirmed(ConfirmationStatus),
    /// Receipt reported failure.
    Reverted(ConfirmationStatus),
    /// Deadline passed first.
    TimedOut {
        elapsed: Duration,
        polls: u32,
        last_error: Option<PaymentError>,
    },
    /// Stopped through a [`MonitorCancel`].
    Cancelled,
}

/// Item yielded by [`MonitorHandle::next_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A successful poll, with the confirmation count filled in.
    Progress(ConfirmationStatus),
    Finished(MonitorOutcome),
}

/// Cloneable cancellation handle. Cancelling more than once is a no-op.
#[derive(Debug, Clone)]
pub struct MonitorCancel {
    signal: Arc<watch::Sender<bool>>,
}

impl MonitorCancel {
    pub fn cancel(&self) {
        if !self.signal.send_replace(true) {
            debug!("Confirmation monitor cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
    }
}

/// Owner side of a running monitor. Dropping it cancels the task.
pub struct MonitorHandle {
    cancel: MonitorCancel,
    progress: mpsc::UnboundedReceiver<ConfirmationStatus>,
    task: JoinHandle<MonitorOutcome>,
    finished: bool,
}

impl MonitorHandle {
    pub fn canceller(&self) -> MonitorCancel {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next progress update or the final outcome. Progress queued before the
    /// task ended is always delivered first. Returns `None` once the outcome
    /// has been taken.
    pub async fn next_event(&mut self) -> Option<MonitorEvent> {
        if self.finished {
            return None;
        }

        tokio::select! {
            biased;
            Some(status) = self.progress.recv() => Some(MonitorEvent::Progress(status)),
            joined = &mut self.task => {
                self.finished = true;
                let outcome = joined.unwrap_or_else(|e| {
                    if !e.is_cancelled() {
                        warn!("Confirmation monitor task failed: {}", e);
                    }
                    MonitorOutcome::Cancelled
                });
                Some(MonitorEvent::Finished(outcome))
            }
        }
    }

    /// Skip progress and wait for the outcome.
    pub async fn wait(mut self) -> MonitorOutcome {
        while let Some(event) = self.next_event().await {
            if let MonitorEvent::Finished(outcome) = event {
                return outcome;
            }
        }
        MonitorOutcome::Cancelled
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawns confirmation polling tasks against a chain client.
#[derive(Clone)]
pub struct ConfirmationMonitor {
    client: Arc<dyn ChainClient>,
    config: MonitorConfig,
}

impl ConfirmationMonitor {
    pub fn new(client: Arc<dyn ChainClient>, config: MonitorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Start monitoring `tx` on a background task.
    pub fn spawn(&self, tx: TransactionReference) -> MonitorHandle {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let config = self.config.clone();

        info!(
            "Monitoring {} (threshold={}, interval={:?}, timeout={:?})",
            tx, config.confirmations, config.poll_interval, config.timeout
        );

        let task = tokio::spawn(async move {
            let label = tx.clone();
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => {
                    debug!("Monitor for {} stopped by cancellation", label);
                    MonitorOutcome::Cancelled
                }
                outcome = poll_until_settled(client, config, tx, progress_tx) => outcome,
            }
        });

        MonitorHandle {
            cancel: MonitorCancel {
                signal: Arc::new(cancel_tx),
            },
            progress: progress_rx,
            task,
            finished: false,
        }
    }
}

/// Resolves once cancellation is signalled or every sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn poll_once(
    client: &dyn ChainClient,
    tx: &TransactionReference,
) -> Result<ConfirmationStatus, PaymentError> {
    let status = client.get_transaction_status(tx).await?;
    if status.reverted {
        return Ok(status);
    }
    resolve_confirmations(client, status).await
}

async fn poll_until_settled(
    client: Arc<dyn ChainClient>,
    config: MonitorConfig,
    tx: TransactionReference,
    progress: mpsc::UnboundedSender<ConfirmationStatus>,
) -> MonitorOutcome {
    let started = Instant::now();
    let deadline = started + config.timeout;
    let mut highest = 0u64;
    let mut polls = 0u32;
    let mut last_error: Option<PaymentError> = None;

    loop {
        if Instant::now() >= deadline {
            break;
        }

        polls += 1;
        match timeout_at(deadline, poll_once(client.as_ref(), &tx)).await {
            Err(_) => break,
            Ok(Ok(mut status)) => {
                if status.reverted {
                    warn!("Transaction {} reverted", tx);
                    return MonitorOutcome::Reverted(status);
                }

                let reported = status.confirmation_count.unwrap_or(0);
                if reported < highest {
                    debug!(
                        "Confirmations for {} dropped from {} to {}, keeping {}",
                        tx, highest, reported, highest
                    );
                }
                highest = highest.max(reported);
                status.confirmation_count = Some(highest);

                debug!(
                    "Poll {} for {}: confirmed={}, confirmations={}/{}",
                    polls, tx, status.confirmed, highest, config.confirmations
                );
                let _ = progress.send(status.clone());

                if status.confirmed && highest >= config.confirmations {
                    info!("Transaction {} confirmed after {} polls", tx, polls);
                    return MonitorOutcome::Confirmed(status);
                }
            }
            Ok(Err(e)) => {
                debug!("Poll {} for {} failed, will retry: {}", polls, tx, e);
                last_error = Some(e);
            }
        }

        sleep_until((Instant::now() + config.poll_interval).min(deadline)).await;
    }

    let elapsed = started.elapsed();
    warn!(
        "Gave up on {} after {:?} ({} polls, last error: {})",
        tx,
        elapsed,
        polls,
        last_error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "none".to_string())
    );
    MonitorOutcome::TimedOut {
        elapsed,
        polls,
        last_error,
    }
}
