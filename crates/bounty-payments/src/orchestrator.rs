//! Payment orchestration.
//!
//! [`PaymentOrchestrator`] owns a single live [`PaymentAttempt`] and drives it
//! through validation, gas estimation, submission and confirmation. Every
//! state change is published to subscribers as a full snapshot.
//!
//! # Flow
//!
//! ```text
//! Idle -> Validating -> Estimating -> AwaitingSubmission
//!      -> Submitted -> Confirming -> Succeeded
//!                                 \-> Failed(error)   (from any non-terminal phase)
//! ```
//!
//! [`PaymentOrchestrator::prepare`] runs up to `AwaitingSubmission` so a UI
//! can show the quote; [`PaymentOrchestrator::confirm`] submits and waits for
//! the outcome. [`PaymentOrchestrator::submit_payment`] does both.
//!
//! The work behind each of these runs on its own task. A caller that stops
//! waiting (a dropped future, a lost `select!` branch) does not strand the
//! attempt: it still reaches `Succeeded` or `Failed` and subscribers see it.
//! Only [`PaymentOrchestrator::cancel_and_reset`] abandons an attempt.

use crate::amount;
use crate::attempt::{PaymentAttempt, PaymentPhase};
use crate::chains::{resolve_confirmations, ChainClient};
use crate::config::PaymentConfig;
use crate::error::PaymentError;
use crate::monitor::{ConfirmationMonitor, MonitorCancel, MonitorEvent, MonitorOutcome};
use crate::types::{
    BalanceSnapshot, ConfirmationStatus, CostEstimate, MinorAmount, PaymentRequest,
    TransactionReference,
};
use crate::validator::PaymentValidator;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The live attempt plus whatever is working on it.
struct Slot {
    attempt: PaymentAttempt,
    monitor: Option<MonitorCancel>,
    /// A `confirm` call has claimed the attempt and is submitting.
    submitting: bool,
}

impl Slot {
    fn replace(&mut self, attempt: PaymentAttempt) {
        if let Some(monitor) = self.monitor.take() {
            monitor.cancel();
        }
        self.submitting = false;
        self.attempt = attempt;
    }
}

/// Drives one payment attempt at a time against a [`ChainClient`].
pub struct PaymentOrchestrator {
    inner: Arc<Inner>,
}

/// State shared with the tasks driving an attempt.
struct Inner {
    client: Arc<dyn ChainClient>,
    config: PaymentConfig,
    validator: PaymentValidator,
    monitor: ConfirmationMonitor,
    payer: Option<String>,
    slot: Mutex<Slot>,
    events: broadcast::Sender<PaymentAttempt>,
}

/// Run `work` to completion on its own task and wait for it.
async fn run_detached<F>(work: F) -> Result<PaymentAttempt, PaymentError>
where
    F: Future<Output = Result<PaymentAttempt, PaymentError>> + Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| PaymentError::Internal(format!("payment task failed: {}", e)))?
}

impl PaymentOrchestrator {
    /// Create an orchestrator. Fails if `config` is unusable.
    pub fn new(client: Arc<dyn ChainClient>, config: PaymentConfig) -> Result<Self, PaymentError> {
        config.validate()?;

        let validator =
            PaymentValidator::new(config.token.decimals, config.base.address_format.clone());
        let monitor = ConfirmationMonitor::new(client.clone(), config.monitor.clone());
        let (events, _) = broadcast::channel(config.event_buffer);

        Ok(Self {
            inner: Arc::new(Inner {
                payer: config.base.payer_address.clone(),
                client,
                validator,
                monitor,
                slot: Mutex::new(Slot {
                    attempt: PaymentAttempt::idle(),
                    monitor: None,
                    submitting: false,
                }),
                events,
                config,
            }),
        })
    }

    /// Address whose balance is checked before submitting.
    ///
    /// Must be called before any payment is started.
    pub fn with_payer(mut self, payer: impl Into<String>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.payer = Some(payer.into()),
            None => warn!("Payer not changed: a payment task is still running"),
        }
        self
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.inner.config
    }

    pub fn payer(&self) -> Option<&str> {
        self.inner.payer.as_deref()
    }

    /// Receive a snapshot after every state change.
    pub fn subscribe(&self) -> broadcast::Receiver<PaymentAttempt> {
        self.inner.events.subscribe()
    }

    /// Snapshot of the live attempt.
    pub fn current_attempt(&self) -> PaymentAttempt {
        self.inner.slot.lock().attempt.clone()
    }

    /// Validate, estimate, then wait for [`confirm`](Self::confirm).
    ///
    /// Returns the snapshot in `AwaitingSubmission`, or in `Failed` when
    /// validation rejected the request. Errors only for `AttemptInProgress`
    /// and `Cancelled`.
    pub async fn prepare(&self, request: PaymentRequest) -> Result<PaymentAttempt, PaymentError> {
        let inner = self.inner.clone();
        run_detached(async move { inner.prepare(request).await }).await
    }

    /// Submit the prepared attempt and wait for its outcome.
    pub async fn confirm(&self) -> Result<PaymentAttempt, PaymentError> {
        let id = self.inner.slot.lock().attempt.id;
        let inner = self.inner.clone();
        run_detached(async move { inner.confirm_attempt(id).await }).await
    }

    /// Run a payment end to end.
    ///
    /// Returns the terminal snapshot, `Succeeded` or `Failed`.
    pub async fn submit_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<PaymentAttempt, PaymentError> {
        let inner = self.inner.clone();
        run_detached(async move {
            let prepared = inner.prepare(request).await?;
            if prepared.is_terminal() {
                return Ok(prepared);
            }
            inner.confirm_attempt(prepared.id).await
        })
        .await
    }

    /// Stop any monitoring and return to `Idle`.
    ///
    /// Calls still running for the discarded attempt return `Cancelled`.
    pub fn cancel_and_reset(&self) -> PaymentAttempt {
        let mut slot = self.inner.slot.lock();
        let previous = slot.attempt.phase.name();
        slot.replace(PaymentAttempt::idle());
        let snapshot = slot.attempt.clone();
        let _ = self.inner.events.send(snapshot.clone());
        drop(slot);

        info!("Payment attempt reset (was {})", previous);
        snapshot
    }

    /// Fresh balance read for `address`. Independent of the live attempt.
    pub async fn refresh_balance(&self, address: &str) -> Result<BalanceSnapshot, PaymentError> {
        let inner = &self.inner;
        inner.validator.validate_address(address)?;
        let amount = inner.client.get_balance(address, &inner.config.token).await?;
        debug!(
            "Balance of {}: {} {}",
            address,
            amount::decode(amount, inner.config.token.decimals),
            inner.config.token.symbol
        );
        Ok(BalanceSnapshot::new(address, amount))
    }

    /// One-shot status lookup with the confirmation depth filled in.
    pub async fn transaction_status(
        &self,
        tx: &TransactionReference,
    ) -> Result<ConfirmationStatus, PaymentError> {
        let status = self.inner.client.get_transaction_status(tx).await?;
        if status.reverted {
            return Ok(status);
        }
        resolve_confirmations(self.inner.client.as_ref(), status).await
    }
}

impl Inner {
    async fn prepare(&self, request: PaymentRequest) -> Result<PaymentAttempt, PaymentError> {
        let request = self.with_default_description(request);
        let id = self.begin(request.clone())?;

        info!(
            attempt = %id,
            amount = %request.amount,
            recipient = %request.recipient,
            "Payment attempt started"
        );

        let amount = match self.validator.validate(&request) {
            Ok(amount) => amount,
            Err(e) => {
                warn!(attempt = %id, "Payment request rejected: {}", e);
                return self.fail(id, e.into());
            }
        };
        self.update(id, |attempt| {
            attempt.amount = Some(amount);
            attempt.advance(PaymentPhase::Estimating)
        })?;

        let (estimate, balance) = tokio::join!(
            self.quote(&request.recipient, amount),
            self.observe_payer_balance()
        );

        self.update(id, |attempt| {
            attempt.cost_estimate = Some(estimate);
            attempt.balance = balance;
            attempt.advance(PaymentPhase::AwaitingSubmission)
        })
    }

    fn with_default_description(&self, mut request: PaymentRequest) -> PaymentRequest {
        if request.description.is_none() {
            request.description = Some(self.config.default_description.clone());
        }
        request
    }

    /// Install a new attempt in `Validating`, resetting a terminal one first.
    fn begin(&self, request: PaymentRequest) -> Result<Uuid, PaymentError> {
        let mut slot = self.slot.lock();
        if slot.attempt.phase.is_active() {
            warn!(
                "Refusing new payment while attempt {} is {}",
                slot.attempt.id,
                slot.attempt.phase.name()
            );
            return Err(PaymentError::AttemptInProgress);
        }

        if slot.attempt.is_terminal() {
            slot.replace(PaymentAttempt::idle());
            let _ = self.events.send(slot.attempt.clone());
        }

        slot.replace(PaymentAttempt::start(request));
        let _ = self.events.send(slot.attempt.clone());
        Ok(slot.attempt.id)
    }

    /// Apply `change` to attempt `id` and publish the result.
    fn update<F>(&self, id: Uuid, change: F) -> Result<PaymentAttempt, PaymentError>
    where
        F: FnOnce(&mut PaymentAttempt) -> Result<(), PaymentError>,
    {
        let mut slot = self.slot.lock();
        if slot.attempt.id != id {
            debug!("Attempt {} was reset, dropping update", id);
            return Err(PaymentError::Cancelled);
        }
        change(&mut slot.attempt)?;
        let snapshot = slot.attempt.clone();
        let _ = self.events.send(snapshot.clone());
        Ok(snapshot)
    }

    fn fail(&self, id: Uuid, error: PaymentError) -> Result<PaymentAttempt, PaymentError> {
        self.update(id, |attempt| attempt.fail(error))
    }

    async fn quote(&self, recipient: &str, amount: MinorAmount) -> CostEstimate {
        match self
            .client
            .estimate_transfer_cost(&self.config.token, recipient, amount)
            .await
        {
            Ok(gas_units) => {
                debug!("Gas estimate: {} units", gas_units);
                CostEstimate::Quoted { gas_units }
            }
            Err(e) => match self.config.estimate.fallback_gas_units {
                Some(gas_units) => {
                    warn!(
                        "Gas estimation failed, using fallback of {} units: {}",
                        gas_units, e
                    );
                    CostEstimate::Fallback {
                        gas_units,
                        reason: e.to_string(),
                    }
                }
                None => {
                    warn!("Gas estimation failed: {}", e);
                    CostEstimate::Unavailable {
                        reason: e.to_string(),
                    }
                }
            },
        }
    }

    async fn observe_payer_balance(&self) -> Option<BalanceSnapshot> {
        let payer = self.payer.as_deref()?;
        match self.client.get_balance(payer, &self.config.token).await {
            Ok(amount) => Some(BalanceSnapshot::new(payer, amount)),
            Err(e) => {
                warn!("Could not read payer balance for {}: {}", payer, e);
                None
            }
        }
    }

    /// Claim attempt `id` for submission. Returns what `submit_transfer`
    /// needs, or the balance error the attempt should fail with.
    fn claim(&self, id: Uuid) -> Result<Result<(MinorAmount, String), PaymentError>, PaymentError> {
        let mut slot = self.slot.lock();
        if slot.attempt.id != id {
            return Err(PaymentError::Cancelled);
        }
        if slot.attempt.phase != PaymentPhase::AwaitingSubmission {
            return Err(PaymentError::NoPendingAttempt);
        }
        if slot.submitting {
            return Err(PaymentError::AttemptInProgress);
        }

        let amount = slot
            .attempt
            .amount
            .ok_or_else(|| PaymentError::Internal("prepared attempt has no amount".to_string()))?;
        let recipient = slot
            .attempt
            .request
            .as_ref()
            .map(|request| request.recipient.clone())
            .ok_or_else(|| PaymentError::Internal("prepared attempt has no request".to_string()))?;

        if self.config.require_sufficient_balance {
            if let Some(balance) = slot.attempt.balance.as_ref().filter(|b| !b.covers(amount)) {
                let decimals = self.config.token.decimals;
                return Ok(Err(PaymentError::InsufficientBalance {
                    required: amount::decode(amount, decimals),
                    available: amount::decode(balance.amount, decimals),
                }));
            }
        }

        slot.submitting = true;
        Ok(Ok((amount, recipient)))
    }

    async fn confirm_attempt(&self, id: Uuid) -> Result<PaymentAttempt, PaymentError> {
        let (amount, recipient) = match self.claim(id)? {
            Ok(claimed) => claimed,
            Err(balance_error) => {
                warn!(attempt = %id, "{}", balance_error);
                return self.fail(id, balance_error);
            }
        };

        info!(
            attempt = %id,
            "Submitting transfer of {} {} to {}",
            amount::decode(amount, self.config.token.decimals),
            self.config.token.symbol,
            recipient
        );

        let tx = match self
            .client
            .submit_transfer(&self.config.token, &recipient, amount)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                let error = match e {
                    PaymentError::SubmissionRejected(_) | PaymentError::SubmissionError(_) => e,
                    other => PaymentError::SubmissionError(other.to_string()),
                };
                warn!(attempt = %id, "Submission failed: {}", error);
                return self.fail(id, error);
            }
        };

        if let Err(e) = self.update(id, |attempt| {
            attempt.transaction_reference = Some(tx.clone());
            attempt.advance(PaymentPhase::Submitted)
        }) {
            warn!("Transaction {} was broadcast after its attempt was reset", tx);
            return Err(e);
        }
        info!(attempt = %id, "Transaction submitted: {}", tx);

        let mut handle = self.monitor.spawn(tx.clone());
        {
            let mut slot = self.slot.lock();
            if slot.attempt.id != id {
                return Err(PaymentError::Cancelled);
            }
            slot.monitor = Some(handle.canceller());
        }
        self.update(id, |attempt| attempt.advance(PaymentPhase::Confirming))?;

        let outcome = loop {
            match handle.next_event().await {
                Some(MonitorEvent::Progress(status)) => {
                    self.record_progress(id, status.confirmation_count.unwrap_or(0))?;
                }
                Some(MonitorEvent::Finished(outcome)) => break outcome,
                None => break MonitorOutcome::Cancelled,
            }
        };

        {
            let mut slot = self.slot.lock();
            if slot.attempt.id == id {
                slot.monitor = None;
            }
        }

        match outcome {
            MonitorOutcome::Confirmed(status) => {
                let count = status.confirmation_count.unwrap_or(0);
                info!(attempt = %id, "Payment confirmed: {} ({} confirmations)", tx, count);
                self.update(id, |attempt| {
                    attempt.record_confirmations(count);
                    attempt.advance(PaymentPhase::Succeeded)
                })
            }
            MonitorOutcome::Reverted(_) => {
                self.fail(id, PaymentError::TransactionReverted(tx.to_string()))
            }
            MonitorOutcome::TimedOut { last_error, .. } => self.fail(
                id,
                PaymentError::ConfirmationTimeout {
                    timeout_secs: self.config.monitor.timeout.as_secs(),
                    last_error: last_error.map(|e| e.to_string()),
                },
            ),
            MonitorOutcome::Cancelled => Err(PaymentError::Cancelled),
        }
    }

    fn record_progress(&self, id: Uuid, count: u64) -> Result<(), PaymentError> {
        let mut slot = self.slot.lock();
        if slot.attempt.id != id {
            return Err(PaymentError::Cancelled);
        }
        if slot.attempt.record_confirmations(count) {
            debug!(attempt = %id, "Confirmations: {}/{}", count, self.config.monitor.confirmations);
            let _ = self.events.send(slot.attempt.clone());
        }
        Ok(())
    }
}
