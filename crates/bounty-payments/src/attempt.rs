//! The single unit of work owned by the orchestrator.

use crate::error::PaymentError;
use crate::types::{BalanceSnapshot, CostEstimate, MinorAmount, PaymentRequest, TransactionReference};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Where an attempt is in its lifecycle.
///
/// Transitions only move forward through this list. `Failed` carries the
/// terminal error, so an error exists exactly when the phase is `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "error", rename_all = "snake_case")]
pub enum PaymentPhase {
    Idle,
    Validating,
    Estimating,
    AwaitingSubmission,
    Submitted,
    Confirming,
    Succeeded,
    Failed(PaymentError),
}

impl PaymentPhase {
    fn rank(&self) -> u8 {
        match self {
            PaymentPhase::Idle => 0,
            PaymentPhase::Validating => 1,
            PaymentPhase::Estimating => 2,
            PaymentPhase::AwaitingSubmission => 3,
            PaymentPhase::Submitted => 4,
            PaymentPhase::Confirming => 5,
            PaymentPhase::Succeeded | PaymentPhase::Failed(_) => 6,
        }
    }

    /// No further automatic transition happens from here.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentPhase::Succeeded | PaymentPhase::Failed(_))
    }

    /// An attempt is running and a new one must be refused.
    pub fn is_active(&self) -> bool {
        !matches!(self, PaymentPhase::Idle) && !self.is_terminal()
    }

    /// Short lowercase name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            PaymentPhase::Idle => "idle",
            PaymentPhase::Validating => "validating",
            PaymentPhase::Estimating => "estimating",
            PaymentPhase::AwaitingSubmission => "awaiting_submission",
            PaymentPhase::Submitted => "submitted",
            PaymentPhase::Confirming => "confirming",
            PaymentPhase::Succeeded => "succeeded",
            PaymentPhase::Failed(_) => "failed",
        }
    }

    fn can_advance_to(&self, next: &PaymentPhase) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// Snapshot of the live attempt, pushed to subscribers on every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentAttempt {
    /// Changes whenever the slot is reset, so stale work can detect it.
    pub id: Uuid,
    pub request: Option<PaymentRequest>,
    /// Parsed amount, set once validation passes.
    pub amount: Option<MinorAmount>,
    pub phase: PaymentPhase,
    pub transaction_reference: Option<TransactionReference>,
    pub confirmation_count: u64,
    pub cost_estimate: Option<CostEstimate>,
    /// Payer balance observed while estimating.
    pub balance: Option<BalanceSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentAttempt {
    /// Empty slot.
    pub fn idle() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            request: None,
            amount: None,
            phase: PaymentPhase::Idle,
            transaction_reference: None,
            confirmation_count: 0,
            cost_estimate: None,
            balance: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fresh attempt for `request`, already in `Validating`.
    pub fn start(request: PaymentRequest) -> Self {
        Self {
            request: Some(request),
            phase: PaymentPhase::Validating,
            ..Self::idle()
        }
    }

    /// The error carried by a `Failed` attempt.
    pub fn terminal_error(&self) -> Option<&PaymentError> {
        match &self.phase {
            PaymentPhase::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Move forward to `next`.
    pub fn advance(&mut self, next: PaymentPhase) -> Result<(), PaymentError> {
        if !self.phase.can_advance_to(&next) {
            return Err(PaymentError::Internal(format!(
                "illegal transition {} -> {}",
                self.phase.name(),
                next.name()
            )));
        }
        self.phase = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Terminate with `error`.
    pub fn fail(&mut self, error: PaymentError) -> Result<(), PaymentError> {
        self.advance(PaymentPhase::Failed(error))
    }

    /// Record a confirmation depth. Returns whether the count increased;
    /// lower values (e.g. after a reorg) are ignored.
    pub fn record_confirmations(&mut self, count: u64) -> bool {
        if count > self.confirmation_count {
            self.confirmation_count = count;
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }
}

impl Default for PaymentAttempt {
    fn default() -> Self {
        Self::idle()
    }
}
