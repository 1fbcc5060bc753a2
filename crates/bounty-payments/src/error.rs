//! Payment error types.

use serde::Serialize;
use thiserror::Error;

/// Reasons a payment request is refused before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum ValidationError {
    /// Amount is zero, negative or not a number.
    #[error("Invalid payment amount: {0}")]
    NonPositiveAmount(String),

    /// Recipient does not match the chain's address syntax.
    #[error("Invalid recipient address: {0}")]
    MalformedAddress(String),
}

/// Errors that can occur in the payment system.
///
/// Every `Failed` attempt carries one of these. The variants are kept
/// string-backed so snapshots stay `Clone` and serializable.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum PaymentError {
    /// Amount string could not be converted to minor units.
    #[error("Malformed amount: {0}")]
    MalformedAmount(String),

    /// Request failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Payer balance is below the requested amount.
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    /// User declined the transaction in their wallet.
    #[error("Transaction rejected in wallet: {0}")]
    SubmissionRejected(String),

    /// Node or wallet failed to accept the transaction.
    #[error("Transaction submission failed: {0}")]
    SubmissionError(String),

    /// RPC/network error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Confirmation threshold not reached before the deadline.
    #[error("Transaction not confirmed within {timeout_secs}s")]
    ConfirmationTimeout {
        timeout_secs: u64,
        last_error: Option<String>,
    },

    /// Transaction was mined but failed.
    #[error("Transaction reverted: {0}")]
    TransactionReverted(String),

    /// A non-terminal attempt is already in flight.
    #[error("A payment is already in progress")]
    AttemptInProgress,

    /// `confirm` was called without a prepared attempt.
    #[error("No payment is awaiting submission")]
    NoPendingAttempt,

    /// The attempt was discarded by `cancel_and_reset`.
    #[error("Payment cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// What a presentation layer should offer after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAffordance {
    /// The request itself is wrong; let the user edit it.
    EditRequest,
    /// Funds are missing; retrying without topping up is pointless.
    TopUpBalance,
    /// Transient or user-initiated; a fresh submit may succeed.
    TryAgain,
    /// The transaction may still land; point at the explorer first.
    CheckExplorer,
    /// Nothing to offer.
    None,
}

impl PaymentError {
    /// Classify this error for the retry button.
    pub fn retry_affordance(&self) -> RetryAffordance {
        match self {
            PaymentError::MalformedAmount(_) | PaymentError::Validation(_) => {
                RetryAffordance::EditRequest
            }
            PaymentError::InsufficientBalance { .. } => RetryAffordance::TopUpBalance,
            PaymentError::SubmissionRejected(_)
            | PaymentError::SubmissionError(_)
            | PaymentError::NetworkError(_)
            | PaymentError::TransactionReverted(_) => RetryAffordance::TryAgain,
            PaymentError::ConfirmationTimeout { .. } => RetryAffordance::CheckExplorer,
            PaymentError::AttemptInProgress
            | PaymentError::NoPendingAttempt
            | PaymentError::Cancelled
            | PaymentError::Config(_)
            | PaymentError::Internal(_) => RetryAffordance::None,
        }
    }

    /// Whether this error is a transient chain read failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, PaymentError::NetworkError(_))
    }
}
