//! USDC payments on Base for BaseBounties
//!
//! This crate drives a single on-chain stablecoin transfer from request to
//! settlement and reports every step as a snapshot a UI can render.
//!
//! # Architecture
//!
//! ```text
//! PaymentRequest -> Validate -> Estimate gas / read balance -> Confirm
//!                -> Submit transfer -> Poll confirmations -> Succeeded | Failed
//! ```
//!
//! # Modules
//!
//! - [`amount`] - Decimal string <-> minor unit conversion
//! - [`validator`] - Request checks run before any network call
//! - [`chains`] - Chain capability trait and the Base JSON-RPC client
//! - [`orchestrator`] - The payment state machine
//! - [`monitor`] - Cancellable confirmation polling
//! - [`presenter`] - Snapshot to dialog view mapping
//!
//! The chain is only ever reached through [`chains::ChainClient`], so the
//! orchestrator runs unchanged against a test double.

pub mod amount;
pub mod attempt;
pub mod chains;
pub mod config;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod presenter;
pub mod types;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use attempt::{PaymentAttempt, PaymentPhase};
pub use chains::base::BaseRpcClient;
pub use chains::ChainClient;
pub use config::{BaseChainConfig, MonitorConfig, PaymentConfig};
pub use error::{PaymentError, RetryAffordance, ValidationError};
pub use monitor::{ConfirmationMonitor, MonitorCancel, MonitorHandle, MonitorOutcome};
pub use orchestrator::PaymentOrchestrator;
pub use presenter::{present, ModalStep, PaymentView, ViewContext};
pub use types::{
    BalanceSnapshot, ConfirmationStatus, CostEstimate, MinorAmount, PaymentRequest, TokenRef,
    TransactionReference,
};
pub use validator::PaymentValidator;
