//! Chain access for the payment core.
//!
//! The orchestrator and monitor only ever talk to the network through
//! [`ChainClient`]. Each chain (currently Base) implements it on top of a
//! wallet and an RPC provider.

use crate::error::PaymentError;
use crate::types::{ConfirmationStatus, MinorAmount, TokenRef, TransactionReference};
use async_trait::async_trait;

/// Chain capabilities required by the payment core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Token balance of `address`, in minor units.
    async fn get_balance(&self, address: &str, token: &TokenRef) -> Result<MinorAmount, PaymentError>;

    /// Estimated gas units for the transfer. Best-effort.
    async fn estimate_transfer_cost(
        &self,
        token: &TokenRef,
        recipient: &str,
        amount: MinorAmount,
    ) -> Result<u64, PaymentError>;

    /// Sign and broadcast the transfer.
    ///
    /// Fails with `SubmissionRejected` when the user declines in the wallet
    /// and `SubmissionError` for anything else.
    async fn submit_transfer(
        &self,
        token: &TokenRef,
        recipient: &str,
        amount: MinorAmount,
    ) -> Result<TransactionReference, PaymentError>;

    /// Current status of a submitted transaction.
    async fn get_transaction_status(
        &self,
        tx: &TransactionReference,
    ) -> Result<ConfirmationStatus, PaymentError>;

    /// Latest block height.
    async fn get_current_block_height(&self) -> Result<u64, PaymentError>;
}

/// Fill in the confirmation depth when the adapter left it out.
///
/// Depth is `height - block`, so a transaction in the latest block has zero
/// confirmations. A transaction with no block has zero.
pub async fn resolve_confirmations(
    client: &dyn ChainClient,
    mut status: ConfirmationStatus,
) -> Result<ConfirmationStatus, PaymentError> {
    if status.confirmation_count.is_some() {
        return Ok(status);
    }

    let count = match status.block_reference {
        Some(block) => client.get_current_block_height().await?.saturating_sub(block),
        None => 0,
    };
    status.confirmation_count = Some(count);
    Ok(status)
}

pub mod base;
