//! Core types for the payment system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// USDC contract on Base.
pub const USDC_BASE_ADDRESS: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

/// Amount in a token's smallest indivisible unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinorAmount(pub u128);

impl MinorAmount {
    pub const ZERO: MinorAmount = MinorAmount(0);

    pub fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for MinorAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u128> for MinorAmount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

/// The token being transferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    /// Contract address.
    #[serde(default = "default_token_address")]
    pub address: String,

    /// Fixed decimal precision.
    #[serde(default = "default_token_decimals")]
    pub decimals: u8,

    /// Display symbol.
    #[serde(default = "default_token_symbol")]
    pub symbol: String,
}

fn default_token_address() -> String {
    USDC_BASE_ADDRESS.to_string()
}

fn default_token_decimals() -> u8 {
    6
}

fn default_token_symbol() -> String {
    "USDC".to_string()
}

impl TokenRef {
    /// USDC on Base mainnet.
    pub fn usdc_base() -> Self {
        Self {
            address: default_token_address(),
            decimals: default_token_decimals(),
            symbol: default_token_symbol(),
        }
    }
}

impl Default for TokenRef {
    fn default() -> Self {
        Self::usdc_base()
    }
}

/// Opaque handle returned by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionReference(String);

impl TransactionReference {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A caller's intent to pay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Human decimal amount, e.g. `"10.50"`.
    pub amount: String,
    /// Recipient wallet address.
    pub recipient: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Opaque caller data carried through the attempt.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PaymentRequest {
    pub fn new(amount: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            recipient: recipient.into(),
            description: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Point-in-time token balance of an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub address: String,
    pub amount: MinorAmount,
    pub observed_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    pub fn new(address: impl Into<String>, amount: MinorAmount) -> Self {
        Self {
            address: address.into(),
            amount,
            observed_at: Utc::now(),
        }
    }

    /// Check if the balance covers the given amount.
    pub fn covers(&self, amount: MinorAmount) -> bool {
        self.amount >= amount
    }
}

/// Result of one transaction status lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationStatus {
    pub transaction_reference: TransactionReference,
    /// Receipt exists and reports success.
    pub confirmed: bool,
    /// Receipt exists and reports failure.
    pub reverted: bool,
    /// Depth reported by the adapter, if it knows it.
    pub confirmation_count: Option<u64>,
    /// Block containing the transaction, if mined.
    pub block_reference: Option<u64>,
}

impl ConfirmationStatus {
    /// Transaction not yet mined.
    pub fn pending(tx: TransactionReference) -> Self {
        Self {
            transaction_reference: tx,
            confirmed: false,
            reverted: false,
            confirmation_count: Some(0),
            block_reference: None,
        }
    }

    /// Mined successfully in `block`; depth left for the caller to derive.
    pub fn mined(tx: TransactionReference, block: u64) -> Self {
        Self {
            transaction_reference: tx,
            confirmed: true,
            reverted: false,
            confirmation_count: None,
            block_reference: Some(block),
        }
    }

    /// Mined but failed.
    pub fn reverted(tx: TransactionReference, block: Option<u64>) -> Self {
        Self {
            transaction_reference: tx,
            confirmed: false,
            reverted: true,
            confirmation_count: None,
            block_reference: block,
        }
    }

    pub fn with_confirmations(mut self, count: u64) -> Self {
        self.confirmation_count = Some(count);
        self
    }
}

/// Gas quote attached to an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CostEstimate {
    /// Returned by the chain client.
    Quoted { gas_units: u64 },
    /// Estimation failed; the configured default was substituted.
    Fallback { gas_units: u64, reason: String },
    /// Estimation failed and no fallback is configured.
    Unavailable { reason: String },
}

impl CostEstimate {
    pub fn gas_units(&self) -> Option<u64> {
        match self {
            CostEstimate::Quoted { gas_units } | CostEstimate::Fallback { gas_units, .. } => {
                Some(*gas_units)
            }
            CostEstimate::Unavailable { .. } => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        !matches!(self, CostEstimate::Quoted { .. })
    }
}
