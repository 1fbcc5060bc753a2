//! Payment configuration.

use crate::types::TokenRef;
use serde::Deserialize;
use std::time::Duration;

/// Main payment configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Token transferred by every payment.
    #[serde(default)]
    pub token: TokenRef,

    /// Description used when a request carries none.
    #[serde(default = "default_description")]
    pub default_description: String,

    /// Fail before submission when the payer balance is known to be short.
    #[serde(default = "default_true")]
    pub require_sufficient_balance: bool,

    /// Snapshot channel capacity per subscriber.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Confirmation polling.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Gas estimation.
    #[serde(default)]
    pub estimate: EstimateConfig,

    /// Base (EVM) chain configuration.
    #[serde(default)]
    pub base: BaseChainConfig,
}

fn default_description() -> String {
    "BaseBounties Payment".to_string()
}

fn default_true() -> bool {
    true
}

fn default_event_buffer() -> usize {
    64
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            token: TokenRef::default(),
            default_description: default_description(),
            require_sufficient_balance: true,
            event_buffer: default_event_buffer(),
            monitor: MonitorConfig::default(),
            estimate: EstimateConfig::default(),
            base: BaseChainConfig::default(),
        }
    }
}

impl PaymentConfig {
    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), crate::error::PaymentError> {
        use crate::error::PaymentError;

        if self.token.decimals > crate::amount::MAX_DECIMALS {
            return Err(PaymentError::Config(format!(
                "token decimals {} exceeds {}",
                self.token.decimals,
                crate::amount::MAX_DECIMALS
            )));
        }
        if self.monitor.confirmations == 0 {
            return Err(PaymentError::Config(
                "monitor.confirmations must be at least 1".to_string(),
            ));
        }
        if self.monitor.poll_interval.is_zero() {
            return Err(PaymentError::Config(
                "monitor.poll_interval must be non-zero".to_string(),
            ));
        }
        if self.monitor.timeout < self.monitor.poll_interval {
            return Err(PaymentError::Config(format!(
                "monitor.timeout ({:?}) is shorter than monitor.poll_interval ({:?})",
                self.monitor.timeout, self.monitor.poll_interval
            )));
        }
        if self.event_buffer == 0 {
            return Err(PaymentError::Config(
                "event_buffer must be at least 1".to_string(),
            ));
        }
        if let Some(payer) = &self.base.payer_address {
            crate::validator::PaymentValidator::new(
                self.token.decimals,
                self.base.address_format.clone(),
            )
            .validate_address(payer)
            .map_err(|e| PaymentError::Config(format!("base.payer_address: {}", e)))?;
        }
        Ok(())
    }
}

/// Confirmation monitor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Delay between status polls.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Confirmations required before a payment counts as settled.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    /// Overall bound on monitoring one transaction.
    #[serde(default = "default_monitor_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_confirmations() -> u64 {
    3
}

fn default_monitor_timeout() -> Duration {
    Duration::from_secs(5 * 60) // 5 minutes
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            confirmations: default_confirmations(),
            timeout: default_monitor_timeout(),
        }
    }
}

/// Gas estimation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EstimateConfig {
    /// Gas units substituted when estimation fails. `None` leaves the
    /// estimate unavailable instead; the flow continues either way.
    #[serde(default = "default_fallback_gas")]
    pub fallback_gas_units: Option<u64>,
}

fn default_fallback_gas() -> Option<u64> {
    Some(100_000)
}

impl Default for EstimateConfig {
    fn default() -> Self {
        Self {
            fallback_gas_units: default_fallback_gas(),
        }
    }
}

/// Address syntax of the target chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddressFormat {
    #[serde(default = "default_address_prefix")]
    pub prefix: String,

    /// Total length including the prefix.
    #[serde(default = "default_address_length")]
    pub length: usize,

    /// Also require the part after the prefix to be hex. Off by default:
    /// only prefix and length are checked before the chain sees the address.
    #[serde(default)]
    pub hex_body: bool,
}

fn default_address_prefix() -> String {
    "0x".to_string()
}

fn default_address_length() -> usize {
    42
}

impl Default for AddressFormat {
    fn default() -> Self {
        Self {
            prefix: default_address_prefix(),
            length: default_address_length(),
            hex_body: false,
        }
    }
}

/// Base (EVM) chain configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BaseChainConfig {
    /// Wallet-backed JSON-RPC endpoint. Must sign `eth_sendTransaction`
    /// for `payer_address`.
    #[serde(default = "default_base_rpc")]
    pub rpc_url: String,

    /// Paying wallet; enables balance checks and submission.
    #[serde(default)]
    pub payer_address: Option<String>,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Block explorer base URL for transaction links.
    #[serde(default = "default_explorer_url")]
    pub explorer_url: String,

    #[serde(default)]
    pub address_format: AddressFormat,
}

fn default_base_rpc() -> String {
    "https://mainnet.base.org".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_explorer_url() -> String {
    "https://basescan.org".to_string()
}

impl Default for BaseChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_base_rpc(),
            payer_address: None,
            request_timeout: default_request_timeout(),
            explorer_url: default_explorer_url(),
            address_format: AddressFormat::default(),
        }
    }
}

impl BaseChainConfig {
    /// Explorer link for a transaction.
    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}
