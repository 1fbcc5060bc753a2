//! Base (EVM) chain client built on an Alloy HTTP provider.
//!
//! Talks to a wallet-backed endpoint: reads go through standard `eth_*`
//! calls, and transfers are handed to the wallet with `eth_sendTransaction`
//! so signing (and the user's approve/reject decision) stays in the wallet.

use super::ChainClient;
use crate::config::BaseChainConfig;
use crate::error::PaymentError;
use crate::types::{ConfirmationStatus, MinorAmount, TokenRef, TransactionReference};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::sol;
use alloy::transports::http::{reqwest, Http};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// EIP-1193 "User Rejected Request".
const USER_REJECTED_CODE: i64 = 4001;

/// Wallet phrasing for a declined signature when the code is not 4001.
const USER_REJECTED_MESSAGES: [&str; 2] = ["user rejected", "user denied"];

fn is_user_rejection(code: i64, message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    code == USER_REJECTED_CODE || USER_REJECTED_MESSAGES.iter().any(|m| message.contains(m))
}

/// Code and message of a JSON-RPC error response.
fn rpc_error(e: &alloy::contract::Error) -> Option<(i64, String)> {
    match e {
        alloy::contract::Error::TransportError(rpc) => rpc
            .as_error_resp()
            .map(|payload| (payload.code, payload.message.to_string())),
        _ => None,
    }
}

fn network_error(call: &str, e: impl std::fmt::Display) -> PaymentError {
    PaymentError::NetworkError(format!("{} failed: {}", call, e))
}

fn submission_error(e: alloy::contract::Error) -> PaymentError {
    match rpc_error(&e) {
        Some((code, message)) if is_user_rejection(code, &message) => {
            PaymentError::SubmissionRejected(message)
        }
        Some((code, message)) => PaymentError::SubmissionError(format!("error {}: {}", code, message)),
        None => PaymentError::SubmissionError(e.to_string()),
    }
}

fn parse_address(value: &str) -> Result<Address, String> {
    value
        .parse::<Address>()
        .map_err(|e| format!("{:?} is not an EVM address: {}", value, e))
}

/// JSON-RPC client for Base.
pub struct BaseRpcClient {
    provider: RootProvider,
    payer_address: Option<Address>,
}

impl BaseRpcClient {
    /// Create a new Base client.
    pub fn new(config: &BaseChainConfig) -> Result<Self, PaymentError> {
        let url: reqwest::Url = config
            .rpc_url
            .parse()
            .map_err(|e| PaymentError::Config(format!("Invalid RPC URL {}: {}", config.rpc_url, e)))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PaymentError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let payer_address = config
            .payer_address
            .as_deref()
            .map(parse_address)
            .transpose()
            .map_err(|e| PaymentError::Config(format!("Invalid payer address: {}", e)))?;

        info!(
            "Initializing Base client: rpc={}, payer={}",
            config.rpc_url,
            config.payer_address.as_deref().unwrap_or("<none>")
        );

        // No fillers: the wallet behind the endpoint owns nonce, gas price and signing.
        let client = RpcClient::new(Http::with_client(http, url), false);
        let provider = ProviderBuilder::default().connect_client(client);

        Ok(Self {
            provider,
            payer_address,
        })
    }

    /// Paying wallet, if configured.
    pub fn payer_address(&self) -> Option<Address> {
        self.payer_address
    }

    /// Check the endpoint answers `eth_blockNumber`.
    pub async fn health_check(&self) -> bool {
        match self.get_current_block_height().await {
            Ok(height) => {
                debug!("Base RPC healthy, block: {}", height);
                true
            }
            Err(e) => {
                warn!("Base RPC health check failed: {}", e);
                false
            }
        }
    }
}

fn token_address(token: &TokenRef) -> Result<Address, PaymentError> {
    parse_address(&token.address)
        .map_err(|e| PaymentError::Config(format!("Invalid {} contract: {}", token.symbol, e)))
}

#[async_trait]
impl ChainClient for BaseRpcClient {
    #[instrument(skip(self, token), fields(token = %token.symbol))]
    async fn get_balance(&self, address: &str, token: &TokenRef) -> Result<MinorAmount, PaymentError> {
        let owner = parse_address(address).map_err(PaymentError::NetworkError)?;
        let contract = IERC20::new(token_address(token)?, &self.provider);

        let balance: U256 = contract
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| network_error("balanceOf", e))?;

        debug!("Balance of {}: {} minor units", address, balance);
        // No real token supply comes near this; clamp rather than fail.
        Ok(MinorAmount(balance.saturating_to::<u128>()))
    }

    async fn estimate_transfer_cost(
        &self,
        token: &TokenRef,
        recipient: &str,
        amount: MinorAmount,
    ) -> Result<u64, PaymentError> {
        let to = parse_address(recipient).map_err(PaymentError::NetworkError)?;
        let contract = IERC20::new(token_address(token)?, &self.provider);

        let mut call = contract.transfer(to, U256::from(amount.value()));
        if let Some(from) = self.payer_address {
            call = call.from(from);
        }
        call.estimate_gas()
            .await
            .map_err(|e| network_error("eth_estimateGas", e))
    }

    #[instrument(skip(self, token))]
    async fn submit_transfer(
        &self,
        token: &TokenRef,
        recipient: &str,
        amount: MinorAmount,
    ) -> Result<TransactionReference, PaymentError> {
        let Some(from) = self.payer_address else {
            return Err(PaymentError::SubmissionError(
                "No payer address configured".to_string(),
            ));
        };
        let to = parse_address(recipient).map_err(PaymentError::SubmissionError)?;
        let contract = IERC20::new(token_address(token)?, &self.provider);

        let pending = contract
            .transfer(to, U256::from(amount.value()))
            .from(from)
            .send()
            .await
            .map_err(submission_error)?;
        let hash = *pending.tx_hash();

        info!("Submitted {} transfer to {}: {}", token.symbol, recipient, hash);
        Ok(TransactionReference::new(hash.to_string()))
    }

    async fn get_transaction_status(
        &self,
        tx: &TransactionReference,
    ) -> Result<ConfirmationStatus, PaymentError> {
        let hash: TxHash = tx.as_str().parse().map_err(|e| {
            PaymentError::NetworkError(format!("Invalid transaction hash {}: {}", tx, e))
        })?;

        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| network_error("eth_getTransactionReceipt", e))?;

        let Some(receipt) = receipt else {
            return Ok(ConfirmationStatus::pending(tx.clone()));
        };

        match (receipt.status(), receipt.block_number) {
            (false, block) => Ok(ConfirmationStatus::reverted(tx.clone(), block)),
            (true, Some(block)) => Ok(ConfirmationStatus::mined(tx.clone(), block)),
            // Receipt without a block is still pending inclusion.
            (true, None) => Ok(ConfirmationStatus::pending(tx.clone())),
        }
    }

    async fn get_current_block_height(&self) -> Result<u64, PaymentError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| network_error("eth_blockNumber", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::rpc;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAYER: &str = "0x1234567890123456789012345678901234567890";
    const RECIPIENT: &str = "0x742d35Cc6634C0532925a3b8D0Ac6d7d3f8b2Ae1";
    const TX_HASH: &str = "0x9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn create_test_client(mock_server: &MockServer, payer: Option<&str>) -> BaseRpcClient {
        let config = BaseChainConfig {
            rpc_url: mock_server.uri(),
            payer_address: payer.map(String::from),
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        BaseRpcClient::new(&config).unwrap()
    }

    async fn mount_result(mock_server: &MockServer, rpc_method: &str, result: serde_json::Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "method": rpc_method })))
            .respond_with(rpc::result(result))
            .mount(mock_server)
            .await;
    }

    async fn mount_error(mock_server: &MockServer, rpc_method: &str, code: i64, message: &str) {
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "method": rpc_method })))
            .respond_with(rpc::error(code, message))
            .mount(mock_server)
            .await;
    }

    fn tx() -> TransactionReference {
        TransactionReference::new(TX_HASH)
    }

    #[test]
    fn test_user_rejection_detection() {
        assert!(is_user_rejection(4001, "anything"));
        assert!(is_user_rejection(-32000, "User denied transaction signature"));
        assert!(is_user_rejection(-32603, "MetaMask Tx Signature: User rejected the request"));
        assert!(!is_user_rejection(-32000, "nonce too low"));
        assert!(!is_user_rejection(-32000, "transaction rejected: replacement fee too low"));
        assert!(!is_user_rejection(-32003, "permission denied for account"));
    }

    #[test]
    fn test_rejects_bad_payer_and_url() {
        let config = BaseChainConfig {
            payer_address: Some("0xnot-an-address".into()),
            ..Default::default()
        };
        assert!(matches!(BaseRpcClient::new(&config), Err(PaymentError::Config(_))));

        let config = BaseChainConfig {
            rpc_url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(BaseRpcClient::new(&config), Err(PaymentError::Config(_))));
    }

    #[tokio::test]
    async fn test_get_balance() {
        let mock_server = MockServer::start().await;
        mount_result(
            &mock_server,
            "eth_call",
            serde_json::json!(format!("0x{:064x}", 25_000_000u64)),
        )
        .await;

        let client = create_test_client(&mock_server, None);
        let balance = client.get_balance(PAYER, &TokenRef::default()).await.unwrap();
        assert_eq!(balance, MinorAmount(25_000_000));
    }

    #[tokio::test]
    async fn test_balance_above_u128_clamps() {
        let mock_server = MockServer::start().await;
        mount_result(
            &mock_server,
            "eth_call",
            serde_json::json!(format!("0x{}", "f".repeat(64))),
        )
        .await;

        let client = create_test_client(&mock_server, None);
        let balance = client.get_balance(PAYER, &TokenRef::default()).await.unwrap();
        assert_eq!(balance, MinorAmount(u128::MAX));
    }

    #[tokio::test]
    async fn test_estimate_transfer_cost() {
        let mock_server = MockServer::start().await;
        mount_result(&mock_server, "eth_estimateGas", serde_json::json!("0xfde8")).await;

        let client = create_test_client(&mock_server, Some(PAYER));
        let gas = client
            .estimate_transfer_cost(&TokenRef::default(), RECIPIENT, MinorAmount(1))
            .await
            .unwrap();
        assert_eq!(gas, 65_000);
    }

    #[tokio::test]
    async fn test_submit_transfer_sends_erc20_call() {
        let mock_server = MockServer::start().await;
        mount_result(&mock_server, "eth_sendTransaction", serde_json::json!(TX_HASH)).await;

        let client = create_test_client(&mock_server, Some(PAYER));
        let tx = client
            .submit_transfer(&TokenRef::default(), RECIPIENT, MinorAmount(10_500_000))
            .await
            .unwrap();
        assert_eq!(tx.as_str(), TX_HASH);

        let sent = rpc::params_of(&mock_server, "eth_sendTransaction").await;
        let call = &sent[0][0];
        let input = call["input"]
            .as_str()
            .or_else(|| call["data"].as_str())
            .unwrap()
            .to_ascii_lowercase();
        // transfer(address,uint256), recipient word, then 10.5 USDC.
        assert!(input.starts_with("0xa9059cbb"));
        assert!(input.contains(&RECIPIENT[2..].to_ascii_lowercase()));
        assert!(input.ends_with(&format!("{:064x}", 10_500_000u64)));
        assert_eq!(call["from"].as_str().unwrap().to_ascii_lowercase(), PAYER);
        assert_eq!(
            call["to"].as_str().unwrap().to_ascii_lowercase(),
            TokenRef::default().address.to_ascii_lowercase()
        );
    }

    #[tokio::test]
    async fn test_submit_transfer_user_rejected() {
        let mock_server = MockServer::start().await;
        mount_error(&mock_server, "eth_sendTransaction", 4001, "User rejected the request.").await;

        let client = create_test_client(&mock_server, Some(PAYER));
        let result = client
            .submit_transfer(&TokenRef::default(), RECIPIENT, MinorAmount(1_000_000))
            .await;
        assert!(matches!(result, Err(PaymentError::SubmissionRejected(_))));
    }

    #[tokio::test]
    async fn test_submit_transfer_node_error() {
        let mock_server = MockServer::start().await;
        mount_error(&mock_server, "eth_sendTransaction", -32000, "insufficient funds for gas").await;

        let client = create_test_client(&mock_server, Some(PAYER));
        let result = client
            .submit_transfer(&TokenRef::default(), RECIPIENT, MinorAmount(1_000_000))
            .await;
        assert!(matches!(result, Err(PaymentError::SubmissionError(_))));
    }

    #[tokio::test]
    async fn test_node_side_rejection_is_not_user_decline() {
        let mock_server = MockServer::start().await;
        mount_error(
            &mock_server,
            "eth_sendTransaction",
            -32000,
            "transaction rejected: replacement transaction underpriced",
        )
        .await;

        let client = create_test_client(&mock_server, Some(PAYER));
        let result = client
            .submit_transfer(&TokenRef::default(), RECIPIENT, MinorAmount(1_000_000))
            .await;
        assert!(matches!(result, Err(PaymentError::SubmissionError(_))));
    }

    #[tokio::test]
    async fn test_submit_transfer_without_payer() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server, None);
        let result = client
            .submit_transfer(&TokenRef::default(), RECIPIENT, MinorAmount(1))
            .await;
        assert!(matches!(result, Err(PaymentError::SubmissionError(_))));
    }

    #[tokio::test]
    async fn test_status_pending_when_receipt_null() {
        let mock_server = MockServer::start().await;
        mount_result(&mock_server, "eth_getTransactionReceipt", serde_json::Value::Null).await;

        let client = create_test_client(&mock_server, None);
        let status = client.get_transaction_status(&tx()).await.unwrap();
        assert!(!status.confirmed);
        assert!(!status.reverted);
        assert_eq!(status.confirmation_count, Some(0));
    }

    #[tokio::test]
    async fn test_status_mined_and_reverted() {
        let mock_server = MockServer::start().await;
        mount_result(
            &mock_server,
            "eth_getTransactionReceipt",
            rpc::receipt(TX_HASH, true, 100),
        )
        .await;

        let client = create_test_client(&mock_server, None);
        let status = client.get_transaction_status(&tx()).await.unwrap();
        assert!(status.confirmed);
        assert_eq!(status.block_reference, Some(100));
        assert_eq!(status.confirmation_count, None);

        let reverted_server = MockServer::start().await;
        mount_result(
            &reverted_server,
            "eth_getTransactionReceipt",
            rpc::receipt(TX_HASH, false, 100),
        )
        .await;

        let client = create_test_client(&reverted_server, None);
        let status = client.get_transaction_status(&tx()).await.unwrap();
        assert!(status.reverted);
        assert!(!status.confirmed);
    }

    #[tokio::test]
    async fn test_malformed_hash_is_network_error() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server, None);
        let result = client
            .get_transaction_status(&TransactionReference::new("0xabc"))
            .await;
        assert!(matches!(result, Err(PaymentError::NetworkError(_))));
    }

    #[tokio::test]
    async fn test_block_height_and_health_check() {
        let mock_server = MockServer::start().await;
        mount_result(&mock_server, "eth_blockNumber", serde_json::json!("0x1b4")).await;

        let client = create_test_client(&mock_server, None);
        assert_eq!(client.get_current_block_height().await.unwrap(), 436);
        assert!(client.health_check().await);
    }

    #[tokio::test]
    async fn test_http_failure_is_network_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server, None);
        let result = client.get_transaction_status(&tx()).await;
        assert!(matches!(result, Err(PaymentError::NetworkError(_))));
        assert!(!client.health_check().await);
    }
}
