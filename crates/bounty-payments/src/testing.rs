//! Scripted chain client shared by the unit tests.

use crate::chains::ChainClient;
use crate::error::PaymentError;
use crate::types::{ConfirmationStatus, MinorAmount, TokenRef, TransactionReference};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const TX_HASH: &str = "0xfeed";

/// Successful receipt reporting `count` confirmations.
pub(crate) fn mined(count: u64) -> ConfirmationStatus {
    ConfirmationStatus::mined(TransactionReference::new(TX_HASH), 100).with_confirmations(count)
}

/// Replays queued results, then repeats the last one forever.
struct Script<T> {
    queue: VecDeque<Result<T, PaymentError>>,
    last: Option<Result<T, PaymentError>>,
}

impl<T: Clone> Script<T> {
    fn new(items: Vec<Result<T, PaymentError>>) -> Self {
        Self {
            queue: items.into(),
            last: None,
        }
    }

    fn next(&mut self) -> Result<T, PaymentError> {
        match self.queue.pop_front() {
            Some(item) => {
                self.last = Some(item.clone());
                item
            }
            None => self
                .last
                .clone()
                .unwrap_or_else(|| Err(PaymentError::NetworkError("script exhausted".into()))),
        }
    }
}

pub(crate) struct ScriptedClient {
    statuses: Mutex<Script<ConfirmationStatus>>,
    heights: Mutex<Script<u64>>,
    balance: Result<MinorAmount, PaymentError>,
    estimate: Result<u64, PaymentError>,
    estimate_delay: Option<Duration>,
    submit: Result<TransactionReference, PaymentError>,
    status_calls: AtomicUsize,
    estimate_calls: AtomicUsize,
    submit_calls: AtomicUsize,
}

impl ScriptedClient {
    pub(crate) fn new() -> Self {
        Self {
            statuses: Mutex::new(Script::new(vec![Ok(ConfirmationStatus::pending(
                TransactionReference::new(TX_HASH),
            ))])),
            heights: Mutex::new(Script::new(vec![Ok(100)])),
            balance: Ok(MinorAmount(1_000_000_000)),
            estimate: Ok(65_000),
            estimate_delay: None,
            submit: Ok(TransactionReference::new(TX_HASH)),
            status_calls: AtomicUsize::new(0),
            estimate_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_statuses(self, statuses: Vec<Result<ConfirmationStatus, PaymentError>>) -> Self {
        *self.statuses.lock() = Script::new(statuses);
        self
    }

    pub(crate) fn with_heights(self, heights: Vec<u64>) -> Self {
        *self.heights.lock() = Script::new(heights.into_iter().map(Ok).collect());
        self
    }

    pub(crate) fn with_balance(mut self, balance: Result<MinorAmount, PaymentError>) -> Self {
        self.balance = balance;
        self
    }

    pub(crate) fn with_estimate(mut self, estimate: Result<u64, PaymentError>) -> Self {
        self.estimate = estimate;
        self
    }

    pub(crate) fn with_estimate_delay(mut self, delay: Duration) -> Self {
        self.estimate_delay = Some(delay);
        self
    }

    pub(crate) fn with_submit(mut self, submit: Result<TransactionReference, PaymentError>) -> Self {
        self.submit = submit;
        self
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn estimate_calls(&self) -> usize {
        self.estimate_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for ScriptedClient {
    async fn get_balance(&self, _address: &str, _token: &TokenRef) -> Result<MinorAmount, PaymentError> {
        self.balance.clone()
    }

    async fn estimate_transfer_cost(
        &self,
        _token: &TokenRef,
        _recipient: &str,
        _amount: MinorAmount,
    ) -> Result<u64, PaymentError> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.estimate_delay {
            tokio::time::sleep(delay).await;
        }
        self.estimate.clone()
    }

    async fn submit_transfer(
        &self,
        _token: &TokenRef,
        _recipient: &str,
        _amount: MinorAmount,
    ) -> Result<TransactionReference, PaymentError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submit.clone()
    }

    async fn get_transaction_status(
        &self,
        _tx: &TransactionReference,
    ) -> Result<ConfirmationStatus, PaymentError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses.lock().next()
    }

    async fn get_current_block_height(&self) -> Result<u64, PaymentError> {
        self.heights.lock().next()
    }
}

/// JSON-RPC replies for wiremock-backed client tests.
pub(crate) mod rpc {
    use serde_json::{json, Value};
    use wiremock::{MockServer, Request, ResponseTemplate};

    /// Echo the request id back; Alloy pairs replies with requests by id.
    fn reply(payload: Value) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static {
        move |request: &Request| {
            let id = serde_json::from_slice::<Value>(&request.body)
                .map(|body| body["id"].clone())
                .unwrap_or(json!(0));
            let mut body = payload.clone();
            body["jsonrpc"] = json!("2.0");
            body["id"] = id;
            ResponseTemplate::new(200).set_body_json(body)
        }
    }

    pub(crate) fn result(result: Value) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static {
        reply(json!({ "result": result }))
    }

    pub(crate) fn error(code: i64, message: &str) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static {
        reply(json!({ "error": { "code": code, "message": message } }))
    }

    /// A full EIP-1559 receipt, as nodes return it.
    pub(crate) fn receipt(tx_hash: &str, success: bool, block: u64) -> Value {
        json!({
            "type": "0x2",
            "status": if success { "0x1" } else { "0x0" },
            "cumulativeGasUsed": "0xfde8",
            "logs": [],
            "logsBloom": format!("0x{}", "0".repeat(512)),
            "transactionHash": tx_hash,
            "transactionIndex": "0x0",
            "blockHash": format!("0x{}", "ab".repeat(32)),
            "blockNumber": format!("{:#x}", block),
            "gasUsed": "0xfde8",
            "effectiveGasPrice": "0x3b9aca00",
            "from": "0x1234567890123456789012345678901234567890",
            "to": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
            "contractAddress": null
        })
    }

    /// `params` of every request the server received for `method`.
    pub(crate) async fn params_of(server: &MockServer, method: &str) -> Vec<Value> {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| serde_json::from_slice::<Value>(&request.body).ok())
            .filter(|body| body["method"] == method)
            .map(|body| body["params"].clone())
            .collect()
    }
}
