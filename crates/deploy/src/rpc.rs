//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::future::Future;
use std::time::Duration;

use alloy_core::primitives::{Address, B256};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::RawError;

/// Default timeout for RPC requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Create an HTTP client for a signer endpoint.
///
/// Signer calls can wait on user approval, so only the connection is bounded by
/// [`DEFAULT_TIMEOUT`]; the whole request is bounded by `timeout` when set.
pub fn create_signer_client(timeout: Option<Duration>) -> Result<reqwest::Client, anyhow::Error> {
    let mut builder = reqwest::Client::builder().connect_timeout(DEFAULT_TIMEOUT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context("Failed to create signer HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result. Failures keep enough structure (error code, transport vs.
/// decoding) for [`crate::classify`] to tell transient failures from terminal ones.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, RawError> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                RawError::RequestTimeout {
                    operation: method.to_string(),
                    elapsed: DEFAULT_TIMEOUT,
                }
            } else {
                RawError::Transport(format!("{method} request to {url} failed: {e}"))
            }
        })?;

    let status = response.status();
    let body: Value = match response.json().await {
        Ok(body) => body,
        Err(_) if !status.is_success() => {
            return Err(RawError::Transport(format!(
                "{method} request to {url} returned HTTP {status}"
            )));
        }
        Err(e) => {
            return Err(RawError::MalformedResponse(format!(
                "Failed to parse {method} response: {e}"
            )));
        }
    };

    if let Some(error) = body.get("error") {
        return Err(RawError::Provider {
            code: error.get("code").and_then(|c| c.as_i64()),
            message: error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string(),
        });
    }

    let result = body
        .get("result")
        .cloned()
        .ok_or_else(|| RawError::MalformedResponse(format!("No result in {method} response")))?;

    serde_json::from_value(result).map_err(|e| {
        RawError::MalformedResponse(format!("Failed to deserialize {method} result: {e}"))
    })
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(hex: &str) -> Result<u64, RawError> {
    u64::from_str_radix(hex.trim_start_matches("0x"), 16)
        .map_err(|e| RawError::MalformedResponse(format!("Invalid quantity '{hex}': {e}")))
}

/// Deserialize a u64 from a hex string (with 0x prefix).
fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

/// Receipts from pre-Byzantium blocks carry no status field.
fn deserialize_status<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let status: Option<String> = Deserialize::deserialize(deserializer)?;
    match status.as_deref() {
        None => Ok(true),
        Some(s) => u64::from_str_radix(s.trim_start_matches("0x"), 16)
            .map(|v| v == 1)
            .map_err(serde::de::Error::custom),
    }
}

fn default_status() -> bool {
    true
}

/// Transaction receipt, as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    /// Set when the transaction created a contract.
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub gas_used: u64,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub block_number: u64,
    /// `true` when execution succeeded.
    #[serde(default = "default_status", deserialize_with = "deserialize_status")]
    pub status: bool,
}

/// Read-only access to a network's JSON-RPC endpoints.
///
/// Implementations are transport-agnostic from the orchestrator's point of view;
/// every call names the endpoint it must use.
pub trait RpcClient: Send + Sync {
    /// Liveness call: the latest block number known to `endpoint`.
    fn block_number(&self, endpoint: &Url) -> impl Future<Output = Result<u64, RawError>> + Send;

    /// Receipt lookup; `Ok(None)` while the transaction is not yet included.
    fn transaction_receipt(
        &self,
        endpoint: &Url,
        hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>, RawError>> + Send;
}

/// [`RpcClient`] over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct HttpRpcClient {
    client: reqwest::Client,
}

impl HttpRpcClient {
    pub fn new() -> Result<Self, anyhow::Error> {
        Ok(Self {
            client: create_client()?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Query eth_chainId and parse the hex result to u64.
    pub async fn chain_id(&self, endpoint: &Url) -> Result<u64, RawError> {
        let result: String = json_rpc_call(&self.client, endpoint, "eth_chainId", vec![]).await?;
        parse_quantity(&result)
    }
}

impl RpcClient for HttpRpcClient {
    async fn block_number(&self, endpoint: &Url) -> Result<u64, RawError> {
        let result: String =
            json_rpc_call(&self.client, endpoint, "eth_blockNumber", vec![]).await?;
        parse_quantity(&result)
    }

    async fn transaction_receipt(
        &self,
        endpoint: &Url,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, RawError> {
        json_rpc_call(
            &self.client,
            endpoint,
            "eth_getTransactionReceipt",
            vec![serde_json::json!(hash)],
        )
        .await
    }
}
