//! The signer boundary.
//!
//! Key material and user consent live outside this crate. [`WalletSession`] is the
//! interface the orchestrator drives; [`JsonRpcWallet`] implements it against any
//! signer that speaks the EIP-1193 JSON-RPC methods (a local dev node with unlocked
//! accounts, or a signer daemon).

use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::{METHOD_NOT_FOUND_CODE, UNRECOGNIZED_CHAIN_CODE, USER_REJECTED_CODE};
use crate::rpc::{self, json_rpc_call, parse_quantity};
use crate::{NetworkConfig, RawError};

/// A contract-creation transaction. There is no `to`: the bytecode is the init code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployTransaction {
    pub from: Address,
    #[serde(rename = "data")]
    pub bytecode: Bytes,
    /// Gas limit; omitted when estimating.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_quantity")]
    pub gas: Option<u64>,
}

impl DeployTransaction {
    pub fn new(from: Address, bytecode: Bytes) -> Self {
        Self {
            from,
            bytecode,
            gas: None,
        }
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }
}

fn serialize_quantity<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(v) => serializer.serialize_str(&format!("0x{:x}", v)),
        None => serializer.serialize_none(),
    }
}

/// An external signing agent.
///
/// Every call may suspend for user interaction and every call may fail.
pub trait WalletSession: Send + Sync {
    /// Request account access; fails with a user rejection when refused.
    fn connect(&self) -> impl Future<Output = Result<Address, RawError>> + Send;

    /// The account returned by the last successful [`Self::connect`].
    fn current_address(&self) -> Option<Address>;

    fn balance_of(&self, address: Address) -> impl Future<Output = Result<U256, RawError>> + Send;

    /// Point the signer at `network`, registering the network first when the signer
    /// does not know it.
    fn switch_network(
        &self,
        network: &NetworkConfig,
    ) -> impl Future<Output = Result<(), RawError>> + Send;

    fn estimate_gas(
        &self,
        tx: &DeployTransaction,
    ) -> impl Future<Output = Result<u64, RawError>> + Send;

    /// Sign and broadcast; returns the transaction hash.
    fn send_transaction(
        &self,
        tx: &DeployTransaction,
    ) -> impl Future<Output = Result<B256, RawError>> + Send;
}

/// [`WalletSession`] backed by a JSON-RPC signer endpoint.
///
/// Requests are not bounded by the node timeout: the signer may hold a request
/// while the user reviews it.
#[derive(Debug)]
pub struct JsonRpcWallet {
    client: reqwest::Client,
    endpoint: Url,
    request_timeout: Option<Duration>,
    address: RwLock<Option<Address>>,
}

impl JsonRpcWallet {
    /// A wallet that waits on the signer for as long as it takes.
    pub fn new(endpoint: Url) -> Result<Self, anyhow::Error> {
        Self::with_timeout(endpoint, None)
    }

    /// A wallet whose requests give up after `request_timeout`, when set.
    ///
    /// A request that times out may still be approved by the signer later, so the
    /// failure is reported as [`RawError::SignerTimeout`] and never retried.
    pub fn with_timeout(
        endpoint: Url,
        request_timeout: Option<Duration>,
    ) -> Result<Self, anyhow::Error> {
        Ok(Self {
            client: rpc::create_signer_client(request_timeout)?,
            endpoint,
            request_timeout,
            address: RwLock::new(None),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RawError> {
        json_rpc_call(&self.client, &self.endpoint, method, params)
            .await
            .map_err(|e| match e {
                RawError::RequestTimeout { operation, elapsed } => RawError::SignerTimeout {
                    operation,
                    elapsed: self.request_timeout.unwrap_or(elapsed),
                },
                other => other,
            })
    }

    async fn accounts(&self) -> Result<Vec<Address>, RawError> {
        match self.call("eth_requestAccounts", vec![]).await {
            Err(e) if e.code() == Some(METHOD_NOT_FOUND_CODE) => {
                tracing::debug!("Signer does not support eth_requestAccounts, using eth_accounts");
                self.call("eth_accounts", vec![]).await
            }
            other => other,
        }
    }

    async fn request_switch(&self, network: &NetworkConfig) -> Result<(), RawError> {
        self.call::<Value>(
            "wallet_switchEthereumChain",
            vec![serde_json::json!({ "chainId": network.chain_id_hex() })],
        )
        .await
        .map(|_| ())
    }

    async fn add_network(&self, network: &NetworkConfig) -> Result<(), RawError> {
        let explorers: Vec<String> = network.explorer_base_url().into_iter().collect();
        self.call::<Value>(
            "wallet_addEthereumChain",
            vec![serde_json::json!({
                "chainId": network.chain_id_hex(),
                "chainName": network.display_name,
                "rpcUrls": network.rpc_endpoints,
                "nativeCurrency": {
                    "name": network.native_currency.name,
                    "symbol": network.native_currency.symbol,
                    "decimals": network.native_currency.decimals,
                },
                "blockExplorerUrls": explorers,
            })],
        )
        .await
        .map(|_| ())
    }

    /// Signers without wallet methods can only be checked, not switched.
    async fn verify_chain(&self, network: &NetworkConfig) -> Result<(), RawError> {
        let chain_id: String = self.call("eth_chainId", vec![]).await?;
        let chain_id = parse_quantity(&chain_id)?;
        if chain_id == network.chain_id {
            Ok(())
        } else {
            Err(RawError::Other(format!(
                "Signer is on chain {} and cannot switch to {} (chain {})",
                chain_id, network.id, network.chain_id
            )))
        }
    }
}

impl WalletSession for JsonRpcWallet {
    async fn connect(&self) -> Result<Address, RawError> {
        let accounts = self.accounts().await?;
        let address = accounts.first().copied().ok_or_else(|| {
            RawError::provider(Some(USER_REJECTED_CODE), "Signer did not authorize any account")
        })?;

        if let Ok(mut current) = self.address.write() {
            *current = Some(address);
        }
        tracing::info!(address = %address, signer = %self.endpoint, "Wallet connected");
        Ok(address)
    }

    fn current_address(&self) -> Option<Address> {
        self.address.read().ok().and_then(|a| *a)
    }

    async fn balance_of(&self, address: Address) -> Result<U256, RawError> {
        let balance: String = self
            .call(
                "eth_getBalance",
                vec![serde_json::json!(address), serde_json::json!("latest")],
            )
            .await?;
        balance
            .parse::<U256>()
            .map_err(|e| RawError::MalformedResponse(format!("Invalid balance '{balance}': {e}")))
    }

    async fn switch_network(&self, network: &NetworkConfig) -> Result<(), RawError> {
        match self.request_switch(network).await {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some(UNRECOGNIZED_CHAIN_CODE) => {
                tracing::info!(network = %network.id, chain_id = network.chain_id, "Adding network to signer");
                self.add_network(network).await?;
                self.request_switch(network).await
            }
            Err(e) if e.code() == Some(METHOD_NOT_FOUND_CODE) => self.verify_chain(network).await,
            Err(e) => Err(e),
        }
    }

    async fn estimate_gas(&self, tx: &DeployTransaction) -> Result<u64, RawError> {
        let estimate: String = self
            .call("eth_estimateGas", vec![serde_json::json!(tx)])
            .await?;
        parse_quantity(&estimate)
    }

    async fn send_transaction(&self, tx: &DeployTransaction) -> Result<B256, RawError> {
        self.call("eth_sendTransaction", vec![serde_json::json!(tx)])
            .await
    }
}
