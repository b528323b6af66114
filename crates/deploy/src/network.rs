//! Catalog of target networks and their RPC endpoints.

use std::collections::BTreeMap;

use alloy_core::primitives::{Address, B256};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{GasPolicy, RawError};

/// Native currency metadata, as expected by `wallet_addEthereumChain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl NativeCurrency {
    pub fn ether() -> Self {
        Self {
            name: "Ether".to_string(),
            symbol: "ETH".to_string(),
            decimals: 18,
        }
    }
}

impl Default for NativeCurrency {
    fn default() -> Self {
        Self::ether()
    }
}

/// A deployable network.
///
/// `rpc_endpoints` is ordered by preference; the health probe tries them in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Registry key, e.g. `sepolia`.
    pub id: String,
    pub chain_id: u64,
    pub display_name: String,
    pub rpc_endpoints: Vec<Url>,
    /// Explorer link template with `{kind}` (`tx` or `address`) and `{id}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_url_template: Option<String>,
    #[serde(default)]
    pub native_currency: NativeCurrency,
    /// Overrides the policy-wide gas settings for this network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<GasPolicy>,
}

impl NetworkConfig {
    /// The chain id as the `0x`-prefixed quantity used by wallet RPC methods.
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    pub fn explorer_tx_url(&self, hash: B256) -> Option<String> {
        self.explorer_url("tx", &hash.to_string())
    }

    pub fn explorer_address_url(&self, address: Address) -> Option<String> {
        self.explorer_url("address", &address.to_checksum(None))
    }

    /// Base URL of the explorer, with the templated path stripped.
    pub fn explorer_base_url(&self) -> Option<String> {
        let template = self.explorer_url_template.as_deref()?;
        let base = template
            .split("/{kind}")
            .next()
            .unwrap_or(template)
            .trim_end_matches('/');
        Some(base.to_string())
    }

    fn explorer_url(&self, kind: &str, id: &str) -> Option<String> {
        self.explorer_url_template
            .as_ref()
            .map(|template| template.replace("{kind}", kind).replace("{id}", id))
    }
}

/// Read-only lookup of networks by id.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: BTreeMap<String, NetworkConfig>,
}

impl NetworkRegistry {
    /// Build a registry from a set of networks.
    ///
    /// Fails on duplicate ids or on a network without any RPC endpoint.
    pub fn new(networks: impl IntoIterator<Item = NetworkConfig>) -> Result<Self> {
        let mut registry = Self::default();
        for network in networks {
            validate(&network)?;
            if registry.networks.contains_key(&network.id) {
                anyhow::bail!("Duplicate network id '{}'", network.id);
            }
            registry.networks.insert(network.id.clone(), network);
        }
        Ok(registry)
    }

    /// The built-in catalog of public test networks plus a local dev node.
    pub fn builtin() -> Self {
        let networks = builtin_networks()
            .into_iter()
            .map(|network| (network.id.clone(), network))
            .collect();
        Self { networks }
    }

    /// Extend the registry, replacing networks that share an id.
    pub fn with_networks(mut self, networks: impl IntoIterator<Item = NetworkConfig>) -> Result<Self> {
        for network in networks {
            validate(&network)?;
            if self.networks.contains_key(&network.id) {
                tracing::debug!(network = %network.id, "Overriding built-in network");
            }
            self.networks.insert(network.id.clone(), network);
        }
        Ok(self)
    }

    pub fn get(&self, network_id: &str) -> Result<&NetworkConfig, RawError> {
        self.networks
            .get(network_id)
            .ok_or_else(|| RawError::UnknownNetwork(network_id.to_string()))
    }

    pub fn by_chain_id(&self, chain_id: u64) -> Option<&NetworkConfig> {
        self.networks.values().find(|n| n.chain_id == chain_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkConfig> {
        self.networks.values()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

fn validate(network: &NetworkConfig) -> Result<()> {
    if network.id.trim().is_empty() {
        anyhow::bail!("Network id must not be empty");
    }
    if network.rpc_endpoints.is_empty() {
        anyhow::bail!("Network '{}' has no RPC endpoints", network.id);
    }
    Ok(())
}

fn endpoints(urls: &[&str]) -> Vec<Url> {
    urls.iter().filter_map(|u| Url::parse(u).ok()).collect()
}

fn builtin_networks() -> Vec<NetworkConfig> {
    vec![
        NetworkConfig {
            id: "sepolia".to_string(),
            chain_id: 11155111,
            display_name: "Sepolia".to_string(),
            rpc_endpoints: endpoints(&[
                "https://ethereum-sepolia-rpc.publicnode.com",
                "https://sepolia.drpc.org",
                "https://rpc.sepolia.org",
            ]),
            explorer_url_template: Some("https://sepolia.etherscan.io/{kind}/{id}".to_string()),
            native_currency: NativeCurrency {
                name: "Sepolia Ether".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            gas: None,
        },
        NetworkConfig {
            id: "holesky".to_string(),
            chain_id: 17000,
            display_name: "Holesky".to_string(),
            rpc_endpoints: endpoints(&[
                "https://ethereum-holesky-rpc.publicnode.com",
                "https://holesky.drpc.org",
            ]),
            explorer_url_template: Some("https://holesky.etherscan.io/{kind}/{id}".to_string()),
            native_currency: NativeCurrency {
                name: "Holesky Ether".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            gas: None,
        },
        NetworkConfig {
            id: "base-sepolia".to_string(),
            chain_id: 84532,
            display_name: "Base Sepolia".to_string(),
            rpc_endpoints: endpoints(&[
                "https://sepolia.base.org",
                "https://base-sepolia-rpc.publicnode.com",
            ]),
            explorer_url_template: Some("https://sepolia.basescan.org/{kind}/{id}".to_string()),
            native_currency: NativeCurrency::ether(),
            gas: None,
        },
        NetworkConfig {
            id: "optimism-sepolia".to_string(),
            chain_id: 11155420,
            display_name: "OP Sepolia".to_string(),
            rpc_endpoints: endpoints(&[
                "https://sepolia.optimism.io",
                "https://optimism-sepolia-rpc.publicnode.com",
            ]),
            explorer_url_template: Some(
                "https://sepolia-optimism.etherscan.io/{kind}/{id}".to_string(),
            ),
            native_currency: NativeCurrency::ether(),
            gas: None,
        },
        NetworkConfig {
            id: "arbitrum-sepolia".to_string(),
            chain_id: 421614,
            display_name: "Arbitrum Sepolia".to_string(),
            rpc_endpoints: endpoints(&[
                "https://sepolia-rollup.arbitrum.io/rpc",
                "https://arbitrum-sepolia-rpc.publicnode.com",
            ]),
            explorer_url_template: Some("https://sepolia.arbiscan.io/{kind}/{id}".to_string()),
            native_currency: NativeCurrency::ether(),
            gas: None,
        },
        NetworkConfig {
            id: "anvil".to_string(),
            chain_id: 31337,
            display_name: "Local Anvil".to_string(),
            rpc_endpoints: endpoints(&["http://localhost:8545"]),
            explorer_url_template: None,
            native_currency: NativeCurrency::ether(),
            gas: None,
        },
    ]
}
