//! Persistent log of successful deployments.

use std::path::{Path, PathBuf};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DeploymentResult, NetworkConfig};

/// Default file name of the deployment log.
pub const DEPLOYMENTS_FILENAME: &str = "Deployments.toml";

/// A confirmed contract deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub contract_address: Address,
    pub transaction_hash: B256,
    pub network: String,
    pub chain_id: u64,
    pub gas_used: u64,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

impl DeploymentRecord {
    /// Build a record from a successful result. Returns `None` for failed deployments.
    pub fn from_result(result: &DeploymentResult, network: &NetworkConfig) -> Option<Self> {
        if !result.success {
            return None;
        }

        let contract_address = result.contract_address?;
        Some(Self {
            contract_address,
            transaction_hash: result.transaction_hash?,
            network: network.id.clone(),
            chain_id: network.chain_id,
            gas_used: result.gas_used.unwrap_or_default(),
            block_number: result.block_number.unwrap_or_default(),
            timestamp: Utc::now(),
            explorer_url: network.explorer_address_url(contract_address),
        })
    }
}

/// All recorded deployments, stored as TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentLog {
    #[serde(default)]
    pub deployments: Vec<DeploymentRecord>,
}

impl DeploymentLog {
    /// Load the log from `path`. A missing file is an empty log.
    ///
    /// If `path` is a directory, [`DEPLOYMENTS_FILENAME`] inside it is used.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let log_path = Self::resolve(path);
        if !log_path.exists() {
            tracing::debug!(path = %log_path.display(), "No deployment log yet");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&log_path)
            .context(format!("Failed to read deployment log from {}", log_path.display()))?;
        let log: Self =
            toml::from_str(&content).context("Failed to parse deployment log as TOML")?;
        tracing::debug!(path = %log_path.display(), count = log.deployments.len(), "Deployment log loaded");
        Ok(log)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let log_path = Self::resolve(path);
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory {}", parent.display()))?;
        }

        let content =
            toml::to_string_pretty(self).context("Failed to serialize deployment log to TOML")?;
        std::fs::write(&log_path, content)
            .context(format!("Failed to write deployment log to {}", log_path.display()))?;
        tracing::info!(path = %log_path.display(), "Deployment log saved");
        Ok(())
    }

    /// Append `record` to the log stored at `path`.
    pub fn append(path: &Path, record: DeploymentRecord) -> Result<Self> {
        let mut log = Self::load_from_file(path)?;
        log.deployments.push(record);
        log.save_to_file(path)?;
        Ok(log)
    }

    /// Deployments on `network`, oldest first.
    pub fn for_network<'a>(&'a self, network: &'a str) -> impl Iterator<Item = &'a DeploymentRecord> {
        self.deployments.iter().filter(move |r| r.network == network)
    }

    fn resolve(path: &Path) -> PathBuf {
        if path.is_dir() {
            path.join(DEPLOYMENTS_FILENAME)
        } else {
            path.to_path_buf()
        }
    }
}
