//! Layered application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use forgecast_deploy::{DEPLOYMENTS_FILENAME, DeploymentPolicy, NetworkConfig, NetworkRegistry};
use serde::{Deserialize, Serialize};
use url::Url;

pub const CONFIG_FILENAME: &str = "Forgecast.toml";
const CONFIG_DIR: &str = "forgecast";
const ENV_PREFIX: &str = "FORGECAST_";

/// Local dev node with unlocked accounts.
const DEFAULT_SIGNER_RPC: &str = "http://localhost:8545";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Retry, timeout and gas policy.
    pub policy: DeploymentPolicy,
    /// Extra networks; an entry with a built-in id replaces the built-in one.
    pub networks: Vec<NetworkConfig>,
    /// The JSON-RPC endpoint of the signer; a local dev node when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_rpc: Option<Url>,
    /// Give up on a signer request after this many seconds; wait indefinitely when
    /// unset. A timed-out request is not retried, since the signer may still send it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_timeout_secs: Option<u64>,
    /// Where successful deployments are recorded.
    pub records_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            policy: DeploymentPolicy::default(),
            networks: Vec::new(),
            signer_rpc: None,
            signer_timeout_secs: None,
            records_path: PathBuf::from(DEPLOYMENTS_FILENAME),
        }
    }
}

impl AppConfig {
    /// Defaults, then the configuration file, then `FORGECAST_*` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        match Self::config_path(explicit) {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Configuration file not found: {}", path.display());
                }
                tracing::debug!(path = %path.display(), "Loading configuration file");
                figment = figment.merge(Toml::file(path));
            }
            None => tracing::debug!("No configuration file, using defaults"),
        }

        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to load configuration")?;

        config.policy.validate().context("Invalid deployment policy")?;
        if config.signer_timeout_secs == Some(0) {
            anyhow::bail!("signer_timeout_secs must be at least 1");
        }
        Ok(config)
    }

    /// The built-in networks with the configured ones merged over them.
    pub fn registry(&self) -> Result<NetworkRegistry> {
        NetworkRegistry::builtin()
            .with_networks(self.networks.iter().cloned())
            .context("Invalid network configuration")
    }

    /// The signer endpoint: the command-line value, else the configured one, else
    /// the local dev node.
    pub fn signer_rpc(&self, cli: Option<Url>) -> Result<Url> {
        match cli.or_else(|| self.signer_rpc.clone()) {
            Some(url) => Ok(url),
            None => Url::parse(DEFAULT_SIGNER_RPC).context("Invalid default signer URL"),
        }
    }

    pub fn signer_timeout(&self) -> Option<Duration> {
        self.signer_timeout_secs.map(Duration::from_secs)
    }

    /// The explicit path, else `./Forgecast.toml`, else the user configuration directory.
    fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        let local = PathBuf::from(CONFIG_FILENAME);
        if local.exists() {
            return Some(local);
        }

        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILENAME))
            .filter(|path| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new("forgecast-config").unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
signer_rpc = "http://signer.test:9000/"

[policy]
max_retries = 5
confirmation_timeout_secs = 60

[policy.gas]
buffer_multiplier = 1.5

[[networks]]
id = "sepolia"
chain_id = 11155111
display_name = "Sepolia (private node)"
rpc_endpoints = ["http://sepolia.internal:8545/"]

[[networks]]
id = "devnet"
chain_id = 1337
display_name = "Devnet"
rpc_endpoints = ["http://devnet.internal:8545/"]
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(
            config.signer_rpc(None).unwrap().as_str(),
            "http://signer.test:9000/"
        );
        assert_eq!(config.policy.max_retries, 5);
        assert_eq!(config.policy.confirmation_timeout_secs, 60);
        assert_eq!(config.policy.retry_delay_secs, 2);
        assert_eq!(config.policy.gas.buffer_multiplier, 1.5);
        assert_eq!(config.policy.gas.fallback_limit, 2_000_000);

        let registry = config.registry().unwrap();
        let sepolia = registry.get("sepolia").unwrap();
        assert_eq!(sepolia.display_name, "Sepolia (private node)");
        assert_eq!(sepolia.rpc_endpoints.len(), 1);
        assert!(registry.get("devnet").is_ok());
        assert!(registry.get("holesky").is_ok());
    }

    #[test]
    fn test_signer_rpc_precedence() {
        let config = AppConfig::default();
        assert_eq!(config.signer_rpc(None).unwrap().as_str(), "http://localhost:8545/");

        let cli = Url::parse("http://cli.test/").unwrap();
        let configured = AppConfig {
            signer_rpc: Some(Url::parse("http://file.test/").unwrap()),
            ..AppConfig::default()
        };
        assert_eq!(configured.signer_rpc(Some(cli.clone())).unwrap(), cli);
        assert_eq!(configured.signer_rpc(None).unwrap().as_str(), "http://file.test/");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new("forgecast-config").unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_invalid_policy_is_rejected_at_load() {
        let dir = TempDir::new("forgecast-config").unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[policy]\npoll_interval_secs = 0\n").unwrap();

        let err = AppConfig::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("poll_interval_secs"), "{err:#}");

        std::fs::write(&path, "[policy]\nreceipt_request_timeout_secs = 30\n").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_signer_timeout_is_optional() {
        let dir = TempDir::new("forgecast-config").unwrap();
        let path = dir.path().join(CONFIG_FILENAME);

        std::fs::write(&path, "records_path = \"deployments.toml\"\n").unwrap();
        assert_eq!(AppConfig::load(Some(&path)).unwrap().signer_timeout(), None);

        std::fs::write(&path, "signer_timeout_secs = 600\n").unwrap();
        assert_eq!(
            AppConfig::load(Some(&path)).unwrap().signer_timeout(),
            Some(Duration::from_secs(600))
        );

        std::fs::write(&path, "signer_timeout_secs = 0\n").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }
}
