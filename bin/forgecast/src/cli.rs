use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "forgecast")]
#[command(
    author,
    version,
    about = "Deploy contract bytecode to EVM networks through your own signer"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "FORGECAST_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Forgecast.toml configuration file.
    ///
    /// If not provided, ./Forgecast.toml is used when present, then the file in the
    /// user configuration directory.
    #[arg(long, alias = "conf", env = "FORGECAST_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy contract bytecode to a network.
    Deploy(DeployArgs),

    /// List the known networks.
    Networks,

    /// Check every RPC endpoint of a network.
    Health {
        /// The network id (see `forgecast networks`).
        #[arg(short, long)]
        network: String,
    },
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// The target network id (see `forgecast networks`).
    #[arg(short, long, env = "FORGECAST_NETWORK")]
    pub network: String,

    /// The contract init code, as 0x-prefixed hex.
    #[arg(long, conflicts_with = "bytecode_file", required_unless_present = "bytecode_file")]
    pub bytecode: Option<String>,

    /// A file containing the contract init code as hex.
    #[arg(long)]
    pub bytecode_file: Option<PathBuf>,

    /// Use this gas limit instead of estimating one.
    #[arg(long)]
    pub gas_limit: Option<u64>,

    /// The JSON-RPC endpoint of the signer.
    ///
    /// Overrides `signer_rpc` from the configuration file.
    #[arg(long, env = "FORGECAST_SIGNER_RPC")]
    pub signer_rpc: Option<Url>,

    /// Do not append the deployment to the record log.
    #[arg(long)]
    pub no_record: bool,
}
