//! forgecast deploys contract bytecode to EVM networks through a signer you control.

mod cli;
mod config;

use std::path::Path;
use std::sync::Arc;

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command, DeployArgs};
use config::AppConfig;
use forgecast_deploy::{
    DeploymentLog, DeploymentOrchestrator, DeploymentRecord, DeploymentRequest, HttpRpcClient,
    JsonRpcWallet, NetworkRegistry, RpcHealthProbe,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = AppConfig::load(cli.config.as_deref())?;
    let registry = config.registry()?;

    match cli.command {
        Command::Deploy(args) => deploy(&config, registry, args).await,
        Command::Networks => {
            print_networks(&registry);
            Ok(())
        }
        Command::Health { network } => health(&config, &registry, &network).await,
    }
}

async fn deploy(config: &AppConfig, registry: NetworkRegistry, args: DeployArgs) -> Result<()> {
    let bytecode = read_bytecode(&args)?;
    let signer_rpc = config.signer_rpc(args.signer_rpc.clone())?;

    tracing::info!(
        network = %args.network,
        signer = %signer_rpc,
        bytecode_len = bytecode.len(),
        "Preparing deployment..."
    );

    let registry = Arc::new(registry);
    let wallet = Arc::new(JsonRpcWallet::with_timeout(signer_rpc, config.signer_timeout())?);
    let rpc = Arc::new(HttpRpcClient::new()?);

    let orchestrator = DeploymentOrchestrator::new(registry.clone(), wallet, rpc)
        .with_policy(config.policy.clone())
        .on_progress(|progress| tracing::info!(%progress, "Deployment progress"));

    let mut request = DeploymentRequest::new(bytecode, args.network.clone());
    if let Some(gas_limit) = args.gas_limit {
        request = request.with_gas_limit(gas_limit);
    }

    // Ctrl+C stops the flow; a transaction already broadcast stays broadcast.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling deployment...");
            on_signal.cancel();
        }
    });

    let result = orchestrator.run_with_cancel(request, cancel).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialize deployment result")?
    );

    if result.success {
        let network = registry.get(&result.network_id)?;
        if let Some(address) = result.contract_address {
            if let Some(url) = network.explorer_address_url(address) {
                tracing::info!(%url, "View contract");
            }
        }

        if !args.no_record {
            if let Some(record) = DeploymentRecord::from_result(&result, network) {
                DeploymentLog::append(&config.records_path, record)?;
            }
        }
        return Ok(());
    }

    if let (Some(hash), Ok(network)) = (result.transaction_hash, registry.get(&result.network_id)) {
        tracing::warn!(
            tx_hash = %hash,
            explorer = %network.explorer_tx_url(hash).unwrap_or_default(),
            "The transaction was broadcast; check whether it was included before retrying"
        );
    }

    match result.error {
        Some(error) => Err(anyhow::anyhow!(error)).context("Deployment failed"),
        None => anyhow::bail!("Deployment failed"),
    }
}

async fn health(config: &AppConfig, registry: &NetworkRegistry, network_id: &str) -> Result<()> {
    let network = registry.get(network_id)?;
    let rpc = HttpRpcClient::new()?;
    let probe = RpcHealthProbe::new(config.policy.probe_timeout());

    let report = probe.survey(&rpc, network).await;
    println!("{report}");

    if !report.healthy {
        anyhow::bail!("No healthy RPC endpoint for network '{network_id}'");
    }
    Ok(())
}

fn print_networks(registry: &NetworkRegistry) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Id",
        "Chain ID",
        "Name",
        "Currency",
        "RPC endpoints",
        "Explorer",
    ]);

    for network in registry.iter() {
        table.add_row(vec![
            network.id.clone(),
            network.chain_id.to_string(),
            network.display_name.clone(),
            network.native_currency.symbol.clone(),
            network.rpc_endpoints.len().to_string(),
            network.explorer_base_url().unwrap_or_else(|| "-".to_string()),
        ]);
    }

    println!("{table}");
}

fn read_bytecode(args: &DeployArgs) -> Result<Bytes> {
    let hex = match (&args.bytecode, &args.bytecode_file) {
        (Some(hex), _) => hex.clone(),
        (None, Some(path)) => read_bytecode_file(path)?,
        (None, None) => anyhow::bail!("Either --bytecode or --bytecode-file is required"),
    };

    let bytecode: Bytes = hex
        .trim()
        .parse()
        .context("Bytecode is not valid hex")?;
    if bytecode.is_empty() {
        anyhow::bail!("Bytecode is empty");
    }
    Ok(bytecode)
}

fn read_bytecode_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .context(format!("Failed to read bytecode from {}", path.display()))
}
