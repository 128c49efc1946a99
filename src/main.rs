use std::process::ExitCode;

use chain::{ChainClient, RpcChain};
use claimer::{ClaimSummary, Claimer};
use config::{ClaimTemplate, Config};
use eyre::WrapErr;
use logger::init_default_logger;
use utils::read_private_keys;

mod chain;
mod claimer;
mod config;
mod constants;
mod logger;
mod utils;

async fn run() -> eyre::Result<ClaimSummary> {
    let config = Config::read_default().await?;
    let chain = RpcChain::new(&config.rpc_url)?;

    run_with(chain, &config).await
}

/// Connectivity check, then the key file, then the batch. Nothing but
/// `chain_id` reaches the endpoint before the keys are loaded.
async fn run_with<C: ChainClient>(chain: C, config: &Config) -> eyre::Result<ClaimSummary> {
    let template = ClaimTemplate::from_config(config)?;

    let chain_id = chain
        .chain_id()
        .await
        .wrap_err_with(|| format!("Failed to connect to {}", config.rpc_url))?;

    if chain_id != template.chain_id {
        tracing::warn!(
            "RPC reports chain id {chain_id}, transactions will be signed for {}",
            template.chain_id
        );
    }

    let signers = read_private_keys(&config.private_keys_file_path).await?;
    tracing::info!(
        "Found {} private keys in {}",
        signers.len(),
        config.private_keys_file_path
    );

    let claimer = Claimer::new(chain, template);
    let outcomes = claimer.claim_for_all(&signers).await;

    Ok(ClaimSummary::from_outcomes(&outcomes))
}

#[tokio::main]
async fn main() -> ExitCode {
    let _guard = init_default_logger();

    match run().await {
        Ok(summary) => {
            tracing::info!("All keys processed. {summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
