use std::{path::Path, time::Duration};

use alloy::primitives::{utils::parse_ether, Address, U256};
use serde::Deserialize;

use crate::constants::{
    CONFIG_FILE_PATH, DEFAULT_CHAIN_ID, DEFAULT_CONTRACT_ADDRESS, DEFAULT_GAS_BUDGET,
    DEFAULT_GAS_LIMIT_MARGIN, DEFAULT_GAS_PRICE_GWEI, DEFAULT_PRICE_PER_TOKEN, DEFAULT_QUANTITY,
    DEFAULT_RECEIPT_POLL_INTERVAL_MS, DEFAULT_RPC_URL, NATIVE_CURRENCY_ADDRESS,
    PRIVATE_KEYS_FILE_PATH,
};

const GWEI: u128 = 1_000_000_000;

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default, deny_unknown_fields)]
pub struct Config {
    pub rpc_url: String,
    pub chain_id: u64,
    pub contract_address: Address,
    pub currency_address: Address,
    pub quantity: u64,
    /// Decimal string in ether units, e.g. "1" or "0.05".
    pub price_per_token: String,
    pub gas_price_gwei: u64,
    pub gas_budget: u64,
    pub gas_limit_margin: u64,
    pub receipt_poll_interval_ms: u64,
    pub receipt_timeout_secs: Option<u64>,
    pub private_keys_file_path: String,
    pub explorer_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            chain_id: DEFAULT_CHAIN_ID,
            contract_address: DEFAULT_CONTRACT_ADDRESS,
            currency_address: NATIVE_CURRENCY_ADDRESS,
            quantity: DEFAULT_QUANTITY,
            price_per_token: DEFAULT_PRICE_PER_TOKEN.to_string(),
            gas_price_gwei: DEFAULT_GAS_PRICE_GWEI,
            gas_budget: DEFAULT_GAS_BUDGET,
            gas_limit_margin: DEFAULT_GAS_LIMIT_MARGIN,
            receipt_poll_interval_ms: DEFAULT_RECEIPT_POLL_INTERVAL_MS,
            receipt_timeout_secs: None,
            private_keys_file_path: PRIVATE_KEYS_FILE_PATH.to_string(),
            explorer_url: None,
        }
    }
}

impl Config {
    async fn read_from_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let cfg_str = tokio::fs::read_to_string(path).await?;
        Ok(toml::from_str(&cfg_str)?)
    }

    pub async fn read_default() -> eyre::Result<Self> {
        if !tokio::fs::try_exists(CONFIG_FILE_PATH).await? {
            tracing::warn!("{CONFIG_FILE_PATH} not found, using built-in defaults");
            return Ok(Self::default());
        }

        Self::read_from_file(CONFIG_FILE_PATH)
            .await
            .map_err(|e| eyre::eyre!("Failed to read {CONFIG_FILE_PATH}: {e}"))
    }
}

/// Everything the submitter needs to build a claim, resolved once from [`Config`]
/// and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct ClaimTemplate {
    pub chain_id: u64,
    pub contract: Address,
    pub currency: Address,
    pub quantity: U256,
    pub price_per_token: U256,
    /// Native value attached to every claim: `price_per_token * quantity`.
    pub value: U256,
    pub gas_price: u128,
    pub gas_limit_margin: u64,
    /// Accounts holding less than this are skipped before any estimate.
    pub min_balance: U256,
    pub poll_interval: Duration,
    pub receipt_timeout: Option<Duration>,
    pub explorer_url: Option<String>,
}

impl ClaimTemplate {
    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        eyre::ensure!(config.quantity > 0, "QUANTITY must be greater than zero");
        eyre::ensure!(
            config.receipt_poll_interval_ms > 0,
            "RECEIPT_POLL_INTERVAL_MS must be greater than zero"
        );
        eyre::ensure!(
            config.receipt_timeout_secs != Some(0),
            "RECEIPT_TIMEOUT_SECS must be greater than zero, omit it to wait without a limit"
        );

        let price_per_token = parse_ether(&config.price_per_token).map_err(|e| {
            eyre::eyre!("Invalid PRICE_PER_TOKEN `{}`: {e}", config.price_per_token)
        })?;
        let quantity = U256::from(config.quantity);
        let value = price_per_token
            .checked_mul(quantity)
            .ok_or_else(|| eyre::eyre!("PRICE_PER_TOKEN * QUANTITY overflows"))?;

        let gas_price = u128::from(config.gas_price_gwei) * GWEI;
        let min_balance = U256::from(config.gas_budget)
            .checked_mul(U256::from(gas_price))
            .and_then(|gas_cost| gas_cost.checked_add(value))
            .ok_or_else(|| eyre::eyre!("Minimum balance overflows"))?;

        Ok(Self {
            chain_id: config.chain_id,
            contract: config.contract_address,
            currency: config.currency_address,
            quantity,
            price_per_token,
            value,
            gas_price,
            gas_limit_margin: config.gas_limit_margin,
            min_balance,
            poll_interval: Duration::from_millis(config.receipt_poll_interval_ms),
            receipt_timeout: config.receipt_timeout_secs.map(Duration::from_secs),
            explorer_url: config
                .explorer_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    pub fn tx_link(&self, tx_hash: impl std::fmt::Display) -> String {
        match &self.explorer_url {
            Some(url) => format!("{url}/tx/{tx_hash}"),
            None => tx_hash.to_string(),
        }
    }
}
