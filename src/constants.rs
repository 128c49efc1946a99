use alloy::primitives::{address, Address};

// Pharos testnet ZENITH badge drop
pub const DEFAULT_RPC_URL: &str = "https://testnet.dplabs-internal.com";
pub const DEFAULT_CHAIN_ID: u64 = 688688;
pub const DEFAULT_CONTRACT_ADDRESS: Address = address!("f4535d0781d973a26b48c617410419ec66b2af1c");

// Drop contracts use this sentinel for the chain's native token
pub const NATIVE_CURRENCY_ADDRESS: Address = address!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

pub const DEFAULT_QUANTITY: u64 = 1;
pub const DEFAULT_PRICE_PER_TOKEN: &str = "1";
pub const DEFAULT_GAS_PRICE_GWEI: u64 = 10;
pub const DEFAULT_GAS_BUDGET: u64 = 200_000;
pub const DEFAULT_GAS_LIMIT_MARGIN: u64 = 10_000;
pub const DEFAULT_RECEIPT_POLL_INTERVAL_MS: u64 = 1_000;

// FILES
pub const CONFIG_FILE_PATH: &str = "data/config.toml";
pub const PRIVATE_KEYS_FILE_PATH: &str = "data/private_keys.txt";
pub const LOGS_DIR: &str = "logs";
pub const LOG_FILE_NAME: &str = "badge-claimer.log";
