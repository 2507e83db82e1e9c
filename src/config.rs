//! Relay configuration
//!
//! Loaded from environment variables (optionally via a `.env` file).
//!
//! # Environment Variable Schema
//!
//! ```text
//! RELAYER_PRIVATE_KEY=0x...          # signing key used on every destination
//! CHAINS_COUNT=2                     # number of chain profiles
//! CHAIN_1_NAME=ethereum
//! CHAIN_1_CHAIN_ID=1
//! CHAIN_1_RPC_URL=https://a,https://b   # first is primary, rest are fallbacks
//! CHAIN_1_WS_URL=wss://...             # optional, enables live subscription
//! CHAIN_1_BRIDGE_ADDRESS=0x...
//! CHAIN_1_ORACLE_ADDRESS=0x...         # optional
//! CHAIN_1_CONFIRMATIONS=12             # optional, default 12
//! CHAIN_1_BLOCK_TIME_MS=12000          # optional, default 12000
//! CHAIN_1_ENABLED=true                 # optional, default true
//! CHAIN_1_START_BLOCK=19000000         # optional, first block to reconcile
//! ```

use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::chain::rpc::{parse_rpc_urls, validate_url};
use crate::error::RelayError;
use crate::types::ChainId;

/// Main configuration for the relay
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chains: Vec<ChainProfile>,
    pub signer: SignerConfig,
    pub relayer: RelayerConfig,
    pub listener: ListenerConfig,
    pub fees: FeeConfig,
    pub dispatcher: DispatcherConfig,
    pub api: ApiConfig,
}

/// Static description of one supported chain. Immutable after load.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainProfile {
    pub chain_id: ChainId,
    pub name: String,
    /// Primary RPC URL followed by fallbacks
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub ws_url: Option<String>,
    pub bridge_address: String,
    #[serde(default)]
    pub oracle_address: Option<String>,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// First block scanned by the poll path; defaults to the safe tip at startup
    #[serde(default)]
    pub start_block: Option<u64>,
}

impl ChainProfile {
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(eyre!("Chain {} has chain id 0", self.name));
        }
        if self.rpc_urls.is_empty() {
            return Err(eyre!("RPC URL is empty for chain {}", self.name));
        }
        for url in &self.rpc_urls {
            validate_url(url, &format!("{}_RPC_URL", self.name), &["http", "https"])?;
        }
        if let Some(ref ws) = self.ws_url {
            validate_url(ws, &format!("{}_WS_URL", self.name), &["ws", "wss"])?;
        }
        if !is_hex_address(&self.bridge_address) {
            return Err(eyre!(
                "Invalid bridge address for chain {}: {} (expected 0x-prefixed 42-char hex)",
                self.name,
                self.bridge_address
            ));
        }
        if let Some(ref oracle) = self.oracle_address {
            if !is_hex_address(oracle) {
                return Err(eyre!(
                    "Invalid oracle address for chain {}: {}",
                    self.name,
                    oracle
                ));
            }
        }
        Ok(())
    }
}

/// Destination signing identity
#[derive(Clone, Deserialize)]
pub struct SignerConfig {
    pub private_key: String,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerConfig")
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Whether messages without an available proof may be executed on the
/// relayer's authority alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TrustPolicy {
    AllowTrusted,
    ProofOnly,
}

impl FromStr for TrustPolicy {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "allow" => Ok(TrustPolicy::AllowTrusted),
            "false" | "0" | "no" | "proof-only" => Ok(TrustPolicy::ProofOnly),
            other => Err(eyre!("Invalid TRUSTED_FALLBACK value: {}", other)),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_interval")]
    pub batch_interval_ms: u64,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_trust_policy")]
    pub trust_policy: TrustPolicy,
    #[serde(default = "default_proof_retention")]
    pub proof_retention_blocks: u64,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_interval_ms: default_batch_interval(),
            stats_interval_ms: default_stats_interval(),
            max_retries: default_max_retries(),
            trust_policy: default_trust_policy(),
            proof_retention_blocks: default_proof_retention(),
        }
    }
}

/// Chain listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Capacity of the dedupe cache of seen events
    #[serde(default = "default_seen_cache_size")]
    pub seen_cache_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_block_range: default_max_block_range(),
            reconnect_base_ms: default_reconnect_base(),
            reconnect_max_ms: default_reconnect_max(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            seen_cache_size: default_seen_cache_size(),
        }
    }
}

impl ListenerConfig {
    /// Reconnect delay for a given attempt: base * 2^attempt, capped
    pub fn reconnect_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let millis = self.reconnect_base_ms.saturating_mul(factor);
        Duration::from_millis(millis.min(self.reconnect_max_ms))
    }
}

/// Fee bidding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    /// Multiplier applied to the network fee estimate
    #[serde(default = "default_gas_price_multiplier")]
    pub gas_price_multiplier: f64,
    /// Hard ceiling for max fee per gas, in gwei
    #[serde(default = "default_max_fee_per_gas_gwei")]
    pub max_fee_per_gas_gwei: u64,
    /// Additional multiplier per retry attempt
    #[serde(default = "default_retry_fee_multiplier")]
    pub retry_fee_multiplier: f64,
    /// Multiplier over the previous bid when speeding up
    #[serde(default = "default_speed_up_fee_multiplier")]
    pub speed_up_fee_multiplier: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            gas_price_multiplier: default_gas_price_multiplier(),
            max_fee_per_gas_gwei: default_max_fee_per_gas_gwei(),
            retry_fee_multiplier: default_retry_fee_multiplier(),
            speed_up_fee_multiplier: default_speed_up_fee_multiplier(),
        }
    }
}

/// Transaction dispatcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_ms: u64,
    /// Gas added on top of the message's own gas limit for proof checks
    #[serde(default = "default_gas_overhead")]
    pub gas_overhead: u64,
    /// Maximum send attempts per submission (nonce resync, fee bumps)
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_ms: default_confirmation_timeout(),
            gas_overhead: default_gas_overhead(),
            max_send_attempts: default_max_send_attempts(),
        }
    }
}

impl DispatcherConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

/// Health/metrics HTTP surface
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind")]
    pub bind_address: String,
}

// Default functions
fn default_confirmations() -> u64 {
    12
}

fn default_block_time_ms() -> u64 {
    12_000
}

fn default_enabled() -> bool {
    true
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_interval() -> u64 {
    5_000
}

fn default_stats_interval() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_trust_policy() -> TrustPolicy {
    TrustPolicy::AllowTrusted
}

fn default_proof_retention() -> u64 {
    1_000
}

fn default_poll_interval() -> u64 {
    15_000
}

fn default_max_block_range() -> u64 {
    2_000
}

fn default_reconnect_base() -> u64 {
    1_000
}

fn default_reconnect_max() -> u64 {
    60_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_seen_cache_size() -> usize {
    100_000
}

fn default_gas_price_multiplier() -> f64 {
    1.1
}

fn default_max_fee_per_gas_gwei() -> u64 {
    500
}

fn default_retry_fee_multiplier() -> f64 {
    1.2
}

fn default_speed_up_fee_multiplier() -> f64 {
    1.5
}

fn default_confirmation_timeout() -> u64 {
    120_000
}

fn default_gas_overhead() -> u64 {
    100_000
}

fn default_max_send_attempts() -> u32 {
    3
}

fn default_api_bind() -> String {
    "0.0.0.0:9090".to_string()
}

fn is_hex_address(value: &str) -> bool {
    value.len() == 42
        && value.starts_with("0x")
        && value[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        let signer = SignerConfig {
            private_key: env::var("RELAYER_PRIVATE_KEY").map_err(|_| {
                RelayError::Configuration(
                    "RELAYER_PRIVATE_KEY environment variable is required".to_string(),
                )
            })?,
        };

        let chains = load_chains_from_env()?;

        let relayer = RelayerConfig {
            batch_size: env_or("BATCH_SIZE", default_batch_size()),
            batch_interval_ms: env_or("BATCH_INTERVAL_MS", default_batch_interval()),
            stats_interval_ms: env_or("STATS_INTERVAL_MS", default_stats_interval()),
            max_retries: env_or("MAX_RETRIES", default_max_retries()),
            trust_policy: match env::var("TRUSTED_FALLBACK") {
                Ok(v) => v.parse()?,
                Err(_) => default_trust_policy(),
            },
            proof_retention_blocks: env_or("PROOF_RETENTION_BLOCKS", default_proof_retention()),
        };

        let listener = ListenerConfig {
            poll_interval_ms: env_or("POLL_INTERVAL_MS", default_poll_interval()),
            max_block_range: env_or("MAX_BLOCK_RANGE", default_max_block_range()),
            reconnect_base_ms: env_or("RECONNECT_BASE_MS", default_reconnect_base()),
            reconnect_max_ms: env_or("RECONNECT_MAX_MS", default_reconnect_max()),
            max_reconnect_attempts: env_or(
                "MAX_RECONNECT_ATTEMPTS",
                default_max_reconnect_attempts(),
            ),
            seen_cache_size: env_or("SEEN_CACHE_SIZE", default_seen_cache_size()),
        };

        let fees = FeeConfig {
            gas_price_multiplier: env_or("GAS_PRICE_MULTIPLIER", default_gas_price_multiplier()),
            max_fee_per_gas_gwei: env_or("MAX_FEE_PER_GAS_GWEI", default_max_fee_per_gas_gwei()),
            retry_fee_multiplier: env_or("RETRY_FEE_MULTIPLIER", default_retry_fee_multiplier()),
            speed_up_fee_multiplier: env_or(
                "SPEED_UP_FEE_MULTIPLIER",
                default_speed_up_fee_multiplier(),
            ),
        };

        let dispatcher = DispatcherConfig {
            confirmation_timeout_ms: env_or(
                "CONFIRMATION_TIMEOUT_MS",
                default_confirmation_timeout(),
            ),
            gas_overhead: env_or("GAS_OVERHEAD", default_gas_overhead()),
            max_send_attempts: env_or("MAX_SEND_ATTEMPTS", default_max_send_attempts()),
        };

        let api = ApiConfig {
            bind_address: env::var("API_BIND_ADDRESS").unwrap_or_else(|_| default_api_bind()),
        };

        let config = Config {
            chains,
            signer,
            relayer,
            listener,
            fees,
            dispatcher,
            api,
        };

        config.validate()?;
        Ok(config)
    }

    /// Enabled chain profiles
    pub fn enabled_chains(&self) -> impl Iterator<Item = &ChainProfile> {
        self.chains.iter().filter(|c| c.enabled)
    }

    pub fn chain(&self, chain_id: ChainId) -> Option<&ChainProfile> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    /// Validate the configuration. Any failure is fatal at startup.
    pub fn validate(&self) -> Result<()> {
        let key = &self.signer.private_key;
        if key.len() != 66 || !key.starts_with("0x") || !key[2..].chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RelayError::Configuration(
                "RELAYER_PRIVATE_KEY must be 66 chars (0x + 64 hex chars)".to_string(),
            )
            .into());
        }

        if self.enabled_chains().next().is_none() {
            return Err(
                RelayError::Configuration("At least one enabled chain is required".to_string())
                    .into(),
            );
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            chain.validate()?;
            if !seen.insert(chain.chain_id) {
                return Err(RelayError::Configuration(format!(
                    "Chain id {} is configured more than once",
                    chain.chain_id
                ))
                .into());
            }
        }

        if self.relayer.batch_size == 0 {
            return Err(eyre!("BATCH_SIZE must be at least 1"));
        }

        if self.fees.gas_price_multiplier < 1.0
            || self.fees.retry_fee_multiplier < 1.0
            || self.fees.speed_up_fee_multiplier < 1.0
        {
            return Err(eyre!("Fee multipliers must be >= 1.0"));
        }

        if self.fees.max_fee_per_gas_gwei == 0 {
            return Err(eyre!("MAX_FEE_PER_GAS_GWEI must be positive"));
        }

        Ok(())
    }
}

/// Load chain profiles from CHAINS_COUNT / CHAIN_{n}_* variables
fn load_chains_from_env() -> Result<Vec<ChainProfile>> {
    let count: usize = env::var("CHAINS_COUNT")
        .map_err(|_| RelayError::Configuration("CHAINS_COUNT is required".to_string()))?
        .parse()
        .wrap_err("CHAINS_COUNT must be a valid number")?;

    let mut chains = Vec::with_capacity(count);
    for i in 1..=count {
        let prefix = format!("CHAIN_{}", i);
        let var = |suffix: &str| env::var(format!("{}_{}", prefix, suffix));

        let name = var("NAME").unwrap_or_else(|_| format!("chain-{}", i));
        let chain_id: ChainId = var("CHAIN_ID")
            .map_err(|_| eyre!("{}_CHAIN_ID is required", prefix))?
            .parse()
            .wrap_err_with(|| format!("{}_CHAIN_ID must be a valid u64", prefix))?;
        let rpc_raw = var("RPC_URL").map_err(|_| eyre!("{}_RPC_URL is required", prefix))?;
        let bridge_address =
            var("BRIDGE_ADDRESS").map_err(|_| eyre!("{}_BRIDGE_ADDRESS is required", prefix))?;

        chains.push(ChainProfile {
            chain_id,
            name,
            rpc_urls: parse_rpc_urls(&rpc_raw),
            ws_url: var("WS_URL").ok().filter(|s| !s.trim().is_empty()),
            bridge_address,
            oracle_address: var("ORACLE_ADDRESS").ok().filter(|s| !s.trim().is_empty()),
            confirmations: env_or(&format!("{}_CONFIRMATIONS", prefix), default_confirmations()),
            block_time_ms: env_or(&format!("{}_BLOCK_TIME_MS", prefix), default_block_time_ms()),
            enabled: env_or(&format!("{}_ENABLED", prefix), default_enabled()),
            start_block: var("START_BLOCK").ok().and_then(|v| v.parse().ok()),
        });
    }

    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile(chain_id: ChainId) -> ChainProfile {
        ChainProfile {
            chain_id,
            name: format!("chain-{}", chain_id),
            rpc_urls: vec!["http://localhost:8545".to_string()],
            ws_url: None,
            bridge_address: "0x0000000000000000000000000000000000000001".to_string(),
            oracle_address: None,
            confirmations: 0,
            block_time_ms: 1_000,
            enabled: true,
            start_block: Some(0),
        }
    }

    fn sample_config() -> Config {
        Config {
            chains: vec![sample_profile(1), sample_profile(2)],
            signer: SignerConfig {
                private_key: "0x0000000000000000000000000000000000000000000000000000000000000001"
                    .to_string(),
            },
            relayer: RelayerConfig::default(),
            listener: ListenerConfig::default(),
            fees: FeeConfig::default(),
            dispatcher: DispatcherConfig::default(),
            api: ApiConfig {
                bind_address: default_api_bind(),
            },
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(default_confirmations(), 12);
        assert_eq!(default_batch_size(), 10);
        assert_eq!(default_max_retries(), 3);
        assert_eq!(default_trust_policy(), TrustPolicy::AllowTrusted);
        assert_eq!(default_retry_fee_multiplier(), 1.2);
        assert_eq!(default_speed_up_fee_multiplier(), 1.5);
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_private_key_validation() {
        let mut config = sample_config();
        config.signer.private_key = "0x123".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_chain_rejected() {
        let mut config = sample_config();
        config.chains.push(sample_profile(2));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"), "{}", err);
    }

    #[test]
    fn test_no_enabled_chains_rejected() {
        let mut config = sample_config();
        for chain in &mut config.chains {
            chain.enabled = false;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bridge_address_validation() {
        let mut config = sample_config();
        config.chains[0].bridge_address = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ws_scheme_validation() {
        let mut config = sample_config();
        config.chains[0].ws_url = Some("http://localhost:8546".to_string());
        assert!(config.validate().is_err());
        config.chains[0].ws_url = Some("ws://localhost:8546".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_multiplier_validation() {
        let mut config = sample_config();
        config.fees.retry_fee_multiplier = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trust_policy_parse() {
        assert_eq!("true".parse::<TrustPolicy>().unwrap(), TrustPolicy::AllowTrusted);
        assert_eq!("FALSE".parse::<TrustPolicy>().unwrap(), TrustPolicy::ProofOnly);
        assert!("maybe".parse::<TrustPolicy>().is_err());
    }

    #[test]
    fn test_reconnect_backoff_is_capped() {
        let config = ListenerConfig {
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 10_000,
            ..Default::default()
        };
        assert_eq!(config.reconnect_backoff(0), Duration::from_secs(1));
        assert_eq!(config.reconnect_backoff(1), Duration::from_secs(2));
        assert_eq!(config.reconnect_backoff(3), Duration::from_secs(8));
        assert_eq!(config.reconnect_backoff(4), Duration::from_secs(10));
        assert_eq!(config.reconnect_backoff(64), Duration::from_secs(10));
    }

    #[test]
    fn test_signer_debug_redacts_key() {
        let config = sample_config();
        let debug = format!("{:?}", config.signer);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("0x0000"));
    }
}
