use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::errors::WalletError;

/// Environment variable overriding the PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS_ENV: &str = "WALLET_PBKDF2_ITERATIONS";

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// PBKDF2 iteration count
    #[serde(default = "SecurityConfig::default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,

    /// Lifetime of an unlocked session (seconds)
    #[serde(default = "SecurityConfig::default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Maximum retained audit log entries
    #[serde(default = "SecurityConfig::default_audit_log_capacity")]
    pub audit_log_capacity: usize,
}

impl SecurityConfig {
    fn default_pbkdf2_iterations() -> u32 { 100_000 }
    fn default_session_ttl() -> u64 { 300 }
    fn default_audit_log_capacity() -> usize { 1_000 }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: Self::default_pbkdf2_iterations(),
            session_ttl_secs: Self::default_session_ttl(),
            audit_log_capacity: Self::default_audit_log_capacity(),
        }
    }
}

/// Chain parameters for the ledger the core talks to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "NetworkConfig::default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "NetworkConfig::default_native_symbol")]
    pub native_symbol: String,
    #[serde(default = "NetworkConfig::default_native_decimals")]
    pub native_decimals: u32,
    #[serde(default = "NetworkConfig::default_derivation_path")]
    pub default_derivation_path: String,
}

impl NetworkConfig {
    fn default_chain_id() -> u64 { 1 }
    fn default_native_symbol() -> String { "ETH".to_string() }
    fn default_native_decimals() -> u32 { 18 }
    fn default_derivation_path() -> String { "m/44'/60'/0'/0/0".to_string() }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: Self::default_chain_id(),
            native_symbol: Self::default_native_symbol(),
            native_decimals: Self::default_native_decimals(),
            default_derivation_path: Self::default_derivation_path(),
        }
    }
}

/// Transaction tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    #[serde(default = "TransactionConfig::default_poll")]
    pub confirmation_poll_secs: u64,
    /// Gas price of a cancellation relative to the stuck transaction (percent)
    #[serde(default = "TransactionConfig::default_bump")]
    pub cancel_gas_bump_percent: u64,
}

impl TransactionConfig {
    fn default_poll() -> u64 { 5 }
    fn default_bump() -> u64 { 150 }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.confirmation_poll_secs)
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            confirmation_poll_secs: Self::default_poll(),
            cancel_gas_bump_percent: Self::default_bump(),
        }
    }
}

/// Fallback fee tiers (gwei) used when the fee feed is down
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackGwei {
    pub slow: u64,
    pub standard: u64,
    pub fast: u64,
    pub instant: u64,
}

impl Default for FallbackGwei {
    fn default() -> Self {
        Self { slow: 10, standard: 20, fast: 30, instant: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    #[serde(default = "GasConfig::default_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub fallback_gwei: FallbackGwei,
}

impl GasConfig {
    fn default_ttl() -> u64 { 30 }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: Self::default_ttl(), fallback_gwei: FallbackGwei::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceConfig {
    #[serde(default = "BalanceConfig::default_refresh")]
    pub refresh_interval_secs: u64,
    #[serde(default = "BalanceConfig::default_price_ttl")]
    pub price_cache_ttl_secs: u64,
    /// Upper bound on enumerated non-fungible token ids per asset
    #[serde(default = "BalanceConfig::default_max_nft_ids")]
    pub max_nft_ids: usize,
}

impl BalanceConfig {
    fn default_refresh() -> u64 { 30 }
    fn default_price_ttl() -> u64 { 300 }
    fn default_max_nft_ids() -> usize { 10 }
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: Self::default_refresh(),
            price_cache_ttl_secs: Self::default_price_ttl(),
            max_nft_ids: Self::default_max_nft_ids(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySettings {
    #[serde(default = "RecoverySettings::default_social_ttl")]
    pub social_request_ttl_secs: u64,
    #[serde(default = "RecoverySettings::default_timelock_delay")]
    pub timelock_delay_secs: u64,
    #[serde(default = "RecoverySettings::default_claim_window")]
    pub timelock_claim_window_secs: u64,
    #[serde(default = "RecoverySettings::default_sweep")]
    pub sweep_interval_secs: u64,
}

impl RecoverySettings {
    fn default_social_ttl() -> u64 { 7 * 24 * 3600 }
    fn default_timelock_delay() -> u64 { 24 * 3600 }
    fn default_claim_window() -> u64 { 7 * 24 * 3600 }
    fn default_sweep() -> u64 { 60 }
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            social_request_ttl_secs: Self::default_social_ttl(),
            timelock_delay_secs: Self::default_timelock_delay(),
            timelock_claim_window_secs: Self::default_claim_window(),
            sweep_interval_secs: Self::default_sweep(),
        }
    }
}

/// wallet配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub transactions: TransactionConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub balance: BalanceConfig,
    #[serde(default)]
    pub recovery: RecoverySettings,
}

impl WalletConfig {
    /// Parse a TOML document; missing sections fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, WalletError> {
        let mut config: WalletConfig = toml::from_str(raw)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref();
        info!("Loading wallet config from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    fn apply_env_overrides(&mut self) -> Result<(), WalletError> {
        if let Ok(raw) = std::env::var(PBKDF2_ITERATIONS_ENV) {
            self.security.pbkdf2_iterations = raw.trim().parse().map_err(|_| {
                WalletError::ConfigError(format!("{} must be an integer", PBKDF2_ITERATIONS_ENV))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if self.security.pbkdf2_iterations == 0 {
            return Err(WalletError::ConfigError("pbkdf2_iterations must be positive".into()));
        }
        if self.security.audit_log_capacity == 0 {
            return Err(WalletError::ConfigError("audit_log_capacity must be positive".into()));
        }
        if self.transactions.cancel_gas_bump_percent < 150 {
            return Err(WalletError::ConfigError(format!(
                "cancel_gas_bump_percent must be at least 150 (got {})",
                self.transactions.cancel_gas_bump_percent
            )));
        }
        if self.transactions.confirmation_poll_secs == 0
            || self.balance.refresh_interval_secs == 0
            || self.recovery.sweep_interval_secs == 0
        {
            return Err(WalletError::ConfigError("polling intervals must be positive".into()));
        }
        let fb = &self.gas.fallback_gwei;
        if !(fb.slow <= fb.standard && fb.standard <= fb.fast && fb.fast <= fb.instant) {
            return Err(WalletError::ConfigError("fallback gas tiers must be ascending".into()));
        }
        Ok(())
    }
}
