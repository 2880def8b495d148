//! Configuration management for the wrap cycler
//!
//! Loads configuration from TOML files with environment variable substitution
//! and converts it into an immutable [`RunConfig`] expressed in on-chain units.

use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use ethers::utils::{parse_ether, parse_units};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

lazy_static::lazy_static! {
    static ref ENV_VAR_PATTERN: regex::Regex =
        regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub chain: ChainConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub contract_address: String,
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,
    #[serde(default = "default_wrapped_symbol")]
    pub wrapped_symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub cycles: u32,
    pub min_amount: f64,
    pub max_amount: f64,
    /// Native units held back on top of the gas reserve
    pub safety_margin: f64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            cycles: 50,
            min_amount: 0.01,
            max_amount: 0.1,
            safety_margin: 0.01,
            delay_min_ms: 10_000,
            delay_max_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub gas_limit: u64,
    pub max_priority_fee_per_gas_gwei: f64,
    pub max_fee_per_gas_gwei: f64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            gas_limit: 100_000,
            max_priority_fee_per_gas_gwei: 5.0,
            max_fee_per_gas_gwei: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub confirmation_poll_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_delay_ms: 2_000,
            confirmation_poll_ms: 1_000,
        }
    }
}

fn default_native_symbol() -> String {
    "PLUME".to_string()
}

fn default_wrapped_symbol() -> String {
    "WPLUME".to_string()
}

impl Settings {
    /// Load settings from the file named by `WRAP_CYCLER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("WRAP_CYCLER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.rpc_url.trim().is_empty() {
            anyhow::bail!("No RPC URL configured");
        }
        self.chain
            .contract_address
            .parse::<Address>()
            .with_context(|| {
                format!("Invalid contract address: {}", self.chain.contract_address)
            })?;

        let cycle = &self.cycle;
        if cycle.min_amount <= 0.0 {
            anyhow::bail!("min_amount must be positive");
        }
        if cycle.min_amount > cycle.max_amount {
            anyhow::bail!(
                "min_amount ({}) exceeds max_amount ({})",
                cycle.min_amount,
                cycle.max_amount
            );
        }
        if cycle.safety_margin < 0.0 {
            anyhow::bail!("safety_margin must not be negative");
        }
        if cycle.delay_min_ms > cycle.delay_max_ms {
            anyhow::bail!(
                "delay_min_ms ({}) exceeds delay_max_ms ({})",
                cycle.delay_min_ms,
                cycle.delay_max_ms
            );
        }

        if self.gas.gas_limit == 0 {
            anyhow::bail!("gas_limit must be positive");
        }
        if self.gas.max_priority_fee_per_gas_gwei > self.gas.max_fee_per_gas_gwei {
            anyhow::bail!("Priority fee ceiling exceeds max fee ceiling");
        }

        if self.retry.max_retries == 0 {
            anyhow::bail!("max_retries must be at least 1");
        }
        if cycle.cycles == 0 {
            tracing::warn!("cycles is 0 - wallets will only report balances");
        }

        Ok(())
    }
}

/// Immutable run parameters in on-chain units
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub contract_address: Address,
    pub native_symbol: String,
    pub wrapped_symbol: String,
    pub cycles: u32,
    pub min_amount: U256,
    pub max_amount: U256,
    pub safety_margin: U256,
    pub gas_limit: U256,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub delay_min: Duration,
    pub delay_max: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub confirmation_poll: Duration,
}

impl TryFrom<&Settings> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(settings: &Settings) -> Result<Self> {
        Ok(Self {
            rpc_url: settings.chain.rpc_url.clone(),
            chain_id: settings.chain.chain_id,
            contract_address: settings.chain.contract_address.parse()?,
            native_symbol: settings.chain.native_symbol.clone(),
            wrapped_symbol: settings.chain.wrapped_symbol.clone(),
            cycles: settings.cycle.cycles,
            min_amount: ether(settings.cycle.min_amount)?,
            max_amount: ether(settings.cycle.max_amount)?,
            safety_margin: ether(settings.cycle.safety_margin)?,
            gas_limit: U256::from(settings.gas.gas_limit),
            max_priority_fee_per_gas: gwei(settings.gas.max_priority_fee_per_gas_gwei)?,
            max_fee_per_gas: gwei(settings.gas.max_fee_per_gas_gwei)?,
            delay_min: Duration::from_millis(settings.cycle.delay_min_ms),
            delay_max: Duration::from_millis(settings.cycle.delay_max_ms),
            max_retries: settings.retry.max_retries,
            retry_delay: Duration::from_millis(settings.retry.retry_delay_ms),
            confirmation_poll: Duration::from_millis(settings.retry.confirmation_poll_ms),
        })
    }
}

fn ether(amount: f64) -> Result<U256> {
    parse_ether(amount).with_context(|| format!("Invalid native amount: {}", amount))
}

fn gwei(amount: f64) -> Result<U256> {
    let units = parse_units(amount, "gwei")
        .with_context(|| format!("Invalid gwei amount: {}", amount))?;
    Ok(units.into())
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [chain]
        rpc_url = "http://localhost:8545"
        chain_id = 98866
        contract_address = "0xEa237441c92CAe6FC17Caaf9a7acB3f953be4bd1"
    "#;

    /// One cycle, fixed one second pacing and fast retries
    pub(crate) fn test_run_config() -> RunConfig {
        let mut settings = Settings::parse(MINIMAL).unwrap();
        settings.cycle.cycles = 1;
        settings.cycle.delay_min_ms = 1_000;
        settings.cycle.delay_max_ms = 1_000;
        settings.retry.max_retries = 3;
        settings.retry.retry_delay_ms = 100;
        RunConfig::try_from(&settings).unwrap()
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_defaults_applied() {
        let settings = Settings::parse(MINIMAL).unwrap();
        assert_eq!(settings.cycle.cycles, 50);
        assert_eq!(settings.gas.gas_limit, 100_000);
        assert_eq!(settings.retry.max_retries, 10);
        assert_eq!(settings.retry.retry_delay_ms, 2_000);
        assert_eq!(settings.chain.native_symbol, "PLUME");
    }

    #[test]
    fn test_run_config_units() {
        let settings = Settings::parse(MINIMAL).unwrap();
        let run = RunConfig::try_from(&settings).unwrap();
        assert_eq!(run.min_amount, U256::exp10(16));
        assert_eq!(run.max_amount, U256::exp10(17));
        assert_eq!(run.max_fee_per_gas, U256::from(1000u64) * U256::exp10(9));
        assert_eq!(run.max_priority_fee_per_gas, U256::from(5u64) * U256::exp10(9));
        assert_eq!(run.delay_max, Duration::from_secs(30));
    }

    #[test]
    fn test_rejects_inverted_amount_range() {
        let input = format!("{}\n[cycle]\nmin_amount = 0.5\nmax_amount = 0.1\n", MINIMAL);
        assert!(Settings::parse(&input).is_err());
    }

    #[test]
    fn test_rejects_inverted_delay_range() {
        let input = format!("{}\n[cycle]\ndelay_min_ms = 5\ndelay_max_ms = 1\n", MINIMAL);
        assert!(Settings::parse(&input).is_err());
    }

    #[test]
    fn test_rejects_zero_retries() {
        let input = format!("{}\n[retry]\nmax_retries = 0\n", MINIMAL);
        assert!(Settings::parse(&input).is_err());
    }

    #[test]
    fn test_rejects_bad_contract_address() {
        let input = MINIMAL.replace("0xEa237441c92CAe6FC17Caaf9a7acB3f953be4bd1", "0x1234");
        assert!(Settings::parse(&input).is_err());
    }

    #[test]
    fn test_load_from_file_with_env_substitution() {
        env::set_var("WRAP_CYCLER_TEST_RPC", "http://node.internal:8545");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            MINIMAL.replace("http://localhost:8545", "${WRAP_CYCLER_TEST_RPC}")
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.chain.rpc_url, "http://node.internal:8545");
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(Settings::load_from(Path::new("/nonexistent/wrap-cycler.toml")).is_err());
    }
}
