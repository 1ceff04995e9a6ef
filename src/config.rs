//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` (path overridable via `MONITOR_CONFIG`) and
//! deserializes into strongly-typed structs. The handful of tuning knobs
//! the monitor has always taken from `.env` (`TARGET_BUY_RATE`,
//! `TARGET_SELL_RATE`, `MONITOR_INTERVAL`, `MIN_AMOUNT_USD`, `MONITOR_MODE`)
//! override the file. Secrets are referenced by env-var name and resolved
//! at runtime.
//!
//! The result is validated once at startup and never mutated afterwards.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::types::{MonitorError, MonitorMode};

/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

// ---------------------------------------------------------------------------
// File schema
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorSection,
    pub filters: FiltersSection,
    pub source: SourceConfig,
    pub retry: RetrySection,
    pub report: ReportConfig,
    pub chain: ChainConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorSection {
    pub mode: String,
    pub interval_secs: u64,
    pub target_buy_rate: f64,
    pub target_sell_rate: f64,
    pub min_amount_usd: f64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            mode: "continuous".to_string(),
            interval_secs: 60,
            target_buy_rate: 0.97,
            target_sell_rate: 1.015,
            min_amount_usd: 100.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FiltersSection {
    pub payment_methods: Vec<String>,
    pub currencies: Vec<String>,
}

impl Default for FiltersSection {
    fn default() -> Self {
        Self {
            payment_methods: ["zelle", "paypal", "revolut", "wise"]
                .into_iter()
                .map(String::from)
                .collect(),
            currencies: ["USD", "GBP", "EUR", "CAD", "AUD"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Peerlytics API settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    /// Name of the env var holding the API key.
    pub api_key_env: String,
    pub page_size: u32,
    pub max_pages: u32,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://peerlytics.xyz/api/v1".to_string(),
            api_key_env: "PEERLYTICS_API_KEY".to_string(),
            page_size: 100,
            max_pages: 50,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Consecutive failed ticks tolerated in continuous mode; 0 = unlimited.
    pub max_consecutive_failures: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            max_consecutive_failures: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Console,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReportConfig {
    pub format: ReportFormat,
    /// Maximum opportunities printed per side.
    pub top_n: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::Console,
            top_n: 10,
        }
    }
}

/// Read-only RPC handle, reserved for trade execution. Never invoked by
/// the monitor itself.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url_env: String,
    pub chain_id: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url_env: "RPC_URL".to_string(),
            chain_id: 8453,
        }
    }
}

// ---------------------------------------------------------------------------
// Validated runtime config
// ---------------------------------------------------------------------------

/// Immutable thresholds and mode consumed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub target_buy_rate: Decimal,
    pub target_sell_rate: Decimal,
    pub min_amount_usd: Decimal,
    pub monitor_interval: Duration,
    pub mode: MonitorMode,
    /// Lower-cased payment-method ids.
    pub allowed_payment_methods: BTreeSet<String>,
    /// Upper-cased currency codes.
    pub allowed_currencies: BTreeSet<String>,
}

/// Fetch retry policy for a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_consecutive_failures: u32,
}

impl RetryPolicy {
    /// Backoff to wait after the given (1-based) failed attempt.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            max_consecutive_failures: 0,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load from `path` if it exists, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            info!(path, "No config file found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Apply the process environment on top of the file values.
    pub fn apply_env_overrides(&mut self) -> Result<(), MonitorError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (tests pass a map here
    /// instead of mutating the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), MonitorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TARGET_BUY_RATE") {
            self.monitor.target_buy_rate = parse_env("TARGET_BUY_RATE", &v)?;
        }
        if let Some(v) = lookup("TARGET_SELL_RATE") {
            self.monitor.target_sell_rate = parse_env("TARGET_SELL_RATE", &v)?;
        }
        if let Some(v) = lookup("MONITOR_INTERVAL") {
            self.monitor.interval_secs = parse_env("MONITOR_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("MIN_AMOUNT_USD") {
            self.monitor.min_amount_usd = parse_env("MIN_AMOUNT_USD", &v)?;
        }
        if let Some(v) = lookup("MONITOR_MODE") {
            self.monitor.mode = v;
        }
        Ok(())
    }

    /// Validate and convert into the engine's immutable config.
    pub fn monitor_config(&self) -> Result<MonitorConfig, MonitorError> {
        let m = &self.monitor;

        let target_buy_rate = to_decimal("monitor.target_buy_rate", m.target_buy_rate)?;
        let target_sell_rate = to_decimal("monitor.target_sell_rate", m.target_sell_rate)?;
        let min_amount_usd = to_decimal("monitor.min_amount_usd", m.min_amount_usd)?;

        if target_buy_rate <= Decimal::ZERO || target_buy_rate > dec!(1) {
            return Err(MonitorError::Config(format!(
                "monitor.target_buy_rate must be in (0, 1], got {target_buy_rate}"
            )));
        }
        if target_sell_rate < dec!(1) {
            return Err(MonitorError::Config(format!(
                "monitor.target_sell_rate must be >= 1, got {target_sell_rate}"
            )));
        }
        if min_amount_usd < Decimal::ZERO {
            return Err(MonitorError::Config(format!(
                "monitor.min_amount_usd must be >= 0, got {min_amount_usd}"
            )));
        }
        if m.interval_secs == 0 {
            return Err(MonitorError::Config(
                "monitor.interval_secs must be > 0".to_string(),
            ));
        }

        let mode = MonitorMode::from_str(&m.mode)?;

        let allowed_payment_methods: BTreeSet<String> = self
            .filters
            .payment_methods
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if allowed_payment_methods.is_empty() {
            return Err(MonitorError::Config(
                "filters.payment_methods must name at least one method".to_string(),
            ));
        }

        let allowed_currencies: BTreeSet<String> = self
            .filters
            .currencies
            .iter()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect();
        if allowed_currencies.is_empty() {
            return Err(MonitorError::Config(
                "filters.currencies must name at least one currency".to_string(),
            ));
        }

        Ok(MonitorConfig {
            target_buy_rate,
            target_sell_rate,
            min_amount_usd,
            monitor_interval: Duration::from_secs(m.interval_secs),
            mode,
            allowed_payment_methods,
            allowed_currencies,
        })
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, MonitorError> {
        let r = &self.retry;
        if r.max_attempts == 0 {
            return Err(MonitorError::Config(
                "retry.max_attempts must be >= 1".to_string(),
            ));
        }
        if r.initial_backoff_ms > r.max_backoff_ms {
            return Err(MonitorError::Config(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                r.initial_backoff_ms, r.max_backoff_ms
            )));
        }
        Ok(RetryPolicy {
            max_attempts: r.max_attempts,
            initial_backoff: Duration::from_millis(r.initial_backoff_ms),
            max_backoff: Duration::from_millis(r.max_backoff_ms),
            max_consecutive_failures: r.max_consecutive_failures,
        })
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, MonitorError> {
    value
        .trim()
        .parse()
        .map_err(|_| MonitorError::Config(format!("{key} is not a valid number: {value:?}")))
}

/// Go through the shortest round-trip string so `0.97` stays `0.97`.
fn to_decimal(key: &str, value: f64) -> Result<Decimal, MonitorError> {
    if !value.is_finite() {
        return Err(MonitorError::Config(format!("{key} must be finite")));
    }
    Decimal::from_str(&value.to_string())
        .or_else(|_| Decimal::from_scientific(&format!("{value:e}")))
        .map_err(|e| MonitorError::Config(format!("{key} out of range: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
