//! Shared types for the deposit monitor.
//!
//! These types form the data model used across all modules. Raw API
//! payloads never leave the `source`/`normalizer` boundary; everything
//! past it works on the typed records defined here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Deposit identifiers
// ---------------------------------------------------------------------------

/// On-chain deposit id. Upstream sends either a number or a numeric string;
/// anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepositId(String);

impl DepositId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u128> {
        self.0.parse().ok()
    }
}

impl From<u64> for DepositId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for DepositId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric ids order by value ("740" < "1795"); numeric ids sort ahead of
/// non-numeric ones, which order lexically.
impl Ord for DepositId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for DepositId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Deposit record model
// ---------------------------------------------------------------------------

/// Reputation of the maker backing one or more deposits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakerInfo {
    pub address: String,
    /// Fraction of historical intents that completed (0.0–1.0).
    pub success_rate: Decimal,
    pub intent_count: u64,
}

/// One normalized market offer: a single (currency, rate) quote of a deposit.
///
/// Invariants enforced by the normalizer: `rate > 0`, `available_amount >= 0`,
/// `currency` upper-case, `payment_methods` lower-case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub id: DepositId,
    /// Conversion rate; par is 1.00.
    pub rate: Decimal,
    /// Remaining liquidity in USD.
    pub available_amount: Decimal,
    pub currency: String,
    pub payment_methods: BTreeSet<String>,
    pub maker: Arc<MakerInfo>,
}

impl fmt::Display for DepositRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deposit {} rate={} {} available=${} via [{}]",
            self.id,
            self.rate,
            self.currency,
            self.available_amount,
            self.payment_methods.iter().cloned().collect::<Vec<_>>().join(", "),
        )
    }
}

// ---------------------------------------------------------------------------
// Opportunities
// ---------------------------------------------------------------------------

/// Direction of an opportunity from the taker's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpportunityKind {
    /// Rate below par: acquire the stable asset at a discount.
    Buy,
    /// Rate above par: dispose of the stable asset at a premium.
    Sell,
}

impl fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpportunityKind::Buy => write!(f, "BUY"),
            OpportunityKind::Sell => write!(f, "SELL"),
        }
    }
}

/// A classified deposit. Rebuilt from scratch every cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Opportunity {
    pub kind: OpportunityKind,
    /// `available_amount × |rate − 1|`, unrounded.
    pub profit_amount: Decimal,
    /// `|rate − 1| × 100`, unrounded.
    pub profit_pct: Decimal,
    pub source: Arc<DepositRecord>,
}

impl Opportunity {
    pub fn id(&self) -> &DepositId {
        &self.source.id
    }
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} profit=${:.2} ({:.2}%)",
            self.kind, self.source, self.profit_amount, self.profit_pct,
        )
    }
}

// ---------------------------------------------------------------------------
// Market summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpportunityCounts {
    pub buy: usize,
    pub sell: usize,
}

impl OpportunityCounts {
    pub fn total(&self) -> usize {
        self.buy + self.sell
    }
}

/// Market-wide statistics for one cycle, computed over the unfiltered fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSummary {
    pub total_available_liquidity: Decimal,
    /// Supplied by the data source, not recomputed locally.
    pub locked_in_intents: Decimal,
    pub active_deposit_count: usize,
    pub opportunity_counts: OpportunityCounts,
}

impl fmt::Display for MarketSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "liquidity=${:.2} locked=${:.2} deposits={} buy={} sell={}",
            self.total_available_liquidity,
            self.locked_in_intents,
            self.active_deposit_count,
            self.opportunity_counts.buy,
            self.opportunity_counts.sell,
        )
    }
}

/// One platform/currency line from the upstream market summary endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketRate {
    pub platform: String,
    pub currency: String,
    pub rate: Option<Decimal>,
    pub liquidity: Option<Decimal>,
}

/// API credit and rate-limit headers from the most recent response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreditStatus {
    pub remaining: Option<String>,
    pub source: Option<String>,
    pub rate_limit_remaining: Option<String>,
}

impl fmt::Display for CreditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.remaining {
            None => write!(f, "unknown"),
            Some(remaining) => {
                write!(f, "{remaining} remaining")?;
                if let Some(source) = &self.source {
                    write!(f, " ({source})")?;
                }
                Ok(())
            }
        }
    }
}

/// Everything a data source returns for one fetch.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    /// Raw deposit objects, validated later by the normalizer.
    pub deposits: Vec<serde_json::Value>,
    pub locked_in_intents: Decimal,
    pub market_rates: Vec<MarketRate>,
    pub credits: Option<CreditStatus>,
}

// ---------------------------------------------------------------------------
// Run mode
// ---------------------------------------------------------------------------

/// Poll-loop mode, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    Once,
    Continuous,
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorMode::Once => write!(f, "once"),
            MonitorMode::Continuous => write!(f, "continuous"),
        }
    }
}

impl std::str::FromStr for MonitorMode {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "once" => Ok(MonitorMode::Once),
            "continuous" => Ok(MonitorMode::Continuous),
            other => Err(MonitorError::Config(format!("unknown monitor mode: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Structured result of one fetch→process cycle, handed to the report sink.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub timestamp: DateTime<Utc>,
    pub buy: Vec<Opportunity>,
    pub sell: Vec<Opportunity>,
    pub summary: MarketSummary,
    /// Raw deposits that failed validation.
    pub skipped_records: usize,
    /// Classified opportunities removed by the filter.
    pub rejected: usize,
    /// Records quoted exactly at par.
    pub par_records: usize,
    pub market_rates: Vec<MarketRate>,
    pub credits: Option<CreditStatus>,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle #{}: {} | skipped={} rejected={} par={}",
            self.cycle_number, self.summary, self.skipped_records, self.rejected, self.par_records,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the monitor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MonitorError {
    #[error("Fetch error ({source_name}): {message}")]
    Fetch { source_name: String, message: String },

    #[error("Invalid record ({id}): {reason}")]
    RecordValidation { id: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Interrupted before the cycle completed")]
    Interrupted,
}

impl MonitorError {
    pub fn fetch(source_name: &str, message: impl Into<String>) -> Self {
        MonitorError::Fetch {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_record(id: impl fmt::Display, reason: impl Into<String>) -> Self {
        MonitorError::RecordValidation {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
