//! Market data sources.
//!
//! Defines the `MarketDataSource` trait consumed by the poll loop and
//! provides the Peerlytics v1 implementation. Sources return raw deposit
//! JSON; turning it into typed records is the normalizer's job.

pub mod peerlytics;

use async_trait::async_trait;

use crate::types::{MarketSnapshot, MonitorError};

/// Abstraction over read-only deposit feeds.
///
/// One call returns one complete snapshot. Implementations report transport
/// and envelope problems as `MonitorError::Fetch`; the poll loop owns the
/// retry policy.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch every active deposit plus the intent-lock total.
    async fn fetch_market_snapshot(&self) -> Result<MarketSnapshot, MonitorError>;

    /// Source name for logging and error messages.
    fn name(&self) -> &str;
}
