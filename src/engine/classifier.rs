//! Opportunity classifier.
//!
//! Labels each record BUY (rate below par) or SELL (rate above par) and
//! computes its arbitrage profit against the 1:1 par rate:
//!
//! ```text
//! profit_amount = available_amount × |rate − 1|
//! profit_pct    = |rate − 1| × 100
//! ```
//!
//! Arithmetic is exact; rounding happens only when rendering.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use crate::types::{DepositRecord, MonitorError, Opportunity, OpportunityKind};

/// The no-arbitrage rate.
pub const PAR_RATE: Decimal = dec!(1);

/// Classify a record.
///
/// Returns `Ok(None)` for a record quoted exactly at par (no profit either
/// way) and a `RecordValidation` error for a non-positive rate or a
/// profit too large to represent.
pub fn classify(record: &Arc<DepositRecord>) -> Result<Option<Opportunity>, MonitorError> {
    if record.rate <= Decimal::ZERO {
        return Err(MonitorError::invalid_record(
            &record.id,
            format!("non-positive rate: {}", record.rate),
        ));
    }

    let kind = match record.rate.cmp(&PAR_RATE) {
        std::cmp::Ordering::Less => OpportunityKind::Buy,
        std::cmp::Ordering::Greater => OpportunityKind::Sell,
        std::cmp::Ordering::Equal => return Ok(None),
    };

    let deviation = (record.rate - PAR_RATE).abs();
    let overflow = || MonitorError::invalid_record(&record.id, "profit overflow");

    Ok(Some(Opportunity {
        kind,
        profit_amount: record.available_amount.checked_mul(deviation).ok_or_else(overflow)?,
        profit_pct: deviation.checked_mul(dec!(100)).ok_or_else(overflow)?,
        source: Arc::clone(record),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
