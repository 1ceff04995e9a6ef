//! Ranker & aggregator.
//!
//! Orders surviving opportunities by profit and summarises the whole
//! fetched market. The summary is always computed over the unfiltered
//! batch: it describes the market, not the user's slice of it.

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::types::{DepositRecord, MarketSummary, Opportunity, OpportunityCounts, OpportunityKind};

/// Ranked BUY and SELL lists, most profitable first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedOpportunities {
    pub buy: Vec<Opportunity>,
    pub sell: Vec<Opportunity>,
}

impl RankedOpportunities {
    pub fn counts(&self) -> OpportunityCounts {
        OpportunityCounts {
            buy: self.buy.len(),
            sell: self.sell.len(),
        }
    }
}

/// Total order used for ranking: profit amount desc, profit pct desc,
/// deposit id asc, currency asc.
pub fn ranking_order(a: &Opportunity, b: &Opportunity) -> Ordering {
    b.profit_amount
        .cmp(&a.profit_amount)
        .then_with(|| b.profit_pct.cmp(&a.profit_pct))
        .then_with(|| a.source.id.cmp(&b.source.id))
        .then_with(|| a.source.currency.cmp(&b.source.currency))
}

/// Partition by kind and sort each side.
pub fn rank(opportunities: Vec<Opportunity>) -> RankedOpportunities {
    let (mut buy, mut sell): (Vec<_>, Vec<_>) = opportunities
        .into_iter()
        .partition(|o| o.kind == OpportunityKind::Buy);

    buy.sort_by(ranking_order);
    sell.sort_by(ranking_order);

    RankedOpportunities { buy, sell }
}

/// Market-wide statistics over the pre-filter records.
///
/// A deposit split into several currency records contributes its liquidity
/// and its count once. A deposit whose amount would overflow the running
/// total is left out of both.
pub fn aggregate(
    records: &[Arc<DepositRecord>],
    locked_in_intents: Decimal,
    ranked: &RankedOpportunities,
) -> MarketSummary {
    let mut seen = HashSet::new();
    let mut overflowed = HashSet::new();
    let mut total_available_liquidity = Decimal::ZERO;

    for record in records {
        if seen.contains(&record.id) || overflowed.contains(&record.id) {
            continue;
        }
        match total_available_liquidity.checked_add(record.available_amount) {
            Some(sum) => {
                total_available_liquidity = sum;
                seen.insert(&record.id);
            }
            None => {
                warn!(
                    deposit = %record.id,
                    amount = %record.available_amount,
                    "Liquidity total overflow, deposit left out of summary"
                );
                overflowed.insert(&record.id);
            }
        }
    }

    MarketSummary {
        total_available_liquidity,
        locked_in_intents,
        active_deposit_count: seen.len(),
        opportunity_counts: ranked.counts(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
