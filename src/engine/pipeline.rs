//! One evaluation pass: snapshot → normalize → classify → filter → rank →
//! aggregate → `CycleReport`.
//!
//! Pure apart from logging; the poll loop supplies the cycle number and
//! timestamp.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::classifier::classify;
use super::filter::{OpportunityFilter, Rejection};
use super::normalizer::normalize_batch;
use super::ranker::{aggregate, rank};
use crate::types::{CycleReport, MarketSnapshot};

/// Evaluate one fetched snapshot against the filter.
pub fn evaluate(
    snapshot: MarketSnapshot,
    filter: &OpportunityFilter,
    cycle_number: u64,
    timestamp: DateTime<Utc>,
) -> CycleReport {
    let batch = normalize_batch(&snapshot.deposits);
    let mut skipped_records = batch.skipped.len();

    let mut par_records = 0usize;
    let mut rejections: HashMap<Rejection, usize> = HashMap::new();
    let mut survivors = Vec::new();

    for record in &batch.records {
        let opportunity = match classify(record) {
            Ok(Some(opportunity)) => opportunity,
            Ok(None) => {
                par_records += 1;
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Skipping record");
                skipped_records += 1;
                continue;
            }
        };

        match filter.check(&opportunity) {
            Ok(()) => survivors.push(opportunity),
            Err(reason) => {
                debug!(deposit = %opportunity.id(), kind = %opportunity.kind, %reason, "Filtered out");
                *rejections.entry(reason).or_default() += 1;
            }
        }
    }

    let rejected = rejections.values().sum();
    if rejected > 0 {
        debug!(?rejections, "Filter rejections");
    }

    let ranked = rank(survivors);
    let summary = aggregate(&batch.records, snapshot.locked_in_intents, &ranked);

    info!(
        cycle = cycle_number,
        deposits = summary.active_deposit_count,
        liquidity = format!("${:.2}", summary.total_available_liquidity),
        buy = ranked.buy.len(),
        sell = ranked.sell.len(),
        skipped = skipped_records,
        rejected,
        par = par_records,
        "Snapshot evaluated"
    );

    CycleReport {
        cycle_number,
        timestamp,
        buy: ranked.buy,
        sell: ranked.sell,
        summary,
        skipped_records,
        rejected,
        par_records,
        market_rates: snapshot.market_rates,
        credits: snapshot.credits,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
