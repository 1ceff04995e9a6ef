//! Opportunity filter.
//!
//! A pure predicate over classified opportunities. Every criterion must
//! hold:
//! 1. BUY: `rate <= target_buy_rate`; SELL: `rate >= target_sell_rate`
//! 2. `available_amount >= min_amount_usd`
//! 3. currency allowed (case-insensitive)
//! 4. at least one accepted payment method allowed (case-insensitive)
//!
//! A record with no payment methods can never satisfy (4).

use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::fmt;

use crate::config::MonitorConfig;
use crate::types::{Opportunity, OpportunityKind};

/// Why an opportunity was filtered out (first failing criterion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    RateOutsideTarget,
    BelowMinAmount,
    CurrencyNotAllowed,
    NoAllowedPaymentMethod,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::RateOutsideTarget => write!(f, "rate outside target"),
            Rejection::BelowMinAmount => write!(f, "below minimum amount"),
            Rejection::CurrencyNotAllowed => write!(f, "currency not allowed"),
            Rejection::NoAllowedPaymentMethod => write!(f, "no allowed payment method"),
        }
    }
}

/// User thresholds, normalized once at construction.
#[derive(Debug, Clone)]
pub struct OpportunityFilter {
    target_buy_rate: Decimal,
    target_sell_rate: Decimal,
    min_amount: Decimal,
    currencies: BTreeSet<String>,
    payment_methods: BTreeSet<String>,
}

impl OpportunityFilter {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            target_buy_rate: config.target_buy_rate,
            target_sell_rate: config.target_sell_rate,
            min_amount: config.min_amount_usd,
            currencies: config
                .allowed_currencies
                .iter()
                .map(|c| c.to_uppercase())
                .collect(),
            payment_methods: config
                .allowed_payment_methods
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    /// Whether the opportunity survives every criterion.
    pub fn passes(&self, opportunity: &Opportunity) -> bool {
        self.check(opportunity).is_ok()
    }

    /// Evaluate the criteria in order, reporting the first failure.
    pub fn check(&self, opportunity: &Opportunity) -> Result<(), Rejection> {
        let record = &opportunity.source;

        let rate_ok = match opportunity.kind {
            OpportunityKind::Buy => record.rate <= self.target_buy_rate,
            OpportunityKind::Sell => record.rate >= self.target_sell_rate,
        };
        if !rate_ok {
            return Err(Rejection::RateOutsideTarget);
        }

        if record.available_amount < self.min_amount {
            return Err(Rejection::BelowMinAmount);
        }

        if !self.currencies.contains(&record.currency.to_uppercase()) {
            return Err(Rejection::CurrencyNotAllowed);
        }

        let has_method = record
            .payment_methods
            .iter()
            .any(|m| self.payment_methods.contains(&m.to_lowercase()));
        if !has_method {
            return Err(Rejection::NoAllowedPaymentMethod);
        }

        Ok(())
    }
}

/// Free-function form of [`OpportunityFilter::passes`].
pub fn passes(opportunity: &Opportunity, config: &MonitorConfig) -> bool {
    OpportunityFilter::new(config).passes(opportunity)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
