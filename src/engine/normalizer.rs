//! Record normalizer: the single parse-and-validate seam between raw API
//! JSON and the typed `DepositRecord` model.
//!
//! A raw deposit quotes one or more (platform, currency, rate) markets.
//! Quotes sharing a currency and rate collapse into one `DepositRecord`
//! whose payment methods are the union of the quoting platforms.
//!
//! Nothing here fails the batch. A broken deposit is skipped as a whole;
//! a broken quote inside an otherwise valid deposit is skipped on its own.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::types::{DepositId, DepositRecord, MakerInfo, MonitorError};

/// Fixed-point precision of on-chain `conversionRate` values.
const CONVERSION_RATE_DECIMALS: u32 = 18;

/// Basis points in 100%.
const BPS_SCALE: Decimal = dec!(10000);

/// Output of one normalization pass.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub records: Vec<Arc<DepositRecord>>,
    /// One entry per skipped deposit or quote.
    pub skipped: Vec<MonitorError>,
}

/// Normalize a fetched batch, skipping (and logging) whatever fails
/// validation.
pub fn normalize_batch(raw: &[Value]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for deposit in raw {
        let mut quote_errors = Vec::new();
        match normalize_deposit(deposit, &mut quote_errors) {
            Ok(records) => batch.records.extend(records.into_iter().map(Arc::new)),
            Err(e) => quote_errors.push(e),
        }
        for e in quote_errors {
            warn!(error = %e, "Skipping record");
            batch.skipped.push(e);
        }
    }

    debug!(
        raw = raw.len(),
        records = batch.records.len(),
        skipped = batch.skipped.len(),
        "Batch normalized"
    );

    batch
}

/// Normalize one raw deposit.
///
/// Deposit-level problems (id, amount, maker) are returned as the error.
/// Quote-level problems are pushed onto `quote_errors` and the remaining
/// quotes still produce records.
pub fn normalize_deposit(
    raw: &Value,
    quote_errors: &mut Vec<MonitorError>,
) -> Result<Vec<DepositRecord>, MonitorError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| MonitorError::invalid_record("?", "deposit is not a JSON object"))?;

    let id = parse_id(obj)?;

    let available_amount = match obj.get("availableUsd") {
        None | Some(Value::Null) => {
            return Err(MonitorError::invalid_record(&id, "missing availableUsd"))
        }
        Some(v) => parse_decimal(v)
            .ok_or_else(|| MonitorError::invalid_record(&id, format!("unparseable availableUsd: {v}")))?,
    };
    if available_amount < Decimal::ZERO {
        return Err(MonitorError::invalid_record(
            &id,
            format!("negative availableUsd: {available_amount}"),
        ));
    }

    let maker = Arc::new(parse_maker(obj, &id)?);

    // (currency, rate) → payment methods
    let mut quotes: BTreeMap<(String, Decimal), BTreeSet<String>> = BTreeMap::new();

    match obj.get("markets") {
        Some(Value::Array(markets)) => {
            if markets.is_empty() {
                return Err(MonitorError::invalid_record(&id, "no quoted markets"));
            }
            for market in markets {
                match parse_market_quote(market, &id) {
                    Ok((platform, currency, rate)) => {
                        quotes.entry((currency, rate)).or_default().insert(platform);
                    }
                    Err(e) => quote_errors.push(e),
                }
            }
        }
        Some(other) => {
            return Err(MonitorError::invalid_record(
                &id,
                format!("markets is not an array: {other}"),
            ))
        }
        None => {
            let currency = parse_currency(raw, &id)?;
            let rate = parse_rate(raw, &id)?;
            let methods = parse_payment_methods(obj, &id)?;
            quotes.entry((currency, rate)).or_default().extend(methods);
        }
    }

    Ok(quotes
        .into_iter()
        .map(|((currency, rate), payment_methods)| DepositRecord {
            id: id.clone(),
            rate,
            available_amount,
            currency,
            payment_methods,
            maker: Arc::clone(&maker),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Field parsers
// ---------------------------------------------------------------------------

/// Parse a decimal from a JSON number or numeric string.
pub fn parse_decimal(v: &Value) -> Option<Decimal> {
    let text = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Parse an 18-decimal fixed-point integer (`"990000000000000000"` → 0.99).
pub fn parse_fixed_point_rate(v: &Value) -> Option<Decimal> {
    let raw: i128 = match v {
        Value::String(s) => s.trim().parse().ok()?,
        Value::Number(n) => n.as_u64().map(i128::from)?,
        _ => return None,
    };
    Decimal::try_from_i128_with_scale(raw, CONVERSION_RATE_DECIMALS)
        .ok()
        .map(|d| d.normalize())
}

fn parse_id(obj: &Map<String, Value>) -> Result<DepositId, MonitorError> {
    let raw = obj.get("depositId").or_else(|| obj.get("id"));
    match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(DepositId::new(s.trim())),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(DepositId::from)
            .ok_or_else(|| MonitorError::invalid_record(n, "deposit id is not a non-negative integer")),
        _ => Err(MonitorError::invalid_record("?", "missing depositId")),
    }
}

fn parse_maker(obj: &Map<String, Value>, id: &DepositId) -> Result<MakerInfo, MonitorError> {
    let address = obj
        .get("depositor")
        .or_else(|| obj.get("owner"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let success_rate = if let Some(v) = obj.get("successRateBps").filter(|v| !v.is_null()) {
        parse_decimal(v)
            .map(|bps| bps / BPS_SCALE)
            .ok_or_else(|| MonitorError::invalid_record(id, format!("unparseable successRateBps: {v}")))?
    } else if let Some(v) = obj.get("successRate").filter(|v| !v.is_null()) {
        parse_decimal(v)
            .ok_or_else(|| MonitorError::invalid_record(id, format!("unparseable successRate: {v}")))?
    } else {
        Decimal::ZERO
    };
    if success_rate < Decimal::ZERO || success_rate > Decimal::ONE {
        return Err(MonitorError::invalid_record(
            id,
            format!("success rate {success_rate} outside [0, 1]"),
        ));
    }

    let intent_count = match obj.get("totalIntents") {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| MonitorError::invalid_record(id, format!("invalid totalIntents: {n}")))?,
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| MonitorError::invalid_record(id, format!("invalid totalIntents: {s:?}")))?,
        Some(other) => {
            return Err(MonitorError::invalid_record(
                id,
                format!("invalid totalIntents: {other}"),
            ))
        }
    };

    Ok(MakerInfo {
        address,
        success_rate: success_rate.normalize(),
        intent_count,
    })
}

fn parse_market_quote(
    market: &Value,
    id: &DepositId,
) -> Result<(String, String, Decimal), MonitorError> {
    let platform = market
        .get("platform")
        .and_then(Value::as_str)
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| MonitorError::invalid_record(id, "market quote has no platform"))?;
    let currency = parse_currency(market, id)?;
    let rate = parse_rate(market, id)?;
    Ok((platform, currency, rate))
}

fn parse_currency(v: &Value, id: &DepositId) -> Result<String, MonitorError> {
    v.get("currency")
        .and_then(Value::as_str)
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| MonitorError::invalid_record(id, "missing currency"))
}

/// Human `rate` wins over the on-chain `conversionRate`.
fn parse_rate(v: &Value, id: &DepositId) -> Result<Decimal, MonitorError> {
    let rate = if let Some(r) = v.get("rate").filter(|r| !r.is_null()) {
        parse_decimal(r)
            .ok_or_else(|| MonitorError::invalid_record(id, format!("unparseable rate: {r}")))?
    } else if let Some(r) = v.get("conversionRate").filter(|r| !r.is_null()) {
        parse_fixed_point_rate(r)
            .ok_or_else(|| MonitorError::invalid_record(id, format!("unparseable conversionRate: {r}")))?
    } else {
        return Err(MonitorError::invalid_record(id, "missing rate"));
    };

    if rate <= Decimal::ZERO {
        return Err(MonitorError::invalid_record(id, format!("non-positive rate: {rate}")));
    }
    Ok(rate)
}

fn parse_payment_methods(
    obj: &Map<String, Value>,
    id: &DepositId,
) -> Result<BTreeSet<String>, MonitorError> {
    match obj.get("paymentMethods") {
        None | Some(Value::Null) => Ok(BTreeSet::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|m| m.trim().to_lowercase())
                    .ok_or_else(|| {
                        MonitorError::invalid_record(id, format!("payment method is not a string: {item}"))
                    })
            })
            .filter(|m| !matches!(m, Ok(s) if s.is_empty()))
            .collect(),
        Some(other) => Err(MonitorError::invalid_record(
            id,
            format!("paymentMethods is not an array: {other}"),
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
