//! Peerlytics v1 market-data integration.
//!
//! Read-only feed of ZKP2P deposits and market rates.
//!
//! API docs: https://peerlytics.xyz/docs
//! Base URL: https://peerlytics.xyz/api/v1
//! Auth: `x-api-key` header (paid tier). Every response carries
//! `X-Credits-Remaining` / `X-Credits-Source` / `X-RateLimit-Remaining`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::MarketDataSource;
use crate::config::{MonitorConfig, SourceConfig};
use crate::engine::normalizer::parse_decimal;
use crate::types::{CreditStatus, MarketRate, MarketSnapshot, MonitorError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const PLATFORM_NAME: &str = "peerlytics";
const USER_AGENT: &str = "zkp2p-monitor/0.1.0 (deposit-monitor)";

/// Only deposits still accepting intents are worth evaluating.
const DEPOSIT_STATUS: &str = "ACTIVE";

/// Rows requested from `/market/summary`.
const MARKET_SUMMARY_LIMIT: u32 = 200;

/// Keys the market summary has used for the intent-lock total.
const LOCKED_KEYS: &[&str] = &[
    "lockedInIntentsUsd",
    "lockedInIntents",
    "totalLockedUsd",
    "lockedUsd",
];

// ---------------------------------------------------------------------------
// Envelope parsing
// ---------------------------------------------------------------------------

/// One page of `/deposits`.
#[derive(Debug, Default)]
pub struct DepositPage {
    pub deposits: Vec<Value>,
    pub has_more: bool,
}

/// Parse a `/deposits` response.
///
/// Accepted shapes: `{success, data: {deposits, hasMore}}`, `{data: [..]}`,
/// `{deposits, hasMore}` and a bare array. Anything else is an invalid
/// envelope.
pub fn parse_deposit_page(body: Value) -> Result<DepositPage, String> {
    if let Some(false) = body.get("success").and_then(Value::as_bool) {
        let reason = body
            .get("error")
            .or_else(|| body.get("message"))
            .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
            .unwrap_or_else(|| "request unsuccessful".to_string());
        return Err(format!("API reported failure: {reason}"));
    }

    let inner = match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) => data,
            None => Value::Object(map),
        },
        other => other,
    };

    match inner {
        Value::Array(deposits) => Ok(DepositPage {
            deposits,
            has_more: false,
        }),
        Value::Object(mut map) => {
            let has_more = map.get("hasMore").and_then(Value::as_bool).unwrap_or(false);
            match map.remove("deposits") {
                Some(Value::Array(deposits)) => Ok(DepositPage { deposits, has_more }),
                Some(other) => Err(format!("`deposits` is not an array: {other}")),
                None => Err("response has no `deposits` array".to_string()),
            }
        }
        other => Err(format!("unexpected response shape: {other}")),
    }
}

/// Parsed `/market/summary` response.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MarketSummaryData {
    pub locked_in_intents: Decimal,
    pub rates: Vec<MarketRate>,
}

/// Parse a `/market/summary` response. The shape has drifted over time, so
/// this takes whatever it recognises and ignores the rest.
pub fn parse_market_summary(body: &Value) -> MarketSummaryData {
    let data = body.get("data").unwrap_or(body);

    let locked_in_intents = LOCKED_KEYS
        .iter()
        .find_map(|key| data.get(*key).and_then(parse_decimal))
        .unwrap_or(Decimal::ZERO);

    let items = match data {
        Value::Array(items) => Some(items),
        Value::Object(_) => ["markets", "items", "rates"]
            .iter()
            .find_map(|key| data.get(*key).and_then(Value::as_array)),
        _ => None,
    };

    let rates = items
        .map(|items| items.iter().filter_map(parse_market_rate).collect())
        .unwrap_or_default();

    MarketSummaryData {
        locked_in_intents,
        rates,
    }
}

fn parse_market_rate(item: &Value) -> Option<MarketRate> {
    let text = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| item.get(*k).and_then(Value::as_str))
            .unwrap_or("?")
            .to_string()
    };
    let number = |keys: &[&str]| keys.iter().find_map(|k| item.get(*k).and_then(parse_decimal));

    item.is_object().then(|| MarketRate {
        platform: text(&["platform", "name"]),
        currency: text(&["currency"]),
        rate: number(&["rate", "conversionRate"]),
        liquidity: number(&["liquidity", "availableLiquidity"]),
    })
}

/// Read the credit / rate-limit headers attached to every response.
pub fn credit_status(headers: &HeaderMap) -> CreditStatus {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };
    CreditStatus {
        remaining: get("x-credits-remaining"),
        source: get("x-credits-source"),
        rate_limit_remaining: get("x-ratelimit-remaining"),
    }
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Every deposit row collected across pages.
#[derive(Debug, Default)]
pub struct PagedDeposits {
    pub deposits: Vec<Value>,
    /// Credit headers from the last page fetched.
    pub credits: Option<CreditStatus>,
    /// `max_pages` ran out while the API still reported more rows.
    pub truncated: bool,
}

/// Page through `/deposits` until the API reports no more rows, a short or
/// empty page arrives, or `max_pages` is reached.
///
/// `fetch_page` receives the row offset and returns the raw body plus the
/// credit headers of that response.
pub async fn collect_pages<F, Fut>(
    page_size: u32,
    max_pages: u32,
    mut fetch_page: F,
) -> Result<PagedDeposits>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(Value, CreditStatus)>>,
{
    let mut collected = PagedDeposits::default();
    let mut offset = 0u32;

    for page_no in 0..max_pages {
        let (body, page_credits) = fetch_page(offset).await?;
        collected.credits = Some(page_credits);

        let page = parse_deposit_page(body)
            .map_err(|e| anyhow::anyhow!("Invalid /deposits envelope: {e}"))?;
        let received = page.deposits.len();
        debug!(page = page_no, offset, received, has_more = page.has_more, "Deposit page");

        if received == 0 {
            break;
        }
        collected.deposits.extend(page.deposits);

        if !page.has_more || received < page_size as usize {
            break;
        }
        if page_no + 1 == max_pages {
            warn!(max_pages, "Page limit reached, deposit list truncated");
            collected.truncated = true;
            break;
        }
        offset += page_size;
    }

    Ok(collected)
}

/// Combine the deposit pages with the optional market summary.
///
/// A failed summary leaves zero locked liquidity and no rate lines; the
/// deposits still go out.
pub fn assemble_snapshot(
    deposits: PagedDeposits,
    summary: Result<(MarketSummaryData, CreditStatus)>,
) -> MarketSnapshot {
    let (summary, summary_credits) = match summary {
        Ok((summary, credits)) => (summary, Some(credits)),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Market summary unavailable");
            (MarketSummaryData::default(), None)
        }
    };

    info!(
        deposits = deposits.deposits.len(),
        truncated = deposits.truncated,
        locked = %summary.locked_in_intents,
        rates = summary.rates.len(),
        "Peerlytics snapshot fetched"
    );

    MarketSnapshot {
        deposits: deposits.deposits,
        locked_in_intents: summary.locked_in_intents,
        market_rates: summary.rates,
        credits: summary_credits.or(deposits.credits),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Peerlytics v1 client.
pub struct PeerlyticsClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    page_size: u32,
    max_pages: u32,
    /// Platform / currency hints for the market summary query.
    platforms: Vec<String>,
    currencies: Vec<String>,
}

impl PeerlyticsClient {
    /// Create a new client.
    ///
    /// `api_key` is optional; without it the free tier applies and requests
    /// may be rate-limited harder.
    pub fn new(
        cfg: &SourceConfig,
        api_key: Option<SecretString>,
        monitor: &MonitorConfig,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client for Peerlytics")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            page_size: cfg.page_size.max(1),
            max_pages: cfg.max_pages.max(1),
            platforms: monitor.allowed_payment_methods.iter().cloned().collect(),
            currencies: monitor.allowed_currencies.iter().cloned().collect(),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    // -- URL builders ----------------------------------------------------

    fn deposits_url(&self, offset: u32) -> String {
        format!(
            "{}/deposits?status={}&limit={}&offset={}",
            self.base_url,
            urlencoding::encode(DEPOSIT_STATUS),
            self.page_size,
            offset,
        )
    }

    fn market_summary_url(&self) -> String {
        let mut url = format!(
            "{}/market/summary?includeRates=true&limit={MARKET_SUMMARY_LIMIT}",
            self.base_url
        );
        for platform in &self.platforms {
            url.push_str(&format!("&platform={}", urlencoding::encode(platform)));
        }
        for currency in &self.currencies {
            url.push_str(&format!("&currency={}", urlencoding::encode(currency)));
        }
        url
    }

    // -- Requests --------------------------------------------------------

    async fn get_json(&self, url: &str) -> Result<(Value, CreditStatus)> {
        debug!(url = %url, "Fetching from Peerlytics");

        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key.expose_secret());
        }

        let resp = request
            .send()
            .await
            .context("Peerlytics API request failed")?;

        let credits = credit_status(resp.headers());

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Peerlytics API error {status}: {body}");
        }

        let body: Value = resp
            .json()
            .await
            .context("Failed to parse Peerlytics response body")?;

        Ok((body, credits))
    }

    async fn fetch_deposits(&self) -> Result<PagedDeposits> {
        collect_pages(self.page_size, self.max_pages, |offset| {
            let url = self.deposits_url(offset);
            async move { self.get_json(&url).await }
        })
        .await
    }

    async fn fetch_market_summary(&self) -> Result<(MarketSummaryData, CreditStatus)> {
        let (body, credits) = self.get_json(&self.market_summary_url()).await?;
        Ok((parse_market_summary(&body), credits))
    }
}

// ---------------------------------------------------------------------------
// MarketDataSource trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketDataSource for PeerlyticsClient {
    /// Fetch all active deposits, then the market summary.
    ///
    /// The summary is optional: if it fails the snapshot still goes out with
    /// zero locked liquidity and no rate lines.
    async fn fetch_market_snapshot(&self) -> Result<MarketSnapshot, MonitorError> {
        let deposits = self
            .fetch_deposits()
            .await
            .map_err(|e| MonitorError::fetch(PLATFORM_NAME, format!("{e:#}")))?;

        Ok(assemble_snapshot(deposits, self.fetch_market_summary().await))
    }

    fn name(&self) -> &str {
        PLATFORM_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
