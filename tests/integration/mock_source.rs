//! Test doubles for driving the poll loop.
//!
//! `ScriptedSource` replays a script of snapshots and errors, `CollectingSink`
//! keeps every report, and `InstantClock` records sleeps without waiting.
//! All state sits behind `Arc<Mutex<..>>` so a test can keep a handle
//! after moving the double into the `Monitor`.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mockall::mock;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use zkp2p_monitor::engine::monitor::Clock;
use zkp2p_monitor::report::ReportSink;
use zkp2p_monitor::source::MarketDataSource;
use zkp2p_monitor::types::{CycleReport, MarketSnapshot, MonitorError};

// ---------------------------------------------------------------------------
// Scripted source
// ---------------------------------------------------------------------------

/// Replays scripted results in order. Once the script is empty every call
/// fails with a fetch error.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    script: Arc<Mutex<VecDeque<Result<MarketSnapshot, MonitorError>>>>,
    calls: Arc<Mutex<u32>>,
    /// If set, all fetches return this error regardless of the script.
    force_error: Arc<Mutex<Option<String>>>,
}

impl ScriptedSource {
    pub fn with_script(script: Vec<Result<MarketSnapshot, MonitorError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            ..Self::default()
        }
    }

    pub fn push(&self, result: Result<MarketSnapshot, MonitorError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl MarketDataSource for ScriptedSource {
    async fn fetch_market_snapshot(&self) -> Result<MarketSnapshot, MonitorError> {
        *self.calls.lock().unwrap() += 1;

        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(MonitorError::fetch("mock", msg));
        }

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(MonitorError::fetch("mock", "script exhausted")))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// mockall source
// ---------------------------------------------------------------------------

mock! {
    pub Source {}

    #[async_trait]
    impl MarketDataSource for Source {
        async fn fetch_market_snapshot(&self) -> Result<MarketSnapshot, MonitorError>;
        fn name(&self) -> &str;
    }
}

// ---------------------------------------------------------------------------
// Collecting sink
// ---------------------------------------------------------------------------

/// Keeps every report; optionally signals once `n` reports have arrived.
#[derive(Clone, Default)]
pub struct CollectingSink {
    reports: Arc<Mutex<Vec<CycleReport>>>,
    stop: Arc<Mutex<Option<(usize, oneshot::Sender<()>)>>>,
}

impl CollectingSink {
    /// A sink plus a shutdown future that resolves after `n` reports.
    pub fn stop_after(n: usize) -> (Self, impl std::future::Future<Output = ()>) {
        let (tx, rx) = oneshot::channel();
        let sink = Self {
            stop: Arc::new(Mutex::new(Some((n, tx)))),
            ..Self::default()
        };
        (sink, async move {
            let _ = rx.await;
        })
    }

    pub fn reports(&self) -> Vec<CycleReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl ReportSink for CollectingSink {
    fn emit(&mut self, report: &CycleReport) -> Result<(), MonitorError> {
        let count = {
            let mut reports = self.reports.lock().unwrap();
            reports.push(report.clone());
            reports.len()
        };

        let mut stop = self.stop.lock().unwrap();
        if matches!(stop.as_ref(), Some((n, _)) if count >= *n) {
            if let Some((_, tx)) = stop.take() {
                let _ = tx.send(());
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Instant clock
// ---------------------------------------------------------------------------

/// Clock whose time only moves when something sleeps on it.
#[derive(Clone)]
pub struct InstantClock {
    start: DateTime<Utc>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl Default for InstantClock {
    fn default() -> Self {
        Self {
            start: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl InstantClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for InstantClock {
    fn now(&self) -> DateTime<Utc> {
        let slept: Duration = self.sleeps.lock().unwrap().iter().sum();
        self.start + chrono::Duration::from_std(slept).unwrap_or_else(|_| chrono::Duration::zero())
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A flat raw deposit as the deposits endpoint returns it.
pub fn raw_deposit(id: u64, rate: &str, amount: &str, currency: &str, methods: &[&str]) -> Value {
    json!({
        "depositId": id.to_string(),
        "rate": rate,
        "availableUsd": amount,
        "currency": currency,
        "paymentMethods": methods,
        "depositor": "0x1234567890abcdef1234567890abcdef12345678",
        "successRateBps": 9750,
        "totalIntents": 40
    })
}

/// Snapshot with two profitable deposits (one per side) and one at par.
pub fn sample_snapshot() -> MarketSnapshot {
    MarketSnapshot {
        deposits: vec![
            raw_deposit(1, "0.95", "1000.00", "USD", &["zelle"]),
            raw_deposit(2, "1.03", "10000.00", "USD", &["zelle", "revolut"]),
            raw_deposit(3, "1.00", "500.00", "USD", &["zelle"]),
        ],
        locked_in_intents: rust_decimal_macros::dec!(250),
        ..MarketSnapshot::default()
    }
}
