//! Poll loop: the fetch → process → render → sleep state machine.
//!
//! The loop owns the retry policy and the cycle counter. Everything it talks
//! to (data source, report sink, clock) is injected, so tests can drive it
//! with scripted sources and an instant clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::filter::OpportunityFilter;
use super::pipeline::evaluate;
use crate::config::{MonitorConfig, RetryPolicy};
use crate::report::ReportSink;
use crate::source::MarketDataSource;
use crate::types::{CycleReport, MarketSnapshot, MonitorError, MonitorMode};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Time source for report timestamps, backoff and the poll interval.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// Loop state
// ---------------------------------------------------------------------------

/// One step of the poll loop.
#[derive(Debug)]
pub enum LoopState {
    Fetch,
    Process(MarketSnapshot),
    Render(CycleReport),
    Sleep,
    Done,
}

/// What a finished run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    /// The run ended because the shutdown future resolved.
    pub interrupted: bool,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct Monitor {
    source: Box<dyn MarketDataSource>,
    sink: Box<dyn ReportSink + Send>,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
    retry: RetryPolicy,
    filter: OpportunityFilter,
}

impl Monitor {
    pub fn new(
        source: Box<dyn MarketDataSource>,
        sink: Box<dyn ReportSink + Send>,
        clock: Arc<dyn Clock>,
        config: MonitorConfig,
        retry: RetryPolicy,
    ) -> Self {
        let filter = OpportunityFilter::new(&config);
        Self {
            source,
            sink,
            clock,
            config,
            retry,
            filter,
        }
    }

    pub fn mode(&self) -> MonitorMode {
        self.config.mode
    }

    /// Drive the loop until ONCE completes, the shutdown future resolves
    /// at a sleep boundary, or a failure turns fatal.
    ///
    /// ONCE never reaches a sleep boundary, so there the shutdown future
    /// races the fetch and wins with `MonitorError::Interrupted`.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<RunOutcome, MonitorError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut outcome = RunOutcome::default();
        let mut cycle: u64 = 0;
        let mut consecutive_failures: u32 = 0;
        let mut state = LoopState::Fetch;

        info!(
            mode = %self.config.mode,
            source = self.source.name(),
            interval_secs = self.config.monitor_interval.as_secs(),
            "Monitor loop starting"
        );

        loop {
            state = match state {
                LoopState::Fetch => {
                    cycle += 1;
                    let fetched = match self.config.mode {
                        MonitorMode::Continuous => self.fetch_with_retry(cycle).await,
                        MonitorMode::Once => tokio::select! {
                            biased;
                            _ = &mut shutdown => {
                                warn!(cycle, "Shutdown signal received mid-cycle");
                                return Err(MonitorError::Interrupted);
                            }
                            fetched = self.fetch_with_retry(cycle) => fetched,
                        },
                    };
                    match fetched {
                        Ok(snapshot) => LoopState::Process(snapshot),
                        Err(e) => self.cycle_failed(cycle, e, &mut outcome, &mut consecutive_failures)?,
                    }
                }

                LoopState::Process(snapshot) => {
                    LoopState::Render(evaluate(snapshot, &self.filter, cycle, self.clock.now()))
                }

                LoopState::Render(report) => match self.sink.emit(&report) {
                    Ok(()) => {
                        outcome.cycles_completed += 1;
                        consecutive_failures = 0;
                        match self.config.mode {
                            MonitorMode::Once => LoopState::Done,
                            MonitorMode::Continuous => LoopState::Sleep,
                        }
                    }
                    Err(e) => self.cycle_failed(cycle, e, &mut outcome, &mut consecutive_failures)?,
                },

                LoopState::Sleep => {
                    let interval = self.config.monitor_interval;
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => {
                            info!("Shutdown signal received.");
                            outcome.interrupted = true;
                            LoopState::Done
                        }
                        _ = self.clock.sleep(interval) => LoopState::Fetch,
                    }
                }

                LoopState::Done => break,
            };
        }

        info!(
            completed = outcome.cycles_completed,
            skipped = outcome.cycles_skipped,
            interrupted = outcome.interrupted,
            "Monitor loop finished"
        );

        Ok(outcome)
    }

    /// Fetch one snapshot, retrying with exponential backoff.
    async fn fetch_with_retry(&self, cycle: u64) -> Result<MarketSnapshot, MonitorError> {
        let mut attempt = 1;
        loop {
            match self.source.fetch_market_snapshot().await {
                Ok(snapshot) => {
                    if attempt > 1 {
                        info!(cycle, attempt, "Fetch recovered after retry");
                    }
                    return Ok(snapshot);
                }
                Err(e) if attempt < self.retry.max_attempts => {
                    let backoff = self.retry.backoff_after(attempt);
                    warn!(
                        cycle,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    self.clock.sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        cycle,
                        attempts = attempt,
                        source = self.source.name(),
                        error = %e,
                        "Fetch attempts exhausted"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// ONCE: every cycle failure is fatal. CONTINUOUS: skip the tick unless
    /// the consecutive-failure limit is reached.
    fn cycle_failed(
        &self,
        cycle: u64,
        err: MonitorError,
        outcome: &mut RunOutcome,
        consecutive_failures: &mut u32,
    ) -> Result<LoopState, MonitorError> {
        match self.config.mode {
            MonitorMode::Once => {
                error!(cycle, error = %err, "Cycle failed");
                Err(err)
            }
            MonitorMode::Continuous => {
                outcome.cycles_skipped += 1;
                *consecutive_failures += 1;

                let limit = self.retry.max_consecutive_failures;
                if limit > 0 && *consecutive_failures >= limit {
                    error!(
                        cycle,
                        consecutive_failures = *consecutive_failures,
                        error = %err,
                        "Too many consecutive failed cycles"
                    );
                    return Err(err);
                }

                error!(
                    cycle,
                    consecutive_failures = *consecutive_failures,
                    error = %err,
                    "Cycle failed, continuing to next"
                );
                Ok(LoopState::Sleep)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
