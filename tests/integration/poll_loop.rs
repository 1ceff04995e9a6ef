//! End-to-end poll loop tests: scripted source → engine → collecting sink.

use mockall::Sequence;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use zkp2p_monitor::config::{MonitorConfig, RetryPolicy};
use zkp2p_monitor::engine::monitor::{Clock, Monitor, RunOutcome};
use zkp2p_monitor::types::{MonitorError, MonitorMode};

use crate::mock_source::{sample_snapshot, CollectingSink, InstantClock, MockSource, ScriptedSource};

fn config(mode: MonitorMode) -> MonitorConfig {
    MonitorConfig {
        target_buy_rate: dec!(0.97),
        target_sell_rate: dec!(1.015),
        min_amount_usd: dec!(100),
        monitor_interval: Duration::from_secs(60),
        mode,
        allowed_payment_methods: BTreeSet::from(["zelle".to_string()]),
        allowed_currencies: BTreeSet::from(["USD".to_string()]),
    }
}

fn retry(max_attempts: u32, max_consecutive_failures: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(500),
        max_backoff: Duration::from_secs(10),
        max_consecutive_failures,
    }
}

fn outage() -> MonitorError {
    MonitorError::fetch("mock", "503 Service Unavailable")
}

// ---------------------------------------------------------------------------
// ONCE
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_once_renders_single_report() {
    let source = ScriptedSource::with_script(vec![Ok(sample_snapshot())]);
    let sink = CollectingSink::default();
    let clock = InstantClock::default();

    let mut monitor = Monitor::new(
        Box::new(source.clone()),
        Box::new(sink.clone()),
        Arc::new(clock.clone()),
        config(MonitorMode::Once),
        retry(3, 0),
    );
    let outcome = assert_ok!(monitor.run(std::future::pending()).await);

    assert_eq!(
        outcome,
        RunOutcome {
            cycles_completed: 1,
            cycles_skipped: 0,
            interrupted: false
        }
    );
    assert_eq!(source.call_count(), 1);

    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.cycle_number, 1);
    assert_eq!(report.timestamp, clock.now());
    assert_eq!(report.buy.len(), 1);
    assert_eq!(report.sell.len(), 1);
    assert_eq!(report.sell[0].profit_amount, dec!(300.00));
    assert_eq!(report.par_records, 1);
    assert_eq!(report.summary.total_available_liquidity, dec!(11500.00));
    assert_eq!(report.summary.locked_in_intents, dec!(250));
}

#[tokio::test]
async fn test_once_fetch_exhaustion_returns_error() {
    let source = ScriptedSource::default();
    source.set_error("connection refused");
    let sink = CollectingSink::default();
    let clock = InstantClock::default();

    let mut monitor = Monitor::new(
        Box::new(source.clone()),
        Box::new(sink.clone()),
        Arc::new(clock.clone()),
        config(MonitorMode::Once),
        retry(3, 0),
    );
    let err = assert_err!(monitor.run(std::future::pending()).await);

    assert!(matches!(err, MonitorError::Fetch { .. }));
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(source.call_count(), 3);
    assert!(sink.reports().is_empty());
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(500), Duration::from_millis(1000)]
    );
}

#[tokio::test]
async fn test_once_interrupt_is_not_swallowed() {
    let source = ScriptedSource::with_script(vec![Ok(sample_snapshot())]);
    let sink = CollectingSink::default();

    let mut monitor = Monitor::new(
        Box::new(source.clone()),
        Box::new(sink.clone()),
        Arc::new(InstantClock::default()),
        config(MonitorMode::Once),
        retry(3, 0),
    );
    let err = assert_err!(monitor.run(std::future::ready(())).await);

    assert!(matches!(err, MonitorError::Interrupted));
    assert_eq!(source.call_count(), 0);
    assert!(sink.reports().is_empty());
}

#[tokio::test]
async fn test_once_interrupt_during_backoff() {
    let source = ScriptedSource::default();
    source.set_error("connection reset");
    let clock = InstantClock::default();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let mut monitor = Monitor::new(
        Box::new(source.clone()),
        Box::new(CollectingSink::default()),
        Arc::new(clock.clone()),
        config(MonitorMode::Once),
        retry(1000, 0),
    );
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        let _ = tx.send(());
    });
    let err = assert_err!(
        monitor
            .run(async move {
                let _ = rx.await;
            })
            .await
    );

    assert!(matches!(err, MonitorError::Interrupted));
    assert!(source.call_count() < 1000);
}

// ---------------------------------------------------------------------------
// CONTINUOUS
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_continuous_retries_and_stops_on_shutdown() {
    // Cycle 1 ok, cycle 2 recovers on the second attempt, cycle 3 ok.
    let source = ScriptedSource::with_script(vec![
        Ok(sample_snapshot()),
        Err(outage()),
        Ok(sample_snapshot()),
    ]);
    source.push(Ok(sample_snapshot()));
    let (sink, shutdown) = CollectingSink::stop_after(3);
    let clock = InstantClock::default();

    let mut monitor = Monitor::new(
        Box::new(source.clone()),
        Box::new(sink.clone()),
        Arc::new(clock.clone()),
        config(MonitorMode::Continuous),
        retry(3, 0),
    );
    let outcome = assert_ok!(monitor.run(shutdown).await);

    assert_eq!(outcome.cycles_completed, 3);
    assert_eq!(outcome.cycles_skipped, 0);
    assert!(outcome.interrupted);
    assert_eq!(source.call_count(), 4);

    let numbers: Vec<u64> = sink.reports().iter().map(|r| r.cycle_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    // interval, backoff, interval; the shutdown wins the last sleep.
    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_secs(60),
            Duration::from_millis(500),
            Duration::from_secs(60),
        ]
    );
}

#[tokio::test]
async fn test_continuous_skips_exhausted_tick() {
    let source = ScriptedSource::with_script(vec![
        Ok(sample_snapshot()),
        Err(outage()),
        Err(outage()),
        Ok(sample_snapshot()),
    ]);
    let (sink, shutdown) = CollectingSink::stop_after(2);

    let mut monitor = Monitor::new(
        Box::new(source.clone()),
        Box::new(sink.clone()),
        Arc::new(InstantClock::default()),
        config(MonitorMode::Continuous),
        retry(2, 0),
    );
    let outcome = assert_ok!(monitor.run(shutdown).await);

    assert_eq!(outcome.cycles_completed, 2);
    assert_eq!(outcome.cycles_skipped, 1);
    let numbers: Vec<u64> = sink.reports().iter().map(|r| r.cycle_number).collect();
    assert_eq!(numbers, vec![1, 3]);
}

#[tokio::test]
async fn test_continuous_gives_up_after_consecutive_failures() {
    let source = ScriptedSource::default();
    source.set_error("dns failure");
    let sink = CollectingSink::default();

    let mut monitor = Monitor::new(
        Box::new(source.clone()),
        Box::new(sink.clone()),
        Arc::new(InstantClock::default()),
        config(MonitorMode::Continuous),
        retry(2, 3),
    );
    let err = assert_err!(monitor.run(std::future::pending()).await);

    assert!(matches!(err, MonitorError::Fetch { .. }));
    assert_eq!(source.call_count(), 6);
    assert!(sink.reports().is_empty());
}

// ---------------------------------------------------------------------------
// mockall
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mockall_source_retried_in_order() {
    let mut source = MockSource::new();
    let mut seq = Sequence::new();

    source.expect_name().return_const("mockall".to_string());
    source
        .expect_fetch_market_snapshot()
        .times(2)
        .in_sequence(&mut seq)
        .returning(|| Err(MonitorError::fetch("mockall", "timeout")));
    source
        .expect_fetch_market_snapshot()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(sample_snapshot()));

    let sink = CollectingSink::default();
    let clock = InstantClock::default();
    let mut monitor = Monitor::new(
        Box::new(source),
        Box::new(sink.clone()),
        Arc::new(clock.clone()),
        config(MonitorMode::Once),
        retry(3, 0),
    );

    let outcome = assert_ok!(monitor.run(std::future::pending()).await);
    assert_eq!(outcome.cycles_completed, 1);
    assert_eq!(sink.reports().len(), 1);
    assert_eq!(clock.sleeps().len(), 2);
}

#[tokio::test]
async fn test_mockall_source_never_called_twice_in_once_mode() {
    let mut source = MockSource::new();
    source.expect_name().return_const("mockall".to_string());
    source
        .expect_fetch_market_snapshot()
        .times(1)
        .returning(|| Ok(Default::default()));

    let sink = CollectingSink::default();
    let mut monitor = Monitor::new(
        Box::new(source),
        Box::new(sink.clone()),
        Arc::new(InstantClock::default()),
        config(MonitorMode::Once),
        retry(3, 0),
    );

    assert_ok!(monitor.run(std::future::pending()).await);
    let report = &sink.reports()[0];
    assert_eq!(report.summary.active_deposit_count, 0);
    assert!(report.buy.is_empty() && report.sell.is_empty());
}
