//! Market-level scenarios run through the public engine API.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use zkp2p_monitor::config::{AppConfig, ReportFormat};
use zkp2p_monitor::engine::filter::OpportunityFilter;
use zkp2p_monitor::engine::pipeline::evaluate;
use zkp2p_monitor::source::peerlytics::parse_deposit_page;
use zkp2p_monitor::types::{MarketSnapshot, MonitorMode, OpportunityKind};

use crate::mock_source::raw_deposit;

fn filter_from(toml: &str) -> OpportunityFilter {
    let app = AppConfig::from_toml_str(toml).unwrap();
    OpportunityFilter::new(&app.monitor_config().unwrap())
}

const STRICT: &str = r#"
    [monitor]
    target_buy_rate = 0.95
    target_sell_rate = 1.015
    min_amount_usd = 100
    [filters]
    payment_methods = ["zelle"]
    currencies = ["USD"]
"#;

const LOOSE: &str = r#"
    [monitor]
    target_buy_rate = 1.0
    target_sell_rate = 1.0
    min_amount_usd = 0
    [filters]
    payment_methods = ["zelle", "revolut", "wise", "paypal", "venmo"]
    currencies = ["USD", "EUR", "GBP"]
"#;

/// 824 deposits with distinct cent amounts across both sides and par.
fn large_market() -> (MarketSnapshot, Decimal) {
    let methods = ["zelle", "revolut", "wise", "venmo"];
    let currencies = ["USD", "EUR", "GBP"];
    let rates = ["0.94", "0.97", "0.99", "1.00", "1.01", "1.02", "1.05"];

    let mut total = Decimal::ZERO;
    let mut deposits = Vec::new();
    for i in 0..824u64 {
        let amount = Decimal::new(10_000 + (i as i64) * 37, 2);
        total += amount;
        deposits.push(raw_deposit(
            1000 + i,
            rates[i as usize % rates.len()],
            &amount.to_string(),
            currencies[i as usize % currencies.len()],
            &[methods[i as usize % methods.len()]],
        ));
    }

    let snapshot = MarketSnapshot {
        deposits,
        locked_in_intents: dec!(4200.50),
        ..MarketSnapshot::default()
    };
    (snapshot, total)
}

#[test]
fn test_summary_over_824_deposits_is_filter_independent() {
    let (snapshot, total) = large_market();

    let strict = evaluate(snapshot.clone(), &filter_from(STRICT), 1, Utc::now());
    let loose = evaluate(snapshot, &filter_from(LOOSE), 1, Utc::now());

    for report in [&strict, &loose] {
        assert_eq!(report.summary.active_deposit_count, 824);
        assert_eq!(report.summary.total_available_liquidity, total);
        assert_eq!(report.summary.locked_in_intents, dec!(4200.50));
        assert_eq!(report.skipped_records, 0);
    }

    assert!(loose.summary.opportunity_counts.total() > strict.summary.opportunity_counts.total());
    // One in seven quotes sits at par.
    assert_eq!(loose.par_records, strict.par_records);
    assert_eq!(
        loose.summary.opportunity_counts.total() + loose.rejected + loose.par_records,
        824
    );
}

#[test]
fn test_ranked_lists_are_sorted_and_respect_targets() {
    let (snapshot, _) = large_market();
    let report = evaluate(snapshot, &filter_from(LOOSE), 1, Utc::now());

    for list in [&report.buy, &report.sell] {
        for pair in list.windows(2) {
            assert!(pair[0].profit_amount >= pair[1].profit_amount);
        }
    }
    assert!(report.buy.iter().all(|o| o.kind == OpportunityKind::Buy && o.source.rate < Decimal::ONE));
    assert!(report.sell.iter().all(|o| o.kind == OpportunityKind::Sell && o.source.rate > Decimal::ONE));
}

#[test]
fn test_one_malformed_record_leaves_the_rest_intact() {
    let good: Vec<_> = (1..=9)
        .map(|i| raw_deposit(i, "0.93", "250.00", "USD", &["zelle"]))
        .collect();

    let clean = evaluate(
        MarketSnapshot {
            deposits: good.clone(),
            ..MarketSnapshot::default()
        },
        &filter_from(STRICT),
        1,
        Utc::now(),
    );

    let mut dirty_deposits = good;
    dirty_deposits.insert(4, json!({"depositId": "bad", "rate": 0.9, "availableUsd": -10, "currency": "USD"}));
    let dirty = evaluate(
        MarketSnapshot {
            deposits: dirty_deposits,
            ..MarketSnapshot::default()
        },
        &filter_from(STRICT),
        1,
        Utc::now(),
    );

    assert_eq!(dirty.skipped_records, 1);
    assert_eq!(dirty.buy, clean.buy);
    assert_eq!(dirty.summary, clean.summary);
}

#[test]
fn test_liquidity_overflow_leaves_cycle_running() {
    let deposits = (1..=3)
        .map(|i| raw_deposit(i, "1", "4e28", "USD", &["zelle"]))
        .chain(std::iter::once(raw_deposit(4, "0.93", "250.00", "USD", &["zelle"])))
        .collect();

    let report = evaluate(
        MarketSnapshot {
            deposits,
            ..MarketSnapshot::default()
        },
        &filter_from(STRICT),
        1,
        Utc::now(),
    );

    assert_eq!(report.par_records, 3);
    assert_eq!(report.buy.len(), 1);
    // Deposits 2 and 3 no longer fit in the total.
    assert_eq!(report.summary.active_deposit_count, 2);
    assert_eq!(
        report.summary.total_available_liquidity,
        dec!(40000000000000000000000000250)
    );
}

#[test]
fn test_paginated_envelope_feeds_the_pipeline() {
    let body = json!({
        "success": true,
        "data": {
            "deposits": [
                {
                    "depositId": 1795,
                    "availableUsd": "4994.95",
                    "depositor": "0xaaaabbbbccccdddd",
                    "successRateBps": 10000,
                    "totalIntents": 7,
                    "markets": [
                        {"platform": "zelle", "currency": "USD", "conversionRate": "940000000000000000"},
                        {"platform": "revolut", "currency": "EUR", "rate": "1.02"}
                    ]
                }
            ],
            "hasMore": false
        }
    });
    let page = parse_deposit_page(body).unwrap();
    assert!(!page.has_more);

    let report = evaluate(
        MarketSnapshot {
            deposits: page.deposits,
            ..MarketSnapshot::default()
        },
        &filter_from(STRICT),
        1,
        Utc::now(),
    );

    // One deposit, two currency quotes: liquidity counted once.
    assert_eq!(report.summary.active_deposit_count, 1);
    assert_eq!(report.summary.total_available_liquidity, dec!(4994.95));
    assert_eq!(report.buy.len(), 1);
    assert_eq!(report.buy[0].source.rate, dec!(0.94));
    assert_eq!(report.buy[0].profit_amount, dec!(299.6970));
    // EUR is not an allowed currency.
    assert!(report.sell.is_empty());
    assert_eq!(report.rejected, 1);
}

#[test]
fn test_shipped_config_file_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml");
    let app = AppConfig::load(path).unwrap();
    let monitor = app.monitor_config().unwrap();
    app.retry_policy().unwrap();

    assert_eq!(monitor.mode, MonitorMode::Continuous);
    assert_eq!(monitor.target_buy_rate, dec!(0.97));
    assert_eq!(monitor.target_sell_rate, dec!(1.015));
    assert!(monitor.allowed_payment_methods.contains("zelle"));
    assert!(monitor.allowed_currencies.contains("AUD"));
    assert_eq!(app.report.format, ReportFormat::Console);
}
