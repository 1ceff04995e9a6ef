//! ZKP2P deposit monitor.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the Peerlytics source and the report sink, and runs the poll
//! loop until a single cycle completes or Ctrl+C arrives.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use zkp2p_monitor::config::{AppConfig, MonitorConfig, RetryPolicy, DEFAULT_CONFIG_PATH};
use zkp2p_monitor::engine::monitor::{Monitor, TokioClock};
use zkp2p_monitor::report;
use zkp2p_monitor::source::peerlytics::PeerlyticsClient;
use zkp2p_monitor::types::{MonitorError, MonitorMode};

const BANNER: &str = r#"
 _____ _  ______  ____  ____
|__  /| |/ /  _ \|___ \|  _ \
  / / | ' /| |_) | __) | |_) |
 / /_ | . \|  __/ / __/|  __/
/____||_|\_\_|   |_____|_|

  Deposit Monitor: peer-to-peer arbitrage scanner
  v0.1.0, read-only
"#;

const EXIT_FETCH_FAILURE: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
/// 128 + SIGINT, as a shell reports a process killed by Ctrl+C.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path =
        std::env::var("MONITOR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let (cfg, monitor_cfg, retry) = match load_config(&config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(path = %config_path, error = %format!("{e:#}"), "Configuration error");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    println!("{BANNER}");
    log_startup(&cfg, &monitor_cfg);

    // -- Initialise components -------------------------------------------

    let api_key = std::env::var(&cfg.source.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .map(SecretString::new);

    let client = match PeerlyticsClient::new(&cfg.source, api_key, &monitor_cfg) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Failed to initialise Peerlytics client");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if client.has_api_key() {
        info!("Peerlytics API key configured");
    } else {
        warn!(
            env = %cfg.source.api_key_env,
            "No Peerlytics API key, using the free tier"
        );
    }

    let sink = report::build_sink(&cfg.report, &monitor_cfg);
    let mut monitor = Monitor::new(
        Box::new(client),
        sink,
        Arc::new(TokioClock),
        monitor_cfg,
        retry,
    );

    // -- Shutdown --------------------------------------------------------

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for Ctrl+C");
                // Keep the sender alive so the loop never sees a shutdown.
                std::future::pending::<()>().await;
            }
        }
    });
    let shutdown = async move {
        let _ = shutdown_rx.await;
    };

    match monitor.mode() {
        MonitorMode::Continuous => info!("Entering poll loop. Press Ctrl+C to stop."),
        MonitorMode::Once => info!("Running a single cycle. Ctrl+C aborts it."),
    }

    // -- Run -------------------------------------------------------------

    match monitor.run(shutdown).await {
        Ok(outcome) => {
            info!(
                cycles = outcome.cycles_completed,
                skipped = outcome.cycles_skipped,
                interrupted = outcome.interrupted,
                "Monitor shut down cleanly."
            );
            ExitCode::SUCCESS
        }
        Err(MonitorError::Interrupted) => {
            warn!("Monitor interrupted before the cycle completed");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(e) => {
            error!(error = %e, "Monitor stopped");
            match e {
                MonitorError::Config(_) => ExitCode::from(EXIT_CONFIG_ERROR),
                _ => ExitCode::from(EXIT_FETCH_FAILURE),
            }
        }
    }
}

/// Read the TOML file, apply env overrides, and validate.
fn load_config(path: &str) -> Result<(AppConfig, MonitorConfig, RetryPolicy)> {
    let mut cfg = AppConfig::load_or_default(path)?;
    cfg.apply_env_overrides()
        .context("Invalid environment override")?;
    let monitor_cfg = cfg.monitor_config()?;
    let retry = cfg.retry_policy()?;
    Ok((cfg, monitor_cfg, retry))
}

/// Echo the effective filters and targets.
fn log_startup(cfg: &AppConfig, monitor: &MonitorConfig) {
    let discount = (Decimal::ONE - monitor.target_buy_rate) * dec!(100);
    let premium = (monitor.target_sell_rate - Decimal::ONE) * dec!(100);

    info!(
        mode = %monitor.mode,
        interval_secs = monitor.monitor_interval.as_secs(),
        source = %cfg.source.base_url,
        "Deposit monitor starting up"
    );
    info!(
        target_buy = %monitor.target_buy_rate,
        buy_discount = format!("{:.2}%", discount.round_dp(2)),
        target_sell = %monitor.target_sell_rate,
        sell_premium = format!("{:.2}%", premium.round_dp(2)),
        min_amount = format!("${:.2}", monitor.min_amount_usd.round_dp(2)),
        "Targets"
    );
    info!(
        payment_methods = ?monitor.allowed_payment_methods,
        currencies = ?monitor.allowed_currencies,
        "Filters"
    );

    let rpc_configured = AppConfig::resolve_env(&cfg.chain.rpc_url_env).is_ok();
    info!(
        chain_id = cfg.chain.chain_id,
        rpc_env = %cfg.chain.rpc_url_env,
        rpc_configured,
        "Chain RPC (read-only, unused by the monitor)"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("zkp2p_monitor=info"));

    let json_logging = std::env::var("MONITOR_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
