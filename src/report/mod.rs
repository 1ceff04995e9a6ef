//! Report sinks.
//!
//! The engine hands each finished `CycleReport` to a `ReportSink`. Two
//! renderers ship: a human console snapshot and a JSON-lines export.
//! Rounding and display formatting happen here and nowhere else.

pub mod console;
pub mod json;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::{MonitorConfig, ReportConfig, ReportFormat};
use crate::types::{CycleReport, MonitorError};

pub use console::ConsoleRenderer;
pub use json::JsonRenderer;

/// Consumer of finished cycle reports.
pub trait ReportSink {
    fn emit(&mut self, report: &CycleReport) -> Result<(), MonitorError>;
}

/// Build the stdout sink selected by `[report] format`.
pub fn build_sink(report: &ReportConfig, monitor: &MonitorConfig) -> Box<dyn ReportSink + Send> {
    match report.format {
        ReportFormat::Console => Box::new(ConsoleRenderer::stdout(
            report.top_n,
            monitor.target_buy_rate,
            monitor.target_sell_rate,
        )),
        ReportFormat::Json => Box::new(JsonRenderer::stdout()),
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Human name for a payment platform id.
pub fn platform_display_name(platform: &str) -> String {
    let name = match platform.to_lowercase().as_str() {
        "zelle" => "Zelle",
        "zelle-citi" => "Zelle (Citi)",
        "zelle-chase" => "Zelle (Chase)",
        "zelle-bofa" => "Zelle (BofA)",
        "paypal" => "PayPal",
        "revolut" => "Revolut",
        "wise" => "Wise",
        "venmo" => "Venmo",
        "cashapp" => "Cash App",
        "monzo" => "Monzo",
        "mercadopago" => "Mercado Pago",
        "n26" => "N26",
        "chime" => "Chime",
        _ => return platform.to_string(),
    };
    name.to_string()
}

/// `0x1234567890abcdef` → `0x1234...cdef`.
pub fn short_address(address: &str) -> String {
    if address.is_empty() {
        return "-".to_string();
    }
    if address.len() < 12 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// Dollar amount rounded to cents with thousands separators.
pub fn fmt_usd(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let mut cents = rounded.abs();
    cents.rescale(2);
    let text = cents.to_string();
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}${grouped}.{frac_part}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
