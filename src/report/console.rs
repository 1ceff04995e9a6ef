//! Console snapshot renderer.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt::Write as _;
use std::io::{self, Write};

use super::{fmt_usd, platform_display_name, short_address, ReportSink};
use crate::types::{CycleReport, MarketRate, MonitorError, Opportunity};

/// Market-rate lines shown under the summary.
const MARKET_RATES_SHOWN: usize = 10;

const RULE: &str = "==========================================================================================";

/// Writes a human-readable snapshot per cycle.
pub struct ConsoleRenderer {
    out: Box<dyn Write + Send>,
    top_n: usize,
    target_buy: Decimal,
    target_sell: Decimal,
}

impl ConsoleRenderer {
    pub fn new(out: Box<dyn Write + Send>, top_n: usize, target_buy: Decimal, target_sell: Decimal) -> Self {
        Self {
            out,
            top_n,
            target_buy,
            target_sell,
        }
    }

    pub fn stdout(top_n: usize, target_buy: Decimal, target_sell: Decimal) -> Self {
        Self::new(Box::new(io::stdout()), top_n, target_buy, target_sell)
    }

    /// Render the full snapshot as text.
    pub fn render(&self, report: &CycleReport) -> String {
        let mut s = String::new();
        let summary = &report.summary;

        let _ = writeln!(s, "{RULE}");
        let _ = writeln!(
            s,
            "ZKP2P DEPOSIT MONITOR | cycle #{} | {}",
            report.cycle_number,
            report.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        );
        if let Some(credits) = &report.credits {
            let _ = write!(s, "API credits: {credits}");
            if let Some(limit) = &credits.rate_limit_remaining {
                let _ = write!(s, " | rate limit remaining: {limit}");
            }
            let _ = writeln!(s);
        }
        let _ = writeln!(s, "{RULE}");

        let _ = writeln!(s, "MARKET SUMMARY");
        let _ = writeln!(s, "  Total liquidity:    {}", fmt_usd(summary.total_available_liquidity));
        let _ = writeln!(s, "  Locked in intents:  {}", fmt_usd(summary.locked_in_intents));
        let _ = writeln!(s, "  Active deposits:    {}", summary.active_deposit_count);
        let _ = writeln!(
            s,
            "  Opportunities:      {} BUY / {} SELL",
            summary.opportunity_counts.buy, summary.opportunity_counts.sell,
        );
        let _ = writeln!(
            s,
            "  Skipped: {}  Filtered out: {}  At par: {}",
            report.skipped_records, report.rejected, report.par_records,
        );

        self.render_side(
            &mut s,
            &format!("BUY OPPORTUNITIES (rate <= {})", self.target_buy),
            &report.buy,
        );
        self.render_side(
            &mut s,
            &format!("SELL OPPORTUNITIES (rate >= {})", self.target_sell),
            &report.sell,
        );

        if !report.market_rates.is_empty() {
            render_market_rates(&mut s, &report.market_rates);
        }

        let _ = writeln!(s, "{RULE}");
        s
    }

    fn render_side(&self, s: &mut String, title: &str, list: &[Opportunity]) {
        let _ = writeln!(s);
        let _ = writeln!(s, "{title}");

        if list.is_empty() {
            let _ = writeln!(s, "  (none)");
            return;
        }

        let _ = writeln!(
            s,
            "  {:>3}  {:<8} {:>7} {:<4} {:>14} {:>12} {:>7}  {:<22} {}",
            "#", "Deposit", "Rate", "Cur", "Available", "Profit", "Pct", "Methods", "Maker",
        );
        for (i, opp) in list.iter().take(self.top_n).enumerate() {
            let record = &opp.source;
            let methods = record
                .payment_methods
                .iter()
                .map(|m| platform_display_name(m))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(
                s,
                "  {:>3}  {:<8} {:>7.4} {:<4} {:>14} {:>12} {:>6.2}%  {:<22} {} ({:.1}%, {} intents)",
                i + 1,
                record.id.as_str(),
                record.rate.round_dp(4),
                record.currency,
                fmt_usd(record.available_amount),
                fmt_usd(opp.profit_amount),
                opp.profit_pct.round_dp(2),
                methods,
                short_address(&record.maker.address),
                (record.maker.success_rate * dec!(100)).round_dp(1),
                record.maker.intent_count,
            );
        }
        if list.len() > self.top_n {
            let _ = writeln!(s, "  ... and {} more", list.len() - self.top_n);
        }
    }
}

fn render_market_rates(s: &mut String, rates: &[MarketRate]) {
    let _ = writeln!(s);
    let _ = writeln!(s, "MARKET RATES (top {MARKET_RATES_SHOWN})");
    for line in rates.iter().take(MARKET_RATES_SHOWN) {
        let rate = line
            .rate
            .map(|r| format!("{:.4}", r.round_dp(4)))
            .unwrap_or_else(|| "-".to_string());
        let liquidity = line.liquidity.map(fmt_usd).unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            s,
            "  {:<16} {:<4} {:>8} {:>16}",
            platform_display_name(&line.platform),
            line.currency,
            rate,
            liquidity,
        );
    }
}

impl ReportSink for ConsoleRenderer {
    fn emit(&mut self, report: &CycleReport) -> Result<(), MonitorError> {
        let text = self.render(report);
        self.out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush())
            .map_err(|e| MonitorError::Render(format!("console write failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
