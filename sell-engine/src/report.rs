//! Status line formatting.
//!
//! Every batch operation renders one [`StatusLine`] per entity: a title, a
//! short message (optionally with continuation lines) and a boolean state.

use std::fmt;

use crate::balance::{Balance, ExchangeRate, WalletStatus, to_display_currency};
use crate::earnings::EarningsRecord;
use crate::lifecycle::InfrastructureStatus;
use crate::provisioner::{DependencyUnit, InstallStep};
use crate::publication::PublishOutcome;
use crate::services::{Outcome, title_case};

const WIDTH: usize = 35;

/// One rendered entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub title: String,
    pub message: Vec<String>,
    /// `None` for purely informational lines.
    pub state: Option<bool>,
}

impl StatusLine {
    pub fn new(title: impl Into<String>, message: impl Into<String>, state: bool) -> Self {
        Self {
            title: title.into(),
            message: vec![message.into()],
            state: Some(state),
        }
    }

    /// A line without a state marker.
    pub fn info(title: impl Into<String>, message: Vec<String>) -> Self {
        Self {
            title: title.into(),
            message,
            state: None,
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.message.first().map_or("", String::as_str);
        write!(f, "  {:<WIDTH$} ->  {:<WIDTH$}", self.title, first)?;
        match self.state {
            Some(true) => write!(f, " [ok]")?,
            Some(false) => write!(f, " [failed]")?,
            None => {}
        }
        for line in self.message.iter().skip(1) {
            write!(f, "\n{:indent$}{line}", "", indent = WIDTH + 6)?;
        }
        Ok(())
    }
}

pub fn outcome_lines(outcomes: &[Outcome]) -> Vec<StatusLine> {
    outcomes
        .iter()
        .map(|o| StatusLine::new(title_case(&o.service), o.message.clone(), o.succeeded))
        .collect()
}

pub fn publish_lines(outcomes: &[PublishOutcome]) -> Vec<StatusLine> {
    outcomes
        .iter()
        .map(|o| StatusLine::new(title_case(&o.service), o.message(), o.succeeded()))
        .collect()
}

/// A single summary line when everything is installed, otherwise one line per package.
pub fn dependency_lines(dependencies: &[DependencyUnit]) -> Vec<StatusLine> {
    if dependencies.iter().all(|d| d.installed) {
        return vec![StatusLine::new("Dependencies", "Installed", true)];
    }
    dependencies
        .iter()
        .map(|d| StatusLine::new(title_case(&d.name), installed_text(d.installed), d.installed))
        .collect()
}

pub fn install_step_lines(steps: &[InstallStep]) -> Vec<StatusLine> {
    steps
        .iter()
        .map(|s| StatusLine::new(title_case(&s.label), s.message.clone(), s.succeeded))
        .collect()
}

pub fn infrastructure_lines(status: &InfrastructureStatus) -> Vec<StatusLine> {
    let running = |up: bool| if up { "Running" } else { "Not running" };
    vec![
        StatusLine::new("Container runtime", running(status.runtime_up), status.runtime_up),
        match &status.market_address {
            Some(address) => StatusLine::new("Marketplace network", address.clone(), true),
            None => StatusLine::new("Marketplace network", "Not connected", false),
        },
        StatusLine::new("Router", running(status.router), status.router),
        StatusLine::new("Payments server", running(status.payments), status.payments),
    ]
}

fn installed_text(installed: bool) -> &'static str {
    if installed { "Installed" } else { "Not installed" }
}

/// `$0.1234`, or nothing when no rate is known.
fn usd(amount: u64, rate: Option<ExchangeRate>) -> Option<String> {
    rate.map(|rate| format!("${:.4}", to_display_currency(amount, rate)))
}

/// One breakdown line, e.g. `- Buffer        1500 ($0.0150)`.
#[must_use]
pub fn build_detail_line(kind: &str, amount: u64, rate: Option<ExchangeRate>) -> String {
    let label = format!("{} ", title_case(kind));
    let mut line = format!("- {label:<9}{amount:>9}");
    if let Some(usd) = usd(amount, rate) {
        line.push_str(&format!("{:>10}", format!("({usd})")));
    }
    line
}

/// Status of a started or stopped service, with its accumulated earnings.
pub fn service_status_line(
    service: &Outcome,
    earnings: Option<&EarningsRecord>,
    rate: Option<ExchangeRate>,
) -> StatusLine {
    let mut message = vec![service.message.clone()];
    if let Some(record) = earnings {
        message.push("[Totals]".to_string());
        message.push(format!("Requests:   {}", record.request_count));
        message.push(earnings_total(record, rate));
    }
    StatusLine {
        title: title_case(&service.service),
        message,
        state: Some(service.succeeded),
    }
}

/// Earnings of one service, summarised or broken down by pool.
pub fn earnings_line(
    service: &str,
    record: &EarningsRecord,
    rate: Option<ExchangeRate>,
    detail: bool,
) -> StatusLine {
    let mut message = vec![format!("Requests: {}", record.request_count)];
    if detail {
        message.push(build_detail_line("buffer", record.buffer_earnings, rate));
        message.push(build_detail_line("onchain", record.wallet_earnings, rate));
        message.push(build_detail_line("channels", record.channel_earnings, rate));
    } else {
        message.push(earnings_total(record, rate));
    }
    StatusLine::info(title_case(service), message)
}

/// Total earnings in the display currency, or in native units without a rate.
fn earnings_total(record: &EarningsRecord, rate: Option<ExchangeRate>) -> String {
    match usd(record.total_earnings(), rate) {
        Some(usd) => format!("Earnings: {usd}"),
        None => format!("Earnings: {} sat", record.total_earnings()),
    }
}

/// Three-way balance breakdown, followed by a note when the wallet half
/// could not be read.
pub fn balance_line(title: &str, balance: &Balance, rate: Option<ExchangeRate>) -> StatusLine {
    let mut message = vec![
        build_detail_line("buffer", balance.buffer, rate),
        build_detail_line("onchain", balance.onchain, rate),
        build_detail_line("channels", balance.channels, rate),
    ];
    match &balance.wallet {
        WalletStatus::Live => {}
        WalletStatus::NotConfigured => message.push("Wallet: not configured".to_string()),
        WalletStatus::Unavailable(reason) => message.push(format!("Wallet unavailable: {reason}")),
    }
    StatusLine::info(title, message)
}

/// Usage hint for services that have one.
#[must_use]
pub fn example_usage(service: &str, host: &str, port: u16) -> Option<String> {
    service
        .eq_ignore_ascii_case("ping")
        .then(|| format!("sell buy '{host}:{port}/ping/?uri=21.co'"))
}
