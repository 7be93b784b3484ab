//! Scheduled and on-demand balance reports.
//!
//! A report looks like this (amounts sorted by currency code, zero balances
//! omitted, converted amounts only when a converter is configured):
//!
//! ```text
//!
//! ---- Report after tx[12] ----
//! EUR -21.50 (USD -22.79)
//! HKD 300.00 (USD ???)
//! USD 49.99
//! -----------------------------
//! ```
//!
//! Each report is written to the sink with a single write under the sink's
//! lock, so scheduled and explicit reports never interleave.

use crate::converter::CurrencyConverter;
use crate::error::Result;
use crate::ledger::PaymentProcessor;
use crate::money::Balance;
use crate::scheduler::{ScheduleConfig, Scheduler, Task};
use log::{error, info};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Line separator used in reports.
pub const NL: &str = if cfg!(windows) { "\r\n" } else { "\n" };

/// Renders the report text for a ledger snapshot.
pub fn render_report(balance: Balance, converter: Option<&CurrencyConverter>) -> String {
    let transaction_id = balance.last_transaction_id().to_string();
    let mut money = balance.into_money();
    money.sort_by(|a, b| a.currency().code().cmp(b.currency().code()));

    let mut report = String::new();
    report.push_str(NL);
    report.push_str("---- Report after tx[");
    report.push_str(&transaction_id);
    report.push_str("] ----");
    report.push_str(NL);

    for money in money.iter().filter(|m| !m.is_zero()) {
        report.push_str(&money.to_string());

        if let Some(converter) = converter {
            let target = converter.target_currency();
            if money.currency() != target {
                let converted = match converter.convert(money) {
                    Some(converted) => format!(" ({})", converted),
                    None => format!(" ({} ???)", target),
                };
                report.push_str(&converted);
            }
        }

        report.push_str(NL);
    }

    report.push_str("---------------------------");
    report.push_str(&"-".repeat(transaction_id.len()));
    report.push_str(NL);

    report
}

struct ReportGenerator {
    processor: Arc<PaymentProcessor>,
    converter: Option<Arc<CurrencyConverter>>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ReportGenerator {
    fn generate(&self) -> Result<()> {
        let report = render_report(self.processor.balance(), self.converter.as_deref());
        info!("Generating report:{}", report);

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(report.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Periodically prints balance reports of a [`PaymentProcessor`].
///
/// ```no_run
/// use payment_tracker::{PaymentProcessor, PaymentReporter, ScheduleConfig};
/// use std::sync::Arc;
///
/// let processor = Arc::new(PaymentProcessor::new());
/// let reporter =
///     PaymentReporter::new(processor, None, std::io::stdout(), ScheduleConfig::default()).unwrap();
///
/// reporter.start().unwrap();
/// reporter.generate_report().unwrap();
/// reporter.stop();
/// ```
pub struct PaymentReporter {
    generator: Arc<ReportGenerator>,
    scheduler: Scheduler,
}

impl PaymentReporter {
    /// Creates a stopped reporter writing to `out`.
    pub fn new(
        processor: Arc<PaymentProcessor>,
        converter: Option<Arc<CurrencyConverter>>,
        out: impl Write + Send + 'static,
        config: ScheduleConfig,
    ) -> Result<Self> {
        let generator = Arc::new(ReportGenerator {
            processor,
            converter,
            out: Mutex::new(Box::new(out)),
        });

        let task: Task = {
            let generator = Arc::clone(&generator);
            Arc::new(move || {
                if let Err(e) = generator.generate() {
                    error!("Scheduled report failed: {}", e);
                }
            })
        };

        Ok(PaymentReporter {
            generator,
            scheduler: Scheduler::new("PaymentReporter", config, task)?,
        })
    }

    /// Starts automatic reporting.
    pub fn start(&self) -> Result<()> {
        self.scheduler.start()?;
        info!("Automatic reporting has been started.");
        Ok(())
    }

    /// Stops automatic reporting. Does nothing if not started.
    pub fn stop(&self) {
        if self.scheduler.stop() {
            info!("Automatic reporting has been stopped.");
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Writes a report now, whether or not automatic reporting is running.
    pub fn generate_report(&self) -> Result<()> {
        self.generator.generate()
    }

    pub fn converter(&self) -> Option<&Arc<CurrencyConverter>> {
        self.generator.converter.as_ref()
    }
}
