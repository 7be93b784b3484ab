//! Payment Tracker CLI
//!
//! Reads payments interactively from stdin and prints balance reports to
//! stdout at a fixed period.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --period 30 --sync minute --rates rates.txt payments.txt
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `info` to control logging verbosity

use clap::{Parser, ValueEnum};
use payment_tracker::{
    Controller, CurrencyConverter, CurrencyRegistry, MoneyParser, PaymentProcessor,
    PaymentReporter, Result, ScheduleConfig, SyncFlags,
};
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

/// Clock boundary the first scheduled report is aligned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SyncMode {
    None,
    Second,
    Minute,
    Hour,
}

impl From<SyncMode> for SyncFlags {
    fn from(mode: SyncMode) -> Self {
        match mode {
            SyncMode::None => SyncFlags::NONE,
            SyncMode::Second => SyncFlags::to_second(),
            SyncMode::Minute => SyncFlags::to_minute(),
            SyncMode::Hour => SyncFlags::to_hour(),
        }
    }
}

/// Multi-currency payment tracker with periodic balance reports
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Decimal places of payment amounts (0-10)
    #[arg(short, long, default_value_t = 2)]
    decimal_places: u32,

    /// Reporting period in seconds
    #[arg(short, long, default_value_t = 60)]
    period: u64,

    /// Align the first report to the next whole second, minute or hour
    #[arg(long, value_enum, default_value_t = SyncMode::None)]
    sync: SyncMode,

    /// Transaction id the ledger starts counting from
    #[arg(long, default_value_t = 0)]
    first_tx_id: u64,

    /// Exchange rate file, one `<CUR> <rate>` per line
    #[arg(long)]
    rates: Option<PathBuf>,

    /// Currency converted amounts are reported in
    #[arg(long, default_value = "USD")]
    target_currency: String,

    /// Decimal places of converted amounts
    #[arg(long, default_value_t = 2)]
    conversion_places: u32,

    /// Base directory for relative payment file names
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Payment files loaded before the prompt starts
    files: Vec<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let registry = Arc::new(CurrencyRegistry::new());
    let parser = MoneyParser::new(Arc::clone(&registry), args.decimal_places)?;
    let processor = Arc::new(PaymentProcessor::with_last_transaction_id(args.first_tx_id));

    let converter = match &args.rates {
        Some(path) => {
            let target = registry.currency(&args.target_currency)?;
            let converter = CurrencyConverter::new(target, args.conversion_places)?;
            converter.load_file(path, &registry)?;
            Some(Arc::new(converter))
        }
        None => None,
    };

    let config = ScheduleConfig {
        period: Duration::from_secs(args.period),
        sync: args.sync.into(),
    };
    let reporter = PaymentReporter::new(Arc::clone(&processor), converter, io::stdout(), config)?;

    let mut controller = Controller::new(parser, processor, reporter, io::stdout());
    if let Some(directory) = args.directory {
        controller = controller.with_directory(directory);
    }

    for file in &args.files {
        controller.load_file(file)?;
    }

    controller.run(BufReader::new(io::stdin()))
}
