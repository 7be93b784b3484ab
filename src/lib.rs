//! # Payment Tracker
//!
//! An in-memory, multi-currency payment ledger with periodic balance reports
//! and optional conversion into a single reporting currency.
//!
//! ## Design Principles
//!
//! - **Exact decimals**: amounts are `rust_decimal` values with a fixed scale
//!   per parser, never binary floating point
//! - **Dense transaction ids**: each accepted payment gets the next id, and a
//!   balance snapshot always matches its transaction id
//! - **Atomic rate tables**: conversions see either the old or the new table
//! - **Clock-aligned reports**: the first scheduled report can be aligned to
//!   a whole second, minute or hour
//!
//! ## Example
//!
//! ```no_run
//! use payment_tracker::{CurrencyRegistry, MoneyParser, PaymentProcessor};
//! use std::sync::Arc;
//!
//! let parser = MoneyParser::new(Arc::new(CurrencyRegistry::new()), 2).unwrap();
//! let processor = PaymentProcessor::new();
//!
//! let id = processor.register_payment(parser.parse_line("USD 100").unwrap()).unwrap();
//! assert_eq!(id, 1);
//! println!("{:?}", processor.balance());
//! ```

pub mod controller;
pub mod converter;
pub mod currency;
pub mod error;
pub mod ledger;
pub mod money;
pub mod money_file;
pub mod parser;
pub mod reporter;
pub mod scheduler;

pub use controller::{Controller, Flow, StopHandle};
pub use converter::{CurrencyConverter, RateTable};
pub use currency::{Currency, CurrencyRegistry, InvalidCurrencyCode};
pub use error::{Error, ParseError, ParseErrorKind, Result};
pub use ledger::PaymentProcessor;
pub use money::{Balance, Money};
pub use money_file::{MoneyFile, MoneyRecords};
pub use parser::{canonicalize, MoneyParser, MAX_DECIMAL_PLACES};
pub use reporter::{render_report, PaymentReporter};
pub use scheduler::{sync_start_time, ScheduleConfig, Scheduler, SyncFlags};
