//! Error types for the payment tracker.

use crate::currency::InvalidCurrencyCode;
use thiserror::Error;

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while tracking and reporting payments.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open or read an input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Low-level error while reading a payment or rate file
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed payment or rate text
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Currency code rejected by the registry
    #[error(transparent)]
    Currency(#[from] InvalidCurrencyCode),

    /// Two amounts in different currencies were combined
    #[error("Currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: String, found: String },

    /// Decimal arithmetic or transaction counter overflow
    #[error("Arithmetic overflow: {0}")]
    Overflow(&'static str),

    /// A configuration value is out of its allowed range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not allowed in the current state
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),
}

/// What went wrong while parsing money text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("Invalid currency code '{0}'")]
    InvalidCurrency(String),

    #[error("Invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("Too many decimal points: {0}")]
    TooManyDecimalPoints(String),

    #[error("Invalid line format")]
    InvalidLineFormat,
}

/// A recoverable failure to parse money text.
///
/// Carries the 1-based line number when the text came from a file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}{}", line_suffix(.line))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: Option<usize>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind) -> Self {
        ParseError { kind, line: None }
    }

    /// Attaches a source line number.
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl From<ParseErrorKind> for ParseError {
    fn from(kind: ParseErrorKind) -> Self {
        ParseError::new(kind)
    }
}

fn line_suffix(line: &Option<usize>) -> String {
    match line {
        Some(n) => format!(" at line {}", n),
        None => String::new(),
    }
}
