//! Batch input of `<CUR> <amount>` lines.
//!
//! Records are separated by newlines and fields by one or more spaces.
//! Blank lines are skipped and lines starting with `#` are comments. Each
//! record is parsed by a [`MoneyParser`]; failures carry the 1-based line
//! number of the offending record.

use crate::error::{ParseError, ParseErrorKind, Result};
use crate::ledger::PaymentProcessor;
use crate::money::Money;
use crate::parser::MoneyParser;
use csv::StringRecord;
use log::{info, warn};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read};
use std::iter::Enumerate;
use std::path::{Path, PathBuf};

/// Raw record as read from the input, before money parsing.
#[derive(Debug, Deserialize)]
struct MoneyRecord {
    currency: String,
    amount: String,
}

impl MoneyRecord {
    fn parse(&self, parser: &MoneyParser) -> std::result::Result<Money, ParseError> {
        parser.parse(&self.currency, &self.amount)
    }
}

/// Incremental reader yielding one parsed [`Money`] per record.
///
/// A bad record yields an error and iteration may continue with the next one.
pub struct MoneyRecords<R> {
    lines: Enumerate<Lines<BufReader<R>>>,
    parser: MoneyParser,
}

impl<R: Read> MoneyRecords<R> {
    pub fn new(reader: R, parser: MoneyParser) -> Self {
        MoneyRecords {
            lines: BufReader::new(reader).lines().enumerate(),
            parser,
        }
    }

    /// Consumes the input and returns the record count, stopping at the
    /// first invalid record.
    pub fn validate(self) -> Result<usize> {
        self.into_iter().try_fold(0, |count, money| money.map(|_| count + 1))
    }

    fn parse_record(&self, text: &str, line: usize) -> Result<Money> {
        let fields: StringRecord = text.split(' ').filter(|f| !f.is_empty()).collect();
        let invalid_format = || ParseError::new(ParseErrorKind::InvalidLineFormat).at_line(line);

        if fields.len() != 2 {
            return Err(invalid_format().into());
        }

        let raw: MoneyRecord = fields.deserialize(None).map_err(|_| invalid_format())?;
        Ok(raw.parse(&self.parser).map_err(|e| e.at_line(line))?)
    }
}

impl<R: Read> Iterator for MoneyRecords<R> {
    type Item = Result<Money>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, line) = self.lines.next()?;
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };

            let text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            return Some(self.parse_record(text, index + 1));
        }
    }
}

/// A payment file on disk.
///
/// Only remembers the path; the file is opened by each operation.
#[derive(Debug, Clone)]
pub struct MoneyFile {
    parser: MoneyParser,
    path: PathBuf,
}

impl MoneyFile {
    pub fn new(parser: MoneyParser, path: impl Into<PathBuf>) -> Self {
        MoneyFile {
            parser,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file for incremental reading.
    pub fn fetch(&self) -> Result<MoneyRecords<File>> {
        let file = File::open(&self.path)?;
        info!("File '{}' has been opened.", self.path.display());
        Ok(MoneyRecords::new(file, self.parser.clone()))
    }

    /// Checks that every record parses, without any side effects.
    pub fn validate(&self) -> Result<usize> {
        self.read_all().map(|payments| payments.len())
    }

    /// Reads and validates the whole file once, then registers every
    /// payment in order.
    ///
    /// Nothing is registered when validation fails.
    pub fn load_into(&self, processor: &PaymentProcessor) -> Result<usize> {
        let payments = self.read_all()?;

        for money in &payments {
            processor.register_payment(money.clone())?;
        }

        info!(
            "Loaded {} payments from file '{}'",
            payments.len(),
            self.path.display()
        );
        Ok(payments.len())
    }

    fn read_all(&self) -> Result<Vec<Money>> {
        match self.fetch()?.collect::<Result<Vec<Money>>>() {
            Ok(payments) => {
                info!(
                    "Successfully validated {} records in file '{}'",
                    payments.len(),
                    self.path.display()
                );
                Ok(payments)
            }
            Err(e) => {
                warn!(
                    "Validation error detected in file '{}': {}",
                    self.path.display(),
                    e
                );
                Err(e)
            }
        }
    }
}
