//! Interned currency handles.
//!
//! Any 3-letter uppercase code is a valid currency, so currencies are not a
//! closed enum. Instead a [`CurrencyRegistry`] hands out exactly one
//! [`Currency`] handle per code, and handles compare by identity.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// The code is not exactly three uppercase ASCII letters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid currency code '{0}'")]
pub struct InvalidCurrencyCode(pub String);

/// A handle to an interned currency code.
///
/// Two handles are equal only if they were issued by the same registry for
/// the same code. Cloning is cheap (reference count bump).
#[derive(Clone)]
pub struct Currency(Arc<str>);

impl Currency {
    /// The 3-letter currency code.
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Currency {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Currency {}

impl Hash for Currency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).cast::<u8>().hash(state);
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", &self.0)
    }
}

/// Process-wide table of interned currencies.
///
/// Owned by whoever builds the parser and shared via `Arc`; handles live as
/// long as any clone of them does. An application creates exactly one
/// registry and passes it to every parser, converter and rate loader:
/// handles from different registries never compare equal, even for the same
/// code, so mixing them makes ledger lookups and conversions miss.
#[derive(Debug, Default)]
pub struct CurrencyRegistry {
    currencies: Mutex<HashMap<String, Currency>>,
}

impl CurrencyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        CurrencyRegistry::default()
    }

    /// Returns the handle for `code`, creating it on first request.
    pub fn currency(&self, code: &str) -> Result<Currency, InvalidCurrencyCode> {
        let mut currencies = self
            .currencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(currency) = currencies.get(code) {
            return Ok(currency.clone());
        }

        if !is_valid_code(code) {
            return Err(InvalidCurrencyCode(code.to_string()));
        }

        let currency = Currency(Arc::from(code));
        currencies.insert(code.to_string(), currency.clone());
        Ok(currency)
    }
}

fn is_valid_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}
