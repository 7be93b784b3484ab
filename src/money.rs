//! Money values and ledger snapshots.

use crate::currency::Currency;
use crate::error::{Error, Result};
use rust_decimal::Decimal;
use std::fmt;

/// An immutable amount of a single currency.
///
/// The amount keeps the scale it was created with, so `10.00` displays as
/// `10.00` and not `10`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Money {
    currency: Currency,
    amount: Decimal,
}

impl Money {
    pub fn new(currency: Currency, amount: Decimal) -> Self {
        Money { currency, amount }
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Adds two amounts of the same currency.
    ///
    /// Fails with [`Error::CurrencyMismatch`] if the currencies differ and
    /// with [`Error::Overflow`] if the sum does not fit.
    pub fn add(&self, other: &Money) -> Result<Money> {
        if self.currency != other.currency {
            return Err(Error::CurrencyMismatch {
                expected: self.currency.to_string(),
                found: other.currency.to_string(),
            });
        }

        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(Error::Overflow("money sum"))?;

        Ok(Money::new(self.currency.clone(), amount))
    }

    /// Returns `true` for any zero amount, regardless of scale (`0`, `0.00`).
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.currency, self.amount)
    }
}

/// Point-in-time copy of the ledger.
///
/// Holds one entry per currency ever registered, zero balances included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    last_transaction_id: u64,
    money: Vec<Money>,
}

impl Balance {
    pub fn new(last_transaction_id: u64, money: Vec<Money>) -> Self {
        Balance {
            last_transaction_id,
            money,
        }
    }

    /// The id of the last transaction included in this snapshot.
    pub fn last_transaction_id(&self) -> u64 {
        self.last_transaction_id
    }

    pub fn money(&self) -> &[Money] {
        &self.money
    }

    pub fn into_money(self) -> Vec<Money> {
        self.money
    }
}
