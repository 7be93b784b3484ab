//! Thread-safe in-memory payment ledger.
//!
//! Accumulates a running balance per currency and issues monotonically
//! increasing transaction ids. The balance map and the id counter live
//! behind one lock, so a snapshot never sees an id without its balance
//! change or the other way around.

use crate::currency::Currency;
use crate::error::{Error, Result};
use crate::money::{Balance, Money};
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The in-memory payment processor.
///
/// Shared between the command loop and the reporter via `Arc`.
#[derive(Debug, Default)]
pub struct PaymentProcessor {
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Running balance per currency, zero balances kept.
    balances: HashMap<Currency, Money>,

    last_transaction_id: u64,
}

impl PaymentProcessor {
    /// Creates an empty ledger whose first transaction id will be 1.
    pub fn new() -> Self {
        PaymentProcessor::default()
    }

    /// Creates an empty ledger continuing after `last_transaction_id`.
    pub fn with_last_transaction_id(last_transaction_id: u64) -> Self {
        PaymentProcessor {
            state: Mutex::new(LedgerState {
                balances: HashMap::new(),
                last_transaction_id,
            }),
        }
    }

    /// Registers a single payment and returns its transaction id.
    ///
    /// Either both the balance and the id counter are updated or neither is.
    pub fn register_payment(&self, payment: Money) -> Result<u64> {
        let mut state = self.lock();

        let balance = match state.balances.get(payment.currency()) {
            Some(balance) => balance.add(&payment)?,
            None => payment,
        };
        let transaction_id = state
            .last_transaction_id
            .checked_add(1)
            .ok_or(Error::Overflow("transaction id"))?;

        debug!("tx[{}]: balance now {}", transaction_id, balance);

        state.balances.insert(balance.currency().clone(), balance);
        state.last_transaction_id = transaction_id;

        Ok(transaction_id)
    }

    /// Returns a consistent copy of the current ledger state.
    ///
    /// The order of entries is unspecified.
    pub fn balance(&self) -> Balance {
        let state = self.lock();
        Balance::new(
            state.last_transaction_id,
            state.balances.values().cloned().collect(),
        )
    }

    pub fn last_transaction_id(&self) -> u64 {
        self.lock().last_transaction_id
    }

    // No critical section can leave the state half-written, so a poisoned
    // lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
