//! Conversion of money into a single reporting currency.
//!
//! The rate table is an immutable snapshot behind a lock. Replacing it swaps
//! the whole table at once, so a report in progress never sees a table that
//! is half old and half new.

use crate::currency::{Currency, CurrencyRegistry};
use crate::error::{Error, Result};
use crate::money::Money;
use crate::money_file::MoneyRecords;
use crate::parser::{MoneyParser, MAX_DECIMAL_PLACES};
use log::{debug, info, warn};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Multiplier from each source currency to the target currency.
pub type RateTable = HashMap<Currency, Decimal>;

/// Converts money to one fixed target currency.
#[derive(Debug)]
pub struct CurrencyConverter {
    target_currency: Currency,
    decimal_places: u32,
    rates: RwLock<Arc<RateTable>>,
}

impl CurrencyConverter {
    /// Creates a converter with an empty rate table.
    ///
    /// Converted amounts are rounded half-to-even to `decimal_places`.
    pub fn new(target_currency: Currency, decimal_places: u32) -> Result<Self> {
        if decimal_places > MAX_DECIMAL_PLACES {
            return Err(Error::InvalidArgument(format!(
                "conversion decimal places {} exceed maximum {}",
                decimal_places, MAX_DECIMAL_PLACES
            )));
        }

        Ok(CurrencyConverter {
            target_currency,
            decimal_places,
            rates: RwLock::new(Arc::new(RateTable::new())),
        })
    }

    pub fn target_currency(&self) -> &Currency {
        &self.target_currency
    }

    pub fn decimal_places(&self) -> u32 {
        self.decimal_places
    }

    /// The current rate table. Later replacements do not affect it.
    pub fn rates(&self) -> Arc<RateTable> {
        Arc::clone(&self.rates.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the whole rate table at once.
    pub fn set_rates(&self, rates: RateTable) {
        let count = rates.len();
        *self.rates.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(rates);
        info!("Rate table replaced ({} rates).", count);
    }

    /// Converts `money` to the target currency.
    ///
    /// Money already in the target currency is returned as is. Returns `None`
    /// when no rate is known for the source currency.
    pub fn convert(&self, money: &Money) -> Option<Money> {
        if money.currency() == &self.target_currency {
            return Some(money.clone());
        }

        let rates = self.rates();
        let rate = rates.get(money.currency())?;

        let product = match money.amount().checked_mul(*rate) {
            Some(product) => product,
            None => {
                warn!("Conversion of {} overflows, rate {}", money, rate);
                return None;
            }
        };

        let mut converted = product
            .round_dp_with_strategy(self.decimal_places, RoundingStrategy::MidpointNearestEven);
        converted.rescale(self.decimal_places);

        Some(Money::new(self.target_currency.clone(), converted))
    }

    /// Loads a complete rate table from `<CUR> <rate>` lines and installs it.
    ///
    /// Rates are read at the maximum decimal precision. `registry` must be
    /// the one shared with the payment parser and the target currency. An
    /// entry for the target currency itself is skipped. On any error the current table is
    /// left untouched. Returns the number of installed rates.
    pub fn load_rates<R: Read>(&self, reader: R, registry: &Arc<CurrencyRegistry>) -> Result<usize> {
        let parser = MoneyParser::new(Arc::clone(registry), MAX_DECIMAL_PLACES)?;
        let entries = MoneyRecords::new(reader, parser).collect::<Result<Vec<Money>>>()?;

        let mut rates = RateTable::new();
        for rate in entries {
            if rate.currency() == &self.target_currency {
                warn!("Skipping target currency rate {}", rate);
                continue;
            }
            if let Some(previous) = rates.insert(rate.currency().clone(), rate.amount()) {
                debug!("Rate for {} overrides {}", rate, previous);
            }
        }

        let count = rates.len();
        self.set_rates(rates);
        Ok(count)
    }

    /// Loads the rate table from a file. See [`CurrencyConverter::load_rates`].
    pub fn load_file(&self, path: impl AsRef<Path>, registry: &Arc<CurrencyRegistry>) -> Result<usize> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let count = self.load_rates(file, registry)?;
        info!("Loaded {} rates from file '{}'", count, path.display());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::str::FromStr;
    use std::thread;

    const RATES: &str = "EUR 1.0593\nCHF 0.9941\nJPY 0.0083\nUSD 1\n";

    struct Fixture {
        registry: Arc<CurrencyRegistry>,
        converter: CurrencyConverter,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Arc::new(CurrencyRegistry::new());
            let usd = registry.currency("USD").unwrap();
            let converter = CurrencyConverter::new(usd, 2).unwrap();
            Fixture {
                registry,
                converter,
            }
        }

        fn with_rates(rates: &str) -> Self {
            let fixture = Fixture::new();
            fixture
                .converter
                .load_rates(Cursor::new(rates.to_string()), &fixture.registry)
                .unwrap();
            fixture
        }

        fn money(&self, code: &str, amount: &str) -> Money {
            Money::new(
                self.registry.currency(code).unwrap(),
                Decimal::from_str(amount).unwrap(),
            )
        }

        fn convert(&self, code: &str, amount: &str) -> Option<String> {
            self.converter
                .convert(&self.money(code, amount))
                .map(|m| m.to_string())
        }
    }

    #[test]
    fn test_identity_for_target_currency() {
        let fixture = Fixture::new();
        let usd = fixture.money("USD", "12.345");

        assert_eq!(fixture.converter.convert(&usd), Some(usd));
    }

    #[test]
    fn test_no_rate_is_none() {
        let fixture = Fixture::new();
        assert_eq!(fixture.convert("EUR", "1"), None);
    }

    #[test]
    fn test_rounds_half_even() {
        let fixture = Fixture::with_rates(RATES);

        assert_eq!(fixture.convert("EUR", "1").as_deref(), Some("USD 1.06"));
        assert_eq!(fixture.convert("EUR", "100").as_deref(), Some("USD 105.93"));
        assert_eq!(fixture.convert("CHF", "10").as_deref(), Some("USD 9.94"));
        assert_eq!(fixture.convert("JPY", "10").as_deref(), Some("USD 0.08"));
    }

    #[test]
    fn test_simple_rate() {
        let fixture = Fixture::with_rates("EUR 1.06\n");
        assert_eq!(fixture.convert("EUR", "1").as_deref(), Some("USD 1.06"));
    }

    #[test]
    fn test_midpoint_goes_to_even() {
        let fixture = Fixture::with_rates("EUR 0.5\nGBP 1.5\n");

        // 0.125 and 0.135 are exact midpoints at 2 places
        assert_eq!(fixture.convert("EUR", "0.25").as_deref(), Some("USD 0.12"));
        assert_eq!(fixture.convert("EUR", "0.27").as_deref(), Some("USD 0.14"));
        assert_eq!(fixture.convert("GBP", "-0.01").as_deref(), Some("USD -0.02"));
    }

    #[test]
    fn test_result_has_fixed_scale() {
        let fixture = Fixture::new();
        let eur = fixture.registry.currency("EUR").unwrap();
        fixture
            .converter
            .set_rates(RateTable::from([(eur, Decimal::from(2))]));

        assert_eq!(fixture.convert("EUR", "3").as_deref(), Some("USD 6.00"));
    }

    #[test]
    fn test_load_skips_target_currency() {
        let fixture = Fixture::new();
        let count = fixture
            .converter
            .load_rates(Cursor::new(RATES), &fixture.registry)
            .unwrap();

        assert_eq!(count, 3);
        let usd = fixture.registry.currency("USD").unwrap();
        assert!(!fixture.converter.rates().contains_key(&usd));
    }

    #[test]
    fn test_failed_load_keeps_previous_table() {
        let fixture = Fixture::with_rates("EUR 1.06\n");

        let result = fixture
            .converter
            .load_rates(Cursor::new("CHF 0.99\nbad line here\n"), &fixture.registry);

        assert!(result.is_err());
        assert_eq!(fixture.convert("EUR", "1").as_deref(), Some("USD 1.06"));
        assert_eq!(fixture.convert("CHF", "1"), None);
    }

    #[test]
    fn test_rates_beyond_max_precision_rejected() {
        let fixture = Fixture::new();
        let result = fixture
            .converter
            .load_rates(Cursor::new("EUR 1.12345678901\n"), &fixture.registry);
        assert!(result.is_err());
    }

    #[test]
    fn test_obtained_table_survives_replacement() {
        let fixture = Fixture::with_rates("EUR 1.06\n");
        let old = fixture.converter.rates();

        fixture.converter.set_rates(RateTable::new());

        assert_eq!(old.len(), 1);
        assert!(fixture.converter.rates().is_empty());
    }

    #[test]
    fn test_concurrent_readers_see_whole_tables() {
        let fixture = Arc::new(Fixture::new());
        let eur = fixture.registry.currency("EUR").unwrap();
        let gbp = fixture.registry.currency("GBP").unwrap();

        let writer = {
            let fixture = Arc::clone(&fixture);
            thread::spawn(move || {
                for i in 1..200 {
                    let rate = Decimal::from(i);
                    fixture
                        .converter
                        .set_rates(RateTable::from([(eur.clone(), rate), (gbp.clone(), rate)]));
                }
            })
        };

        for _ in 0..200 {
            let table = fixture.converter.rates();
            let values: Vec<&Decimal> = table.values().collect();
            assert!(values.windows(2).all(|w| w[0] == w[1]));
        }

        writer.join().unwrap();
    }

    #[test]
    fn test_conversion_places_range() {
        let registry = CurrencyRegistry::new();
        let usd = registry.currency("USD").unwrap();
        assert!(CurrencyConverter::new(usd, 11).is_err());
    }
}
