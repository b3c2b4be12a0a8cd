//! Currency normalization into the reference currency.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::clock::Clock;

pub const DEFAULT_REFERENCE_CURRENCY: &str = "RUB";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateOrigin {
    Live,
    Fallback,
}

/// Units of reference currency per one unit of each listed currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    pub reference: String,
    pub rates: BTreeMap<String, Decimal>,
    pub as_of: String,
    pub origin: RateOrigin,
}

impl RateTable {
    pub fn new(reference: impl Into<String>, as_of: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            rates: BTreeMap::new(),
            as_of: as_of.into(),
            origin: RateOrigin::Live,
        }
    }

    pub fn with_rate(mut self, currency: impl Into<String>, rate: Decimal) -> Self {
        self.rates.insert(currency.into(), rate);
        self
    }

    /// Hard-coded pair used only when the live lookup fails.
    pub fn fallback(usd: Decimal, eur: Decimal) -> Self {
        Self {
            reference: DEFAULT_REFERENCE_CURRENCY.to_owned(),
            rates: BTreeMap::from([("USD".to_owned(), usd), ("EUR".to_owned(), eur)]),
            as_of: "N/A".to_owned(),
            origin: RateOrigin::Fallback,
        }
    }

    pub fn default_fallback() -> Self {
        Self::fallback(Decimal::new(900, 1), Decimal::new(1000, 1))
    }

    pub fn rate(&self, currency: &str) -> Option<Decimal> {
        self.rates.get(currency).copied()
    }

    pub fn to_reference(&self, amount: Decimal, currency: &str) -> Decimal {
        to_reference(amount, currency, self)
    }
}

/// Converts `amount` into the table's reference currency.
///
/// The reference currency, an empty code, and any code missing from the table
/// all pass through unchanged.
pub fn to_reference(amount: Decimal, currency: &str, rates: &RateTable) -> Decimal {
    let code = currency.trim();
    if code.is_empty() || code == rates.reference {
        return amount;
    }
    match rates.rate(code) {
        Some(rate) => amount * rate,
        None => amount,
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RateError {
    #[error("rate source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed rate payload: {0}")]
    Malformed(String),
}

pub trait RateSource: Send + Sync {
    fn current_rates(&self) -> Result<RateTable, RateError>;

    /// Forgets any cached table so the next lookup reaches the source.
    fn invalidate(&self) {}
}

/// Always answers with the same table.
#[derive(Clone, Debug)]
pub struct FixedRateSource {
    table: RateTable,
}

impl FixedRateSource {
    pub fn new(table: RateTable) -> Self {
        Self { table }
    }
}

impl Default for FixedRateSource {
    fn default() -> Self {
        Self::new(RateTable::default_fallback())
    }
}

impl RateSource for FixedRateSource {
    fn current_rates(&self) -> Result<RateTable, RateError> {
        Ok(self.table.clone())
    }
}

struct CachedTable {
    table: RateTable,
    fetched_at: DateTime<Utc>,
}

/// Caches a live table for `ttl` and degrades to `fallback` on failure.
///
/// Fallback tables are never cached, so the next call retries the source.
pub struct CachedRateSource<S, C> {
    source: S,
    clock: C,
    ttl: Duration,
    fallback: RateTable,
    cached: Mutex<Option<CachedTable>>,
}

impl<S, C> CachedRateSource<S, C>
where
    S: RateSource,
    C: Clock,
{
    pub fn new(source: S, clock: C, ttl: Duration, fallback: RateTable) -> Self {
        Self { source, clock, ttl, fallback, cached: Mutex::new(None) }
    }

    pub fn rates(&self) -> RateTable {
        let now = self.clock.now();
        let mut cached = match self.cached.lock() {
            Ok(cached) => cached,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(entry) = cached.as_ref() {
            if now - entry.fetched_at < self.ttl {
                return entry.table.clone();
            }
        }

        match self.source.current_rates() {
            Ok(table) => {
                *cached = Some(CachedTable { table: table.clone(), fetched_at: now });
                table
            }
            Err(error) => {
                warn!(
                    event_name = "rates.lookup_failed",
                    error = %error,
                    "rate lookup failed, using fallback table"
                );
                self.fallback.clone()
            }
        }
    }
}

impl<S, C> RateSource for CachedRateSource<S, C>
where
    S: RateSource,
    C: Clock,
{
    fn current_rates(&self) -> Result<RateTable, RateError> {
        Ok(self.rates())
    }

    fn invalidate(&self) {
        match self.cached.lock() {
            Ok(mut cached) => *cached = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        to_reference, CachedRateSource, RateError, RateOrigin, RateSource, RateTable,
    };
    use crate::clock::FixedClock;

    fn table() -> RateTable {
        RateTable::new("RUB", "2024-01-01")
            .with_rate("USD", Decimal::new(9250, 2))
            .with_rate("EUR", Decimal::new(10010, 2))
    }

    #[test]
    fn reference_and_unknown_currencies_pass_through() {
        let rates = table();
        let amount = Decimal::new(123_456, 2);

        assert_eq!(to_reference(amount, "RUB", &rates), amount);
        assert_eq!(to_reference(amount, "", &rates), amount);
        assert_eq!(to_reference(amount, "CNY", &rates), amount);
    }

    #[test]
    fn known_currency_is_multiplied_by_rate() {
        let rates = table();
        assert_eq!(to_reference(Decimal::new(100, 0), "USD", &rates), Decimal::new(9250, 0));
        assert_eq!(rates.to_reference(Decimal::new(2, 0), "EUR"), Decimal::new(20020, 2));
    }

    #[test]
    fn default_fallback_is_the_documented_pair() {
        let fallback = RateTable::default_fallback();
        assert_eq!(fallback.rate("USD"), Some(Decimal::new(90, 0)));
        assert_eq!(fallback.rate("EUR"), Some(Decimal::new(100, 0)));
        assert_eq!(fallback.origin, RateOrigin::Fallback);
        assert_eq!(fallback.as_of, "N/A");
    }

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl RateSource for CountingSource {
        fn current_rates(&self) -> Result<RateTable, RateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(RateError::Unavailable("offline".to_owned()))
            } else {
                Ok(table())
            }
        }
    }

    #[test]
    fn cache_serves_table_until_ttl_expires() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()));
        let cached = CachedRateSource::new(
            CountingSource { calls: calls.clone(), fail: false },
            clock.clone(),
            Duration::hours(1),
            RateTable::default_fallback(),
        );

        assert_eq!(cached.rates(), table());
        clock.advance(Duration::minutes(59));
        assert_eq!(cached.rates(), table());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::minutes(1));
        let _ = cached.rates();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cached.invalidate();
        let _ = cached.rates();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_lookup_degrades_to_fallback_without_caching_it() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = CachedRateSource::new(
            CountingSource { calls: calls.clone(), fail: true },
            FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()),
            Duration::hours(1),
            RateTable::default_fallback(),
        );

        let first = cached.current_rates().expect("cached source never fails");
        assert_eq!(first.origin, RateOrigin::Fallback);
        let _ = cached.rates();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
