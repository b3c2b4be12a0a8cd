//! Central Bank of Russia daily rates.
//!
//! The feed lists `Valute.<CODE>.Value` roubles per `Nominal` units of each
//! currency; the table stores the per-unit rate.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::info;

use freightq_core::rates::{RateError, RateSource, RateTable};

#[derive(Clone, Debug)]
pub struct CbrRateSource {
    url: String,
    timeout: Duration,
    reference: String,
}

impl CbrRateSource {
    pub fn new(url: impl Into<String>, timeout: Duration, reference: impl Into<String>) -> Self {
        Self { url: url.into(), timeout, reference: reference.into() }
    }

    async fn fetch(&self) -> Result<Value, RateError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|error| RateError::Unavailable(format!("http client: {error}")))?;
        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|error| RateError::Unavailable(format!("rate request failed: {error}")))?;

        if !response.status().is_success() {
            return Err(RateError::Unavailable(format!(
                "rate endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|error| RateError::Malformed(format!("failed to decode rate payload: {error}")))
    }
}

fn decimal_of(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => Decimal::from_str(&number.to_string())
            .or_else(|_| Decimal::from_scientific(&number.to_string()))
            .ok(),
        Value::String(text) => Decimal::from_str(text.trim()).ok(),
        _ => None,
    }
}

/// Builds a live table from the daily JSON document.
pub fn parse_daily(payload: &Value, reference: &str) -> Result<RateTable, RateError> {
    let as_of = payload
        .get("Date")
        .and_then(Value::as_str)
        .map(|date| date.chars().take(10).collect::<String>())
        .ok_or_else(|| RateError::Malformed("missing `Date`".to_owned()))?;
    let valutes = payload
        .get("Valute")
        .and_then(Value::as_object)
        .ok_or_else(|| RateError::Malformed("missing `Valute`".to_owned()))?;

    let mut table = RateTable::new(reference, as_of);
    for (code, entry) in valutes {
        let value = entry.get("Value").and_then(decimal_of);
        let nominal = entry.get("Nominal").and_then(decimal_of).unwrap_or(Decimal::ONE);
        match value {
            Some(value) if !nominal.is_zero() => {
                table.rates.insert(code.clone(), value / nominal);
            }
            _ => return Err(RateError::Malformed(format!("bad entry for `{code}`"))),
        }
    }
    Ok(table)
}

impl RateSource for CbrRateSource {
    fn current_rates(&self) -> Result<RateTable, RateError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| RateError::Unavailable(format!("async runtime: {error}")))?;
        let payload = runtime.block_on(self.fetch())?;
        let table = parse_daily(&payload, &self.reference)?;
        info!(
            event_name = "rates.fetched",
            as_of = %table.as_of,
            currencies = table.rates.len(),
            "live rates fetched"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use freightq_core::rates::{RateError, RateOrigin};

    use super::parse_daily;

    #[test]
    fn daily_document_yields_per_unit_rates() {
        let payload = json!({
            "Date": "2024-01-10T11:30:00+03:00",
            "Valute": {
                "USD": {"Nominal": 1, "Value": 89.6871},
                "EUR": {"Nominal": 1, "Value": 98.2236},
                "JPY": {"Nominal": 100, "Value": 61.9}
            }
        });

        let table = parse_daily(&payload, "RUB").expect("parsed");
        assert_eq!(table.as_of, "2024-01-10");
        assert_eq!(table.origin, RateOrigin::Live);
        assert_eq!(table.rate("USD"), Some(Decimal::new(896871, 4)));
        assert_eq!(table.rate("JPY"), Some(Decimal::new(619, 3)));
    }

    #[test]
    fn document_without_valute_is_malformed() {
        let error = parse_daily(&json!({"Date": "2024-01-10"}), "RUB").expect_err("malformed");
        assert!(matches!(error, RateError::Malformed(_)));
    }
}
