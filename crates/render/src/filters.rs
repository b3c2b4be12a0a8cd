use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use tera::Tera;

/// Register custom Tera filters used by contract templates.
///
/// - `format`: printf-style precision, e.g. `"%.2f" | format(value=sea_freight_cost)`
/// - `money`:  two decimal places, e.g. `othc_cost | money`
pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("format", tera_format_filter);
    tera.register_filter("money", tera_money_filter);
}

/// Context values arrive as strings; numbers are accepted too.
fn as_decimal(value: &tera::Value) -> Decimal {
    match value {
        tera::Value::String(text) => Decimal::from_str(text.trim()).unwrap_or(Decimal::ZERO),
        tera::Value::Number(number) => {
            Decimal::from_str(&number.to_string()).unwrap_or(Decimal::ZERO)
        }
        _ => Decimal::ZERO,
    }
}

fn with_precision(amount: Decimal, precision: u32) -> String {
    let rounded = amount.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", precision as usize, rounded)
}

fn tera_format_filter(
    value: &tera::Value,
    args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let format_str = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("format filter expects a string input"))?;

    let amount = args
        .get("value")
        .map(as_decimal)
        .ok_or_else(|| tera::Error::msg("format filter requires a 'value' argument"))?;

    let precision = format_str
        .strip_prefix("%.")
        .and_then(|rest| rest.strip_suffix('f'))
        .map(|digits| digits.parse::<u32>().unwrap_or(2));

    let result = match precision {
        Some(precision) => with_precision(amount, precision),
        None => amount.normalize().to_string(),
    };
    Ok(tera::Value::String(result))
}

fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    Ok(tera::Value::String(with_precision(as_decimal(value), 2)))
}
