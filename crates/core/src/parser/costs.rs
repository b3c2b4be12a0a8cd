use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::domain::catalog::{CostItem, CostLine};

pub const COST_SECTION_HEADER: &str = "Расчет стоимости";
pub const COST_SECTION_TERMINATORS: [&str; 2] = ["Условия оплаты", "Примечания"];

/// Result of walking one cost section.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CostExtraction {
    pub lines: Vec<CostLine>,
    /// Catalogue lines whose amount or currency could not be read.
    pub skipped: Vec<String>,
    pub section_found: bool,
}

fn amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([\d\s.,]+)\s+([A-Z]{3})").expect("cost amount pattern must compile")
    })
}

/// Slice of `body` from the cost header to the earliest terminator header.
pub fn cost_section(body: &str) -> Option<&str> {
    let start = body.find(COST_SECTION_HEADER)?;
    let search_from = start + COST_SECTION_HEADER.len();
    let end = COST_SECTION_TERMINATORS
        .iter()
        .filter_map(|header| body[search_from..].find(header).map(|offset| search_from + offset))
        .min()
        .unwrap_or(body.len());
    Some(&body[start..end])
}

pub fn extract_costs(body: &str) -> CostExtraction {
    let Some(section) = cost_section(body) else {
        return CostExtraction::default();
    };

    let mut extraction = CostExtraction { section_found: true, ..CostExtraction::default() };
    let lines = section.lines().map(str::trim).filter(|line| !line.is_empty()).skip(1);

    for line in lines {
        let Some(item) = CostItem::CATALOGUE.into_iter().find(|item| line.starts_with(item.label()))
        else {
            continue;
        };
        let remainder = &line[item.label().len()..];
        match parse_amount_and_currency(remainder) {
            Some((amount, currency)) => {
                extraction.lines.push(CostLine::new(item, amount, currency));
            }
            None => extraction.skipped.push(line.to_owned()),
        }
    }

    extraction
}

fn parse_amount_and_currency(remainder: &str) -> Option<(Decimal, String)> {
    let captures = amount_pattern().captures(remainder)?;
    let amount = normalize_amount(captures.get(1)?.as_str())?;
    Some((amount, captures.get(2)?.as_str().to_owned()))
}

/// Reads a human-written amount.
///
/// Whitespace is dropped. A lone comma is a decimal separator. When both
/// separators appear, the last one is the decimal point and the other groups
/// thousands. Repeated commas or repeated dots group thousands.
pub fn normalize_amount(raw: &str) -> Option<Decimal> {
    let compact: String = raw.chars().filter(|ch| !ch.is_whitespace()).collect();
    let commas = compact.matches(',').count();
    let dots = compact.matches('.').count();

    let normalized = match (compact.rfind('.'), compact.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (None, Some(_)) if commas > 1 => compact.replace(',', ""),
        (None, Some(_)) => compact.replace(',', "."),
        (Some(_), None) if dots > 1 => compact.replace('.', ""),
        _ => compact,
    };

    Decimal::from_str(&normalized).ok().filter(|amount| !amount.is_sign_negative())
}
