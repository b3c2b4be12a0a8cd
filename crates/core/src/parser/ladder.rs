use std::fmt;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferField {
    BidId,
    OrderNumber,
    Rate,
    Conditions,
    Costs,
}

impl fmt::Display for OfferField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BidId => "bid_id",
            Self::OrderNumber => "order_number",
            Self::Rate => "rate",
            Self::Conditions => "conditions",
            Self::Costs => "costs",
        };
        f.write_str(name)
    }
}

/// Declarative form of one extraction rule. Group 1 is the extracted value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuleSpec {
    pub name: &'static str,
    pub pattern: &'static str,
}

pub const BID_ID_RULES: &[RuleSpec] = &[
    RuleSpec { name: "request_id_label", pattern: r"(?i)ID\s*заявки\W*([A-Za-z0-9\-_]+)" },
    RuleSpec { name: "request_number_label", pattern: r"(?i)Заявка\s*№?\W*([A-Za-z0-9\-_]+)" },
    RuleSpec { name: "fixed_format", pattern: r"(?i)(SHIP-\d{8}-\d{4})" },
];

pub const ORDER_NUMBER_RULES: &[RuleSpec] = &[
    RuleSpec {
        name: "structured",
        pattern: r"(?i)Номер\s*заказа\W*([A-Z0-9]{2}\d{2}[-_]\d{3,})",
    },
    RuleSpec {
        name: "free_text_line",
        pattern: r"(?im)Номер\s*заказа[^\w\r\n]*([A-Za-z0-9\-_ /]+?)[ \t]*\r?$",
    },
    RuleSpec {
        name: "english_label",
        pattern: r"(?im)Order\s*Number[^\w\r\n]*([A-Za-z0-9\-_ /]+?)[ \t]*\r?$",
    },
    RuleSpec { name: "alnum_dash_heuristic", pattern: r"(?i)([A-Z]{2,}\d+[-_]\d{2,})" },
];

/// Group 1 is the amount, group 2 the currency code.
pub const RATE_RULES: &[RuleSpec] =
    &[RuleSpec { name: "rate_label", pattern: r"(?i)Ставка:\s*([\d,.]+)\s*([A-Z]{3})" }];

pub const CONDITIONS_RULES: &[RuleSpec] = &[RuleSpec {
    name: "conditions_label",
    pattern: r"(?s)(?i:Условия):[ \t]*(.*?)(?:\r?\n[ \t]*\r?\n|\z)",
}];

#[derive(Clone, Debug)]
pub struct FieldRule {
    pub name: &'static str,
    /// Zero is tried first.
    pub priority: usize,
    pattern: Regex,
}

impl FieldRule {
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

#[derive(Debug)]
pub struct LadderMatch<'t> {
    pub rule: &'static str,
    pub captures: Captures<'t>,
}

impl<'t> LadderMatch<'t> {
    pub fn group(&self, index: usize) -> Option<&'t str> {
        self.captures.get(index).map(|m| m.as_str())
    }
}

/// Ordered extraction rules for one field. The first rule that matches wins.
#[derive(Clone, Debug)]
pub struct FieldLadder {
    field: OfferField,
    rules: Vec<FieldRule>,
}

impl FieldLadder {
    pub fn compile(field: OfferField, specs: &[RuleSpec]) -> Result<Self, regex::Error> {
        let rules = specs
            .iter()
            .enumerate()
            .map(|(priority, rule)| {
                Regex::new(rule.pattern).map(|pattern| FieldRule {
                    name: rule.name,
                    priority,
                    pattern,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { field, rules })
    }

    pub fn field(&self) -> OfferField {
        self.field
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn first_match<'t>(&self, text: &'t str) -> Option<LadderMatch<'t>> {
        self.rules.iter().find_map(|rule| {
            rule.pattern
                .captures(text)
                .filter(|captures| captures.get(1).is_some())
                .map(|captures| LadderMatch { rule: rule.name, captures })
        })
    }
}
