use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fixed, ordered catalogue of freight cost categories.
///
/// The serialized form is the human label used in request and reply emails,
/// so the parser can match reply lines against it verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CostItem {
    #[serde(rename = "Pre-carriage")]
    PreCarriage,
    #[serde(rename = "OTHC (Origin Terminal Handling Charges)")]
    OriginTerminalHandling,
    #[serde(rename = "Sea freight")]
    SeaFreight,
    #[serde(rename = "ЖД перевозка")]
    RailFreight,
    #[serde(rename = "Прямое ЖД")]
    DirectRail,
    #[serde(rename = "Станционные затраты")]
    StationCosts,
    #[serde(rename = "Доставка со станции")]
    LastMile,
}

impl CostItem {
    pub const CATALOGUE: [CostItem; 7] = [
        CostItem::PreCarriage,
        CostItem::OriginTerminalHandling,
        CostItem::SeaFreight,
        CostItem::RailFreight,
        CostItem::DirectRail,
        CostItem::StationCosts,
        CostItem::LastMile,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::PreCarriage => "Pre-carriage",
            Self::OriginTerminalHandling => "OTHC (Origin Terminal Handling Charges)",
            Self::SeaFreight => "Sea freight",
            Self::RailFreight => "ЖД перевозка",
            Self::DirectRail => "Прямое ЖД",
            Self::StationCosts => "Станционные затраты",
            Self::LastMile => "Доставка со станции",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::CATALOGUE.into_iter().find(|item| item.label() == label.trim())
    }
}

impl fmt::Display for CostItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLine {
    pub item_name: CostItem,
    pub amount: Decimal,
    pub currency: String,
}

impl CostLine {
    pub fn new(item_name: CostItem, amount: Decimal, currency: impl Into<String>) -> Self {
        Self { item_name, amount, currency: currency.into() }
    }
}

pub fn is_currency_code(value: &str) -> bool {
    value.len() == 3 && value.chars().all(|ch| ch.is_ascii_uppercase())
}
