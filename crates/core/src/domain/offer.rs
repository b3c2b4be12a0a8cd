use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::bid::BidId;
use crate::domain::catalog::{CostItem, CostLine};
use crate::errors::DomainError;

/// Order number placeholder stored when no pattern matched.
pub const ORDER_NUMBER_NOT_FOUND: &str = "—";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferStatus {
    #[default]
    New,
    InProgress,
    Rejected,
    Accepted,
}

impl OfferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Accepted)
    }

    /// Label used in carrier-facing correspondence.
    pub fn display_label(self) -> &'static str {
        match self {
            Self::New => "Новое",
            Self::InProgress => "В работе",
            Self::Rejected => "Отклонено",
            Self::Accepted => "Принято",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::New => "New",
            Self::InProgress => "InProgress",
            Self::Rejected => "Rejected",
            Self::Accepted => "Accepted",
        };
        f.write_str(label)
    }
}

impl FromStr for OfferStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "new" | "новое" => Ok(Self::New),
            "inprogress" | "in_progress" | "in-progress" | "в работе" => Ok(Self::InProgress),
            "rejected" | "отклонено" => Ok(Self::Rejected),
            "accepted" | "принято" => Ok(Self::Accepted),
            other => Err(DomainError::UnknownStatus(other.to_owned())),
        }
    }
}

/// Merge identity of an offer: one sender quoting one request.
///
/// Not unique across time. A second reply from the same sender for the same
/// request shares the key, and every operation keyed by it touches both.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferKey {
    pub bid_id: BidId,
    pub sender_name: String,
}

impl OfferKey {
    pub fn new(bid_id: impl Into<String>, sender_name: impl Into<String>) -> Self {
        Self { bid_id: BidId(bid_id.into()), sender_name: sender_name.into() }
    }
}

impl fmt::Display for OfferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.bid_id, self.sender_name)
    }
}

/// Headline `rate: amount currency` figure quoted in a reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotedRate {
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub sender_name: String,
    pub sender_address: String,
    #[serde(default)]
    pub bid_id: BidId,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub subject: String,
    #[serde(default = "default_order_number")]
    pub order_number: String,
    #[serde(default)]
    pub rate: Option<QuotedRate>,
    #[serde(default)]
    pub conditions: Option<String>,
    #[serde(default)]
    pub costs: Vec<CostLine>,
    #[serde(default)]
    pub status: OfferStatus,
    #[serde(default)]
    pub last_status_change: Option<DateTime<Utc>>,
}

fn default_order_number() -> String {
    ORDER_NUMBER_NOT_FOUND.to_owned()
}

impl Offer {
    pub fn key(&self) -> OfferKey {
        OfferKey { bid_id: self.bid_id.clone(), sender_name: self.sender_name.clone() }
    }

    pub fn is_matched(&self) -> bool {
        !self.bid_id.is_empty()
    }

    pub fn cost_for(&self, item: CostItem) -> Option<&CostLine> {
        self.costs.iter().find(|line| line.item_name == item)
    }
}
