use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::catalog::{is_currency_code, CostItem, CostLine};
use crate::errors::DomainError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BidId(pub String);

impl BidId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Identifier derived from the creation instant, e.g. `SHIP-20240101-1200`.
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(format!("SHIP-{}", at.format("%Y%m%d-%H%M")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for BidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BidStatus {
    #[default]
    New,
    InProgress,
    Rejected,
    Accepted,
}

impl fmt::Display for BidStatus {
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

impl FromStr for BidStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "new" | "новая" => Ok(Self::New),
            "inprogress" | "in_progress" | "in-progress" | "в работе" => Ok(Self::InProgress),
            "rejected" | "отклонена" => Ok(Self::Rejected),
            "accepted" | "принята" => Ok(Self::Accepted),
            other => Err(DomainError::UnknownStatus(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidDetails {
    pub country_from: String,
    pub incoterm: String,
    pub port_from: String,
    pub ready_date: String,
    pub container_type: String,
    pub cargo_type: String,
    #[serde(default)]
    pub cargo_description: String,
    pub delivery_method: String,
    #[serde(default)]
    pub hs_code: String,
    pub loading_address: String,
    pub payment_terms: String,
    #[serde(default)]
    pub notes: String,
}

impl BidDetails {
    /// Flat `(key, value)` view in a stable order, used for contract contexts.
    pub fn fields(&self) -> [(&'static str, &str); 12] {
        [
            ("country_from", &self.country_from),
            ("incoterm", &self.incoterm),
            ("port_from", &self.port_from),
            ("ready_date", &self.ready_date),
            ("container_type", &self.container_type),
            ("cargo_type", &self.cargo_type),
            ("cargo_description", &self.cargo_description),
            ("delivery_method", &self.delivery_method),
            ("hs_code", &self.hs_code),
            ("loading_address", &self.loading_address),
            ("payment_terms", &self.payment_terms),
            ("notes", &self.notes),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub order_number: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: BidStatus,
    pub details: BidDetails,
    #[serde(default)]
    pub costs: Vec<CostLine>,
}

impl Bid {
    pub fn cost_for(&self, item: CostItem) -> Option<&CostLine> {
        self.costs.iter().find(|line| line.item_name == item)
    }

    /// Returns the previous status.
    pub fn set_status(&mut self, next: BidStatus) -> BidStatus {
        std::mem::replace(&mut self.status, next)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let required = [
            ("id", self.id.as_str()),
            ("country_from", self.details.country_from.as_str()),
            ("port_from", self.details.port_from.as_str()),
            ("cargo_type", self.details.cargo_type.as_str()),
            ("loading_address", self.details.loading_address.as_str()),
            ("payment_terms", self.details.payment_terms.as_str()),
        ];
        let missing: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| (*name).to_owned())
            .collect();
        if !missing.is_empty() {
            return Err(DomainError::MissingRequiredFields(missing));
        }

        for line in &self.costs {
            if line.amount.is_sign_negative() {
                return Err(DomainError::InvariantViolation(format!(
                    "cost `{}` must not be negative",
                    line.item_name
                )));
            }
            if !is_currency_code(&line.currency) {
                return Err(DomainError::InvariantViolation(format!(
                    "cost `{}` has invalid currency `{}`",
                    line.item_name, line.currency
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{Bid, BidDetails, BidId, BidStatus};
    use crate::domain::catalog::{CostItem, CostLine};
    use crate::errors::DomainError;

    fn bid() -> Bid {
        Bid {
            id: BidId::new("SHIP-20240101-1200"),
            order_number: "IN00-000".to_owned(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            status: BidStatus::New,
            details: BidDetails {
                country_from: "Китай".to_owned(),
                incoterm: "FOB".to_owned(),
                port_from: "Shanghai".to_owned(),
                ready_date: "2024-01-15".to_owned(),
                container_type: "40 фут".to_owned(),
                cargo_type: "не опасный".to_owned(),
                cargo_description: String::new(),
                delivery_method: "Море+ЖД".to_owned(),
                hs_code: String::new(),
                loading_address: "Taichung".to_owned(),
                payment_terms: "50% TT in advance".to_owned(),
                notes: String::new(),
            },
            costs: vec![CostLine::new(CostItem::SeaFreight, Decimal::new(1200, 0), "USD")],
        }
    }

    #[test]
    fn timestamp_derived_id_uses_minute_precision() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 42).unwrap();
        assert_eq!(BidId::from_timestamp(at).as_str(), "SHIP-20240307-0905");
    }

    #[test]
    fn validation_lists_every_missing_field() {
        let mut bid = bid();
        bid.details.port_from.clear();
        bid.details.payment_terms = "  ".to_owned();

        let error = bid.validate().expect_err("missing fields must be rejected");
        assert_eq!(
            error,
            DomainError::MissingRequiredFields(vec![
                "port_from".to_owned(),
                "payment_terms".to_owned()
            ])
        );
    }

    #[test]
    fn validation_rejects_negative_amounts() {
        let mut bid = bid();
        bid.costs.push(CostLine::new(CostItem::PreCarriage, Decimal::new(-1, 0), "USD"));
        assert!(matches!(bid.validate(), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn status_parses_english_and_russian_labels() {
        assert_eq!("InProgress".parse::<BidStatus>(), Ok(BidStatus::InProgress));
        assert_eq!("в работе".parse::<BidStatus>(), Ok(BidStatus::InProgress));
        assert_eq!("Принята".parse::<BidStatus>(), Ok(BidStatus::Accepted));
        assert!("done".parse::<BidStatus>().is_err());
    }

    #[test]
    fn set_status_returns_previous_value() {
        let mut bid = bid();
        assert_eq!(bid.set_status(BidStatus::InProgress), BidStatus::New);
        assert_eq!(bid.status, BidStatus::InProgress);
        assert_eq!(bid.cost_for(CostItem::SeaFreight).map(|line| line.amount), Some(Decimal::new(1200, 0)));
    }
}
