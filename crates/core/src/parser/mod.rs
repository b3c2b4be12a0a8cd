//! Tolerant extraction of structured offers from carrier reply mail.
//!
//! Each field is read by an ordered [`FieldLadder`]; the first rule that
//! matches wins and a miss falls back to the field's default. Only a reply
//! carrying a request identifier becomes an [`Offer`].

pub mod costs;
pub mod ladder;

use std::sync::OnceLock;

use serde::Serialize;

use crate::domain::bid::BidId;
use crate::domain::catalog::is_currency_code;
use crate::domain::offer::{Offer, OfferStatus, QuotedRate, ORDER_NUMBER_NOT_FOUND};
use crate::ports::InboundMessage;

pub use costs::{extract_costs, normalize_amount, CostExtraction};
pub use ladder::{FieldLadder, FieldRule, LadderMatch, OfferField, RuleSpec};

/// Which rule produced each field, and which fields fell back to defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParseReport {
    pub matched: Vec<(OfferField, &'static str)>,
    pub misses: Vec<OfferField>,
    pub skipped_cost_lines: Vec<String>,
}

impl ParseReport {
    fn hit(&mut self, field: OfferField, rule: &'static str) {
        self.matched.push((field, rule));
    }

    fn miss(&mut self, field: OfferField) {
        self.misses.push(field);
    }

    pub fn rule_for(&self, field: OfferField) -> Option<&'static str> {
        self.matched.iter().find(|(matched, _)| *matched == field).map(|(_, rule)| *rule)
    }
}

/// A message dropped because no request identifier was found.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExtractionReject {
    pub message_ref: String,
    pub sender_name: String,
    pub subject: String,
    pub report: ParseReport,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    Accepted { offer: Offer, report: ParseReport },
    Rejected(ExtractionReject),
}

impl ParseOutcome {
    pub fn into_offer(self) -> Option<Offer> {
        match self {
            Self::Accepted { offer, .. } => Some(offer),
            Self::Rejected(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OfferParser {
    bid_id: FieldLadder,
    order_number: FieldLadder,
    rate: FieldLadder,
    conditions: FieldLadder,
}

impl OfferParser {
    pub fn try_new() -> Result<Self, regex::Error> {
        Ok(Self {
            bid_id: FieldLadder::compile(OfferField::BidId, ladder::BID_ID_RULES)?,
            order_number: FieldLadder::compile(OfferField::OrderNumber, ladder::ORDER_NUMBER_RULES)?,
            rate: FieldLadder::compile(OfferField::Rate, ladder::RATE_RULES)?,
            conditions: FieldLadder::compile(OfferField::Conditions, ladder::CONDITIONS_RULES)?,
        })
    }

    /// Shared parser built from the built-in rule tables.
    pub fn standard() -> &'static OfferParser {
        static PARSER: OnceLock<OfferParser> = OnceLock::new();
        PARSER.get_or_init(|| OfferParser::try_new().expect("built-in offer rules must compile"))
    }

    pub fn ladders(&self) -> [&FieldLadder; 4] {
        [&self.bid_id, &self.order_number, &self.rate, &self.conditions]
    }

    /// `text -> Option<Offer>` view of [`OfferParser::parse`].
    pub fn extract(&self, message: &InboundMessage) -> Option<Offer> {
        self.parse(message).into_offer()
    }

    pub fn parse(&self, message: &InboundMessage) -> ParseOutcome {
        let body = message.body.as_str();
        let mut report = ParseReport::default();

        let bid_id = match self.bid_id.first_match(body) {
            Some(found) => {
                report.hit(OfferField::BidId, found.rule);
                found.group(1).unwrap_or_default().trim().to_owned()
            }
            None => {
                report.miss(OfferField::BidId);
                String::new()
            }
        };

        let order_number = match self.order_number.first_match(body) {
            Some(found) => {
                report.hit(OfferField::OrderNumber, found.rule);
                found.group(1).unwrap_or_default().trim().to_owned()
            }
            None => {
                report.miss(OfferField::OrderNumber);
                ORDER_NUMBER_NOT_FOUND.to_owned()
            }
        };

        let rate = self.rate.first_match(body).and_then(|found| {
            let amount = normalize_amount(found.group(1)?)?;
            let currency = found.group(2)?.to_ascii_uppercase();
            is_currency_code(&currency).then(|| {
                report.hit(OfferField::Rate, found.rule);
                QuotedRate { amount, currency }
            })
        });
        if rate.is_none() {
            report.miss(OfferField::Rate);
        }

        let conditions = self
            .conditions
            .first_match(body)
            .and_then(|found| {
                let text = found.group(1)?.trim();
                (!text.is_empty()).then(|| {
                    report.hit(OfferField::Conditions, found.rule);
                    text.to_owned()
                })
            });
        if conditions.is_none() {
            report.miss(OfferField::Conditions);
        }

        let costs = extract_costs(body);
        if costs.lines.is_empty() {
            report.miss(OfferField::Costs);
        }
        report.skipped_cost_lines = costs.skipped;

        if bid_id.is_empty() {
            return ParseOutcome::Rejected(ExtractionReject {
                message_ref: message.message_ref.clone(),
                sender_name: message.sender_name.clone(),
                subject: message.subject.clone(),
                report,
            });
        }

        let offer = Offer {
            sender_name: message.sender_name.clone(),
            sender_address: message.sender_address.clone(),
            bid_id: BidId(bid_id),
            received_at: message.received_at,
            subject: message.subject.clone(),
            order_number,
            rate,
            conditions,
            costs: costs.lines,
            status: OfferStatus::New,
            last_status_change: None,
        };
        ParseOutcome::Accepted { offer, report }
    }
}
