//! Turns an accepted (bid, offer) pair into a rendered contract document.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::bid::Bid;
use crate::domain::carrier::{CarrierDirectory, CarrierProfile};
use crate::domain::contract::{ContractRecord, CONTRACT_STATUS_GENERATED};
use crate::domain::offer::Offer;
use crate::ports::{
    append_records, ArtifactStore, Collection, RecordStore, RenderContext, RenderError,
    TemplateRenderer,
};

pub const DEFAULT_CONTRACT_TEMPLATE: &str = "contract.html.tera";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("contract template `{0}` is missing")]
    TemplateMissing(String),
    #[error("contract rendering failed: {0}")]
    RenderFailure(String),
    #[error("contract file i/o failed: {0}")]
    Io(String),
    #[error("contract log could not be written: {0}")]
    Persistence(String),
}

impl From<RenderError> for ContractError {
    fn from(value: RenderError) -> Self {
        match value {
            RenderError::TemplateMissing(template) => Self::TemplateMissing(template),
            other @ RenderError::Failed { .. } => Self::RenderFailure(other.to_string()),
        }
    }
}

/// Context key prefixes for the three cost items a contract spells out.
const CONTRACT_COST_FIELDS: [(&str, &str); 3] = [
    ("Pre-carriage", "pre_carriage"),
    ("OTHC", "othc"),
    ("Sea freight", "sea_freight"),
];

/// Flat context handed to the contract template.
///
/// Carries every bid detail verbatim, the carrier's profile columns (empty
/// when no profile exists) and three cost pairs that default to `0` and an
/// empty currency.
pub fn build_context(
    bid: &Bid,
    offer: &Offer,
    profile: Option<&CarrierProfile>,
    generated_at: DateTime<Utc>,
) -> RenderContext {
    let mut context = RenderContext::new();
    let default_profile = CarrierProfile::default();
    let profile = profile.unwrap_or(&default_profile);

    context.insert("id".to_owned(), bid.id.to_string());
    context.insert("order_number".to_owned(), bid.order_number.clone());
    context.insert("date_created".to_owned(), generated_at.format("%d.%m.%Y").to_string());
    context.insert("carrier_name".to_owned(), offer.sender_name.clone());
    let carrier_email =
        if profile.email.trim().is_empty() { &offer.sender_address } else { &profile.email };
    context.insert("carrier_email".to_owned(), carrier_email.clone());

    for (key, value) in bid.details.fields() {
        context.insert(key.to_owned(), value.to_owned());
    }
    for (key, value) in profile.fields() {
        context.insert(key.to_owned(), value.to_owned());
    }

    for (fragment, prefix) in CONTRACT_COST_FIELDS {
        let line = offer.costs.iter().find(|line| line.item_name.label().contains(fragment));
        let (amount, currency) = match line {
            Some(line) => (line.amount.to_string(), line.currency.clone()),
            None => ("0".to_owned(), String::new()),
        };
        context.insert(format!("{prefix}_cost"), amount);
        context.insert(format!("{prefix}_currency"), currency);
    }

    context
}

/// Output file name. `nonce` separates generations that share a timestamp.
pub fn artifact_file_name(
    bid: &Bid,
    offer: &Offer,
    template: &str,
    generated_at: DateTime<Utc>,
    nonce: &str,
) -> String {
    let extension = Path::new(template.trim_end_matches(".tera"))
        .extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or("txt");
    format!(
        "contract_{}_{}_{}_{}.{extension}",
        file_safe(bid.id.as_str()),
        file_safe(&offer.sender_name),
        generated_at.format("%Y%m%d%H%M%S%3f"),
        file_safe(nonce)
    )
}

fn file_safe(value: &str) -> String {
    value
        .chars()
        .map(|ch| if ch.is_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractArtifact {
    pub transient_path: PathBuf,
    pub archived_path: PathBuf,
    pub record: ContractRecord,
}

pub struct ContractMaterializer<'a> {
    renderer: &'a dyn TemplateRenderer,
    artifacts: &'a dyn ArtifactStore,
    store: &'a dyn RecordStore,
    template: String,
}

impl<'a> ContractMaterializer<'a> {
    pub fn new(
        renderer: &'a dyn TemplateRenderer,
        artifacts: &'a dyn ArtifactStore,
        store: &'a dyn RecordStore,
        template: impl Into<String>,
    ) -> Self {
        Self { renderer, artifacts, store, template: template.into() }
    }

    /// Renders, writes the transient and archived copies, then appends the
    /// contract record. Any failure removes the files written so far.
    ///
    /// Every call produces a new file and a new record.
    pub fn generate(
        &self,
        bid: &Bid,
        offer: &Offer,
        directory: &dyn CarrierDirectory,
        now: DateTime<Utc>,
    ) -> Result<ContractArtifact, ContractError> {
        let profile = directory.lookup(&offer.sender_name);
        let context = build_context(bid, offer, profile.as_ref(), now);
        let document = self.renderer.render(&self.template, &context)?;

        let nonce = Uuid::new_v4().simple().to_string();
        let file_name = artifact_file_name(bid, offer, &self.template, now, &nonce[..8]);
        let transient_path = self
            .artifacts
            .write_transient(&file_name, &document)
            .map_err(|error| ContractError::Io(error.to_string()))?;

        let archived_path = match self.artifacts.archive(&transient_path) {
            Ok(path) => path,
            Err(error) => {
                self.artifacts.discard(&transient_path);
                return Err(ContractError::Io(error.to_string()));
            }
        };

        let record = ContractRecord {
            bid_id: bid.id.clone(),
            offer_bid_id: offer.bid_id.clone(),
            carrier: offer.sender_name.clone(),
            generated_at: now,
            file_path: archived_path.display().to_string(),
            status: CONTRACT_STATUS_GENERATED.to_owned(),
        };

        if let Err(error) =
            append_records(self.store, Collection::Contracts, std::slice::from_ref(&record))
        {
            warn!(
                event_name = "contracts.record_failed",
                bid_id = %bid.id,
                carrier = %offer.sender_name,
                error = %error,
                "contract log write failed, removing generated files"
            );
            self.artifacts.discard(&archived_path);
            self.artifacts.discard(&transient_path);
            return Err(ContractError::Persistence(error.to_string()));
        }

        info!(
            event_name = "contracts.generated",
            bid_id = %bid.id,
            carrier = %offer.sender_name,
            path = %archived_path.display(),
            "contract generated"
        );

        Ok(ContractArtifact { transient_path, archived_path, record })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{artifact_file_name, build_context, ContractError, ContractMaterializer};
    use crate::domain::bid::{Bid, BidDetails, BidId, BidStatus};
    use crate::domain::carrier::CarrierProfile;
    use crate::domain::catalog::{CostItem, CostLine};
    use crate::domain::contract::ContractRecord;
    use crate::domain::offer::{Offer, OfferStatus};
    use crate::memory::{InMemoryArtifactStore, InMemoryRecordStore};
    use crate::ports::{
        load_records, Collection, RenderContext, RenderError, TemplateRenderer,
    };

    fn bid() -> Bid {
        Bid {
            id: BidId::new("SHIP-20240101-1200"),
            order_number: "IN24-0042".to_owned(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            status: BidStatus::New,
            details: BidDetails {
                country_from: "Китай".to_owned(),
                incoterm: "FOB".to_owned(),
                port_from: "Shanghai".to_owned(),
                cargo_type: "не опасный".to_owned(),
                loading_address: "Shanghai, Pudong".to_owned(),
                payment_terms: "100% prepaid".to_owned(),
                ..BidDetails::default()
            },
            costs: Vec::new(),
        }
    }

    fn offer() -> Offer {
        Offer {
            sender_name: "Baltic Lines".to_owned(),
            sender_address: "quotes@baltic.test".to_owned(),
            bid_id: BidId::new("SHIP-20240101-1200"),
            received_at: Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
            subject: String::new(),
            order_number: "IN24-0042".to_owned(),
            rate: None,
            conditions: None,
            costs: vec![CostLine::new(CostItem::SeaFreight, Decimal::new(500, 0), "USD")],
            status: OfferStatus::Accepted,
            last_status_change: None,
        }
    }

    struct EchoRenderer;

    impl TemplateRenderer for EchoRenderer {
        fn render(&self, template_ref: &str, context: &RenderContext) -> Result<Vec<u8>, RenderError> {
            match template_ref {
                "contract.html.tera" => Ok(format!("{context:?}").into_bytes()),
                "broken.html.tera" => Err(RenderError::Failed {
                    template: template_ref.to_owned(),
                    message: "unexpected end".to_owned(),
                }),
                other => Err(RenderError::TemplateMissing(other.to_owned())),
            }
        }
    }

    #[test]
    fn context_carries_details_and_defaults_missing_costs() {
        let generated_at = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();
        let context = build_context(&bid(), &offer(), None, generated_at);

        assert_eq!(context["cargo_type"], "не опасный");
        assert_eq!(context["sea_freight_cost"], "500");
        assert_eq!(context["sea_freight_currency"], "USD");
        assert_eq!(context["pre_carriage_cost"], "0");
        assert_eq!(context["pre_carriage_currency"], "");
        assert_eq!(context["othc_cost"], "0");
        assert_eq!(context["othc_currency"], "");
        assert_eq!(context["date_created"], "05.03.2024");
        assert_eq!(context["carrier_email"], "quotes@baltic.test");
        assert_eq!(context["inn"], "");
    }

    #[test]
    fn profile_email_wins_over_sender_address() {
        let profile = CarrierProfile {
            name: "Baltic Lines".to_owned(),
            email: "legal@baltic.test".to_owned(),
            inn: "7701234567".to_owned(),
            ..CarrierProfile::default()
        };
        let context = build_context(&bid(), &offer(), Some(&profile), Utc::now());
        assert_eq!(context["carrier_email"], "legal@baltic.test");
        assert_eq!(context["inn"], "7701234567");
    }

    #[test]
    fn first_matching_cost_line_wins() {
        let mut offer = offer();
        offer.costs.push(CostLine::new(CostItem::SeaFreight, Decimal::new(900, 0), "EUR"));
        let context = build_context(&bid(), &offer, None, Utc::now());
        assert_eq!(context["sea_freight_cost"], "500");
    }

    #[test]
    fn file_name_keeps_template_extension_and_nonce() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();
        assert_eq!(
            artifact_file_name(&bid(), &offer(), "contract.html.tera", at, "a1b2c3d4"),
            "contract_SHIP-20240101-1200_Baltic_Lines_20240305080000000_a1b2c3d4.html"
        );
        assert!(artifact_file_name(&bid(), &offer(), "plain", at, "x").ends_with("_x.txt"));
    }

    #[test]
    fn generation_writes_both_copies_and_one_record() {
        let store = InMemoryRecordStore::default();
        let artifacts = InMemoryArtifactStore::default();
        let materializer =
            ContractMaterializer::new(&EchoRenderer, &artifacts, &store, "contract.html.tera");
        let profiles: Vec<CarrierProfile> = Vec::new();
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();

        let artifact = materializer.generate(&bid(), &offer(), &profiles, now).expect("generated");
        assert!(artifacts.contains(&artifact.transient_path));
        assert!(artifacts.contains(&artifact.archived_path));
        let file_name = artifact
            .archived_path
            .file_name()
            .and_then(|name| name.to_str())
            .expect("file name")
            .to_owned();
        assert!(file_name.starts_with("contract_SHIP-20240101-1200_Baltic_Lines_20240305080000000_"));
        assert!(file_name.ends_with(".html"));

        let again = materializer.generate(&bid(), &offer(), &profiles, now).expect("regenerated");
        assert_ne!(again.archived_path, artifact.archived_path);
        assert!(artifacts.contains(&artifact.archived_path));
        assert!(artifacts.contains(&again.archived_path));

        let log = load_records::<ContractRecord>(&store, Collection::Contracts).expect("log");
        assert_eq!(log.items.len(), 2);
        assert_ne!(log.items[0].file_path, log.items[1].file_path);
        assert_eq!(log.items[0].status, "generated");
        assert_eq!(log.items[0].carrier, "Baltic Lines");
    }

    #[test]
    fn missing_template_leaves_nothing_behind() {
        let store = InMemoryRecordStore::default();
        let artifacts = InMemoryArtifactStore::default();
        let materializer =
            ContractMaterializer::new(&EchoRenderer, &artifacts, &store, "absent.html.tera");

        let error = materializer
            .generate(&bid(), &offer(), &Vec::<CarrierProfile>::new(), Utc::now())
            .expect_err("template is missing");
        assert_eq!(error, ContractError::TemplateMissing("absent.html.tera".to_owned()));
        assert!(artifacts.is_empty());
    }

    #[test]
    fn failed_archive_discards_transient_copy() {
        let store = InMemoryRecordStore::default();
        let artifacts = InMemoryArtifactStore::default();
        artifacts.fail_archives(true);
        let materializer =
            ContractMaterializer::new(&EchoRenderer, &artifacts, &store, "contract.html.tera");

        let error = materializer
            .generate(&bid(), &offer(), &Vec::<CarrierProfile>::new(), Utc::now())
            .expect_err("archive refuses writes");
        assert!(matches!(error, ContractError::Io(_)));
        assert!(artifacts.is_empty());
        assert!(store.records(Collection::Contracts).is_empty());
    }

    #[test]
    fn failed_log_write_discards_files() {
        let store = InMemoryRecordStore::default();
        store.fail_saves(true);
        let artifacts = InMemoryArtifactStore::default();
        let materializer =
            ContractMaterializer::new(&EchoRenderer, &artifacts, &store, "contract.html.tera");

        let error = materializer
            .generate(&bid(), &offer(), &Vec::<CarrierProfile>::new(), Utc::now())
            .expect_err("store refuses writes");
        assert!(matches!(error, ContractError::Persistence(_)));
        assert!(artifacts.is_empty());

        let render_error =
            ContractMaterializer::new(&EchoRenderer, &artifacts, &store, "broken.html.tera")
                .generate(&bid(), &offer(), &Vec::<CarrierProfile>::new(), Utc::now())
                .expect_err("render fails");
        assert!(matches!(render_error, ContractError::RenderFailure(_)));
    }
}
