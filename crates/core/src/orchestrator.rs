//! Operator-facing use cases of the quote desk.
//!
//! Each method runs to completion against the collaborators it was built
//! with. Failures are scoped to the item being processed and come back in the
//! returned report; only failures that stop the whole use case are errors.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::clock::Clock;
use crate::compose;
use crate::config::AppConfig;
use crate::contract::{ContractArtifact, ContractMaterializer};
use crate::domain::bid::{Bid, BidDetails, BidId, BidStatus};
use crate::domain::carrier::{validate_roster, Carrier, CarrierProfile};
use crate::domain::catalog::CostLine;
use crate::domain::offer::{Offer, OfferKey};
use crate::errors::ApplicationError;
use crate::parser::{ExtractionReject, OfferParser, ParseOutcome};
use crate::ports::{
    append_records, load_records, save_records, ArtifactStore, Collection, MailError,
    MailTransport, RecordStore, TemplateRenderer,
};
use crate::rates::{RateSource, RateTable};
use crate::reconcile::{
    apply_status_edits, purge_rejected, rank, Comparison, ComparisonFilter, PurgeOutcome,
    StatusEdit, StatusNotifier, StatusPassReport, TransitionOutcome,
};

#[derive(Clone, Debug)]
pub struct DeskSettings {
    pub inbox_folder: String,
    pub debounce: Duration,
    pub max_attachment_bytes: u64,
    pub contract_template: String,
    /// Served when the rate source fails.
    pub fallback_rates: RateTable,
    pub actor: String,
}

impl DeskSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            inbox_folder: config.mail.inbox_folder.clone(),
            debounce: Duration::seconds(i64::try_from(config.reconcile.debounce_secs).unwrap_or(i64::MAX)),
            max_attachment_bytes: config.submission.max_attachment_bytes,
            contract_template: config.contracts.template_name.clone(),
            fallback_rates: config.rates.fallback_table(),
            actor: "operator".to_owned(),
        }
    }
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub struct Collaborators {
    pub store: Arc<dyn RecordStore>,
    pub mail: Arc<dyn MailTransport>,
    pub rates: Arc<dyn RateSource>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub clock: Arc<dyn Clock>,
    pub audit: Arc<dyn AuditSink>,
}

/// Operator input for a new shipment request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BidDraft {
    /// Derived from the submission instant when absent.
    pub id: Option<String>,
    pub order_number: String,
    pub details: BidDetails,
    pub costs: Vec<CostLine>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentCandidate {
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedAttachment {
    pub path: PathBuf,
    pub reason: String,
}

/// Keeps files in order while each one and the running total fit in `limit`.
pub fn select_attachments(
    candidates: &[AttachmentCandidate],
    limit: u64,
) -> (Vec<PathBuf>, Vec<SkippedAttachment>) {
    let mut accepted = Vec::new();
    let mut skipped = Vec::new();
    let mut total: u64 = 0;

    for candidate in candidates {
        if candidate.size_bytes > limit {
            skipped.push(SkippedAttachment {
                path: candidate.path.clone(),
                reason: format!("file exceeds {limit} bytes"),
            });
        } else if total.saturating_add(candidate.size_bytes) > limit {
            skipped.push(SkippedAttachment {
                path: candidate.path.clone(),
                reason: format!("total attachment size would exceed {limit} bytes"),
            });
        } else {
            total += candidate.size_bytes;
            accepted.push(candidate.path.clone());
        }
    }

    (accepted, skipped)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecipientFailure {
    pub carrier: String,
    pub address: String,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvalidAddress {
    pub carrier: String,
    pub entry: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmissionReport {
    pub bid_id: BidId,
    pub dispatched: usize,
    pub failures: Vec<RecipientFailure>,
    pub invalid_addresses: Vec<InvalidAddress>,
    pub attachments: Vec<PathBuf>,
    pub skipped_attachments: Vec<SkippedAttachment>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub accepted: Vec<Offer>,
    pub rejected: Vec<ExtractionReject>,
    pub mark_read_failures: Vec<String>,
    /// Set when the accepted offers could not be stored. They are still
    /// returned and their messages stay unread.
    pub persistence_error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractDispatch {
    pub artifact: ContractArtifact,
    pub recipient: String,
    pub dispatch_error: Option<String>,
}

struct MailNotifier<'a> {
    mail: &'a dyn MailTransport,
}

impl StatusNotifier for MailNotifier<'_> {
    fn notify(&self, offer: &Offer) -> Result<(), MailError> {
        self.mail.send(&compose::status_notice(offer))
    }
}

pub struct FreightDesk {
    store: Arc<dyn RecordStore>,
    mail: Arc<dyn MailTransport>,
    rates: Arc<dyn RateSource>,
    renderer: Arc<dyn TemplateRenderer>,
    artifacts: Arc<dyn ArtifactStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    parser: &'static OfferParser,
    settings: DeskSettings,
}

impl FreightDesk {
    pub fn new(collaborators: Collaborators, settings: DeskSettings) -> Self {
        Self {
            store: collaborators.store,
            mail: collaborators.mail,
            rates: collaborators.rates,
            renderer: collaborators.renderer,
            artifacts: collaborators.artifacts,
            clock: collaborators.clock,
            audit: collaborators.audit,
            parser: OfferParser::standard(),
            settings,
        }
    }

    pub fn settings(&self) -> &DeskSettings {
        &self.settings
    }

    fn event(
        &self,
        correlation_id: &str,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent::new(
            correlation_id,
            event_type,
            category,
            self.settings.actor.clone(),
            outcome,
            self.clock.now(),
        )
    }

    pub fn bids(&self) -> Result<Vec<Bid>, ApplicationError> {
        Ok(load_records::<Bid>(self.store.as_ref(), Collection::Bids)?.items)
    }

    pub fn offers(&self) -> Result<Vec<Offer>, ApplicationError> {
        Ok(load_records::<Offer>(self.store.as_ref(), Collection::Offers)?.items)
    }

    pub fn carriers(&self) -> Result<Vec<Carrier>, ApplicationError> {
        Ok(load_records::<Carrier>(self.store.as_ref(), Collection::Carriers)?.items)
    }

    /// Appends one carrier. Names are unique within the list.
    pub fn add_carrier(&self, carrier: Carrier) -> Result<usize, ApplicationError> {
        carrier.validate()?;
        let loaded = load_records::<Carrier>(self.store.as_ref(), Collection::Carriers)?;
        if loaded.items.iter().any(|stored| stored.name == carrier.name) {
            return Err(ApplicationError::Duplicate { entity: "carrier", id: carrier.name });
        }
        let mut carriers = loaded.items;
        carriers.push(carrier.clone());
        save_records(self.store.as_ref(), Collection::Carriers, &carriers, Some(&loaded.revision))?;

        self.audit.emit(
            self.event(
                &Uuid::new_v4().to_string(),
                "carriers.added",
                AuditCategory::Carriers,
                AuditOutcome::Success,
            )
            .for_carrier(carrier.name),
        );
        Ok(carriers.len())
    }

    /// Replaces the whole carrier list. Nothing is written unless every row
    /// is valid.
    pub fn replace_carriers(&self, carriers: Vec<Carrier>) -> Result<usize, ApplicationError> {
        validate_roster(&carriers)?;
        let loaded = load_records::<Carrier>(self.store.as_ref(), Collection::Carriers)?;
        save_records(self.store.as_ref(), Collection::Carriers, &carriers, Some(&loaded.revision))?;

        info!(
            event_name = "carriers.replaced",
            previous = loaded.items.len(),
            current = carriers.len(),
            "carrier list replaced"
        );
        self.audit.emit(
            self.event(
                &Uuid::new_v4().to_string(),
                "carriers.replaced",
                AuditCategory::Carriers,
                AuditOutcome::Success,
            )
            .with_metadata("count", carriers.len()),
        );
        Ok(carriers.len())
    }

    pub fn submit_request(
        &self,
        draft: BidDraft,
        attachments: &[AttachmentCandidate],
    ) -> Result<SubmissionReport, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        let now = self.clock.now();
        let id = match draft.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => BidId::new(id),
            _ => BidId::from_timestamp(now),
        };
        let bid = Bid {
            id,
            order_number: draft.order_number,
            created_at: now,
            status: BidStatus::New,
            details: draft.details,
            costs: draft.costs,
        };
        bid.validate()?;

        let existing = load_records::<Bid>(self.store.as_ref(), Collection::Bids)?;
        if existing.items.iter().any(|stored| stored.id == bid.id) {
            return Err(ApplicationError::Duplicate { entity: "bid", id: bid.id.to_string() });
        }
        let mut bids = existing.items;
        bids.push(bid.clone());
        save_records(self.store.as_ref(), Collection::Bids, &bids, Some(&existing.revision))?;

        let (files, skipped_attachments) =
            select_attachments(attachments, self.settings.max_attachment_bytes);
        for skipped in &skipped_attachments {
            warn!(
                event_name = "bids.attachment_skipped",
                path = %skipped.path.display(),
                reason = %skipped.reason,
                "attachment skipped"
            );
        }

        let carriers = load_records::<Carrier>(self.store.as_ref(), Collection::Carriers)?.items;
        let mut report = SubmissionReport {
            bid_id: bid.id.clone(),
            dispatched: 0,
            failures: Vec::new(),
            invalid_addresses: Vec::new(),
            attachments: files.clone(),
            skipped_attachments,
        };

        for carrier in &carriers {
            let addresses = carrier.addresses();
            for entry in addresses.invalid {
                warn!(
                    event_name = "bids.invalid_address",
                    carrier = %carrier.name,
                    entry = %entry,
                    "carrier address skipped"
                );
                report.invalid_addresses.push(InvalidAddress { carrier: carrier.name.clone(), entry });
            }
            for address in addresses.valid {
                match self.mail.send(&compose::request_mail(&bid, &address, &files)) {
                    Ok(()) => report.dispatched += 1,
                    Err(error) => {
                        warn!(
                            event_name = "bids.dispatch_failed",
                            carrier = %carrier.name,
                            address = %address,
                            error = %error,
                            "request mail failed"
                        );
                        report.failures.push(RecipientFailure {
                            carrier: carrier.name.clone(),
                            address,
                            error: error.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            event_name = "bids.submitted",
            bid_id = %bid.id,
            dispatched = report.dispatched,
            failed = report.failures.len(),
            "request submitted"
        );
        self.audit.emit(
            self.event(&correlation_id, "bids.submitted", AuditCategory::Submission, AuditOutcome::Success)
                .for_bid(&bid.id)
                .with_metadata("dispatched", report.dispatched)
                .with_metadata("failed", report.failures.len()),
        );

        Ok(report)
    }

    /// Parses unread replies in `folder` (the configured inbox when `None`).
    pub fn ingest_offers(&self, folder: Option<&str>) -> Result<IngestReport, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        let folder = folder.unwrap_or(&self.settings.inbox_folder);
        let messages = self
            .mail
            .fetch_unread(folder)
            .map_err(|error| ApplicationError::Integration(error.to_string()))?;

        let mut report = IngestReport::default();
        let mut accepted_refs = Vec::new();
        for message in &messages {
            match self.parser.parse(message) {
                ParseOutcome::Accepted { offer, report: parse_report } => {
                    if !parse_report.misses.is_empty() {
                        info!(
                            event_name = "offers.parse_miss",
                            message_ref = %message.message_ref,
                            misses = ?parse_report.misses,
                            "offer parsed with defaults"
                        );
                    }
                    accepted_refs.push(message.message_ref.clone());
                    report.accepted.push(offer);
                }
                ParseOutcome::Rejected(reject) => {
                    info!(
                        event_name = "offers.extraction_rejected",
                        message_ref = %reject.message_ref,
                        sender = %reject.sender_name,
                        "message has no request id"
                    );
                    report.rejected.push(reject);
                }
            }
        }

        if !report.accepted.is_empty() {
            if let Err(error) =
                append_records(self.store.as_ref(), Collection::Offers, &report.accepted)
            {
                warn!(
                    event_name = "offers.persist_failed",
                    error = %error,
                    accepted = report.accepted.len(),
                    "accepted offers were not stored"
                );
                report.persistence_error = Some(error.to_string());
                self.audit.emit(
                    self.event(
                        &correlation_id,
                        "offers.persist_failed",
                        AuditCategory::Persistence,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", &error),
                );
                return Ok(report);
            }
        }

        for message_ref in accepted_refs {
            if let Err(error) = self.mail.mark_read(&message_ref) {
                warn!(event_name = "offers.mark_read_failed", error = %error, "mark read failed");
                report.mark_read_failures.push(message_ref);
            }
        }

        self.audit.emit(
            self.event(&correlation_id, "offers.ingested", AuditCategory::Ingestion, AuditOutcome::Success)
                .with_metadata("folder", folder)
                .with_metadata("accepted", report.accepted.len())
                .with_metadata("rejected", report.rejected.len()),
        );
        Ok(report)
    }

    /// Current rate table, degrading to the configured fallback pair.
    pub fn rates(&self) -> RateTable {
        match self.rates.current_rates() {
            Ok(table) => table,
            Err(error) => {
                warn!(event_name = "rates.lookup_failed", error = %error, "using fallback rates");
                self.settings.fallback_rates.clone()
            }
        }
    }

    pub fn refresh_rates(&self) -> RateTable {
        self.rates.invalidate();
        let table = self.rates();
        self.audit.emit(
            self.event(
                &Uuid::new_v4().to_string(),
                "rates.refreshed",
                AuditCategory::Rates,
                AuditOutcome::Success,
            )
            .with_metadata("as_of", &table.as_of)
            .with_metadata("origin", format!("{:?}", table.origin)),
        );
        table
    }

    pub fn compare(&self, filter: &ComparisonFilter) -> Result<Comparison, ApplicationError> {
        let offers = self.offers()?;
        let known: HashSet<BidId> = self.bids()?.into_iter().map(|bid| bid.id).collect();
        Ok(rank(&offers, &self.rates(), &known, filter))
    }

    /// Applies status edits and dispatches the resulting notifications.
    ///
    /// Every edit must name at least one stored offer. The offer collection
    /// is written back against the revision it was read at; a failed write
    /// is reported in the returned report alongside the notices already sent.
    pub fn apply_status_edits(
        &self,
        edits: &[StatusEdit],
    ) -> Result<StatusPassReport, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        let loaded = load_records::<Offer>(self.store.as_ref(), Collection::Offers)?;
        let known: HashSet<OfferKey> = loaded.items.iter().map(Offer::key).collect();
        if let Some(missing) = edits.iter().find(|edit| !known.contains(&edit.key)) {
            return Err(ApplicationError::NotFound { entity: "offer", id: missing.key.to_string() });
        }

        let mut offers = loaded.items;
        let notifier = MailNotifier { mail: self.mail.as_ref() };
        let mut report = apply_status_edits(
            &mut offers,
            edits,
            self.clock.now(),
            self.settings.debounce,
            &notifier,
        );
        if let Err(error) =
            save_records(self.store.as_ref(), Collection::Offers, &offers, Some(&loaded.revision))
        {
            warn!(
                event_name = "offers.status_persist_failed",
                error = %error,
                dispatched = report.dispatched(),
                "status changes were not stored"
            );
            self.audit.emit(
                self.event(
                    &correlation_id,
                    "offers.status_persist_failed",
                    AuditCategory::Persistence,
                    AuditOutcome::Failed,
                )
                .with_metadata("error", &error)
                .with_metadata("dispatched", report.dispatched()),
            );
            report.persistence_error = Some(error.to_string());
        }

        for transition in &report.transitions {
            let outcome = match transition.outcome {
                TransitionOutcome::Unchanged => continue,
                TransitionOutcome::Updated | TransitionOutcome::Dispatched => AuditOutcome::Success,
                TransitionOutcome::DebounceSuppressed { .. }
                | TransitionOutcome::SenderAlreadyNotified => AuditOutcome::Suppressed,
                TransitionOutcome::DispatchFailed { .. } => AuditOutcome::Failed,
            };
            self.audit.emit(
                self.event(
                    &correlation_id,
                    "offers.status_applied",
                    AuditCategory::Reconciliation,
                    outcome,
                )
                .for_bid(&transition.key.bid_id)
                .for_carrier(transition.key.sender_name.clone())
                .with_metadata("from", transition.previous)
                .with_metadata("to", transition.next),
            );
        }

        Ok(report)
    }

    pub fn purge_rejected(&self, snapshot: &[StatusEdit]) -> Result<PurgeOutcome, ApplicationError> {
        let loaded = load_records::<Offer>(self.store.as_ref(), Collection::Offers)?;
        let outcome = purge_rejected(loaded.items, snapshot);
        save_records(self.store.as_ref(), Collection::Offers, &outcome.kept, Some(&loaded.revision))?;

        info!(
            event_name = "offers.purged",
            removed = outcome.removed.len(),
            kept = outcome.kept.len(),
            "rejected offers purged"
        );
        self.audit.emit(
            self.event(
                &Uuid::new_v4().to_string(),
                "offers.purged",
                AuditCategory::Reconciliation,
                AuditOutcome::Success,
            )
            .with_metadata("removed", outcome.removed.len()),
        );
        Ok(outcome)
    }

    /// Returns the status the bid had before.
    pub fn advance_bid_status(
        &self,
        bid_id: &BidId,
        status: BidStatus,
    ) -> Result<BidStatus, ApplicationError> {
        let loaded = load_records::<Bid>(self.store.as_ref(), Collection::Bids)?;
        let mut bids = loaded.items;
        let bid = bids
            .iter_mut()
            .find(|bid| &bid.id == bid_id)
            .ok_or_else(|| ApplicationError::NotFound { entity: "bid", id: bid_id.to_string() })?;
        let previous = bid.set_status(status);
        save_records(self.store.as_ref(), Collection::Bids, &bids, Some(&loaded.revision))?;

        self.audit.emit(
            self.event(
                &Uuid::new_v4().to_string(),
                "bids.status_changed",
                AuditCategory::Reconciliation,
                AuditOutcome::Success,
            )
            .for_bid(bid_id)
            .with_metadata("from", previous)
            .with_metadata("to", status),
        );
        Ok(previous)
    }

    /// Materializes the contract for the offer keyed by (`bid_id`, `sender_name`).
    ///
    /// The bid is looked up by the id carried in the offer. A missing offer
    /// or bid is reported as not found and nothing is written.
    pub fn generate_contract(
        &self,
        key: &OfferKey,
    ) -> Result<(Bid, Offer, ContractArtifact), ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        let offer = self
            .offers()?
            .into_iter()
            .find(|offer| &offer.key() == key)
            .ok_or_else(|| ApplicationError::NotFound { entity: "offer", id: key.to_string() })?;
        let bid = self
            .bids()?
            .into_iter()
            .find(|bid| bid.id == offer.bid_id)
            .ok_or_else(|| ApplicationError::NotFound {
                entity: "bid",
                id: offer.bid_id.to_string(),
            })?;
        let profiles =
            load_records::<CarrierProfile>(self.store.as_ref(), Collection::CarrierProfiles)?.items;

        let materializer = ContractMaterializer::new(
            self.renderer.as_ref(),
            self.artifacts.as_ref(),
            self.store.as_ref(),
            self.settings.contract_template.clone(),
        );
        let result = materializer.generate(&bid, &offer, &profiles, self.clock.now());

        let outcome = if result.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failed };
        let mut event = self
            .event(&correlation_id, "contracts.generated", AuditCategory::Contract, outcome)
            .for_bid(&bid.id)
            .for_carrier(offer.sender_name.clone());
        if let Err(error) = &result {
            event = event.with_metadata("error", error);
        }
        self.audit.emit(event);

        let artifact = result?;
        Ok((bid, offer, artifact))
    }

    /// Generates the contract and mails it to the offer's sender. A failed
    /// send keeps the generated contract and is reported in the result.
    pub fn send_contract(&self, key: &OfferKey) -> Result<ContractDispatch, ApplicationError> {
        let (bid, offer, artifact) = self.generate_contract(key)?;
        let mail = compose::contract_cover(&bid, &offer, artifact.archived_path.clone());
        let dispatch_error = match self.mail.send(&mail) {
            Ok(()) => None,
            Err(error) => {
                warn!(
                    event_name = "contracts.dispatch_failed",
                    bid_id = %bid.id,
                    carrier = %offer.sender_name,
                    error = %error,
                    "contract mail failed"
                );
                Some(error.to_string())
            }
        };

        Ok(ContractDispatch { artifact, recipient: mail.to, dispatch_error })
    }
}
