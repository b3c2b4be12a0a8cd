//! Ranking of offers per request and the offer status lifecycle.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::bid::BidId;
use crate::domain::catalog::{CostItem, CostLine};
use crate::domain::offer::{Offer, OfferKey, OfferStatus};
use crate::ports::MailError;
use crate::rates::{to_reference, RateOrigin, RateTable};

pub const DEFAULT_DEBOUNCE_SECS: i64 = 60;

pub fn default_debounce() -> Duration {
    Duration::seconds(DEFAULT_DEBOUNCE_SECS)
}

/// True when a change notification must be withheld.
///
/// A timestamp in the future counts as recent.
pub fn should_suppress(
    now: DateTime<Utc>,
    last_change: Option<DateTime<Utc>>,
    window: Duration,
) -> bool {
    match last_change {
        Some(last) => now - last < window,
        None => false,
    }
}

pub fn offer_total(offer: &Offer, rates: &RateTable) -> Decimal {
    offer.costs.iter().map(|line| to_reference(line.amount, &line.currency, rates)).sum()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComparisonFilter {
    /// Case-insensitive substring of the request identifier.
    pub bid_id_contains: Option<String>,
    pub sender_name: Option<String>,
    pub status: Option<OfferStatus>,
    pub matched_only: bool,
}

impl ComparisonFilter {
    fn admits(&self, offer: &Offer, matched: bool) -> bool {
        self.bid_id_contains.as_deref().map_or(true, |needle| {
            offer.bid_id.as_str().to_lowercase().contains(&needle.trim().to_lowercase())
        })
            && self.sender_name.as_deref().map_or(true, |sender| offer.sender_name == sender)
            && self.status.map_or(true, |status| offer.status == status)
            && (!self.matched_only || matched)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComparisonRow {
    pub key: OfferKey,
    pub order_number: String,
    pub received_at: DateTime<Utc>,
    pub status: OfferStatus,
    pub costs: Vec<CostLine>,
    /// Per catalogue item, already in the reference currency.
    pub reference_costs: BTreeMap<CostItem, Decimal>,
    pub total_reference: Decimal,
    pub best: bool,
    /// False when the request identifier is unknown to the bid collection.
    pub matched: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub reference: String,
    pub rates_as_of: String,
    pub rate_origin: RateOrigin,
    pub rows: Vec<ComparisonRow>,
}

/// Builds the comparison view: one row per admitted offer, grouped by request
/// and ordered by reference total. Every row sharing the minimum total of its
/// group is marked best.
pub fn rank(
    offers: &[Offer],
    rates: &RateTable,
    known_bids: &HashSet<BidId>,
    filter: &ComparisonFilter,
) -> Comparison {
    let mut rows: Vec<ComparisonRow> = offers
        .iter()
        .filter_map(|offer| {
            let matched = offer.is_matched() && known_bids.contains(&offer.bid_id);
            if !filter.admits(offer, matched) {
                return None;
            }
            let mut reference_costs = BTreeMap::new();
            for line in &offer.costs {
                *reference_costs.entry(line.item_name).or_insert(Decimal::ZERO) +=
                    to_reference(line.amount, &line.currency, rates);
            }
            Some(ComparisonRow {
                key: offer.key(),
                order_number: offer.order_number.clone(),
                received_at: offer.received_at,
                status: offer.status,
                total_reference: reference_costs.values().copied().sum(),
                costs: offer.costs.clone(),
                reference_costs,
                best: false,
                matched,
            })
        })
        .collect();

    let mut minimum: HashMap<BidId, Decimal> = HashMap::new();
    for row in rows.iter().filter(|row| !row.key.bid_id.is_empty()) {
        minimum
            .entry(row.key.bid_id.clone())
            .and_modify(|current| *current = (*current).min(row.total_reference))
            .or_insert(row.total_reference);
    }
    for row in &mut rows {
        row.best = minimum.get(&row.key.bid_id) == Some(&row.total_reference);
    }

    rows.sort_by(|left, right| {
        left.key
            .bid_id
            .cmp(&right.key.bid_id)
            .then(left.total_reference.cmp(&right.total_reference))
            .then(left.received_at.cmp(&right.received_at))
    });

    Comparison {
        reference: rates.reference.clone(),
        rates_as_of: rates.as_of.clone(),
        rate_origin: rates.origin,
        rows,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusEdit {
    pub key: OfferKey,
    pub status: OfferStatus,
}

impl StatusEdit {
    pub fn new(key: OfferKey, status: OfferStatus) -> Self {
        Self { key, status }
    }
}

/// Delivers the carrier-facing notice for an offer that reached a terminal status.
pub trait StatusNotifier {
    fn notify(&self, offer: &Offer) -> Result<(), MailError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Unchanged,
    /// Status changed to a non-terminal value; nothing to announce.
    Updated,
    Dispatched,
    DebounceSuppressed { last_change: DateTime<Utc> },
    SenderAlreadyNotified,
    DispatchFailed { error: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransitionReport {
    pub key: OfferKey,
    pub previous: OfferStatus,
    pub next: OfferStatus,
    pub outcome: TransitionOutcome,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusPassReport {
    pub transitions: Vec<TransitionReport>,
    /// Set when the updated offers could not be stored. Notices listed as
    /// dispatched have already gone out.
    pub persistence_error: Option<String>,
}

impl StatusPassReport {
    pub fn dispatched(&self) -> usize {
        self.count(|outcome| matches!(outcome, TransitionOutcome::Dispatched))
    }

    pub fn changed(&self) -> usize {
        self.count(|outcome| !matches!(outcome, TransitionOutcome::Unchanged))
    }

    pub fn failures(&self) -> impl Iterator<Item = &TransitionReport> {
        self.transitions
            .iter()
            .filter(|report| matches!(report.outcome, TransitionOutcome::DispatchFailed { .. }))
    }

    pub fn warnings(&self) -> impl Iterator<Item = &TransitionReport> {
        self.transitions.iter().filter(|report| {
            matches!(
                report.outcome,
                TransitionOutcome::DebounceSuppressed { .. } | TransitionOutcome::SenderAlreadyNotified
            )
        })
    }

    fn count(&self, predicate: impl Fn(&TransitionOutcome) -> bool) -> usize {
        self.transitions.iter().filter(|report| predicate(&report.outcome)).count()
    }
}

/// Applies operator status edits to `offers` in place.
///
/// An edit touches every offer sharing its key. Entering a terminal status
/// from a different one attempts a single notification, unless the offer
/// changed within `window` or its sender was already notified during this
/// pass. A failed dispatch is recorded and the pass continues.
pub fn apply_status_edits(
    offers: &mut [Offer],
    edits: &[StatusEdit],
    now: DateTime<Utc>,
    window: Duration,
    notifier: &dyn StatusNotifier,
) -> StatusPassReport {
    let requested: HashMap<&OfferKey, OfferStatus> =
        edits.iter().map(|edit| (&edit.key, edit.status)).collect();
    let mut notified_senders: HashSet<String> = HashSet::new();
    let mut report = StatusPassReport::default();

    for offer in offers.iter_mut() {
        let key = offer.key();
        let Some(&next) = requested.get(&key) else {
            continue;
        };
        let previous = offer.status;
        offer.status = next;

        let outcome = if previous == next {
            TransitionOutcome::Unchanged
        } else if !next.is_terminal() {
            TransitionOutcome::Updated
        } else if should_suppress(now, offer.last_status_change, window) {
            let last_change = offer.last_status_change.unwrap_or(now);
            warn!(
                event_name = "offers.status.debounce_suppressed",
                offer = %key,
                last_change = %last_change,
                "status notification withheld, offer changed too recently"
            );
            TransitionOutcome::DebounceSuppressed { last_change }
        } else if notified_senders.contains(&offer.sender_name) {
            TransitionOutcome::SenderAlreadyNotified
        } else {
            match notifier.notify(offer) {
                Ok(()) => {
                    offer.last_status_change = Some(now);
                    notified_senders.insert(offer.sender_name.clone());
                    info!(
                        event_name = "offers.status.notified",
                        offer = %key,
                        status = %next,
                        "status notification dispatched"
                    );
                    TransitionOutcome::Dispatched
                }
                Err(error) => {
                    warn!(
                        event_name = "offers.status.dispatch_failed",
                        offer = %key,
                        error = %error,
                        "status notification failed"
                    );
                    TransitionOutcome::DispatchFailed { error: error.to_string() }
                }
            }
        };

        report.transitions.push(TransitionReport { key, previous, next, outcome });
    }

    report
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub kept: Vec<Offer>,
    pub removed: Vec<Offer>,
}

/// Removes every persisted offer whose key the operator's snapshot marks
/// rejected. Persisted status is not consulted.
pub fn purge_rejected(persisted: Vec<Offer>, snapshot: &[StatusEdit]) -> PurgeOutcome {
    let rejected: HashSet<&OfferKey> = snapshot
        .iter()
        .filter(|edit| edit.status == OfferStatus::Rejected)
        .map(|edit| &edit.key)
        .collect();

    let (removed, kept) = persisted.into_iter().partition(|offer| rejected.contains(&offer.key()));
    PurgeOutcome { kept, removed }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;

    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        apply_status_edits, default_debounce, purge_rejected, rank, should_suppress,
        ComparisonFilter, StatusEdit, StatusNotifier, TransitionOutcome,
    };
    use crate::domain::bid::BidId;
    use crate::domain::catalog::{CostItem, CostLine};
    use crate::domain::offer::{Offer, OfferKey, OfferStatus, ORDER_NUMBER_NOT_FOUND};
    use crate::ports::MailError;
    use crate::rates::RateTable;

    fn offer(bid: &str, sender: &str, costs: Vec<CostLine>) -> Offer {
        Offer {
            sender_name: sender.to_owned(),
            sender_address: format!("{}@carrier.test", sender.to_lowercase()),
            bid_id: BidId::new(bid),
            received_at: Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
            subject: String::new(),
            order_number: ORDER_NUMBER_NOT_FOUND.to_owned(),
            rate: None,
            conditions: None,
            costs,
            status: OfferStatus::New,
            last_status_change: None,
        }
    }

    fn rub(amount: i64) -> Vec<CostLine> {
        vec![CostLine::new(CostItem::SeaFreight, Decimal::new(amount, 0), "RUB")]
    }

    fn rates() -> RateTable {
        RateTable::new("RUB", "2024-01-02").with_rate("USD", Decimal::new(90, 0))
    }

    fn known(ids: &[&str]) -> HashSet<BidId> {
        ids.iter().map(|id| BidId::new(*id)).collect()
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: RefCell<Vec<OfferKey>>,
        fail_for: Option<String>,
    }

    impl StatusNotifier for RecordingNotifier {
        fn notify(&self, offer: &Offer) -> Result<(), MailError> {
            if self.fail_for.as_deref() == Some(offer.sender_name.as_str()) {
                return Err(MailError::Send {
                    to: offer.sender_address.clone(),
                    message: "relay refused".to_owned(),
                });
            }
            self.sent.borrow_mut().push(offer.key());
            Ok(())
        }
    }

    #[test]
    fn cheapest_offer_in_group_is_best() {
        let offers = vec![offer("SHIP-1", "A", rub(1200)), offer("SHIP-1", "B", rub(1000))];
        let view = rank(&offers, &rates(), &known(&["SHIP-1"]), &ComparisonFilter::default());

        assert_eq!(view.rows[0].key.sender_name, "B");
        assert!(view.rows[0].best);
        assert!(!view.rows[1].best);
        assert_eq!(view.rows[1].total_reference, Decimal::new(1200, 0));
    }

    #[test]
    fn tied_minimum_marks_every_tied_offer() {
        let offers = vec![
            offer("SHIP-1", "A", rub(1000)),
            offer("SHIP-1", "B", rub(1000)),
            offer("SHIP-1", "C", rub(1001)),
        ];
        let view = rank(&offers, &rates(), &known(&["SHIP-1"]), &ComparisonFilter::default());
        let best: Vec<_> =
            view.rows.iter().filter(|row| row.best).map(|row| row.key.sender_name.as_str()).collect();
        assert_eq!(best, vec!["A", "B"]);
    }

    #[test]
    fn totals_convert_each_line_and_groups_rank_independently() {
        let usd = vec![
            CostLine::new(CostItem::SeaFreight, Decimal::new(10, 0), "USD"),
            CostLine::new(CostItem::PreCarriage, Decimal::new(100, 0), "RUB"),
        ];
        let offers = vec![offer("SHIP-1", "A", usd), offer("SHIP-2", "B", rub(5000))];
        let view = rank(&offers, &rates(), &known(&["SHIP-1"]), &ComparisonFilter::default());

        assert_eq!(view.rows[0].total_reference, Decimal::new(1000, 0));
        assert_eq!(view.rows[0].reference_costs[&CostItem::SeaFreight], Decimal::new(900, 0));
        assert_eq!(view.rows[0].costs.len(), 2);
        assert!(view.rows.iter().all(|row| row.best));
        assert!(view.rows[0].matched);
        assert!(!view.rows[1].matched, "dangling request id is shown as unmatched");
    }

    #[test]
    fn filter_limits_rows() {
        let offers = vec![
            offer("SHIP-1", "A", rub(1)),
            offer("SHIP-2", "B", rub(2)),
            offer("OTHER-2", "C", rub(3)),
        ];
        let filter = ComparisonFilter { matched_only: true, ..ComparisonFilter::default() };
        let view = rank(&offers, &rates(), &known(&["SHIP-2"]), &filter);
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].key.sender_name, "B");

        let filter =
            ComparisonFilter { bid_id_contains: Some("ship".to_owned()), ..ComparisonFilter::default() };
        let view = rank(&offers, &rates(), &known(&[]), &filter);
        assert_eq!(view.rows.len(), 2);
        assert!(view.rows.iter().all(|row| row.best));
    }

    #[test]
    fn suppression_window_is_half_open() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        let window = default_debounce();
        assert!(!should_suppress(now, None, window));
        assert!(should_suppress(now, Some(now - Duration::seconds(59)), window));
        assert!(!should_suppress(now, Some(now - Duration::seconds(60)), window));
        assert!(should_suppress(now, Some(now + Duration::seconds(5)), window));
    }

    #[test]
    fn accepting_twice_within_a_minute_dispatches_once() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        let notifier = RecordingNotifier::default();
        let key = OfferKey::new("SHIP-1", "A");
        let mut offers = vec![offer("SHIP-1", "A", rub(1))];

        let accept = [StatusEdit::new(key.clone(), OfferStatus::Accepted)];
        let first = apply_status_edits(&mut offers, &accept, start, default_debounce(), &notifier);
        assert_eq!(first.dispatched(), 1);
        assert_eq!(offers[0].last_status_change, Some(start));

        let reset = [StatusEdit::new(key.clone(), OfferStatus::New)];
        apply_status_edits(&mut offers, &reset, start, default_debounce(), &notifier);

        let later = start + Duration::seconds(30);
        let second = apply_status_edits(&mut offers, &accept, later, default_debounce(), &notifier);
        assert!(matches!(
            second.transitions[0].outcome,
            TransitionOutcome::DebounceSuppressed { last_change } if last_change == start
        ));
        assert_eq!(notifier.sent.borrow().len(), 1);
        assert_eq!(offers[0].status, OfferStatus::Accepted);
        assert_eq!(offers[0].last_status_change, Some(start));
    }

    #[test]
    fn one_notice_per_sender_and_failures_do_not_stop_the_pass() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        let notifier = RecordingNotifier { fail_for: Some("B".to_owned()), ..Default::default() };
        let mut offers = vec![
            offer("SHIP-1", "A", rub(1)),
            offer("SHIP-1", "B", rub(1)),
            offer("SHIP-2", "A", rub(1)),
            offer("SHIP-2", "C", rub(1)),
        ];
        let edits = [
            StatusEdit::new(OfferKey::new("SHIP-1", "A"), OfferStatus::Rejected),
            StatusEdit::new(OfferKey::new("SHIP-1", "B"), OfferStatus::Accepted),
            StatusEdit::new(OfferKey::new("SHIP-2", "A"), OfferStatus::Accepted),
            StatusEdit::new(OfferKey::new("SHIP-2", "C"), OfferStatus::InProgress),
        ];

        let report = apply_status_edits(&mut offers, &edits, now, default_debounce(), &notifier);
        let outcomes: Vec<_> = report.transitions.iter().map(|t| t.outcome.clone()).collect();

        assert_eq!(outcomes[0], TransitionOutcome::Dispatched);
        assert!(matches!(outcomes[1], TransitionOutcome::DispatchFailed { .. }));
        assert_eq!(outcomes[2], TransitionOutcome::SenderAlreadyNotified);
        assert_eq!(outcomes[3], TransitionOutcome::Updated);
        assert!(offers[1].last_status_change.is_none());
        assert_eq!(offers[1].status, OfferStatus::Accepted);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn purge_uses_snapshot_statuses_only() {
        let mut persisted = vec![
            offer("SHIP-1", "X", rub(1)),
            offer("SHIP-1", "Y", rub(1)),
            offer("SHIP-2", "Z", rub(1)),
        ];
        persisted[2].status = OfferStatus::Rejected;

        let snapshot = [
            StatusEdit::new(OfferKey::new("SHIP-1", "X"), OfferStatus::Rejected),
            StatusEdit::new(OfferKey::new("SHIP-1", "Y"), OfferStatus::Accepted),
        ];
        let outcome = purge_rejected(persisted, &snapshot);

        assert_eq!(outcome.removed.len(), 1);
        assert_eq!(outcome.removed[0].sender_name, "X");
        let kept: Vec<_> = outcome.kept.iter().map(|offer| offer.sender_name.as_str()).collect();
        assert_eq!(kept, vec!["Y", "Z"]);
    }
}
