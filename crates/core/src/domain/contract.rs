use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::bid::BidId;

pub const CONTRACT_STATUS_GENERATED: &str = "generated";

/// Append-only log entry written once per materialized contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub bid_id: BidId,
    /// Bid id carried by the offer. Diverges from `bid_id` on a mismatched pair.
    pub offer_bid_id: BidId,
    pub carrier: String,
    pub generated_at: DateTime<Utc>,
    pub file_path: String,
    pub status: String,
}
