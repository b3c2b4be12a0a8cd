use serde::Serialize;

use freightq_core::config::LoadOptions;
use freightq_core::domain::bid::{BidId, BidStatus};

use super::{bad_request, with_application, CommandResult};

const COMMAND: &str = "bid-status";

#[derive(Debug, Serialize)]
struct BidStatusChange {
    bid_id: BidId,
    previous: BidStatus,
    status: BidStatus,
}

pub fn run(options: LoadOptions, bid: String, status: String) -> CommandResult {
    let status: BidStatus = match status.parse() {
        Ok(status) => status,
        Err(error) => return bad_request(COMMAND, format!("{error}")),
    };
    let bid_id = BidId::new(bid);

    with_application(COMMAND, options, |application| {
        match application.desk.advance_bid_status(&bid_id, status) {
            Ok(previous) => CommandResult::success_with(
                COMMAND,
                format!("request {bid_id}: {previous} -> {status}"),
                &BidStatusChange { bid_id: bid_id.clone(), previous, status },
            ),
            Err(error) => CommandResult::from_application(COMMAND, error),
        }
    })
}
