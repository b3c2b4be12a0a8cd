use clap::Args;

use freightq_core::config::LoadOptions;
use freightq_core::domain::offer::OfferStatus;
use freightq_core::reconcile::ComparisonFilter;

use super::{bad_request, with_application, CommandResult};

const COMMAND: &str = "compare";

#[derive(Clone, Debug, Default, Args)]
pub struct CompareArgs {
    #[arg(long, help = "Keep offers whose request id contains this text")]
    pub bid: Option<String>,
    #[arg(long, help = "Keep offers from this carrier")]
    pub sender: Option<String>,
    #[arg(long, help = "Keep offers in this status")]
    pub status: Option<String>,
    #[arg(long, help = "Hide offers that match no stored request")]
    pub matched_only: bool,
}

pub fn run(options: LoadOptions, args: CompareArgs) -> CommandResult {
    let status = match args.status.as_deref().map(str::parse::<OfferStatus>).transpose() {
        Ok(status) => status,
        Err(error) => return bad_request(COMMAND, error.to_string()),
    };
    let filter = ComparisonFilter {
        bid_id_contains: args.bid,
        sender_name: args.sender,
        status,
        matched_only: args.matched_only,
    };

    with_application(COMMAND, options, |application| {
        match application.desk.compare(&filter) {
            Ok(comparison) => CommandResult::success_with(
                COMMAND,
                format!(
                    "{} offer(s) in {} at rates of {}",
                    comparison.rows.len(),
                    comparison.reference,
                    comparison.rates_as_of
                ),
                &comparison,
            ),
            Err(error) => CommandResult::from_application(COMMAND, error),
        }
    })
}
