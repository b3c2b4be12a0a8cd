use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use freightq_core::config::LoadOptions;
use freightq_core::domain::contract::ContractRecord;
use freightq_core::domain::offer::OfferKey;

use super::{with_application, CommandResult};

const COMMAND: &str = "contract";

#[derive(Clone, Debug, Args)]
pub struct ContractArgs {
    #[arg(long, help = "Request id of the accepted offer")]
    pub bid: String,
    #[arg(long, help = "Carrier name of the accepted offer")]
    pub sender: String,
    #[arg(long, help = "Mail the contract to the carrier")]
    pub send: bool,
}

#[derive(Debug, Serialize)]
struct ContractSummary {
    record: ContractRecord,
    archived_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dispatch_error: Option<String>,
}

pub fn run(options: LoadOptions, args: ContractArgs) -> CommandResult {
    let key = OfferKey::new(args.bid, args.sender);

    with_application(COMMAND, options, |application| {
        if !args.send {
            return match application.desk.generate_contract(&key) {
                Ok((_, _, artifact)) => CommandResult::success_with(
                    COMMAND,
                    format!("contract for {key} written to {}", artifact.archived_path.display()),
                    &ContractSummary {
                        record: artifact.record,
                        archived_path: artifact.archived_path,
                        recipient: None,
                        dispatch_error: None,
                    },
                ),
                Err(error) => CommandResult::from_application(COMMAND, error),
            };
        }

        match application.desk.send_contract(&key) {
            Ok(dispatch) => {
                let summary = ContractSummary {
                    record: dispatch.artifact.record,
                    archived_path: dispatch.artifact.archived_path,
                    recipient: Some(dispatch.recipient),
                    dispatch_error: dispatch.dispatch_error,
                };
                match &summary.dispatch_error {
                    None => CommandResult::success_with(
                        COMMAND,
                        format!("contract for {key} sent to {}", summary.recipient.as_deref().unwrap_or_default()),
                        &summary,
                    ),
                    Some(error) => CommandResult::partial(
                        COMMAND,
                        format!("contract for {key} generated but not sent: {error}"),
                        &summary,
                    ),
                }
            }
            Err(error) => CommandResult::from_application(COMMAND, error),
        }
    })
}
