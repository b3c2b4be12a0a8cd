use serde::Serialize;

use freightq_core::config::LoadOptions;

use super::edits::{collect, EditArgs};
use super::{bad_request, with_application, CommandResult};

const COMMAND: &str = "purge";

#[derive(Debug, Serialize)]
struct PurgeSummary {
    removed: Vec<String>,
    kept: usize,
}

/// Removes offers the given edits mark as rejected. The stored status is not consulted.
pub fn run(options: LoadOptions, args: EditArgs) -> CommandResult {
    let snapshot = match collect(&args) {
        Ok(edits) => edits,
        Err(error) => return bad_request(COMMAND, error.to_string()),
    };

    with_application(COMMAND, options, |application| {
        match application.desk.purge_rejected(&snapshot) {
            Ok(outcome) => {
                let summary = PurgeSummary {
                    removed: outcome.removed.iter().map(|offer| offer.key().to_string()).collect(),
                    kept: outcome.kept.len(),
                };
                CommandResult::success_with(
                    COMMAND,
                    format!("{} rejected offer(s) removed", summary.removed.len()),
                    &summary,
                )
            }
            Err(error) => CommandResult::from_application(COMMAND, error),
        }
    })
}
