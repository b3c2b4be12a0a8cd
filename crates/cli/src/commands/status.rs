use freightq_core::config::LoadOptions;

use super::edits::{collect, EditArgs};
use super::{bad_request, with_application, CommandResult};

const COMMAND: &str = "status";

pub fn run(options: LoadOptions, args: EditArgs) -> CommandResult {
    let edits = match collect(&args) {
        Ok(edits) => edits,
        Err(error) => return bad_request(COMMAND, error.to_string()),
    };

    with_application(COMMAND, options, |application| {
        let report = match application.desk.apply_status_edits(&edits) {
            Ok(report) => report,
            Err(error) => return CommandResult::from_application(COMMAND, error),
        };

        let failed = report.failures().count();
        let message = format!(
            "{} offer(s) changed, {} notice(s) sent, {} suppressed",
            report.changed(),
            report.dispatched(),
            report.warnings().count()
        );
        if let Some(error) = &report.persistence_error {
            return CommandResult::partial(
                COMMAND,
                format!("{message}; changes were not stored: {error}"),
                &report,
            );
        }
        if failed == 0 {
            CommandResult::success_with(COMMAND, message, &report)
        } else {
            CommandResult::partial(COMMAND, format!("{message}, {failed} failed"), &report)
        }
    })
}
