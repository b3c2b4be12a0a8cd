use freightq_core::config::LoadOptions;

use super::{with_application, CommandResult};

const COMMAND: &str = "ingest";

pub fn run(options: LoadOptions, folder: Option<String>) -> CommandResult {
    with_application(COMMAND, options, |application| {
        let report = match application.desk.ingest_offers(folder.as_deref()) {
            Ok(report) => report,
            Err(error) => return CommandResult::from_application(COMMAND, error),
        };

        if let Some(error) = &report.persistence_error {
            return CommandResult::partial(
                COMMAND,
                format!("{} offer(s) parsed but not stored: {error}", report.accepted.len()),
                &report,
            );
        }

        let message = format!(
            "{} offer(s) stored, {} message(s) rejected",
            report.accepted.len(),
            report.rejected.len()
        );
        if report.mark_read_failures.is_empty() {
            CommandResult::success_with(COMMAND, message, &report)
        } else {
            CommandResult::partial(
                COMMAND,
                format!("{message}; {} message(s) stay unread", report.mark_read_failures.len()),
                &report,
            )
        }
    })
}
