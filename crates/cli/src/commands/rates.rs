use freightq_core::config::LoadOptions;

use super::{with_application, CommandResult};

const COMMAND: &str = "rates";

pub fn run(options: LoadOptions, refresh: bool) -> CommandResult {
    with_application(COMMAND, options, |application| {
        let table =
            if refresh { application.desk.refresh_rates() } else { application.desk.rates() };
        CommandResult::success_with(
            COMMAND,
            format!("{} rate(s) in {} as of {}", table.rates.len(), table.reference, table.as_of),
            &table,
        )
    })
}
