use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Args;
use rust_decimal::Decimal;

use freightq_core::config::LoadOptions;
use freightq_core::domain::bid::BidDetails;
use freightq_core::domain::catalog::{is_currency_code, CostItem, CostLine};
use freightq_core::orchestrator::{AttachmentCandidate, BidDraft};

use super::{bad_request, with_application, CommandResult};

const COMMAND: &str = "submit";

#[derive(Clone, Debug, Default, Args)]
pub struct SubmitArgs {
    #[arg(long, help = "Request id; derived from the current time when omitted")]
    pub id: Option<String>,
    #[arg(long, default_value = "")]
    pub order_number: String,
    #[arg(long)]
    pub country_from: String,
    #[arg(long, default_value = "")]
    pub incoterm: String,
    #[arg(long)]
    pub port_from: String,
    #[arg(long, default_value = "")]
    pub ready_date: String,
    #[arg(long, default_value = "")]
    pub container_type: String,
    #[arg(long)]
    pub cargo_type: String,
    #[arg(long, default_value = "")]
    pub cargo_description: String,
    #[arg(long, default_value = "")]
    pub delivery_method: String,
    #[arg(long, default_value = "")]
    pub hs_code: String,
    #[arg(long)]
    pub loading_address: String,
    #[arg(long)]
    pub payment_terms: String,
    #[arg(long, default_value = "")]
    pub notes: String,
    #[arg(long = "cost", value_name = "ITEM=AMOUNT CUR", help = "Target cost line, repeatable")]
    pub costs: Vec<String>,
    #[arg(long = "attach", value_name = "PATH", help = "File to attach, repeatable")]
    pub attachments: Vec<PathBuf>,
}

/// Parses `Sea freight=1850 USD`. The item label must be one of the
/// catalogue labels; decimal commas are accepted.
pub fn parse_cost(raw: &str) -> Result<CostLine, String> {
    let (label, value) =
        raw.rsplit_once('=').ok_or_else(|| format!("`{raw}` is not ITEM=AMOUNT CUR"))?;
    let item = CostItem::from_label(label)
        .ok_or_else(|| format!("`{}` is not a known cost item", label.trim()))?;
    let mut parts = value.split_whitespace();
    let (Some(amount), Some(currency), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("`{raw}` is not ITEM=AMOUNT CUR"));
    };
    let amount = Decimal::from_str(&amount.replace(',', "."))
        .map_err(|_| format!("`{amount}` is not an amount"))?;
    let currency = currency.to_ascii_uppercase();
    if !is_currency_code(&currency) {
        return Err(format!("`{currency}` is not a currency code"));
    }
    Ok(CostLine::new(item, amount, currency))
}

fn attachment_candidates(paths: &[PathBuf]) -> Result<Vec<AttachmentCandidate>, String> {
    paths
        .iter()
        .map(|path| {
            let metadata = fs::metadata(path)
                .map_err(|error| format!("attachment `{}`: {error}", path.display()))?;
            if !metadata.is_file() {
                return Err(format!("attachment `{}` is not a file", path.display()));
            }
            Ok(AttachmentCandidate { path: path.clone(), size_bytes: metadata.len() })
        })
        .collect()
}

pub fn run(options: LoadOptions, args: SubmitArgs) -> CommandResult {
    let costs = match args.costs.iter().map(|raw| parse_cost(raw)).collect::<Result<Vec<_>, _>>() {
        Ok(costs) => costs,
        Err(message) => return bad_request(COMMAND, message),
    };
    let attachments = match attachment_candidates(&args.attachments) {
        Ok(attachments) => attachments,
        Err(message) => return bad_request(COMMAND, message),
    };

    let draft = BidDraft {
        id: args.id,
        order_number: args.order_number,
        details: BidDetails {
            country_from: args.country_from,
            incoterm: args.incoterm,
            port_from: args.port_from,
            ready_date: args.ready_date,
            container_type: args.container_type,
            cargo_type: args.cargo_type,
            cargo_description: args.cargo_description,
            delivery_method: args.delivery_method,
            hs_code: args.hs_code,
            loading_address: args.loading_address,
            payment_terms: args.payment_terms,
            notes: args.notes,
        },
        costs,
    };

    with_application(COMMAND, options, |application| {
        match application.desk.submit_request(draft, &attachments) {
            Ok(report) if report.failures.is_empty() => CommandResult::success_with(
                COMMAND,
                format!("request {} sent to {} carrier(s)", report.bid_id, report.dispatched),
                &report,
            ),
            Ok(report) => CommandResult::partial(
                COMMAND,
                format!(
                    "request {} saved; {} sent, {} failed",
                    report.bid_id,
                    report.dispatched,
                    report.failures.len()
                ),
                &report,
            ),
            Err(error) => CommandResult::from_application(COMMAND, error),
        }
    })
}
