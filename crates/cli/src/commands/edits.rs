//! Status edits given on the command line or as a JSON file.
//!
//! The file holds an array of `{"bid_id", "sender_name", "status"}` objects.
//! Status names are accepted in English or Russian.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use serde::Deserialize;
use thiserror::Error;

use freightq_core::domain::offer::{OfferKey, OfferStatus};
use freightq_core::errors::DomainError;
use freightq_core::reconcile::StatusEdit;

#[derive(Clone, Debug, Default, Args)]
pub struct EditArgs {
    #[arg(long, help = "Request id of the offer")]
    pub bid: Option<String>,
    #[arg(long, help = "Carrier name as shown in the comparison")]
    pub sender: Option<String>,
    #[arg(long, help = "New offer status, e.g. accepted or Принято")]
    pub status: Option<String>,
    #[arg(long, conflicts_with_all = ["bid", "sender", "status"], help = "JSON file with a list of edits")]
    pub edits: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("either --edits or all of --bid, --sender and --status are required")]
    Incomplete,
    #[error("could not read `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error(transparent)]
    Status(#[from] DomainError),
}

#[derive(Debug, Deserialize)]
struct EditSpec {
    bid_id: String,
    sender_name: String,
    status: String,
}

impl EditSpec {
    fn into_edit(self) -> Result<StatusEdit, EditError> {
        let status: OfferStatus = self.status.parse()?;
        Ok(StatusEdit::new(OfferKey::new(self.bid_id, self.sender_name), status))
    }
}

pub fn collect(args: &EditArgs) -> Result<Vec<StatusEdit>, EditError> {
    if let Some(path) = &args.edits {
        let raw = fs::read_to_string(path)
            .map_err(|source| EditError::Read { path: path.clone(), source })?;
        let specs: Vec<EditSpec> = serde_json::from_str(&raw)
            .map_err(|source| EditError::Parse { path: path.clone(), source })?;
        return specs.into_iter().map(EditSpec::into_edit).collect();
    }

    match (&args.bid, &args.sender, &args.status) {
        (Some(bid_id), Some(sender_name), Some(status)) => Ok(vec![EditSpec {
            bid_id: bid_id.clone(),
            sender_name: sender_name.clone(),
            status: status.clone(),
        }
        .into_edit()?]),
        _ => Err(EditError::Incomplete),
    }
}
