//! Carrier list maintenance.
//!
//! Import and export pick the format from the file extension: `.csv` with a
//! header row (`name`, `email`, optional `notes`) or `.json` with an array of
//! carrier objects. An import replaces the whole list.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;
use thiserror::Error;

use freightq_core::config::LoadOptions;
use freightq_core::domain::carrier::Carrier;

use super::{bad_request, with_application, CommandResult};

const COMMAND: &str = "carriers";

#[derive(Debug, Subcommand)]
pub enum CarriersCommand {
    #[command(about = "Show the carrier list")]
    List,
    #[command(about = "Add one carrier")]
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, help = "One or more addresses separated by `;` or `,`")]
        email: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    #[command(about = "Replace the carrier list from a .csv or .json file")]
    Import { file: PathBuf },
    #[command(about = "Write the carrier list to a .csv or .json file")]
    Export { file: PathBuf },
}

#[derive(Debug, Error)]
pub enum RosterFileError {
    #[error("unsupported file `{0}`, expected .csv or .json")]
    UnsupportedFormat(PathBuf),
    #[error("could not read or write `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("bad csv in `{path}`: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("bad json in `{path}`: {source}")]
    Json { path: PathBuf, source: serde_json::Error },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RosterFormat {
    Csv,
    Json,
}

impl RosterFormat {
    fn of(path: &Path) -> Result<Self, RosterFileError> {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some(extension) if extension.eq_ignore_ascii_case("csv") => Ok(Self::Csv),
            Some(extension) if extension.eq_ignore_ascii_case("json") => Ok(Self::Json),
            _ => Err(RosterFileError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

pub fn read_roster(path: &Path) -> Result<Vec<Carrier>, RosterFileError> {
    match RosterFormat::of(path)? {
        RosterFormat::Csv => {
            let csv_error = |source| RosterFileError::Csv { path: path.to_path_buf(), source };
            let mut reader =
                csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path).map_err(csv_error)?;
            reader.deserialize().collect::<Result<Vec<Carrier>, _>>().map_err(csv_error)
        }
        RosterFormat::Json => {
            let raw = fs::read_to_string(path)
                .map_err(|source| RosterFileError::Io { path: path.to_path_buf(), source })?;
            serde_json::from_str(&raw)
                .map_err(|source| RosterFileError::Json { path: path.to_path_buf(), source })
        }
    }
}

pub fn write_roster(path: &Path, carriers: &[Carrier]) -> Result<(), RosterFileError> {
    match RosterFormat::of(path)? {
        RosterFormat::Csv => {
            let csv_error = |source| RosterFileError::Csv { path: path.to_path_buf(), source };
            let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
            for carrier in carriers {
                writer.serialize(carrier).map_err(csv_error)?;
            }
            writer
                .flush()
                .map_err(|source| RosterFileError::Io { path: path.to_path_buf(), source })
        }
        RosterFormat::Json => {
            let json = serde_json::to_string_pretty(carriers)
                .map_err(|source| RosterFileError::Json { path: path.to_path_buf(), source })?;
            fs::write(path, json)
                .map_err(|source| RosterFileError::Io { path: path.to_path_buf(), source })
        }
    }
}

#[derive(Debug, Serialize)]
struct RosterSummary {
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<PathBuf>,
}

pub fn run(options: LoadOptions, command: CarriersCommand) -> CommandResult {
    match command {
        CarriersCommand::List => with_application(COMMAND, options, |application| {
            match application.desk.carriers() {
                Ok(carriers) => CommandResult::success_with(
                    COMMAND,
                    format!("{} carrier(s)", carriers.len()),
                    &carriers,
                ),
                Err(error) => CommandResult::from_application(COMMAND, error),
            }
        }),
        CarriersCommand::Add { name, email, notes } => {
            let carrier =
                Carrier { name: name.trim().to_owned(), email: email.trim().to_owned(), notes };
            with_application(COMMAND, options, |application| {
                let name = carrier.name.clone();
                match application.desk.add_carrier(carrier) {
                    Ok(count) => CommandResult::success_with(
                        COMMAND,
                        format!("carrier `{name}` added"),
                        &RosterSummary { count, file: None },
                    ),
                    Err(error) => CommandResult::from_application(COMMAND, error),
                }
            })
        }
        CarriersCommand::Import { file } => {
            let carriers = match read_roster(&file) {
                Ok(carriers) => carriers,
                Err(error) => return bad_request(COMMAND, error.to_string()),
            };
            with_application(COMMAND, options, |application| {
                match application.desk.replace_carriers(carriers) {
                    Ok(count) => CommandResult::success_with(
                        COMMAND,
                        format!("{count} carrier(s) imported from `{}`", file.display()),
                        &RosterSummary { count, file: Some(file.clone()) },
                    ),
                    Err(error) => CommandResult::from_application(COMMAND, error),
                }
            })
        }
        CarriersCommand::Export { file } => with_application(COMMAND, options, |application| {
            let carriers = match application.desk.carriers() {
                Ok(carriers) => carriers,
                Err(error) => return CommandResult::from_application(COMMAND, error),
            };
            match write_roster(&file, &carriers) {
                Ok(()) => CommandResult::success_with(
                    COMMAND,
                    format!("{} carrier(s) exported to `{}`", carriers.len(), file.display()),
                    &RosterSummary { count: carriers.len(), file: Some(file.clone()) },
                ),
                Err(error) => bad_request(COMMAND, error.to_string()),
            }
        }),
    }
}
