pub mod bootstrap;
pub mod cbr;
pub mod commands;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use freightq_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat, RateProvider};

use commands::carriers::CarriersCommand;
use commands::compare::CompareArgs;
use commands::contract::ContractArgs;
use commands::edits::EditArgs;
use commands::submit::SubmitArgs;
use commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "freightq",
    about = "Freight quote desk",
    long_about = "Send transport requests to carriers, ingest their replies, compare offers in one currency, and issue contracts.",
    after_help = "Examples:\n  freightq ingest\n  freightq compare --matched-only\n  freightq status --bid SHIP-20240101-1200 --sender \"Baltic Lines\" --status accepted\n  freightq contract --bid SHIP-20240101-1200 --sender \"Baltic Lines\" --send"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (default: freightq.toml or config/freightq.toml)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override storage.data_dir")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Override mail.spool_dir")]
    spool_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, value_parser = parse_rate_provider, help = "Override rates.provider (cbr|fixed)")]
    rates_provider: Option<RateProvider>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "List, add, import or export carriers")]
    Carriers {
        #[command(subcommand)]
        command: CarriersCommand,
    },
    #[command(about = "Store a new transport request and mail it to every carrier")]
    Submit(SubmitArgs),
    #[command(about = "Parse unread carrier replies into offers")]
    Ingest {
        #[arg(long, help = "Mailbox folder (default: mail.inbox_folder)")]
        folder: Option<String>,
    },
    #[command(about = "Rank offers by total cost in the reference currency")]
    Compare(CompareArgs),
    #[command(about = "Change offer statuses and notify carriers")]
    Status(EditArgs),
    #[command(about = "Delete offers marked rejected in the given edits, whatever their stored status")]
    Purge(EditArgs),
    #[command(about = "Generate the contract for an offer")]
    Contract(ContractArgs),
    #[command(name = "bid-status", about = "Set the lifecycle status of a request")]
    BidStatus {
        #[arg(long)]
        bid: String,
        #[arg(long)]
        status: String,
    },
    #[command(about = "Show exchange rates used for comparison")]
    Rates {
        #[arg(long, help = "Drop the cached table and fetch again")]
        refresh: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, storage, mail spool, templates and the rate provider")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

fn parse_rate_provider(value: &str) -> Result<RateProvider, String> {
    value.parse().map_err(|error: freightq_core::config::ConfigError| error.to_string())
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                data_dir: self.data_dir.clone(),
                spool_dir: self.spool_dir.clone(),
                log_level: self.log_level.clone(),
                rates_provider: self.rates_provider,
            },
        }
    }
}

pub fn execute(cli: Cli) -> CommandResult {
    let options = cli.load_options();
    match cli.command {
        Command::Carriers { command } => commands::carriers::run(options, command),
        Command::Submit(args) => commands::submit::run(options, args),
        Command::Ingest { folder } => commands::ingest::run(options, folder),
        Command::Compare(args) => commands::compare::run(options, args),
        Command::Status(args) => commands::status::run(options, args),
        Command::Purge(args) => commands::purge::run(options, args),
        Command::Contract(args) => commands::contract::run(options, args),
        Command::BidStatus { bid, status } => commands::bid_status::run(options, bid, status),
        Command::Rates { refresh } => commands::rates::run(options, refresh),
        Command::Config => commands::config::run(options),
        Command::Doctor { json } => commands::doctor::run(options, json),
    }
}

/// Logs go to stderr; stdout carries the command result.
fn init_logging(options: &LoadOptions) -> anyhow::Result<()> {
    let (level, format) = match AppConfig::load(options.clone()) {
        Ok(config) => (config.logging.level, config.logging.format),
        Err(_) => ("info".to_string(), LogFormat::Compact),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder =
        tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(io::stderr);

    match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|error| anyhow::anyhow!("failed to initialize logging: {error}"))
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Err(error) = init_logging(&cli.load_options()) {
        eprintln!("{error}");
    }

    let result = execute(cli);
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
