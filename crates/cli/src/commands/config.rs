use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use toml::Value;

use freightq_core::config::{AppConfig, LoadOptions};

use super::CommandResult;

const COMMAND: &str = "config";

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

/// Effective configuration with the source of each value
/// (env > file > default; command-line flags win over all three).
pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let entries: Vec<ConfigEntry> = effective_values(&config)
        .into_iter()
        .map(|(key, env_keys, value)| ConfigEntry {
            key,
            value,
            source: field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref()),
        })
        .collect();

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(entries.iter().map(render_line));
    CommandResult::success_with(COMMAND, lines.join("\n"), &entries)
}

type Field = (&'static str, &'static [&'static str], String);

fn field(key: &'static str, env_keys: &'static [&'static str], value: String) -> Field {
    (key, env_keys, value)
}

fn effective_values(config: &AppConfig) -> Vec<Field> {
    vec![
        field("storage.data_dir", &["FREIGHTQ_STORAGE_DATA_DIR"], config.storage.data_dir.display().to_string()),
        field("mail.spool_dir", &["FREIGHTQ_MAIL_SPOOL_DIR"], config.mail.spool_dir.display().to_string()),
        field("mail.inbox_folder", &["FREIGHTQ_MAIL_INBOX_FOLDER"], config.mail.inbox_folder.clone()),
        field("mail.from_address", &["FREIGHTQ_MAIL_FROM_ADDRESS"], config.mail.from_address.clone()),
        field("rates.provider", &["FREIGHTQ_RATES_PROVIDER"], format!("{:?}", config.rates.provider).to_lowercase()),
        field("rates.source_url", &["FREIGHTQ_RATES_SOURCE_URL"], config.rates.source_url.clone()),
        field("rates.timeout_secs", &["FREIGHTQ_RATES_TIMEOUT_SECS"], config.rates.timeout_secs.to_string()),
        field("rates.cache_ttl_secs", &["FREIGHTQ_RATES_CACHE_TTL_SECS"], config.rates.cache_ttl_secs.to_string()),
        field(
            "rates.reference_currency",
            &["FREIGHTQ_RATES_REFERENCE_CURRENCY"],
            config.rates.reference_currency.clone(),
        ),
        field("rates.fallback_usd", &["FREIGHTQ_RATES_FALLBACK_USD"], config.rates.fallback_usd.to_string()),
        field("rates.fallback_eur", &["FREIGHTQ_RATES_FALLBACK_EUR"], config.rates.fallback_eur.to_string()),
        field(
            "contracts.template_dir",
            &["FREIGHTQ_CONTRACTS_TEMPLATE_DIR"],
            config.contracts.template_dir.display().to_string(),
        ),
        field("contracts.template_name", &["FREIGHTQ_CONTRACTS_TEMPLATE_NAME"], config.contracts.template_name.clone()),
        field(
            "contracts.archive_dir",
            &["FREIGHTQ_CONTRACTS_ARCHIVE_DIR"],
            config.contracts.archive_dir.display().to_string(),
        ),
        field(
            "contracts.transient_dir",
            &["FREIGHTQ_CONTRACTS_TRANSIENT_DIR"],
            config.contracts.transient_dir().display().to_string(),
        ),
        field(
            "reconcile.debounce_secs",
            &["FREIGHTQ_RECONCILE_DEBOUNCE_SECS"],
            config.reconcile.debounce_secs.to_string(),
        ),
        field(
            "submission.max_attachment_bytes",
            &["FREIGHTQ_SUBMISSION_MAX_ATTACHMENT_BYTES"],
            config.submission.max_attachment_bytes.to_string(),
        ),
        field("logging.level", &["FREIGHTQ_LOGGING_LEVEL", "FREIGHTQ_LOG_LEVEL"], config.logging.level.clone()),
        field(
            "logging.format",
            &["FREIGHTQ_LOGGING_FORMAT", "FREIGHTQ_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("freightq.toml"), PathBuf::from("config/freightq.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|env_key| env::var_os(env_key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(entry: &ConfigEntry) -> String {
    format!("- {} = {} (source: {})", entry.key, entry.value, entry.source)
}
