use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rates::{RateTable, DEFAULT_REFERENCE_CURRENCY};

pub const DEFAULT_CBR_URL: &str = "https://www.cbr-xml-daily.ru/daily_json.js";
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 15 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub mail: MailConfig,
    pub rates: RatesConfig,
    pub contracts: ContractsConfig,
    pub reconcile: ReconcileConfig,
    pub submission: SubmissionConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub spool_dir: PathBuf,
    pub inbox_folder: String,
    pub from_address: String,
}

#[derive(Clone, Debug)]
pub struct RatesConfig {
    pub provider: RateProvider,
    pub source_url: String,
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub reference_currency: String,
    pub fallback_usd: Decimal,
    pub fallback_eur: Decimal,
}

#[derive(Clone, Debug)]
pub struct ContractsConfig {
    pub template_dir: PathBuf,
    pub template_name: String,
    pub archive_dir: PathBuf,
    /// Falls back to the system temp directory when unset.
    pub transient_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ReconcileConfig {
    pub debounce_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SubmissionConfig {
    pub max_attachment_bytes: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateProvider {
    Cbr,
    Fixed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub spool_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub rates_provider: Option<RateProvider>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig { data_dir: PathBuf::from("data") },
            mail: MailConfig {
                spool_dir: PathBuf::from("mail"),
                inbox_folder: "Inbox".to_string(),
                from_address: "logistics@localhost".to_string(),
            },
            rates: RatesConfig {
                provider: RateProvider::Cbr,
                source_url: DEFAULT_CBR_URL.to_string(),
                timeout_secs: 5,
                cache_ttl_secs: 3600,
                reference_currency: DEFAULT_REFERENCE_CURRENCY.to_string(),
                fallback_usd: Decimal::new(900, 1),
                fallback_eur: Decimal::new(1000, 1),
            },
            contracts: ContractsConfig {
                template_dir: PathBuf::from("templates/contracts"),
                template_name: crate::contract::DEFAULT_CONTRACT_TEMPLATE.to_string(),
                archive_dir: PathBuf::from("contracts"),
                transient_dir: None,
            },
            reconcile: ReconcileConfig {
                debounce_secs: crate::reconcile::DEFAULT_DEBOUNCE_SECS.unsigned_abs(),
            },
            submission: SubmissionConfig { max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for RateProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cbr" => Ok(Self::Cbr),
            "fixed" => Ok(Self::Fixed),
            other => Err(ConfigError::Validation(format!(
                "unsupported rates provider `{other}` (expected cbr|fixed)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl RatesConfig {
    /// The configured fallback pair, quoted in the reference currency.
    pub fn fallback_table(&self) -> RateTable {
        let mut table = RateTable::fallback(self.fallback_usd, self.fallback_eur);
        table.reference = self.reference_currency.clone();
        table
    }
}

impl ContractsConfig {
    pub fn transient_dir(&self) -> PathBuf {
        self.transient_dir.clone().unwrap_or_else(env::temp_dir)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("freightq.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(storage) = patch.storage {
            if let Some(data_dir) = storage.data_dir {
                self.storage.data_dir = data_dir;
            }
        }

        if let Some(mail) = patch.mail {
            if let Some(spool_dir) = mail.spool_dir {
                self.mail.spool_dir = spool_dir;
            }
            if let Some(inbox_folder) = mail.inbox_folder {
                self.mail.inbox_folder = inbox_folder;
            }
            if let Some(from_address) = mail.from_address {
                self.mail.from_address = from_address;
            }
        }

        if let Some(rates) = patch.rates {
            if let Some(provider) = rates.provider {
                self.rates.provider = provider;
            }
            if let Some(source_url) = rates.source_url {
                self.rates.source_url = source_url;
            }
            if let Some(timeout_secs) = rates.timeout_secs {
                self.rates.timeout_secs = timeout_secs;
            }
            if let Some(cache_ttl_secs) = rates.cache_ttl_secs {
                self.rates.cache_ttl_secs = cache_ttl_secs;
            }
            if let Some(reference_currency) = rates.reference_currency {
                self.rates.reference_currency = reference_currency;
            }
            if let Some(fallback_usd) = rates.fallback_usd {
                self.rates.fallback_usd = fallback_usd;
            }
            if let Some(fallback_eur) = rates.fallback_eur {
                self.rates.fallback_eur = fallback_eur;
            }
        }

        if let Some(contracts) = patch.contracts {
            if let Some(template_dir) = contracts.template_dir {
                self.contracts.template_dir = template_dir;
            }
            if let Some(template_name) = contracts.template_name {
                self.contracts.template_name = template_name;
            }
            if let Some(archive_dir) = contracts.archive_dir {
                self.contracts.archive_dir = archive_dir;
            }
            if let Some(transient_dir) = contracts.transient_dir {
                self.contracts.transient_dir = Some(transient_dir);
            }
        }

        if let Some(reconcile) = patch.reconcile {
            if let Some(debounce_secs) = reconcile.debounce_secs {
                self.reconcile.debounce_secs = debounce_secs;
            }
        }

        if let Some(submission) = patch.submission {
            if let Some(max_attachment_bytes) = submission.max_attachment_bytes {
                self.submission.max_attachment_bytes = max_attachment_bytes;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FREIGHTQ_STORAGE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("FREIGHTQ_MAIL_SPOOL_DIR") {
            self.mail.spool_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("FREIGHTQ_MAIL_INBOX_FOLDER") {
            self.mail.inbox_folder = value;
        }
        if let Some(value) = read_env("FREIGHTQ_MAIL_FROM_ADDRESS") {
            self.mail.from_address = value;
        }

        if let Some(value) = read_env("FREIGHTQ_RATES_PROVIDER") {
            self.rates.provider = value.parse()?;
        }
        if let Some(value) = read_env("FREIGHTQ_RATES_SOURCE_URL") {
            self.rates.source_url = value;
        }
        if let Some(value) = read_env("FREIGHTQ_RATES_TIMEOUT_SECS") {
            self.rates.timeout_secs = parse_u64("FREIGHTQ_RATES_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FREIGHTQ_RATES_CACHE_TTL_SECS") {
            self.rates.cache_ttl_secs = parse_u64("FREIGHTQ_RATES_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("FREIGHTQ_RATES_REFERENCE_CURRENCY") {
            self.rates.reference_currency = value;
        }
        if let Some(value) = read_env("FREIGHTQ_RATES_FALLBACK_USD") {
            self.rates.fallback_usd = parse_decimal("FREIGHTQ_RATES_FALLBACK_USD", &value)?;
        }
        if let Some(value) = read_env("FREIGHTQ_RATES_FALLBACK_EUR") {
            self.rates.fallback_eur = parse_decimal("FREIGHTQ_RATES_FALLBACK_EUR", &value)?;
        }

        if let Some(value) = read_env("FREIGHTQ_CONTRACTS_TEMPLATE_DIR") {
            self.contracts.template_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("FREIGHTQ_CONTRACTS_TEMPLATE_NAME") {
            self.contracts.template_name = value;
        }
        if let Some(value) = read_env("FREIGHTQ_CONTRACTS_ARCHIVE_DIR") {
            self.contracts.archive_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("FREIGHTQ_CONTRACTS_TRANSIENT_DIR") {
            self.contracts.transient_dir = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("FREIGHTQ_RECONCILE_DEBOUNCE_SECS") {
            self.reconcile.debounce_secs = parse_u64("FREIGHTQ_RECONCILE_DEBOUNCE_SECS", &value)?;
        }

        if let Some(value) = read_env("FREIGHTQ_SUBMISSION_MAX_ATTACHMENT_BYTES") {
            self.submission.max_attachment_bytes =
                parse_u64("FREIGHTQ_SUBMISSION_MAX_ATTACHMENT_BYTES", &value)?;
        }

        let log_level =
            read_env("FREIGHTQ_LOGGING_LEVEL").or_else(|| read_env("FREIGHTQ_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FREIGHTQ_LOGGING_FORMAT").or_else(|| read_env("FREIGHTQ_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(data_dir) = overrides.data_dir {
            self.storage.data_dir = data_dir;
        }
        if let Some(spool_dir) = overrides.spool_dir {
            self.mail.spool_dir = spool_dir;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(rates_provider) = overrides.rates_provider {
            self.rates.provider = rates_provider;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_storage(&self.storage)?;
        validate_mail(&self.mail)?;
        validate_rates(&self.rates)?;
        validate_contracts(&self.contracts)?;
        validate_submission(&self.submission)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("freightq.toml"), PathBuf::from("config/freightq.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("storage.data_dir must not be empty".to_string()));
    }
    Ok(())
}

fn validate_mail(mail: &MailConfig) -> Result<(), ConfigError> {
    if mail.spool_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("mail.spool_dir must not be empty".to_string()));
    }
    if mail.inbox_folder.trim().is_empty() {
        return Err(ConfigError::Validation("mail.inbox_folder must not be empty".to_string()));
    }
    if !mail.from_address.contains('@') {
        return Err(ConfigError::Validation(
            "mail.from_address must be an email address (`name@domain`)".to_string(),
        ));
    }
    Ok(())
}

fn validate_rates(rates: &RatesConfig) -> Result<(), ConfigError> {
    if rates.timeout_secs == 0 || rates.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "rates.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if rates.provider == RateProvider::Cbr
        && !rates.source_url.starts_with("http://")
        && !rates.source_url.starts_with("https://")
    {
        return Err(ConfigError::Validation(
            "rates.source_url must start with http:// or https:// for the cbr provider".to_string(),
        ));
    }

    if !crate::domain::catalog::is_currency_code(&rates.reference_currency) {
        return Err(ConfigError::Validation(
            "rates.reference_currency must be a 3-letter uppercase code such as `RUB`".to_string(),
        ));
    }

    if rates.fallback_usd <= Decimal::ZERO || rates.fallback_eur <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "rates.fallback_usd and rates.fallback_eur must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_contracts(contracts: &ContractsConfig) -> Result<(), ConfigError> {
    if contracts.template_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "contracts.template_name must name a template file, e.g. `contract.html.tera`"
                .to_string(),
        ));
    }
    if contracts.archive_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("contracts.archive_dir must not be empty".to_string()));
    }
    Ok(())
}

fn validate_submission(submission: &SubmissionConfig) -> Result<(), ConfigError> {
    if submission.max_attachment_bytes == 0 {
        return Err(ConfigError::Validation(
            "submission.max_attachment_bytes must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    storage: Option<StoragePatch>,
    mail: Option<MailPatch>,
    rates: Option<RatesPatch>,
    contracts: Option<ContractsPatch>,
    reconcile: Option<ReconcilePatch>,
    submission: Option<SubmissionPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct MailPatch {
    spool_dir: Option<PathBuf>,
    inbox_folder: Option<String>,
    from_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RatesPatch {
    provider: Option<RateProvider>,
    source_url: Option<String>,
    timeout_secs: Option<u64>,
    cache_ttl_secs: Option<u64>,
    reference_currency: Option<String>,
    fallback_usd: Option<Decimal>,
    fallback_eur: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct ContractsPatch {
    template_dir: Option<PathBuf>,
    template_name: Option<String>,
    archive_dir: Option<PathBuf>,
    transient_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ReconcilePatch {
    debounce_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SubmissionPatch {
    max_attachment_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
