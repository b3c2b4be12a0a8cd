use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;
use tracing::info;

use freightq_core::audit::TracingAuditSink;
use freightq_core::clock::{Clock, SystemClock};
use freightq_core::config::{AppConfig, ConfigError, LoadOptions, RateProvider};
use freightq_core::orchestrator::{Collaborators, DeskSettings, FreightDesk};
use freightq_core::ports::{RenderError, StoreError};
use freightq_core::rates::{CachedRateSource, FixedRateSource, RateSource};
use freightq_db::{open_with_settings, StoreSettings};
use freightq_mail::SpoolMailTransport;
use freightq_render::TeraRenderer;

use crate::cbr::CbrRateSource;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("record store could not be opened: {0}")]
    Store(#[source] StoreError),
    #[error("contract templates could not be loaded: {0}")]
    Templates(#[source] RenderError),
}

impl BootstrapError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_validation",
            Self::Store(_) => "store_unavailable",
            Self::Templates(_) => "template_load",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Store(_) | Self::Templates(_) => 3,
        }
    }
}

pub struct Application {
    pub config: AppConfig,
    pub desk: FreightDesk,
}

pub fn rate_source(config: &AppConfig, clock: Arc<dyn Clock>) -> Arc<dyn RateSource> {
    match config.rates.provider {
        RateProvider::Fixed => Arc::new(FixedRateSource::new(config.rates.fallback_table())),
        RateProvider::Cbr => Arc::new(CachedRateSource::new(
            CbrRateSource::new(
                config.rates.source_url.clone(),
                StdDuration::from_secs(config.rates.timeout_secs),
                config.rates.reference_currency.clone(),
            ),
            clock,
            Duration::seconds(i64::try_from(config.rates.cache_ttl_secs).unwrap_or(i64::MAX)),
            config.rates.fallback_table(),
        )),
    }
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let (store, artifacts) =
        open_with_settings(&StoreSettings::from_config(&config)).map_err(BootstrapError::Store)?;
    let renderer =
        TeraRenderer::load(&config.contracts.template_dir).map_err(BootstrapError::Templates)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mail = SpoolMailTransport::new(
        config.mail.spool_dir.clone(),
        config.mail.from_address.clone(),
        clock.clone(),
    );

    let desk = FreightDesk::new(
        Collaborators {
            store: Arc::new(store),
            mail: Arc::new(mail),
            rates: rate_source(&config, clock.clone()),
            renderer: Arc::new(renderer),
            artifacts: Arc::new(artifacts),
            clock,
            audit: Arc::new(TracingAuditSink),
        },
        DeskSettings::from_config(&config),
    );

    info!(
        event_name = "system.bootstrap.ready",
        data_dir = %config.storage.data_dir.display(),
        spool_dir = %config.mail.spool_dir.display(),
        "application ready"
    );
    Ok(Application { config, desk })
}
