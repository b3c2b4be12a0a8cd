use std::time::Duration;

use serde::Serialize;

use freightq_core::config::{AppConfig, LoadOptions, RateProvider};
use freightq_core::ports::{Collection, RecordStore};
use freightq_core::rates::RateSource;
use freightq_render::TeraRenderer;

use super::CommandResult;
use crate::cbr::CbrRateSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 4] = ["data_dir", "mail_spool", "contract_template", "rate_provider"];

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_data_dir(&config));
            checks.push(check_mail_spool(&config));
            checks.push(check_contract_template(&config));
            checks.push(check_rate_provider(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(DEPENDENT_CHECKS.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_data_dir(config: &AppConfig) -> DoctorCheck {
    let result = freightq_db::open(&config.storage.data_dir).and_then(|store| {
        [Collection::Bids, Collection::Carriers, Collection::Offers, Collection::Contracts]
            .into_iter()
            .try_for_each(|collection| store.load(collection).map(|_| ()))
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "data_dir",
            status: CheckStatus::Pass,
            details: format!("collections readable in `{}`", config.storage.data_dir.display()),
        },
        Err(error) => DoctorCheck { name: "data_dir", status: CheckStatus::Fail, details: error.to_string() },
    }
}

fn check_mail_spool(config: &AppConfig) -> DoctorCheck {
    let inbox = config.mail.spool_dir.join(&config.mail.inbox_folder);
    if inbox.is_dir() {
        DoctorCheck {
            name: "mail_spool",
            status: CheckStatus::Pass,
            details: format!("inbox folder `{}` present", inbox.display()),
        }
    } else {
        DoctorCheck {
            name: "mail_spool",
            status: CheckStatus::Fail,
            details: format!("inbox folder `{}` does not exist", inbox.display()),
        }
    }
}

fn check_contract_template(config: &AppConfig) -> DoctorCheck {
    let template_name = &config.contracts.template_name;
    match TeraRenderer::load(&config.contracts.template_dir) {
        Ok(renderer) if renderer.has_template(template_name) => DoctorCheck {
            name: "contract_template",
            status: CheckStatus::Pass,
            details: format!("template `{template_name}` loaded"),
        },
        Ok(renderer) => DoctorCheck {
            name: "contract_template",
            status: CheckStatus::Fail,
            details: format!(
                "template `{template_name}` not found; available: {}",
                renderer.template_names().join(", ")
            ),
        },
        Err(error) => DoctorCheck {
            name: "contract_template",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_rate_provider(config: &AppConfig) -> DoctorCheck {
    if config.rates.provider == RateProvider::Fixed {
        return DoctorCheck {
            name: "rate_provider",
            status: CheckStatus::Pass,
            details: "fixed provider serves the configured fallback rates".to_string(),
        };
    }

    // Live source only: the cached one never fails.
    let live = CbrRateSource::new(
        config.rates.source_url.clone(),
        Duration::from_secs(config.rates.timeout_secs),
        config.rates.reference_currency.clone(),
    );
    match live.current_rates() {
        Ok(table) => DoctorCheck {
            name: "rate_provider",
            status: CheckStatus::Pass,
            details: format!("{} rates as of {} from `{}`", table.rates.len(), table.as_of, config.rates.source_url),
        },
        Err(error) => DoctorCheck {
            name: "rate_provider",
            status: CheckStatus::Fail,
            details: format!("{error}; fallback rates would be used"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
