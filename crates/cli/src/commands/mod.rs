pub mod bid_status;
pub mod carriers;
pub mod compare;
pub mod config;
pub mod contract;
pub mod doctor;
pub mod edits;
pub mod ingest;
pub mod purge;
pub mod rates;
pub mod status;
pub mod submit;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use freightq_core::config::LoadOptions;
use freightq_core::errors::ApplicationError;

use crate::bootstrap::{bootstrap, Application, BootstrapError};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::emit(
            0,
            CommandOutcome {
                command: command.to_string(),
                status: "ok".to_string(),
                error_class: None,
                message: message.into(),
                correlation_id: None,
                data: None,
            },
        )
    }

    /// Success carrying a serialized report. A report that fails to
    /// serialize is a failure of the command.
    pub fn success_with(command: &str, message: impl Into<String>, data: &impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self::emit(
                0,
                CommandOutcome {
                    command: command.to_string(),
                    status: "ok".to_string(),
                    error_class: None,
                    message: message.into(),
                    correlation_id: None,
                    data: Some(data),
                },
            ),
            Err(error) => Self::failure(command, "serialization", error.to_string(), 1),
        }
    }

    /// Ran to completion but some items failed; `data` lists them.
    pub fn partial(command: &str, message: impl Into<String>, data: &impl Serialize) -> Self {
        let mut result = Self::success_with(command, message, data);
        if result.exit_code == 0 {
            result.output = result.output.replacen("\"status\":\"ok\"", "\"status\":\"partial\"", 1);
            result.exit_code = 10;
        }
        result
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::emit(
            exit_code,
            CommandOutcome {
                command: command.to_string(),
                status: "error".to_string(),
                error_class: Some(error_class.to_string()),
                message: message.into(),
                correlation_id: None,
                data: None,
            },
        )
    }

    pub fn from_bootstrap(command: &str, error: &BootstrapError) -> Self {
        Self::failure(command, error.error_class(), error.to_string(), error.exit_code())
    }

    pub fn from_application(command: &str, error: ApplicationError) -> Self {
        let detail = error.to_string();
        let correlation_id = Uuid::new_v4().to_string();
        let interface = error.into_interface(correlation_id.clone());
        let exit_code = match interface.error_class() {
            "bad_request" => 4,
            "not_found" => 5,
            "service_unavailable" => 6,
            _ => 7,
        };
        Self::emit(
            exit_code,
            CommandOutcome {
                command: command.to_string(),
                status: "error".to_string(),
                error_class: Some(interface.error_class().to_string()),
                message: format!("{} ({detail})", interface.user_message()),
                correlation_id: Some(correlation_id),
                data: None,
            },
        )
    }

    fn emit(exit_code: u8, payload: CommandOutcome) -> Self {
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Bootstraps the desk and runs `action` against it.
pub(crate) fn with_application(
    command: &str,
    options: LoadOptions,
    action: impl FnOnce(&Application) -> CommandResult,
) -> CommandResult {
    match bootstrap(options) {
        Ok(application) => action(&application),
        Err(error) => CommandResult::from_bootstrap(command, &error),
    }
}

pub(crate) fn bad_request(command: &str, message: impl Into<String>) -> CommandResult {
    CommandResult::failure(command, "bad_request", message, 4)
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use freightq_core::errors::ApplicationError;

    use super::CommandResult;

    #[test]
    fn application_errors_carry_class_and_correlation_id() {
        let result = CommandResult::from_application(
            "contract",
            ApplicationError::NotFound { entity: "bid", id: "SHIP-404".to_owned() },
        );
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 5);
        assert_eq!(payload["error_class"], "not_found");
        assert!(payload["message"].as_str().unwrap_or_default().contains("SHIP-404"));
        assert!(payload["correlation_id"].is_string());
        assert!(payload.get("data").is_none());
    }

    #[test]
    fn partial_results_keep_their_data() {
        let result = CommandResult::partial("submit", "1 of 2 sent", &json!({"failed": 1}));
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 10);
        assert_eq!(payload["status"], "partial");
        assert_eq!(payload["data"]["failed"], 1);
    }
}
