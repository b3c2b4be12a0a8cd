use thiserror::Error;

use crate::contract::ContractError;
use crate::ports::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown status `{0}`")]
    UnknownStatus(String),
    #[error("missing required fields: {0:?}")]
    MissingRequiredFields(Vec<String>),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("duplicate {entity} `{id}`")]
    Duplicate { entity: &'static str, id: String },
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("concurrent modification of `{0}` detected, reload and retry")]
    Conflict(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict { collection } => Self::Conflict(collection),
            other => Self::Persistence(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The referenced request or offer does not exist.",
            Self::ServiceUnavailable { .. } => {
                "A collaborating service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::NotFound { .. } => "not_found",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::Duplicate { .. } | ApplicationError::Conflict(_) => {
                Self::BadRequest { message: value.to_string(), correlation_id }
            }
            ApplicationError::NotFound { .. } => {
                Self::NotFound { message: value.to_string(), correlation_id }
            }
            ApplicationError::Contract(error) => match error {
                ContractError::TemplateMissing(_) => {
                    Self::Internal { message: error.to_string(), correlation_id }
                }
                _ => Self::ServiceUnavailable { message: error.to_string(), correlation_id },
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::contract::ContractError;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::ports::StoreError;

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DomainError::MissingRequiredFields(vec!["port_from".to_owned()]))
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn missing_bid_maps_to_not_found() {
        let interface = ApplicationError::NotFound { entity: "bid", id: "SHIP-1".to_owned() }
            .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::NotFound { ref message, .. } if message.contains("SHIP-1")));
        assert_eq!(interface.error_class(), "not_found");
    }

    #[test]
    fn store_conflict_is_not_reported_as_outage() {
        let error = ApplicationError::from(StoreError::Conflict { collection: "offers".to_owned() });
        assert_eq!(error, ApplicationError::Conflict("offers".to_owned()));

        let interface = error.into_interface("req-3");
        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
    }

    #[test]
    fn store_io_failure_maps_to_service_unavailable() {
        let error = ApplicationError::from(StoreError::Io {
            collection: "offers".to_owned(),
            message: "disk full".to_owned(),
        });

        assert!(matches!(error, ApplicationError::Persistence(ref message) if message.contains("disk full")));
        assert!(matches!(error.into_interface("req-4"), InterfaceError::ServiceUnavailable { .. }));
    }

    #[test]
    fn missing_template_maps_to_internal() {
        let interface =
            ApplicationError::from(ContractError::TemplateMissing("contract.html.tera".to_owned()))
                .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
