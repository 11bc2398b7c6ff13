use thiserror::Error;

use crate::monitor::StoreError;
use crate::source::SourceError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("monitoring is already active for @{target}")]
    AlreadyActive { target: String },
    #[error("no active monitoring configuration")]
    NotActive,
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Storage failures can break the single-active-config invariant and are
    /// reported at error level by callers.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Store(_))
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
            Self::BadRequest { .. } => "The request could not be processed. Check the command usage.",
            Self::NotFound { .. } => "No Truth Social account was found with that username.",
            Self::ServiceUnavailable { .. } => {
                "Truth Social data is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
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
            ApplicationError::Source(SourceError::NotFound(message)) => {
                Self::NotFound { message, correlation_id }
            }
            ApplicationError::Source(SourceError::Transport(message))
            | ApplicationError::Source(SourceError::MalformedResponse(message)) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::AlreadyActive { target } => Self::BadRequest {
                message: format!("monitoring is already active for @{target}"),
                correlation_id,
            },
            ApplicationError::NotActive => Self::BadRequest {
                message: "no active monitoring configuration".to_owned(),
                correlation_id,
            },
            ApplicationError::Store(StoreError::Storage(message))
            | ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
