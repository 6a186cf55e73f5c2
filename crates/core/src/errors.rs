use thiserror::Error;

use crate::domain::session::SessionStatus;
use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidSessionTransition { from: SessionStatus, to: SessionStatus },
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("context validation failed: {0}")]
    ContextValidation(String),
    #[error("product {product_id} was never proposed in session {session_id}")]
    UnknownProposal { session_id: String, product_id: String },
    #[error("feedback was already recorded for session {session_id}")]
    FeedbackAlreadyRecorded { session_id: String },
    #[error("session {session_id} is no longer active")]
    SessionEnded { session_id: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("generation collaborator unavailable: {0}")]
    GenerationUnavailable(String),
    #[error("malformed generation output: {0}")]
    MalformedGeneration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
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
    /// Apologetic copy safe to render verbatim in the guest-facing chat.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The session or resource could not be found.",
            Self::ServiceUnavailable { .. } => {
                "I'm sorry, I can't prepare a recommendation right now. Please try again in a moment."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
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
        match value {
            ApplicationError::Domain(DomainError::UnknownProposal { .. }) => Self::NotFound {
                message: "proposal not found in session ledger".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Domain(_) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            // Malformed collaborator output is deliberately indistinguishable from an
            // unavailable collaborator at the interface: corrupt rankings are never persisted.
            ApplicationError::Persistence(message)
            | ApplicationError::GenerationUnavailable(message)
            | ApplicationError::MalformedGeneration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
