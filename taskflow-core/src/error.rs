//! Error taxonomy shared by the unit of work, repositories, buses and relay.
//!
//! Store failures never escape as raw driver errors: they are logged where
//! they are translated and surfaced as [`CoreError::Unexpected`]. Errors that
//! are already classified ([`DomainError`]) pass through unchanged.

use serde::Serialize;
use thiserror::Error;

/// Boxed source error for failures coming from a storage backend.
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error codes exposed in client-safe error payloads.
pub mod codes {
    pub const NOT_FOUND_ERROR: &str = "NFE-001";
    pub const CONFLICT_ERROR: &str = "Common-EConflict-001";
    pub const UNEXPECTED_ERROR: &str = "Application-EUnexpected";
}

/// Reason that led to a domain error. Used when mapping errors to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCausationReason {
    DataNonExistent,
    BadDataProvided,
    UnrecoverableFailure,
    UnknownError,
}

/// Already-classified business errors raised by repositories and services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{domain}: {message}")]
    NotFound {
        domain: &'static str,
        message: String,
    },

    #[error("{domain}: {message}")]
    Conflict {
        domain: &'static str,
        message: String,
    },
}

impl DomainError {
    pub fn not_found(domain: &'static str) -> Self {
        Self::NotFound {
            domain,
            message: "The requested resource could not be found.".to_string(),
        }
    }

    pub fn conflict(domain: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict {
            domain,
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            DomainError::NotFound { .. } => codes::NOT_FOUND_ERROR,
            DomainError::Conflict { .. } => codes::CONFLICT_ERROR,
        }
    }

    pub fn causation_reason(&self) -> ErrorCausationReason {
        match self {
            DomainError::NotFound { .. } => ErrorCausationReason::DataNonExistent,
            DomainError::Conflict { .. } => ErrorCausationReason::BadDataProvided,
        }
    }

    fn domain(&self) -> &'static str {
        match self {
            DomainError::NotFound { domain, .. } | DomainError::Conflict { domain, .. } => domain,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            DomainError::NotFound { .. } => "NotFoundError",
            DomainError::Conflict { .. } => "ConflictError",
        }
    }

    fn message(&self) -> &str {
        match self {
            DomainError::NotFound { message, .. } | DomainError::Conflict { message, .. } => {
                message
            }
        }
    }
}

/// Information allowed to be serialized into a client readable error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSafeError {
    pub error_code: &'static str,
    pub domain: String,
    pub reason: &'static str,
    pub message: String,
}

/// Errors produced by the outbox core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The store could not open a transactional context (e.g. pool exhausted).
    #[error("unable to open a unit of work scope")]
    ScopeCreation(#[source] StoreError),

    /// The unit of work was already committed or rolled back.
    #[error("unit of work scope has already been terminated")]
    ScopeTerminated,

    /// An outbox append was attempted on a repository not bound to a scope.
    #[error("outbox messages must be written inside a unit of work")]
    UnscopedWrite,

    /// A bus name or operational domain has no registered event bus.
    #[error("no event bus registered for `{0}`")]
    BusNotFound(String),

    /// Unclassified store or serialization failure.
    #[error("unexpected error in {domain}: {message}")]
    Unexpected {
        domain: &'static str,
        message: String,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl CoreError {
    pub fn unexpected(domain: &'static str, message: impl Into<String>) -> Self {
        Self::Unexpected {
            domain,
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Domain(e) => e.error_code(),
            _ => codes::UNEXPECTED_ERROR,
        }
    }

    pub fn causation_reason(&self) -> ErrorCausationReason {
        match self {
            CoreError::Domain(e) => e.causation_reason(),
            CoreError::ScopeCreation(_) | CoreError::ScopeTerminated => {
                ErrorCausationReason::UnrecoverableFailure
            }
            _ => ErrorCausationReason::UnknownError,
        }
    }

    /// Serialize into a form that can be shown to a client.
    ///
    /// Anything that is not a domain error collapses into a generic
    /// unexpected error so that store internals never leave the process.
    pub fn serialize_error(&self) -> ClientSafeError {
        match self {
            CoreError::Domain(e) => ClientSafeError {
                error_code: e.error_code(),
                domain: e.domain().to_string(),
                reason: e.reason(),
                message: e.message().to_string(),
            },
            CoreError::Unexpected { domain, .. } => ClientSafeError {
                error_code: codes::UNEXPECTED_ERROR,
                domain: domain.to_string(),
                reason: "UnexpectedError",
                message: "An unexpected error has occurred.".to_string(),
            },
            _ => ClientSafeError {
                error_code: codes::UNEXPECTED_ERROR,
                domain: "Unknown".to_string(),
                reason: "UnexpectedError",
                message: "An unexpected error has occurred.".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_code() {
        let err = CoreError::from(DomainError::not_found("Users"));
        assert_eq!(err.error_code(), codes::NOT_FOUND_ERROR);
        assert_eq!(err.causation_reason(), ErrorCausationReason::DataNonExistent);

        let serialized = err.serialize_error();
        assert_eq!(serialized.domain, "Users");
        assert_eq!(serialized.reason, "NotFoundError");
    }

    #[test]
    fn unexpected_errors_hide_details() {
        let err = CoreError::unexpected("Outbox", "insert failed: relation \"outbox\" is locked");
        let serialized = err.serialize_error();
        assert_eq!(serialized.error_code, codes::UNEXPECTED_ERROR);
        assert_eq!(serialized.message, "An unexpected error has occurred.");
        assert!(!serde_json::to_string(&serialized).unwrap().contains("locked"));
    }

    #[test]
    fn serialized_error_uses_camel_case() {
        let json = serde_json::to_value(
            CoreError::from(DomainError::conflict("Users", "Username is taken.")).serialize_error(),
        )
        .unwrap();
        assert_eq!(json["errorCode"], codes::CONFLICT_ERROR);
        assert_eq!(json["message"], "Username is taken.");
    }
}
