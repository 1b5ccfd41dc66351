//! Unified error types for the lead router.
//!
//! Error codes:
//! - DOC_001, BILL_001, MAIL_001: collaborator failures
//! - DB_001-002: store failures
//!
//! Every error knows whether a job that hit it should be retried. Integrity
//! problems (a lead that vanished, a payload that cannot be decoded) are
//! terminal; anything that talks to the network is retryable.

use thiserror::Error;
use uuid::Uuid;

use crate::status::LeadStatus;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// External collaborator error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaboratorErrorCode {
    /// DOC_001: Document source request failed
    DocumentSource,
    /// BILL_001: Billing provider request failed
    Billing,
    /// MAIL_001: Notification sender request failed
    Notification,
}

impl CollaboratorErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DocumentSource => "DOC_001",
            Self::Billing => "BILL_001",
            Self::Notification => "MAIL_001",
        }
    }
}

/// Database error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorCode {
    /// DB_001: Query failed
    QueryFailed,
    /// DB_002: Could not obtain a connection
    ConnectionFailed,
}

impl DbErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::QueryFailed => "DB_001",
            Self::ConnectionFailed => "DB_002",
        }
    }
}

/// Unified error type for the lead router.
#[derive(Debug, Error)]
pub enum Error {
    #[error("lead {0} not found")]
    LeadNotFound(Uuid),

    #[error("lead {id} is not pending (status: {status})")]
    LeadNotPending { id: Uuid, status: LeadStatus },

    #[error("customer not found: {0}")]
    CustomerNotFound(String),

    #[error("invalid region code: {0}")]
    InvalidRegionCode(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Collaborator error with code.
    #[error("[{code}] {message}")]
    Collaborator {
        code: &'static str,
        message: String,
        retryable: bool,
    },

    /// Database error with code.
    #[error("[{code}] {message}")]
    Database { code: &'static str, message: String },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a retryable collaborator error.
    pub fn collaborator(code: CollaboratorErrorCode, msg: impl Into<String>) -> Self {
        Self::Collaborator {
            code: code.code(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a collaborator error that retrying will not fix (e.g. a 4xx).
    pub fn collaborator_rejected(code: CollaboratorErrorCode, msg: impl Into<String>) -> Self {
        Self::Collaborator {
            code: code.code(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a database error.
    pub fn database(code: DbErrorCode, msg: impl Into<String>) -> Self {
        Self::Database {
            code: code.code(),
            message: msg.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    pub fn invalid_region(msg: impl Into<String>) -> Self {
        Self::InvalidRegionCode(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a job failing with this error should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LeadNotFound(_)
            | Self::LeadNotPending { .. }
            | Self::CustomerNotFound(_)
            | Self::InvalidRegionCode(_)
            | Self::InvalidPayload(_)
            | Self::Serialization(_)
            | Self::Config(_)
            | Self::Unauthorized(_) => false,
            Self::Collaborator { retryable, .. } => *retryable,
            Self::Database { .. } | Self::Timeout { .. } | Self::Internal(_) => true,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRegionCode(_) | Self::InvalidPayload(_) | Self::Serialization(_) => 400,
            Self::Unauthorized(_) => 400,
            Self::LeadNotFound(_) | Self::CustomerNotFound(_) => 404,
            Self::LeadNotPending { .. } => 409,
            Self::Timeout { .. } => 504,
            Self::Collaborator { .. } => 502,
            Self::Database { .. } | Self::Config(_) | Self::Internal(_) => 500,
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Collaborator { code, .. } => Some(code),
            Self::Database { code, .. } => Some(code),
            _ => None,
        }
    }
}
