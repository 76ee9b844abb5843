//! Layered error definitions
//!
//! Categorized by source: config / endpoint / decode (`ContractError`) and
//! the sink taxonomy surfaced by the pool and dispatcher (`SinkError`).

use thiserror::Error;

use crate::EndpointId;

/// Boxed cause carried by sink errors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified contract error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Endpoint Errors =====
    /// Endpoint identity failed validation
    #[error("invalid endpoint: {message}")]
    InvalidEndpoint { message: String },

    // ===== Decode Errors =====
    /// Row could not be decoded into a record
    #[error("decode error for table '{table}': {message}")]
    Decode { table: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create invalid endpoint error
    pub fn invalid_endpoint(message: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            message: message.into(),
        }
    }

    /// Create decode error
    pub fn decode(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            table: table.into(),
            message: message.into(),
        }
    }
}

/// Sink error taxonomy
///
/// Anything surfaced above a partition stream means that endpoint's
/// connection is unusable; the dispatcher reacts by evicting it.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Transport/connection setup failed
    #[error("failed to connect to endpoint {endpoint}: {source}")]
    Connect {
        endpoint: EndpointId,
        source: BoxError,
    },

    /// Commit path failed after internal retries were exhausted
    #[error("failed to write to endpoint {endpoint}: {source}")]
    Write {
        endpoint: EndpointId,
        source: BoxError,
    },

    /// Lane unavailable or shut down
    #[error("dispatch failed: {message}")]
    Dispatch { message: String },
}

impl SinkError {
    /// Create connect failure
    pub fn connect(endpoint: &EndpointId, cause: impl Into<BoxError>) -> Self {
        Self::Connect {
            endpoint: endpoint.clone(),
            source: cause.into(),
        }
    }

    /// Create write failure
    pub fn write(endpoint: &EndpointId, cause: impl Into<BoxError>) -> Self {
        Self::Write {
            endpoint: endpoint.clone(),
            source: cause.into(),
        }
    }

    /// Create dispatch failure
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch {
            message: message.into(),
        }
    }

    /// Endpoint the failure is attributed to, if any
    pub fn endpoint(&self) -> Option<&EndpointId> {
        match self {
            Self::Connect { endpoint, .. } | Self::Write { endpoint, .. } => Some(endpoint),
            Self::Dispatch { .. } => None,
        }
    }

    /// Whether this is a commit-path failure
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Self::Write { .. })
    }

    /// Underlying cause, dropping the endpoint tag
    pub fn into_cause(self) -> BoxError {
        match self {
            Self::Connect { source, .. } | Self::Write { source, .. } => source,
            Self::Dispatch { message } => message.into(),
        }
    }

    /// Re-tag as a write failure for `endpoint`, keeping write failures as they are
    pub fn into_write(self, endpoint: &EndpointId) -> Self {
        match self {
            err @ Self::Write { .. } => err,
            other => Self::write(endpoint, other),
        }
    }
}
