use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors raised while parsing domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("proxy address cannot be empty")]
    EmptyProxyAddress,
    #[error("proxy address '{value}' is missing a port")]
    ProxyMissingPort { value: String },
    #[error("proxy address '{value}' has an invalid port")]
    ProxyInvalidPort { value: String },
    #[error("proxy address '{value}' has an invalid host")]
    ProxyInvalidHost { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
}

/// Top-level error type for pipeline setup and persistence.
///
/// Everything that can go wrong *during* a run is folded into per-task results
/// instead; these variants only surface before work starts or while writing
/// output.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no proxy sources configured")]
    NoSources,

    #[error("no symbols requested")]
    NoSymbols,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure classification shared by every pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ConnectionRefusedOrReset,
    HttpStatusError,
    MalformedResponse,
    IncompletePayload,
    Cancelled,
    SourceUnreachable,
    ValidationProbeFailed,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefusedOrReset => "connection_refused_or_reset",
            Self::HttpStatusError => "http_status_error",
            Self::MalformedResponse => "malformed_response",
            Self::IncompletePayload => "incomplete_payload",
            Self::Cancelled => "cancelled",
            Self::SourceUnreachable => "source_unreachable",
            Self::ValidationProbeFailed => "validation_probe_failed",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured per-task failure folded into fetch and validation results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
}

impl FetchError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionRefusedOrReset, message)
    }

    pub fn http_status(status: u16) -> Self {
        Self {
            kind: ErrorKind::HttpStatusError,
            message: format!("upstream returned status {status}"),
            status: Some(status),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, message)
    }

    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IncompletePayload, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "run was cancelled before completion")
    }

    pub fn source_unreachable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SourceUnreachable, message)
    }

    pub fn probe_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationProbeFailed, message)
    }

    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether the failure says something about the proxy that carried the
    /// request rather than about the symbol itself.
    pub fn implicates_proxy(&self) -> bool {
        match self.kind {
            ErrorKind::Timeout
            | ErrorKind::ConnectionRefusedOrReset
            | ErrorKind::MalformedResponse => true,
            ErrorKind::HttpStatusError => matches!(
                self.status,
                Some(403) | Some(407) | Some(429) | Some(500..=599)
            ),
            _ => false,
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for FetchError {}
