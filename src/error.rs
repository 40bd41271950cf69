//! Error types for the reconciliation engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a fetch did not produce meaningful data.
///
/// Rendered to users only through [`crate::guidance`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("health provider unavailable")]
    ProviderUnavailable,

    #[error("permissions not granted")]
    PermissionsNotGranted,

    #[error("permissions revoked during query")]
    PermissionsRevoked,

    #[error("no data in any lookback window")]
    NoDataInRange,

    #[error("provider returned only zero values")]
    DataAllZero,

    #[error("unknown failure: {0}")]
    Unknown(String),
}

impl FailureReason {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            FailureReason::PermissionsNotGranted => "PERMISSIONS_NOT_GRANTED",
            FailureReason::PermissionsRevoked => "PERMISSIONS_REVOKED",
            FailureReason::NoDataInRange => "NO_DATA_IN_RANGE",
            FailureReason::DataAllZero => "DATA_ALL_ZERO",
            FailureReason::Unknown(_) => "UNKNOWN",
        }
    }

    /// Failures that warrant an automatic diagnostic pass
    pub fn triggers_diagnostics(&self) -> bool {
        matches!(
            self,
            FailureReason::NoDataInRange
                | FailureReason::ProviderUnavailable
                | FailureReason::Unknown(_)
        )
    }
}

/// Error raised by an external collaborator (health provider or OS)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),
}

impl ProviderError {
    /// Build a typed error from provider text when no structured code exists
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if looks_like_permission_error(&message) {
            ProviderError::PermissionDenied(message)
        } else {
            ProviderError::Query(message)
        }
    }

    /// Permission failures recur on every window, so scans abort on them
    pub fn is_permission_denied(&self) -> bool {
        match self {
            ProviderError::PermissionDenied(_) => true,
            ProviderError::Query(message) => looks_like_permission_error(message),
            ProviderError::Unavailable(_) => false,
        }
    }
}

const PERMISSION_MARKERS: [&str; 5] = [
    "permission",
    "denied",
    "unauthorized",
    "not authorized",
    "securityexception",
];

/// Text heuristic for providers that only report errors as strings
pub fn looks_like_permission_error(message: &str) -> bool {
    let lowered = message.to_lowercase();
    PERMISSION_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Errors from parsing exports and loading configuration
#[derive(Debug, Error)]
pub enum VitalsError {
    #[error("Failed to parse provider export: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
