use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failure codes reported by the remote record service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NetworkFailure,
    NetworkUnavailable,
    ServiceUnavailable,
    RequestRateLimited,
    ZoneBusy,
    NotAuthenticated,
    PermissionFailure,
    InvalidArguments,
    ServerRecordChanged,
    LimitExceeded,
    ChangeTokenExpired,
    UnknownItem,
    ZoneNotFound,
    QuotaExceeded,
    PartialFailure,
    InternalError,
}

impl ErrorCode {
    /// Transient codes: the same request may succeed if issued again later.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::NetworkFailure
                | Self::NetworkUnavailable
                | Self::ServiceUnavailable
                | Self::RequestRateLimited
                | Self::ZoneBusy
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkFailure => "network_failure",
            Self::NetworkUnavailable => "network_unavailable",
            Self::ServiceUnavailable => "service_unavailable",
            Self::RequestRateLimited => "request_rate_limited",
            Self::ZoneBusy => "zone_busy",
            Self::NotAuthenticated => "not_authenticated",
            Self::PermissionFailure => "permission_failure",
            Self::InvalidArguments => "invalid_arguments",
            Self::ServerRecordChanged => "server_record_changed",
            Self::LimitExceeded => "limit_exceeded",
            Self::ChangeTokenExpired => "change_token_expired",
            Self::UnknownItem => "unknown_item",
            Self::ZoneNotFound => "zone_not_found",
            Self::QuotaExceeded => "quota_exceeded",
            Self::PartialFailure => "partial_failure",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CloudError {
    #[error("Service error ({code}): {message}")]
    Service {
        code: ErrorCode,
        message: String,
        /// Server-suggested wait before the request may be retried.
        retry_after_ms: Option<u64>,
    },

    #[error("Simulated failure: {0}")]
    Simulated(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection to {target} unavailable: {reason}")]
    ConnectionUnavailable { target: String, reason: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl CloudError {
    pub fn service(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Service {
            code,
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Builds a service error carrying a server retry hint.
    pub fn service_with_retry_after(
        code: ErrorCode,
        message: impl Into<String>,
        retry_after: Duration,
    ) -> Self {
        Self::Service {
            code,
            message: message.into(),
            retry_after_ms: Some(u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    /// Error injected by a `SimulatedFailure` behavior that does not carry its own.
    pub fn simulated_default() -> Self {
        Self::Simulated("request failed by simulated behavior".to_string())
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Service { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` for operation-level failures worth re-issuing unchanged.
    ///
    /// Only service errors with a transient code qualify; simulated, local and
    /// cancellation errors never do.
    pub fn is_retriable(&self) -> bool {
        self.code().is_some_and(ErrorCode::is_transient)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Service {
                retry_after_ms: Some(ms),
                ..
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }

    pub fn is_code(&self, expected: ErrorCode) -> bool {
        self.code() == Some(expected)
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
