//! Typed error hierarchy for the fleet-api crate.
//!
//! `FleetError` is the single error type returned by every library operation.
//! The HTTP-facing variants mirror the status-code taxonomy produced by
//! [`crate::classify`]; the remaining variants cover caller-side mistakes
//! (no targets, bad arguments, bad configuration) and response decoding.
//!
//! Every variant that originates from the server keeps the server's own
//! message text so callers can surface it verbatim.

use serde::{Deserialize, Serialize};

/// One structured entry from the `errors`/`details` list of a Fleet error body.
///
/// Fleet reports validation failures as `{"name": "base", "reason": "..."}`.
/// Both fields are optional because older server versions omit `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Field or area the detail refers to (often `"base"`).
    #[serde(default)]
    pub name: Option<String>,
    /// Human-readable reason for the failure.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Unified error type for all fleet-api library operations.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// No live connection exists. Raised before any network I/O.
    #[error("not connected to a Fleet server; connect first")]
    NotConnected,

    /// HTTP 401. The token is missing, expired, or revoked.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Instruction to re-authenticate.
        message: String,
    },

    /// HTTP 403. The authenticated user lacks permission for the operation.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Server-provided message.
        message: String,
    },

    /// HTTP 404. The addressed resource does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Server-provided message.
        message: String,
    },

    /// The request ran out of time, either client-side (no response within
    /// the transport timeout) or server-side (HTTP 408).
    #[error("request timed out: {message}")]
    Timeout {
        /// Server message for 408, transport description otherwise.
        message: String,
        /// `true` when the server answered with 408.
        server_reported: bool,
    },

    /// HTTP 429. The server is throttling this client.
    #[error(
        "rate limited: {message}{}",
        .retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default()
    )]
    RateLimited {
        /// Server-provided message.
        message: String,
        /// Seconds to wait before retrying, when the server said so.
        retry_after_secs: Option<u64>,
    },

    /// HTTP 400 whose details indicate a Fleet Premium-only feature.
    #[error("{message}")]
    PremiumRequired {
        /// Fixed license message.
        message: String,
    },

    /// HTTP 500.
    #[error("server error: {message}")]
    ServerError {
        /// Server-provided message.
        message: String,
    },

    /// HTTP 502.
    #[error("bad gateway: {message}")]
    BadGateway {
        /// Fixed availability message.
        message: String,
    },

    /// HTTP 503.
    #[error("service unavailable: {message}")]
    ServiceUnavailable {
        /// Fixed availability message.
        message: String,
    },

    /// HTTP 400 without a premium-license detail.
    #[error("bad request: {message}")]
    BadRequest {
        /// Server-provided message.
        message: String,
        /// Raw structured details from the error body.
        details: Vec<ErrorDetail>,
    },

    /// The request never produced an HTTP response (DNS, refused
    /// connection, TLS failure, broken body stream).
    #[error("transport failure: {message}")]
    Transport {
        /// Description of the underlying failure.
        message: String,
        /// The underlying transport error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Any status code outside the mapped set.
    #[error("unexpected HTTP status {status}: {message}")]
    Unknown {
        /// The HTTP status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// A query run was requested without any target host or label.
    #[error("no target hosts or labels were supplied")]
    NoTargets,

    /// The caller supplied arguments that cannot be turned into a request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A response body did not match the expected JSON shape.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Connection settings are missing, malformed, or unreadable.
    #[error("configuration error: {0}")]
    Config(String),
}

impl FleetError {
    /// The HTTP status that produced this error, if it came from a response.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Forbidden { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::Timeout {
                server_reported: true,
                ..
            } => Some(408),
            Self::RateLimited { .. } => Some(429),
            Self::PremiumRequired { .. } | Self::BadRequest { .. } => Some(400),
            Self::ServerError { .. } => Some(500),
            Self::BadGateway { .. } => Some(502),
            Self::ServiceUnavailable { .. } => Some(503),
            Self::Unknown { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` for failures that may succeed if the same request is
    /// sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::BadGateway { .. }
                | Self::ServiceUnavailable { .. }
        )
    }

    /// Returns `true` if the server reported the resource as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn rate_limited_display_includes_retry_after_when_known() {
        let err = FleetError::RateLimited {
            message: "too many requests, retry after: 30s".to_string(),
            retry_after_secs: Some(30),
        };
        let msg = err.to_string();
        assert!(msg.contains("rate limited"));
        assert!(msg.contains("(retry after 30s)"), "got: {msg}");
    }

    #[test]
    fn rate_limited_display_omits_retry_after_when_unknown() {
        let err = FleetError::RateLimited {
            message: "slow down".to_string(),
            retry_after_secs: None,
        };
        assert_eq!(err.to_string(), "rate limited: slow down");
    }

    #[test]
    fn http_status_maps_each_server_variant() {
        let cases = [
            (
                FleetError::Unauthorized {
                    message: String::new(),
                },
                Some(401),
            ),
            (
                FleetError::NotFound {
                    message: String::new(),
                },
                Some(404),
            ),
            (
                FleetError::PremiumRequired {
                    message: String::new(),
                },
                Some(400),
            ),
            (
                FleetError::Unknown {
                    status: 418,
                    message: String::new(),
                },
                Some(418),
            ),
            (FleetError::NotConnected, None),
            (FleetError::NoTargets, None),
        ];
        for (err, expected) in cases {
            assert_eq!(err.http_status(), expected, "{err}");
        }
    }

    #[test]
    fn timeout_status_depends_on_origin() {
        let server = FleetError::Timeout {
            message: "request timeout".to_string(),
            server_reported: true,
        };
        let local = FleetError::Timeout {
            message: "operation timed out".to_string(),
            server_reported: false,
        };
        assert_eq!(server.http_status(), Some(408));
        assert_eq!(local.http_status(), None);
    }

    #[test]
    fn retryable_covers_transient_failures_only() {
        assert!(
            FleetError::BadGateway {
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            FleetError::RateLimited {
                message: String::new(),
                retry_after_secs: None
            }
            .is_retryable()
        );
        assert!(
            !FleetError::Forbidden {
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!FleetError::NotConnected.is_retryable());
    }

    #[test]
    fn transport_error_with_source_chains_correctly() {
        let json_err: serde_json::Error = serde_json::from_str::<String>("not-json").unwrap_err();
        let err = FleetError::Transport {
            message: "connection reset".to_string(),
            source: Some(Box::new(json_err)),
        };
        assert!(err.source().is_some());
    }

    #[test]
    fn parse_error_wraps_serde_json() {
        let json_err: serde_json::Error =
            serde_json::from_str::<String>("{{bad json}}").unwrap_err();
        let err = FleetError::from(json_err);
        assert!(err.to_string().contains("failed to parse response"));
        assert!(err.source().is_some());
    }

    #[test]
    fn error_detail_tolerates_missing_fields() {
        let detail: ErrorDetail = serde_json::from_str(r#"{"reason": "nope"}"#).unwrap();
        assert!(detail.name.is_none());
        assert_eq!(detail.reason.as_deref(), Some("nope"));
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FleetError>();
    }
}
