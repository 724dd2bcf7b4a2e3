//! Maps failed HTTP calls onto the [`FleetError`] taxonomy.
//!
//! Two entry points:
//! - [`classify_transport`]: the request never produced a response.
//! - [`classify_response`]: the server answered with a non-2xx status.
//!
//! Both are pure: they inspect their inputs and build an error, nothing else.
//! All text-matching rules (premium-license detection, retry-after parsing)
//! and the fixed user-facing messages live in the constants below so that a
//! change in server wording is a one-line edit here.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::StatusCode;
use serde_json::Value;

use crate::error::{ErrorDetail, FleetError};

// ── Rule table ─────────────────────────────────────────────────────────

/// Substring (case-insensitive) in `details[].reason` that marks a 400 as a
/// Fleet Premium-only feature.
pub const PREMIUM_LICENSE_MARKER: &str = "premium license";

/// Message for [`FleetError::PremiumRequired`]; replaces the server's text.
pub const PREMIUM_REQUIRED_MESSAGE: &str =
    "this feature requires a Fleet Premium license (https://fleetdm.com/pricing)";

/// Message for [`FleetError::Unauthorized`].
pub const REAUTHENTICATE_MESSAGE: &str =
    "authentication failed or the API token has expired; reconnect with valid credentials";

/// Message for [`FleetError::BadGateway`].
pub const BAD_GATEWAY_MESSAGE: &str = "the Fleet server is temporarily unavailable";

/// Message for [`FleetError::ServiceUnavailable`].
pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "the Fleet server is temporarily unavailable or under maintenance";

/// Matches `retry after: 30s` anywhere in a 429 message.
static RETRY_AFTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry after:\s*(\d+)\s*s").expect("retry-after pattern is valid")
});

// ── Error body ─────────────────────────────────────────────────────────

/// The JSON error envelope Fleet returns on failure.
///
/// Current servers name the detail list `errors`; `details` is accepted too.
#[derive(Debug, Default)]
pub struct ErrorBody {
    /// Top-level summary message.
    pub message: Option<String>,
    /// Structured per-field details.
    pub details: Vec<ErrorDetail>,
}

impl ErrorBody {
    /// Parses a response body, returning `None` if it is not a JSON object.
    ///
    /// `message` and the detail list are read independently, so a malformed
    /// or `null` detail list never costs the message. Entries that are not
    /// detail objects are skipped.
    pub fn parse(body: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(body).ok()?;
        let object = value.as_object()?;
        let message = object
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        let details = ["errors", "details"]
            .iter()
            .filter_map(|key| object.get(*key).and_then(Value::as_array))
            .flatten()
            .filter_map(parse_detail)
            .collect();
        Some(ErrorBody { message, details })
    }
}

fn parse_detail(entry: &Value) -> Option<ErrorDetail> {
    let object = entry.as_object()?;
    let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
    Some(ErrorDetail {
        name: text("name"),
        reason: text("reason"),
    })
}

// ── Classification ─────────────────────────────────────────────────────

/// Classifies a transport-level failure (no HTTP response available).
///
/// Elapsed-time conditions become [`FleetError::Timeout`]; everything else
/// becomes [`FleetError::Transport`] carrying the underlying error.
pub fn classify_transport(err: reqwest::Error) -> FleetError {
    if err.is_timeout() {
        return FleetError::Timeout {
            message: err.to_string(),
            server_reported: false,
        };
    }
    FleetError::Transport {
        message: err.to_string(),
        source: Some(Box::new(err)),
    }
}

/// Classifies a non-success HTTP response from its status and raw body.
pub fn classify_response(status: StatusCode, body: &str) -> FleetError {
    let parsed = ErrorBody::parse(body).unwrap_or_default();
    let message = parsed
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| status_description(status));
    let details = parsed.details;

    match status.as_u16() {
        400 if requires_premium(&details) => FleetError::PremiumRequired {
            message: PREMIUM_REQUIRED_MESSAGE.to_string(),
        },
        400 => FleetError::BadRequest { message, details },
        401 => FleetError::Unauthorized {
            message: REAUTHENTICATE_MESSAGE.to_string(),
        },
        403 => FleetError::Forbidden { message },
        404 => FleetError::NotFound { message },
        408 => FleetError::Timeout {
            message,
            server_reported: true,
        },
        429 => FleetError::RateLimited {
            retry_after_secs: parse_retry_after(&message),
            message,
        },
        500 => FleetError::ServerError { message },
        502 => FleetError::BadGateway {
            message: BAD_GATEWAY_MESSAGE.to_string(),
        },
        503 => FleetError::ServiceUnavailable {
            message: SERVICE_UNAVAILABLE_MESSAGE.to_string(),
        },
        other => FleetError::Unknown {
            status: other,
            message,
        },
    }
}

/// Returns `true` if any detail reason mentions the premium license marker.
pub fn requires_premium(details: &[ErrorDetail]) -> bool {
    details.iter().any(|d| {
        d.reason
            .as_deref()
            .is_some_and(|r| r.to_lowercase().contains(PREMIUM_LICENSE_MARKER))
    })
}

/// Extracts `N` from a `retry after: Ns` fragment.
pub fn parse_retry_after(message: &str) -> Option<u64> {
    RETRY_AFTER
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn status_description(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    }
}
