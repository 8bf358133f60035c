//! Axis VAPIX transport
//! Failure taxonomy shared by every component
//!
//! All transport, parsing and validation failures are reported as a single
//! `VapixError` record carrying a stable `FailureKind`, a readable message and
//! the raw payload when one was received. Callers branch on `kind` and log
//! `message`/`body` without another decode step.

use log::debug;
use serde_json::Value;
use thiserror::Error;

use crate::transport::ResponseBody;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, VapixError>;

/// Stable classification of a failure
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    #[error("connection refused")] ConnectionRefused,

    #[error("unreachable")] Unreachable,

    #[error("timeout")] Timeout,

    #[error("HTTP {0}")] HttpStatus(u16),

    #[error("application error")] ApplicationError,

    #[error("parse error")] ParseError,

    #[error("invalid input")] InvalidInput,
}

/// Failure record returned by every operation
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct VapixError {
    pub kind: FailureKind,
    pub message: String,
    pub body: Option<ResponseBody>,
}

impl VapixError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidInput, message)
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ParseError, message)
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ApplicationError, message)
    }

    /// Non-2xx response with no further protocol meaning.
    ///
    /// `reason` is the status line's reason phrase when it differs from the
    /// canonical one; otherwise the canonical reason is used.
    pub fn http_status(
        status: reqwest::StatusCode,
        reason: Option<String>,
        body: ResponseBody
    ) -> Self {
        let message = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown status").to_string());
        Self::new(FailureKind::HttpStatus(status.as_u16()), message).with_body(body)
    }

    /// Classify a reqwest failure that happened before a usable response existed
    pub fn from_transport(err: reqwest::Error) -> Self {
        let kind = classify_transport(&err);
        debug!("Transport failure classified as {}: {}", kind, err);
        let message = match kind {
            FailureKind::ConnectionRefused => "Port is not active or blocked by firewall".to_string(),
            FailureKind::Unreachable | FailureKind::Timeout => "Host does not respond".to_string(),
            _ => err.to_string(),
        };
        Self::new(kind, message)
    }

    pub fn is(&self, kind: FailureKind) -> bool {
        self.kind == kind
    }
}

fn classify_transport(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        return FailureKind::Timeout;
    }
    if err.is_builder() {
        return FailureKind::InvalidInput;
    }
    match io_error_kind(err) {
        Some(std::io::ErrorKind::ConnectionRefused) => FailureKind::ConnectionRefused,
        Some(std::io::ErrorKind::TimedOut) => FailureKind::Timeout,
        _ => FailureKind::Unreachable,
    }
}

/// Walk the source chain looking for the socket error that caused the failure
fn io_error_kind(err: &(dyn std::error::Error + 'static)) -> Option<std::io::ErrorKind> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        current = e.source();
    }
    None
}

/// Look for a vendor application error in a successfully received body.
///
/// Two conventions exist on Axis devices: JSON replies with an `error`
/// object (`{"error": {"code": 2104, "message": "..."}}`), and legacy CGI
/// replies whose text starts with `Error:` followed by a numeric code.
pub fn detect_application_error(body: &ResponseBody) -> Option<VapixError> {
    match body {
        ResponseBody::Json(value) => json_error(value).map(|message| {
            VapixError::application(message).with_body(body.clone())
        }),
        ResponseBody::Text(text) => legacy_error_code(text).map(|code| {
            VapixError::application(format!("Error: {}", code)).with_body(body.clone())
        }),
        ResponseBody::Binary(_) => None,
    }
}

fn json_error(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    if error.is_null() {
        return None;
    }
    let code = error.get("code").and_then(|c| c.as_i64());
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown error");
    Some(match code {
        Some(code) => format!("API Error {}: {}", code, message),
        None => message.to_string(),
    })
}

/// Numeric code of a legacy `Error: N` reply
pub fn legacy_error_code(text: &str) -> Option<u32> {
    let rest = text.trim_start().strip_prefix("Error:")?;
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Check a text reply from a legacy action CGI such as `param.cgi?action=update`.
///
/// These return `OK` on success and an arbitrary line mentioning `Error`
/// otherwise (for instance `# Error: Error setting 'root.Foo' to 'bar'!`).
pub fn check_cgi_reply(text: &str) -> Result<()> {
    let trimmed = text.trim();
    if trimmed == "OK" || !trimmed.contains("Error") {
        return Ok(());
    }
    let message = trimmed.lines().next().unwrap_or(trimmed).trim_start_matches('#').trim();
    Err(VapixError::application(message.to_string()).with_body(ResponseBody::Text(text.to_string())))
}
