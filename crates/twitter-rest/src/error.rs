//! Twitter-specific error types and response classification.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::InvalidHeaderValue;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::rate_limit::RateLimitInfo;
use crate::transport::{HttpResponse, TransportError};

/// Errors returned by the client.
#[derive(Error, Debug)]
pub enum Error {
    /// Twitter answered with an error status
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The request never produced a response
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request URL could not be parsed
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A header value contained characters HTTP does not allow
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    /// Signing or credential problem
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A unit of a parallel batch panicked
    #[error("Parallel task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// The classified API error, if this is one.
    #[must_use]
    pub const fn api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }

    /// Shorthand for `self.api().map(ApiError::kind)`.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        self.api().map(ApiError::kind)
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Kinds of error responses, one per status code Twitter documents plus the
/// 403 refinements and two catch-all buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    /// 403 "Invalid or expired token"
    InvalidOrExpiredToken,
    /// 403 on a duplicate status update
    DuplicateStatus,
    /// 403 on favoriting twice
    AlreadyFavorited,
    /// 403 on retweeting twice
    AlreadyRetweeted,
    NotFound,
    NotAcceptable,
    UnprocessableEntity,
    /// 420 (legacy "Enhance Your Calm") and 429
    TooManyRequests,
    InternalServerError,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    /// Any other 4xx
    ClientError,
    /// Any other 5xx
    ServerError,
}

impl ErrorKind {
    /// Look up the kind for an HTTP status.
    ///
    /// Returns `None` below 400. Error-range statuses without a dedicated
    /// kind fall into [`ErrorKind::ClientError`] or [`ErrorKind::ServerError`];
    /// anything from 500 up, nonstandard codes included, is a server error.
    #[must_use]
    pub const fn from_status(status: u16) -> Option<Self> {
        let kind = match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            406 => Self::NotAcceptable,
            420 | 429 => Self::TooManyRequests,
            422 => Self::UnprocessableEntity,
            500 => Self::InternalServerError,
            502 => Self::BadGateway,
            503 => Self::ServiceUnavailable,
            504 => Self::GatewayTimeout,
            400..=499 => Self::ClientError,
            500.. => Self::ServerError,
            _ => return None,
        };
        Some(kind)
    }

    /// Twitter reuses 403 for several conditions that only the message text
    /// tells apart.
    #[must_use]
    pub fn from_forbidden_message(message: &str) -> Option<Self> {
        match message {
            "Invalid or expired token" => Some(Self::InvalidOrExpiredToken),
            "Status is a duplicate." => Some(Self::DuplicateStatus),
            "You have already favorited this status." => Some(Self::AlreadyFavorited),
            "You have already retweeted this tweet."
            | "sharing is not permissible for this status (Share validations failed)" => {
                Some(Self::AlreadyRetweeted)
            }
            _ => None,
        }
    }

    /// Whether this kind stems from a 5xx status.
    #[must_use]
    pub const fn is_server_error(self) -> bool {
        matches!(
            self,
            Self::InternalServerError
                | Self::BadGateway
                | Self::ServiceUnavailable
                | Self::GatewayTimeout
                | Self::ServerError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BadRequest => "bad request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::InvalidOrExpiredToken => "invalid or expired token",
            Self::DuplicateStatus => "duplicate status",
            Self::AlreadyFavorited => "already favorited",
            Self::AlreadyRetweeted => "already retweeted",
            Self::NotFound => "not found",
            Self::NotAcceptable => "not acceptable",
            Self::UnprocessableEntity => "unprocessable entity",
            Self::TooManyRequests => "too many requests",
            Self::InternalServerError => "internal server error",
            Self::BadGateway => "bad gateway",
            Self::ServiceUnavailable => "service unavailable",
            Self::GatewayTimeout => "gateway timeout",
            Self::ClientError => "client error",
            Self::ServerError => "server error",
        };
        f.write_str(name)
    }
}

/// One entry of the `errors` array in an error payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    /// Twitter error code
    #[serde(default)]
    pub code: Option<i64>,
    /// Human-readable message
    pub message: String,
}

/// An error response from the Twitter API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Twitter API error {status} ({kind}): {message}")]
pub struct ApiError {
    kind: ErrorKind,
    status: u16,
    message: String,
    code: Option<i64>,
    details: Vec<ErrorDetail>,
    rate_limit: RateLimitInfo,
}

impl ApiError {
    /// Build an error of the given kind from a response.
    ///
    /// The message comes from the payload's `error`, `errors`, `detail` or
    /// `title` field, in that order, and falls back to the status reason
    /// phrase when the body is empty or not JSON.
    #[must_use]
    pub fn from_response(kind: ErrorKind, response: &HttpResponse) -> Self {
        let parsed = ParsedBody::from_bytes(&response.body);
        let message = parsed.message.unwrap_or_else(|| reason_phrase(response.status));

        Self {
            kind,
            status: response.status.as_u16(),
            message,
            code: parsed.code,
            details: parsed.details,
            rate_limit: RateLimitInfo::from_headers(&response.headers),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Code of the first entry in `errors`, when present.
    #[must_use]
    pub const fn code(&self) -> Option<i64> {
        self.code
    }

    #[must_use]
    pub fn details(&self) -> &[ErrorDetail] {
        &self.details
    }

    #[must_use]
    pub const fn rate_limit(&self) -> &RateLimitInfo {
        &self.rate_limit
    }

    /// Check if this error is worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::TooManyRequests) || self.kind.is_server_error()
    }

    /// Get the suggested retry delay.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        if self.is_retryable() {
            self.rate_limit.time_until_reset()
        } else {
            None
        }
    }
}

/// Classify a response, returning `None` for success.
///
/// A 403 is built as [`ErrorKind::Forbidden`] first and then refined through
/// [`ErrorKind::from_forbidden_message`].
#[must_use]
pub fn classify(response: &HttpResponse) -> Option<ApiError> {
    let kind = ErrorKind::from_status(response.status.as_u16())?;
    let error = ApiError::from_response(kind, response);

    if kind == ErrorKind::Forbidden {
        if let Some(refined) = ErrorKind::from_forbidden_message(&error.message) {
            return Some(ApiError {
                kind: refined,
                ..error
            });
        }
    }

    Some(error)
}

fn reason_phrase(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or_default().to_string()
}

#[derive(Default)]
struct ParsedBody {
    message: Option<String>,
    code: Option<i64>,
    details: Vec<ErrorDetail>,
}

impl ParsedBody {
    fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Self::from_object(&map),
            _ => Self::default(),
        }
    }

    fn from_object(map: &serde_json::Map<String, Value>) -> Self {
        if let Some(Value::String(message)) = map.get("error") {
            return Self::with_message(message);
        }

        match map.get("errors") {
            Some(Value::Array(entries)) => {
                let details: Vec<ErrorDetail> = entries.iter().filter_map(detail).collect();
                let first = details.first();
                return Self {
                    message: first.map(|d| d.message.clone()),
                    code: first.and_then(|d| d.code),
                    details,
                };
            }
            Some(Value::String(message)) => return Self::with_message(message),
            _ => {}
        }

        ["detail", "title"]
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str))
            .map(Self::with_message)
            .unwrap_or_default()
    }

    fn with_message(message: &str) -> Self {
        Self {
            message: Some(message.trim_end_matches(['\r', '\n']).to_string()),
            ..Self::default()
        }
    }
}

fn detail(entry: &Value) -> Option<ErrorDetail> {
    match entry {
        Value::String(message) => Some(ErrorDetail {
            code: None,
            message: message.trim_end_matches(['\r', '\n']).to_string(),
        }),
        Value::Object(_) => serde_json::from_value::<ErrorDetail>(entry.clone())
            .ok()
            .map(|d| ErrorDetail {
                message: d.message.trim_end_matches(['\r', '\n']).to_string(),
                ..d
            }),
        _ => None,
    }
}
