//! Rate limit headers attached to error responses.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::HeaderMap;

/// Rate limit information from Twitter API headers.
///
/// Purely informational: the client never waits on or counts against it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Maximum number of requests allowed in the window
    pub limit: Option<u32>,

    /// Remaining requests in the current window
    pub remaining: Option<u32>,

    /// Unix timestamp when the rate limit resets
    pub reset: Option<u64>,
}

impl RateLimitInfo {
    /// Parse rate limit info from response headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            limit: header_value(headers, "x-rate-limit-limit"),
            remaining: header_value(headers, "x-rate-limit-remaining"),
            reset: header_value(headers, "x-rate-limit-reset"),
        }
    }

    /// Check if we're rate limited (remaining == 0).
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Get the duration until rate limit resets.
    #[must_use]
    pub fn time_until_reset(&self) -> Option<Duration> {
        let reset = self.reset?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();

        (reset > now).then(|| Duration::from_secs(reset - now))
    }
}

fn header_value<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
