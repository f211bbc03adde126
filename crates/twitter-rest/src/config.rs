//! Client configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for [`TwitterClient`](crate::TwitterClient).
///
/// Leave the access token fields empty for application-only (bearer) auth.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// OAuth 1.0a Consumer Key (API Key)
    #[serde(default)]
    pub consumer_key: String,

    /// OAuth 1.0a Consumer Secret (API Secret)
    #[serde(default)]
    pub consumer_secret: String,

    /// OAuth 1.0a Access Token
    #[serde(default)]
    pub access_token: String,

    /// OAuth 1.0a Access Token Secret
    #[serde(default)]
    pub access_token_secret: String,

    /// OAuth 2.0 Bearer Token; fetched on first use when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    /// Origin every request path is joined to (default: https://api.twitter.com)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Request timeout, in seconds when serialized
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// User-Agent header sent by the default transport
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upper bound on concurrently running requests in a batch
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_api_url() -> String {
    "https://api.twitter.com".into()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("twitter-rest/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_max_concurrency() -> usize {
    16
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl ClientConfig {
    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be > 0".into()));
        }
        let url = url::Url::parse(&self.api_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "api_url must be http(s), got {}",
                url.scheme()
            )));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            consumer_key: String::new(),
            consumer_secret: String::new(),
            access_token: String::new(),
            access_token_secret: String::new(),
            bearer_token: None,
            api_url: default_api_url(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("consumer_key", &self.consumer_key)
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}
