//! OAuth 1.0a request signing.
//!
//! Twitter requires OAuth 1.0a signatures for user-context requests.
//! This module builds the signature base string and the `Authorization`
//! header from it.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use rand::RngCore;
use sha1::Sha1;
use url::Url;

use crate::error::{Error, Result};

/// Characters that must be percent-encoded in OAuth signatures.
/// RFC 3986 unreserved characters: ALPHA / DIGIT / "-" / "." / "_" / "~"
const OAUTH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'!')
    .add(b'"')
    .add(b'#')
    .add(b'$')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";

/// OAuth 1.0a signer for Twitter API requests.
pub struct OAuthSigner {
    consumer_key: String,
    consumer_secret: String,
    token: Option<String>,
    token_secret: String,
}

impl OAuthSigner {
    /// Create a signer. Without a token the header carries no
    /// `oauth_token` and the signing key ends in a bare `&`.
    #[must_use]
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        token: Option<&str>,
        token_secret: Option<&str>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: token.filter(|t| !t.is_empty()).map(str::to_string),
            token_secret: token_secret.unwrap_or_default().to_string(),
        }
    }

    /// Generate the OAuth 1.0a Authorization header value with a fresh
    /// nonce and the current timestamp.
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, etc.)
    /// * `url` - Request URL; any query string is folded into the signature
    /// * `params` - Query or form parameters covered by the signature
    pub fn sign(&self, method: &str, url: &str, params: &[(String, String)]) -> Result<String> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Auth(format!("Failed to get timestamp: {e}")))?
            .as_secs();

        self.sign_with(method, url, params, &generate_nonce(), timestamp)
    }

    /// Same as [`sign`](Self::sign) with a caller-chosen nonce and timestamp.
    pub fn sign_with(
        &self,
        method: &str,
        url: &str,
        params: &[(String, String)],
        nonce: &str,
        timestamp: u64,
    ) -> Result<String> {
        let mut oauth_params = self.oauth_params(nonce, timestamp);
        let base_string = signature_base_string(method, url, params, &oauth_params)?;
        let signing_key = format!(
            "{}&{}",
            percent_encode(&self.consumer_secret),
            percent_encode(&self.token_secret)
        );

        let signature = hmac_sha1(&signing_key, &base_string)?;
        oauth_params.insert("oauth_signature", signature);

        let header = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {header}"))
    }

    /// The signature base string for a request signed with `nonce` and
    /// `timestamp`.
    pub fn base_string(
        &self,
        method: &str,
        url: &str,
        params: &[(String, String)],
        nonce: &str,
        timestamp: u64,
    ) -> Result<String> {
        signature_base_string(method, url, params, &self.oauth_params(nonce, timestamp))
    }

    fn oauth_params(&self, nonce: &str, timestamp: u64) -> BTreeMap<&'static str, String> {
        let mut oauth_params = BTreeMap::from([
            ("oauth_consumer_key", self.consumer_key.clone()),
            ("oauth_nonce", nonce.to_string()),
            ("oauth_signature_method", SIGNATURE_METHOD.to_string()),
            ("oauth_timestamp", timestamp.to_string()),
            ("oauth_version", OAUTH_VERSION.to_string()),
        ]);
        if let Some(token) = &self.token {
            oauth_params.insert("oauth_token", token.clone());
        }
        oauth_params
    }
}

impl std::fmt::Debug for OAuthSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSigner")
            .field("consumer_key", &self.consumer_key)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

fn signature_base_string(
    method: &str,
    url: &str,
    params: &[(String, String)],
    oauth_params: &BTreeMap<&'static str, String>,
) -> Result<String> {
    let parsed = Url::parse(url)?;
    let mut base_url = format!(
        "{}://{}",
        parsed.scheme(),
        parsed.host_str().unwrap_or_default()
    );
    if let Some(port) = parsed.port() {
        base_url.push_str(&format!(":{port}"));
    }
    base_url.push_str(parsed.path());

    // Encoded pairs sorted by name, then value
    let mut pairs: Vec<(String, String)> = oauth_params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .chain(
            parsed
                .query_pairs()
                .map(|(k, v)| (percent_encode(&k), percent_encode(&v))),
        )
        .chain(
            params
                .iter()
                .map(|(k, v)| (percent_encode(k), percent_encode(v))),
        )
        .collect();
    pairs.sort();

    let param_string = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    Ok(format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(&base_url),
        percent_encode(&param_string)
    ))
}

/// Percent-encode a string according to RFC 3986.
pub(crate) fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

/// Generate a random nonce for OAuth.
fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Compute HMAC-SHA1 and return base64-encoded result.
fn hmac_sha1(key: &str, data: &str) -> Result<String> {
    type HmacSha1 = Hmac<Sha1>;

    let mut mac =
        HmacSha1::new_from_slice(key.as_bytes()).map_err(|e| Error::Auth(e.to_string()))?;

    mac.update(data.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
