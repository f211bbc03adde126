//! Request signing and the application-only token flows.
//!
//! Every request carries exactly one `Authorization` header. With all four
//! user-context keys it is an OAuth 1.0a signature; otherwise it is a bearer
//! token, fetched from `oauth2/token` the first time it is needed and cached
//! in the credential store.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::{debug, info, instrument, warn};

use crate::{
    client::TwitterClient,
    credentials::{BearerToken, Token},
    error::{Error, Result},
    params::Params,
    transport::{HttpRequest, RequestBody},
};

const TOKEN_PATH: &str = "oauth2/token";
const INVALIDATE_TOKEN_PATH: &str = "oauth2/invalidate_token";
const REQUEST_TOKEN_PATH: &str = "oauth/request_token";

impl TwitterClient {
    /// The `Authorization` value for a request to `url` carrying `params`.
    ///
    /// An OAuth signature covers `signature_params`, or `params` when that
    /// is `None`. Multipart uploads pass an empty set here. Both are ignored
    /// for bearer auth.
    pub async fn build_auth_header(
        &self,
        method: &Method,
        url: &str,
        params: &Params,
        signature_params: Option<&Params>,
    ) -> Result<String> {
        if self.credentials.has_user_credentials() {
            let signed = signature_params.unwrap_or(params);
            return self.credentials.user_signer().sign(
                method.as_str(),
                url,
                &signed.text_pairs(),
            );
        }

        let token = self.ensure_bearer_token().await?;
        bearer_header(&token)
    }

    /// The cached bearer token, fetching and caching one if none is held.
    ///
    /// Two callers racing on an empty cache may both fetch; the last one
    /// to finish is cached.
    pub async fn ensure_bearer_token(&self) -> Result<BearerToken> {
        if let Some(token) = self.credentials.bearer_token() {
            return Ok(token);
        }

        let token = BearerToken::Issued(self.token().await?);
        self.credentials.set_bearer_token(token.clone());
        Ok(token)
    }

    /// Request an application-only bearer token with the consumer keys.
    ///
    /// The token is returned, not cached; see
    /// [`ensure_bearer_token`](Self::ensure_bearer_token).
    #[instrument(skip(self))]
    pub async fn token(&self) -> Result<Token> {
        let basic = self.basic_auth_header()?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&basic)?);
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let payload = self
            .execute(HttpRequest {
                method: Method::POST,
                url: self.url(TOKEN_PATH),
                headers,
                query: Vec::new(),
                body: RequestBody::Form(vec![(
                    "grant_type".to_string(),
                    "client_credentials".to_string(),
                )]),
            })
            .await?;

        let token: Token = serde_json::from_value(payload)?;
        info!(token_type = ?token.token_type, "Obtained application-only token");
        Ok(token)
    }

    /// Old name for [`token`](Self::token).
    #[deprecated(note = "use `token` instead")]
    pub async fn bearer_token(&self) -> Result<Token> {
        warn!(
            method = "bearer_token",
            replacement = "token",
            "Deprecated method called"
        );
        self.token().await
    }

    /// Revoke an application-only token. If it is the cached one, the cache
    /// is cleared so the next bearer request fetches a fresh token.
    #[instrument(skip(self, access_token))]
    pub async fn invalidate_token(&self, access_token: impl AsRef<str>) -> Result<Token> {
        let access_token = access_token.as_ref();
        let payload = self
            .post(
                INVALIDATE_TOKEN_PATH,
                &Params::new().with("access_token", access_token),
            )
            .await?;

        let token: Token = serde_json::from_value(payload)?;
        if self.credentials.clear_bearer_token_matching(access_token) {
            debug!("Cleared cached bearer token");
        }
        Ok(token)
    }

    /// Obtain a reverse-auth request token, signed with the consumer keys
    /// only. The body is returned unparsed (a form-encoded OAuth string).
    #[instrument(skip(self))]
    pub async fn reverse_token(&self) -> Result<String> {
        self.require_consumer_credentials()?;

        let url = self.url(REQUEST_TOKEN_PATH);
        let query = vec![("x_auth_mode".to_string(), "reverse_auth".to_string())];
        let auth = self
            .credentials
            .consumer_signer()
            .sign(Method::POST.as_str(), &url, &query)?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&auth)?);

        let response = self
            .send_checked(HttpRequest {
                method: Method::POST,
                url,
                headers,
                query,
                body: RequestBody::Empty,
            })
            .await?;

        Ok(String::from_utf8_lossy(&response.body).into_owned())
    }

    fn basic_auth_header(&self) -> Result<String> {
        self.require_consumer_credentials()?;
        let credentials = format!(
            "{}:{}",
            self.credentials.consumer_key(),
            self.credentials.consumer_secret()
        );
        Ok(format!("Basic {}", BASE64.encode(credentials)))
    }

    fn require_consumer_credentials(&self) -> Result<()> {
        if self.credentials.has_consumer_credentials() {
            Ok(())
        } else {
            Err(Error::Auth(
                "consumer key and secret are required for application-only auth".into(),
            ))
        }
    }
}

fn bearer_header(token: &BearerToken) -> Result<String> {
    match token {
        BearerToken::Raw(raw) => Ok(format!("Bearer {raw}")),
        BearerToken::Issued(issued) if issued.is_bearer() => {
            Ok(format!("Bearer {}", issued.access_token))
        }
        BearerToken::Issued(_) => Err(Error::Auth(
            "cached token is not a bearer token".into(),
        )),
    }
}
