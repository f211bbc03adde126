//! Credential store: user-context keys and the cached bearer token.

use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::oauth::OAuthSigner;

/// An OAuth 2 bearer token as issued by `oauth2/token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,

    /// `"bearer"` for a live token, absent once invalidated
    #[serde(default)]
    pub token_type: Option<String>,
}

impl Token {
    #[must_use]
    pub fn is_bearer(&self) -> bool {
        self.token_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("bearer"))
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.access_token
    }
}

/// The bearer credential the store can hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BearerToken {
    /// A token string supplied by the caller
    Raw(String),
    /// A token fetched from the token endpoint
    Issued(Token),
}

impl BearerToken {
    /// The access token string, regardless of origin.
    #[must_use]
    pub fn access_token(&self) -> &str {
        match self {
            Self::Raw(token) => token,
            Self::Issued(token) => &token.access_token,
        }
    }
}

impl From<String> for BearerToken {
    fn from(token: String) -> Self {
        Self::Raw(token)
    }
}

impl From<&str> for BearerToken {
    fn from(token: &str) -> Self {
        Self::Raw(token.to_string())
    }
}

impl From<Token> for BearerToken {
    fn from(token: Token) -> Self {
        Self::Issued(token)
    }
}

/// Which authentication scheme requests currently use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// OAuth 1.0a with all four user-context keys
    UserContext,
    /// OAuth 2 application-only bearer token
    Bearer,
    /// Nothing usable is configured or cached yet
    None,
}

/// Holds the client's credentials.
///
/// User-context keys are fixed at construction. The bearer token is the only
/// mutable part: it is set explicitly or cached after a lazy fetch.
pub struct CredentialStore {
    consumer_key: String,
    consumer_secret: String,
    access_token: String,
    access_token_secret: String,
    bearer_token: RwLock<Option<BearerToken>>,
}

impl CredentialStore {
    #[must_use]
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            access_token: access_token.into(),
            access_token_secret: access_token_secret.into(),
            bearer_token: RwLock::new(None),
        }
    }

    /// Build a store from configuration, seeding the bearer token if one is
    /// configured.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        let store = Self::new(
            config.consumer_key.clone(),
            config.consumer_secret.clone(),
            config.access_token.clone(),
            config.access_token_secret.clone(),
        );
        if let Some(token) = config.bearer_token.as_deref().filter(|t| !t.is_empty()) {
            store.set_bearer_token(token);
        }
        store
    }

    /// True iff all four user-context fields are non-empty.
    #[must_use]
    pub fn has_user_credentials(&self) -> bool {
        [
            &self.consumer_key,
            &self.consumer_secret,
            &self.access_token,
            &self.access_token_secret,
        ]
        .iter()
        .all(|field| !field.is_empty())
    }

    /// True iff both consumer fields are non-empty.
    #[must_use]
    pub fn has_consumer_credentials(&self) -> bool {
        !self.consumer_key.is_empty() && !self.consumer_secret.is_empty()
    }

    #[must_use]
    pub fn has_bearer_token(&self) -> bool {
        self.bearer_token.read().is_some()
    }

    #[must_use]
    pub fn has_any_credentials(&self) -> bool {
        self.has_user_credentials() || self.has_bearer_token()
    }

    /// The scheme the next request will be signed with. User context wins
    /// over a cached bearer token.
    #[must_use]
    pub fn scheme(&self) -> AuthScheme {
        if self.has_user_credentials() {
            AuthScheme::UserContext
        } else if self.has_bearer_token() {
            AuthScheme::Bearer
        } else {
            AuthScheme::None
        }
    }

    /// A copy of the cached bearer token.
    #[must_use]
    pub fn bearer_token(&self) -> Option<BearerToken> {
        self.bearer_token.read().clone()
    }

    pub fn set_bearer_token(&self, token: impl Into<BearerToken>) {
        *self.bearer_token.write() = Some(token.into());
    }

    /// Drop the cached bearer token so the next bearer request fetches a new one.
    pub fn clear_bearer_token(&self) -> Option<BearerToken> {
        self.bearer_token.write().take()
    }

    /// Drop the cached bearer token only if it is `access_token`.
    pub fn clear_bearer_token_matching(&self, access_token: &str) -> bool {
        let mut cached = self.bearer_token.write();
        if cached
            .as_ref()
            .is_some_and(|t| t.access_token() == access_token)
        {
            *cached = None;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    #[must_use]
    pub fn consumer_secret(&self) -> &str {
        &self.consumer_secret
    }

    /// Signer over the user-context keys.
    #[must_use]
    pub fn user_signer(&self) -> OAuthSigner {
        OAuthSigner::new(
            self.consumer_key.clone(),
            self.consumer_secret.clone(),
            Some(self.access_token.as_str()),
            Some(self.access_token_secret.as_str()),
        )
    }

    /// Signer over the consumer keys alone, for application-signed flows
    /// such as reverse auth.
    #[must_use]
    pub fn consumer_signer(&self) -> OAuthSigner {
        OAuthSigner::new(
            self.consumer_key.clone(),
            self.consumer_secret.clone(),
            None,
            None,
        )
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("consumer_key", &self.consumer_key)
            .field("has_user_credentials", &self.has_user_credentials())
            .field("has_bearer_token", &self.has_bearer_token())
            .finish_non_exhaustive()
    }
}
