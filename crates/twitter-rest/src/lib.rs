//! Twitter REST API client core
//!
//! The shared plumbing every Twitter REST endpoint goes through:
//!
//! - **Credentials**: OAuth 1.0a user-context keys and an OAuth 2 bearer
//!   token that is fetched lazily and cached
//! - **Signing**: HMAC-SHA1 `Authorization` headers, or `Bearer` when no
//!   user context is configured
//! - **Errors**: every error status classified into an [`ErrorKind`], with
//!   403 refinement by message
//! - **Dispatch**: GET/POST with form or multipart bodies and
//!   key-normalized JSON payloads
//! - **Batches**: ordered parallel maps over independent requests
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use twitter_rest::{ClientConfig, Params, TwitterClient};
//!
//! let client = TwitterClient::new(&ClientConfig {
//!     consumer_key: "ck".into(),
//!     consumer_secret: "cs".into(),
//!     ..Default::default()
//! })?;
//!
//! // No user context: a bearer token is fetched on first use
//! let tweets = client
//!     .get("1.1/search/tweets.json", &Params::new().with("q", "rustlang"))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod auth;
mod client;
mod config;
mod credentials;
mod error;
mod normalize;
mod oauth;
mod parallel;
mod params;
mod rate_limit;
mod transport;

pub use client::TwitterClient;
pub use config::ClientConfig;
pub use credentials::{AuthScheme, BearerToken, CredentialStore, Token};
pub use error::{ApiError, Error, ErrorDetail, ErrorKind, Result, classify};
pub use normalize::normalize_keys;
pub use oauth::OAuthSigner;
pub use parallel::{ParallelMap, flat_parallel_map, parallel_map};
pub use params::{Media, ParamValue, Params};
pub use rate_limit::RateLimitInfo;
pub use transport::{
    HttpRequest, HttpResponse, ReqwestTransport, RequestBody, Transport, TransportError,
};
