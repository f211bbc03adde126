//! HTTP transport boundary.
//!
//! The dispatcher only needs "send this request, give me status, headers and
//! body". [`ReqwestTransport`] is the production implementation; tests plug
//! in their own.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;

use crate::config::ClientConfig;
use crate::params::{ParamValue, Params};

/// A fully built request, ready to send.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

/// Request payload.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    /// `multipart/form-data`, used whenever a parameter is media
    Multipart(Params),
}

/// Status, headers and raw body of a response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A failure below HTTP: DNS, connect, TLS, timeout, broken body.
///
/// Never classified as an API error.
#[derive(Debug, Error)]
#[error("Transport error: {0}")]
pub struct TransportError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl TransportError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(source.into())
    }

    /// True if the underlying failure was a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.0
            .downcast_ref::<reqwest::Error>()
            .is_some_and(reqwest::Error::is_timeout)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Sends requests on behalf of the client.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport honoring the configured timeout and user agent.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing `reqwest` client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Multipart(params) => builder.multipart(multipart_form(params)?),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn multipart_form(params: Params) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for (name, value) in params {
        form = match value {
            ParamValue::Text(text) => form.text(name, text),
            ParamValue::Media(media) => {
                let part = Part::bytes(media.data.to_vec())
                    .file_name(media.file_name)
                    .mime_str(&media.content_type)?;
                form.part(name, part)
            }
        };
    }
    Ok(form)
}
