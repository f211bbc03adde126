//! Twitter REST API client: the request dispatcher.

use std::fmt;
use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    config::ClientConfig,
    credentials::CredentialStore,
    error::{Error, Result, classify},
    normalize::normalize_keys,
    parallel::ParallelMap,
    params::Params,
    transport::{HttpRequest, HttpResponse, ReqwestTransport, RequestBody, Transport},
};

/// Twitter REST API client.
///
/// Cheap to clone; clones share the transport and the credential store,
/// including the cached bearer token.
#[derive(Clone)]
pub struct TwitterClient {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) credentials: Arc<CredentialStore>,
    base_url: String,
    max_concurrency: usize,
}

impl TwitterClient {
    /// Create a new API client backed by `reqwest`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client that sends through `transport`.
    pub fn with_transport(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            transport,
            credentials: Arc::new(CredentialStore::from_config(config)),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            max_concurrency: config.max_concurrency,
        })
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// User-context credentials or a cached bearer token are available.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.has_any_credentials()
    }

    /// Perform an HTTP GET; `params` become the query string.
    pub async fn get(&self, path: &str, params: &Params) -> Result<Value> {
        self.request(Method::GET, path, params, &HeaderMap::new())
            .await
    }

    /// Perform an HTTP POST; `params` become a form body, or a multipart
    /// body when any of them is media.
    pub async fn post(&self, path: &str, params: &Params) -> Result<Value> {
        self.request(Method::POST, path, params, &HeaderMap::new())
            .await
    }

    /// [`get`](Self::get) and deserialize the normalized payload.
    pub async fn get_as<T: DeserializeOwned>(&self, path: &str, params: &Params) -> Result<T> {
        Ok(serde_json::from_value(self.get(path, params).await?)?)
    }

    /// [`post`](Self::post) and deserialize the normalized payload.
    pub async fn post_as<T: DeserializeOwned>(&self, path: &str, params: &Params) -> Result<T> {
        Ok(serde_json::from_value(self.post(path, params).await?)?)
    }

    /// Sign, send, classify and normalize one request.
    ///
    /// `extra_headers` are sent as given, except that `Authorization` is
    /// always the one computed for this request.
    #[instrument(skip(self, params, extra_headers))]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &Params,
        extra_headers: &HeaderMap,
    ) -> Result<Value> {
        let url = self.url(path);
        let empty = Params::new();

        let (query, body, signature_params) = if method == Method::GET {
            (params.text_pairs(), RequestBody::Empty, params)
        } else if params.has_media() {
            // Multipart bodies are not part of the OAuth signature base
            (Vec::new(), RequestBody::Multipart(params.clone()), &empty)
        } else {
            (Vec::new(), RequestBody::Form(params.text_pairs()), params)
        };

        let auth = self
            .build_auth_header(&method, &url, params, Some(signature_params))
            .await?;

        let mut headers = extra_headers.clone();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&auth)?);

        self.execute(HttpRequest {
            method,
            url,
            headers,
            query,
            body,
        })
        .await
    }

    /// GET `path` once per parameter set, concurrently, results in input order.
    pub async fn get_each(&self, path: &str, param_sets: Vec<Params>) -> Result<Vec<Value>> {
        let client = self.clone();
        let path = path.to_string();

        ParallelMap::new(param_sets)
            .with_limit(self.max_concurrency)
            .map(move |params| {
                let client = client.clone();
                let path = path.clone();
                async move { client.get(&path, &params).await }
            })
            .await
    }

    /// Like [`get_each`](Self::get_each) for endpoints returning arrays;
    /// the arrays are concatenated in input order.
    pub async fn get_each_flat(&self, path: &str, param_sets: Vec<Params>) -> Result<Vec<Value>> {
        let client = self.clone();
        let path = path.to_string();

        ParallelMap::new(param_sets)
            .with_limit(self.max_concurrency)
            .flat_map(move |params| {
                let client = client.clone();
                let path = path.clone();
                async move {
                    Ok::<_, Error>(match client.get(&path, &params).await? {
                        Value::Array(items) => items,
                        other => vec![other],
                    })
                }
            })
            .await
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send and fail on any classified error status, before the body is
    /// looked at.
    pub(crate) async fn send_checked(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(method = %request.method, url = %request.url, "Making Twitter API request");

        let response = self.transport.send(request).await?;
        if let Some(error) = classify(&response) {
            debug!(status = error.status(), kind = %error.kind(), "Twitter API error");
            return Err(error.into());
        }
        Ok(response)
    }

    /// [`send_checked`](Self::send_checked), then parse and normalize the body.
    pub(crate) async fn execute(&self, request: HttpRequest) -> Result<Value> {
        let response = self.send_checked(request).await?;
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        let payload: Value = serde_json::from_slice(&response.body)?;
        Ok(normalize_keys(payload))
    }
}

impl fmt::Debug for TwitterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitterClient")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::params::Media;
    use crate::transport::TransportError;
    use crate::transport::stub::{StubTransport, json_response};

    fn user_config() -> ClientConfig {
        ClientConfig {
            consumer_key: "test_consumer_key".into(),
            consumer_secret: "test_consumer_secret".into(),
            access_token: "test_access_token".into(),
            access_token_secret: "test_access_token_secret".into(),
            ..Default::default()
        }
    }

    fn client_with(config: &ClientConfig, stub: &Arc<StubTransport>) -> TwitterClient {
        TwitterClient::with_transport(config, stub.clone()).unwrap()
    }

    fn auth_of(request: &HttpRequest) -> &str {
        request.headers[AUTHORIZATION].to_str().unwrap()
    }

    #[tokio::test]
    async fn test_get_sends_query_and_normalizes() {
        let stub = Arc::new(StubTransport::new(|_| {
            Ok(json_response(200, &json!({ "screen_name": "jack", "idStr": "12" })))
        }));
        let client = client_with(&user_config(), &stub);

        let body = client
            .get("/1.1/users/show.json", &Params::new().with("screen_name", "jack"))
            .await
            .unwrap();

        assert_eq!(body, json!({ "screen_name": "jack", "idStr": "12" }));
        let requests = stub.requests();
        let request = &requests[0];
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url, "https://api.twitter.com/1.1/users/show.json");
        assert_eq!(
            request.query,
            vec![("screen_name".to_string(), "jack".to_string())]
        );
        assert!(matches!(request.body, RequestBody::Empty));
        assert!(auth_of(request).starts_with("OAuth "));
    }

    #[tokio::test]
    async fn test_post_sends_form_body() {
        let stub = Arc::new(StubTransport::new(|_| Ok(json_response(200, &json!({ "id": 1 })))));
        let client = client_with(&user_config(), &stub);

        client
            .post("1.1/statuses/update.json", &Params::new().with("status", "hi"))
            .await
            .unwrap();

        let requests = stub.requests();
        let request = &requests[0];
        assert_eq!(request.url, "https://api.twitter.com/1.1/statuses/update.json");
        assert!(request.query.is_empty());
        match &request.body {
            RequestBody::Form(fields) => {
                assert_eq!(fields, &vec![("status".to_string(), "hi".to_string())]);
            }
            other => panic!("expected form body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_with_media_sends_multipart() {
        let stub = Arc::new(StubTransport::new(|_| Ok(json_response(200, &json!({})))));
        let client = client_with(&user_config(), &stub);
        let params = Params::new()
            .with("status", "look")
            .with("media[]", Media::new("cat.png", "image/png", vec![1_u8, 2]));

        client
            .post("1.1/statuses/update_with_media.json", &params)
            .await
            .unwrap();

        let requests = stub.requests();
        let request = &requests[0];
        assert!(matches!(&request.body, RequestBody::Multipart(p) if *p == params));
    }

    #[tokio::test]
    async fn test_error_short_circuits_before_parsing() {
        let stub = Arc::new(StubTransport::new(|_| {
            Ok(HttpResponse {
                status: reqwest::StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                body: bytes::Bytes::from_static(b"{ not json"),
            })
        }));
        let client = client_with(&user_config(), &stub);

        let err = client.get("1.1/missing.json", &Params::new()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        assert_eq!(err.api().unwrap().message(), "Not Found");
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_classified() {
        let stub = Arc::new(StubTransport::new(|_| {
            Err(TransportError::new("connection refused"))
        }));
        let client = client_with(&user_config(), &stub);

        let err = client.get("1.1/x.json", &Params::new()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(err.kind(), None);
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let stub = Arc::new(StubTransport::new(|_| {
            Ok(HttpResponse {
                status: reqwest::StatusCode::NO_CONTENT,
                headers: HeaderMap::new(),
                body: bytes::Bytes::new(),
            })
        }));
        let client = client_with(&user_config(), &stub);

        let body = client.post("1.1/x.json", &Params::new()).await.unwrap();
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_extra_headers_cannot_override_authorization() {
        let stub = Arc::new(StubTransport::new(|_| Ok(json_response(200, &json!({})))));
        let client = client_with(&user_config(), &stub);

        let mut extra = HeaderMap::new();
        extra.insert(AUTHORIZATION, HeaderValue::from_static("Basic forged"));
        extra.insert("x-custom", HeaderValue::from_static("1"));

        client
            .request(Method::GET, "1.1/x.json", &Params::new(), &extra)
            .await
            .unwrap();

        let requests = stub.requests();
        let request = &requests[0];
        assert!(auth_of(request).starts_with("OAuth "));
        assert_eq!(request.headers["x-custom"], "1");
    }

    #[tokio::test]
    async fn test_get_as_deserializes_normalized_payload() {
        #[derive(Deserialize)]
        struct User {
            screen_name: String,
            followers_count: u64,
        }

        let stub = Arc::new(StubTransport::new(|_| {
            Ok(json_response(200, &json!({ "screen_name": "jack", "followers_count": 7 })))
        }));
        let client = client_with(&user_config(), &stub);

        let user: User = client.get_as("1.1/users/show.json", &Params::new()).await.unwrap();
        assert_eq!(user.screen_name, "jack");
        assert_eq!(user.followers_count, 7);
    }

    #[tokio::test]
    async fn test_get_each_keeps_input_order() {
        let stub = Arc::new(StubTransport::new(|request| {
            let id = &request.query[0].1;
            Ok(json_response(200, &json!({ "id": id })))
        }));
        let client = client_with(&user_config(), &stub);
        let ids = ["3", "1", "2", "5"];

        let results = client
            .get_each(
                "1.1/users/show.json",
                ids.iter().map(|id| Params::new().with("user_id", *id)).collect(),
            )
            .await
            .unwrap();

        let returned: Vec<&str> = results.iter().map(|v| v["id"].as_str().unwrap()).collect();
        assert_eq!(returned, ids);
        assert_eq!(stub.sent(), 4);
    }

    #[tokio::test]
    async fn test_get_each_flat_concatenates_arrays() {
        let stub = Arc::new(StubTransport::new(|request| {
            let ids: Vec<Value> = request.query[0]
                .1
                .split(',')
                .map(|id| json!({ "id": id }))
                .collect();
            Ok(json_response(200, &Value::Array(ids)))
        }));
        let client = client_with(&user_config(), &stub);

        let results = client
            .get_each_flat(
                "1.1/users/lookup.json",
                vec![
                    Params::new().with("user_id", "1,2"),
                    Params::new().with("user_id", "3"),
                ],
            )
            .await
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|v| v["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_get_each_fails_on_any_unit() {
        let stub = Arc::new(StubTransport::new(|request| {
            if request.query[0].1 == "bad" {
                Ok(json_response(404, &json!({ "errors": [{ "message": "No user", "code": 50 }] })))
            } else {
                Ok(json_response(200, &json!({})))
            }
        }));
        let client = client_with(&user_config(), &stub);

        let err = client
            .get_each(
                "1.1/users/show.json",
                ["ok", "bad", "ok"]
                    .iter()
                    .map(|id| Params::new().with("user_id", *id))
                    .collect(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        assert_eq!(err.api().unwrap().code(), Some(50));
        assert_eq!(stub.sent(), 3);
    }

    #[tokio::test]
    async fn test_each_unit_signs_independently() {
        let stub = Arc::new(StubTransport::new(|_| Ok(json_response(200, &json!({})))));
        let client = client_with(&user_config(), &stub);

        client
            .get_each(
                "1.1/x.json",
                (0..5).map(|n| Params::new().with("n", n as u64)).collect(),
            )
            .await
            .unwrap();

        let headers: HashSet<String> = stub
            .requests()
            .iter()
            .map(|r| auth_of(r).to_string())
            .collect();
        assert_eq!(headers.len(), 5);
    }

    #[test]
    fn test_has_credentials() {
        let stub = Arc::new(StubTransport::new(|_| Ok(json_response(200, &json!({})))));
        assert!(client_with(&user_config(), &stub).has_credentials());

        let app_only = client_with(
            &ClientConfig {
                consumer_key: "ck".into(),
                consumer_secret: "cs".into(),
                ..Default::default()
            },
            &stub,
        );
        assert!(!app_only.has_credentials());
        app_only.credentials().set_bearer_token("AAAA");
        assert!(app_only.has_credentials());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let stub = Arc::new(StubTransport::new(|_| Ok(json_response(200, &json!({})))));
        let config = ClientConfig {
            max_concurrency: 0,
            ..user_config()
        };
        assert!(matches!(
            TwitterClient::with_transport(&config, stub),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_url_joining() {
        let stub = Arc::new(StubTransport::new(|_| Ok(json_response(200, &json!({})))));
        let config = ClientConfig {
            api_url: "https://api.twitter.com/".into(),
            ..user_config()
        };
        let client = client_with(&config, &stub);

        assert_eq!(client.url("/oauth2/token"), "https://api.twitter.com/oauth2/token");
        assert_eq!(client.url("oauth2/token"), "https://api.twitter.com/oauth2/token");
    }
}
