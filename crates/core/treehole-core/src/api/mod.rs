//! HTTP plumbing for the Treehole backend
//!
//! [`ApiClient`] owns the pooled `reqwest` client, base URL and bearer token.
//! JSON endpoints go through one place so every collaborator classifies
//! failures the same way: transport errors, non-JSON bodies, error statuses
//! and `"ok": false` envelopes all become [`TreeholeError`]s with a
//! user-presentable message.

pub mod types;

pub use types::*;

use crate::config::ClientConfig;
use crate::streaming::FragmentStream;
use crate::{Result, TreeholeError, SERVICE_UNAVAILABLE};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Path of the streaming chat endpoint
pub const CHAT_STREAM_PATH: &str = "/chat_stream";

/// Error bodies larger than this are not parsed
const MAX_ERROR_BODY: usize = 64 * 1024;

/// A response whose body may be consumed incrementally
pub struct StreamResponse {
    /// HTTP status code
    pub status: u16,
    /// Declared `Content-Type`, empty when absent
    pub content_type: String,
    /// Body fragments, `None` when the response carries no body
    pub body: Option<FragmentStream>,
}

impl StreamResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the declared content type marks an error payload rather than a stream
    pub fn is_error_shaped(&self) -> bool {
        let ct = self.content_type.to_ascii_lowercase();
        ct.contains("application/json") || ct.contains("text/html")
    }
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Opens the streaming chat request
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send one chat request and return the response head with its body stream
    async fn open_chat_stream(&self, request: &ChatStreamRequest) -> Result<StreamResponse>;
}

/// Pick the most useful message out of an error body
///
/// Only JSON bodies are read; `msg` wins over a string `detail`. Anything
/// else falls back to the generic service-unavailable message.
pub fn error_message(content_type: &str, body: &[u8]) -> String {
    if !content_type.to_ascii_lowercase().contains("application/json") {
        return SERVICE_UNAVAILABLE.to_string();
    }
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => message_field(&value).unwrap_or_else(|| SERVICE_UNAVAILABLE.to_string()),
        Err(_) => SERVICE_UNAVAILABLE.to_string(),
    }
}

fn message_field(value: &serde_json::Value) -> Option<String> {
    ["msg", "detail"].iter().find_map(|key| {
        value
            .get(*key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Client for the Treehole REST endpoints
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Build a client with its own connection pool
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .tcp_keepalive(std::time::Duration::from_secs(60))
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self::with_client(
            client,
            config.base_url.clone(),
            config.token.clone(),
        ))
    }

    /// Wrap an existing `reqwest` client
    pub fn with_client(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Backend origin
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an endpoint path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// `GET` a JSON endpoint
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let builder = self.authorize(self.client.get(self.url(path)).query(query));
        self.fetch_json(builder).await
    }

    /// `POST` a JSON body to a JSON endpoint
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.authorize(self.client.post(self.url(path)).json(body));
        self.fetch_json(builder).await
    }

    /// `POST` a multipart form to a JSON endpoint
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T> {
        let builder = self.authorize(self.client.post(self.url(path)).multipart(form));
        self.fetch_json(builder).await
    }

    /// `GET` returning the raw response, for binary payloads
    pub async fn get_raw(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let resp = self
            .authorize(self.client.get(self.url(path)).query(query))
            .send()
            .await?;
        Ok(resp)
    }

    /// Send a request and decode a JSON envelope
    pub async fn fetch_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let resp = builder.send().await.map_err(|e| {
            warn!("Request failed before a response arrived: {}", e);
            TreeholeError::Network(e)
        })?;
        let status = resp.status();
        let content_type = content_type_of(&resp);

        if !content_type.to_ascii_lowercase().contains("application/json") {
            debug!(%status, %content_type, "Non-JSON response");
            return Err(TreeholeError::request_failed(SERVICE_UNAVAILABLE));
        }

        let body = resp.bytes().await?;
        let value: serde_json::Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(_) => return Err(TreeholeError::request_failed(SERVICE_UNAVAILABLE)),
        };

        if !status.is_success() || value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
            let msg = message_field(&value).unwrap_or_else(|| SERVICE_UNAVAILABLE.to_string());
            debug!(%status, %msg, "Error envelope");
            return Err(TreeholeError::RequestFailed(msg));
        }

        Ok(serde_json::from_value(value)?)
    }
}

/// Declared content type of a response, empty when absent
pub fn content_type_of(resp: &reqwest::Response) -> String {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ChatTransport for ApiClient {
    async fn open_chat_stream(&self, request: &ChatStreamRequest) -> Result<StreamResponse> {
        let resp = self
            .authorize(self.client.post(self.url(CHAT_STREAM_PATH)).json(request))
            .send()
            .await?;

        let status = resp.status();
        let content_type = content_type_of(&resp);
        let has_body = status != StatusCode::NO_CONTENT && resp.content_length() != Some(0);
        debug!(%status, %content_type, has_body, "Chat stream opened");

        let body = if has_body {
            Some(
                resp.bytes_stream()
                    .map(|chunk| chunk.map_err(TreeholeError::from))
                    .boxed(),
            )
        } else {
            None
        };

        Ok(StreamResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Read at most a small error body and extract its message
pub(crate) async fn read_error_message(response: StreamResponse) -> String {
    let StreamResponse {
        content_type, body, ..
    } = response;
    match body {
        Some(stream) => match crate::streaming::collect_bytes(stream, MAX_ERROR_BODY).await {
            Ok(bytes) => error_message(&content_type, &bytes),
            Err(_) => SERVICE_UNAVAILABLE.to_string(),
        },
        None => SERVICE_UNAVAILABLE.to_string(),
    }
}
