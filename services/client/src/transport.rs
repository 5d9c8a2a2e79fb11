//! HTTP Transport
//!
//! The seam between the client's retry and streaming logic and the network.
//! [`HttpTransport`] is what the request executor, the account API and stream
//! sessions talk to; [`ReqwestTransport`] is the production implementation.
//! Requests are described by value ([`ApiRequest`]) so that a rejected request
//! can be replayed with a different credential.

use crate::config::ClientConfig;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use reqwest::{
    Client, Method, Url,
    header::{ACCEPT, CACHE_CONTROL},
    multipart,
};
use serde::de::DeserializeOwned;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid request URL '{0}'")]
    InvalidUrl(String),
    #[error("invalid upload part '{0}': {1}")]
    InvalidUpload(String, String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Query string as ordered name/value pairs.
pub type Query = Vec<(String, String)>;

/// Builds a [`Query`], dropping parameters whose value is absent.
pub fn query_from<I, K, V>(params: I) -> Query
where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: Into<String>,
    V: ToString,
{
    params
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.into(), v.to_string())))
        .collect()
}

/// One part of a multipart upload.
#[derive(Debug, Clone)]
pub enum UploadPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: Option<String>,
        bytes: Bytes,
    },
}

/// A multipart form kept as plain data so it can be rebuilt for a retry.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    parts: Vec<UploadPart>,
}

impl UploadForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(UploadPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(UploadPart::File {
            name: name.into(),
            file_name: file_name.into(),
            content_type,
            bytes: bytes.into(),
        });
        self
    }

    pub fn parts(&self) -> &[UploadPart] {
        &self.parts
    }

    /// Builds a fresh `reqwest` form. The boundary is chosen by `reqwest`.
    pub fn to_multipart(&self) -> Result<multipart::Form, TransportError> {
        let mut form = multipart::Form::new();
        for part in &self.parts {
            form = match part {
                UploadPart::Text { name, value } => form.text(name.clone(), value.clone()),
                UploadPart::File {
                    name,
                    file_name,
                    content_type,
                    bytes,
                } => {
                    let mut file =
                        multipart::Part::bytes(bytes.to_vec()).file_name(file_name.clone());
                    if let Some(mime) = content_type {
                        file = file.mime_str(mime).map_err(|e| {
                            TransportError::InvalidUpload(name.clone(), e.to_string())
                        })?;
                    }
                    form.part(name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(UploadForm),
}

/// A replayable description of one request/response exchange.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Query,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(RequestBody::Json(body))
    }

    pub fn put_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, path).with_body(RequestBody::Json(body))
    }

    pub fn upload(path: impl Into<String>, form: UploadForm) -> Self {
        Self::new(Method::POST, path).with_body(RequestBody::Multipart(form))
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Body of a streaming response, chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// A response whose body has not been read yet.
pub struct StreamResponse {
    pub status: u16,
    pub body: Option<ByteStream>,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Issues HTTP exchanges on behalf of the client.
///
/// `bearer` is the access credential to present, if any; implementations must
/// not look credentials up on their own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends `request` and buffers the whole response body.
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<String>,
    ) -> Result<HttpResponse, TransportError>;

    /// Opens a long-lived `GET` whose body is consumed incrementally.
    async fn open_stream(
        &self,
        path: &str,
        query: &[(String, String)],
        bearer: Option<String>,
    ) -> Result<StreamResponse, TransportError>;
}

/// Joins `path` onto `base` by concatenation, so a base with a path prefix keeps it.
pub fn endpoint_url(
    base: &Url,
    path: &str,
    query: &[(String, String)],
) -> Result<Url, TransportError> {
    let joined = format!("{}{}", base.as_str().trim_end_matches('/'), path);
    let mut url = Url::parse(&joined).map_err(|_| TransportError::InvalidUrl(joined.clone()))?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query.iter());
    }
    Ok(url)
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    stream_client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        // Streams stay open for as long as the agent keeps working, so no total timeout.
        let stream_client = Client::builder().build()?;
        Ok(Self {
            client,
            stream_client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<String>,
    ) -> Result<HttpResponse, TransportError> {
        let url = endpoint_url(&self.base_url, &request.path, &request.query)?;
        debug!(method = %request.method, %url, "Sending request");

        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            // No explicit content type: reqwest writes the multipart boundary itself.
            RequestBody::Multipart(form) => builder.multipart(form.to_multipart()?),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        debug!(status, bytes = body.len(), "Response received");
        Ok(HttpResponse { status, body })
    }

    async fn open_stream(
        &self,
        path: &str,
        query: &[(String, String)],
        bearer: Option<String>,
    ) -> Result<StreamResponse, TransportError> {
        let url = endpoint_url(&self.base_url, path, query)?;
        debug!(%url, "Opening event stream");

        let mut builder = self
            .stream_client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map_err(TransportError::from)
            .boxed();
        Ok(StreamResponse {
            status,
            body: Some(body),
        })
    }
}
