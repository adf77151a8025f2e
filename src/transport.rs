//! Transports execute frozen requests.
//!
//! The [`Transport`] trait is the only thing the dispatcher needs from the
//! network. [`HttpTransport`] is the bundled implementation on top of
//! `reqwest`; tests and special environments can plug in their own.

use crate::headers::CONTENT_LENGTH;
use crate::{
    Body, BoxError, EndpointDescriptor, Error, Headers, Request, RequestMethod, Response, Result,
};
use async_trait::async_trait;
use futures::TryStreamExt;
use http::{HeaderMap, HeaderName, HeaderValue};
use hyper::ext::ReasonPhrase;
use serde_json::Value;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Executes one request and returns the raw response.
///
/// The endpoint and the call arguments are passed along so transports can
/// make per-endpoint decisions. Any error is surfaced to the caller as
/// [`Error::Transport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &Request,
        endpoint: &EndpointDescriptor,
        args: &[Value],
    ) -> std::result::Result<Response, BoxError>;
}

/// HTTP and HTTPS transport backed by a pooled `reqwest` client.
///
/// Request paths are appended to the path of the base URL, query parameters
/// are URL-encoded, and every header value is sent. Response header names
/// are reported in canonical `Title-Case` form (`Content-Type`).
///
/// Cloning is cheap and shares the connection pool.
///
/// # Examples
///
/// ```no_run
/// use rested::HttpTransport;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), rested::Error> {
/// let transport = HttpTransport::builder()
///     .base_url("https://api.example.com/v1")?
///     .timeout(Duration::from_secs(30))
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    inner: Arc<HttpTransportInner>,
}

#[derive(Debug)]
struct HttpTransportInner {
    http_client: reqwest::Client,
    base_url: Url,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::new()
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// The full URL for `request`: base URL path, then request path, then
    /// the query parameters.
    fn url_for(&self, request: &Request) -> Url {
        let mut url = self.inner.base_url.clone();
        let base = url.path().trim_end_matches('/');
        let path = if request.path().starts_with('/') || request.path().is_empty() {
            format!("{}{}", base, request.path())
        } else {
            format!("{}/{}", base, request.path())
        };
        url.set_path(&path);

        if !request.query_params().is_empty() {
            let mut query = url.query_pairs_mut();
            for (name, value) in request.query_params().pairs() {
                query.append_pair(name, value);
            }
        }

        url
    }

    /// Default headers, with every header the request sets replacing the
    /// default of the same name.
    fn headers_for(&self, request: &Request) -> std::result::Result<HeaderMap, BoxError> {
        let mut headers = self.inner.default_headers.clone();
        let mut pending = Vec::with_capacity(request.headers().len());
        for (name, values) in request.headers().iter() {
            let name = HeaderName::try_from(name)?;
            headers.remove(&name);
            pending.push((name, values));
        }

        // Keys differing only in case map to the same header name.
        for (name, values) in pending {
            for value in values {
                headers.append(name.clone(), HeaderValue::try_from(value.as_str())?);
            }
        }
        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &Request,
        endpoint: &EndpointDescriptor,
        _args: &[Value],
    ) -> std::result::Result<Response, BoxError> {
        let url = self.url_for(request);

        tracing::debug!(
            endpoint = endpoint.name(),
            method = %request.method(),
            url = %url,
            "Sending HTTP request"
        );

        let mut builder = self
            .inner
            .http_client
            .request(request.method().into(), url)
            .headers(self.headers_for(request)?);

        if let Some(timeout) = self.inner.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = canonical_headers(response.headers());
        let message = reason_phrase(&response);

        let empty = request.method() == RequestMethod::Head
            || headers
                .first(CONTENT_LENGTH)
                .and_then(|length| length.trim().parse::<u64>().ok())
                == Some(0);

        let mut converted = Response::new(status).with_headers(headers);
        if let Some(message) = message {
            converted = converted.with_message(message);
        }
        if !empty {
            converted = converted.with_body(Body::from_stream(
                response.bytes_stream().map_err(io::Error::other),
            ));
        }

        Ok(converted)
    }
}

/// The reason phrase the server sent, or the canonical one for the status.
///
/// hyper only records the phrase when it differs from the canonical text.
fn reason_phrase(response: &reqwest::Response) -> Option<String> {
    response
        .extensions()
        .get::<ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .or_else(|| response.status().canonical_reason().map(str::to_string))
}

/// Converts a header map, restoring the canonical capitalization of names.
fn canonical_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        headers.add(
            canonical_name(name.as_str()),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }
    headers
}

/// `content-type` becomes `Content-Type`.
fn canonical_name(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Builder for configuring and creating an [`HttpTransport`].
pub struct HttpTransportBuilder {
    base_url: Option<Url>,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
}

impl HttpTransportBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            default_headers: HeaderMap::new(),
            timeout: None,
        }
    }

    /// Sets the scheme, host, port and base path of every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or its scheme is neither
    /// `http` nor `https`.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            )));
        }
        self.base_url = Some(url);
        Ok(self)
    }

    /// Adds a header sent with every request unless the request sets it.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the timeout applied to each request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the configured transport.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was provided or if the HTTP client
    /// could not be created.
    pub fn build(self) -> Result<HttpTransport> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Configuration("Base URL is required".to_string()))?;

        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpTransport {
            inner: Arc::new(HttpTransportInner {
                http_client,
                base_url,
                default_headers: self.default_headers,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
