//! Raw transport responses and the typed results built from them.
//!
//! A [`Response`] is what a [`Transport`](crate::Transport) hands back: status,
//! optional reason message, headers and a one-shot [`Body`] stream. The
//! dispatcher turns it into either a [`RestResponse`] (decoded data plus status
//! and headers), a [`StreamedResponse`] (the raw body, untouched) or a plain
//! decoded value.

use crate::Headers;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use http::StatusCode;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A single-use response body stream.
///
/// Reading the body to the end or calling [`Body::close`] consumes it. Because
/// every consuming operation takes the body by value, a body can never be read
/// or closed twice.
pub struct Body {
    // The lock is never contended: all access goes through `get_mut`. It only
    // lets a `Body` be shared across threads inside error values.
    stream: Mutex<BoxStream<'static, io::Result<Bytes>>>,
}

impl Body {
    /// Wraps an arbitrary chunk stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            stream: Mutex::new(stream.boxed()),
        }
    }

    /// A body that yields `bytes` as one chunk.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::from_stream(stream::iter(std::iter::once(Ok(bytes))))
    }

    /// Reads the next chunk, or `None` once the stream is exhausted.
    pub async fn chunk(&mut self) -> io::Result<Option<Bytes>> {
        self.stream.get_mut().next().await.transpose()
    }

    /// Reads the remaining stream into memory.
    pub async fn bytes(mut self) -> io::Result<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }

    /// Reads the remaining stream as text, replacing invalid UTF-8.
    pub async fn text(self) -> io::Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Releases the underlying stream without reading it.
    pub fn close(self) {
        drop(self);
    }
}

impl Stream for Body {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().stream.get_mut().poll_next_unpin(cx)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body").finish_non_exhaustive()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::from_bytes(text)
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::from_bytes(text)
    }
}

/// A response as received from the transport.
///
/// # Examples
///
/// ```
/// use rested::Response;
/// use http::StatusCode;
///
/// let response = Response::new(StatusCode::CREATED)
///     .with_message("Created")
///     .with_header("Location", "/users/7")
///     .with_body("{}");
///
/// assert!(response.is_success());
/// assert_eq!(response.header("Location"), Some("/users/7"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    message: Option<String>,
    headers: Headers,
    body: Option<Body>,
}

impl Response {
    /// Creates a response with no message, headers or body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: None,
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// The reason phrase, if the transport received one.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.has(name)
    }

    pub fn header_values(&self, name: &str) -> Option<&[String]> {
        self.headers.values(name)
    }

    /// The first value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first(name)
    }

    /// `true` for status codes in `200..300`.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// `true` while the body has neither been taken nor closed.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn body_mut(&mut self) -> Option<&mut Body> {
        self.body.as_mut()
    }

    /// Takes ownership of the body. Later calls return `None`.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Closes the body if it is still held.
    pub fn close(&mut self) {
        if let Some(body) = self.body.take() {
            body.close();
        }
    }
}

/// Decoded response data together with the HTTP details it arrived with.
///
/// Endpoints declared with [`ReturnType::Response`](crate::ReturnType::Response)
/// produce this type, so callers can look at the status code and headers
/// next to the decoded body.
///
/// # Examples
///
/// ```
/// use rested::{Headers, RestResponse};
/// use http::StatusCode;
///
/// let response = RestResponse::new(42, StatusCode::OK, None, Headers::new());
///
/// let text = response.map(|n| n.to_string());
/// assert_eq!(text.data, "42");
/// assert_eq!(text.status_code(), 200);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse<T> {
    /// The decoded response data.
    pub data: T,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The reason phrase, if one was received.
    pub message: Option<String>,

    /// The response headers.
    pub headers: Headers,
}

impl<T> RestResponse<T> {
    pub fn new(data: T, status: StatusCode, message: Option<String>, headers: Headers) -> Self {
        Self {
            data,
            status,
            message,
            headers,
        }
    }

    /// Maps the response data to a different type, keeping the HTTP details.
    pub fn map<U, F>(self, f: F) -> RestResponse<U>
    where
        F: FnOnce(T) -> U,
    {
        RestResponse {
            data: f(self.data),
            status: self.status,
            message: self.message,
            headers: self.headers,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns the first value of a header.
    ///
    /// Header names are matched exactly as the transport reported them.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first(name)
    }

    pub fn header_values(&self, name: &str) -> Option<&[String]> {
        self.headers.values(name)
    }
}

impl<T> AsRef<T> for RestResponse<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for RestResponse<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

/// A successful response whose body is handed to the caller undecoded.
///
/// The streamed response owns the body: the caller reads it (for example with
/// [`StreamedResponse::bytes`]) or releases it with [`StreamedResponse::close`].
#[derive(Debug)]
pub struct StreamedResponse {
    status: StatusCode,
    message: Option<String>,
    headers: Headers,
    body: Option<Body>,
}

impl StreamedResponse {
    pub(crate) fn new(
        status: StatusCode,
        message: Option<String>,
        headers: Headers,
        body: Option<Body>,
    ) -> Self {
        Self {
            status,
            message,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first(name)
    }

    /// The body stream, absent when the transport received none.
    pub fn body_mut(&mut self) -> Option<&mut Body> {
        self.body.as_mut()
    }

    pub fn into_body(self) -> Option<Body> {
        self.body
    }

    /// Reads the whole body. An absent body reads as empty.
    pub async fn bytes(self) -> std::io::Result<Bytes> {
        match self.body {
            Some(body) => body.bytes().await,
            None => Ok(Bytes::new()),
        }
    }

    /// Releases the body stream.
    pub fn close(self) {
        if let Some(body) = self.body {
            body.close();
        }
    }
}
