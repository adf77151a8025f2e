//! Immutable requests and the mutable builder that produces them.

use crate::{Error, Headers, QueryParams};
use std::fmt;
use std::str::FromStr;

/// The HTTP verbs an endpoint may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl RequestMethod {
    /// Returns `false` for verbs whose responses never carry a body.
    pub fn is_response_body_supported(self) -> bool {
        !matches!(self, RequestMethod::Head)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Put => "PUT",
            RequestMethod::Patch => "PATCH",
            RequestMethod::Delete => "DELETE",
            RequestMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestMethod {
    type Err = Error;

    /// Parses a verb name, ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for empty or unknown names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(RequestMethod::Get),
            "POST" => Ok(RequestMethod::Post),
            "PUT" => Ok(RequestMethod::Put),
            "PATCH" => Ok(RequestMethod::Patch),
            "DELETE" => Ok(RequestMethod::Delete),
            "HEAD" => Ok(RequestMethod::Head),
            "" => Err(Error::InvalidArgument(
                "request method may not be empty, all requests require one".to_string(),
            )),
            other => Err(Error::InvalidArgument(format!(
                "unsupported request method: {}",
                other
            ))),
        }
    }
}

impl From<RequestMethod> for http::Method {
    fn from(method: RequestMethod) -> Self {
        match method {
            RequestMethod::Get => http::Method::GET,
            RequestMethod::Post => http::Method::POST,
            RequestMethod::Put => http::Method::PUT,
            RequestMethod::Patch => http::Method::PATCH,
            RequestMethod::Delete => http::Method::DELETE,
            RequestMethod::Head => http::Method::HEAD,
        }
    }
}

/// A finished request, handed to the [`Transport`](crate::Transport).
///
/// Requests are snapshots: they are only created through
/// [`RequestBuilder::build`] and cannot be changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: RequestMethod,
    path: String,
    body: Option<Vec<u8>>,
    headers: Headers,
    query_params: QueryParams,
}

impl Request {
    /// Starts a new [`RequestBuilder`].
    pub fn builder() -> RequestBuilder {
        RequestBuilder::new()
    }

    pub fn method(&self) -> RequestMethod {
        self.method
    }

    /// The request path, relative to whatever host the transport targets.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The encoded body, if one was attached.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
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

    pub fn query_params(&self) -> &QueryParams {
        &self.query_params
    }

    pub fn has_query_param(&self, name: &str) -> bool {
        self.query_params.has(name)
    }

    pub fn query_param_values(&self, name: &str) -> Option<&[String]> {
        self.query_params.values(name)
    }
}

/// Mutable request under construction.
///
/// The dispatcher fills a builder from the endpoint descriptor and the call
/// arguments, then hands it to every request interceptor before freezing it.
///
/// # Examples
///
/// ```
/// use rested::{RequestBuilder, RequestMethod};
///
/// let mut builder = RequestBuilder::new();
/// builder
///     .set_method(RequestMethod::Post)
///     .set_path("/users")
///     .add_header("Accept", "application/json")
///     .add_query_param("page", "2");
///
/// let request = builder.build();
/// assert_eq!(request.method(), RequestMethod::Post);
/// assert_eq!(request.query_param_values("page").unwrap(), ["2"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    method: RequestMethod,
    path: String,
    body: Option<Vec<u8>>,
    headers: Headers,
    query_params: QueryParams,
}

impl RequestBuilder {
    /// Creates a builder for `GET ""` with no body, headers or query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots the current state into an immutable [`Request`].
    pub fn build(&self) -> Request {
        Request {
            method: self.method,
            path: self.path.clone(),
            body: self.body.clone(),
            headers: self.headers.clone(),
            query_params: self.query_params.clone(),
        }
    }

    pub fn set_method(&mut self, method: RequestMethod) -> &mut Self {
        self.method = method;
        self
    }

    pub fn method(&self) -> RequestMethod {
        self.method
    }

    pub fn set_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.path = path.into();
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_body(&mut self, body: Option<Vec<u8>>) -> &mut Self {
        self.body = body;
        self
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
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

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.add(name, value);
        self
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.remove(name);
        self
    }

    pub fn remove_header_value(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.remove_value(name, value);
        self
    }

    pub fn query_params(&self) -> &QueryParams {
        &self.query_params
    }

    pub fn has_query_param(&self, name: &str) -> bool {
        self.query_params.has(name)
    }

    pub fn query_param_values(&self, name: &str) -> Option<&[String]> {
        self.query_params.values(name)
    }

    pub fn add_query_param(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.query_params.add(name, value);
        self
    }

    pub fn remove_query_param(&mut self, name: &str) -> &mut Self {
        self.query_params.remove(name);
        self
    }

    pub fn remove_query_param_value(&mut self, name: &str, value: &str) -> &mut Self {
        self.query_params.remove_value(name, value);
        self
    }
}
