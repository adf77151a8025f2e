//! Endpoint and resource descriptors.
//!
//! A descriptor is the static description of one callable endpoint: its verb,
//! path template, how each argument is placed into the request, which error
//! type each non-success status maps to, and what the caller expects back.
//! Descriptors are built once, when the resource is composed, and shared by
//! every call.

use crate::{media, Error, RequestMethod, Result};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// Where a call argument ends up in the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamRole {
    /// One header value per element, under the given header name.
    Header(String),
    /// Replaces every `{name}` placeholder in the path.
    Path(String),
    /// One query value per element, under the given parameter name.
    Query(String),
    /// Encoded as the request body with the given media type and charset.
    Body { media_type: String, charset: String },
    /// Not placed into the request. Interceptors and the transport still see it.
    Unbound,
}

/// An error kind a non-success status can be mapped to.
///
/// Streamed error types keep the raw response body instead of decoding it.
///
/// # Examples
///
/// ```
/// use rested::ErrorType;
///
/// const NOT_FOUND: ErrorType = ErrorType::new("NotFound");
/// assert_eq!(NOT_FOUND.name(), "NotFound");
/// assert!(!NOT_FOUND.is_streamed());
/// assert!(ErrorType::streamed("Download").is_streamed());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorType {
    name: Cow<'static, str>,
    streamed: bool,
}

impl ErrorType {
    /// Name of the default error type used when no rule matches.
    pub const REST: &'static str = "RestError";

    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            streamed: false,
        }
    }

    /// An error type that takes ownership of the raw response body.
    pub const fn streamed(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            streamed: true,
        }
    }

    pub fn named(name: impl Into<String>, streamed: bool) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            streamed,
        }
    }

    /// The default error type.
    pub const fn rest() -> Self {
        Self::new(Self::REST)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_streamed(&self) -> bool {
        self.streamed
    }
}

impl Default for ErrorType {
    fn default() -> Self {
        Self::rest()
    }
}

/// Maps an inclusive status code range to an error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRule {
    pub start: u16,
    pub end: u16,
    pub error_type: ErrorType,
}

impl ErrorRule {
    pub fn new(start: u16, end: u16, error_type: ErrorType) -> Self {
        Self {
            start,
            end,
            error_type,
        }
    }

    pub fn matches(&self, status: u16) -> bool {
        self.start <= status && status <= self.end
    }
}

/// What a successful call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnType {
    /// Nothing; the response body is never decoded.
    #[default]
    Unit,
    /// The decoded body. Holds the target type name for decoders.
    Value(&'static str),
    /// The decoded body plus status, message and headers.
    Response(&'static str),
    /// The raw body stream with status, message and headers.
    Streamed,
}

impl ReturnType {
    pub fn value<T: ?Sized>() -> Self {
        ReturnType::Value(std::any::type_name::<T>())
    }

    pub fn response<T: ?Sized>() -> Self {
        ReturnType::Response(std::any::type_name::<T>())
    }

    /// `true` for the kinds that carry status and headers.
    pub fn is_typed_response(self) -> bool {
        matches!(self, ReturnType::Response(_) | ReturnType::Streamed)
    }
}

/// Static description of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    name: String,
    method: RequestMethod,
    resource_path: String,
    path: String,
    media_types: Vec<String>,
    charsets: Vec<String>,
    errors: Vec<ErrorRule>,
    params: Vec<ParamRole>,
    return_type: ReturnType,
}

impl EndpointDescriptor {
    /// Starts describing an endpoint.
    ///
    /// # Examples
    ///
    /// ```
    /// use rested::{EndpointDescriptor, ErrorType, RequestMethod, ReturnType};
    ///
    /// # fn main() -> Result<(), rested::Error> {
    /// let endpoint = EndpointDescriptor::builder("get_user", RequestMethod::Get, "/users/{id}")
    ///     .path_param("id")
    ///     .header("Authorization")
    ///     .error(404, 404, ErrorType::new("UserNotFound"))
    ///     .returns(ReturnType::Value("User"))
    ///     .build()?;
    ///
    /// assert_eq!(endpoint.error_type_for(404).name(), "UserNotFound");
    /// assert_eq!(endpoint.error_type_for(500).name(), "RestError");
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder(
        name: impl Into<String>,
        method: RequestMethod,
        path: impl Into<String>,
    ) -> EndpointBuilder {
        EndpointBuilder::new(name, method, path)
    }

    /// The method identity of this endpoint.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> RequestMethod {
        self.method
    }

    /// The base path of the enclosing resource, empty if none.
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    /// The path template, without the resource base path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn media_types(&self) -> &[String] {
        &self.media_types
    }

    pub fn charsets(&self) -> &[String] {
        &self.charsets
    }

    pub fn errors(&self) -> &[ErrorRule] {
        &self.errors
    }

    pub fn params(&self) -> &[ParamRole] {
        &self.params
    }

    pub fn return_type(&self) -> ReturnType {
        self.return_type
    }

    /// Picks the error type for a non-success status.
    ///
    /// Rules are checked in declaration order; the first one whose range
    /// contains `status` wins. Without a match the default REST error type is
    /// returned.
    pub fn error_type_for(&self, status: u16) -> ErrorType {
        self.errors
            .iter()
            .find(|rule| rule.matches(status))
            .map(|rule| rule.error_type.clone())
            .unwrap_or_default()
    }

    /// The body parameter's position and its media type and charset.
    pub fn body_param(&self) -> Option<(usize, &str, &str)> {
        self.params
            .iter()
            .enumerate()
            .find_map(|(index, role)| match role {
                ParamRole::Body {
                    media_type,
                    charset,
                } => Some((index, media_type.as_str(), charset.as_str())),
                _ => None,
            })
    }
}

/// Builder for [`EndpointDescriptor`].
///
/// Parameter methods are called in argument order: the n-th parameter method
/// describes the n-th call argument.
#[derive(Debug, Clone)]
pub struct EndpointBuilder {
    descriptor: EndpointDescriptor,
}

impl EndpointBuilder {
    fn new(name: impl Into<String>, method: RequestMethod, path: impl Into<String>) -> Self {
        Self {
            descriptor: EndpointDescriptor {
                name: name.into(),
                method,
                resource_path: String::new(),
                path: path.into(),
                media_types: vec![media::JSON.to_string()],
                charsets: vec![media::DEFAULT_CHARSET.to_string()],
                errors: Vec::new(),
                params: Vec::new(),
                return_type: ReturnType::Unit,
            },
        }
    }

    /// Replaces the default `Accept` media types.
    pub fn media_types<I, S>(mut self, media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor.media_types = media_types.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the default `Accept-Charset` charsets.
    pub fn charsets<I, S>(mut self, charsets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor.charsets = charsets.into_iter().map(Into::into).collect();
        self
    }

    /// Maps the inclusive status range `start..=end` to `error_type`.
    pub fn error(mut self, start: u16, end: u16, error_type: ErrorType) -> Self {
        self.descriptor
            .errors
            .push(ErrorRule::new(start, end, error_type));
        self
    }

    pub fn returns(mut self, return_type: ReturnType) -> Self {
        self.descriptor.return_type = return_type;
        self
    }

    pub fn param(mut self, role: ParamRole) -> Self {
        self.descriptor.params.push(role);
        self
    }

    pub fn header(self, name: impl Into<String>) -> Self {
        self.param(ParamRole::Header(name.into()))
    }

    pub fn path_param(self, name: impl Into<String>) -> Self {
        self.param(ParamRole::Path(name.into()))
    }

    pub fn query(self, name: impl Into<String>) -> Self {
        self.param(ParamRole::Query(name.into()))
    }

    /// A JSON body in UTF-8.
    pub fn body(self) -> Self {
        self.body_as(media::JSON, media::DEFAULT_CHARSET)
    }

    pub fn body_as(self, media_type: impl Into<String>, charset: impl Into<String>) -> Self {
        self.param(ParamRole::Body {
            media_type: media_type.into(),
            charset: charset.into(),
        })
    }

    pub fn unbound(self) -> Self {
        self.param(ParamRole::Unbound)
    }

    /// Finishes the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if more than one body parameter was
    /// declared.
    pub fn build(self) -> Result<EndpointDescriptor> {
        let bodies = self
            .descriptor
            .params
            .iter()
            .filter(|role| matches!(role, ParamRole::Body { .. }))
            .count();
        if bodies > 1 {
            return Err(Error::Configuration(format!(
                "endpoint {} declares {} body parameters, at most one is allowed",
                self.descriptor.name, bodies
            )));
        }
        Ok(self.descriptor)
    }
}

/// A named group of endpoints sharing an optional base path.
///
/// # Examples
///
/// ```
/// use rested::{EndpointDescriptor, RequestMethod, ResourceDescriptor};
///
/// # fn main() -> Result<(), rested::Error> {
/// let resource = ResourceDescriptor::new()
///     .base_path("/resource")
///     .endpoint(EndpointDescriptor::builder("list", RequestMethod::Get, "/items").build()?);
///
/// assert_eq!(resource.get("list").unwrap().resource_path(), "/resource");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResourceDescriptor {
    base_path: Option<String>,
    endpoints: HashMap<String, Arc<EndpointDescriptor>>,
}

impl ResourceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path prefix for every endpoint, including ones already added.
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        let base_path = base_path.into();
        for endpoint in self.endpoints.values_mut() {
            Arc::make_mut(endpoint).resource_path = base_path.clone();
        }
        self.base_path = Some(base_path);
        self
    }

    /// Adds an endpoint, replacing any previous one with the same name.
    pub fn endpoint(mut self, mut endpoint: EndpointDescriptor) -> Self {
        endpoint.resource_path = self.base_path.clone().unwrap_or_default();
        self.endpoints
            .insert(endpoint.name.clone(), Arc::new(endpoint));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EndpointDescriptor>> {
        self.endpoints.get(name)
    }

    pub fn endpoint_names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }
}
