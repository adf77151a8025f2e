//! Error types for resource calls.
//!
//! Every failure of a call surfaces as one [`Error`] variant, named after the
//! pipeline step that produced it. Non-success HTTP responses become
//! [`Error::Rest`], carrying a [`RestError`] with the status, headers and
//! originating request attached, so callers can tell REST errors apart from
//! infrastructure errors and branch on the status code.

use crate::{Abort, Body, ErrorType, Headers, Request, Response};
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// Boxed error type used at the seams to user code (transports, parsers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for resource calls.
///
/// # Examples
///
/// ```no_run
/// use rested::{Error, Resource};
///
/// # async fn example(users: Resource) -> Result<(), Error> {
/// match users.call("get_user").arg("42").value::<serde_json::Value>().await {
///     Ok(user) => println!("User: {}", user),
///     Err(Error::Rest(err)) if err.status_code() == 404 => {
///         eprintln!("No such user ({})", err.name());
///     }
///     Err(Error::Rest(err)) => eprintln!("Server said {}: {:?}", err.status(), err.payload()),
///     Err(Error::Transport(err)) => eprintln!("Could not reach the server: {}", err),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No encoder is registered for the body's media type, not even a
    /// `type/*` or `*/*` fallback.
    #[error("No request parser registered for media type {media_type}")]
    MissingRequestParser {
        /// The media type that could not be matched
        media_type: String,
    },

    /// No decoder is registered for the response's media type.
    #[error("No response parser registered for media type {media_type}")]
    MissingResponseParser {
        /// The media type that could not be matched
        media_type: String,
    },

    /// A request interceptor vetoed the call. Nothing was sent.
    #[error("Request intercepted: {abort}")]
    RequestAborted {
        /// The request as it was when the interceptor gave up
        request: Box<Request>,
        /// The interceptor's veto
        #[source]
        abort: Abort,
    },

    /// A response interceptor vetoed the call after the response was parsed.
    #[error("Response intercepted (status {}): {abort}", .response.status_code())]
    ResponseAborted {
        /// The request that was sent
        request: Box<Request>,
        /// The response that was received; its body has been consumed
        response: Box<Response>,
        /// The interceptor's veto
        #[source]
        abort: Abort,
    },

    /// The server answered with a non-success status.
    #[error(transparent)]
    Rest(Box<RestError>),

    /// The transport failed. The transport's own error is the source.
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// An encoder failed to encode the request body.
    #[error("Failed to encode request body: {0}")]
    Encoding(#[source] BoxError),

    /// A decoder failed, or a decoded value did not fit the requested type.
    #[error("Failed to decode response body: {0}")]
    Decoding(#[source] BoxError),

    /// A value passed to the library was not acceptable.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration was provided.
    ///
    /// This indicates a problem with how a transport, factory or endpoint was
    /// described, such as a missing base URL or two body parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The resource has no endpoint with this name.
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),
}

impl Error {
    /// Returns the HTTP status code if a response was received.
    ///
    /// # Examples
    ///
    /// ```
    /// use rested::Error;
    ///
    /// let err = Error::MissingResponseParser { media_type: "text/csv".into() };
    /// assert_eq!(err.status(), None);
    /// ```
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Rest(err) => Some(err.status()),
            Error::ResponseAborted { response, .. } => Some(response.status()),
            _ => None,
        }
    }

    /// Returns `true` for non-success responses.
    pub fn is_rest(&self) -> bool {
        matches!(self, Error::Rest(_))
    }

    pub fn as_rest(&self) -> Option<&RestError> {
        match self {
            Error::Rest(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_rest(self) -> Option<RestError> {
        match self {
            Error::Rest(err) => Some(*err),
            _ => None,
        }
    }

    /// The unmatched media type of a missing-parser error.
    pub fn missing_media_type(&self) -> Option<&str> {
        match self {
            Error::MissingRequestParser { media_type }
            | Error::MissingResponseParser { media_type } => Some(media_type),
            _ => None,
        }
    }
}

impl From<RestError> for Error {
    fn from(err: RestError) -> Self {
        Error::Rest(Box::new(err))
    }
}

/// A specialized `Result` type for resource calls.
///
/// This is a convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// A non-success response, typed by the endpoint's error rules.
///
/// Holds the selected [`ErrorType`], the response status, message and headers,
/// the request that caused it, and either the decoded error payload or, for
/// streamed error types, the raw body.
#[derive(Debug)]
pub struct RestError {
    error_type: ErrorType,
    status: StatusCode,
    message: Option<String>,
    headers: Headers,
    request: Request,
    payload: Option<Value>,
    body: Option<Body>,
}

impl RestError {
    pub(crate) fn new(error_type: ErrorType, status: StatusCode, request: Request) -> Self {
        Self {
            error_type,
            status,
            message: None,
            headers: Headers::new(),
            request,
            payload: None,
            body: None,
        }
    }

    pub(crate) fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub(crate) fn with_body(mut self, body: Option<Body>) -> Self {
        self.body = body;
        self
    }

    /// Attaches the response details.
    pub(crate) fn init(&mut self, response: &Response) {
        self.status = response.status();
        self.message = response.message().map(str::to_string);
        self.headers = response.headers().clone();
    }

    pub fn error_type(&self) -> &ErrorType {
        &self.error_type
    }

    /// The name of the error type, e.g. `"RestError"`.
    pub fn name(&self) -> &str {
        self.error_type.name()
    }

    /// Returns `true` if this error was typed as `name`.
    pub fn is(&self, name: &str) -> bool {
        self.error_type.name() == name
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

    pub fn header_values(&self, name: &str) -> Option<&[String]> {
        self.headers.values(name)
    }

    /// The request that produced this error.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The decoded error body, if the error type is not streamed.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Deserializes the decoded error body into `T`.
    ///
    /// An absent payload deserializes from `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decoding`] if the payload does not fit `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        let payload = self.payload.clone().unwrap_or(Value::Null);
        serde_json::from_value(payload).map_err(|e| Error::Decoding(Box::new(e)))
    }

    /// `true` while a streamed error still holds the raw body.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn body_mut(&mut self) -> Option<&mut Body> {
        self.body.as_mut()
    }

    /// Takes the raw body of a streamed error.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Releases the raw body, if any.
    pub fn close(mut self) {
        if let Some(body) = self.body.take() {
            body.close();
        }
    }
}

impl fmt::Display for RestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (HTTP {})", self.error_type.name(), self.status.as_u16())?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for RestError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestBuilder;
    use serde::Deserialize;

    fn rest_error() -> RestError {
        let response = Response::new(StatusCode::CONFLICT)
            .with_message("Conflict")
            .with_header("X-Reason", "duplicate");
        let mut err = RestError::new(
            ErrorType::new("Duplicate"),
            StatusCode::CONFLICT,
            RequestBuilder::new().set_path("/users").build(),
        )
        .with_payload(serde_json::json!({ "field": "email" }));
        err.init(&response);
        err
    }

    #[test]
    fn test_rest_error_details() {
        let err = rest_error();

        assert!(err.is("Duplicate"));
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.message(), Some("Conflict"));
        assert_eq!(err.header("X-Reason"), Some("duplicate"));
        assert_eq!(err.request().path(), "/users");
        assert_eq!(err.to_string(), "Duplicate (HTTP 409): Conflict");
    }

    #[test]
    fn test_payload_as() {
        #[derive(Deserialize)]
        struct Detail {
            field: String,
        }

        let err = rest_error();
        let detail: Detail = err.payload_as().unwrap();
        assert_eq!(detail.field, "email");

        assert!(matches!(err.payload_as::<u32>(), Err(Error::Decoding(_))));
    }

    #[test]
    fn test_error_helpers() {
        let err = Error::from(rest_error());
        assert!(err.is_rest());
        assert_eq!(err.status(), Some(StatusCode::CONFLICT));
        assert_eq!(err.as_rest().unwrap().name(), "Duplicate");
        assert_eq!(err.missing_media_type(), None);

        let missing = Error::MissingRequestParser {
            media_type: "text/csv".into(),
        };
        assert_eq!(missing.missing_media_type(), Some("text/csv"));
        assert!(!missing.is_rest());
    }
}
