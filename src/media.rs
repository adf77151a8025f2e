//! Body encoders, decoders and the registries that select them by media type.
//!
//! Parsers are registered under media type patterns: an exact `type/subtype`,
//! a `type/*` family or the `*/*` catch-all. Lookup goes from most to least
//! specific.

use crate::headers::CONTENT_TYPE;
use crate::{BoxError, Error, ErrorType, Headers, Request, Response, Result, ReturnType};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const JSON: &str = "application/json";
pub const JSON_LD: &str = "application/ld+json";
pub const XML: &str = "application/xml";
pub const XHTML: &str = "application/xhtml+xml";
pub const BINARY: &str = "application/octet-stream";
pub const FORM: &str = "application/x-www-form-urlencoded";
pub const PDF: &str = "application/pdf";
pub const ZIP: &str = "application/zip";
pub const GZIP: &str = "application/gzip";
pub const TEXT: &str = "text/plain";
pub const HTML: &str = "text/html";
pub const CSS: &str = "text/css";
pub const CSV: &str = "text/csv";
pub const JAVASCRIPT: &str = "text/javascript";
pub const PNG: &str = "image/png";
pub const JPEG: &str = "image/jpeg";
pub const GIF: &str = "image/gif";
pub const SVG: &str = "image/svg+xml";
pub const WEBP: &str = "image/webp";
pub const MP4: &str = "video/mp4";
pub const MPEG_AUDIO: &str = "audio/mpeg";

/// Matches every media type.
pub const ANY: &str = "*/*";

/// Charset used when a response does not declare one.
pub const DEFAULT_CHARSET: &str = "UTF-8";

const CHARSET_PREFIX: &str = "charset=";

/// Turns a call's body argument into request bytes.
pub trait Encoder: Send + Sync {
    /// Encodes `body` for the given media type and charset.
    ///
    /// Returning `Ok(None)` means no body is sent.
    fn encode(
        &self,
        body: &Value,
        media_type: &str,
        charset: &str,
    ) -> std::result::Result<Option<Vec<u8>>, BoxError>;
}

/// What a [`Decoder`] is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    /// The declared return type of a successful call.
    Success(ReturnType),
    /// The error type selected for a non-success status.
    Error(&'a ErrorType),
}

/// Turns a response body into a value.
///
/// Decoders read the body themselves, usually with
/// [`Response::take_body`]. A response may arrive without a body.
#[async_trait]
pub trait Decoder: Send + Sync {
    async fn decode(
        &self,
        target: Target<'_>,
        request: &Request,
        response: &mut Response,
        media_type: &str,
        charset: &str,
    ) -> std::result::Result<Value, BoxError>;
}

/// Which side of the exchange a registry serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserRole {
    Request,
    Response,
}

impl ParserRole {
    fn missing(self, media_type: &str) -> Error {
        let media_type = media_type.to_string();
        match self {
            ParserRole::Request => Error::MissingRequestParser { media_type },
            ParserRole::Response => Error::MissingResponseParser { media_type },
        }
    }
}

/// Thread-safe mapping from media type patterns to parsers.
///
/// Several patterns may point at the same parser. Registering a pattern again
/// replaces the earlier parser.
///
/// # Examples
///
/// ```
/// use rested::media::{Encoder, ParserRegistry, ParserRole};
/// use rested::parsers::{JsonParser, TextParser};
/// use std::sync::Arc;
///
/// let registry: ParserRegistry<dyn Encoder> = ParserRegistry::new(ParserRole::Request);
/// registry.register(Arc::new(JsonParser), ["application/json", "application/*"]);
/// registry.register(Arc::new(TextParser), ["*/*"]);
///
/// assert!(registry.resolve("application/xml").is_ok());
/// assert!(registry.resolve("image/png").is_ok());
///
/// registry.unregister(["*/*"]);
/// assert!(registry.resolve("image/png").is_err());
/// ```
pub struct ParserRegistry<P: ?Sized> {
    role: ParserRole,
    parsers: RwLock<HashMap<String, Arc<P>>>,
}

impl<P: ?Sized> ParserRegistry<P> {
    pub fn new(role: ParserRole) -> Self {
        Self {
            role,
            parsers: RwLock::new(HashMap::new()),
        }
    }

    pub fn role(&self) -> ParserRole {
        self.role
    }

    /// Installs `parser` under every pattern in `media_types`.
    pub fn register<I, S>(&self, parser: Arc<P>, media_types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsers = self.parsers.write();
        for media_type in media_types {
            parsers.insert(media_type.into(), parser.clone());
        }
    }

    /// Removes the parsers registered under `media_types`.
    pub fn unregister<I, S>(&self, media_types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsers = self.parsers.write();
        for media_type in media_types {
            parsers.remove(media_type.as_ref());
        }
    }

    /// `true` if a parser is registered under exactly this pattern.
    pub fn contains(&self, pattern: &str) -> bool {
        self.parsers.read().contains_key(pattern)
    }

    /// Finds the parser for `media_type`.
    ///
    /// Tries the exact type, then its `type/*` family, then `*/*`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRequestParser`] or
    /// [`Error::MissingResponseParser`], depending on the registry's role,
    /// when nothing matches.
    pub fn resolve(&self, media_type: &str) -> Result<Arc<P>> {
        let parsers = self.parsers.read();
        let family = media_type
            .find('/')
            .map(|index| format!("{}*", &media_type[..=index]));

        parsers
            .get(media_type)
            .or_else(|| family.as_deref().and_then(|family| parsers.get(family)))
            .or_else(|| parsers.get(ANY))
            .cloned()
            .ok_or_else(|| self.role.missing(media_type))
    }
}

impl<P: ?Sized> fmt::Debug for ParserRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parsers = self.parsers.read();
        let mut patterns: Vec<&str> = parsers.keys().map(String::as_str).collect();
        patterns.sort_unstable();
        f.debug_struct("ParserRegistry")
            .field("role", &self.role)
            .field("patterns", &patterns)
            .finish()
    }
}

/// Extracts `(media_type, charset)` from a `Content-Type` header.
///
/// The media type is the part before the first `;`. The charset is the value
/// after `charset=` in the remainder, up to the next `;`. Missing pieces fall
/// back to `*/*` and [`DEFAULT_CHARSET`].
///
/// # Examples
///
/// ```
/// use rested::{media::parse_content_type, Headers};
///
/// let headers: Headers = [("Content-Type", "application/json; charset=ISO-8859-1")]
///     .into_iter()
///     .collect();
/// assert_eq!(
///     parse_content_type(&headers),
///     ("application/json".to_string(), "ISO-8859-1".to_string())
/// );
///
/// assert_eq!(
///     parse_content_type(&Headers::new()),
///     ("*/*".to_string(), "UTF-8".to_string())
/// );
/// ```
pub fn parse_content_type(headers: &Headers) -> (String, String) {
    let Some(content_type) = headers.first(CONTENT_TYPE) else {
        return (ANY.to_string(), DEFAULT_CHARSET.to_string());
    };

    let (media_type, parameters) = match content_type.split_once(';') {
        Some((media_type, parameters)) => (media_type, Some(parameters)),
        None => (content_type, None),
    };

    let charset = parameters
        .and_then(|parameters| {
            let start = parameters.find(CHARSET_PREFIX)? + CHARSET_PREFIX.len();
            let value = parameters[start..].split(';').next().unwrap_or("").trim();
            (!value.is_empty()).then_some(value)
        })
        .unwrap_or(DEFAULT_CHARSET);

    (media_type.trim().to_string(), charset.to_string())
}

/// Renders an argument the way it appears in paths, headers and queries.
///
/// Strings are used verbatim, `null` renders as `null`, other values use
/// their compact JSON form.
pub fn string_form(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
