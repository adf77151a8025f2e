//! Ready-made encoders and decoders.
//!
//! | Parser           | Media types it is usually registered for       |
//! |------------------|------------------------------------------------|
//! | [`JsonParser`]   | `application/json`, `application/*+json`       |
//! | [`TextParser`]   | `text/*`                                       |
//! | [`BinaryParser`] | `application/octet-stream`, `*/*`              |
//!
//! None of them is registered automatically.

use crate::media::{string_form, Decoder, Encoder, Target};
use crate::{BoxError, Request, Response};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

const LATIN_1: [&str; 3] = ["ISO-8859-1", "ISO_8859_1", "LATIN1"];

/// Reads the body left on the response, if any.
async fn read_body(response: &mut Response) -> Result<Option<Bytes>, BoxError> {
    match response.take_body() {
        Some(body) => Ok(Some(body.bytes().await?)),
        None => Ok(None),
    }
}

fn is_latin_1(charset: &str) -> bool {
    LATIN_1
        .iter()
        .any(|name| name.eq_ignore_ascii_case(charset.trim()))
}

/// JSON bodies via `serde_json`.
///
/// Absent and empty bodies decode to `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl Encoder for JsonParser {
    fn encode(
        &self,
        body: &Value,
        _media_type: &str,
        _charset: &str,
    ) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(Some(serde_json::to_vec(body)?))
    }
}

#[async_trait]
impl Decoder for JsonParser {
    async fn decode(
        &self,
        target: Target<'_>,
        _request: &Request,
        response: &mut Response,
        _media_type: &str,
        _charset: &str,
    ) -> Result<Value, BoxError> {
        let bytes = read_body(response).await?.unwrap_or_default();
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::error!(
                error = %e,
                decode_target = ?target,
                raw_response = %String::from_utf8_lossy(&bytes),
                "Failed to deserialize response"
            );
            e.into()
        })
    }
}

/// Plain text bodies.
///
/// Understands UTF-8 and ISO-8859-1; other charsets are treated as UTF-8.
/// Invalid UTF-8 input is replaced rather than rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextParser;

impl Encoder for TextParser {
    fn encode(
        &self,
        body: &Value,
        _media_type: &str,
        charset: &str,
    ) -> Result<Option<Vec<u8>>, BoxError> {
        let text = string_form(body);
        if !is_latin_1(charset) {
            return Ok(Some(text.into_bytes()));
        }

        text.chars()
            .map(|c| {
                u8::try_from(u32::from(c))
                    .map_err(|_| format!("character {:?} is not representable in {}", c, charset))
            })
            .collect::<Result<Vec<u8>, String>>()
            .map(Some)
            .map_err(Into::into)
    }
}

#[async_trait]
impl Decoder for TextParser {
    async fn decode(
        &self,
        _target: Target<'_>,
        _request: &Request,
        response: &mut Response,
        _media_type: &str,
        charset: &str,
    ) -> Result<Value, BoxError> {
        let bytes = read_body(response).await?.unwrap_or_default();
        let text = if is_latin_1(charset) {
            bytes.iter().map(|&b| char::from(b)).collect()
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };
        Ok(Value::String(text))
    }
}

/// Raw byte bodies.
///
/// Encodes strings as their UTF-8 bytes and arrays of numbers in `0..=255` as
/// the bytes themselves. Decodes into an array of byte values, or `null` when
/// the response has no body.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryParser;

impl Encoder for BinaryParser {
    fn encode(
        &self,
        body: &Value,
        _media_type: &str,
        _charset: &str,
    ) -> Result<Option<Vec<u8>>, BoxError> {
        match body {
            Value::String(text) => Ok(Some(text.clone().into_bytes())),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| format!("{} is not a byte value", item))
                })
                .collect::<Result<Vec<u8>, String>>()
                .map(Some)
                .map_err(Into::into),
            other => Err(format!("cannot send {} as binary data", other).into()),
        }
    }
}

#[async_trait]
impl Decoder for BinaryParser {
    async fn decode(
        &self,
        _target: Target<'_>,
        _request: &Request,
        response: &mut Response,
        _media_type: &str,
        _charset: &str,
    ) -> Result<Value, BoxError> {
        Ok(match read_body(response).await? {
            Some(bytes) => Value::Array(bytes.iter().map(|&b| Value::from(b)).collect()),
            None => Value::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{media, ReturnType};
    use http::StatusCode;
    use serde_json::json;

    async fn decode(decoder: &dyn Decoder, mut response: Response, charset: &str) -> Value {
        decoder
            .decode(
                Target::Success(ReturnType::Value("T")),
                &Request::builder().build(),
                &mut response,
                media::ANY,
                charset,
            )
            .await
            .unwrap()
    }

    #[test]
    fn test_json_encode() {
        let bytes = JsonParser
            .encode(&json!({ "count": 10 }), media::JSON, "UTF-8")
            .unwrap()
            .unwrap();
        assert_eq!(bytes, br#"{"count":10}"#);
    }

    #[tokio::test]
    async fn test_json_decode() {
        let response = Response::new(StatusCode::OK).with_body(r#"{"name": "n", "age": 5}"#);
        assert_eq!(
            decode(&JsonParser, response, "UTF-8").await,
            json!({ "name": "n", "age": 5 })
        );
    }

    #[tokio::test]
    async fn test_json_decode_empty_body_is_null() {
        assert_eq!(
            decode(&JsonParser, Response::new(StatusCode::OK), "UTF-8").await,
            Value::Null
        );
        assert_eq!(
            decode(&JsonParser, Response::new(StatusCode::OK).with_body("  "), "UTF-8").await,
            Value::Null
        );
    }

    #[tokio::test]
    async fn test_json_decode_invalid_body_fails() {
        let mut response = Response::new(StatusCode::OK).with_body("{not json");
        let result = JsonParser
            .decode(
                Target::Success(ReturnType::Value("T")),
                &Request::builder().build(),
                &mut response,
                media::JSON,
                "UTF-8",
            )
            .await;
        assert!(result.is_err());
        assert!(!response.has_body());
    }

    #[tokio::test]
    async fn test_text_charsets() {
        let latin = TextParser
            .encode(&json!("café"), media::TEXT, "ISO-8859-1")
            .unwrap()
            .unwrap();
        assert_eq!(latin, [b'c', b'a', b'f', 0xE9]);

        let response = Response::new(StatusCode::OK).with_body(latin);
        assert_eq!(decode(&TextParser, response, "latin1").await, json!("café"));

        assert!(TextParser
            .encode(&json!("€"), media::TEXT, "ISO-8859-1")
            .is_err());
    }

    #[test]
    fn test_text_encodes_string_form() {
        let bytes = TextParser
            .encode(&json!(42), media::TEXT, "UTF-8")
            .unwrap()
            .unwrap();
        assert_eq!(bytes, b"42");
    }

    #[tokio::test]
    async fn test_binary() {
        let bytes = BinaryParser
            .encode(&json!([0, 127, 255]), media::BINARY, "UTF-8")
            .unwrap()
            .unwrap();
        assert_eq!(bytes, [0, 127, 255]);
        assert!(BinaryParser
            .encode(&json!([256]), media::BINARY, "UTF-8")
            .is_err());
        assert!(BinaryParser
            .encode(&json!({ "a": 1 }), media::BINARY, "UTF-8")
            .is_err());

        let response = Response::new(StatusCode::OK).with_body(bytes);
        assert_eq!(decode(&BinaryParser, response, "UTF-8").await, json!([0, 127, 255]));
        assert_eq!(
            decode(&BinaryParser, Response::new(StatusCode::OK), "UTF-8").await,
            Value::Null
        );
    }
}
