//! The call pipeline.
//!
//! [`Dispatcher::invoke`] turns one endpoint call into a request, runs it
//! through the request interceptors, executes it on the transport, parses the
//! response into an [`Outcome`], runs the response interceptors and finally
//! delivers the outcome or the typed REST error. The steps run strictly in
//! that order.

use crate::headers::{ACCEPT, ACCEPT_CHARSET, CONTENT_LENGTH, CONTENT_TYPE};
use crate::media::{self, Decoder, Encoder, ParserRegistry, ParserRole, Target};
use crate::{
    EndpointDescriptor, Error, InterceptorChain, ParamRole, Request, RequestBuilder,
    RequestInterceptor, Response, ResponseInterceptor, RestError, RestResponse, Result,
    ReturnType, StreamedResponse, Transport,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

static NULL: Value = Value::Null;

const ACCEPT_DELIMITER: &str = ", ";

/// The parsed result of a call, as seen by response interceptors.
#[derive(Debug)]
pub enum Outcome {
    /// The call returns nothing, or a success response carried no body.
    Empty,
    /// A decoded success body.
    Value(Value),
    /// A decoded success body with status, message and headers.
    Response(RestResponse<Value>),
    /// A success response whose body is handed over undecoded.
    Streamed(StreamedResponse),
    /// A non-success response. Delivered to the caller as [`Error::Rest`].
    Error(RestError),
}

impl Outcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    /// Discards any value. Fails only for error outcomes.
    pub fn into_unit(self) -> Result<()> {
        match self {
            Outcome::Error(err) => Err(err.into()),
            _ => Ok(()),
        }
    }

    /// Deserializes the decoded body into `T`.
    ///
    /// An empty outcome deserializes from `null`, so `Option<T>` and `()`
    /// accept it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decoding`] if the value does not fit `T`, and
    /// [`Error::InvalidArgument`] for streamed outcomes.
    pub fn into_value<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Outcome::Empty => from_value(Value::Null),
            Outcome::Value(value) => from_value(value),
            Outcome::Response(response) => from_value(response.data),
            Outcome::Streamed(_) => Err(Error::InvalidArgument(
                "streamed responses cannot be decoded into a value".to_string(),
            )),
            Outcome::Error(err) => Err(err.into()),
        }
    }

    /// Deserializes a typed response's data into `T`, keeping its HTTP details.
    pub fn into_response<T: DeserializeOwned>(self) -> Result<RestResponse<T>> {
        match self {
            Outcome::Response(response) => {
                let data = from_value(response.data)?;
                Ok(RestResponse::new(
                    data,
                    response.status,
                    response.message,
                    response.headers,
                ))
            }
            Outcome::Error(err) => Err(err.into()),
            _ => Err(Error::InvalidArgument(
                "endpoint does not return a typed response".to_string(),
            )),
        }
    }

    pub fn into_streamed(self) -> Result<StreamedResponse> {
        match self {
            Outcome::Streamed(streamed) => Ok(streamed),
            Outcome::Error(err) => Err(err.into()),
            _ => Err(Error::InvalidArgument(
                "endpoint does not return a streamed response".to_string(),
            )),
        }
    }
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Decoding(Box::new(e)))
}

/// Executes endpoint calls.
///
/// A dispatcher owns its parser registries and interceptor chains. All of
/// them may be changed at any time, including while calls are running on
/// other tasks.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    request_parsers: ParserRegistry<dyn Encoder>,
    response_parsers: ParserRegistry<dyn Decoder>,
    request_interceptors: InterceptorChain<dyn RequestInterceptor>,
    response_interceptors: InterceptorChain<dyn ResponseInterceptor>,
}

impl Dispatcher {
    /// Creates a dispatcher with empty registries.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            request_parsers: ParserRegistry::new(ParserRole::Request),
            response_parsers: ParserRegistry::new(ParserRole::Response),
            request_interceptors: InterceptorChain::new(),
            response_interceptors: InterceptorChain::new(),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn request_parsers(&self) -> &ParserRegistry<dyn Encoder> {
        &self.request_parsers
    }

    pub fn response_parsers(&self) -> &ParserRegistry<dyn Decoder> {
        &self.response_parsers
    }

    pub fn request_interceptors(&self) -> &InterceptorChain<dyn RequestInterceptor> {
        &self.request_interceptors
    }

    pub fn response_interceptors(&self) -> &InterceptorChain<dyn ResponseInterceptor> {
        &self.response_interceptors
    }

    /// Calls `endpoint` with `args`.
    ///
    /// `args` line up with the endpoint's parameters; missing trailing
    /// arguments count as `null`.
    ///
    /// # Errors
    ///
    /// Every failure is returned as produced by the failing step: missing
    /// parsers, encoder or decoder errors, interceptor vetoes, transport
    /// errors, and [`Error::Rest`] for non-success responses.
    pub async fn invoke(&self, endpoint: &EndpointDescriptor, args: &[Value]) -> Result<Outcome> {
        let mut builder = RequestBuilder::new();
        builder
            .set_method(endpoint.method())
            .set_path(build_path(endpoint, args));
        load_headers(endpoint, &mut builder, args);
        load_query(endpoint, &mut builder, args);
        let body = self.load_body(endpoint, &mut builder, args)?;

        for interceptor in self.request_interceptors.snapshot() {
            if let Err(abort) = interceptor.intercept(&mut builder, body, endpoint, args) {
                tracing::warn!(
                    endpoint = endpoint.name(),
                    reason = %abort,
                    "Request intercepted"
                );
                return Err(Error::RequestAborted {
                    request: Box::new(builder.build()),
                    abort,
                });
            }
        }

        let request = builder.build();

        tracing::debug!(
            endpoint = endpoint.name(),
            method = %request.method(),
            path = request.path(),
            has_body = request.body().is_some(),
            "Executing HTTP request"
        );

        let mut response = self
            .transport
            .execute(&request, endpoint, args)
            .await
            .map_err(|e| {
                tracing::error!(
                    endpoint = endpoint.name(),
                    error = %e,
                    "Transport failed"
                );
                Error::Transport(e)
            })?;

        tracing::info!(
            endpoint = endpoint.name(),
            status = response.status_code(),
            "Received HTTP response"
        );

        let parsed = self.parse_response(&request, &mut response, endpoint).await;
        // Whatever was not taken by a decoder or a streamed result is released here.
        response.close();
        let outcome = parsed?;

        for interceptor in self.response_interceptors.snapshot() {
            if let Err(abort) = interceptor.intercept(&request, &response, &outcome, endpoint, args) {
                tracing::warn!(
                    endpoint = endpoint.name(),
                    status = response.status_code(),
                    reason = %abort,
                    "Response intercepted"
                );
                return Err(Error::ResponseAborted {
                    request: Box::new(request),
                    response: Box::new(response),
                    abort,
                });
            }
        }

        match outcome {
            Outcome::Error(err) => {
                tracing::warn!(
                    endpoint = endpoint.name(),
                    status = err.status_code(),
                    error_type = err.name(),
                    "Error response"
                );
                Err(err.into())
            }
            outcome => Ok(outcome),
        }
    }

    /// Encodes the body argument, if any, and returns it for the interceptors.
    fn load_body<'a>(
        &self,
        endpoint: &EndpointDescriptor,
        builder: &mut RequestBuilder,
        args: &'a [Value],
    ) -> Result<Option<&'a Value>> {
        let Some((index, media_type, charset)) = endpoint.body_param() else {
            return Ok(None);
        };
        let body = arg(args, index);
        if body.is_null() {
            return Ok(None);
        }

        let encoder = self.request_parsers.resolve(media_type)?;
        let encoded = encoder
            .encode(body, media_type, charset)
            .map_err(Error::Encoding)?;

        if let Some(bytes) = encoded {
            if !builder.has_header(CONTENT_TYPE) {
                builder.add_header(CONTENT_TYPE, format!("{}; charset={}", media_type, charset));
            }
            if !builder.has_header(CONTENT_LENGTH) {
                builder.add_header(CONTENT_LENGTH, bytes.len().to_string());
            }
            builder.set_body(Some(bytes));
        } else {
            tracing::debug!(
                endpoint = endpoint.name(),
                media_type,
                "Encoder produced no body"
            );
        }

        Ok(Some(body))
    }

    async fn parse_response(
        &self,
        request: &Request,
        response: &mut Response,
        endpoint: &EndpointDescriptor,
    ) -> Result<Outcome> {
        if !response.is_success() {
            return self.parse_error(request, response, endpoint).await;
        }

        let return_type = endpoint.return_type();
        if !return_type.is_typed_response()
            && (return_type == ReturnType::Unit || !response.has_body())
        {
            return Ok(Outcome::Empty);
        }

        if return_type == ReturnType::Streamed {
            return Ok(Outcome::Streamed(StreamedResponse::new(
                response.status(),
                response.message().map(str::to_string),
                response.headers().clone(),
                response.take_body(),
            )));
        }

        let value = self
            .decode(Target::Success(return_type), request, response)
            .await?;

        Ok(match return_type {
            ReturnType::Response(_) => Outcome::Response(RestResponse::new(
                value,
                response.status(),
                response.message().map(str::to_string),
                response.headers().clone(),
            )),
            _ => Outcome::Value(value),
        })
    }

    async fn parse_error(
        &self,
        request: &Request,
        response: &mut Response,
        endpoint: &EndpointDescriptor,
    ) -> Result<Outcome> {
        let error_type = endpoint.error_type_for(response.status_code());
        let mut err = RestError::new(error_type.clone(), response.status(), request.clone());

        if error_type.is_streamed() {
            err = err.with_body(response.take_body());
        } else {
            let payload = self
                .decode(Target::Error(&error_type), request, response)
                .await?;
            err = err.with_payload(payload);
        }

        err.init(response);
        Ok(Outcome::Error(err))
    }

    async fn decode(
        &self,
        target: Target<'_>,
        request: &Request,
        response: &mut Response,
    ) -> Result<Value> {
        let (media_type, charset) = media::parse_content_type(response.headers());
        let decoder = self.response_parsers.resolve(&media_type)?;

        tracing::debug!(media_type = %media_type, charset = %charset, "Decoding response body");

        decoder
            .decode(target, request, response, &media_type, &charset)
            .await
            .map_err(Error::Decoding)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("request_parsers", &self.request_parsers)
            .field("response_parsers", &self.response_parsers)
            .field("request_interceptors", &self.request_interceptors)
            .field("response_interceptors", &self.response_interceptors)
            .finish_non_exhaustive()
    }
}

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NULL)
}

/// Resource base path plus endpoint template, with non-null path arguments
/// substituted. Placeholders of null arguments stay in the path.
fn build_path(endpoint: &EndpointDescriptor, args: &[Value]) -> String {
    let mut path = format!("{}{}", endpoint.resource_path(), endpoint.path());
    for (index, role) in endpoint.params().iter().enumerate() {
        if let ParamRole::Path(name) = role {
            let value = arg(args, index);
            if !value.is_null() {
                path = path.replace(&format!("{{{}}}", name), &media::string_form(value));
            }
        }
    }
    path
}

fn load_headers(endpoint: &EndpointDescriptor, builder: &mut RequestBuilder, args: &[Value]) {
    for (index, role) in endpoint.params().iter().enumerate() {
        if let ParamRole::Header(name) = role {
            for_each_value(arg(args, index), |value| {
                builder.add_header(name.as_str(), value);
            });
        }
    }
    if !builder.has_header(ACCEPT) && !endpoint.media_types().is_empty() {
        builder.add_header(ACCEPT, endpoint.media_types().join(ACCEPT_DELIMITER));
    }
    if !builder.has_header(ACCEPT_CHARSET) && !endpoint.charsets().is_empty() {
        builder.add_header(ACCEPT_CHARSET, endpoint.charsets().join(ACCEPT_DELIMITER));
    }
}

fn load_query(endpoint: &EndpointDescriptor, builder: &mut RequestBuilder, args: &[Value]) {
    for (index, role) in endpoint.params().iter().enumerate() {
        if let ParamRole::Query(name) = role {
            for_each_value(arg(args, index), |value| {
                builder.add_query_param(name.as_str(), value);
            });
        }
    }
}

/// Arrays contribute one entry per non-null element, other non-null values one
/// entry.
fn for_each_value(value: &Value, mut f: impl FnMut(String)) {
    match value {
        Value::Null => {}
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .for_each(|item| f(media::string_form(item))),
        other => f(media::string_form(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::Abort;
    use crate::parsers::JsonParser;
    use crate::{Body, BoxError, ErrorType, RequestMethod};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::Stream;
    use http::StatusCode;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    type Respond = Box<dyn Fn() -> Response + Send + Sync>;

    struct MockTransport {
        calls: AtomicUsize,
        last_request: Mutex<Option<Request>>,
        respond: Respond,
    }

    impl MockTransport {
        fn new(respond: impl Fn() -> Response + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
                respond: Box::new(respond),
            })
        }

        fn json(status: u16, body: &'static str) -> Arc<Self> {
            Self::new(move || {
                Response::new(StatusCode::from_u16(status).unwrap())
                    .with_header(CONTENT_TYPE, "application/json; charset=UTF-8")
                    .with_body(body)
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> Request {
            self.last_request.lock().clone().unwrap()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn execute(
            &self,
            request: &Request,
            _endpoint: &EndpointDescriptor,
            _args: &[Value],
        ) -> std::result::Result<Response, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock() = Some(request.clone());
            Ok((self.respond)())
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn execute(
            &self,
            _request: &Request,
            _endpoint: &EndpointDescriptor,
            _args: &[Value],
        ) -> std::result::Result<Response, BoxError> {
            Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        }
    }

    /// Counts decode calls and returns the media type it was asked for.
    #[derive(Default)]
    struct CountingDecoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Decoder for CountingDecoder {
        async fn decode(
            &self,
            _target: Target<'_>,
            _request: &Request,
            response: &mut Response,
            media_type: &str,
            charset: &str,
        ) -> std::result::Result<Value, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = match response.take_body() {
                Some(body) => body.text().await?,
                None => String::new(),
            };
            Ok(json!({ "media_type": media_type, "charset": charset, "body": body }))
        }
    }

    struct NoBodyEncoder;

    impl Encoder for NoBodyEncoder {
        fn encode(
            &self,
            _body: &Value,
            _media_type: &str,
            _charset: &str,
        ) -> std::result::Result<Option<Vec<u8>>, BoxError> {
            Ok(None)
        }
    }

    struct CountedStream {
        drops: Arc<AtomicUsize>,
    }

    impl Stream for CountedStream {
        type Item = std::io::Result<Bytes>;

        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Ready(None)
        }
    }

    impl Drop for CountedStream {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn dispatcher(transport: Arc<dyn Transport>) -> Dispatcher {
        let dispatcher = Dispatcher::new(transport);
        dispatcher
            .request_parsers()
            .register(Arc::new(JsonParser), [media::JSON]);
        dispatcher
            .response_parsers()
            .register(Arc::new(JsonParser), [media::JSON]);
        dispatcher
    }

    fn endpoint(builder: crate::metadata::EndpointBuilder) -> EndpointDescriptor {
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_path_substitution() {
        let transport = MockTransport::json(200, "{}");
        let dispatcher = dispatcher(transport.clone());
        let endpoint = crate::ResourceDescriptor::new()
            .base_path("/resource")
            .endpoint(endpoint(
                EndpointDescriptor::builder("e", RequestMethod::Get, "/{id}/copy/{id}/{other}")
                    .path_param("id")
                    .path_param("other"),
            ))
            .get("e")
            .cloned()
            .unwrap();

        dispatcher
            .invoke(&endpoint, &[json!(7), Value::Null])
            .await
            .unwrap();

        assert_eq!(transport.last_request().path(), "/resource/7/copy/7/{other}");
    }

    #[tokio::test]
    async fn test_header_and_query_expansion() {
        let transport = MockTransport::json(200, "{}");
        let dispatcher = dispatcher(transport.clone());
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Get, "/search")
                .header("X-Tag")
                .header("X-Single")
                .header("X-Missing")
                .query("q")
                .query("page")
                .media_types(["application/json", "text/plain"])
                .charsets(["UTF-8", "ISO-8859-1"]),
        );

        dispatcher
            .invoke(
                &endpoint,
                &[
                    json!(["a", null, "b"]),
                    json!(42),
                    Value::Null,
                    json!(["x", "y"]),
                    json!(2),
                ],
            )
            .await
            .unwrap();

        let request = transport.last_request();
        assert_eq!(request.header_values("X-Tag").unwrap(), ["a", "b"]);
        assert_eq!(request.header_values("X-Single").unwrap(), ["42"]);
        assert!(!request.has_header("X-Missing"));
        assert_eq!(
            request.header_values(ACCEPT).unwrap(),
            ["application/json, text/plain"]
        );
        assert_eq!(
            request.header_values(ACCEPT_CHARSET).unwrap(),
            ["UTF-8, ISO-8859-1"]
        );
        assert_eq!(request.query_param_values("q").unwrap(), ["x", "y"]);
        assert_eq!(request.query_param_values("page").unwrap(), ["2"]);
    }

    #[tokio::test]
    async fn test_explicit_accept_header_wins() {
        let transport = MockTransport::json(200, "{}");
        let dispatcher = dispatcher(transport.clone());
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Get, "/").header(ACCEPT),
        );

        dispatcher
            .invoke(&endpoint, &[json!("text/csv")])
            .await
            .unwrap();

        let request = transport.last_request();
        assert_eq!(request.header_values(ACCEPT).unwrap(), ["text/csv"]);
        assert_eq!(request.header_values(ACCEPT_CHARSET).unwrap(), ["UTF-8"]);
    }

    #[tokio::test]
    async fn test_no_default_accept_without_media_types() {
        let transport = MockTransport::json(200, "{}");
        let dispatcher = dispatcher(transport.clone());
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Get, "/")
                .media_types(Vec::<String>::new())
                .charsets(Vec::<String>::new()),
        );

        dispatcher.invoke(&endpoint, &[]).await.unwrap();

        let request = transport.last_request();
        assert!(!request.has_header(ACCEPT));
        assert!(!request.has_header(ACCEPT_CHARSET));
    }

    #[tokio::test]
    async fn test_body_encoding_sets_content_headers() {
        let transport = MockTransport::json(200, "{}");
        let dispatcher = dispatcher(transport.clone());
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Post, "/items").body(),
        );

        dispatcher
            .invoke(&endpoint, &[json!({ "name": "widget" })])
            .await
            .unwrap();

        let request = transport.last_request();
        let body = request.body().unwrap();
        assert_eq!(serde_json::from_slice::<Value>(body).unwrap(), json!({ "name": "widget" }));
        assert_eq!(
            request.header_values(CONTENT_TYPE).unwrap(),
            ["application/json; charset=UTF-8"]
        );
        assert_eq!(
            request.header_values(CONTENT_LENGTH).unwrap(),
            [body.len().to_string()]
        );
    }

    #[tokio::test]
    async fn test_caller_content_type_is_kept() {
        let transport = MockTransport::json(200, "{}");
        let dispatcher = dispatcher(transport.clone());
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Post, "/")
                .header(CONTENT_TYPE)
                .body(),
        );

        dispatcher
            .invoke(&endpoint, &[json!("application/vnd.custom+json"), json!([1])])
            .await
            .unwrap();

        assert_eq!(
            transport.last_request().header_values(CONTENT_TYPE).unwrap(),
            ["application/vnd.custom+json"]
        );
    }

    #[tokio::test]
    async fn test_encoder_without_output_sends_no_body_but_interceptors_see_it() {
        let transport = MockTransport::json(200, "{}");
        let dispatcher = dispatcher(transport.clone());
        dispatcher
            .request_parsers()
            .register(Arc::new(NoBodyEncoder), [media::TEXT]);
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        dispatcher.request_interceptors().add([Arc::new(
            move |_pending: &mut RequestBuilder,
                  body: Option<&Value>,
                  _endpoint: &EndpointDescriptor,
                  _args: &[Value]|
                  -> std::result::Result<(), Abort> {
                *seen_clone.lock() = body.cloned();
                Ok(())
            },
        ) as Arc<dyn RequestInterceptor>]);
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Put, "/").body_as(media::TEXT, "UTF-8"),
        );

        dispatcher.invoke(&endpoint, &[json!("hello")]).await.unwrap();

        let request = transport.last_request();
        assert!(request.body().is_none());
        assert!(!request.has_header(CONTENT_TYPE));
        assert!(!request.has_header(CONTENT_LENGTH));
        assert_eq!(*seen.lock(), Some(json!("hello")));
    }

    #[tokio::test]
    async fn test_missing_request_parser() {
        let transport = MockTransport::json(200, "{}");
        let dispatcher = dispatcher(transport.clone());
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Post, "/").body_as(media::XML, "UTF-8"),
        );

        let err = dispatcher
            .invoke(&endpoint, &[json!("<a/>")])
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            Error::MissingRequestParser { media_type } if media_type == "application/xml"
        ));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_null_body_skips_encoding() {
        let transport = MockTransport::json(200, "{}");
        let dispatcher = Dispatcher::new(transport.clone());
        dispatcher
            .response_parsers()
            .register(Arc::new(JsonParser), [media::JSON]);
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Post, "/").body_as(media::XML, "UTF-8"),
        );

        dispatcher.invoke(&endpoint, &[Value::Null]).await.unwrap();

        assert!(transport.last_request().body().is_none());
    }

    #[tokio::test]
    async fn test_request_interceptor_abort_prevents_transport_call() {
        let transport = MockTransport::json(200, "{}");
        let dispatcher = dispatcher(transport.clone());
        let later_calls = Arc::new(AtomicUsize::new(0));
        let later_calls_clone = later_calls.clone();
        dispatcher.request_interceptors().add([
            Arc::new(
                |pending: &mut RequestBuilder,
                 _body: Option<&Value>,
                 _endpoint: &EndpointDescriptor,
                 _args: &[Value]|
                 -> std::result::Result<(), Abort> {
                    pending.add_header("X-Seen", "first");
                    Ok(())
                },
            ) as Arc<dyn RequestInterceptor>,
            Arc::new(
                |pending: &mut RequestBuilder,
                 _body: Option<&Value>,
                 _endpoint: &EndpointDescriptor,
                 _args: &[Value]|
                 -> std::result::Result<(), Abort> {
                    if pending.has_header("X-Seen") {
                        Err(Abort::with_message("denied"))
                    } else {
                        Ok(())
                    }
                },
            ),
            Arc::new(
                move |_pending: &mut RequestBuilder,
                      _body: Option<&Value>,
                      _endpoint: &EndpointDescriptor,
                      _args: &[Value]|
                      -> std::result::Result<(), Abort> {
                    later_calls_clone.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            ),
        ]);
        let endpoint = endpoint(EndpointDescriptor::builder("e", RequestMethod::Get, "/guarded"));

        let err = dispatcher.invoke(&endpoint, &[]).await.unwrap_err();

        match err {
            Error::RequestAborted { request, abort } => {
                assert_eq!(request.path(), "/guarded");
                assert_eq!(request.header_values("X-Seen").unwrap(), ["first"]);
                assert_eq!(abort.message(), Some("denied"));
            }
            other => panic!("expected RequestAborted, got {:?}", other),
        }
        assert_eq!(transport.calls(), 0);
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_response_interceptor_abort_after_parsing() {
        let transport = MockTransport::json(200, r#"{"id": 1}"#);
        let dispatcher = dispatcher(transport.clone());
        let parsed = Arc::new(Mutex::new(None));
        let parsed_clone = parsed.clone();
        dispatcher.response_interceptors().add([Arc::new(
            move |_request: &Request,
                  _response: &Response,
                  outcome: &Outcome,
                  _endpoint: &EndpointDescriptor,
                  _args: &[Value]|
                  -> std::result::Result<(), Abort> {
                if let Outcome::Value(value) = outcome {
                    *parsed_clone.lock() = Some(value.clone());
                }
                Err(Abort::with_message("rejected"))
            },
        ) as Arc<dyn ResponseInterceptor>]);
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Get, "/").returns(ReturnType::Value("Item")),
        );

        let err = dispatcher.invoke(&endpoint, &[]).await.unwrap_err();

        match err {
            Error::ResponseAborted {
                request,
                response,
                abort,
            } => {
                assert_eq!(request.path(), "/");
                assert_eq!(response.status_code(), 200);
                assert!(!response.has_body());
                assert_eq!(abort.message(), Some("rejected"));
            }
            other => panic!("expected ResponseAborted, got {:?}", other),
        }
        assert_eq!(transport.calls(), 1);
        assert_eq!(*parsed.lock(), Some(json!({ "id": 1 })));
    }

    #[tokio::test]
    async fn test_error_type_selection_by_status() {
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Get, "/")
                .error(100, 199, ErrorType::new("A"))
                .error(300, 399, ErrorType::new("B"))
                .error(200, 299, ErrorType::new("NeverUsed"))
                .returns(ReturnType::Value("Item")),
        );

        for (status, expected) in [(150, "A"), (350, "B"), (404, ErrorType::REST)] {
            let dispatcher = dispatcher(MockTransport::json(status, "{}"));
            let err = dispatcher.invoke(&endpoint, &[]).await.unwrap_err();
            let rest = err.as_rest().unwrap();
            assert_eq!(rest.name(), expected, "status {}", status);
            assert_eq!(rest.status_code(), status);
        }

        let dispatcher = dispatcher(MockTransport::json(250, r#"{"ok": true}"#));
        let outcome = dispatcher.invoke(&endpoint, &[]).await.unwrap();
        assert_eq!(outcome.into_value::<Value>().unwrap(), json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_rest_error_carries_response_details() {
        let transport = MockTransport::new(|| {
            Response::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_message("FAILURE")
                .with_header("header", "headerValue")
                .with_header(CONTENT_TYPE, "application/json; charset=UTF-8")
                .with_body(r#"{"reason": "some reason"}"#)
        });
        let dispatcher = dispatcher(transport);
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Get, "/failure")
                .error(500, 500, ErrorType::new("CustomError")),
        );

        let err = dispatcher.invoke(&endpoint, &[]).await.unwrap_err();
        let rest = err.into_rest().unwrap();

        assert!(rest.is("CustomError"));
        assert_eq!(rest.status_code(), 500);
        assert_eq!(rest.message(), Some("FAILURE"));
        assert_eq!(rest.header_values("header").unwrap(), ["headerValue"]);
        assert_eq!(rest.request().path(), "/failure");
        assert_eq!(rest.payload(), Some(&json!({ "reason": "some reason" })));
    }

    #[tokio::test]
    async fn test_streamed_response_takes_body_without_decoding() {
        let drops = Arc::new(AtomicUsize::new(0));
        let drops_clone = drops.clone();
        let transport = MockTransport::new(move || {
            Response::new(StatusCode::OK)
                .with_header(CONTENT_TYPE, "application/octet-stream")
                .with_body(Body::from_stream(CountedStream {
                    drops: drops_clone.clone(),
                }))
        });
        let dispatcher = Dispatcher::new(transport);
        let decoder = Arc::new(CountingDecoder::default());
        dispatcher
            .response_parsers()
            .register(decoder.clone(), [media::ANY]);
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Get, "/file").returns(ReturnType::Streamed),
        );

        let streamed = dispatcher
            .invoke(&endpoint, &[])
            .await
            .unwrap()
            .into_streamed()
            .unwrap();

        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(streamed.header(CONTENT_TYPE), Some("application/octet-stream"));

        streamed.close();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_streamed_error_takes_body() {
        let transport = MockTransport::new(|| {
            Response::new(StatusCode::SERVICE_UNAVAILABLE).with_body("maintenance")
        });
        let dispatcher = Dispatcher::new(transport);
        let decoder = Arc::new(CountingDecoder::default());
        dispatcher
            .response_parsers()
            .register(decoder.clone(), [media::ANY]);
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Get, "/")
                .error(500, 599, ErrorType::streamed("Outage")),
        );

        let err = dispatcher.invoke(&endpoint, &[]).await.unwrap_err();
        let mut rest = err.into_rest().unwrap();

        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
        assert!(rest.is("Outage"));
        assert_eq!(rest.status_code(), 503);
        assert!(rest.payload().is_none());
        let body = rest.take_body().unwrap();
        assert_eq!(body.text().await.unwrap(), "maintenance");
    }

    #[tokio::test]
    async fn test_unit_and_bodiless_success_skip_decoding() {
        let decoder = Arc::new(CountingDecoder::default());

        let unit = endpoint(EndpointDescriptor::builder("unit", RequestMethod::Delete, "/"));
        let dispatcher = Dispatcher::new(MockTransport::json(200, "{}"));
        dispatcher
            .response_parsers()
            .register(decoder.clone(), [media::ANY]);
        assert!(matches!(
            dispatcher.invoke(&unit, &[]).await.unwrap(),
            Outcome::Empty
        ));

        let value = endpoint(
            EndpointDescriptor::builder("value", RequestMethod::Head, "/")
                .returns(ReturnType::Value("Item")),
        );
        let dispatcher = Dispatcher::new(MockTransport::new(|| Response::new(StatusCode::OK)));
        dispatcher
            .response_parsers()
            .register(decoder.clone(), [media::ANY]);
        assert!(matches!(
            dispatcher.invoke(&value, &[]).await.unwrap(),
            Outcome::Empty
        ));

        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_typed_response_decodes_even_without_body() {
        let decoder = Arc::new(CountingDecoder::default());
        let dispatcher = Dispatcher::new(MockTransport::new(|| {
            Response::new(StatusCode::NO_CONTENT).with_message("No Content")
        }));
        dispatcher
            .response_parsers()
            .register(decoder.clone(), [media::ANY]);
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Delete, "/")
                .returns(ReturnType::Response("Ack")),
        );

        let response = dispatcher
            .invoke(&endpoint, &[])
            .await
            .unwrap()
            .into_response::<Value>()
            .unwrap();

        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.status_code(), 204);
        assert_eq!(response.message.as_deref(), Some("No Content"));
        assert_eq!(response.data["media_type"], "*/*");
        assert_eq!(response.data["charset"], "UTF-8");
    }

    #[tokio::test]
    async fn test_missing_response_parser() {
        let dispatcher = dispatcher(MockTransport::new(|| {
            Response::new(StatusCode::OK)
                .with_header(CONTENT_TYPE, "text/csv")
                .with_body("a,b")
        }));
        let endpoint = endpoint(
            EndpointDescriptor::builder("e", RequestMethod::Get, "/").returns(ReturnType::Value("Row")),
        );

        let err = dispatcher.invoke(&endpoint, &[]).await.unwrap_err();

        assert!(matches!(
            &err,
            Error::MissingResponseParser { media_type } if media_type == "text/csv"
        ));
    }

    #[tokio::test]
    async fn test_transport_error_is_propagated() {
        let dispatcher = dispatcher(Arc::new(FailingTransport));
        let endpoint = endpoint(EndpointDescriptor::builder("e", RequestMethod::Get, "/"));

        let err = dispatcher.invoke(&endpoint, &[]).await.unwrap_err();

        match err {
            Error::Transport(source) => {
                let io = source.downcast_ref::<std::io::Error>().unwrap();
                assert_eq!(io.kind(), std::io::ErrorKind::ConnectionRefused);
            }
            other => panic!("expected Transport, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_success() {
        let transport = MockTransport::new(|| {
            Response::new(StatusCode::OK)
                .with_message("OK")
                .with_header("header", "headerValue")
                .with_header(CONTENT_TYPE, "application/json; charset=UTF-8")
                .with_body(r#"{"name": "some name", "age": 5}"#)
        });
        let dispatcher = dispatcher(transport.clone());
        let endpoint = crate::ResourceDescriptor::new()
            .base_path("/resource")
            .endpoint(endpoint(
                EndpointDescriptor::builder("success", RequestMethod::Post, "/endpoint/{pathParam}")
                    .header("header")
                    .path_param("pathParam")
                    .query("queryParam")
                    .body()
                    .returns(ReturnType::Response("ResponseObject")),
            ))
            .get("success")
            .cloned()
            .unwrap();

        let response = dispatcher
            .invoke(
                &endpoint,
                &[
                    json!("headerValue"),
                    json!("success"),
                    json!("queryParamValue"),
                    json!({ "count": 10 }),
                ],
            )
            .await
            .unwrap()
            .into_response::<Value>()
            .unwrap();

        let request = transport.last_request();
        assert_eq!(request.method(), RequestMethod::Post);
        assert_eq!(request.path(), "/resource/endpoint/success");
        assert_eq!(request.header_values("header").unwrap(), ["headerValue"]);
        assert_eq!(request.query_param_values("queryParam").unwrap(), ["queryParamValue"]);

        assert_eq!(response.data, json!({ "name": "some name", "age": 5 }));
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.message.as_deref(), Some("OK"));
        assert_eq!(response.header_values("header").unwrap(), ["headerValue"]);
    }
}
