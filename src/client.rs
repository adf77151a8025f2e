//! The user-facing entry points.
//!
//! A [`ResourceFactory`] holds the transport, the parser registries and the
//! interceptor chains. It turns [`ResourceDescriptor`]s into [`Resource`]
//! handles whose endpoints are invoked by name through a [`Call`].

use crate::media::{Decoder, Encoder};
use crate::{
    Dispatcher, Error, Outcome, RequestInterceptor, ResourceDescriptor, ResponseInterceptor,
    RestResponse, Result, StreamedResponse, Transport,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Creates resources that share one transport and one set of parsers and
/// interceptors.
///
/// The factory is a cheap handle: clones share the same dispatcher, and
/// parsers or interceptors changed through any clone affect every resource
/// created from it, including calls already running on other tasks.
///
/// # Examples
///
/// ```no_run
/// use rested::parsers::JsonParser;
/// use rested::{
///     media, EndpointDescriptor, HttpTransport, RequestMethod, ResourceDescriptor,
///     ResourceFactory, ReturnType,
/// };
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     name: String,
/// }
///
/// # async fn example() -> Result<(), rested::Error> {
/// let factory = ResourceFactory::builder()
///     .transport(HttpTransport::builder().base_url("https://api.example.com")?.build()?)
///     .parser(JsonParser, [media::JSON])
///     .build()?;
///
/// let users = factory.create_resource(
///     ResourceDescriptor::new().base_path("/users").endpoint(
///         EndpointDescriptor::builder("get", RequestMethod::Get, "/{id}")
///             .path_param("id")
///             .returns(ReturnType::value::<User>())
///             .build()?,
///     ),
/// );
///
/// let user: User = users.call("get").arg(42).value().await?;
/// println!("User: {}", user.name);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ResourceFactory {
    dispatcher: Arc<Dispatcher>,
}

impl ResourceFactory {
    pub fn builder() -> ResourceFactoryBuilder {
        ResourceFactoryBuilder::new()
    }

    /// A factory with no parsers and no interceptors.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(Arc::new(transport))),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn register_request_parser<I, S>(&self, parser: Arc<dyn Encoder>, media_types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dispatcher.request_parsers().register(parser, media_types);
    }

    pub fn unregister_request_parser<I, S>(&self, media_types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dispatcher.request_parsers().unregister(media_types);
    }

    pub fn register_response_parser<I, S>(&self, parser: Arc<dyn Decoder>, media_types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dispatcher.response_parsers().register(parser, media_types);
    }

    pub fn unregister_response_parser<I, S>(&self, media_types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dispatcher.response_parsers().unregister(media_types);
    }

    /// Appends request interceptors; they run after the ones already present.
    pub fn add_request_interceptors<I>(&self, interceptors: I)
    where
        I: IntoIterator<Item = Arc<dyn RequestInterceptor>>,
    {
        self.dispatcher.request_interceptors().add(interceptors);
    }

    /// Removes request interceptors, matched by identity.
    pub fn remove_request_interceptors<'a, I>(&self, interceptors: I)
    where
        I: IntoIterator<Item = &'a Arc<dyn RequestInterceptor>>,
    {
        self.dispatcher.request_interceptors().remove(interceptors);
    }

    pub fn add_response_interceptors<I>(&self, interceptors: I)
    where
        I: IntoIterator<Item = Arc<dyn ResponseInterceptor>>,
    {
        self.dispatcher.response_interceptors().add(interceptors);
    }

    pub fn remove_response_interceptors<'a, I>(&self, interceptors: I)
    where
        I: IntoIterator<Item = &'a Arc<dyn ResponseInterceptor>>,
    {
        self.dispatcher.response_interceptors().remove(interceptors);
    }

    /// Binds a resource description to this factory.
    pub fn create_resource(&self, descriptor: ResourceDescriptor) -> Resource {
        tracing::debug!(
            endpoints = descriptor.endpoint_names().count(),
            "Creating resource"
        );
        Resource {
            dispatcher: self.dispatcher.clone(),
            descriptor: Arc::new(descriptor),
        }
    }
}

/// Builder for configuring and creating a [`ResourceFactory`].
///
/// # Examples
///
/// ```no_run
/// use rested::parsers::{JsonParser, TextParser};
/// use rested::{media, HttpTransport, ResourceFactory};
///
/// # fn example() -> Result<(), rested::Error> {
/// let factory = ResourceFactory::builder()
///     .transport(HttpTransport::builder().base_url("http://localhost:8080")?.build()?)
///     .parser(JsonParser, [media::JSON, "application/*"])
///     .parser(TextParser, ["text/*"])
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ResourceFactoryBuilder {
    transport: Option<Arc<dyn Transport>>,
    request_parsers: Vec<(Arc<dyn Encoder>, Vec<String>)>,
    response_parsers: Vec<(Arc<dyn Decoder>, Vec<String>)>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl ResourceFactoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(self, transport: impl Transport + 'static) -> Self {
        self.shared_transport(Arc::new(transport))
    }

    /// Uses a transport that is also held elsewhere.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn request_parser<I, S>(mut self, parser: impl Encoder + 'static, media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parser: Arc<dyn Encoder> = Arc::new(parser);
        self.request_parsers
            .push((parser, media_types.into_iter().map(Into::into).collect()));
        self
    }

    pub fn response_parser<I, S>(mut self, parser: impl Decoder + 'static, media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parser: Arc<dyn Decoder> = Arc::new(parser);
        self.response_parsers
            .push((parser, media_types.into_iter().map(Into::into).collect()));
        self
    }

    /// Registers one parser for both request and response bodies.
    pub fn parser<P, I, S>(mut self, parser: P, media_types: I) -> Self
    where
        P: Encoder + Decoder + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parser = Arc::new(parser);
        let encoder: Arc<dyn Encoder> = parser.clone();
        let decoder: Arc<dyn Decoder> = parser;
        let media_types: Vec<String> = media_types.into_iter().map(Into::into).collect();
        self.request_parsers.push((encoder, media_types.clone()));
        self.response_parsers.push((decoder, media_types));
        self
    }

    pub fn request_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.request_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn response_interceptor(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.response_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Builds the configured factory.
    ///
    /// # Errors
    ///
    /// Returns an error if no transport was provided.
    pub fn build(self) -> Result<ResourceFactory> {
        let transport = self
            .transport
            .ok_or_else(|| Error::Configuration("Transport is required".to_string()))?;

        let dispatcher = Dispatcher::new(transport);
        for (parser, media_types) in self.request_parsers {
            dispatcher.request_parsers().register(parser, media_types);
        }
        for (parser, media_types) in self.response_parsers {
            dispatcher.response_parsers().register(parser, media_types);
        }
        dispatcher.request_interceptors().add(self.request_interceptors);
        dispatcher.response_interceptors().add(self.response_interceptors);

        Ok(ResourceFactory {
            dispatcher: Arc::new(dispatcher),
        })
    }
}

/// A described resource bound to a factory.
///
/// Cloning is cheap; clones may be used from many tasks at once.
#[derive(Debug, Clone)]
pub struct Resource {
    dispatcher: Arc<Dispatcher>,
    descriptor: Arc<ResourceDescriptor>,
}

impl Resource {
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Starts a call to the endpoint named `endpoint`.
    ///
    /// An unknown name is reported when the call is sent.
    pub fn call(&self, endpoint: impl Into<String>) -> Call {
        Call {
            resource: self.clone(),
            endpoint: endpoint.into(),
            args: Vec::new(),
        }
    }
}

/// One pending endpoint call.
///
/// Arguments are given in the order the endpoint declares its parameters.
/// Missing trailing arguments count as `null`.
#[derive(Debug, Clone)]
#[must_use = "a call does nothing until it is sent"]
pub struct Call {
    resource: Resource,
    endpoint: String,
    args: Vec<Value>,
}

impl Call {
    /// Appends an argument. `Option::None` and `Value::Null` are null arguments.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Appends an argument converted with `serde`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if `value` cannot be represented as JSON.
    pub fn serialized_arg<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let value = serde_json::to_value(value).map_err(|e| Error::Encoding(Box::new(e)))?;
        self.args.push(value);
        Ok(self)
    }

    pub fn args<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    /// Sends the call and returns the raw outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEndpoint`] if the resource has no such
    /// endpoint, and otherwise whatever the dispatcher reports.
    pub async fn send(self) -> Result<Outcome> {
        let endpoint = self
            .resource
            .descriptor
            .get(&self.endpoint)
            .ok_or_else(|| Error::UnknownEndpoint(self.endpoint.clone()))?;

        self.resource.dispatcher.invoke(endpoint, &self.args).await
    }

    /// Sends the call and deserializes the decoded body.
    pub async fn value<T: DeserializeOwned>(self) -> Result<T> {
        self.send().await?.into_value()
    }

    /// Sends the call and returns the decoded body with status and headers.
    pub async fn response<T: DeserializeOwned>(self) -> Result<RestResponse<T>> {
        self.send().await?.into_response()
    }

    /// Sends the call and returns the raw body stream.
    pub async fn streamed(self) -> Result<StreamedResponse> {
        self.send().await?.into_streamed()
    }

    /// Sends the call, discarding any result.
    pub async fn unit(self) -> Result<()> {
        self.send().await?.into_unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::CONTENT_TYPE;
    use crate::parsers::{JsonParser, TextParser};
    use crate::{
        media, Abort, BoxError, EndpointDescriptor, Request, RequestBuilder, RequestMethod,
        Response, ReturnType,
    };
    use async_trait::async_trait;
    use http::StatusCode;
    use serde_json::json;

    /// Echoes the request path as a JSON string.
    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn execute(
            &self,
            request: &Request,
            _endpoint: &EndpointDescriptor,
            _args: &[Value],
        ) -> std::result::Result<Response, BoxError> {
            Ok(Response::new(StatusCode::OK)
                .with_header(CONTENT_TYPE, media::JSON)
                .with_body(Value::from(request.path()).to_string()))
        }
    }

    fn resource(factory: &ResourceFactory) -> Resource {
        factory.create_resource(
            ResourceDescriptor::new().base_path("/items").endpoint(
                EndpointDescriptor::builder("get", RequestMethod::Get, "/{id}")
                    .path_param("id")
                    .returns(ReturnType::value::<String>())
                    .build()
                    .unwrap(),
            ),
        )
    }

    #[test]
    fn test_builder_requires_transport() {
        assert!(matches!(
            ResourceFactory::builder().build(),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_call_by_name() {
        let factory = ResourceFactory::builder()
            .transport(EchoTransport)
            .parser(JsonParser, [media::JSON])
            .build()
            .unwrap();

        let path: String = resource(&factory).call("get").arg(3).value().await.unwrap();
        assert_eq!(path, "/items/3");
    }

    #[tokio::test]
    async fn test_unknown_endpoint() {
        let factory = ResourceFactory::new(EchoTransport);

        let err = resource(&factory).call("delete").send().await.unwrap_err();
        assert!(matches!(err, Error::UnknownEndpoint(name) if name == "delete"));
    }

    #[tokio::test]
    async fn test_parsers_can_change_at_runtime() {
        let factory = ResourceFactory::new(EchoTransport);
        let items = resource(&factory);

        let err = items.call("get").arg(1).send().await.unwrap_err();
        assert_eq!(err.missing_media_type(), Some("application/json"));

        factory.register_response_parser(Arc::new(TextParser), [media::ANY]);
        let raw: String = items.call("get").arg(1).value().await.unwrap();
        assert_eq!(raw, "\"/items/1\"");

        factory.register_response_parser(Arc::new(JsonParser), [media::JSON]);
        let decoded: String = items.call("get").arg(1).value().await.unwrap();
        assert_eq!(decoded, "/items/1");

        factory.unregister_response_parser([media::JSON, media::ANY]);
        assert!(items.call("get").arg(1).send().await.is_err());
    }

    #[tokio::test]
    async fn test_interceptors_can_change_at_runtime() {
        let factory = ResourceFactory::builder()
            .transport(EchoTransport)
            .parser(JsonParser, [media::JSON])
            .build()
            .unwrap();
        let items = resource(&factory);
        let rewrite: Arc<dyn RequestInterceptor> = Arc::new(
            |pending: &mut RequestBuilder,
             _body: Option<&Value>,
             _endpoint: &EndpointDescriptor,
             _args: &[Value]|
             -> std::result::Result<(), Abort> {
                let path = format!("/v2{}", pending.path());
                pending.set_path(path);
                Ok(())
            },
        );

        factory.add_request_interceptors([rewrite.clone()]);
        let path: String = items.call("get").arg(5).value().await.unwrap();
        assert_eq!(path, "/v2/items/5");

        factory.remove_request_interceptors([&rewrite]);
        let path: String = items.call("get").arg(5).value().await.unwrap();
        assert_eq!(path, "/items/5");
    }

    #[tokio::test]
    async fn test_serialized_and_null_args() {
        #[derive(Serialize)]
        struct Id(u32);

        let factory = ResourceFactory::builder()
            .transport(EchoTransport)
            .parser(JsonParser, [media::JSON])
            .build()
            .unwrap();
        let items = resource(&factory);

        let path: String = items
            .call("get")
            .serialized_arg(&Id(9))
            .unwrap()
            .value()
            .await
            .unwrap();
        assert_eq!(path, "/items/9");

        let path: String = items.call("get").arg(None::<u32>).value().await.unwrap();
        assert_eq!(path, "/items/{id}");
    }
}
