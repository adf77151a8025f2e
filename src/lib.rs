//! # Rested - Declarative REST resources
//!
//! Rested lets you describe the endpoints of a REST resource once, as data,
//! and then call them by name. For every call it builds the request from the
//! arguments, encodes the body with a parser chosen by media type, runs your
//! interceptors, sends the request through a pluggable transport and decodes
//! the response, turning non-success statuses into typed REST errors.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rested::parsers::JsonParser;
//! use rested::{
//!     media, EndpointDescriptor, ErrorType, HttpTransport, RequestMethod, ResourceDescriptor,
//!     ResourceFactory, ReturnType,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//!     email: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rested::Error> {
//!     let factory = ResourceFactory::builder()
//!         .transport(
//!             HttpTransport::builder()
//!                 .base_url("https://api.example.com")?
//!                 .timeout(Duration::from_secs(30))
//!                 .build()?,
//!         )
//!         .parser(JsonParser, [media::JSON])
//!         .build()?;
//!
//!     let users = factory.create_resource(
//!         ResourceDescriptor::new()
//!             .base_path("/users")
//!             .endpoint(
//!                 EndpointDescriptor::builder("get", RequestMethod::Get, "/{id}")
//!                     .path_param("id")
//!                     .error(404, 404, ErrorType::new("UserNotFound"))
//!                     .returns(ReturnType::value::<User>())
//!                     .build()?,
//!             )
//!             .endpoint(
//!                 EndpointDescriptor::builder("create", RequestMethod::Post, "")
//!                     .body()
//!                     .returns(ReturnType::response::<User>())
//!                     .build()?,
//!             ),
//!     );
//!
//!     let user: User = users.call("get").arg(123).value().await?;
//!     println!("User: {}", user.name);
//!
//!     let new_user = CreateUser {
//!         name: "Alice".to_string(),
//!         email: "alice@example.com".to_string(),
//!     };
//!     let created = users
//!         .call("create")
//!         .serialized_arg(&new_user)?
//!         .response::<User>()
//!         .await?;
//!     println!("Created user {} ({})", created.data.id, created.status);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Endpoints as data** - Path placeholders, headers, query parameters and body described per argument
//! - **Pluggable parsers** - Encoders and decoders selected by media type, with `type/*` and `*/*` fallbacks
//! - **Interceptors** - Inspect or rewrite requests, inspect responses, or veto a call
//! - **Typed REST errors** - Status code ranges map to named error types carrying status, headers and payload
//! - **Streaming** - Hand raw response bodies to the caller without decoding them
//! - **Pluggable transport** - A `reqwest`-based HTTP transport is included; bring your own for tests
//! - **Automatic logging** - Structured logging with `tracing` for observability
//! - **Runtime reconfiguration** - Parsers and interceptors can be changed while calls are in flight
//!
//! ## Error Handling
//!
//! Non-success responses surface as [`Error::Rest`], everything else as the
//! variant of the step that failed:
//!
//! ```no_run
//! use rested::{Error, Resource};
//!
//! # async fn example(users: Resource) -> Result<(), Error> {
//! match users.call("get").arg(7).value::<serde_json::Value>().await {
//!     Ok(user) => println!("Success: {}", user),
//!     Err(Error::Rest(err)) if err.is("UserNotFound") => {
//!         eprintln!("No user 7 (HTTP {})", err.status_code());
//!     }
//!     Err(Error::Rest(err)) => {
//!         eprintln!("{}: {:?}", err, err.payload());
//!     }
//!     Err(Error::RequestAborted { abort, .. }) => {
//!         eprintln!("An interceptor stopped the call: {}", abort);
//!     }
//!     Err(e) => {
//!         eprintln!("Other error: {}", e);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Interceptors
//!
//! Request interceptors see the request before it is frozen:
//!
//! ```no_run
//! use rested::{Abort, EndpointDescriptor, RequestBuilder, ResourceFactory};
//! use serde_json::Value;
//! use std::sync::Arc;
//!
//! # fn example(factory: ResourceFactory) {
//! factory.add_request_interceptors([Arc::new(
//!     |pending: &mut RequestBuilder,
//!      _body: Option<&Value>,
//!      _endpoint: &EndpointDescriptor,
//!      _args: &[Value]|
//!      -> Result<(), Abort> {
//!         if pending.has_header("Authorization") {
//!             Ok(())
//!         } else {
//!             Err(Abort::with_message("missing credentials"))
//!         }
//!     },
//! ) as Arc<dyn rested::RequestInterceptor>]);
//! # }
//! ```

mod client;
mod dispatcher;
mod error;
pub mod headers;
mod interceptor;
pub mod media;
pub mod metadata;
pub mod parsers;
mod request;
mod response;
mod transport;

pub use client::{Call, Resource, ResourceFactory, ResourceFactoryBuilder};
pub use dispatcher::{Dispatcher, Outcome};
pub use error::{BoxError, Error, RestError, Result};
pub use headers::{Headers, MultiValueMap, QueryParams};
pub use interceptor::{Abort, InterceptorChain, RequestInterceptor, ResponseInterceptor};
pub use metadata::{
    EndpointBuilder, EndpointDescriptor, ErrorRule, ErrorType, ParamRole, ResourceDescriptor,
    ReturnType,
};
pub use request::{Request, RequestBuilder, RequestMethod};
pub use response::{Body, Response, RestResponse, StreamedResponse};
pub use transport::{HttpTransport, HttpTransportBuilder, Transport};
