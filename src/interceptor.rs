//! Request and response interceptors.
//!
//! Request interceptors see the pending [`RequestBuilder`] right before it is
//! frozen and may change it. Response interceptors see the finished exchange
//! and the parsed [`Outcome`]. Either kind may veto the call by returning an
//! [`Abort`], which stops the remaining interceptors of that stage and is
//! surfaced to the caller.

use crate::{BoxError, EndpointDescriptor, Outcome, Request, RequestBuilder, Response};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The veto signal returned by an interceptor.
///
/// The dispatcher attaches the in-flight request (and response) and returns
/// it to the caller as [`Error::RequestAborted`](crate::Error::RequestAborted)
/// or [`Error::ResponseAborted`](crate::Error::ResponseAborted).
#[derive(Debug, thiserror::Error)]
#[error("{}", .message.as_deref().unwrap_or("intercepted"))]
pub struct Abort {
    message: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl Abort {
    pub fn new() -> Self {
        Self {
            message: None,
            source: None,
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            source: None,
        }
    }

    /// Wraps the error that made the interceptor give up.
    pub fn caused_by(self, source: impl Into<BoxError>) -> Self {
        Self {
            source: Some(source.into()),
            ..self
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl Default for Abort {
    fn default() -> Self {
        Self::new()
    }
}

/// Observes and may alter a request before it is sent.
///
/// Implemented for closures with the same signature.
pub trait RequestInterceptor: Send + Sync {
    /// Called with the mutable request, the raw body argument (before
    /// encoding), the endpoint and all call arguments.
    fn intercept(
        &self,
        pending: &mut RequestBuilder,
        body: Option<&Value>,
        endpoint: &EndpointDescriptor,
        args: &[Value],
    ) -> Result<(), Abort>;
}

impl<F> RequestInterceptor for F
where
    F: Fn(&mut RequestBuilder, Option<&Value>, &EndpointDescriptor, &[Value]) -> Result<(), Abort>
        + Send
        + Sync,
{
    fn intercept(
        &self,
        pending: &mut RequestBuilder,
        body: Option<&Value>,
        endpoint: &EndpointDescriptor,
        args: &[Value],
    ) -> Result<(), Abort> {
        self(pending, body, endpoint, args)
    }
}

/// Observes a finished exchange before its result is delivered.
///
/// The response body has already been consumed or handed over when this
/// runs; status, message and headers are still available.
pub trait ResponseInterceptor: Send + Sync {
    fn intercept(
        &self,
        request: &Request,
        response: &Response,
        outcome: &Outcome,
        endpoint: &EndpointDescriptor,
        args: &[Value],
    ) -> Result<(), Abort>;
}

impl<F> ResponseInterceptor for F
where
    F: Fn(&Request, &Response, &Outcome, &EndpointDescriptor, &[Value]) -> Result<(), Abort>
        + Send
        + Sync,
{
    fn intercept(
        &self,
        request: &Request,
        response: &Response,
        outcome: &Outcome,
        endpoint: &EndpointDescriptor,
        args: &[Value],
    ) -> Result<(), Abort> {
        self(request, response, outcome, endpoint, args)
    }
}

/// An ordered, thread-safe list of interceptors.
///
/// Dispatch works on a [`snapshot`](Self::snapshot), so interceptors may be
/// added or removed while calls are in flight; a running call keeps the list
/// it started with.
pub struct InterceptorChain<I: ?Sized> {
    interceptors: RwLock<Vec<Arc<I>>>,
}

impl<I: ?Sized> InterceptorChain<I> {
    pub fn new() -> Self {
        Self {
            interceptors: RwLock::new(Vec::new()),
        }
    }

    /// Appends interceptors; they run after the ones already present.
    pub fn add<T>(&self, interceptors: T)
    where
        T: IntoIterator<Item = Arc<I>>,
    {
        self.interceptors.write().extend(interceptors);
    }

    /// Removes the first registration of each given interceptor.
    ///
    /// Interceptors are matched by identity, not by value.
    pub fn remove<'a, T>(&self, interceptors: T)
    where
        T: IntoIterator<Item = &'a Arc<I>>,
        I: 'a,
    {
        let mut current = self.interceptors.write();
        for interceptor in interceptors {
            if let Some(index) = current
                .iter()
                .position(|registered| Arc::ptr_eq(registered, interceptor))
            {
                current.remove(index);
            }
        }
    }

    /// The current interceptors, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<I>> {
        self.interceptors.read().clone()
    }

    pub fn len(&self) -> usize {
        self.interceptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.read().is_empty()
    }
}

impl<I: ?Sized> Default for InterceptorChain<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ?Sized> fmt::Debug for InterceptorChain<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.len())
            .finish()
    }
}
