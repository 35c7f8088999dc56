use futures::future::{self, BoxFuture};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::error::{BoxError, TrustError};

type CaptureBoxed<P> = dyn Fn(Value) -> BoxFuture<'static, Result<P, BoxError>> + Send + Sync;
type ContextBoxed<C> =
    dyn Fn(Option<Value>) -> BoxFuture<'static, Result<C, BoxError>> + Send + Sync;

/// Narrows raw input into typed rule parameters.
pub struct CaptureFn<P>(Arc<CaptureBoxed<P>>);

impl<P: Send + 'static> CaptureFn<P> {
    /// Synchronous capture.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<P, BoxError> + Send + Sync + 'static,
    {
        CaptureFn(Arc::new(
            move |input: Value| -> BoxFuture<'static, Result<P, BoxError>> {
                Box::pin(future::ready(f(input)))
            },
        ))
    }

    /// Asynchronous capture.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P, BoxError>> + Send + 'static,
    {
        CaptureFn(Arc::new(
            move |input: Value| -> BoxFuture<'static, Result<P, BoxError>> { Box::pin(f(input)) },
        ))
    }

    /// Capture by deserializing the raw input into `P`.
    pub fn json() -> Self
    where
        P: DeserializeOwned,
    {
        CaptureFn::new(|input| serde_json::from_value(input).map_err(Into::into))
    }
}

impl<P> Clone for CaptureFn<P> {
    fn clone(&self) -> Self {
        CaptureFn(Arc::clone(&self.0))
    }
}

/// Normalizes the raw side-channel context handed to every rule.
///
/// Receives exactly what the caller passed, `None` when the caller supplied
/// no context.
pub struct ContextFn<C>(Arc<ContextBoxed<C>>);

impl<C: Send + 'static> ContextFn<C> {
    /// Synchronous context normalization.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<Value>) -> Result<C, BoxError> + Send + Sync + 'static,
    {
        ContextFn(Arc::new(
            move |raw: Option<Value>| -> BoxFuture<'static, Result<C, BoxError>> {
                Box::pin(future::ready(f(raw)))
            },
        ))
    }

    /// Asynchronous context normalization.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C, BoxError>> + Send + 'static,
    {
        ContextFn(Arc::new(
            move |raw: Option<Value>| -> BoxFuture<'static, Result<C, BoxError>> {
                Box::pin(f(raw))
            },
        ))
    }

    /// Deserialize the raw context into `C`; a missing context is read as `null`.
    pub fn json() -> Self
    where
        C: DeserializeOwned,
    {
        ContextFn::new(|raw| {
            serde_json::from_value(raw.unwrap_or(Value::Null)).map_err(Into::into)
        })
    }
}

impl<C> Clone for ContextFn<C> {
    fn clone(&self) -> Self {
        ContextFn(Arc::clone(&self.0))
    }
}

/// Input normalizer: runs capture and, if configured, context once per invocation.
pub struct Normalizer<P, C> {
    capture: CaptureFn<P>,
    context: Option<ContextFn<C>>,
}

impl<P, C> Normalizer<P, C> {
    pub fn new(capture: CaptureFn<P>, context: Option<ContextFn<C>>) -> Self {
        Normalizer { capture, context }
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    /// Produce the shared parameters and context for one invocation.
    ///
    /// Failures are returned as-is, without rule attribution. Without a
    /// context function the raw context is ignored and rules see `None`.
    pub async fn normalize(
        &self,
        input: Value,
        raw_context: Option<Value>,
    ) -> Result<(Arc<P>, Option<Arc<C>>), TrustError> {
        let params = (self.capture.0)(input).await.map_err(TrustError::Capture)?;

        let context = match &self.context {
            Some(context) => Some(Arc::new(
                (context.0)(raw_context).await.map_err(TrustError::Context)?,
            )),
            None => None,
        };

        Ok((Arc::new(params), context))
    }
}
