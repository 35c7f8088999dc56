use futures::future::{self, BoxFuture};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::BoxError;

/// Future returned by a type-erased rule evaluator.
///
/// Resolves to `Ok(None)` when the rule intentionally contributed nothing.
pub type RuleFuture = BoxFuture<'static, Result<Option<Value>, BoxError>>;

/// Type-erased evaluator shared by all invocations of a pipeline.
pub type Evaluator<P, C> = dyn Fn(Arc<P>, Option<Arc<C>>) -> RuleFuture + Send + Sync;

/// Conversion from a rule's return value into an optional result entry.
///
/// `None` is the empty sentinel: the rule gets no entry in the verdict.
/// `()` and `Option::None` are empty; every other value, `Value::Null`
/// included, is recorded.
pub trait RuleOutput {
    fn into_output(self) -> Result<Option<Value>, BoxError>;
}

impl RuleOutput for () {
    #[inline]
    fn into_output(self) -> Result<Option<Value>, BoxError> {
        Ok(None)
    }
}

impl<T: Serialize> RuleOutput for Option<T> {
    fn into_output(self) -> Result<Option<Value>, BoxError> {
        match self {
            Some(value) => Ok(Some(serde_json::to_value(value)?)),
            None => Ok(None),
        }
    }
}

impl<T: Serialize> RuleOutput for Vec<T> {
    fn into_output(self) -> Result<Option<Value>, BoxError> {
        Ok(Some(serde_json::to_value(self)?))
    }
}

macro_rules! present_output {
    ($($ty:ty),* $(,)?) => {
        $(
            impl RuleOutput for $ty {
                fn into_output(self) -> Result<Option<Value>, BoxError> {
                    Ok(Some(serde_json::to_value(self)?))
                }
            }
        )*
    };
}

present_output!(
    bool,
    i32,
    i64,
    u32,
    u64,
    usize,
    f64,
    String,
    &'static str,
    Value,
    Map<String, Value>,
);

/// A named unit of authorization logic.
///
/// Immutable once built; cloning shares the evaluator.
pub struct Rule<P, C = ()> {
    name: Arc<str>,
    evaluator: Arc<Evaluator<P, C>>,
}

impl<P, C> Rule<P, C>
where
    P: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Pair a name with an asynchronous evaluator.
    pub fn new<F, Fut, R>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<P>, Option<Arc<C>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
        R: RuleOutput + 'static,
    {
        let evaluator = move |params: Arc<P>, context: Option<Arc<C>>| -> RuleFuture {
            let pending = f(params, context);
            Box::pin(async move { pending.await.and_then(RuleOutput::into_output) })
        };

        Rule::from_evaluator(name, Arc::new(evaluator))
    }

    /// Pair a name with a synchronous evaluator.
    pub fn from_fn<F, R>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&P, Option<&C>) -> Result<R, BoxError> + Send + Sync + 'static,
        R: RuleOutput,
    {
        let evaluator = move |params: Arc<P>, context: Option<Arc<C>>| -> RuleFuture {
            let output = f(&*params, context.as_deref()).and_then(RuleOutput::into_output);
            Box::pin(future::ready(output))
        };

        Rule::from_evaluator(name, Arc::new(evaluator))
    }

    /// Wrap an already type-erased evaluator.
    pub fn from_evaluator(name: impl Into<String>, evaluator: Arc<Evaluator<P, C>>) -> Self {
        let name: String = name.into();
        Rule {
            name: Arc::from(name),
            evaluator,
        }
    }
}

impl<P, C> Rule<P, C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start evaluating this rule against shared parameters and context.
    pub fn evaluate(&self, params: Arc<P>, context: Option<Arc<C>>) -> RuleFuture {
        (self.evaluator)(params, context)
    }
}

impl<P, C> Clone for Rule<P, C> {
    fn clone(&self) -> Self {
        Rule {
            name: Arc::clone(&self.name),
            evaluator: Arc::clone(&self.evaluator),
        }
    }
}

impl<P, C> fmt::Debug for Rule<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Register an asynchronous rule.
pub fn rule<P, C, F, Fut, R>(name: impl Into<String>, f: F) -> Rule<P, C>
where
    P: Send + Sync + 'static,
    C: Send + Sync + 'static,
    F: Fn(Arc<P>, Option<Arc<C>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    R: RuleOutput + 'static,
{
    Rule::new(name, f)
}

/// Register a synchronous rule.
pub fn rule_fn<P, C, F, R>(name: impl Into<String>, f: F) -> Rule<P, C>
where
    P: Send + Sync + 'static,
    C: Send + Sync + 'static,
    F: Fn(&P, Option<&C>) -> Result<R, BoxError> + Send + Sync + 'static,
    R: RuleOutput,
{
    Rule::from_fn(name, f)
}
