pub mod normalizer;
pub mod runner;

pub use normalizer::{CaptureFn, ContextFn, Normalizer};

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, debug_span, Instrument};

use crate::domain::Verdict;
use crate::error::{BoxError, ConfigError, TrustError};
use crate::rules::{Rule, RuleSet};

/// Configuration bundle for building a [`Pipeline`].
pub struct TrustConfig<P, C = ()> {
    /// Mandatory input normalization
    pub capture: CaptureFn<P>,

    /// Optional context normalization
    pub context: Option<ContextFn<C>>,

    /// Rules in evaluation order
    pub rules: Vec<Rule<P, C>>,
}

/// Declarative authorization pipeline.
///
/// Normalizes raw input (and optionally context), then runs its rules in
/// declaration order, collecting non-empty results by rule name. The first
/// failing rule aborts the invocation with [`TrustError::Unauthorized`].
///
/// Immutable after construction. Clones share the same rules, and every
/// invocation owns its own accumulator, so concurrent calls do not interact.
pub struct Pipeline<P, C = ()> {
    inner: Arc<Inner<P, C>>,
}

struct Inner<P, C> {
    normalizer: Normalizer<P, C>,
    rules: RuleSet<P, C>,
}

impl<P, C> Pipeline<P, C>
where
    P: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Build a pipeline, validating rule names.
    pub fn new(config: TrustConfig<P, C>) -> Result<Self, ConfigError> {
        let rules = RuleSet::new(config.rules)?;

        Ok(Pipeline {
            inner: Arc::new(Inner {
                normalizer: Normalizer::new(config.capture, config.context),
                rules,
            }),
        })
    }

    /// Start building a pipeline fluently.
    pub fn builder() -> PipelineBuilder<P, C> {
        PipelineBuilder::new()
    }

    /// Evaluate raw input and context against every rule.
    ///
    /// Capture and context failures are returned unchanged as
    /// [`TrustError::Capture`] and [`TrustError::Context`]. A rule failure is
    /// returned as [`TrustError::Unauthorized`] naming the rule.
    pub async fn trust(
        &self,
        input: Value,
        context: Option<Value>,
    ) -> Result<Verdict, TrustError> {
        let inner = &self.inner;
        let span = debug_span!("trust", rules = inner.rules.len());

        async move {
            let (params, context) = inner.normalizer.normalize(input, context).await?;
            let verdict = runner::run(params, context, &inner.rules).await?;
            debug!(results = verdict.len(), "invocation authorized");
            Ok(verdict)
        }
        .instrument(span)
        .await
    }
}

impl<P, C> Pipeline<P, C> {
    /// The configured rules, read-only.
    pub fn rules(&self) -> &RuleSet<P, C> {
        &self.inner.rules
    }

    /// Whether a context function was configured.
    pub fn has_context(&self) -> bool {
        self.inner.normalizer.has_context()
    }
}

impl<P, C> Clone for Pipeline<P, C> {
    fn clone(&self) -> Self {
        Pipeline {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, C> fmt::Debug for Pipeline<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("rules", &self.inner.rules)
            .field("context", &self.has_context())
            .finish()
    }
}

/// Fluent builder for [`Pipeline`].
pub struct PipelineBuilder<P, C = ()> {
    capture: Option<CaptureFn<P>>,
    context: Option<ContextFn<C>>,
    rules: Vec<Rule<P, C>>,
}

impl<P, C> PipelineBuilder<P, C>
where
    P: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    pub fn new() -> Self {
        PipelineBuilder {
            capture: None,
            context: None,
            rules: Vec::new(),
        }
    }

    /// Set a synchronous capture function.
    pub fn capture<F>(self, f: F) -> Self
    where
        F: Fn(Value) -> Result<P, BoxError> + Send + Sync + 'static,
    {
        self.capture_with(CaptureFn::new(f))
    }

    /// Set a prepared capture function (async or JSON based).
    pub fn capture_with(mut self, capture: CaptureFn<P>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Set a synchronous context function.
    pub fn context<F>(self, f: F) -> Self
    where
        F: Fn(Option<Value>) -> Result<C, BoxError> + Send + Sync + 'static,
    {
        self.context_with(ContextFn::new(f))
    }

    /// Set a prepared context function.
    pub fn context_with(mut self, context: ContextFn<C>) -> Self {
        self.context = Some(context);
        self
    }

    /// Append a rule; it runs after every rule added before it.
    pub fn rule(mut self, rule: Rule<P, C>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Append several rules in order.
    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule<P, C>>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn build(self) -> Result<Pipeline<P, C>, ConfigError> {
        let capture = self.capture.ok_or(ConfigError::MissingCapture)?;

        Pipeline::new(TrustConfig {
            capture,
            context: self.context,
            rules: self.rules,
        })
    }
}

impl<P, C> Default for PipelineBuilder<P, C>
where
    P: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn default() -> Self {
        PipelineBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AUTHORIZATION_FAILED, UNKNOWN_RULE};
    use crate::rules::{rule, rule_fn};
    use serde::Deserialize;
    use serde_json::json;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Deserialize)]
    struct Params {
        #[serde(rename = "userId")]
        user_id: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Tenant {
        tenant: String,
    }

    fn role_pipeline() -> Pipeline<Params> {
        Pipeline::builder()
            .capture_with(CaptureFn::json())
            .rule(rule_fn("checkId", |p: &Params, _| Ok(p.user_id == "admin")))
            .rule(rule_fn("getRole", |p: &Params, _| {
                Ok(if p.user_id == "admin" { "admin" } else { "user" })
            }))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_role_example() {
        let pipeline = role_pipeline();

        let verdict = pipeline
            .trust(json!({ "userId": "admin" }), None)
            .await
            .unwrap();

        assert_eq!(serde_json::to_value(&verdict).unwrap(), json!({ "checkId": true, "getRole": "admin" }));
    }

    #[tokio::test]
    async fn test_failing_rule_example() {
        let reached = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&reached);

        let pipeline: Pipeline<Value> = Pipeline::builder()
            .capture(Ok)
            .rule(rule_fn("a", |_, _| -> Result<(), BoxError> {
                Err(Box::new(io::Error::other("x")))
            }))
            .rule(rule_fn("b", move |_, _| {
                probe.fetch_add(1, Ordering::SeqCst);
                Ok("unreached")
            }))
            .build()
            .unwrap();

        let err = pipeline.trust(json!({}), None).await.unwrap_err();
        let failure = err.as_unauthorized().unwrap();

        assert_eq!(err.to_string(), AUTHORIZATION_FAILED);
        assert_eq!(failure.rule(), "a");
        assert_eq!(failure.reason().to_string(), "x");
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_rules_yields_empty_verdict() {
        let pipeline: Pipeline<Value> = Pipeline::builder().capture(Ok).build().unwrap();

        let verdict = assert_ok!(pipeline.trust(json!("anything"), None).await);
        assert!(verdict.is_empty());
    }

    #[tokio::test]
    async fn test_context_reaches_every_rule() {
        let seen = Arc::new(AtomicUsize::new(0));
        let first = Arc::clone(&seen);
        let second = Arc::clone(&seen);

        let pipeline: Pipeline<Value, Tenant> = Pipeline::builder()
            .capture(Ok)
            .context_with(ContextFn::json())
            .rule(rule_fn("one", move |_, ctx: Option<&Tenant>| {
                first.fetch_add(1, Ordering::SeqCst);
                Ok(ctx.map(|t| t.tenant.clone()))
            }))
            .rule(rule("two", move |_, ctx: Option<Arc<Tenant>>| {
                second.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, BoxError>(ctx.map(|t| t.tenant.len())) }
            }))
            .build()
            .unwrap();

        let verdict = pipeline
            .trust(Value::Null, Some(json!({ "tenant": "acme" })))
            .await
            .unwrap();

        assert_eq!(verdict.get("one"), Some(&json!("acme")));
        assert_eq!(verdict.get("two"), Some(&json!(4)));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_context_ignored_without_context_fn() {
        let pipeline: Pipeline<Value, Tenant> = Pipeline::builder()
            .capture(Ok)
            .rule(rule_fn("ctx", |_, ctx: Option<&Tenant>| Ok(ctx.is_some())))
            .build()
            .unwrap();

        let verdict = pipeline
            .trust(Value::Null, Some(json!({ "tenant": "acme" })))
            .await
            .unwrap();

        assert_eq!(verdict.get("ctx"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_capture_failure_is_unattributed() {
        let pipeline = role_pipeline();

        let err = assert_err!(pipeline.trust(json!({ "wrong": 1 }), None).await);

        assert!(err.is_input_error());
        assert!(err.as_unauthorized().is_none());
        assert_ne!(err.to_string(), AUTHORIZATION_FAILED);
    }

    #[tokio::test]
    async fn test_context_failure_is_unattributed() {
        let pipeline: Pipeline<Value, Tenant> = Pipeline::builder()
            .capture(Ok)
            .context_with(ContextFn::json())
            .build()
            .unwrap();

        let err = pipeline.trust(Value::Null, None).await.unwrap_err();
        assert!(matches!(err, TrustError::Context(_)));
    }

    #[tokio::test]
    async fn test_failure_does_not_leak_into_next_invocation() {
        let pipeline: Pipeline<Value> = Pipeline::builder()
            .capture(Ok)
            .rule(rule_fn("gate", |input: &Value, _| {
                if input["deny"] == json!(true) {
                    return Err("denied".into());
                }
                Ok(Some("open"))
            }))
            .rule(rule_fn("after", |_, _| Ok(1)))
            .build()
            .unwrap();

        let err = pipeline.trust(json!({ "deny": true }), None).await.unwrap_err();
        assert_eq!(err.as_unauthorized().unwrap().rule(), "gate");

        let verdict = pipeline.trust(json!({ "deny": false }), None).await.unwrap();
        assert_eq!(verdict.len(), 2);
        assert_eq!(verdict.get("gate"), Some(&json!("open")));
    }

    #[tokio::test]
    async fn test_concurrent_invocations_are_independent() {
        let pipeline: Pipeline<Value> = Pipeline::builder()
            .capture(Ok)
            .rule(rule("echo", |input: Arc<Value>, _| async move {
                tokio::task::yield_now().await;
                Ok::<_, BoxError>((*input).clone())
            }))
            .build()
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move { pipeline.trust(json!(i), None).await })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let verdict = handle.await.unwrap().unwrap();
            assert_eq!(verdict.get("echo"), Some(&json!(i)));
        }
    }

    #[test]
    fn test_builder_requires_capture() {
        let err = PipelineBuilder::<Value>::new().build().unwrap_err();
        assert_eq!(err, ConfigError::MissingCapture);
    }

    #[test]
    fn test_duplicate_rules_fail_construction() {
        let err = Pipeline::<Value>::builder()
            .capture(Ok)
            .rule(rule_fn("dup", |_, _| Ok(())))
            .rule(rule_fn("dup", |_, _| Ok(())))
            .build()
            .unwrap_err();

        assert_eq!(err, ConfigError::DuplicateRule("dup".to_string()));
    }

    #[test]
    fn test_rules_introspection() {
        let pipeline = role_pipeline();

        let names: Vec<&str> = pipeline.rules().names().collect();
        assert_eq!(names, vec!["checkId", "getRole"]);
        assert!(!pipeline.has_context());
        assert_ne!(names[0], UNKNOWN_RULE);
    }
}
