use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::trace;

use crate::domain::Verdict;
use crate::error::{BoxError, RulePanic, Unauthorized, UNKNOWN_RULE};
use crate::rules::RuleSet;

/// Evaluate `rules` in declaration order against shared parameters and context.
///
/// Each rule runs to completion before the next one starts. Rules that
/// return the empty sentinel are left out of the verdict. The first failing
/// rule stops the run and the failure is attributed to it; no partial verdict
/// is returned.
pub async fn run<P, C>(
    params: Arc<P>,
    context: Option<Arc<C>>,
    rules: &RuleSet<P, C>,
) -> Result<Verdict, Unauthorized> {
    let mut verdict = Verdict::new();
    let mut current: Option<&str> = None;

    for rule in rules {
        // Must be set before the evaluator is called.
        current = Some(rule.name());

        let params = Arc::clone(&params);
        let context = context.clone();
        let outcome = AssertUnwindSafe(async move { rule.evaluate(params, context).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(Some(value))) => {
                trace!(rule = rule.name(), "rule produced a value");
                verdict.insert(rule.name(), value);
            }
            Ok(Ok(None)) => {
                trace!(rule = rule.name(), "rule produced no value");
            }
            Ok(Err(reason)) => return Err(attribute(current, reason)),
            Err(payload) => return Err(attribute(current, panic_reason(payload))),
        }
    }

    Ok(verdict)
}

/// Wrap a failure with the name of the rule that was executing.
fn attribute(current: Option<&str>, reason: BoxError) -> Unauthorized {
    let rule = current.unwrap_or(UNKNOWN_RULE);
    trace!(rule, error = %reason, "rule failed");
    Unauthorized::new(rule, reason)
}

/// Coerce a panic payload into an error carrying its message.
fn panic_reason(payload: Box<dyn Any + Send>) -> BoxError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };

    Box::new(RulePanic(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AUTHORIZATION_FAILED;
    use crate::rules::{rule, rule_fn, Rule};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::io;
    use std::time::Duration;

    type Probe = Arc<Mutex<Vec<&'static str>>>;

    fn recording(name: &'static str, probe: &Probe) -> Rule<()> {
        let probe = Arc::clone(probe);
        rule_fn(name, move |_, _| {
            probe.lock().push(name);
            Ok(name)
        })
    }

    #[tokio::test]
    async fn test_empty_ruleset_succeeds() {
        let verdict = run(Arc::new(()), None::<Arc<()>>, &RuleSet::empty())
            .await
            .unwrap();
        assert!(verdict.is_empty());
    }

    #[tokio::test]
    async fn test_rules_run_in_declaration_order() {
        let probe = Probe::default();
        let rules = RuleSet::new(vec![
            recording("c", &probe),
            recording("a", &probe),
            recording("b", &probe),
        ])
        .unwrap();

        let verdict = run(Arc::new(()), None, &rules).await.unwrap();

        assert_eq!(*probe.lock(), vec!["c", "a", "b"]);
        assert_eq!(verdict.len(), 3);
        assert_eq!(verdict.get("a"), Some(&json!("a")));
    }

    #[tokio::test]
    async fn test_empty_outputs_are_skipped() {
        let rules: RuleSet<()> = RuleSet::new(vec![
            rule_fn("void", |_, _| Ok(())),
            rule_fn("none", |_, _| Ok(None::<String>)),
            rule_fn("null", |_, _| Ok(serde_json::Value::Null)),
            rule_fn("flag", |_, _| Ok(false)),
        ])
        .unwrap();

        let verdict = run(Arc::new(()), None, &rules).await.unwrap();

        assert!(!verdict.contains("void"));
        assert!(!verdict.contains("none"));
        assert_eq!(verdict.get("null"), Some(&serde_json::Value::Null));
        assert_eq!(verdict.get("flag"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_failure_stops_later_rules() {
        let probe = Probe::default();
        let rules = RuleSet::new(vec![
            recording("first", &probe),
            rule_fn("a", |_, _| -> Result<(), BoxError> {
                Err(Box::new(io::Error::other("x")))
            }),
            recording("b", &probe),
        ])
        .unwrap();

        let err = run(Arc::new(()), None, &rules).await.unwrap_err();

        assert_eq!(err.rule(), "a");
        assert_eq!(err.to_string(), AUTHORIZATION_FAILED);
        assert_eq!(err.downcast_reason::<io::Error>().unwrap().to_string(), "x");
        assert_eq!(*probe.lock(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_async_rules_are_sequential() {
        let probe = Probe::default();
        let slow_probe = Arc::clone(&probe);
        let slow: Rule<()> = rule("slow", move |_, _| {
            let probe = Arc::clone(&slow_probe);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                probe.lock().push("slow");
                Ok::<_, BoxError>(())
            }
        });
        let rules = RuleSet::new(vec![slow, recording("fast", &probe)]).unwrap();

        run(Arc::new(()), None, &rules).await.unwrap();

        assert_eq!(*probe.lock(), vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_async_rejection_is_attributed() {
        let rules: RuleSet<()> = RuleSet::new(vec![rule("remote", |_, _| async {
            tokio::task::yield_now().await;
            Err::<(), BoxError>("upstream unavailable".into())
        })])
        .unwrap();

        let err = run(Arc::new(()), None, &rules).await.unwrap_err();

        assert_eq!(err.rule(), "remote");
        assert_eq!(err.reason().to_string(), "upstream unavailable");
    }

    #[tokio::test]
    async fn test_panicking_rule_is_attributed() {
        let rules: RuleSet<()> = RuleSet::new(vec![
            rule_fn("ok", |_, _| Ok(true)),
            rule_fn("boom", |_, _| -> Result<(), BoxError> { panic!("kaboom") }),
        ])
        .unwrap();

        let err = run(Arc::new(()), None, &rules).await.unwrap_err();

        assert_eq!(err.rule(), "boom");
        let panic = err.downcast_reason::<RulePanic>().unwrap();
        assert_eq!(panic.0, "kaboom");
    }

    #[tokio::test]
    async fn test_rules_share_params_and_context() {
        let rules: RuleSet<String, String> = RuleSet::new(vec![
            rule_fn("param", |p: &String, _| Ok(p.clone())),
            rule_fn("ctx", |_, c: Option<&String>| Ok(c.cloned())),
        ])
        .unwrap();

        let verdict = run(
            Arc::new("U1".to_string()),
            Some(Arc::new("acme".to_string())),
            &rules,
        )
        .await
        .unwrap();

        assert_eq!(verdict.get("param"), Some(&json!("U1")));
        assert_eq!(verdict.get("ctx"), Some(&json!("acme")));
    }

    #[test]
    fn test_attribute_without_current_rule() {
        let err = attribute(None, "lost".into());
        assert_eq!(err.rule(), UNKNOWN_RULE);
    }
}
