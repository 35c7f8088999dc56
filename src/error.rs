use std::error::Error as StdError;

use thiserror::Error;

/// Type-erased error produced by capture, context and rule functions.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Top-level message carried by every [`Unauthorized`] failure.
pub const AUTHORIZATION_FAILED: &str = "authorization failed";

/// Rule label used when a failure cannot be attributed to a started rule.
pub const UNKNOWN_RULE: &str = "<unknown>";

/// A rule evaluator failed, aborting the invocation.
///
/// The display message is always [`AUTHORIZATION_FAILED`]; the failing rule
/// and the original error are exposed through [`rule`](Self::rule) and
/// [`reason`](Self::reason). The reason is also the error's `source()`.
#[derive(Debug, Error)]
#[error("{}", AUTHORIZATION_FAILED)]
pub struct Unauthorized {
    rule: String,
    #[source]
    reason: BoxError,
}

impl Unauthorized {
    /// Attribute `reason` to the rule named `rule`.
    pub fn new(rule: impl Into<String>, reason: impl Into<BoxError>) -> Self {
        Unauthorized {
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    /// Failure with no rule to attribute it to.
    pub fn unattributed(reason: impl Into<BoxError>) -> Self {
        Unauthorized::new(UNKNOWN_RULE, reason)
    }

    /// Name of the rule that was executing when the failure occurred.
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// The original error raised by the rule.
    pub fn reason(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.reason.as_ref()
    }

    /// Downcast the original error to its concrete type.
    pub fn downcast_reason<E: StdError + 'static>(&self) -> Option<&E> {
        self.reason.downcast_ref::<E>()
    }

    /// Split into the rule name and the original error.
    pub fn into_parts(self) -> (String, BoxError) {
        (self.rule, self.reason)
    }
}

/// A rule evaluator panicked; carries the panic message.
#[derive(Debug, Error)]
#[error("rule panicked: {0}")]
pub struct RulePanic(pub String);

/// Errors returned by [`Pipeline::trust`](crate::Pipeline::trust).
///
/// Capture and context failures happen before any rule runs, so they are
/// forwarded untouched: both display and `source()` are the original error's.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error(transparent)]
    Capture(BoxError),

    #[error(transparent)]
    Context(BoxError),

    #[error(transparent)]
    Unauthorized(#[from] Unauthorized),
}

impl TrustError {
    /// Returns the rule failure, if this error came from a rule.
    pub fn as_unauthorized(&self) -> Option<&Unauthorized> {
        match self {
            TrustError::Unauthorized(failure) => Some(failure),
            _ => None,
        }
    }

    /// Returns true if the input or context could not be normalized.
    pub fn is_input_error(&self) -> bool {
        matches!(self, TrustError::Capture(_) | TrustError::Context(_))
    }
}

/// Errors raised while constructing a pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no capture function configured")]
    MissingCapture,

    #[error("rule at position {index} has an empty name")]
    EmptyRuleName { index: usize },

    #[error("duplicate rule name: {0}")]
    DuplicateRule(String),
}
