pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod rules;

pub use config::Config;
pub use domain::Verdict;
pub use error::{
    BoxError, ConfigError, RulePanic, TrustError, Unauthorized, AUTHORIZATION_FAILED, UNKNOWN_RULE,
};
pub use pipeline::{CaptureFn, ContextFn, Pipeline, PipelineBuilder, TrustConfig};
pub use rules::{rule, rule_fn, Rule, RuleInfo, RuleOutput, RuleSet};
