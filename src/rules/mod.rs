pub mod rule;

pub use rule::{rule, rule_fn, Evaluator, Rule, RuleFuture, RuleOutput};

use serde::Serialize;
use std::collections::HashSet;

use crate::error::ConfigError;

/// Ordered collection of rules, fixed at pipeline construction.
///
/// Rules are evaluated in declaration order. Names are validated to be
/// non-empty and unique when the set is built.
pub struct RuleSet<P, C = ()> {
    rules: Vec<Rule<P, C>>,
}

/// Read-only description of a configured rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleInfo {
    /// Zero-based evaluation position
    pub position: usize,
    pub name: String,
}

impl<P, C> RuleSet<P, C> {
    /// Build a rule set, rejecting empty and duplicate names.
    pub fn new(rules: Vec<Rule<P, C>>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for (index, rule) in rules.iter().enumerate() {
            if rule.name().is_empty() {
                return Err(ConfigError::EmptyRuleName { index });
            }
            if !seen.insert(rule.name()) {
                return Err(ConfigError::DuplicateRule(rule.name().to_string()));
            }
        }

        Ok(RuleSet { rules })
    }

    /// Create an empty rule set.
    pub fn empty() -> Self {
        RuleSet { rules: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in evaluation order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule<P, C>> {
        self.rules.iter()
    }

    /// Rule names in evaluation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(Rule::name)
    }

    /// Look up a rule by name.
    pub fn get(&self, name: &str) -> Option<&Rule<P, C>> {
        self.rules.iter().find(|r| r.name() == name)
    }

    /// Describe the configured rules, e.g. for documentation endpoints.
    pub fn describe(&self) -> Vec<RuleInfo> {
        self.rules
            .iter()
            .enumerate()
            .map(|(position, rule)| RuleInfo {
                position,
                name: rule.name().to_string(),
            })
            .collect()
    }
}

impl<P, C> Clone for RuleSet<P, C> {
    fn clone(&self) -> Self {
        RuleSet {
            rules: self.rules.clone(),
        }
    }
}

impl<P, C> std::fmt::Debug for RuleSet<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl<'a, P, C> IntoIterator for &'a RuleSet<P, C> {
    type Item = &'a Rule<P, C>;
    type IntoIter = std::slice::Iter<'a, Rule<P, C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
