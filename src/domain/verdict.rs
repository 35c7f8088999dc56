use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Result of a successful invocation.
///
/// Maps rule name to the value that rule produced. Rules that returned the
/// empty sentinel have no entry at all. Iteration follows rule declaration
/// order, but callers should look results up by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Verdict {
    results: Map<String, Value>,
}

impl Verdict {
    /// Create an empty verdict.
    pub fn new() -> Self {
        Verdict::default()
    }

    /// Record a rule's value, replacing any earlier entry under the same name.
    pub(crate) fn insert(&mut self, rule: &str, value: Value) {
        self.results.insert(rule.to_string(), value);
    }

    /// Value produced by `rule`, if it produced one.
    pub fn get(&self, rule: &str) -> Option<&Value> {
        self.results.get(rule)
    }

    /// Deserialize the value produced by `rule` into `T`.
    ///
    /// Returns `None` when the rule produced nothing or its value does not
    /// have the shape of `T`.
    pub fn get_as<T: DeserializeOwned>(&self, rule: &str) -> Option<T> {
        self.results
            .get(rule)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&self, rule: &str) -> bool {
        self.results.contains_key(rule)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.results.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Consume into the underlying JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.results
    }
}

impl From<Verdict> for Value {
    fn from(verdict: Verdict) -> Self {
        Value::Object(verdict.results)
    }
}
