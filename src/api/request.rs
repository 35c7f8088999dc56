use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for an invocation.
///
/// `input` is passed to the pipeline's capture function untouched; `context`
/// to its context function (`None` when absent or null).
#[derive(Debug, Serialize, Deserialize)]
pub struct TrustRequest {
    /// Raw input to normalize
    pub input: Value,

    /// Raw side-channel context (optional)
    #[serde(default)]
    pub context: Option<Value>,
}
