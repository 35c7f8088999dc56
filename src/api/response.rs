use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::Verdict;
use crate::error::{RulePanic, TrustError};

/// Reason reported to clients when a rule panicked; the panic message is only logged.
pub const PANIC_REASON: &str = "rule failed unexpectedly";
use crate::rules::RuleInfo;

/// Response from a successful invocation.
#[derive(Debug, Serialize)]
pub struct TrustResponse {
    pub authorized: bool,

    /// Correlation id for logs
    pub request_id: Uuid,

    /// Policy version the pipeline was built from
    pub policy_version: String,

    /// Per-rule results
    pub results: Verdict,

    pub evaluated_at: DateTime<Utc>,
}

impl TrustResponse {
    pub fn new(request_id: Uuid, policy_version: String, results: Verdict) -> Self {
        TrustResponse {
            authorized: true,
            request_id,
            policy_version,
            results,
            evaluated_at: Utc::now(),
        }
    }
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,

    /// Rule that denied the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    /// Why the rule denied the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
            code: code.into(),
            rule: None,
            reason: None,
            request_id: None,
        }
    }

    pub fn timeout() -> Self {
        ErrorResponse::new("invocation deadline exceeded", "TIMEOUT")
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Map an invocation failure to a status code and body.
    pub fn from_trust_error(err: &TrustError) -> (StatusCode, Self) {
        match err {
            TrustError::Unauthorized(failure) => {
                let reason = match failure.downcast_reason::<RulePanic>() {
                    Some(_) => PANIC_REASON.to_string(),
                    None => failure.reason().to_string(),
                };

                (
                    StatusCode::FORBIDDEN,
                    ErrorResponse {
                        rule: Some(failure.rule().to_string()),
                        reason: Some(reason),
                        ..ErrorResponse::new(err.to_string(), "UNAUTHORIZED")
                    },
                )
            }
            TrustError::Capture(_) | TrustError::Context(_) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(err.to_string(), "INVALID_INPUT"),
            ),
        }
    }
}

/// Rule introspection response.
#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub policy_version: String,
    pub rules: Vec<RuleInfo>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub policy_version: String,
    pub uptime_secs: u64,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub policy_version: String,
    pub rules: usize,
}
