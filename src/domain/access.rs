use serde::{Deserialize, Serialize};

/// Parameters of the stock access pipeline, captured from raw input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    /// Identity of the caller
    pub user_id: String,

    /// Requested action (e.g. "read", "write")
    pub action: String,

    /// Target resource
    #[serde(default)]
    pub resource: String,
}

impl AccessRequest {
    pub fn new(
        user_id: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        AccessRequest {
            user_id: user_id.into(),
            action: action.into(),
            resource: resource.into(),
        }
    }
}

/// Side-channel context of the stock access pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Tenant the request is made on behalf of
    #[serde(default)]
    pub tenant: Option<String>,

    /// Correlation id supplied by the host application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Caller {
    pub fn for_tenant(tenant: impl Into<String>) -> Self {
        Caller {
            tenant: Some(tenant.into()),
            request_id: None,
        }
    }
}

/// What the access pipeline allowed, returned by its last rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub role: String,
    pub action: String,
    pub resource: String,
}
