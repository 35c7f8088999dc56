use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{AccessPolicy, AccessRequest, Caller, Grant};
use crate::error::{BoxError, ConfigError};
use crate::pipeline::{CaptureFn, ContextFn, Pipeline};
use crate::rules::{rule_fn, Rule};

/// Pipeline evaluating access requests against an [`AccessPolicy`].
pub type AccessPipeline = Pipeline<AccessRequest, Caller>;

/// Role that `checkId` reports as administrator.
pub const ADMIN_ROLE: &str = "admin";

/// Reasons the stock rules deny a request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessDenied {
    #[error("user id is empty")]
    MissingUser,

    #[error("user {0} is blocked")]
    BlockedUser(String),

    #[error("a tenant is required")]
    MissingTenant,

    #[error("tenant {0} is not allowed")]
    TenantNotAllowed(String),

    #[error("role {role} may not {action}")]
    ActionNotPermitted { role: String, action: String },
}

/// Build the stock access pipeline for `policy`.
///
/// Input is deserialized into [`AccessRequest`]; context, when present and
/// not null, into [`Caller`].
pub fn access_pipeline(policy: Arc<AccessPolicy>) -> Result<AccessPipeline, ConfigError> {
    Pipeline::builder()
        .capture_with(CaptureFn::json())
        .context_with(ContextFn::new(caller_context))
        .rules(access_rules(policy))
        .build()
}

fn caller_context(raw: Option<Value>) -> Result<Caller, BoxError> {
    match raw {
        None | Some(Value::Null) => Ok(Caller::default()),
        Some(value) => Ok(serde_json::from_value(value)?),
    }
}

/// The stock rules, in evaluation order.
pub fn access_rules(policy: Arc<AccessPolicy>) -> Vec<Rule<AccessRequest, Caller>> {
    vec![
        check_id(Arc::clone(&policy)),
        get_role(Arc::clone(&policy)),
        check_tenant(Arc::clone(&policy)),
        check_action(Arc::clone(&policy)),
        grant(policy),
    ]
}

/// Rejects empty or blocked users; reports whether the user is an administrator.
pub fn check_id(policy: Arc<AccessPolicy>) -> Rule<AccessRequest, Caller> {
    rule_fn("checkId", move |req: &AccessRequest, _| {
        if req.user_id.is_empty() {
            return Err(AccessDenied::MissingUser.into());
        }
        if policy.is_blocked(&req.user_id) {
            return Err(AccessDenied::BlockedUser(req.user_id.clone()).into());
        }
        Ok(policy.role_for(&req.user_id) == ADMIN_ROLE)
    })
}

/// Resolves the user's role.
pub fn get_role(policy: Arc<AccessPolicy>) -> Rule<AccessRequest, Caller> {
    rule_fn("getRole", move |req: &AccessRequest, _| {
        Ok(policy.role_for(&req.user_id).to_string())
    })
}

/// Enforces the tenant allow-list. Contributes no result.
pub fn check_tenant(policy: Arc<AccessPolicy>) -> Rule<AccessRequest, Caller> {
    rule_fn("checkTenant", move |_, caller: Option<&Caller>| {
        match caller.and_then(|c| c.tenant.as_deref()) {
            Some(tenant) if !policy.tenant_allowed(tenant) => {
                Err(AccessDenied::TenantNotAllowed(tenant.to_string()).into())
            }
            None if !policy.tenants.is_empty() => Err(AccessDenied::MissingTenant.into()),
            _ => Ok(()),
        }
    })
}

/// Checks the requested action against the user's role. Contributes no result.
pub fn check_action(policy: Arc<AccessPolicy>) -> Rule<AccessRequest, Caller> {
    rule_fn("checkAction", move |req: &AccessRequest, _| {
        let role = policy.role_for(&req.user_id);
        if policy.allows(role, &req.action) {
            Ok(())
        } else {
            Err(AccessDenied::ActionNotPermitted {
                role: role.to_string(),
                action: req.action.clone(),
            }
            .into())
        }
    })
}

/// Summarizes what was allowed.
pub fn grant(policy: Arc<AccessPolicy>) -> Rule<AccessRequest, Caller> {
    rule_fn("grant", move |req: &AccessRequest, _| {
        Ok(Some(Grant {
            role: policy.role_for(&req.user_id).to_string(),
            action: req.action.clone(),
            resource: req.resource.clone(),
        }))
    })
}
