use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Action wildcard granting every action to a role.
pub const ANY_ACTION: &str = "*";

fn default_role() -> String {
    "guest".to_string()
}

/// Access policy consumed by the stock rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Policy version identifier
    #[serde(rename = "policy_version")]
    pub version: String,

    /// Role name to permitted actions
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<String>>,

    /// User id to role name
    #[serde(default)]
    pub users: HashMap<String, String>,

    /// Role for users not listed in `users`
    #[serde(default = "default_role")]
    pub default_role: String,

    /// Users denied outright
    #[serde(default)]
    pub blocked_users: HashSet<String>,

    /// Tenants allowed to make requests; empty allows any tenant
    #[serde(default)]
    pub tenants: HashSet<String>,
}

impl AccessPolicy {
    /// Create an empty policy that only knows the default role.
    pub fn empty() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(default_role(), Vec::new());

        AccessPolicy {
            version: "0.0.0".to_string(),
            roles,
            users: HashMap::new(),
            default_role: default_role(),
            blocked_users: HashSet::new(),
            tenants: HashSet::new(),
        }
    }

    /// Role assigned to a user, falling back to the default role.
    pub fn role_for(&self, user_id: &str) -> &str {
        self.users
            .get(user_id)
            .map(String::as_str)
            .unwrap_or(&self.default_role)
    }

    /// Whether `role` is permitted to perform `action`.
    pub fn allows(&self, role: &str, action: &str) -> bool {
        self.roles
            .get(role)
            .map(|actions| actions.iter().any(|a| a == ANY_ACTION || a == action))
            .unwrap_or(false)
    }

    pub fn is_blocked(&self, user_id: &str) -> bool {
        self.blocked_users.contains(user_id)
    }

    /// Whether requests on behalf of `tenant` are accepted.
    pub fn tenant_allowed(&self, tenant: &str) -> bool {
        self.tenants.is_empty() || self.tenants.contains(tenant)
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        AccessPolicy::empty()
    }
}
