use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::AccessPolicy;
use crate::error::ConfigError;

use super::rules::{access_pipeline, AccessPipeline};

/// Errors that can occur during policy loading.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] ConfigError),
}

/// Load an access policy from a YAML file.
pub fn load_policy(path: impl AsRef<Path>) -> Result<AccessPolicy, PolicyError> {
    let content = fs::read_to_string(path)?;
    let policy: AccessPolicy = serde_yaml::from_str(&content)?;

    validate_policy(&policy)?;

    Ok(policy)
}

/// Validate policy configuration.
fn validate_policy(policy: &AccessPolicy) -> Result<(), PolicyError> {
    if policy.version.is_empty() {
        return Err(PolicyError::Validation(
            "Policy version cannot be empty".to_string(),
        ));
    }

    if !policy.roles.contains_key(&policy.default_role) {
        return Err(PolicyError::Validation(format!(
            "Default role is not declared: {}",
            policy.default_role
        )));
    }

    // Every assigned role must exist
    for (user, role) in &policy.users {
        if !policy.roles.contains_key(role) {
            return Err(PolicyError::Validation(format!(
                "Unknown role {} for user {}",
                role, user
            )));
        }
    }

    Ok(())
}

/// A loaded policy together with the pipeline built from it.
#[derive(Debug, Clone)]
pub struct ActivePolicy {
    pub policy: Arc<AccessPolicy>,
    pub pipeline: AccessPipeline,
    fallback: bool,
}

impl ActivePolicy {
    /// Build the stock pipeline for `policy`.
    pub fn new(policy: AccessPolicy) -> Result<Self, ConfigError> {
        let policy = Arc::new(policy);
        let pipeline = access_pipeline(Arc::clone(&policy))?;

        Ok(ActivePolicy {
            policy,
            pipeline,
            fallback: false,
        })
    }

    /// Policy with no users and a default role that may do nothing.
    ///
    /// Installed when no policy file could be loaded.
    pub fn empty() -> Self {
        let policy = Arc::new(AccessPolicy::empty());
        let pipeline = match access_pipeline(Arc::clone(&policy)) {
            Ok(pipeline) => pipeline,
            Err(e) => unreachable!("stock rule names are unique: {e}"),
        };

        ActivePolicy {
            policy,
            pipeline,
            fallback: true,
        }
    }

    pub fn version(&self) -> &str {
        &self.policy.version
    }

    /// True for the stand-in built by [`empty`](Self::empty), false for any
    /// policy that was actually loaded, even one that grants nothing.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

/// Policy loader that reads the policy file and builds its pipeline.
pub struct PolicyLoader {
    policy_path: String,
}

impl PolicyLoader {
    /// Create a new policy loader.
    pub fn new(policy_path: impl Into<String>) -> Self {
        PolicyLoader {
            policy_path: policy_path.into(),
        }
    }

    /// Load the policy and build its pipeline.
    pub fn load(&self) -> Result<ActivePolicy, PolicyError> {
        let policy = load_policy(&self.policy_path)?;
        Ok(ActivePolicy::new(policy)?)
    }

    /// Load only the policy (without rebuilding the pipeline).
    pub fn load_policy(&self) -> Result<AccessPolicy, PolicyError> {
        load_policy(&self.policy_path)
    }

    /// Get the policy file path.
    pub fn policy_path(&self) -> &str {
        &self.policy_path
    }
}
