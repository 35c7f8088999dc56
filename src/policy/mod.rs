pub mod hot_reload;
pub mod loader;
pub mod rules;

pub use hot_reload::PolicyWatcher;
pub use loader::{load_policy, ActivePolicy, PolicyError, PolicyLoader};
pub use rules::{access_pipeline, access_rules, AccessDenied, AccessPipeline};
