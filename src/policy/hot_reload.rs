use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};

use super::loader::{ActivePolicy, PolicyError, PolicyLoader};

/// Watch the policy file and publish a freshly built pipeline when its
/// version changes.
///
/// Pipelines are immutable, so a reload swaps the whole instance. In-flight
/// invocations keep the pipeline they started with.
pub struct PolicyWatcher {
    loader: PolicyLoader,
    check_interval: Duration,
    last_version: Option<String>,
}

impl PolicyWatcher {
    /// Create a new policy watcher.
    pub fn new(loader: PolicyLoader, check_interval: Duration) -> Self {
        PolicyWatcher {
            loader,
            check_interval,
            last_version: None,
        }
    }

    /// Start watching for policy changes.
    ///
    /// Falls back to an empty policy if the initial load fails.
    pub fn start(mut self) -> (watch::Receiver<Arc<ActivePolicy>>, tokio::task::JoinHandle<()>) {
        let initial = match self.loader.load() {
            Ok(active) => {
                self.last_version = Some(active.version().to_string());
                info!(
                    version = active.version(),
                    rules = active.pipeline.rules().len(),
                    "Loaded initial policy"
                );
                Arc::new(active)
            }
            Err(e) => {
                error!(path = self.loader.policy_path(), error = %e, "Failed to load initial policy");
                Arc::new(ActivePolicy::empty())
            }
        };

        let (tx, rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            let mut interval = interval(self.check_interval);

            loop {
                interval.tick().await;

                match self.check_for_updates(&tx) {
                    Ok(true) => info!("Policy reloaded successfully"),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "Error checking for policy updates"),
                }
            }
        });

        (rx, handle)
    }

    /// Check for policy updates and broadcast if changed.
    fn check_for_updates(
        &mut self,
        tx: &watch::Sender<Arc<ActivePolicy>>,
    ) -> Result<bool, PolicyError> {
        let policy = self.loader.load_policy()?;

        if self.last_version.as_ref() == Some(&policy.version) {
            return Ok(false);
        }

        let active = ActivePolicy::new(policy)?;

        info!(
            previous = ?self.last_version,
            version = active.version(),
            "Policy version changed"
        );

        self.last_version = Some(active.version().to_string());
        let _ = tx.send(Arc::new(active));

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_policy_file() -> NamedTempFile {
        let mut policy_file = NamedTempFile::new().unwrap();
        writeln!(
            policy_file,
            r#"
policy_version: "v1"
roles:
  guest: ["read"]
"#
        )
        .unwrap();
        policy_file
    }

    #[tokio::test]
    async fn test_policy_watcher_initial_load() {
        let policy_file = create_policy_file();

        let loader = PolicyLoader::new(policy_file.path().to_string_lossy());
        let watcher = PolicyWatcher::new(loader, Duration::from_secs(60));
        let (rx, handle) = watcher.start();

        assert_eq!(rx.borrow().version(), "v1");

        handle.abort();
    }

    #[tokio::test]
    async fn test_policy_watcher_falls_back_to_empty() {
        let loader = PolicyLoader::new("/nonexistent/policy.yaml");
        let watcher = PolicyWatcher::new(loader, Duration::from_secs(60));
        let (rx, handle) = watcher.start();

        assert_eq!(rx.borrow().version(), "0.0.0");

        handle.abort();
    }

    #[tokio::test]
    async fn test_policy_watcher_detects_changes() {
        let policy_file = create_policy_file();
        let policy_path = policy_file.path().to_path_buf();

        let loader = PolicyLoader::new(policy_file.path().to_string_lossy());
        let watcher = PolicyWatcher::new(loader, Duration::from_millis(50));
        let (mut rx, handle) = watcher.start();

        let before = rx.borrow().pipeline.clone();

        tokio::time::sleep(Duration::from_millis(10)).await;
        std::fs::write(
            &policy_path,
            r#"
policy_version: "v2"
roles:
  guest: ["read", "write"]
"#,
        )
        .unwrap();

        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("Timeout waiting for policy change")
            .unwrap();

        let after = rx.borrow().pipeline.clone();
        assert_eq!(rx.borrow().version(), "v2");

        let write = json!({ "userId": "bob", "action": "write" });
        assert!(before.trust(write.clone(), None).await.is_err());
        assert!(after.trust(write, None).await.is_ok());

        handle.abort();
    }
}
