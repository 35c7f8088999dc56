use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Authorization server configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "trustr")]
#[command(about = "Declarative authorization pipeline server")]
pub struct Config {
    /// HTTP server listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "TRUSTR_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Path to access policy YAML file
    #[arg(long, default_value = "policy.yaml", env = "TRUSTR_POLICY_PATH")]
    pub policy_path: PathBuf,

    /// Policy reload check interval in seconds
    #[arg(
        long,
        default_value = "30",
        env = "TRUSTR_POLICY_RELOAD_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub policy_reload_secs: u64,

    /// Deadline for a single invocation in milliseconds
    #[arg(long, default_value = "1000", env = "TRUSTR_INVOCATION_TIMEOUT_MS")]
    pub invocation_timeout_ms: u64,

    /// Latency above which an invocation is logged as slow
    #[arg(long, default_value = "100", env = "TRUSTR_LATENCY_BUDGET_MS")]
    pub latency_budget_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, default_value = "false", env = "TRUSTR_LOG_JSON")]
    pub log_json: bool,

    /// Enable graceful shutdown
    #[arg(long, default_value = "true", env = "TRUSTR_GRACEFUL_SHUTDOWN")]
    pub graceful_shutdown: bool,

    /// Graceful shutdown timeout in seconds
    #[arg(long, default_value = "30", env = "TRUSTR_SHUTDOWN_TIMEOUT_SECS")]
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Get policy reload interval as Duration.
    pub fn policy_reload_interval(&self) -> Duration {
        Duration::from_secs(self.policy_reload_secs)
    }

    /// Get invocation deadline as Duration.
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }

    /// Get shutdown timeout as Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "0.0.0.0:8080".to_string(),
            policy_path: PathBuf::from("policy.yaml"),
            policy_reload_secs: 30,
            invocation_timeout_ms: 1000,
            latency_budget_ms: 100,
            log_level: "info".to_string(),
            log_json: false,
            graceful_shutdown: true,
            shutdown_timeout_secs: 30,
        }
    }
}
