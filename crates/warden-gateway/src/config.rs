// config.rs — Gateway configuration.
//
// Determines where the gateway finds its policy document and writes its
// audit log, and how long approval tickets stay open. `for_root()`
// generates the standard `.warden/` layout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`DecisionGateway`](crate::DecisionGateway).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// The policy document to load at startup (JSON or YAML).
    pub policy_path: PathBuf,

    /// Path to the append-only audit log.
    pub audit_log: PathBuf,

    /// How long an approval ticket stays pending before it expires.
    #[serde(default = "default_approval_ttl_secs")]
    pub approval_ttl_secs: u64,
}

fn default_approval_ttl_secs() -> u64 {
    900
}

impl GatewayConfig {
    /// Standard layout under `<root>/.warden/`.
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        let warden_dir = root.as_ref().join(".warden");
        Self {
            policy_path: warden_dir.join("policy.json"),
            audit_log: warden_dir.join("audit.jsonl"),
            approval_ttl_secs: default_approval_ttl_secs(),
        }
    }

    /// The ticket TTL as a `Duration`.
    pub fn approval_ttl(&self) -> Duration {
        Duration::from_secs(self.approval_ttl_secs)
    }
}
