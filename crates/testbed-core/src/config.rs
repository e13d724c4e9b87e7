use std::path::Path;

use serde::{Deserialize, Serialize};
use testbed_ledger::EnvironmentPolicy;

use crate::error::{CoreError, Result};
use crate::infra::Platform;
use crate::poll::PollPolicy;

/// Session settings read from a TOML file.
///
/// ```toml
/// platform = "kubernetes"
/// infra_namespace = "enmasse-infra"
///
/// [policy]
/// skip_cleanup = false
///
/// [poll]
/// timeout_secs = 300
/// interval_millis = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub platform: Platform,
    pub infra_namespace: String,
    pub tenant_namespace: String,
    pub policy: EnvironmentPolicy,
    pub poll: PollPolicy,
    /// TLS versions used by clients unless overridden per client.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub default_tls_versions: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            infra_namespace: "enmasse-infra".to_string(),
            tenant_namespace: "iot-systemtests".to_string(),
            policy: EnvironmentPolicy::default(),
            poll: PollPolicy::default(),
            default_tls_versions: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| CoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides on top of the file's policy.
    ///
    /// A toggle set in either place stays set.
    #[must_use]
    pub fn with_env_policy(mut self, env: EnvironmentPolicy) -> Self {
        self.policy.skip_cleanup |= env.skip_cleanup;
        self.policy.skip_save_state |= env.skip_save_state;
        self
    }
}
