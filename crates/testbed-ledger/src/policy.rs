use serde::{Deserialize, Serialize};

const SKIP_CLEANUP_VAR: &str = "TESTBED_SKIP_CLEANUP";
const SKIP_SAVE_STATE_VAR: &str = "TESTBED_SKIP_SAVE_STATE";

/// Read-only toggles that change how failures and teardown are handled.
///
/// Injected into scopes and sessions explicitly; nothing in this crate reads
/// process-wide state on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentPolicy {
    /// Keep persistent resources for post-mortem inspection.
    pub skip_cleanup: bool,
    /// Do not invoke failure handlers.
    pub skip_save_state: bool,
}

impl EnvironmentPolicy {
    #[must_use]
    pub fn with_skip_cleanup(mut self, skip: bool) -> Self {
        self.skip_cleanup = skip;
        self
    }

    #[must_use]
    pub fn with_skip_save_state(mut self, skip: bool) -> Self {
        self.skip_save_state = skip;
        self
    }

    /// Read `TESTBED_SKIP_CLEANUP` and `TESTBED_SKIP_SAVE_STATE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a policy from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            skip_cleanup: lookup(SKIP_CLEANUP_VAR).is_some_and(|v| is_truthy(&v)),
            skip_save_state: lookup(SKIP_SAVE_STATE_VAR).is_some_and(|v| is_truthy(&v)),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_to_full_cleanup_and_state_saving() {
        let policy = EnvironmentPolicy::from_lookup(lookup(&[]));
        assert_eq!(policy, EnvironmentPolicy::default());
        assert!(!policy.skip_cleanup);
        assert!(!policy.skip_save_state);
    }

    #[test]
    fn truthy_values_enable_toggles() {
        for value in ["1", "true", "TRUE", " yes ", "on"] {
            let policy = EnvironmentPolicy::from_lookup(lookup(&[
                (SKIP_CLEANUP_VAR, value),
                (SKIP_SAVE_STATE_VAR, value),
            ]));
            assert!(policy.skip_cleanup, "value {value:?}");
            assert!(policy.skip_save_state, "value {value:?}");
        }
    }

    #[test]
    fn other_values_leave_toggles_off() {
        let policy = EnvironmentPolicy::from_lookup(lookup(&[
            (SKIP_CLEANUP_VAR, "0"),
            (SKIP_SAVE_STATE_VAR, "nope"),
        ]));
        assert!(!policy.skip_cleanup);
        assert!(!policy.skip_save_state);
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let policy: EnvironmentPolicy =
            toml::from_str("skip_cleanup = true").expect("valid policy table");
        assert!(policy.skip_cleanup);
        assert!(!policy.skip_save_state);
    }
}
