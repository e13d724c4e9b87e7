use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// Identity of an externally managed resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKey`] if any component is empty.
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let key = Self {
            api_version: api_version.into().trim().to_string(),
            kind: kind.into().trim().to_string(),
            namespace: namespace.into().trim().to_string(),
            name: name.into().trim().to_string(),
        };
        key.validate()?;
        Ok(key)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKey`] naming the first empty component.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("api_version", &self.api_version),
            ("kind", &self.kind),
            ("namespace", &self.namespace),
            ("name", &self.name),
        ] {
            if value.is_empty() {
                return Err(CoreError::InvalidKey(format!("missing {field}")));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}: {}/{}",
            self.api_version, self.kind, self.namespace, self.name
        )
    }
}

/// A finished description of a resource to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub key: ResourceKey,
    #[serde(default)]
    pub spec: Value,
}

impl ResourceDescriptor {
    #[must_use]
    pub fn new(key: ResourceKey, spec: Value) -> Self {
        Self { key, spec }
    }

    /// Serialize a typed spec into a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialize`] if the spec cannot be represented as JSON.
    pub fn from_spec<S: Serialize>(key: ResourceKey, spec: &S) -> Result<Self> {
        let spec = serde_json::to_value(spec).map_err(|source| CoreError::Serialize {
            key: key.to_string(),
            source,
        })?;
        Ok(Self { key, spec })
    }
}

/// The state a readiness check waits for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    /// A named status condition (for example `Ready`) reports `True`.
    Named(String),
    /// The resource no longer exists.
    Gone,
}

impl Condition {
    #[must_use]
    pub fn ready() -> Self {
        Self::Named("Ready".to_string())
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "condition '{name}'"),
            Self::Gone => write!(f, "deletion"),
        }
    }
}

/// Outcome of one readiness poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    /// The resource will never reach the condition.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// Deletion propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Deletion of the owner waits for its dependents.
    #[default]
    Foreground,
    Background,
}

/// Observed state of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub key: ResourceKey,
    #[serde(default)]
    pub spec: Value,
    #[serde(default)]
    pub conditions: BTreeMap<String, ConditionStatus>,
    /// Free-form status, such as assigned hosts and ports.
    #[serde(default)]
    pub status: Value,
    /// Terminal failure reported by the resource's controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ResourceSnapshot {
    #[must_use]
    pub fn new(key: ResourceKey, spec: Value) -> Self {
        Self {
            key,
            spec,
            conditions: BTreeMap::new(),
            status: Value::Null,
            failure: None,
        }
    }

    #[must_use]
    pub fn condition(&self, name: &str) -> ConditionStatus {
        self.conditions.get(name).copied().unwrap_or_default()
    }

    /// Readiness of `condition` as seen in this snapshot.
    #[must_use]
    pub fn readiness(&self, condition: &Condition) -> Readiness {
        if let Some(reason) = &self.failure {
            return Readiness::Failed(reason.clone());
        }
        match condition {
            Condition::Named(name) if self.condition(name) == ConditionStatus::True => {
                Readiness::Ready
            }
            Condition::Named(_) | Condition::Gone => Readiness::Pending,
        }
    }
}
