use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::resource::{Condition, ResourceDescriptor, ResourceKey};

fn default_true() -> bool {
    true
}

/// One resource of a plan, in the order it must be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedResource {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    /// Status condition to wait for; `Ready` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_condition: Option<String>,
    #[serde(default = "default_true")]
    pub await_ready: bool,
    #[serde(default)]
    pub spec: Value,
}

impl PlannedResource {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKey`] if identity fields are empty.
    pub fn key(&self) -> Result<ResourceKey> {
        ResourceKey::new(
            self.api_version.as_str(),
            self.kind.as_str(),
            self.namespace.as_str(),
            self.name.as_str(),
        )
    }

    #[must_use]
    pub fn condition(&self) -> Condition {
        self.ready_condition
            .as_deref()
            .map_or_else(Condition::ready, Condition::named)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKey`] if identity fields are empty.
    pub fn descriptor(&self) -> Result<ResourceDescriptor> {
        Ok(ResourceDescriptor::new(self.key()?, self.spec.clone()))
    }
}

/// Ordered list of resources to provision, read from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "resource", default)]
    pub resources: Vec<PlannedResource>,
}

impl ResourcePlan {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let plan: Self = toml::from_str(&content).map_err(|source| CoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        plan.validate()?;
        Ok(plan)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPlan`] if the plan is empty or lists a
    /// resource twice, or [`CoreError::InvalidKey`] for incomplete identities.
    pub fn validate(&self) -> Result<()> {
        if self.resources.is_empty() {
            return Err(CoreError::InvalidPlan("no resources".to_string()));
        }
        let mut seen = HashSet::new();
        for resource in &self.resources {
            let key = resource.key()?;
            if !seen.insert(key.clone()) {
                return Err(CoreError::InvalidPlan(format!("duplicate resource {key}")));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("plan")
    }
}
