//! Protocol adapters of the IoT infrastructure.
//!
//! Every adapter kind exposes the same capability surface (enable, disable,
//! check, edit). Dispatch goes through [`ADAPTERS`], a table mapping each
//! kind to the accessors for its slot in [`AdaptersConfig`].

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::infra::InfrastructureSpec;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Amqp,
    Http,
    Mqtt,
    Sigfox,
    #[value(name = "lorawan")]
    LoraWan,
}

/// Per-adapter settings. A missing `enabled` means enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Secret holding the endpoint key and certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amqp: Option<AdapterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<AdapterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt: Option<AdapterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigfox: Option<AdapterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora_wan: Option<AdapterConfig>,
}

/// Accessors for one adapter slot.
pub struct AdapterSlot {
    pub kind: AdapterKind,
    get: fn(&AdaptersConfig) -> Option<&AdapterConfig>,
    slot: fn(&mut AdaptersConfig) -> &mut Option<AdapterConfig>,
}

pub const ADAPTERS: [AdapterSlot; 5] = [
    AdapterSlot {
        kind: AdapterKind::Amqp,
        get: |a| a.amqp.as_ref(),
        slot: |a| &mut a.amqp,
    },
    AdapterSlot {
        kind: AdapterKind::Http,
        get: |a| a.http.as_ref(),
        slot: |a| &mut a.http,
    },
    AdapterSlot {
        kind: AdapterKind::Mqtt,
        get: |a| a.mqtt.as_ref(),
        slot: |a| &mut a.mqtt,
    },
    AdapterSlot {
        kind: AdapterKind::Sigfox,
        get: |a| a.sigfox.as_ref(),
        slot: |a| &mut a.sigfox,
    },
    AdapterSlot {
        kind: AdapterKind::LoraWan,
        get: |a| a.lora_wan.as_ref(),
        slot: |a| &mut a.lora_wan,
    },
];

impl AdapterKind {
    pub const ALL: [AdapterKind; 5] = [
        Self::Amqp,
        Self::Http,
        Self::Mqtt,
        Self::Sigfox,
        Self::LoraWan,
    ];

    fn slot(self) -> &'static AdapterSlot {
        // ADAPTERS is indexed in declaration order of the enum.
        &ADAPTERS[self as usize]
    }

    /// Configuration of this adapter, if the infrastructure sets one.
    #[must_use]
    pub fn config(self, infra: &InfrastructureSpec) -> Option<&AdapterConfig> {
        infra.adapters.as_ref().and_then(|a| (self.slot().get)(a))
    }

    /// Edit this adapter's configuration, creating it when missing.
    pub fn edit<F>(self, infra: &mut InfrastructureSpec, editor: F)
    where
        F: FnOnce(&mut AdapterConfig),
    {
        let adapters = infra.adapters.get_or_insert_with(AdaptersConfig::default);
        let config = (self.slot().slot)(adapters).get_or_insert_with(AdapterConfig::default);
        editor(config);
    }

    pub fn set_enabled(self, infra: &mut InfrastructureSpec, enabled: bool) {
        self.edit(infra, |c| c.enabled = Some(enabled));
    }

    pub fn enable(self, infra: &mut InfrastructureSpec) {
        self.set_enabled(infra, true);
    }

    pub fn disable(self, infra: &mut InfrastructureSpec) {
        self.set_enabled(infra, false);
    }

    /// An adapter is disabled only when `enabled` is explicitly `false`.
    #[must_use]
    pub fn is_enabled(self, infra: &InfrastructureSpec) -> bool {
        self.config(infra)
            .and_then(|c| c.enabled)
            .unwrap_or(true)
    }

    /// Name of the deployment and external endpoint of this adapter.
    #[must_use]
    pub fn resource_name(self) -> String {
        format!("iot-{self}-adapter")
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Amqp => "amqp",
            Self::Http => "http",
            Self::Mqtt => "mqtt",
            Self::Sigfox => "sigfox",
            Self::LoraWan => "lorawan",
        };
        write!(f, "{s}")
    }
}

/// Enable exactly the listed adapters and disable all others.
pub fn only(infra: &mut InfrastructureSpec, enabled: &[AdapterKind]) {
    for kind in AdapterKind::ALL {
        kind.set_enabled(infra, enabled.contains(&kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_enum_order() {
        for (index, kind) in AdapterKind::ALL.iter().enumerate() {
            assert_eq!(ADAPTERS[index].kind, *kind);
        }
    }

    #[test]
    fn missing_config_counts_as_enabled() {
        let infra = InfrastructureSpec::default();
        for kind in AdapterKind::ALL {
            assert!(kind.is_enabled(&infra), "{kind}");
        }
    }

    #[test]
    fn config_without_flag_counts_as_enabled() {
        let mut infra = InfrastructureSpec::default();
        AdapterKind::Mqtt.edit(&mut infra, |c| c.replicas = Some(2));

        assert!(AdapterKind::Mqtt.is_enabled(&infra));
        assert_eq!(
            AdapterKind::Mqtt.config(&infra).and_then(|c| c.replicas),
            Some(2)
        );
    }

    #[test]
    fn disable_then_enable_toggles_one_adapter() {
        let mut infra = InfrastructureSpec::default();
        AdapterKind::Sigfox.disable(&mut infra);
        assert!(!AdapterKind::Sigfox.is_enabled(&infra));
        assert!(AdapterKind::Http.is_enabled(&infra));

        AdapterKind::Sigfox.enable(&mut infra);
        assert!(AdapterKind::Sigfox.is_enabled(&infra));
    }

    #[test]
    fn only_disables_everything_else() {
        let mut infra = InfrastructureSpec::default();
        only(&mut infra, &[AdapterKind::Http, AdapterKind::Amqp]);

        let enabled: Vec<AdapterKind> = AdapterKind::ALL
            .into_iter()
            .filter(|k| k.is_enabled(&infra))
            .collect();
        assert_eq!(enabled, vec![AdapterKind::Amqp, AdapterKind::Http]);
    }

    #[test]
    fn edit_preserves_existing_fields() {
        let mut infra = InfrastructureSpec::default();
        AdapterKind::Amqp.edit(&mut infra, |c| {
            c.endpoint_secret_name = Some("tls".to_string());
        });
        AdapterKind::Amqp.disable(&mut infra);

        let config = AdapterKind::Amqp.config(&infra).expect("config exists");
        assert_eq!(config.endpoint_secret_name.as_deref(), Some("tls"));
        assert_eq!(config.enabled, Some(false));
    }

    #[test]
    fn resource_names_follow_adapter_naming() {
        assert_eq!(AdapterKind::Http.resource_name(), "iot-http-adapter");
        assert_eq!(AdapterKind::LoraWan.resource_name(), "iot-lorawan-adapter");
    }
}
