use std::fmt;

use clap::ValueEnum;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::{AdapterKind, AdaptersConfig};

/// Cluster flavour the session is deployed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Kubernetes,
    #[value(name = "openshift4")]
    #[serde(rename = "openshift4")]
    OpenShift4,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub loggers: IndexMap<String, String>,
}

/// How services of the infrastructure obtain their inter-service
/// certificates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CertificateStrategy {
    /// Certificates issued by the platform's service CA.
    ServiceCa,
    /// Certificates taken from pre-deployed secrets.
    #[serde(rename_all = "camelCase")]
    Secrets {
        ca_secret_name: String,
        service_secret_names: IndexMap<String, String>,
    },
}

const SERVICE_SECRETS: [(&str, &str); 6] = [
    ("iot-auth-service", "systemtests-iot-auth-service-tls"),
    ("iot-tenant-service", "systemtests-iot-tenant-service-tls"),
    ("iot-device-connection", "systemtests-iot-device-connection-tls"),
    ("iot-device-registry", "systemtests-iot-device-registry-tls"),
    ("iot-mesh-inter", "systemtests-iot-mesh-inter-tls"),
    ("iot-command-mesh", "systemtests-iot-command-mesh-tls"),
];

/// Desired state of the IoT infrastructure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_default_routes: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inter_service_certificates: Option<CertificateStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapters: Option<AdaptersConfig>,
    /// Backing services (device registry storage and similar).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Value>,
}

impl InfrastructureSpec {
    /// The infrastructure a default test session deploys.
    #[must_use]
    pub fn default_for(platform: Platform) -> Self {
        let mut loggers = IndexMap::new();
        loggers.insert("org.eclipse.hono".to_string(), "debug".to_string());
        loggers.insert("io.enmasse".to_string(), "debug".to_string());

        let mut spec = Self {
            enable_default_routes: Some(true),
            logging: Some(LoggingConfig {
                level: "info".to_string(),
                loggers,
            }),
            ..Self::default()
        };

        match platform {
            Platform::OpenShift4 => {
                spec.inter_service_certificates = Some(CertificateStrategy::ServiceCa);
                // MQTT is not HTTP and HTTP uses client certificates, so both
                // need passthrough routes with their own keys.
                spec.use_systemtest_keys(&[AdapterKind::Http, AdapterKind::Mqtt, AdapterKind::Amqp]);
            }
            Platform::Kubernetes => {
                spec.inter_service_certificates = Some(CertificateStrategy::Secrets {
                    ca_secret_name: "systemtests-iot-service-ca".to_string(),
                    service_secret_names: SERVICE_SECRETS
                        .iter()
                        .map(|(service, secret)| ((*service).to_string(), (*secret).to_string()))
                        .collect(),
                });
                spec.use_systemtest_keys(&AdapterKind::ALL);
            }
        }
        spec
    }

    /// Point the listed adapters at the pre-deployed test key secrets.
    pub fn use_systemtest_keys(&mut self, adapters: &[AdapterKind]) {
        for kind in adapters {
            let secret = format!("systemtests-{}-tls", kind.resource_name());
            kind.edit(self, |config| config.endpoint_secret_name = Some(secret));
        }
    }
}

/// Desired state of an IoT tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
}

/// A reachable network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One port in a messaging endpoint's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPort {
    #[serde(default)]
    pub name: String,
    pub protocol: String,
    pub port: u16,
}

/// A readable random name, used for tenants.
#[must_use]
pub fn random_name() -> String {
    petname::petname(2, "-").unwrap_or_else(|| {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        format!("tenant-{nanos}")
    })
}
