//! Descriptors of the resources a test session creates by default.

use serde_json::{Value, json};
use testbed_core::{
    AdapterKind, Endpoint, EndpointPort, InfrastructureSpec, Platform, ResourceDescriptor,
    ResourceKey, TenantSpec,
};

use crate::findings::Findings;
use crate::provisioner::CheckContext;
use crate::traits::ResourceClient;
use crate::{Result, SessionError};

pub const IOT_API_VERSION: &str = "iot.enmasse.io/v1";
pub const MESSAGING_API_VERSION: &str = "enmasse.io/v1";

/// Every tenant is expected to come with an endpoint of this name.
pub const DOWNSTREAM_ENDPOINT: &str = "downstream";

const DEFAULT_NAME: &str = "default";

pub fn namespace(name: &str) -> Result<ResourceDescriptor> {
    Ok(ResourceDescriptor::new(
        ResourceKey::new("v1", "Namespace", name, name)?,
        json!({}),
    ))
}

pub fn messaging_infrastructure(namespace: &str) -> Result<ResourceDescriptor> {
    Ok(ResourceDescriptor::new(
        ResourceKey::new(
            MESSAGING_API_VERSION,
            "MessagingInfrastructure",
            namespace,
            DEFAULT_NAME,
        )?,
        json!({ "broker": {}, "router": {} }),
    ))
}

pub fn iot_infrastructure_key(namespace: &str) -> Result<ResourceKey> {
    Ok(ResourceKey::new(
        IOT_API_VERSION,
        "IoTInfrastructure",
        namespace,
        DEFAULT_NAME,
    )?)
}

pub fn iot_infrastructure(
    namespace: &str,
    infra: &InfrastructureSpec,
) -> Result<ResourceDescriptor> {
    Ok(ResourceDescriptor::from_spec(
        iot_infrastructure_key(namespace)?,
        infra,
    )?)
}

pub fn messaging_project(namespace: &str, spec: Value) -> Result<ResourceDescriptor> {
    Ok(ResourceDescriptor::new(
        ResourceKey::new(
            MESSAGING_API_VERSION,
            "MessagingProject",
            namespace,
            DEFAULT_NAME,
        )?,
        spec,
    ))
}

pub fn downstream_endpoint_key(namespace: &str) -> Result<ResourceKey> {
    Ok(ResourceKey::new(
        MESSAGING_API_VERSION,
        "MessagingEndpoint",
        namespace,
        DOWNSTREAM_ENDPOINT,
    )?)
}

/// AMQPS with a self-signed certificate, exposed through a route on
/// OpenShift and a node port elsewhere.
#[must_use]
pub fn downstream_endpoint_spec(platform: Platform) -> Value {
    let mut spec = json!({
        "protocols": ["AMQPS"],
        "tls": { "selfsigned": {} },
    });
    let exposure = match platform {
        Platform::OpenShift4 => "route",
        Platform::Kubernetes => "nodePort",
    };
    spec[exposure] = json!({});
    spec
}

pub fn iot_tenant(namespace: &str, name: &str, spec: &TenantSpec) -> Result<ResourceDescriptor> {
    Ok(ResourceDescriptor::from_spec(
        ResourceKey::new(IOT_API_VERSION, "IoTTenant", namespace, name)?,
        spec,
    )?)
}

pub fn adapter_deployment_key(namespace: &str, kind: AdapterKind) -> Result<ResourceKey> {
    Ok(ResourceKey::new(
        "apps/v1",
        "Deployment",
        namespace,
        kind.resource_name(),
    )?)
}

/// Database backing the device registry.
pub fn device_registry_backend(namespace: &str) -> Result<ResourceDescriptor> {
    Ok(ResourceDescriptor::new(
        ResourceKey::new("apps/v1", "Deployment", namespace, "device-registry-postgresql")?,
        json!({ "image": "postgres:12", "replicas": 1 }),
    ))
}

/// Service configuration pointing at [`device_registry_backend`].
#[must_use]
pub fn default_services(namespace: &str) -> Value {
    let url = format!("jdbc:postgresql://device-registry-postgresql.{namespace}.svc/device-registry");
    json!({
        "deviceConnection": { "jdbc": { "server": { "external": { "url": url } } } },
        "deviceRegistry": { "jdbc": { "server": { "external": { "management": { "url": url } } } } },
    })
}

/// Host and AMQPS port of a messaging endpoint, as reported in its status.
///
/// # Errors
///
/// Returns an error if the endpoint does not exist or its status lacks a
/// host or an AMQPS port.
pub fn resolve_amqps(client: &dyn ResourceClient, key: &ResourceKey) -> Result<Endpoint> {
    let snapshot = client
        .get(key)?
        .ok_or_else(|| SessionError::NotFound(key.clone()))?;

    let host = snapshot
        .status
        .get("host")
        .and_then(Value::as_str)
        .filter(|host| !host.is_empty())
        .ok_or_else(|| SessionError::MissingHost(key.clone()))?;

    let ports: Vec<EndpointPort> = snapshot
        .status
        .get("ports")
        .and_then(|ports| serde_json::from_value(ports.clone()).ok())
        .unwrap_or_default();
    let port = ports
        .iter()
        .find(|port| port.protocol == "AMQPS")
        .ok_or_else(|| SessionError::MissingPort {
            key: key.clone(),
            protocol: "AMQPS".to_string(),
        })?;

    Ok(Endpoint {
        host: host.to_string(),
        port: port.port,
    })
}

fn deployment_exists(
    ctx: &CheckContext<'_>,
    kind: AdapterKind,
    findings: &mut Findings,
) -> Option<bool> {
    let key = match adapter_deployment_key(&ctx.key.namespace, kind) {
        Ok(key) => key,
        Err(err) => {
            findings.fail(err.to_string());
            return None;
        }
    };
    match ctx.client.get(&key) {
        Ok(snapshot) => Some(snapshot.is_some()),
        Err(err) => {
            findings.fail(format!("failed to look up {key}: {err}"));
            None
        }
    }
}

/// Enabled adapters are deployed and disabled ones are not.
pub fn assert_adapters_deployed(
    infra: InfrastructureSpec,
) -> impl Fn(&CheckContext<'_>, &mut Findings) + Send + Sync + 'static {
    move |ctx, findings| {
        for kind in AdapterKind::ALL {
            let enabled = kind.is_enabled(&infra);
            if let Some(exists) = deployment_exists(ctx, kind, findings) {
                findings.check(exists == enabled, || {
                    if enabled {
                        format!("deployment of {kind} adapter is missing")
                    } else {
                        format!("{kind} adapter is disabled but deployed")
                    }
                });
            }
        }
    }
}

/// No adapter deployment survives the infrastructure.
pub fn assert_adapters_removed()
-> impl Fn(&CheckContext<'_>, &mut Findings) + Send + Sync + 'static {
    |ctx, findings| {
        for kind in AdapterKind::ALL {
            if let Some(exists) = deployment_exists(ctx, kind, findings) {
                findings.check(!exists, || format!("deployment of {kind} adapter still exists"));
            }
        }
    }
}
