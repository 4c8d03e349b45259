//! Kubernetes resource builders for a charm's application
//!
//! The opened port set is announced as the application's `Service`; the
//! resolved unit status is published as a `ConfigMap` next to it.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::{ConfigMap, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use tracing::{info, instrument};

use super::conditions::{apply_unit_status, Condition};
use super::status::UnitStatus;
use crate::error::Result;

pub const FIELD_MANAGER: &str = "litmus-operator";

pub const LABEL_APP: &str = "litmus.chaos/app";
pub const LABEL_ENDPOINT: &str = "litmus.chaos/endpoint";
pub const LABEL_KIND: &str = "litmus.chaos/kind";

/// Get the standard labels for an application's resources
pub fn standard_labels(app: &str, component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/name".to_string(), app.to_string());
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        component.to_string(),
    );
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        FIELD_MANAGER.to_string(),
    );
    labels.insert(LABEL_APP.to_string(), app.to_string());
    labels
}

fn selector_labels(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app.kubernetes.io/name".to_string(), app.to_string())])
}

/// Service exposing exactly `ports`
pub fn build_service(namespace: &str, app: &str, ports: &BTreeSet<u16>) -> Service {
    let ports = ports
        .iter()
        .map(|port| ServicePort {
            name: Some(format!("port-{port}")),
            port: i32::from(*port),
            ..Default::default()
        })
        .collect();

    Service {
        metadata: ObjectMeta {
            name: Some(app.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(standard_labels(app, "workload")),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(app)),
            ports: Some(ports),
            ..Default::default()
        }),
        status: None,
    }
}

/// Replace the application's announced ports
#[instrument(skip(client, ports), fields(namespace = %namespace, app = %app))]
pub async fn ensure_service(
    client: &Client,
    namespace: &str,
    app: &str,
    ports: &BTreeSet<u16>,
) -> Result<()> {
    let api: Api<Service> = Api::namespaced(client.clone(), namespace);
    let service = build_service(namespace, app, ports);

    let patch = Patch::Apply(&service);
    api.patch(app, &PatchParams::apply(FIELD_MANAGER).force(), &patch)
        .await?;

    info!("Service ensured for {}/{} with ports {:?}", namespace, app, ports);
    Ok(())
}

pub fn status_config_map_name(app: &str) -> String {
    format!("{app}-status")
}

/// Status ConfigMap for one unit
///
/// `previous` carries the conditions from the last publication so their
/// transition times survive unchanged statuses.
pub fn build_status_config_map(
    namespace: &str,
    app: &str,
    unit: &str,
    status: &UnitStatus,
    workload_version: Option<&str>,
    previous: Vec<Condition>,
) -> Result<ConfigMap> {
    let mut conditions = previous;
    apply_unit_status(&mut conditions, status);

    let mut labels = standard_labels(app, "status");
    labels.insert(LABEL_KIND.to_string(), "status".to_string());

    let mut data = BTreeMap::new();
    data.insert("unit".to_string(), unit.to_string());
    data.insert("status".to_string(), status.level.to_string());
    data.insert("message".to_string(), status.message.clone());
    data.insert("conditions".to_string(), serde_json::to_string(&conditions)?);
    if let Some(version) = workload_version {
        data.insert("workload-version".to_string(), version.to_string());
    }

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(status_config_map_name(app)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    })
}

/// Conditions stored in a previously published status ConfigMap
pub fn previous_conditions(config_map: &ConfigMap) -> Vec<Condition> {
    config_map
        .data
        .as_ref()
        .and_then(|d| d.get("conditions"))
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}
