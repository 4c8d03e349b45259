//! Litmus backend (GraphQL) server workload

use std::collections::BTreeMap;

use tracing::info;

use super::{apply_layer, Check, Container, Layer, LogTarget, PortSet, Service, SERVER_TLS_PATHS};
use crate::error::Result;
use crate::interfaces::database::DatabaseConfig;
use crate::interfaces::litmus_auth::Endpoint;

pub const CONTAINER: &str = "backend";
pub const LAYER: &str = "backend";
pub const SERVICE: &str = "backend";
pub const LIVENESS_CHECK: &str = "backend-up";

pub const PLAIN_PORTS: PortSet = PortSet {
    rest: 8080,
    grpc: 8000,
};
pub const TLS_PORTS: PortSet = PortSet {
    rest: 8081,
    grpc: 8001,
};

const COMMAND: &str = "/bin/server";
const CHECK_THRESHOLD: u32 = 3;
const INFRA_DEPLOYMENTS: &str =
    r#"["app=chaos-exporter", "name=chaos-operator", "app=workflow-controller", "app=event-tracker"]"#;
const ARGO_VERSION: &str = "v3.3.1";

/// Everything the backend layer is built from
#[derive(Clone, Debug, Default)]
pub struct BackendInputs {
    pub database: Option<DatabaseConfig>,
    pub auth_endpoint: Option<Endpoint>,
    pub frontend_url: Option<String>,
    pub tls_enabled: bool,
    pub workload_version: Option<String>,
    pub log_targets: BTreeMap<String, LogTarget>,
}

impl BackendInputs {
    pub fn ports(&self) -> PortSet {
        PortSet::select(PLAIN_PORTS, TLS_PORTS, self.tls_enabled)
    }

    /// The server refuses to start without a database and a known version
    pub fn can_run(&self) -> bool {
        self.database.is_some() && self.workload_version.is_some()
    }
}

pub fn environment(inputs: &BackendInputs) -> BTreeMap<String, String> {
    let version = inputs.workload_version.as_deref().unwrap_or_default();
    let mut env: BTreeMap<String, String> = [
        ("REST_PORT", PLAIN_PORTS.rest.to_string()),
        ("GRPC_PORT", PLAIN_PORTS.grpc.to_string()),
        ("INFRA_DEPLOYMENTS", INFRA_DEPLOYMENTS.to_string()),
        ("DEFAULT_HUB_BRANCH_NAME", "master".to_string()),
        ("ALLOWED_ORIGINS", ".*".to_string()),
        ("CONTAINER_RUNTIME_EXECUTOR", "k8sapi".to_string()),
        ("WORKFLOW_HELPER_IMAGE_VERSION", version.to_string()),
        ("INFRA_COMPATIBLE_VERSIONS", format!("[\"{version}\"]")),
        ("VERSION", version.to_string()),
        (
            "SUBSCRIBER_IMAGE",
            format!("litmuschaos/litmusportal-subscriber:{version}"),
        ),
        (
            "EVENT_TRACKER_IMAGE",
            format!("litmuschaos/litmusportal-event-tracker:{version}"),
        ),
        (
            "ARGO_WORKFLOW_CONTROLLER_IMAGE",
            format!("litmuschaos/workflow-controller:{ARGO_VERSION}"),
        ),
        (
            "ARGO_WORKFLOW_EXECUTOR_IMAGE",
            format!("litmuschaos/argoexec:{ARGO_VERSION}"),
        ),
        (
            "LITMUS_CHAOS_OPERATOR_IMAGE",
            format!("litmuschaos/chaos-operator:{version}"),
        ),
        (
            "LITMUS_CHAOS_RUNNER_IMAGE",
            format!("litmuschaos/chaos-runner:{version}"),
        ),
        (
            "LITMUS_CHAOS_EXPORTER_IMAGE",
            format!("litmuschaos/chaos-exporter:{version}"),
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    if let Some(db) = &inputs.database {
        env.insert("DB_USER".to_string(), db.username.clone());
        env.insert("DB_PASSWORD".to_string(), db.password.clone());
        env.insert("DB_SERVER".to_string(), db.uris.clone());
    }
    if let Some(auth) = &inputs.auth_endpoint {
        env.insert(
            "LITMUS_AUTH_GRPC_ENDPOINT".to_string(),
            auth.grpc_server_host.clone(),
        );
        env.insert(
            "LITMUS_AUTH_GRPC_PORT".to_string(),
            auth.grpc_server_port.to_string(),
        );
    }
    if let Some(url) = &inputs.frontend_url {
        env.insert("CHAOS_CENTER_UI_ENDPOINT".to_string(), url.clone());
    }
    if inputs.tls_enabled {
        env.insert("ENABLE_INTERNAL_TLS".to_string(), "true".to_string());
        env.insert("REST_PORT".to_string(), TLS_PORTS.rest.to_string());
        env.insert("GRPC_PORT".to_string(), TLS_PORTS.grpc.to_string());
        env.insert(
            "TLS_CERT_PATH".to_string(),
            SERVER_TLS_PATHS.server_cert.to_string(),
        );
        env.insert(
            "TLS_KEY_PATH".to_string(),
            SERVER_TLS_PATHS.private_key.to_string(),
        );
        env.insert(
            "CA_CERT_TLS_PATH".to_string(),
            SERVER_TLS_PATHS.ca_cert.to_string(),
        );
    }
    env
}

pub fn layer(inputs: &BackendInputs) -> Layer {
    let mut layer = Layer {
        summary: "litmus backend server layer".to_string(),
        ..Default::default()
    };
    layer.services.insert(
        SERVICE.to_string(),
        Service {
            summary: "litmus backend server".to_string(),
            command: COMMAND.to_string(),
            environment: environment(inputs),
            ..Default::default()
        },
    );
    layer.checks.insert(
        LIVENESS_CHECK.to_string(),
        Check::tcp(inputs.ports().rest, CHECK_THRESHOLD),
    );
    layer.log_targets = inputs.log_targets.clone();
    layer
}

/// Write the layer and start the server if it has enough to run on
pub fn reconcile(container: &mut dyn Container, inputs: &BackendInputs) -> Result<()> {
    let start = inputs.can_run();
    if !start {
        info!("Backend server missing database config or workload version");
    }
    apply_layer(container, LAYER, &layer(inputs), start)
}
