//! Litmus authentication server workload

use std::collections::BTreeMap;

use tracing::info;

use super::{apply_layer, Check, Container, Layer, LogTarget, PortSet, Service, SERVER_TLS_PATHS};
use crate::error::Result;
use crate::interfaces::database::DatabaseConfig;
use crate::interfaces::litmus_auth::Endpoint;

pub const CONTAINER: &str = "authserver";
pub const LAYER: &str = "authserver";
pub const SERVICE: &str = "authserver";
pub const LIVENESS_CHECK: &str = "authserver-up";

pub const PLAIN_PORTS: PortSet = PortSet {
    rest: 3000,
    grpc: 3030,
};
pub const TLS_PORTS: PortSet = PortSet {
    rest: 3001,
    grpc: 3031,
};

const COMMAND: &str = "/bin/server";
const CHECK_THRESHOLD: u32 = 3;
const ADMIN_USERNAME: &str = "admin";
const ADMIN_PASSWORD: &str = "litmus";

#[derive(Clone, Debug, Default)]
pub struct AuthInputs {
    pub database: Option<DatabaseConfig>,
    pub backend_endpoint: Option<Endpoint>,
    pub tracing_endpoint: Option<String>,
    pub tls_enabled: bool,
    pub workload_version: Option<String>,
    pub log_targets: BTreeMap<String, LogTarget>,
}

impl AuthInputs {
    pub fn ports(&self) -> PortSet {
        PortSet::select(PLAIN_PORTS, TLS_PORTS, self.tls_enabled)
    }

    pub fn can_run(&self) -> bool {
        self.database.is_some() && self.workload_version.is_some()
    }
}

pub fn environment(inputs: &AuthInputs) -> BTreeMap<String, String> {
    let version = inputs.workload_version.as_deref().unwrap_or_default();
    let mut env = BTreeMap::new();
    env.insert("ADMIN_USERNAME".to_string(), ADMIN_USERNAME.to_string());
    env.insert("ADMIN_PASSWORD".to_string(), ADMIN_PASSWORD.to_string());
    env.insert("ALLOWED_ORIGINS".to_string(), ".*".to_string());
    env.insert(
        "INFRA_COMPATIBLE_VERSIONS".to_string(),
        format!("[\"{version}\"]"),
    );
    env.insert("VERSION".to_string(), version.to_string());
    env.insert("REST_PORT".to_string(), PLAIN_PORTS.rest.to_string());
    env.insert("GRPC_PORT".to_string(), PLAIN_PORTS.grpc.to_string());

    if let Some(db) = &inputs.database {
        env.insert("DB_USER".to_string(), db.username.clone());
        env.insert("DB_PASSWORD".to_string(), db.password.clone());
        env.insert("DB_SERVER".to_string(), db.uris.clone());
    }
    if let Some(backend) = &inputs.backend_endpoint {
        env.insert(
            "LITMUS_GQL_GRPC_ENDPOINT".to_string(),
            backend.grpc_server_host.clone(),
        );
        env.insert(
            "LITMUS_GQL_GRPC_PORT".to_string(),
            backend.grpc_server_port.to_string(),
        );
    }
    if let Some(endpoint) = &inputs.tracing_endpoint {
        env.insert("OTEL_EXPORTER_OTLP_ENDPOINT".to_string(), endpoint.clone());
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

pub fn layer(inputs: &AuthInputs) -> Layer {
    let mut layer = Layer {
        summary: "litmus auth server layer".to_string(),
        ..Default::default()
    };
    layer.services.insert(
        SERVICE.to_string(),
        Service {
            summary: "litmus auth server".to_string(),
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

pub fn reconcile(container: &mut dyn Container, inputs: &AuthInputs) -> Result<()> {
    let start = inputs.can_run();
    if !start {
        info!("Auth server missing database config or workload version");
    }
    apply_layer(container, LAYER, &layer(inputs), start)
}
