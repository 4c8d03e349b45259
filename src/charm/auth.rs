//! Auth server charm

use tracing::debug;

use super::{sync_certificates, Charm, CharmContext};
use crate::controller::status::{StatusCollector, StatusManager};
use crate::controller::tls::{TlsConfigProvider, TlsConsistency};
use crate::error::Result;
use crate::interfaces::database::{self, database_config, DATABASE};
use crate::interfaces::http_api;
use crate::interfaces::litmus_auth::{self, remote_endpoint, Endpoint, LITMUS_AUTH};
use crate::interfaces::self_monitoring::{self, ReceiverProtocol};
use crate::interfaces::tls_certificates::TlsCertificatesRequirer;
use crate::model::Model;
use crate::workload::auth::{self as workload, AuthInputs};
use crate::workload::{workload_version, PortSet, SERVER_TLS_PATHS};

pub struct AuthCharm<P = TlsCertificatesRequirer> {
    tls: P,
}

impl AuthCharm {
    pub fn new() -> Self {
        Self {
            tls: TlsCertificatesRequirer,
        }
    }
}

impl Default for AuthCharm {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: TlsConfigProvider> AuthCharm<P> {
    pub fn with_tls_provider(tls: P) -> Self {
        Self { tls }
    }
}

fn inputs(model: &Model, tls_enabled: bool, version: Option<String>) -> AuthInputs {
    AuthInputs {
        database: database_config(model),
        backend_endpoint: remote_endpoint(model),
        tracing_endpoint: self_monitoring::tracing_endpoint(model, ReceiverProtocol::OtlpHttp),
        tls_enabled,
        workload_version: version,
        log_targets: self_monitoring::log_targets(model),
    }
}

/// What the leader tells the backend and the frontend about this server
fn publish(model: &mut Model, ports: PortSet, tls_enabled: bool) -> Result<()> {
    let host = model.app_hostname();
    litmus_auth::publish_endpoint(
        model,
        &Endpoint {
            grpc_server_host: host.clone(),
            grpc_server_port: ports.grpc,
            insecure: !tls_enabled,
        },
    )?;
    let scheme = if tls_enabled { "https" } else { "http" };
    http_api::publish_api_endpoint(model, &format!("{scheme}://{host}:{}", ports.rest))?;
    database::request_database(model);
    self_monitoring::request_receivers(model, &[ReceiverProtocol::OtlpHttp])
}

impl<P: TlsConfigProvider + Send + Sync> Charm for AuthCharm<P> {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn containers(&self) -> &'static [&'static str] {
        &[workload::CONTAINER]
    }

    fn reconcile(&self, ctx: &mut CharmContext) -> Result<()> {
        let tls = sync_certificates(ctx, &self.tls, workload::CONTAINER, &SERVER_TLS_PATHS)?;
        let version = ctx.container(workload::CONTAINER).and_then(workload_version);
        let inputs = inputs(&ctx.model, tls.is_some(), version.clone());
        let ports = inputs.ports();

        match ctx.container_mut(workload::CONTAINER).filter(|c| c.can_connect()) {
            Some(container) => {
                workload::reconcile(container, &inputs)?;
                ctx.set_ports(&ports.to_vec());
                ctx.workload_version = version;
            }
            None => debug!("Auth server container not reachable yet"),
        }

        if ctx.model.leader {
            publish(&mut ctx.model, ports, tls.is_some())?;
        }
        Ok(())
    }

    fn collect_status(&self, ctx: &CharmContext, statuses: &mut StatusCollector) {
        let model = &ctx.model;
        let backend = remote_endpoint(model);
        let consistency = TlsConsistency::new(
            backend.as_ref().is_some_and(|e| !e.insecure),
            self.tls.tls_config(model).is_some(),
        );
        StatusManager::new()
            .require_relation(DATABASE, model.is_related(DATABASE))
            .require_relation(LITMUS_AUTH, model.is_related(LITMUS_AUTH))
            .require_config("database config", database_config(model).is_some())
            .require_config("backend grpc endpoint", backend.is_some())
            .require_consistency(consistency.missing_configs())
            .checks(&ctx.checks(workload::CONTAINER))
            .collect(statuses);
    }
}
