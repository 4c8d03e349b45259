//! Backend server charm

use tracing::debug;

use super::{sync_certificates, Charm, CharmContext};
use crate::controller::status::{StatusCollector, StatusManager};
use crate::controller::tls::{TlsConfigProvider, TlsConsistency};
use crate::error::Result;
use crate::interfaces::database::{self, database_config, DATABASE};
use crate::interfaces::http_api::{self, frontend_endpoint, HTTP_API};
use crate::interfaces::litmus_auth::{self, remote_endpoint, Endpoint, LITMUS_AUTH};
use crate::interfaces::self_monitoring;
use crate::interfaces::tls_certificates::TlsCertificatesRequirer;
use crate::model::Model;
use crate::workload::backend::{self as workload, BackendInputs};
use crate::workload::{workload_version, PortSet, SERVER_TLS_PATHS};

pub struct BackendCharm<P = TlsCertificatesRequirer> {
    tls: P,
}

impl BackendCharm {
    pub fn new() -> Self {
        Self {
            tls: TlsCertificatesRequirer,
        }
    }
}

impl Default for BackendCharm {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: TlsConfigProvider> BackendCharm<P> {
    pub fn with_tls_provider(tls: P) -> Self {
        Self { tls }
    }
}

fn inputs(model: &Model, tls_enabled: bool, version: Option<String>) -> BackendInputs {
    BackendInputs {
        database: database_config(model),
        auth_endpoint: remote_endpoint(model),
        frontend_url: frontend_endpoint(model),
        tls_enabled,
        workload_version: version,
        log_targets: self_monitoring::log_targets(model),
    }
}

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
    Ok(())
}

impl<P: TlsConfigProvider + Send + Sync> Charm for BackendCharm<P> {
    fn name(&self) -> &'static str {
        "backend"
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
            None => debug!("Backend container not reachable yet"),
        }

        if ctx.model.leader {
            publish(&mut ctx.model, ports, tls.is_some())?;
        }
        Ok(())
    }

    fn collect_status(&self, ctx: &CharmContext, statuses: &mut StatusCollector) {
        let model = &ctx.model;
        let auth = remote_endpoint(model);
        let consistency = TlsConsistency::new(
            auth.as_ref().is_some_and(|e| !e.insecure),
            self.tls.tls_config(model).is_some(),
        );
        // the frontend is optional; once related, its URL is awaited
        let frontend_ready = !model.is_related(HTTP_API) || frontend_endpoint(model).is_some();
        StatusManager::new()
            .require_relation(DATABASE, model.is_related(DATABASE))
            .require_relation(LITMUS_AUTH, model.is_related(LITMUS_AUTH))
            .require_config("database config", database_config(model).is_some())
            .require_config("auth grpc endpoint", auth.is_some())
            .require_config("frontend url", frontend_ready)
            .require_consistency(consistency.missing_configs())
            .checks(&ctx.checks(workload::CONTAINER))
            .collect(statuses);
    }
}
