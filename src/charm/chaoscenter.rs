//! Chaoscenter (frontend) charm

use tracing::debug;

use super::{sync_certificates, user_manager, Charm, CharmContext};
use crate::controller::nginx::{self, PeerAddress, ProxyConfig, NGINX_PORT, NGINX_TLS_PATHS};
use crate::controller::status::{StatusCollector, StatusManager};
use crate::controller::tls::{TlsConfig, TlsConfigProvider, TlsConsistency};
use crate::error::Result;
use crate::interfaces::http_api::{api_endpoint, publish_frontend_endpoint, AUTH_HTTP_API, BACKEND_HTTP_API};
use crate::interfaces::ingress::{self, ingress_config};
use crate::interfaces::self_monitoring::{self, ReceiverProtocol};
use crate::interfaces::tls_certificates::TlsCertificatesRequirer;
use crate::model::Model;
use crate::workload::frontend::{self as workload, EXPORTER_CONTAINER, EXPORTER_PORT};
use crate::workload::litmusctl::Litmusctl;
use crate::workload::workload_version;

pub struct ChaoscenterCharm<P = TlsCertificatesRequirer> {
    tls: P,
}

impl ChaoscenterCharm {
    pub fn new() -> Self {
        Self {
            tls: TlsCertificatesRequirer,
        }
    }
}

impl Default for ChaoscenterCharm {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: TlsConfigProvider> ChaoscenterCharm<P> {
    pub fn with_tls_provider(tls: P) -> Self {
        Self { tls }
    }
}

fn scheme(tls_enabled: bool) -> &'static str {
    if tls_enabled {
        "https"
    } else {
        "http"
    }
}

/// In-cluster URL of the UI
fn internal_url(model: &Model, tls_enabled: bool) -> String {
    format!(
        "{}://{}:{}",
        scheme(tls_enabled),
        model.app_hostname(),
        NGINX_PORT
    )
}

/// Ingressed URL when Traefik has answered, the in-cluster one otherwise
fn public_url(model: &Model, tls_enabled: bool) -> String {
    match ingress_config(model).map(|ingress| ingress.external_url(NGINX_PORT)) {
        Some(Ok(url)) => url.as_str().trim_end_matches('/').to_string(),
        Some(Err(e)) => {
            debug!("Ignoring ingress data: {}", e);
            internal_url(model, tls_enabled)
        }
        None => internal_url(model, tls_enabled),
    }
}

fn proxy_config(model: &Model, tls: Option<&TlsConfig>) -> Result<Option<ProxyConfig>> {
    let (Some(auth), Some(backend)) = (
        api_endpoint(model, AUTH_HTTP_API),
        api_endpoint(model, BACKEND_HTTP_API),
    ) else {
        debug!("Peer endpoints incomplete; no proxy config yet");
        return Ok(None);
    };
    let mut proxy = nginx::build(
        &model.app_hostname(),
        Some(auth.as_str()),
        Some(backend.as_str()),
        tls,
    )?;
    if let Some(endpoint) = self_monitoring::tracing_endpoint(model, ReceiverProtocol::OtlpGrpc) {
        proxy = proxy.with_tracing(&endpoint, &model.app_name);
    }
    Ok(Some(proxy))
}

fn publish(model: &mut Model, tls_enabled: bool) -> Result<()> {
    publish_frontend_endpoint(model, &internal_url(model, tls_enabled))?;
    ingress::publish_routes(model, tls_enabled)?;
    self_monitoring::publish_scrape_jobs(model, EXPORTER_PORT)?;
    self_monitoring::request_receivers(model, &[ReceiverProtocol::OtlpGrpc])
}

/// Whether any peer serves TLS
fn any_peer_on_tls(model: &Model) -> bool {
    [AUTH_HTTP_API, BACKEND_HTTP_API]
        .into_iter()
        .filter_map(|endpoint| api_endpoint(model, endpoint))
        .filter_map(|url| PeerAddress::parse(&url).ok())
        .any(|peer| peer.is_tls())
}

impl<P: TlsConfigProvider + Send + Sync> Charm for ChaoscenterCharm<P> {
    fn name(&self) -> &'static str {
        "chaoscenter"
    }

    fn containers(&self) -> &'static [&'static str] {
        &[workload::CONTAINER, EXPORTER_CONTAINER]
    }

    fn reconcile(&self, ctx: &mut CharmContext) -> Result<()> {
        let tls = sync_certificates(ctx, &self.tls, workload::CONTAINER, &NGINX_TLS_PATHS)?;
        let tls_enabled = tls.is_some();
        let proxy = proxy_config(&ctx.model, tls.as_ref())?;
        let log_targets = self_monitoring::log_targets(&ctx.model);

        let CharmContext {
            model,
            containers,
            opened_ports,
            workload_version: version,
        } = ctx;

        match containers
            .get_mut(workload::CONTAINER)
            .filter(|c| c.can_connect())
        {
            Some(container) => {
                workload::reconcile(&mut **container, proxy.as_ref(), tls_enabled, &log_targets)?;
                *opened_ports = Some([NGINX_PORT].into_iter().collect());
                *version = workload_version(&**container);
                if proxy.is_some() {
                    let mut litmusctl = Litmusctl::new(&mut **container);
                    let outcome = user_manager::reconcile(model, &mut litmusctl);
                    debug!("User accounts: {:?}", outcome);
                }
            }
            None => debug!("nginx container not reachable yet"),
        }

        if let Some(exporter) = containers
            .get_mut(EXPORTER_CONTAINER)
            .filter(|c| c.can_connect())
        {
            workload::reconcile_exporter(&mut **exporter, tls_enabled)?;
        }

        if model.leader {
            publish(model, tls_enabled)?;
        }
        Ok(())
    }

    fn collect_status(&self, ctx: &CharmContext, statuses: &mut StatusCollector) {
        let model = &ctx.model;
        let tls_enabled = self.tls.tls_config(model).is_some();
        let consistency = TlsConsistency::new(any_peer_on_tls(model), tls_enabled);
        StatusManager::new()
            .require_relation(AUTH_HTTP_API, model.is_related(AUTH_HTTP_API))
            .require_relation(BACKEND_HTTP_API, model.is_related(BACKEND_HTTP_API))
            .require_config(
                "auth http API endpoint url",
                api_endpoint(model, AUTH_HTTP_API).is_some(),
            )
            .require_config(
                "backend http API endpoint url",
                api_endpoint(model, BACKEND_HTTP_API).is_some(),
            )
            .require_consistency(consistency.missing_configs())
            .checks(&ctx.checks(workload::CONTAINER))
            .active_message(format!("Ready at {}.", public_url(model, tls_enabled)))
            .collect(statuses);
    }
}
