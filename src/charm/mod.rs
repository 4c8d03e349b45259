//! Charms: one per Litmus component
//!
//! A charm turns the model snapshot into workload configuration
//! ([`Charm::reconcile`]) and into a unit status
//! ([`Charm::collect_status`]). Charms hold no state of their own between
//! passes; anything that must survive lives in the model's unit state.

pub mod auth;
pub mod backend;
pub mod chaoscenter;
pub mod infrastructure;
pub mod user_manager;

use std::collections::{BTreeMap, BTreeSet};

use clap::ValueEnum;
use tracing::debug;

use crate::controller::status::StatusCollector;
use crate::controller::tls::{sync_tls, TlsConfig, TlsConfigProvider, TlsPaths};
use crate::error::Result;
use crate::interfaces::tls_certificates::{sync_request, CertificateRequestAttributes};
use crate::model::Model;
use crate::workload::{CheckInfo, Container};

pub use auth::AuthCharm;
pub use backend::BackendCharm;
pub use chaoscenter::ChaoscenterCharm;
pub use infrastructure::InfrastructureCharm;

/// Everything one pass may read and write
pub struct CharmContext {
    pub model: Model,
    pub containers: BTreeMap<String, Box<dyn Container>>,
    /// Ports to announce; replaces the previous set when `Some`
    pub opened_ports: Option<BTreeSet<u16>>,
    pub workload_version: Option<String>,
}

impl CharmContext {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            containers: BTreeMap::new(),
            opened_ports: None,
            workload_version: None,
        }
    }

    pub fn with_container(mut self, container: impl Container + 'static) -> Self {
        self.containers
            .insert(container.name().to_string(), Box::new(container));
        self
    }

    pub fn container(&self, name: &str) -> Option<&dyn Container> {
        self.containers.get(name).map(|c| c.as_ref())
    }

    pub fn container_mut(&mut self, name: &str) -> Option<&mut (dyn Container + 'static)> {
        self.containers.get_mut(name).map(|c| c.as_mut())
    }

    /// Whether `name` exists and its supervisor answers
    pub fn can_connect(&self, name: &str) -> bool {
        self.container(name).is_some_and(|c| c.can_connect())
    }

    pub fn set_ports(&mut self, ports: &[u16]) {
        self.opened_ports = Some(ports.iter().copied().collect());
    }

    /// Current check results of `name`, empty when it cannot be reached
    pub fn checks(&self, name: &str) -> Vec<CheckInfo> {
        let Some(container) = self.container(name).filter(|c| c.can_connect()) else {
            return Vec::new();
        };
        container.get_checks().unwrap_or_else(|e| {
            debug!("Cannot read checks of {}: {}", name, e);
            Vec::new()
        })
    }
}

/// Request a certificate, then converge the container's TLS files on it
///
/// Returns the material the workload should be configured with.
pub(crate) fn sync_certificates(
    ctx: &mut CharmContext,
    provider: &dyn TlsConfigProvider,
    container: &str,
    paths: &TlsPaths,
) -> Result<Option<TlsConfig>> {
    let attributes = CertificateRequestAttributes::for_model(&ctx.model);
    sync_request(&mut ctx.model, &attributes)?;
    let tls = provider.tls_config(&ctx.model);
    if let Some(container) = ctx.container_mut(container).filter(|c| c.can_connect()) {
        sync_tls(container, paths, tls.as_ref())?;
    }
    Ok(tls)
}

pub trait Charm: Send + Sync {
    fn name(&self) -> &'static str;

    /// Containers the charm drives, by name
    fn containers(&self) -> &'static [&'static str];

    /// Collect, build, apply and publish; see [`crate::controller::dispatch`]
    fn reconcile(&self, ctx: &mut CharmContext) -> Result<()>;

    /// Append this pass's statuses; the collector picks the one to surface
    fn collect_status(&self, ctx: &CharmContext, statuses: &mut StatusCollector);
}

/// Which component this operator process runs
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CharmKind {
    Auth,
    Backend,
    Chaoscenter,
    Infrastructure,
}

impl CharmKind {
    pub fn build(self) -> Box<dyn Charm> {
        match self {
            CharmKind::Auth => Box::new(AuthCharm::new()),
            CharmKind::Backend => Box::new(BackendCharm::new()),
            CharmKind::Chaoscenter => Box::new(ChaoscenterCharm::new()),
            CharmKind::Infrastructure => Box::new(InfrastructureCharm),
        }
    }

    pub fn default_app_name(self) -> &'static str {
        match self {
            CharmKind::Auth => "litmus-auth",
            CharmKind::Backend => "litmus-backend",
            CharmKind::Chaoscenter => "litmus-chaoscenter",
            CharmKind::Infrastructure => "litmus-infrastructure",
        }
    }
}
