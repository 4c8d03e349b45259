//! Workload containers and the configuration built for them
//!
//! A [`Container`] is the remote, fallible side of a reconcile pass: a
//! filesystem plus a process supervisor. Every operation may fail when the
//! container is not reachable; charms check [`Container::can_connect`] before
//! touching it and otherwise leave the work for the next event.

pub mod auth;
pub mod backend;
pub mod frontend;
pub mod layer;
pub mod litmusctl;
mod local;
#[cfg(test)]
pub(crate) mod scripted;

use tracing::{debug, warn};

use crate::controller::TlsPaths;
use crate::error::Result;

pub use layer::{
    Check, CheckInfo, CheckLevel, CheckStatus, Layer, LogTarget, Override, Service,
    ServiceStatus, Startup,
};
pub use local::LocalContainer;

/// Path of the version file shipped in every workload image
pub const VERSION_FILE: &str = "/VERSION";

/// Where the auth and backend servers read their TLS material
pub const SERVER_TLS_PATHS: TlsPaths = TlsPaths {
    server_cert: "/etc/tls/tls.crt",
    private_key: "/etc/tls/tls.key",
    ca_cert: "/etc/tls/ca.crt",
};

/// Externally opened ports of a server workload
///
/// Exactly one of the plaintext or the TLS pair is ever active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortSet {
    pub rest: u16,
    pub grpc: u16,
}

impl PortSet {
    /// Pick the pair matching the TLS state
    pub fn select(plain: PortSet, tls: PortSet, tls_enabled: bool) -> PortSet {
        if tls_enabled {
            tls
        } else {
            plain
        }
    }

    pub fn to_vec(self) -> Vec<u16> {
        vec![self.rest, self.grpc]
    }
}

/// Result of a command run inside a container
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Filesystem and process supervisor of one workload container
pub trait Container: Send {
    fn name(&self) -> &str;

    /// Whether the supervisor is reachable right now
    fn can_connect(&self) -> bool;

    fn exists(&self, path: &str) -> Result<bool>;

    /// Read a file; errors when it does not exist
    fn pull(&self, path: &str) -> Result<String>;

    fn push(&mut self, path: &str, content: &str, make_dirs: bool) -> Result<()>;

    fn remove_path(&mut self, path: &str, recursive: bool) -> Result<()>;

    /// Add (or with `combine`, replace) the layer stored under `label`
    fn add_layer(&mut self, label: &str, layer: &Layer, combine: bool) -> Result<()>;

    /// The effective plan: every layer folded in label order
    fn plan(&self) -> Result<Layer>;

    /// Start every enabled service and restart those whose definition changed
    fn replan(&mut self) -> Result<()>;

    fn restart(&mut self, services: &[String]) -> Result<()>;

    fn stop(&mut self, services: &[String]) -> Result<()>;

    fn service_status(&self, service: &str) -> Result<ServiceStatus>;

    fn get_checks(&self) -> Result<Vec<CheckInfo>>;

    fn exec(&mut self, command: &[String]) -> Result<ExecOutput>;
}

/// Write `layer` and then start or stop its services
///
/// The layer is always written so the supervisor holds the latest known
/// configuration; `start` decides whether that configuration is enough to
/// run on.
pub fn apply_layer(
    container: &mut dyn Container,
    label: &str,
    layer: &Layer,
    start: bool,
) -> Result<()> {
    container.add_layer(label, layer, true)?;
    if start {
        container.replan()
    } else {
        warn!(
            "Not starting {} services: configuration insufficient to run",
            container.name()
        );
        container.stop(&layer.service_names())
    }
}

/// Version string the workload image reports about itself
pub fn workload_version(container: &dyn Container) -> Option<String> {
    if !container.can_connect() {
        return None;
    }
    match container.pull(VERSION_FILE) {
        Ok(raw) => {
            let version = raw.trim();
            (!version.is_empty()).then(|| version.to_string())
        }
        Err(e) => {
            debug!("No workload version in {}: {}", container.name(), e);
            None
        }
    }
}
