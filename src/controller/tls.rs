//! TLS material synchronization
//!
//! Converges the certificate, key and CA files inside a workload container
//! onto a target [`TlsConfig`], comparing by content so an unchanged target
//! never rewrites a file (and never bounces the workload that watches it).

use std::fmt;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::Result;
use crate::model::Model;
use crate::workload::Container;

/// Certificate material for one workload
#[derive(Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub server_cert: String,
    pub private_key: String,
    pub ca_cert: String,
}

impl TlsConfig {
    pub fn fingerprint(&self) -> String {
        material_fingerprint(&self.server_cert, &self.private_key, &self.ca_cert)
    }
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("server_cert", &self.server_cert.len())
            .field("private_key", &"<redacted>")
            .field("ca_cert", &self.ca_cert.len())
            .finish()
    }
}

/// Where a workload expects its TLS files
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TlsPaths {
    pub server_cert: &'static str,
    pub private_key: &'static str,
    pub ca_cert: &'static str,
}

impl TlsPaths {
    pub fn all(&self) -> [&'static str; 3] {
        [self.server_cert, self.private_key, self.ca_cert]
    }
}

/// Late-bound source of TLS material
///
/// Looking up a certificate requires a live read of the certificate
/// integration, so builders receive a provider and ask only when they need
/// the answer.
pub trait TlsConfigProvider {
    fn tls_config(&self, model: &Model) -> Option<TlsConfig>;
}

impl TlsConfigProvider for fn(&Model) -> Option<TlsConfig> {
    fn tls_config(&self, model: &Model) -> Option<TlsConfig> {
        self(model)
    }
}

/// Provider for charms deployed without a certificate integration
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTls;

impl TlsConfigProvider for NoTls {
    fn tls_config(&self, _model: &Model) -> Option<TlsConfig> {
        None
    }
}

/// What the workload currently has on disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TlsMaterialState {
    NoMaterial,
    MaterialPresent(String),
}

/// What a sync pass did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsSyncOutcome {
    /// Container unreachable; nothing touched
    Skipped,
    Unchanged,
    Written,
    Removed,
}

/// Content fingerprint over the three TLS files
pub fn material_fingerprint(server_cert: &str, private_key: &str, ca_cert: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [server_cert, private_key, ca_cert] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn read_or_empty(container: &dyn Container, path: &str) -> Result<String> {
    if container.exists(path)? {
        container.pull(path)
    } else {
        Ok(String::new())
    }
}

/// Observe the on-disk material
pub fn observe(container: &dyn Container, paths: &TlsPaths) -> Result<TlsMaterialState> {
    let mut any = false;
    let mut contents = Vec::with_capacity(3);
    for path in paths.all() {
        any |= container.exists(path)?;
        contents.push(read_or_empty(container, path)?);
    }
    if !any {
        return Ok(TlsMaterialState::NoMaterial);
    }
    Ok(TlsMaterialState::MaterialPresent(material_fingerprint(
        &contents[0],
        &contents[1],
        &contents[2],
    )))
}

/// Converge the workload's TLS files onto `target`
///
/// `None` removes any files that exist. `Some` writes all three files when
/// any of them differs and leaves them untouched otherwise.
pub fn sync_tls(
    container: &mut dyn Container,
    paths: &TlsPaths,
    target: Option<&TlsConfig>,
) -> Result<TlsSyncOutcome> {
    if !container.can_connect() {
        debug!("Container {} unreachable, skipping TLS sync", container.name());
        return Ok(TlsSyncOutcome::Skipped);
    }

    let observed = observe(container, paths)?;
    let Some(target) = target else {
        if observed == TlsMaterialState::NoMaterial {
            return Ok(TlsSyncOutcome::Unchanged);
        }
        for path in paths.all() {
            if container.exists(path)? {
                container.remove_path(path, true)?;
                debug!("TLS material removed: {}", path);
            }
        }
        return Ok(TlsSyncOutcome::Removed);
    };

    if observed == TlsMaterialState::MaterialPresent(target.fingerprint()) {
        debug!("TLS material in {} up to date", container.name());
        return Ok(TlsSyncOutcome::Unchanged);
    }

    container.push(paths.server_cert, &target.server_cert, true)?;
    container.push(paths.private_key, &target.private_key, true)?;
    container.push(paths.ca_cert, &target.ca_cert, true)?;
    info!("TLS material written to {}", container.name());
    Ok(TlsSyncOutcome::Written)
}

/// Whether this unit's TLS setup agrees with its peers'
///
/// A peer serving TLS cannot be reached by a unit that has no certificate of
/// its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TlsConsistency {
    pub any_remote_on_tls: bool,
    pub local_on_tls: bool,
}

impl TlsConsistency {
    pub fn new(any_remote_on_tls: bool, local_on_tls: bool) -> Self {
        Self {
            any_remote_on_tls,
            local_on_tls,
        }
    }

    pub fn is_consistent(&self) -> bool {
        !(self.any_remote_on_tls && !self.local_on_tls)
    }

    /// Requirements to report when inconsistent
    pub fn missing_configs(&self) -> Vec<&'static str> {
        if self.is_consistent() {
            Vec::new()
        } else {
            vec!["tls certificate"]
        }
    }
}
