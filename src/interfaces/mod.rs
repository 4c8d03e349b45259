//! Typed wrappers over each integration interface
//!
//! Readers go through the configuration collector and therefore never fail;
//! writers only touch relations that exist and leave leadership gating to
//! the caller.

pub mod database;
pub mod http_api;
pub mod ingress;
pub mod litmus_auth;
pub mod self_monitoring;
pub mod tls_certificates;

use serde::{Deserialize, Serialize};

/// Data bag schema version published by this implementation
pub const INTERFACE_VERSION: u32 = 0;

/// An app data bag payload tagged with its schema version
///
/// The version is always written and optional on read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    #[serde(default)]
    pub version: u32,
    #[serde(flatten)]
    pub inner: T,
}

impl<T> Versioned<T> {
    pub fn new(inner: T) -> Self {
        Self {
            version: INTERFACE_VERSION,
            inner,
        }
    }
}
