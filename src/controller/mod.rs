//! Controller module: the reconciliation engine
//! This module contains the configuration collector, TLS synchronization,
//! reverse-proxy and status builders, and the dispatch of reconcile triggers.

pub mod collector;
pub mod conditions;
pub mod nginx;
mod reconciler;
#[cfg(test)]
mod reconciler_test;
pub mod resources;
pub mod status;
#[cfg(test)]
mod status_test;
pub mod tls;

pub use collector::{collect, collect_relation, collect_units, ConfigFragment};
pub use reconciler::{dispatch, PassReport, ReconcileTrigger};
pub use status::{StatusCollector, StatusLevel, StatusManager, UnitStatus};
pub use tls::{sync_tls, TlsConfig, TlsConfigProvider, TlsConsistency, TlsPaths, TlsSyncOutcome};
