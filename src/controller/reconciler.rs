//! Reconcile dispatch
//!
//! Every event the host delivers becomes a [`ReconcileTrigger`]. Apart from
//! framework-internal ones, triggers are not told apart: each runs the same
//! full reconcile pass. Status collection is its own trigger and never
//! touches the workload.

use std::fmt;

use tracing::{debug, info, instrument, warn};

use super::status::{StatusCollector, UnitStatus};
use crate::charm::{Charm, CharmContext};
use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileTrigger {
    Install,
    Start,
    Stop,
    Remove,
    UpgradeCharm,
    ConfigChanged,
    LeaderElected,
    UpdateStatus,
    WorkloadReady { container: String },
    RelationCreated { relation_id: u32 },
    RelationChanged { relation_id: u32 },
    RelationDeparted { relation_id: u32 },
    RelationBroken { relation_id: u32 },
    SecretChanged { secret_id: String },
    /// Compute and report the unit status
    CollectStatus,
    /// End-of-dispatch bookkeeping by the host
    Commit,
}

impl ReconcileTrigger {
    /// Framework-internal triggers that never run a reconcile pass
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            ReconcileTrigger::CollectStatus | ReconcileTrigger::Commit
        )
    }
}

impl fmt::Display for ReconcileTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileTrigger::WorkloadReady { container } => {
                write!(f, "workload-ready({container})")
            }
            ReconcileTrigger::RelationCreated { relation_id } => {
                write!(f, "relation-created({relation_id})")
            }
            ReconcileTrigger::RelationChanged { relation_id } => {
                write!(f, "relation-changed({relation_id})")
            }
            ReconcileTrigger::RelationDeparted { relation_id } => {
                write!(f, "relation-departed({relation_id})")
            }
            ReconcileTrigger::RelationBroken { relation_id } => {
                write!(f, "relation-broken({relation_id})")
            }
            ReconcileTrigger::SecretChanged { secret_id } => {
                write!(f, "secret-changed({secret_id})")
            }
            ReconcileTrigger::Install => f.write_str("install"),
            ReconcileTrigger::Start => f.write_str("start"),
            ReconcileTrigger::Stop => f.write_str("stop"),
            ReconcileTrigger::Remove => f.write_str("remove"),
            ReconcileTrigger::UpgradeCharm => f.write_str("upgrade-charm"),
            ReconcileTrigger::ConfigChanged => f.write_str("config-changed"),
            ReconcileTrigger::LeaderElected => f.write_str("leader-elected"),
            ReconcileTrigger::UpdateStatus => f.write_str("update-status"),
            ReconcileTrigger::CollectStatus => f.write_str("collect-status"),
            ReconcileTrigger::Commit => f.write_str("commit"),
        }
    }
}

/// What a dispatched trigger did
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassReport {
    pub trigger: ReconcileTrigger,
    pub reconciled: bool,
    /// Set only by [`ReconcileTrigger::CollectStatus`]
    pub status: Option<UnitStatus>,
}

/// Run one trigger against a charm
///
/// A broken relation is detached from the model first so the pass sees the
/// topology as it will be once the relation is gone.
#[instrument(skip(charm, ctx), fields(charm = charm.name(), app = %ctx.model.app_name, trigger = %trigger))]
pub fn dispatch(
    charm: &dyn Charm,
    ctx: &mut CharmContext,
    trigger: &ReconcileTrigger,
) -> Result<PassReport> {
    if let ReconcileTrigger::RelationBroken { relation_id } = trigger {
        debug!("Detaching broken relation {}", relation_id);
        ctx.model.detach(*relation_id);
    }

    if *trigger == ReconcileTrigger::CollectStatus {
        let mut statuses = StatusCollector::new();
        charm.collect_status(ctx, &mut statuses);
        let status = statuses.resolve();
        info!(
            "Unit status for {}/{}: {}",
            ctx.model.name, ctx.model.unit_name, status
        );
        return Ok(PassReport {
            trigger: trigger.clone(),
            reconciled: false,
            status: Some(status),
        });
    }

    if trigger.is_lifecycle() {
        debug!("Ignoring lifecycle trigger {}", trigger);
        return Ok(PassReport {
            trigger: trigger.clone(),
            reconciled: false,
            status: None,
        });
    }

    if let Err(e) = charm.reconcile(ctx) {
        warn!(
            "Reconcile of {}/{} failed (retriable: {}): {}",
            ctx.model.name,
            ctx.model.app_name,
            e.is_retriable(),
            e
        );
        return Err(e);
    }
    Ok(PassReport {
        trigger: trigger.clone(),
        reconciled: true,
        status: None,
    })
}
