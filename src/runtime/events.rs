//! Relation ConfigMap watch events to reconcile triggers

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::watcher;
use tracing::trace;

use super::store::{owner_app, relation_id, remote_app};
use crate::controller::ReconcileTrigger;

/// Stateful mapper for one application's view of the relation ConfigMaps
///
/// Our own ConfigMaps appearing or disappearing create or break relations;
/// any change to a peer's side is a change of the relation.
#[derive(Debug)]
pub struct TriggerMapper {
    app: String,
    known: BTreeSet<u32>,
}

enum Side {
    Ours,
    Theirs,
}

impl TriggerMapper {
    pub fn new(app: &str) -> Self {
        Self {
            app: app.to_string(),
            known: BTreeSet::new(),
        }
    }

    fn side(&self, cm: &ConfigMap) -> Option<(Side, u32)> {
        let id = relation_id(cm)?;
        if owner_app(cm) == Some(self.app.as_str()) {
            Some((Side::Ours, id))
        } else if remote_app(cm) == Some(self.app.as_str()) {
            Some((Side::Theirs, id))
        } else {
            None
        }
    }

    pub fn map(&mut self, event: watcher::Event<ConfigMap>) -> Option<ReconcileTrigger> {
        match event {
            watcher::Event::Init | watcher::Event::InitDone => None,
            // the initial listing is covered by the startup pass
            watcher::Event::InitApply(cm) => {
                if let Some((Side::Ours, id)) = self.side(&cm) {
                    self.known.insert(id);
                }
                None
            }
            watcher::Event::Apply(cm) => match self.side(&cm)? {
                (Side::Ours, id) => self
                    .known
                    .insert(id)
                    .then_some(ReconcileTrigger::RelationCreated { relation_id: id }),
                (Side::Theirs, id) => Some(ReconcileTrigger::RelationChanged { relation_id: id }),
            },
            watcher::Event::Delete(cm) => match self.side(&cm)? {
                (Side::Ours, id) => {
                    self.known.remove(&id);
                    Some(ReconcileTrigger::RelationBroken { relation_id: id })
                }
                (Side::Theirs, id) => {
                    trace!("Peer side of relation {} removed", id);
                    Some(ReconcileTrigger::RelationDeparted { relation_id: id })
                }
            },
        }
    }
}
