//! Tests for reconcile dispatch
//!
//! These tests verify that:
//! - Every non-lifecycle trigger runs exactly one reconcile pass
//! - Status collection never reconciles
//! - Broken relations are gone before the pass runs

#[cfg(test)]
mod tests {
    use super::super::reconciler::*;
    use super::super::status::{StatusCollector, UnitStatus};
    use crate::charm::{Charm, CharmContext};
    use crate::error::{Error, Result};
    use crate::model::Model;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCharm {
        passes: AtomicUsize,
        fail: bool,
    }

    impl Charm for CountingCharm {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn containers(&self) -> &'static [&'static str] {
            &[]
        }

        fn reconcile(&self, ctx: &mut CharmContext) -> Result<()> {
            self.passes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::WorkloadError("unreachable".to_string()));
            }
            ctx.set_ports(&[ctx.model.relations.len() as u16]);
            Ok(())
        }

        fn collect_status(&self, ctx: &CharmContext, statuses: &mut StatusCollector) {
            if !ctx.model.is_related("database") {
                statuses.add(UnitStatus::blocked("Missing [database] integration(s)."));
            }
            statuses.add(UnitStatus::active(""));
        }
    }

    fn all_reconciling_triggers() -> Vec<ReconcileTrigger> {
        vec![
            ReconcileTrigger::Install,
            ReconcileTrigger::Start,
            ReconcileTrigger::Stop,
            ReconcileTrigger::Remove,
            ReconcileTrigger::UpgradeCharm,
            ReconcileTrigger::ConfigChanged,
            ReconcileTrigger::LeaderElected,
            ReconcileTrigger::UpdateStatus,
            ReconcileTrigger::WorkloadReady {
                container: "backend".to_string(),
            },
            ReconcileTrigger::RelationCreated { relation_id: 1 },
            ReconcileTrigger::RelationChanged { relation_id: 1 },
            ReconcileTrigger::RelationDeparted { relation_id: 1 },
            ReconcileTrigger::SecretChanged {
                secret_id: "secret:x".to_string(),
            },
        ]
    }

    #[test]
    fn test_every_event_trigger_reconciles_once() {
        let charm = CountingCharm::default();
        for trigger in all_reconciling_triggers() {
            let mut ctx = CharmContext::new(Model::new("test", "app"));
            let report = dispatch(&charm, &mut ctx, &trigger).unwrap();
            assert!(report.reconciled, "{trigger} should reconcile");
            assert!(report.status.is_none());
        }
        assert_eq!(
            charm.passes.load(Ordering::SeqCst),
            all_reconciling_triggers().len()
        );
    }

    #[test]
    fn test_lifecycle_triggers_do_not_reconcile() {
        let charm = CountingCharm::default();
        let mut ctx = CharmContext::new(Model::new("test", "app"));
        let report = dispatch(&charm, &mut ctx, &ReconcileTrigger::Commit).unwrap();
        assert!(!report.reconciled);
        let report = dispatch(&charm, &mut ctx, &ReconcileTrigger::CollectStatus).unwrap();
        assert!(!report.reconciled);
        assert_eq!(charm.passes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_collect_status_resolves_one_status() {
        let charm = CountingCharm::default();
        let mut ctx = CharmContext::new(Model::new("test", "app"));
        let report = dispatch(&charm, &mut ctx, &ReconcileTrigger::CollectStatus).unwrap();
        assert_eq!(
            report.status,
            Some(UnitStatus::blocked("Missing [database] integration(s)."))
        );
    }

    #[test]
    fn test_relation_broken_detaches_before_reconcile() {
        let charm = CountingCharm::default();
        let mut model = Model::new("test", "app");
        let id = model.relate("database", None);
        model.relate("litmus-auth", None);
        let mut ctx = CharmContext::new(model);

        dispatch(
            &charm,
            &mut ctx,
            &ReconcileTrigger::RelationBroken { relation_id: id },
        )
        .unwrap();
        assert!(!ctx.model.is_related("database"));
        assert_eq!(ctx.opened_ports, Some([1u16].into_iter().collect()));
    }

    #[test]
    fn test_reconcile_errors_propagate() {
        let charm = CountingCharm {
            fail: true,
            ..Default::default()
        };
        let mut ctx = CharmContext::new(Model::new("test", "app"));
        let err = dispatch(&charm, &mut ctx, &ReconcileTrigger::UpdateStatus).unwrap_err();
        assert!(err.is_retriable());
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(ReconcileTrigger::UpdateStatus.to_string(), "update-status");
        assert_eq!(
            ReconcileTrigger::RelationChanged { relation_id: 7 }.to_string(),
            "relation-changed(7)"
        );
    }
}
