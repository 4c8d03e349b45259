//! Chaos infrastructure charm
//!
//! Deploys nothing of its own yet; it only reports itself ready.

use super::{Charm, CharmContext};
use crate::controller::status::{StatusCollector, UnitStatus};
use crate::error::Result;

#[derive(Clone, Copy, Debug, Default)]
pub struct InfrastructureCharm;

impl Charm for InfrastructureCharm {
    fn name(&self) -> &'static str {
        "infrastructure"
    }

    fn containers(&self) -> &'static [&'static str] {
        &[]
    }

    fn reconcile(&self, _ctx: &mut CharmContext) -> Result<()> {
        Ok(())
    }

    fn collect_status(&self, _ctx: &CharmContext, statuses: &mut StatusCollector) {
        statuses.add(UnitStatus::active(""));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::StatusLevel;
    use crate::model::Model;

    #[test]
    fn test_always_active() {
        let mut ctx = CharmContext::new(Model::new("test", "litmus-infrastructure"));
        InfrastructureCharm.reconcile(&mut ctx).unwrap();
        let mut statuses = StatusCollector::new();
        InfrastructureCharm.collect_status(&ctx, &mut statuses);
        assert_eq!(statuses.resolve().level, StatusLevel::Active);
        assert!(ctx.opened_ports.is_none());
    }
}
