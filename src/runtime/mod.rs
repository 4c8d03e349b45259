//! Kubernetes-backed host for one charm unit
//!
//! Loads a fresh model per trigger, dispatches it to the charm, then commits
//! data bags and unit state, announces ports and publishes the unit status.

pub mod events;
pub mod leader;
pub mod store;

use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use kube::runtime::{watcher, WatchStreamExt};
use kube::Client;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::charm::{Charm, CharmContext, CharmKind};
use crate::config::CharmConfig;
use crate::controller::resources::LABEL_KIND;
use crate::controller::{dispatch, ReconcileTrigger};
use crate::error::Result;
use crate::workload::LocalContainer;

pub use events::TriggerMapper;
pub use leader::{LeaderElector, LeadershipEdge};
pub use store::{integrate, KubeModelStore, RelationEnd};

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub charm: CharmKind,
    pub app: String,
    /// Model name and Kubernetes namespace
    pub namespace: String,
    pub unit: String,
    /// Each container's filesystem is mounted at `<root>/<container>`
    pub workload_root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub update_status_interval: Duration,
}

pub struct Operator {
    charm: Box<dyn Charm>,
    store: KubeModelStore,
    leader: LeaderElector,
    options: RunOptions,
}

impl Operator {
    pub fn new(client: Client, identity: &str, options: RunOptions) -> Self {
        Self {
            charm: options.charm.build(),
            store: KubeModelStore::new(client.clone(), &options.namespace, &options.app, &options.unit),
            leader: LeaderElector::new(client, &options.namespace, &options.app, identity),
            options,
        }
    }

    fn context(&self, model: crate::model::Model) -> CharmContext {
        let mut ctx = CharmContext::new(model);
        for name in self.charm.containers() {
            let root = self.options.workload_root.join(name);
            ctx = ctx.with_container(LocalContainer::new(name, root));
        }
        ctx
    }

    /// One reconcile pass followed by status collection
    #[instrument(skip(self), fields(app = %self.options.app, trigger = %trigger))]
    pub async fn handle(&self, trigger: ReconcileTrigger) -> Result<()> {
        let config = CharmConfig::load(self.options.config_path.as_deref())?;
        let model = self.store.load(config, self.leader.is_leader()).await?;
        let mut ctx = self.context(model);

        let report = dispatch(self.charm.as_ref(), &mut ctx, &trigger)?;
        if report.reconciled {
            self.store.commit(&ctx.model).await?;
            if let Some(ports) = &ctx.opened_ports {
                self.store.open_ports(ports).await?;
            }
        }

        let report = dispatch(self.charm.as_ref(), &mut ctx, &ReconcileTrigger::CollectStatus)?;
        if let Some(status) = report.status {
            self.store
                .publish_status(&status, ctx.workload_version.as_deref())
                .await?;
        }
        Ok(())
    }

    async fn handle_logged(&self, trigger: ReconcileTrigger) {
        if let Err(e) = self.handle(trigger.clone()).await {
            error!(
                "Pass for {} failed (retriable: {}): {}",
                trigger,
                e.is_retriable(),
                e
            );
        }
    }

    /// Run until interrupted
    pub async fn run(self, client: Client) -> Result<()> {
        info!(
            "Starting {} charm for {}/{} in {}",
            self.charm.name(),
            self.options.app,
            self.options.unit,
            self.options.namespace
        );

        let election = tokio::spawn(self.leader.clone().run());

        for trigger in [ReconcileTrigger::Install, ReconcileTrigger::Start] {
            self.handle_logged(trigger).await;
        }

        let config_maps: Api<ConfigMap> = Api::namespaced(client, &self.options.namespace);
        let selector = format!("{LABEL_KIND}={}", store::KIND_RELATION);
        let mut relation_events =
            watcher(config_maps, watcher::Config::default().labels(&selector))
                .default_backoff()
                .boxed();
        let mut mapper = TriggerMapper::new(&self.options.app);

        let mut update_status = tokio::time::interval(self.options.update_status_interval);
        update_status.tick().await;

        let mut leadership = tokio::time::interval(leader::LEADERSHIP_POLL_INTERVAL);
        leadership.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut edge = LeadershipEdge::default();

        loop {
            let trigger = tokio::select! {
                event = relation_events.next() => match event {
                    Some(Ok(event)) => mapper.map(event),
                    Some(Err(e)) => {
                        warn!("Relation watch error: {}", e);
                        None
                    }
                    None => {
                        warn!("Relation watch stream ended");
                        break;
                    }
                },
                _ = leadership.tick() => {
                    edge.observe(self.leader.is_leader())
                        .then_some(ReconcileTrigger::LeaderElected)
                }
                _ = update_status.tick() => Some(ReconcileTrigger::UpdateStatus),
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            };

            match trigger {
                Some(trigger) => self.handle_logged(trigger).await,
                None => debug!("No pass needed"),
            }
        }

        self.handle_logged(ReconcileTrigger::Stop).await;
        election.abort();
        Ok(())
    }
}
