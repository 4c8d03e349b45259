//! Application leadership via a coordination `Lease`
//!
//! One lease per application, named `<app>-leader`. The unit holding it is
//! the leader; the flag is sampled once at the start of each pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::{info, warn};

use crate::controller::resources::standard_labels;

pub const LEASE_DURATION_SECS: i32 = 15;
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);
/// How often the run loop samples the lease flag for a leadership gain
pub const LEADERSHIP_POLL_INTERVAL: Duration = RETRY_INTERVAL;

pub fn lease_name(app: &str) -> String {
    format!("{app}-leader")
}

/// Holder identity for this process: `HOSTNAME`, else the OS hostname
pub fn holder_identity() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "litmus-operator".to_string())
    })
}

/// Whether a lease last renewed per `spec` is free to take at `now`
pub fn lease_expired(spec: Option<&LeaseSpec>, now: DateTime<Utc>) -> bool {
    spec.and_then(|s| s.renew_time.as_ref())
        .map(|renew| {
            let duration = spec
                .and_then(|s| s.lease_duration_seconds)
                .unwrap_or(LEASE_DURATION_SECS);
            now > renew.0 + chrono::Duration::seconds(i64::from(duration))
        })
        .unwrap_or(true)
}

/// Turns sampled leadership into a one-shot gain signal
#[derive(Clone, Copy, Debug, Default)]
pub struct LeadershipEdge {
    was_leader: bool,
}

impl LeadershipEdge {
    /// True only on the sample where leadership was gained
    pub fn observe(&mut self, is_leader: bool) -> bool {
        let gained = is_leader && !self.was_leader;
        self.was_leader = is_leader;
        gained
    }
}

#[derive(Clone)]
pub struct LeaderElector {
    leases: Api<Lease>,
    namespace: String,
    app: String,
    identity: String,
    is_leader: Arc<AtomicBool>,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: &str, app: &str, identity: &str) -> Self {
        Self {
            leases: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            app: app.to_string(),
            identity: identity.to_string(),
            is_leader: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Relaxed)
    }

    /// Keep acquiring or renewing the lease until the task is dropped
    pub async fn run(self) {
        let name = lease_name(&self.app);
        loop {
            match self.try_acquire_or_renew(&name).await {
                Ok(true) => {
                    if !self.is_leader() {
                        info!("Acquired leadership for lease {}", name);
                    }
                    self.is_leader.store(true, Ordering::Relaxed);
                    tokio::time::sleep(RENEW_INTERVAL).await;
                }
                Ok(false) => {
                    if self.is_leader() {
                        warn!("Lost leadership for lease {}", name);
                    }
                    self.is_leader.store(false, Ordering::Relaxed);
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(e) => {
                    warn!("Leader election error: {:?}", e);
                    self.is_leader.store(false, Ordering::Relaxed);
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
            }
        }
    }

    async fn try_acquire_or_renew(&self, name: &str) -> Result<bool, kube::Error> {
        let now = Utc::now();

        let Some(existing) = self.leases.get_opt(name).await? else {
            let lease = Lease {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(self.namespace.clone()),
                    labels: Some(standard_labels(&self.app, "leader")),
                    ..Default::default()
                },
                spec: Some(LeaseSpec {
                    holder_identity: Some(self.identity.clone()),
                    acquire_time: Some(MicroTime(now)),
                    renew_time: Some(MicroTime(now)),
                    lease_duration_seconds: Some(LEASE_DURATION_SECS),
                    ..Default::default()
                }),
            };
            self.leases.create(&PostParams::default(), &lease).await?;
            info!("Created lease {} with holder {}", name, self.identity);
            return Ok(true);
        };

        let spec = existing.spec.as_ref();
        let current_holder = spec.and_then(|s| s.holder_identity.as_deref());

        let patch = if current_holder == Some(self.identity.as_str()) {
            serde_json::json!({
                "spec": {
                    "renewTime": MicroTime(now),
                    "leaseDurationSeconds": LEASE_DURATION_SECS,
                }
            })
        } else if lease_expired(spec, now) {
            info!("Lease held by {:?} has expired, taking over", current_holder);
            serde_json::json!({
                "spec": {
                    "holderIdentity": self.identity,
                    "acquireTime": MicroTime(now),
                    "renewTime": MicroTime(now),
                    "leaseDurationSeconds": LEASE_DURATION_SECS,
                }
            })
        } else {
            return Ok(false);
        };

        self.leases
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(renewed: DateTime<Utc>, duration: Option<i32>) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some("other".to_string()),
            renew_time: Some(MicroTime(renewed)),
            lease_duration_seconds: duration,
            ..Default::default()
        }
    }

    #[test]
    fn test_lease_name() {
        assert_eq!(lease_name("litmus-auth"), "litmus-auth-leader");
    }

    #[test]
    fn test_fresh_lease_is_held() {
        let now = Utc::now();
        assert!(!lease_expired(Some(&spec(now, Some(15))), now));
    }

    #[test]
    fn test_stale_lease_is_expired() {
        let now = Utc::now();
        let renewed = now - chrono::Duration::seconds(16);
        assert!(lease_expired(Some(&spec(renewed, Some(15))), now));
        assert!(!lease_expired(Some(&spec(renewed, Some(60))), now));
    }

    #[test]
    fn test_missing_renew_time_is_expired() {
        assert!(lease_expired(None, Utc::now()));
        assert!(lease_expired(Some(&LeaseSpec::default()), Utc::now()));
    }

    #[test]
    fn test_leadership_gain_fires_once() {
        let mut edge = LeadershipEdge::default();
        assert!(!edge.observe(false));
        assert!(edge.observe(true));
        assert!(!edge.observe(true));
        assert!(!edge.observe(false));
        assert!(edge.observe(true));
    }
}
