//! Charm model snapshot
//!
//! A [`Model`] is the integration topology and state observed for a single
//! reconcile pass. It is loaded fresh for every event and never shared
//! between passes; whatever a pass writes into it is committed back by the
//! host once the pass completes.

mod relation;

use std::collections::BTreeMap;

pub use relation::{
    databag, decode_databag, encode_databag, Databag, DatabagEncoding, Relation,
};

use crate::config::CharmConfig;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Model {
    /// Model name; doubles as the Kubernetes namespace
    pub name: String,
    pub app_name: String,
    /// Unit name, e.g. `litmus-backend/0`
    pub unit_name: String,
    /// Resolved once per pass from the leadership lease
    pub leader: bool,
    pub relations: Vec<Relation>,
    pub config: CharmConfig,
    /// Private per-unit key/value storage that survives across passes
    pub unit_state: Databag,
    /// Secrets granted to this application, by identifier
    pub secrets: BTreeMap<String, Databag>,
}

impl Model {
    pub fn new(name: &str, app_name: &str) -> Self {
        Self {
            name: name.to_string(),
            app_name: app_name.to_string(),
            unit_name: format!("{app_name}/0"),
            ..Default::default()
        }
    }

    pub fn with_leader(mut self, leader: bool) -> Self {
        self.leader = leader;
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Add a relation on `endpoint` with an id unique within this model
    pub fn relate(&mut self, endpoint: &str, remote_app_data: Option<Databag>) -> u32 {
        let id = self.relations.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let mut relation = Relation::new(id, endpoint);
        relation.remote_app_data = remote_app_data;
        self.relations.push(relation);
        id
    }

    /// All relations on `endpoint`, in id order
    pub fn relations(&self, endpoint: &str) -> impl Iterator<Item = &Relation> {
        let endpoint = endpoint.to_string();
        self.relations.iter().filter(move |r| r.endpoint == endpoint)
    }

    pub fn relations_mut(&mut self, endpoint: &str) -> impl Iterator<Item = &mut Relation> {
        let endpoint = endpoint.to_string();
        self.relations
            .iter_mut()
            .filter(move |r| r.endpoint == endpoint)
    }

    /// The first relation on a single-peer (`limit: 1`) endpoint
    pub fn get_relation(&self, endpoint: &str) -> Option<&Relation> {
        self.relations(endpoint).next()
    }

    pub fn get_relation_mut(&mut self, endpoint: &str) -> Option<&mut Relation> {
        self.relations_mut(endpoint).next()
    }

    pub fn is_related(&self, endpoint: &str) -> bool {
        self.get_relation(endpoint).is_some()
    }

    /// Drop a relation that is being torn down for the rest of the pass
    pub fn detach(&mut self, relation_id: u32) {
        self.relations.retain(|r| r.id != relation_id);
    }

    /// In-cluster DNS name of this application's service
    pub fn app_hostname(&self) -> String {
        format!("{}.{}.svc.cluster.local", self.app_name, self.name)
    }

    /// In-cluster DNS name of this unit's pod
    pub fn unit_hostname(&self) -> String {
        let unit = self.unit_name.replace('/', "-");
        format!(
            "{}.{}-endpoints.{}.svc.cluster.local",
            unit, self.app_name, self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_hostname() {
        let model = Model::new("test", "litmus-backend-k8s");
        assert_eq!(
            model.app_hostname(),
            "litmus-backend-k8s.test.svc.cluster.local"
        );
    }

    #[test]
    fn test_unit_hostname() {
        let model = Model::new("test", "litmus-auth");
        assert_eq!(
            model.unit_hostname(),
            "litmus-auth-0.litmus-auth-endpoints.test.svc.cluster.local"
        );
    }

    #[test]
    fn test_relate_assigns_unique_ids() {
        let mut model = Model::new("test", "app");
        let a = model.relate("database", None);
        let b = model.relate("litmus-auth", None);
        assert_ne!(a, b);
        assert!(model.is_related("database"));
        model.detach(a);
        assert!(!model.is_related("database"));
    }

    #[test]
    fn test_relations_filter_by_endpoint() {
        let mut model = Model::new("test", "app");
        let first = model.relate("logging", None);
        model.relate("database", None);
        let second = model.relate("logging", None);
        let ids: Vec<u32> = model.relations("logging").map(|r| r.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(model.get_relation("database").map(|r| r.endpoint.as_str()), Some("database"));
    }
}
