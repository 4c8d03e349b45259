//! Model snapshots backed by ConfigMaps and Secrets
//!
//! Each side of a relation is one ConfigMap, named
//! `<app>-<endpoint>-<remote app>` and labelled with the owning app. Its
//! `app.<key>` entries are the owner's app data bag and
//! `unit.<unit>.<key>` entries its units' data bags (the `/` in unit names
//! becomes `_`). The remote side of one of our relations is the peer's
//! ConfigMap for the same relation.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::{ConfigMap, Event, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use tracing::{debug, info, instrument, warn};

use crate::charm::user_manager::SECRET_PREFIX;
use crate::config::CharmConfig;
use crate::controller::resources::{
    self, build_status_config_map, previous_conditions, standard_labels, status_config_map_name,
    FIELD_MANAGER, LABEL_APP, LABEL_ENDPOINT, LABEL_KIND,
};
use crate::controller::UnitStatus;
use crate::error::{Error, Result};
use crate::model::{Databag, Model, Relation};

pub const KIND_RELATION: &str = "relation";
pub const ANNOTATION_REMOTE_APP: &str = "litmus.chaos/remote-app";
pub const ANNOTATION_REMOTE_ENDPOINT: &str = "litmus.chaos/remote-endpoint";
pub const ANNOTATION_RELATION_ID: &str = "litmus.chaos/relation-id";

const APP_PREFIX: &str = "app.";
const UNIT_PREFIX: &str = "unit.";

/// One side of a relation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationEnd {
    pub app: String,
    pub endpoint: String,
}

impl RelationEnd {
    pub fn new(app: &str, endpoint: &str) -> Self {
        Self {
            app: app.to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    /// Parse `app:endpoint`
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.split_once(':') {
            Some((app, endpoint)) if !app.is_empty() && !endpoint.is_empty() => {
                Ok(Self::new(app, endpoint))
            }
            _ => Err(Error::ConfigError(format!(
                "invalid relation end '{raw}', expected <app>:<endpoint>"
            ))),
        }
    }
}

pub fn relation_config_map_name(app: &str, endpoint: &str, remote_app: &str) -> String {
    format!("{app}-{endpoint}-{remote_app}")
}

pub fn unit_state_secret_name(app: &str, unit: &str) -> String {
    format!("{app}-{}-state", unit.replace('/', "-"))
}

fn unit_key_prefix(unit: &str) -> String {
    format!("{UNIT_PREFIX}{}.", unit.replace('/', "_"))
}

fn annotation<'a>(cm: &'a ConfigMap, key: &str) -> Option<&'a str> {
    cm.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

fn label<'a>(cm: &'a ConfigMap, key: &str) -> Option<&'a str> {
    cm.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(key))
        .map(String::as_str)
}

pub fn relation_id(cm: &ConfigMap) -> Option<u32> {
    annotation(cm, ANNOTATION_RELATION_ID).and_then(|id| id.parse().ok())
}

/// App that owns a relation ConfigMap
pub fn owner_app(cm: &ConfigMap) -> Option<&str> {
    label(cm, LABEL_APP)
}

pub fn remote_app(cm: &ConfigMap) -> Option<&str> {
    annotation(cm, ANNOTATION_REMOTE_APP)
}

/// Split ConfigMap data into the app bag and per-unit bags
pub fn split_data(data: &BTreeMap<String, String>) -> (Databag, BTreeMap<String, Databag>) {
    let mut app = Databag::new();
    let mut units: BTreeMap<String, Databag> = BTreeMap::new();
    for (key, value) in data {
        if let Some(key) = key.strip_prefix(APP_PREFIX) {
            app.insert(key.to_string(), value.clone());
        } else if let Some((unit, key)) = key
            .strip_prefix(UNIT_PREFIX)
            .and_then(|rest| rest.split_once('.'))
        {
            units
                .entry(unit.replace('_', "/"))
                .or_default()
                .insert(key.to_string(), value.clone());
        }
    }
    (app, units)
}

/// Rewrite the entries this unit owns, leaving the rest untouched
///
/// `app_data` is `None` for non-leaders, which may not write the app bag.
pub fn merge_local(
    existing: &BTreeMap<String, String>,
    app_data: Option<&Databag>,
    unit: &str,
    unit_data: &Databag,
) -> BTreeMap<String, String> {
    let unit_prefix = unit_key_prefix(unit);
    let mut data: BTreeMap<String, String> = existing
        .iter()
        .filter(|(key, _)| !key.starts_with(&unit_prefix))
        .filter(|(key, _)| app_data.is_none() || !key.starts_with(APP_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Some(app_data) = app_data {
        for (key, value) in app_data {
            data.insert(format!("{APP_PREFIX}{key}"), value.clone());
        }
    }
    for (key, value) in unit_data {
        data.insert(format!("{unit_prefix}{key}"), value.clone());
    }
    data
}

/// Build our view of a relation from both sides' ConfigMaps
pub fn relation_from_config_maps(
    local: &ConfigMap,
    remote: Option<&ConfigMap>,
    unit: &str,
) -> Option<Relation> {
    let id = relation_id(local)?;
    let endpoint = label(local, LABEL_ENDPOINT)?;
    let mut relation = Relation::new(id, endpoint);
    relation.remote_app = remote_app(local).map(str::to_string);

    let empty = BTreeMap::new();
    let (local_app, mut local_units) = split_data(local.data.as_ref().unwrap_or(&empty));
    relation.local_app_data = local_app;
    relation.local_unit_data = local_units.remove(unit).unwrap_or_default();

    if let Some(remote) = remote {
        let (remote_app, remote_units) = split_data(remote.data.as_ref().unwrap_or(&empty));
        relation.remote_app_data = Some(remote_app);
        relation.remote_units_data = remote_units;
    }
    Some(relation)
}

fn relation_config_map(
    namespace: &str,
    local: &RelationEnd,
    remote: &RelationEnd,
    id: u32,
) -> ConfigMap {
    let mut labels = standard_labels(&local.app, KIND_RELATION);
    labels.insert(LABEL_ENDPOINT.to_string(), local.endpoint.clone());
    labels.insert(LABEL_KIND.to_string(), KIND_RELATION.to_string());

    let annotations = BTreeMap::from([
        (ANNOTATION_REMOTE_APP.to_string(), remote.app.clone()),
        (ANNOTATION_REMOTE_ENDPOINT.to_string(), remote.endpoint.clone()),
        (ANNOTATION_RELATION_ID.to_string(), id.to_string()),
    ]);

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(relation_config_map_name(
                &local.app,
                &local.endpoint,
                &remote.app,
            )),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn relation_selector() -> String {
    format!("{LABEL_KIND}={KIND_RELATION}")
}

fn secret_to_databag(secret: &Secret) -> Databag {
    secret
        .data
        .iter()
        .flatten()
        .filter_map(|(key, value)| match String::from_utf8(value.0.clone()) {
            Ok(value) => Some((key.clone(), value)),
            Err(_) => {
                debug!("Skipping non UTF-8 secret key {}", key);
                None
            }
        })
        .collect()
}

/// Relate two applications by creating both sides' ConfigMaps
///
/// Returns the relation id; integrating an existing pair is a no-op.
#[instrument(skip(client))]
pub async fn integrate(
    client: &Client,
    namespace: &str,
    a: &RelationEnd,
    b: &RelationEnd,
) -> Result<u32> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);

    let existing = api
        .get_opt(&relation_config_map_name(&a.app, &a.endpoint, &b.app))
        .await?;
    if let Some(id) = existing.as_ref().and_then(relation_id) {
        info!("{}:{} and {}:{} already related as {}", a.app, a.endpoint, b.app, b.endpoint, id);
        return Ok(id);
    }

    let all = api
        .list(&ListParams::default().labels(&relation_selector()))
        .await?;
    let id = all.items.iter().filter_map(relation_id).max().unwrap_or(0) + 1;

    for (local, remote) in [(a, b), (b, a)] {
        let cm = relation_config_map(namespace, local, remote, id);
        let name = relation_config_map_name(&local.app, &local.endpoint, &remote.app);
        api.patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&cm))
            .await?;
    }
    info!("Related {}:{} and {}:{} as {}", a.app, a.endpoint, b.app, b.endpoint, id);
    Ok(id)
}

/// Loads and commits one unit's model
pub struct KubeModelStore {
    client: Client,
    namespace: String,
    app: String,
    unit: String,
}

impl KubeModelStore {
    pub fn new(client: Client, namespace: &str, app: &str, unit: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            app: app.to_string(),
            unit: unit.to_string(),
        }
    }

    fn config_maps(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn secrets(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    #[instrument(skip(self, config), fields(app = %self.app, unit = %self.unit))]
    pub async fn load(&self, config: CharmConfig, leader: bool) -> Result<Model> {
        let mut model = Model::new(&self.namespace, &self.app).with_leader(leader);
        model.unit_name = self.unit.clone();

        let api = self.config_maps();
        let selector = format!("{},{LABEL_APP}={}", relation_selector(), self.app);
        let ours = api.list(&ListParams::default().labels(&selector)).await?;
        for local in &ours.items {
            let remote = match (remote_app(local), annotation(local, ANNOTATION_REMOTE_ENDPOINT)) {
                (Some(app), Some(endpoint)) => {
                    api.get_opt(&relation_config_map_name(app, endpoint, &self.app))
                        .await?
                }
                _ => None,
            };
            match relation_from_config_maps(local, remote.as_ref(), &self.unit) {
                Some(relation) => model.relations.push(relation),
                None => warn!(
                    "Ignoring malformed relation ConfigMap {:?}",
                    local.metadata.name
                ),
            }
        }
        model.relations.sort_by_key(|r| r.id);

        let secrets = self.secrets();
        if let Some(state) = secrets
            .get_opt(&unit_state_secret_name(&self.app, &self.unit))
            .await?
        {
            model.unit_state = secret_to_databag(&state);
        }

        if let Some(secret_id) = config.user_secret_id.as_deref() {
            if let Some(name) = secret_id.strip_prefix(SECRET_PREFIX) {
                if let Some(secret) = secrets.get_opt(name).await? {
                    model
                        .secrets
                        .insert(secret_id.to_string(), secret_to_databag(&secret));
                }
            }
        }
        model.config = config;

        debug!("Loaded model with {} relations", model.relations.len());
        Ok(model)
    }

    /// Write back what the pass put in our data bags and unit state
    #[instrument(skip(self, model), fields(app = %self.app, unit = %self.unit))]
    pub async fn commit(&self, model: &Model) -> Result<()> {
        let api = self.config_maps();
        for relation in &model.relations {
            let Some(remote) = relation.remote_app.as_deref() else {
                continue;
            };
            let name = relation_config_map_name(&self.app, &relation.endpoint, remote);
            let Some(mut cm) = api.get_opt(&name).await? else {
                debug!("Relation ConfigMap {} is gone; skipping", name);
                continue;
            };
            let existing = cm.data.clone().unwrap_or_default();
            let data = merge_local(
                &existing,
                model.leader.then_some(&relation.local_app_data),
                &self.unit,
                &relation.local_unit_data,
            );
            if data == existing {
                continue;
            }
            cm.data = Some(data);
            api.replace(&name, &PostParams::default(), &cm).await?;
            debug!("Updated data bags in {}", name);
        }

        let name = unit_state_secret_name(&self.app, &self.unit);
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(standard_labels(&self.app, "state")),
                ..Default::default()
            },
            string_data: Some(model.unit_state.clone()),
            ..Default::default()
        };
        self.secrets()
            .patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&secret))
            .await?;
        Ok(())
    }

    pub async fn open_ports(&self, ports: &BTreeSet<u16>) -> Result<()> {
        resources::ensure_service(&self.client, &self.namespace, &self.app, ports).await
    }

    /// Publish the unit status; emits an Event when the level changes
    #[instrument(skip(self, status), fields(app = %self.app, status = %status))]
    pub async fn publish_status(
        &self,
        status: &UnitStatus,
        workload_version: Option<&str>,
    ) -> Result<()> {
        let api = self.config_maps();
        let name = status_config_map_name(&self.app);
        let previous = api.get_opt(&name).await?;
        let previous_level = previous
            .as_ref()
            .and_then(|cm| cm.data.as_ref())
            .and_then(|d| d.get("status").cloned());

        let cm = build_status_config_map(
            &self.namespace,
            &self.app,
            &self.unit,
            status,
            workload_version,
            previous.as_ref().map(previous_conditions).unwrap_or_default(),
        )?;
        let applied = api
            .patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&cm))
            .await?;

        if previous_level.as_deref() != Some(status.level.to_string().as_str()) {
            if let Err(e) = self.emit_event(&applied, status).await {
                warn!("Failed to emit status event: {}", e);
            }
        }
        Ok(())
    }

    async fn emit_event(&self, status_map: &ConfigMap, status: &UnitStatus) -> Result<()> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), &self.namespace);
        let time = chrono::Utc::now();
        let event_type = match status.level {
            crate::controller::StatusLevel::Active => "Normal",
            _ => "Warning",
        };
        let event = Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-status-", self.app)),
                ..Default::default()
            },
            type_: Some(event_type.to_string()),
            reason: Some(format!("Unit{}", capitalize(&status.level.to_string()))),
            message: Some(status.message.clone()),
            involved_object: status_map.object_ref(&()),
            first_timestamp: Some(Time(time)),
            last_timestamp: Some(Time(time)),
            count: Some(1),
            ..Default::default()
        };
        events.create(&PostParams::default(), &event).await?;
        Ok(())
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_names() {
        assert_eq!(
            relation_config_map_name("litmus-auth", "database", "mongodb"),
            "litmus-auth-database-mongodb"
        );
        assert_eq!(
            unit_state_secret_name("litmus-auth", "litmus-auth/0"),
            "litmus-auth-litmus-auth-0-state"
        );
    }

    #[test]
    fn test_relation_end_parse() {
        let end = RelationEnd::parse("litmus-auth:litmus-auth").unwrap();
        assert_eq!(end, RelationEnd::new("litmus-auth", "litmus-auth"));
        assert!(RelationEnd::parse("litmus-auth").is_err());
        assert!(RelationEnd::parse(":database").is_err());
    }

    #[test]
    fn test_split_data() {
        let (app, units) = split_data(&data(&[
            ("app.endpoint", "\"http://x\""),
            ("unit.mongodb_0.address", "10.0.0.1"),
            ("unit.mongodb_1.address", "10.0.0.2"),
            ("stray", "ignored"),
        ]));
        assert_eq!(app["endpoint"], "\"http://x\"");
        assert_eq!(units.len(), 2);
        assert_eq!(units["mongodb/1"]["address"], "10.0.0.2");
    }

    #[test]
    fn test_merge_local_as_leader_replaces_app_and_own_unit() {
        let existing = data(&[
            ("app.stale", "1"),
            ("unit.litmus-auth_0.old", "x"),
            ("unit.litmus-auth_1.peer", "y"),
        ]);
        let app = data(&[("version", "0")]);
        let unit = data(&[("csr", "pem")]);
        let merged = merge_local(&existing, Some(&app), "litmus-auth/0", &unit);
        assert_eq!(
            merged,
            data(&[
                ("app.version", "0"),
                ("unit.litmus-auth_0.csr", "pem"),
                ("unit.litmus-auth_1.peer", "y"),
            ])
        );
    }

    #[test]
    fn test_merge_local_as_follower_keeps_app_data() {
        let existing = data(&[("app.version", "0")]);
        let merged = merge_local(&existing, None, "litmus-auth/1", &Databag::new());
        assert_eq!(merged, existing);
    }

    #[test]
    fn test_relation_from_both_sides() {
        let ours = RelationEnd::new("litmus-backend", "litmus-auth");
        let theirs = RelationEnd::new("litmus-auth", "litmus-auth");
        let mut local = relation_config_map("test", &ours, &theirs, 7);
        local.data = Some(data(&[("app.version", "0"), ("unit.litmus-backend_0.k", "v")]));
        let mut remote = relation_config_map("test", &theirs, &ours, 7);
        remote.data = Some(data(&[("app.insecure", "true")]));

        let relation = relation_from_config_maps(&local, Some(&remote), "litmus-backend/0").unwrap();
        assert_eq!(relation.id, 7);
        assert_eq!(relation.endpoint, "litmus-auth");
        assert_eq!(relation.remote_app.as_deref(), Some("litmus-auth"));
        assert_eq!(relation.local_app_data["version"], "0");
        assert_eq!(relation.local_unit_data["k"], "v");
        assert_eq!(relation.remote_data().unwrap()["insecure"], "true");
    }

    #[test]
    fn test_relation_without_peer_side_has_no_remote_data() {
        let ours = RelationEnd::new("litmus-auth", "database");
        let theirs = RelationEnd::new("mongodb", "database");
        let local = relation_config_map("test", &ours, &theirs, 1);
        let relation = relation_from_config_maps(&local, None, "litmus-auth/0").unwrap();
        assert!(relation.remote_app_data.is_none());
        assert!(relation.remote_data().is_none());
    }

    #[test]
    fn test_relation_config_map_metadata() {
        let cm = relation_config_map(
            "test",
            &RelationEnd::new("litmus-auth", "database"),
            &RelationEnd::new("mongodb", "database"),
            3,
        );
        assert_eq!(cm.metadata.name.as_deref(), Some("litmus-auth-database-mongodb"));
        assert_eq!(owner_app(&cm), Some("litmus-auth"));
        assert_eq!(remote_app(&cm), Some("mongodb"));
        assert_eq!(relation_id(&cm), Some(3));
        assert_eq!(label(&cm, LABEL_KIND), Some(KIND_RELATION));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("blocked"), "Blocked");
        assert_eq!(capitalize(""), "");
    }
}
