//! `traefik_route`: ingress for the chaoscenter frontend
//!
//! The leader hands Traefik a static entrypoint and a dynamic router/service
//! config. Traefik answers with the externally reachable host and scheme.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::controller::collector::collect;
use crate::error::{Error, Result};
use crate::model::{DatabagEncoding, Model};

pub const INGRESS: &str = "ingress";

/// `(entrypoint name, port)` pairs routed through Traefik
pub const ENTRYPOINTS: &[(&str, u16)] = &[("litmus-chaoscenter", 8185)];

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct IngressConfig {
    pub external_host: String,
    pub scheme: String,
}

impl IngressConfig {
    /// Ingressed URL of `port`, e.g. `http://1.2.3.4:8185`
    pub fn external_url(&self, port: u16) -> Result<Url> {
        let raw = format!("{}://{}:{}", self.scheme, self.external_host, port);
        Url::parse(&raw).map_err(|e| Error::ValidationError(format!("invalid ingress url {raw}: {e}")))
    }
}

pub fn ingress_config(model: &Model) -> Option<IngressConfig> {
    collect(model, INGRESS, DatabagEncoding::Json)
}

#[derive(Debug, Serialize)]
struct EntryPoint {
    address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StaticConfig {
    entry_points: BTreeMap<String, EntryPoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Router {
    entry_points: Vec<String>,
    service: String,
    rule: String,
}

#[derive(Debug, Serialize)]
struct Server {
    url: String,
}

#[derive(Debug, Serialize)]
struct LoadBalancer {
    servers: Vec<Server>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpService {
    load_balancer: LoadBalancer,
}

#[derive(Debug, Serialize)]
struct HttpConfig {
    routers: BTreeMap<String, Router>,
    services: BTreeMap<String, HttpService>,
}

#[derive(Debug, Serialize)]
struct DynamicConfig {
    http: HttpConfig,
}

/// Traefik static configuration: one entrypoint per routed port
pub fn static_config() -> Result<String> {
    let entry_points = ENTRYPOINTS
        .iter()
        .map(|(name, port)| {
            (
                name.to_string(),
                EntryPoint {
                    address: format!(":{port}"),
                },
            )
        })
        .collect();
    Ok(serde_yaml::to_string(&StaticConfig { entry_points })?)
}

/// Traefik dynamic configuration routing every entrypoint to `host`
pub fn dynamic_config(model_name: &str, app_name: &str, host: &str, tls: bool) -> Result<String> {
    let scheme = if tls { "https" } else { "http" };
    let mut routers = BTreeMap::new();
    let mut services = BTreeMap::new();
    for (name, port) in ENTRYPOINTS {
        let service = format!("juju-{model_name}-{app_name}-service-{name}");
        routers.insert(
            format!("juju-{model_name}-{app_name}-{name}"),
            Router {
                entry_points: vec![name.to_string()],
                service: service.clone(),
                rule: "ClientIP(`0.0.0.0/0`)".to_string(),
            },
        );
        services.insert(
            service,
            HttpService {
                load_balancer: LoadBalancer {
                    servers: vec![Server {
                        url: format!("{scheme}://{host}:{port}"),
                    }],
                },
            },
        );
    }
    Ok(serde_yaml::to_string(&DynamicConfig {
        http: HttpConfig { routers, services },
    })?)
}

/// Publish both configs on every ingress relation; leader only
pub fn publish_routes(model: &mut Model, tls: bool) -> Result<()> {
    if !model.is_related(INGRESS) {
        return Ok(());
    }
    let static_yaml = static_config()?;
    let dynamic_yaml = dynamic_config(&model.name, &model.app_name, &model.app_hostname(), tls)?;
    for relation in model.relations_mut(INGRESS) {
        relation
            .local_app_data
            .insert("static".to_string(), static_yaml.clone());
        relation
            .local_app_data
            .insert("config".to_string(), dynamic_yaml.clone());
        debug!("Published traefik route on relation {}", relation.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::databag;

    #[test]
    fn test_external_url_from_provider_data() {
        let mut model = Model::new("test", "litmus-chaoscenter");
        model.relate(
            INGRESS,
            Some(databag([("external_host", "\"1.2.3.4\""), ("scheme", "\"http\"")])),
        );
        let ingress = ingress_config(&model).unwrap();
        assert_eq!(ingress.external_url(8185).unwrap().as_str(), "http://1.2.3.4:8185/");
    }

    #[test]
    fn test_static_config_declares_entrypoint() {
        let value: serde_yaml::Value = serde_yaml::from_str(&static_config().unwrap()).unwrap();
        assert_eq!(
            value["entryPoints"]["litmus-chaoscenter"]["address"].as_str(),
            Some(":8185")
        );
    }

    #[test]
    fn test_dynamic_config_scheme_follows_tls() {
        for (tls, scheme) in [(false, "http"), (true, "https")] {
            let raw = dynamic_config("test", "cc", "cc.test.svc.cluster.local", tls).unwrap();
            let value: serde_yaml::Value = serde_yaml::from_str(&raw).unwrap();
            let router = &value["http"]["routers"]["juju-test-cc-litmus-chaoscenter"];
            assert_eq!(router["service"].as_str(), Some("juju-test-cc-service-litmus-chaoscenter"));
            assert_eq!(router["rule"].as_str(), Some("ClientIP(`0.0.0.0/0`)"));
            let url = &value["http"]["services"]["juju-test-cc-service-litmus-chaoscenter"]
                ["loadBalancer"]["servers"][0]["url"];
            assert_eq!(
                url.as_str().map(str::to_string),
                Some(format!("{scheme}://cc.test.svc.cluster.local:8185"))
            );
        }
    }

    #[test]
    fn test_publish_only_with_relation() {
        let mut model = Model::new("test", "cc");
        publish_routes(&mut model, false).unwrap();
        model.relate(INGRESS, None);
        publish_routes(&mut model, false).unwrap();
        let data = &model.get_relation(INGRESS).unwrap().local_app_data;
        assert!(data.contains_key("static"));
        assert!(data.contains_key("config"));
    }
}
