//! Self-monitoring integrations shared by every Litmus component
//!
//! * `workload-tracing` (tracing): ask for receivers, read their URLs
//! * `logging` (loki_push_api): turn push endpoints into supervisor log targets
//! * `metrics-endpoint` (prometheus_scrape): advertise scrape jobs

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::controller::collector::{collect_relation, collect_units};
use crate::error::Result;
use crate::model::{DatabagEncoding, Model};
use crate::workload::{LogTarget, Override};

pub const WORKLOAD_TRACING: &str = "workload-tracing";
pub const LOGGING: &str = "logging";
pub const METRICS_ENDPOINT: &str = "metrics-endpoint";

/// Receiver protocols known to the tracing interface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverProtocol {
    OtlpHttp,
    OtlpGrpc,
    Zipkin,
    JaegerThriftHttp,
    JaegerGrpc,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct ProtocolType {
    name: ReceiverProtocol,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct Receiver {
    protocol: ProtocolType,
    url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct TracingProviderData {
    receivers: Vec<Receiver>,
}

/// Ask the tracing backend to open `protocols`; leader only
pub fn request_receivers(model: &mut Model, protocols: &[ReceiverProtocol]) -> Result<()> {
    let encoded = serde_json::to_string(protocols)?;
    for relation in model.relations_mut(WORKLOAD_TRACING) {
        relation
            .local_app_data
            .insert("receivers".to_string(), encoded.clone());
    }
    Ok(())
}

/// URL of the first receiver speaking `protocol`, across all tracing relations
pub fn tracing_endpoint(model: &Model, protocol: ReceiverProtocol) -> Option<String> {
    model
        .relations(WORKLOAD_TRACING)
        .filter_map(|relation| {
            collect_relation::<TracingProviderData>(relation, DatabagEncoding::Json)
        })
        .flat_map(|data| data.receivers)
        .find(|receiver| receiver.protocol.name == protocol)
        .map(|receiver| receiver.url)
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct LokiEndpoint {
    url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct LokiUnitData {
    endpoint: LokiEndpoint,
}

/// Distinct Loki push endpoints published by the remote units, in unit order
pub fn loki_endpoints(model: &Model) -> Vec<String> {
    let mut seen = BTreeSet::new();
    collect_units::<LokiUnitData>(model, LOGGING, DatabagEncoding::Json)
        .into_iter()
        .map(|data| data.endpoint.url)
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Supervisor log targets forwarding every service to every Loki endpoint
pub fn log_targets(model: &Model) -> BTreeMap<String, LogTarget> {
    loki_endpoints(model)
        .into_iter()
        .enumerate()
        .map(|(index, location)| {
            (
                format!("loki-{index}"),
                LogTarget {
                    override_: Override::Replace,
                    kind: "loki".to_string(),
                    location,
                    services: vec!["all".to_string()],
                },
            )
        })
        .collect()
}

/// Advertise a static scrape job for `port` on every unit; leader only
pub fn publish_scrape_jobs(model: &mut Model, port: u16) -> Result<()> {
    let jobs = serde_json::to_string(&json!([{
        "metrics_path": "/metrics",
        "static_configs": [{"targets": [format!("*:{port}")]}],
    }]))?;
    let metadata = serde_json::to_string(&json!({
        "model": model.name,
        "application": model.app_name,
        "unit": model.unit_name,
    }))?;
    let address = model.unit_hostname();
    let unit_name = model.unit_name.clone();
    for relation in model.relations_mut(METRICS_ENDPOINT) {
        relation
            .local_app_data
            .insert("scrape_jobs".to_string(), jobs.clone());
        relation
            .local_app_data
            .insert("scrape_metadata".to_string(), metadata.clone());
        relation
            .local_unit_data
            .insert("prometheus_scrape_unit_address".to_string(), address.clone());
        relation
            .local_unit_data
            .insert("prometheus_scrape_unit_name".to_string(), unit_name.clone());
        debug!("Published scrape job for port {} on relation {}", port, relation.id);
    }
    Ok(())
}
