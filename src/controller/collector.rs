//! Configuration collector
//!
//! Turns remote data bags into typed configuration fragments. A fragment is
//! either present and valid, or absent: a missing relation, a peer that has
//! not published yet, and a peer that published garbage all read the same.
//! Collectors never fail.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::model::{decode_databag, Databag, DatabagEncoding, Model, Relation};

/// A typed, optional unit of configuration read from one integration
pub type ConfigFragment<T> = Option<T>;

/// Parse one data bag against `T`
pub fn parse_databag<T: DeserializeOwned>(
    databag: &Databag,
    encoding: DatabagEncoding,
) -> ConfigFragment<T> {
    let value = match decode_databag(databag, encoding) {
        Ok(value) => value,
        Err(e) => {
            debug!("Undecodable data bag: {}", e);
            return None;
        }
    };
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!("Data bag failed validation: {}", e);
            None
        }
    }
}

/// Collect the remote application data of one relation
pub fn collect_relation<T: DeserializeOwned>(
    relation: &Relation,
    encoding: DatabagEncoding,
) -> ConfigFragment<T> {
    let databag = relation.remote_data()?;
    let parsed = parse_databag(databag, encoding);
    if parsed.is_none() {
        debug!(
            "Ignoring invalid data on {} relation {}",
            relation.endpoint, relation.id
        );
    }
    parsed
}

/// Collect a fragment from the first relation on `endpoint` that has data
///
/// Single-peer endpoints are limited to one relation upstream; any extra
/// relations are ignored.
pub fn collect<T: DeserializeOwned>(
    model: &Model,
    endpoint: &str,
    encoding: DatabagEncoding,
) -> ConfigFragment<T> {
    let Some(relation) = model.relations(endpoint).find(|r| r.remote_data().is_some()) else {
        debug!("No data on {} yet", endpoint);
        return None;
    };
    collect_relation(relation, encoding)
}

/// Collect one fragment per remote unit across every relation on `endpoint`
///
/// Units whose data bag is missing or invalid are skipped.
pub fn collect_units<T: DeserializeOwned>(
    model: &Model,
    endpoint: &str,
    encoding: DatabagEncoding,
) -> Vec<T> {
    model
        .relations(endpoint)
        .flat_map(|relation| relation.remote_units_data.values())
        .filter(|databag| !databag.is_empty())
        .filter_map(|databag| parse_databag(databag, encoding))
        .collect()
}
