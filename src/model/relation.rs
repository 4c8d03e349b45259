//! Integration channels and their data bags

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// One side's key/value data for a relation
pub type Databag = BTreeMap<String, String>;

/// How values in a data bag are encoded on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabagEncoding {
    /// Every value is a raw string (e.g. the database interface)
    Plain,
    /// Every value is a JSON document (e.g. litmus-auth, http-api)
    Json,
}

/// A connected integration with a peer application
///
/// A relation that appears in the [`Model`](super::Model) is connected; a
/// connected relation may still have an empty remote data bag while the
/// peer has not published anything yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Relation {
    pub id: u32,
    /// Local endpoint name, e.g. `database` or `litmus-auth`
    pub endpoint: String,
    pub remote_app: Option<String>,
    pub remote_app_data: Option<Databag>,
    /// Per remote unit data bags, keyed by unit name
    pub remote_units_data: BTreeMap<String, Databag>,
    pub local_app_data: Databag,
    pub local_unit_data: Databag,
}

impl Relation {
    pub fn new(id: u32, endpoint: &str) -> Self {
        Self {
            id,
            endpoint: endpoint.to_string(),
            ..Default::default()
        }
    }

    pub fn with_remote_app_data(mut self, data: Databag) -> Self {
        self.remote_app_data = Some(data);
        self
    }

    /// Remote app data, or `None` when the peer has not published any keys
    pub fn remote_data(&self) -> Option<&Databag> {
        self.remote_app_data.as_ref().filter(|d| !d.is_empty())
    }
}

/// Decode a data bag into a JSON object suitable for typed deserialization
pub fn decode_databag(databag: &Databag, encoding: DatabagEncoding) -> Result<Value> {
    let mut object = serde_json::Map::new();
    for (key, raw) in databag {
        let value = match encoding {
            DatabagEncoding::Plain => Value::String(raw.clone()),
            DatabagEncoding::Json => serde_json::from_str(raw)?,
        };
        object.insert(key.clone(), value);
    }
    Ok(Value::Object(object))
}

/// Encode a serializable struct as a data bag with one entry per field
pub fn encode_databag<T: Serialize>(value: &T, encoding: DatabagEncoding) -> Result<Databag> {
    let Value::Object(object) = serde_json::to_value(value)? else {
        return Err(Error::ValidationError(
            "data bag models must serialize to an object".to_string(),
        ));
    };
    let mut databag = Databag::new();
    for (key, value) in object {
        let raw = match (encoding, value) {
            (_, Value::Null) => continue,
            (DatabagEncoding::Plain, Value::String(s)) => s,
            (DatabagEncoding::Plain, other) => other.to_string(),
            (DatabagEncoding::Json, other) => serde_json::to_string(&other)?,
        };
        databag.insert(key, raw);
    }
    Ok(databag)
}

/// Build a data bag from literal pairs; handy for fixtures
pub fn databag<const N: usize>(pairs: [(&str, &str); N]) -> Databag {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        host: String,
        port: u16,
        insecure: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    }

    #[test]
    fn test_json_encoding_quotes_strings() {
        let bag = encode_databag(
            &Sample {
                host: "host".into(),
                port: 80,
                insecure: true,
                note: None,
            },
            DatabagEncoding::Json,
        )
        .unwrap();
        assert_eq!(bag["host"], "\"host\"");
        assert_eq!(bag["port"], "80");
        assert_eq!(bag["insecure"], "true");
        assert!(!bag.contains_key("note"));
    }

    #[test]
    fn test_plain_decoding_keeps_raw_strings() {
        let bag = databag([("uris", "a:1,b:2")]);
        let value = decode_databag(&bag, DatabagEncoding::Plain).unwrap();
        assert_eq!(value["uris"], "a:1,b:2");
    }

    #[test]
    fn test_json_decoding_rejects_malformed_values() {
        let bag = databag([("host", "not json")]);
        assert!(decode_databag(&bag, DatabagEncoding::Json).is_err());
    }

    #[test]
    fn test_empty_remote_databag_is_no_data() {
        let relation = Relation::new(1, "database").with_remote_app_data(Databag::new());
        assert!(relation.remote_data().is_none());
    }
}
