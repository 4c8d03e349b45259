//! `litmus-auth`: gRPC endpoint exchange between the auth and backend servers

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Versioned;
use crate::controller::collector::collect;
use crate::error::Result;
use crate::model::{encode_databag, DatabagEncoding, Model};

pub const LITMUS_AUTH: &str = "litmus-auth";

/// How to reach a peer's gRPC server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub grpc_server_host: String,
    pub grpc_server_port: u16,
    /// `false` means the peer expects TLS
    pub insecure: bool,
}

/// The peer's published endpoint, if valid
pub fn remote_endpoint(model: &Model) -> Option<Endpoint> {
    collect::<Versioned<Endpoint>>(model, LITMUS_AUTH, DatabagEncoding::Json)
        .map(|versioned| versioned.inner)
}

/// Publish our endpoint on every `litmus-auth` relation
pub fn publish_endpoint(model: &mut Model, endpoint: &Endpoint) -> Result<()> {
    let databag = encode_databag(&Versioned::new(endpoint.clone()), DatabagEncoding::Json)?;
    for relation in model.relations_mut(LITMUS_AUTH) {
        relation.local_app_data = databag.clone();
        debug!(
            "Published {}:{} on {} relation {}",
            endpoint.grpc_server_host, endpoint.grpc_server_port, LITMUS_AUTH, relation.id
        );
    }
    Ok(())
}
