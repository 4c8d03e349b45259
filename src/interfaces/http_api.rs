//! `litmus_http_api`: HTTP endpoint exchange with the chaoscenter frontend
//!
//! The auth and backend servers publish their REST endpoint on `http-api`.
//! The frontend reads them on `auth-http-api` and `backend-http-api` and
//! answers on the backend relation with its own URL.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::Versioned;
use crate::controller::collector::collect;
use crate::error::{Error, Result};
use crate::model::{encode_databag, DatabagEncoding, Model};

/// Provider side, on the auth and backend charms
pub const HTTP_API: &str = "http-api";
/// Requirer sides, on the chaoscenter charm
pub const AUTH_HTTP_API: &str = "auth-http-api";
pub const BACKEND_HTTP_API: &str = "backend-http-api";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct ApiEndpoint {
    endpoint: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct FrontendEndpoint {
    frontend_endpoint: String,
}

/// URLs travel as the peer wrote them; parsing only validates
fn validated(url: &str) -> Result<String> {
    Url::parse(url).map_err(|e| Error::ValidationError(format!("invalid url {url}: {e}")))?;
    Ok(url.to_string())
}

fn valid(url: String) -> Option<String> {
    match Url::parse(&url) {
        Ok(_) => Some(url),
        Err(e) => {
            debug!("Ignoring invalid url {}: {}", url, e);
            None
        }
    }
}

fn publish<T: Serialize + Clone>(model: &mut Model, relation_endpoint: &str, payload: T) -> Result<()> {
    let databag = encode_databag(&Versioned::new(payload), DatabagEncoding::Json)?;
    for relation in model.relations_mut(relation_endpoint) {
        relation.local_app_data = databag.clone();
        debug!("Published http api data on {} relation {}", relation_endpoint, relation.id);
    }
    Ok(())
}

/// Publish our REST endpoint to the frontend
pub fn publish_api_endpoint(model: &mut Model, url: &str) -> Result<()> {
    let endpoint = validated(url)?;
    publish(model, HTTP_API, ApiEndpoint { endpoint })
}

/// A server's REST endpoint as seen from the frontend
pub fn api_endpoint(model: &Model, relation_endpoint: &str) -> Option<String> {
    collect::<Versioned<ApiEndpoint>>(model, relation_endpoint, DatabagEncoding::Json)
        .and_then(|v| valid(v.inner.endpoint))
}

/// Publish the frontend URL back to the backend
pub fn publish_frontend_endpoint(model: &mut Model, url: &str) -> Result<()> {
    let frontend_endpoint = validated(url)?;
    publish(model, BACKEND_HTTP_API, FrontendEndpoint { frontend_endpoint })
}

/// The frontend URL as seen from the backend
pub fn frontend_endpoint(model: &Model) -> Option<String> {
    collect::<Versioned<FrontendEndpoint>>(model, HTTP_API, DatabagEncoding::Json)
        .and_then(|v| valid(v.inner.frontend_endpoint))
}
