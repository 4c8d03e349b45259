//! Chaoscenter frontend: nginx plus its Prometheus exporter sidecar

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::{apply_layer, Check, Container, Layer, LogTarget, Service};
use crate::controller::nginx::{ProxyConfig, CONFIG_PATH, NGINX_PORT};
use crate::error::Result;

pub const CONTAINER: &str = "nginx";
pub const LAYER: &str = "nginx";
pub const SERVICE: &str = "nginx";
pub const LIVENESS_CHECK: &str = "nginx-up";

pub const EXPORTER_CONTAINER: &str = "nginx-prometheus-exporter";
pub const EXPORTER_LAYER: &str = "nginx-prometheus-exporter";
pub const EXPORTER_SERVICE: &str = "nginx-prometheus-exporter";
pub const EXPORTER_PORT: u16 = 9113;

const COMMAND: &str = "nginx -g 'daemon off;'";
const CHECK_THRESHOLD: u32 = 3;

fn scheme(tls_enabled: bool) -> &'static str {
    if tls_enabled {
        "https"
    } else {
        "http"
    }
}

pub fn layer(tls_enabled: bool, log_targets: &BTreeMap<String, LogTarget>) -> Layer {
    let mut layer = Layer {
        summary: "litmus frontend layer".to_string(),
        ..Default::default()
    };
    layer.services.insert(
        SERVICE.to_string(),
        Service {
            summary: "litmus chaoscenter frontend".to_string(),
            command: COMMAND.to_string(),
            ..Default::default()
        },
    );
    layer.checks.insert(
        LIVENESS_CHECK.to_string(),
        Check::http(
            format!("{}://localhost:{}/", scheme(tls_enabled), NGINX_PORT),
            CHECK_THRESHOLD,
        ),
    );
    layer.log_targets = log_targets.clone();
    layer
}

pub fn exporter_layer(tls_enabled: bool) -> Layer {
    let command = format!(
        "nginx-prometheus-exporter --no-nginx.ssl-verify --web.listen-address=:{} --nginx.scrape-uri={}://127.0.0.1:{}/status",
        EXPORTER_PORT,
        scheme(tls_enabled),
        NGINX_PORT
    );
    let mut layer = Layer {
        summary: "nginx prometheus exporter layer".to_string(),
        ..Default::default()
    };
    layer.services.insert(
        EXPORTER_SERVICE.to_string(),
        Service {
            summary: "nginx prometheus exporter".to_string(),
            command,
            ..Default::default()
        },
    );
    layer
}

/// Write `nginx.conf` if its content changed; returns whether it did
pub fn push_config(container: &mut dyn Container, proxy: &ProxyConfig) -> Result<bool> {
    let rendered = proxy.render();
    if container.exists(CONFIG_PATH)? && container.pull(CONFIG_PATH)? == rendered {
        debug!("nginx config unchanged");
        return Ok(false);
    }
    container.push(CONFIG_PATH, &rendered, true)?;
    info!("Wrote {}", CONFIG_PATH);
    Ok(true)
}

/// Apply the nginx layer; a changed config restarts a running nginx
///
/// Without a proxy config (peers not known yet) the service is stopped.
pub fn reconcile(
    container: &mut dyn Container,
    proxy: Option<&ProxyConfig>,
    tls_enabled: bool,
    log_targets: &BTreeMap<String, LogTarget>,
) -> Result<()> {
    let layer = layer(tls_enabled, log_targets);
    let Some(proxy) = proxy else {
        return apply_layer(container, LAYER, &layer, false);
    };
    let changed = push_config(container, proxy)?;
    apply_layer(container, LAYER, &layer, true)?;
    if changed {
        container.restart(&layer.service_names())?;
    }
    Ok(())
}

pub fn reconcile_exporter(container: &mut dyn Container, tls_enabled: bool) -> Result<()> {
    apply_layer(container, EXPORTER_LAYER, &exporter_layer(tls_enabled), true)
}
