//! Reverse-proxy configuration for the chaoscenter frontend
//!
//! nginx serves the UI bundle and forwards `/auth` and `/api` to the auth and
//! backend servers. Whether clients reach nginx over TLS and whether nginx
//! reaches each peer over TLS are decided independently: the listener follows
//! local certificate material, each upstream follows its peer's URL scheme.

use url::Url;

use super::tls::{TlsConfig, TlsPaths};
use crate::error::{Error, Result};

/// The single externally facing port
pub const NGINX_PORT: u16 = 8185;

pub const CERT_PATH: &str = "/etc/nginx/certs/server.cert";
pub const KEY_PATH: &str = "/etc/nginx/certs/server.key";
pub const CA_PATH: &str = "/usr/local/share/ca-certificates/ca.cert";
pub const CONFIG_PATH: &str = "/etc/nginx/nginx.conf";

/// Where the UI bundle lives in the frontend image
pub const ROOT_PATH: &str = "/dist";

pub const NGINX_TLS_PATHS: TlsPaths = TlsPaths {
    server_cert: CERT_PATH,
    private_key: KEY_PATH,
    ca_cert: CA_PATH,
};

/// A peer URL reduced to what the proxy needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerAddress {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    /// Parse a peer URL; a bare `host[:port]` means `http`
    ///
    /// Without an explicit port, `http` peers are on 80 and anything else on
    /// 443.
    pub fn parse(raw: &str) -> Result<Self> {
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };
        let url = Url::parse(&with_scheme)
            .map_err(|e| Error::ValidationError(format!("invalid peer url {raw}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::ValidationError(format!("peer url {raw} has no host")))?
            .to_string();
        let scheme = url.scheme().to_string();
        let port = url
            .port()
            .unwrap_or(if scheme == "http" { 80 } else { 443 });
        Ok(Self { scheme, host, port })
    }

    pub fn is_tls(&self) -> bool {
        self.scheme == "https"
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upstream {
    pub name: &'static str,
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub path: &'static str,
    /// Upstream group the location forwards to
    pub backend: &'static str,
    /// `rewrite` arguments: regex, replacement, flag
    pub rewrite: Option<[&'static str; 3]>,
    pub upstream_tls: bool,
    pub extra_directives: Vec<(&'static str, String)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TracingDirectives {
    /// OTLP gRPC collector as `host:port`
    pub endpoint: String,
    pub service_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    pub server_name: String,
    pub port: u16,
    pub listen_tls: bool,
    pub upstreams: Vec<Upstream>,
    pub locations: Vec<Location>,
    pub root_path: &'static str,
    pub tracing: Option<TracingDirectives>,
    /// Loopback-only `stub_status` for the metrics exporter
    pub status_page: bool,
}

fn upstream_tls_directives(peer: &PeerAddress) -> Vec<(&'static str, String)> {
    if !peer.is_tls() {
        return Vec::new();
    }
    vec![
        ("proxy_ssl_verify", "off".to_string()),
        ("proxy_ssl_session_reuse", "on".to_string()),
        ("proxy_ssl_certificate", CERT_PATH.to_string()),
        ("proxy_ssl_certificate_key", KEY_PATH.to_string()),
    ]
}

/// Build the proxy configuration
///
/// Both peers must be known; asking before that is a caller bug and yields
/// [`Error::MissingEndpoint`].
pub fn build(
    server_name: &str,
    auth_url: Option<&str>,
    backend_url: Option<&str>,
    tls: Option<&TlsConfig>,
) -> Result<ProxyConfig> {
    let auth = PeerAddress::parse(auth_url.ok_or(Error::MissingEndpoint("auth"))?)?;
    let backend = PeerAddress::parse(backend_url.ok_or(Error::MissingEndpoint("backend"))?)?;

    Ok(ProxyConfig {
        server_name: server_name.to_string(),
        port: NGINX_PORT,
        listen_tls: tls.is_some(),
        upstreams: vec![
            Upstream {
                name: "auth",
                host: auth.host.clone(),
                port: auth.port,
            },
            Upstream {
                name: "backend",
                host: backend.host.clone(),
                port: backend.port,
            },
        ],
        locations: vec![
            Location {
                path: "/auth",
                backend: "auth",
                rewrite: Some(["^/auth(/.*)$", "$1", "break"]),
                upstream_tls: auth.is_tls(),
                extra_directives: upstream_tls_directives(&auth),
            },
            Location {
                path: "/api",
                backend: "backend",
                rewrite: None,
                upstream_tls: backend.is_tls(),
                extra_directives: upstream_tls_directives(&backend),
            },
        ],
        root_path: ROOT_PATH,
        tracing: None,
        status_page: true,
    })
}

impl ProxyConfig {
    /// Export request spans to an OTLP gRPC collector
    pub fn with_tracing(mut self, endpoint: &str, service_name: &str) -> Self {
        let endpoint = match Url::parse(endpoint) {
            Ok(url) if url.host_str().is_some() => match url.port_or_known_default() {
                Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
                None => url.host_str().unwrap_or_default().to_string(),
            },
            _ => endpoint.to_string(),
        };
        self.tracing = Some(TracingDirectives {
            endpoint,
            service_name: service_name.to_string(),
        });
        self
    }

    /// Render `nginx.conf`; the same config always renders the same bytes
    pub fn render(&self) -> String {
        let mut w = ConfWriter::default();
        if self.tracing.is_some() {
            w.line("load_module modules/ngx_otel_module.so;");
        }
        w.line("worker_processes 5;");
        w.line("error_log /dev/stderr error;");
        w.line("pid /tmp/nginx.pid;");
        w.line("worker_rlimit_nofile 8192;");
        w.open("events");
        w.line("worker_connections 4096;");
        w.close();

        w.open("http");
        for upstream in &self.upstreams {
            w.open(&format!("upstream {}", upstream.name));
            w.line(&format!("zone {}_zone 64k;", upstream.name));
            w.line(&format!("server {}:{};", upstream.host, upstream.port));
            w.close();
        }
        w.line("client_body_temp_path /tmp/client_temp;");
        w.line("proxy_temp_path /tmp/proxy_temp_path;");
        w.line("fastcgi_temp_path /tmp/fastcgi_temp;");
        w.line("uwsgi_temp_path /tmp/uwsgi_temp;");
        w.line("scgi_temp_path /tmp/scgi_temp;");
        w.line("include /etc/nginx/mime.types;");
        w.line("default_type application/octet-stream;");
        w.line(
            "log_format main '$remote_addr - $remote_user [$time_local] $status \"$request\" $body_bytes_sent \"$http_referer\" \"$http_user_agent\" \"$http_x_forwarded_for\"';",
        );
        w.line("access_log /dev/stderr;");
        w.line("sendfile on;");
        w.line("tcp_nopush on;");
        w.line("proxy_read_timeout 300;");
        w.open("map $http_x_forwarded_proto $forwarded_proto");
        w.line("default $http_x_forwarded_proto;");
        w.line("\"\" $scheme;");
        w.close();
        if let Some(tracing) = &self.tracing {
            w.open("otel_exporter");
            w.line(&format!("endpoint {};", tracing.endpoint));
            w.close();
            w.line(&format!("otel_service_name {};", tracing.service_name));
            w.line("otel_trace on;");
            w.line("otel_trace_context propagate;");
        }

        w.open("server");
        let ssl = if self.listen_tls { " ssl" } else { "" };
        w.line(&format!("listen {}{};", self.port, ssl));
        w.line(&format!("listen [::]:{}{};", self.port, ssl));
        w.line(&format!("server_name {};", self.server_name));
        if self.listen_tls {
            w.line(&format!("ssl_certificate {CERT_PATH};"));
            w.line(&format!("ssl_certificate_key {KEY_PATH};"));
            w.line("ssl_protocols TLSv1.2 TLSv1.3;");
            w.line("ssl_ciphers HIGH:!aNULL:!MD5;");
        }
        w.line(&format!("root {};", self.root_path));
        w.open("location /");
        w.line("try_files $uri /index.html;");
        w.close();
        for location in &self.locations {
            w.open(&format!("location {}", location.path));
            if let Some([regex, replacement, flag]) = location.rewrite {
                w.line(&format!("rewrite '{regex}' {replacement} {flag};"));
            }
            let scheme = if location.upstream_tls { "https" } else { "http" };
            w.line(&format!("set $backend {}://{};", scheme, location.backend));
            w.line("proxy_pass $backend;");
            w.line("proxy_set_header Host $host;");
            w.line("proxy_set_header X-Forwarded-Proto $forwarded_proto;");
            w.line("proxy_connect_timeout 5s;");
            for (directive, value) in &location.extra_directives {
                w.line(&format!("{directive} {value};"));
            }
            w.close();
        }
        if self.status_page {
            w.open("location = /status");
            w.line("stub_status;");
            w.line("allow 127.0.0.1;");
            w.line("allow ::1;");
            w.line("deny all;");
            w.line("access_log off;");
            w.close();
        }
        w.close();
        w.close();
        w.out
    }
}

#[derive(Default)]
struct ConfWriter {
    out: String,
    depth: usize,
}

impl ConfWriter {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn open(&mut self, header: &str) {
        self.line(&format!("{header} {{"));
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }
}
