//! Whole-charm scenarios driven through reconcile triggers
//!
//! Each scenario builds an in-memory model, points the charm's containers at
//! temporary directories and checks what the workload and the peers end up
//! seeing.

use std::collections::BTreeSet;

use litmus_k8s::charm::{AuthCharm, BackendCharm, Charm, CharmContext, ChaoscenterCharm};
use litmus_k8s::controller::nginx::{CONFIG_PATH, NGINX_PORT};
use litmus_k8s::controller::tls::NoTls;
use litmus_k8s::controller::{dispatch, ReconcileTrigger, StatusLevel, UnitStatus};
use litmus_k8s::interfaces::database::DATABASE;
use litmus_k8s::interfaces::http_api::{AUTH_HTTP_API, BACKEND_HTTP_API, HTTP_API};
use litmus_k8s::interfaces::ingress::INGRESS;
use litmus_k8s::interfaces::litmus_auth::LITMUS_AUTH;
use litmus_k8s::interfaces::tls_certificates::{LocalCa, CERTIFICATES};
use litmus_k8s::model::{databag, Databag, Model};
use litmus_k8s::workload::{
    auth, backend, frontend, CheckStatus, Container, LocalContainer, ServiceStatus,
    SERVER_TLS_PATHS, VERSION_FILE,
};
use tempfile::TempDir;

const VERSION: &str = "3.20.0";

fn database_data() -> Databag {
    databag([
        ("uris", "mongodb-0.mongodb-endpoints:27017"),
        ("username", "relation-4"),
        ("password", "s3cret"),
        ("database", "admin"),
    ])
}

fn grpc_peer(host: &str, port: &str, insecure: bool) -> Databag {
    let host = format!("\"{host}\"");
    databag([
        ("version", "0"),
        ("grpc_server_host", host.as_str()),
        ("grpc_server_port", port),
        ("insecure", if insecure { "true" } else { "false" }),
    ])
}

fn api_peer(url: &str) -> Databag {
    let url = format!("\"{url}\"");
    databag([("version", "0"), ("endpoint", url.as_str())])
}

/// A reachable container rooted in `dir/<name>` that reports `VERSION`
fn container(dir: &TempDir, name: &str) -> LocalContainer {
    let root = dir.path().join(name);
    std::fs::create_dir_all(&root).unwrap();
    let mut container = LocalContainer::new(name, root);
    container.push(VERSION_FILE, VERSION, true).unwrap();
    container
}

fn status(charm: &dyn Charm, ctx: &mut CharmContext) -> UnitStatus {
    dispatch(charm, ctx, &ReconcileTrigger::CollectStatus)
        .unwrap()
        .status
        .unwrap()
}

fn run(charm: &dyn Charm, ctx: &mut CharmContext, trigger: ReconcileTrigger) {
    let report = dispatch(charm, ctx, &trigger).unwrap();
    assert!(report.reconciled);
}

fn auth_context(dir: &TempDir) -> CharmContext {
    let mut model = Model::new("test", "litmus-auth").with_leader(true);
    model.relate(DATABASE, Some(database_data()));
    model.relate(
        LITMUS_AUTH,
        Some(grpc_peer("litmus-backend.test.svc.cluster.local", "8000", true)),
    );
    CharmContext::new(model).with_container(container(dir, auth::CONTAINER))
}

fn service_status(ctx: &CharmContext, container: &str, service: &str) -> ServiceStatus {
    ctx.container(container)
        .unwrap()
        .service_status(service)
        .unwrap()
}

fn ports(ports: &[u16]) -> Option<BTreeSet<u16>> {
    Some(ports.iter().copied().collect())
}

#[test]
fn test_auth_with_database_and_insecure_peer_is_active() {
    let dir = tempfile::tempdir().unwrap();
    let charm = AuthCharm::new();
    let mut ctx = auth_context(&dir);

    run(&charm, &mut ctx, ReconcileTrigger::ConfigChanged);

    assert_eq!(
        service_status(&ctx, auth::CONTAINER, auth::SERVICE),
        ServiceStatus::Active
    );
    let plan = ctx.container(auth::CONTAINER).unwrap().plan().unwrap();
    let env = &plan.services[auth::SERVICE].environment;
    assert_eq!(env["DB_SERVER"], "mongodb-0.mongodb-endpoints:27017");
    assert_eq!(env["LITMUS_GQL_GRPC_PORT"], "8000");
    assert_eq!(ctx.opened_ports, ports(&[3000, 3030]));
    assert_eq!(ctx.workload_version.as_deref(), Some(VERSION));

    let published = &ctx.model.get_relation(LITMUS_AUTH).unwrap().local_app_data;
    assert_eq!(
        published["grpc_server_host"],
        "\"litmus-auth.test.svc.cluster.local\""
    );
    assert_eq!(published["grpc_server_port"], "3030");
    assert_eq!(published["insecure"], "true");
    let request = &ctx.model.get_relation(DATABASE).unwrap().local_app_data;
    assert_eq!(request["database"], "admin");

    assert_eq!(status(&charm, &mut ctx), UnitStatus::active(""));
}

#[test]
fn test_nothing_related_blocks_listing_every_integration() {
    let dir = tempfile::tempdir().unwrap();
    let charm = BackendCharm::new();
    let mut ctx = CharmContext::new(Model::new("test", "litmus-backend").with_leader(true))
        .with_container(container(&dir, backend::CONTAINER));

    run(&charm, &mut ctx, ReconcileTrigger::Start);

    assert_eq!(
        status(&charm, &mut ctx),
        UnitStatus::blocked("Missing [database, litmus-auth] integration(s).")
    );
    // the layer is written even though the server cannot run yet
    assert_eq!(
        service_status(&ctx, backend::CONTAINER, backend::SERVICE),
        ServiceStatus::Inactive
    );
}

#[test]
fn test_related_without_data_is_waiting() {
    let dir = tempfile::tempdir().unwrap();
    let charm = AuthCharm::new();
    let mut model = Model::new("test", "litmus-auth");
    model.relate(DATABASE, Some(database_data()));
    model.relate(LITMUS_AUTH, None);
    let mut ctx = CharmContext::new(model).with_container(container(&dir, auth::CONTAINER));

    run(&charm, &mut ctx, ReconcileTrigger::RelationCreated { relation_id: 2 });

    assert_eq!(
        status(&charm, &mut ctx),
        UnitStatus::waiting("[backend grpc endpoint] not provided yet.")
    );
    // a database alone is enough to run
    assert_eq!(
        service_status(&ctx, auth::CONTAINER, auth::SERVICE),
        ServiceStatus::Active
    );
}

#[test]
fn test_secure_peer_without_local_tls_is_blocked() {
    let dir = tempfile::tempdir().unwrap();
    let charm = AuthCharm::with_tls_provider(NoTls);
    let mut model = Model::new("test", "litmus-auth");
    model.relate(DATABASE, Some(database_data()));
    model.relate(
        LITMUS_AUTH,
        Some(grpc_peer("litmus-backend.test.svc.cluster.local", "8001", false)),
    );
    let mut ctx = CharmContext::new(model).with_container(container(&dir, auth::CONTAINER));

    run(&charm, &mut ctx, ReconcileTrigger::RelationChanged { relation_id: 2 });

    let status = status(&charm, &mut ctx);
    assert_eq!(status.level, StatusLevel::Blocked);
    assert!(status.message.contains("tls certificate"), "{status}");
}

#[test]
fn test_failing_check_blocks_only_a_configured_unit() {
    let dir = tempfile::tempdir().unwrap();
    let charm = AuthCharm::new();
    let mut ctx = auth_context(&dir);
    run(&charm, &mut ctx, ReconcileTrigger::UpdateStatus);

    let root = dir.path().join(auth::CONTAINER);
    LocalContainer::new(auth::CONTAINER, &root)
        .record_check(auth::LIVENESS_CHECK, CheckStatus::Down, 3)
        .unwrap();
    assert_eq!(
        status(&charm, &mut ctx),
        UnitStatus::blocked("Workload checks failing: [authserver-up].")
    );

    // missing configuration wins over the failing check
    let id = ctx.model.get_relation(LITMUS_AUTH).unwrap().id;
    ctx.model.get_relation_mut(LITMUS_AUTH).unwrap().remote_app_data = None;
    run(&charm, &mut ctx, ReconcileTrigger::RelationChanged { relation_id: id });
    assert_eq!(status(&charm, &mut ctx).level, StatusLevel::Waiting);
}

#[test]
fn test_certificate_switches_auth_to_tls_ports() {
    let dir = tempfile::tempdir().unwrap();
    let ca = LocalCa::new("litmus-test-ca").unwrap();
    let charm = AuthCharm::new();
    let mut ctx = auth_context(&dir);
    let certificates = ctx.model.relate(CERTIFICATES, None);

    run(&charm, &mut ctx, ReconcileTrigger::RelationCreated { relation_id: certificates });
    assert_eq!(ctx.opened_ports, ports(&[3000, 3030]));
    let request = ctx
        .model
        .get_relation(CERTIFICATES)
        .unwrap()
        .local_unit_data
        .clone();
    assert!(request.contains_key("certificate_signing_requests"));

    let issued = ca.respond(&request).unwrap();
    ctx.model.get_relation_mut(CERTIFICATES).unwrap().remote_app_data = Some(issued);
    run(&charm, &mut ctx, ReconcileTrigger::RelationChanged { relation_id: certificates });

    assert_eq!(ctx.opened_ports, ports(&[3001, 3031]));
    let container = ctx.container(auth::CONTAINER).unwrap();
    assert_eq!(container.pull(SERVER_TLS_PATHS.ca_cert).unwrap(), ca.ca_pem());
    assert!(container
        .pull(SERVER_TLS_PATHS.server_cert)
        .unwrap()
        .contains("BEGIN CERTIFICATE"));
    let env = container.plan().unwrap().services[auth::SERVICE]
        .environment
        .clone();
    assert_eq!(env["REST_PORT"], "3001");

    let published = &ctx.model.get_relation(LITMUS_AUTH).unwrap().local_app_data;
    assert_eq!(published["insecure"], "false");
    assert_eq!(published["grpc_server_port"], "3031");
    assert_eq!(status(&charm, &mut ctx), UnitStatus::active(""));
}

#[test]
fn test_backend_awaits_frontend_url_once_related() {
    let dir = tempfile::tempdir().unwrap();
    let charm = BackendCharm::new();
    let mut model = Model::new("test", "litmus-backend").with_leader(true);
    model.relate(DATABASE, Some(database_data()));
    model.relate(
        LITMUS_AUTH,
        Some(grpc_peer("litmus-auth.test.svc.cluster.local", "3030", true)),
    );
    let mut ctx = CharmContext::new(model).with_container(container(&dir, backend::CONTAINER));
    run(&charm, &mut ctx, ReconcileTrigger::ConfigChanged);
    assert_eq!(status(&charm, &mut ctx), UnitStatus::active(""));

    let http_api = ctx.model.relate(HTTP_API, None);
    run(&charm, &mut ctx, ReconcileTrigger::RelationCreated { relation_id: http_api });
    assert_eq!(
        status(&charm, &mut ctx),
        UnitStatus::waiting("[frontend url] not provided yet.")
    );
    let published = &ctx.model.get_relation(HTTP_API).unwrap().local_app_data;
    assert_eq!(
        published["endpoint"],
        "\"http://litmus-backend.test.svc.cluster.local:8080\""
    );

    ctx.model.get_relation_mut(HTTP_API).unwrap().remote_app_data = Some(databag([
        ("version", "0"),
        (
            "frontend_endpoint",
            "\"http://litmus-chaoscenter.test.svc.cluster.local:8185\"",
        ),
    ]));
    run(&charm, &mut ctx, ReconcileTrigger::RelationChanged { relation_id: http_api });
    let env = ctx.container(backend::CONTAINER).unwrap().plan().unwrap().services
        [backend::SERVICE]
        .environment
        .clone();
    assert_eq!(
        env["CHAOS_CENTER_UI_ENDPOINT"],
        "http://litmus-chaoscenter.test.svc.cluster.local:8185"
    );
    assert_eq!(status(&charm, &mut ctx), UnitStatus::active(""));
}

fn chaoscenter_context(dir: &TempDir, auth_url: &str) -> CharmContext {
    let mut model = Model::new("test", "litmus-chaoscenter").with_leader(true);
    model.relate(AUTH_HTTP_API, Some(api_peer(auth_url)));
    model.relate(
        BACKEND_HTTP_API,
        Some(api_peer("http://litmus-backend.test.svc.cluster.local:8080")),
    );
    CharmContext::new(model)
        .with_container(container(dir, frontend::CONTAINER))
        .with_container(container(dir, frontend::EXPORTER_CONTAINER))
}

#[test]
fn test_chaoscenter_behind_ingress_reports_external_url() {
    let dir = tempfile::tempdir().unwrap();
    let charm = ChaoscenterCharm::new();
    let mut ctx = chaoscenter_context(&dir, "http://litmus-auth.test.svc.cluster.local:3000");
    ctx.model.relate(
        INGRESS,
        Some(databag([("external_host", "\"1.2.3.4\""), ("scheme", "\"http\"")])),
    );

    run(&charm, &mut ctx, ReconcileTrigger::ConfigChanged);

    let nginx = ctx.container(frontend::CONTAINER).unwrap();
    let config = nginx.pull(CONFIG_PATH).unwrap();
    assert!(config.contains("litmus-auth.test.svc.cluster.local:3000"));
    assert!(config.contains("litmus-backend.test.svc.cluster.local:8080"));
    assert_eq!(
        service_status(&ctx, frontend::CONTAINER, frontend::SERVICE),
        ServiceStatus::Active
    );
    assert_eq!(ctx.opened_ports, ports(&[NGINX_PORT]));

    let frontend_url = &ctx
        .model
        .get_relation(BACKEND_HTTP_API)
        .unwrap()
        .local_app_data["frontend_endpoint"];
    assert_eq!(
        frontend_url,
        "\"http://litmus-chaoscenter.test.svc.cluster.local:8185\""
    );
    assert!(ctx
        .model
        .get_relation(INGRESS)
        .unwrap()
        .local_app_data
        .contains_key("config"));

    assert_eq!(
        status(&charm, &mut ctx),
        UnitStatus::active("Ready at http://1.2.3.4:8185.")
    );
}

#[test]
fn test_chaoscenter_without_ingress_reports_internal_url() {
    let dir = tempfile::tempdir().unwrap();
    let charm = ChaoscenterCharm::new();
    let mut ctx = chaoscenter_context(&dir, "http://litmus-auth.test.svc.cluster.local:3000");
    run(&charm, &mut ctx, ReconcileTrigger::Start);
    assert_eq!(
        status(&charm, &mut ctx),
        UnitStatus::active("Ready at http://litmus-chaoscenter.test.svc.cluster.local:8185.")
    );
}

#[test]
fn test_chaoscenter_with_tls_peer_needs_a_certificate() {
    let dir = tempfile::tempdir().unwrap();
    let charm = ChaoscenterCharm::with_tls_provider(NoTls);
    let mut ctx = chaoscenter_context(&dir, "https://litmus-auth.test.svc.cluster.local:3001");
    run(&charm, &mut ctx, ReconcileTrigger::ConfigChanged);
    assert_eq!(
        status(&charm, &mut ctx),
        UnitStatus::blocked("Missing [tls certificate] required by peer configuration.")
    );
}

#[test]
fn test_chaoscenter_missing_peer_stops_nginx() {
    let dir = tempfile::tempdir().unwrap();
    let charm = ChaoscenterCharm::new();
    let mut ctx = chaoscenter_context(&dir, "http://litmus-auth.test.svc.cluster.local:3000");
    run(&charm, &mut ctx, ReconcileTrigger::Start);

    let id = ctx.model.get_relation(AUTH_HTTP_API).unwrap().id;
    run(&charm, &mut ctx, ReconcileTrigger::RelationBroken { relation_id: id });

    assert_eq!(
        service_status(&ctx, frontend::CONTAINER, frontend::SERVICE),
        ServiceStatus::Inactive
    );
    assert_eq!(
        status(&charm, &mut ctx),
        UnitStatus::blocked("Missing [auth-http-api] integration(s).")
    );
}

#[test]
fn test_repeated_passes_change_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let charm = AuthCharm::new();
    let mut ctx = auth_context(&dir);
    run(&charm, &mut ctx, ReconcileTrigger::Install);

    let state = dir.path().join(auth::CONTAINER).join(".pebble");
    let services = std::fs::read_to_string(state.join("services.yaml")).unwrap();
    let plan = ctx.container(auth::CONTAINER).unwrap().plan().unwrap();
    let model = ctx.model.clone();

    for trigger in [
        ReconcileTrigger::UpdateStatus,
        ReconcileTrigger::ConfigChanged,
        ReconcileTrigger::LeaderElected,
    ] {
        run(&charm, &mut ctx, trigger);
        assert_eq!(
            std::fs::read_to_string(state.join("services.yaml")).unwrap(),
            services
        );
        assert_eq!(ctx.container(auth::CONTAINER).unwrap().plan().unwrap(), plan);
        assert_eq!(ctx.model, model);
    }
}

#[test]
fn test_unreachable_container_still_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let charm = AuthCharm::new();
    let mut model = Model::new("test", "litmus-auth").with_leader(true);
    model.relate(LITMUS_AUTH, None);
    let missing = LocalContainer::new(auth::CONTAINER, dir.path().join("not-mounted"));
    let mut ctx = CharmContext::new(model).with_container(missing);

    run(&charm, &mut ctx, ReconcileTrigger::Start);

    assert!(ctx.opened_ports.is_none());
    assert!(ctx.workload_version.is_none());
    let published = &ctx.model.get_relation(LITMUS_AUTH).unwrap().local_app_data;
    assert_eq!(published["grpc_server_port"], "3030");
}
