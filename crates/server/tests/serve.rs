use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use configs::{ConfigHandle, ConfigTree};
use reqwest::StatusCode as HttpStatusCode;
use serde_json::json;
use server::{Application, Probe, ProbeCredentials, Server, ServerError, SharedRegistry};
use service::ServiceRegistry;
use stores::StoreKind;
use tokio::sync::mpsc;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

struct Greeter {
    greeting: &'static str,
}

async fn greet(State(registry): State<SharedRegistry>) -> Result<String, StatusCode> {
    let greeter = registry.find::<Greeter>("greeter").ok_or(StatusCode::NOT_FOUND)?;
    Ok(greeter.greeting.to_string())
}

async fn stores_up(State(registry): State<SharedRegistry>) -> String {
    format!("{:?}", registry.stores().connected())
}

fn registry(root: &std::path::Path) -> ServiceRegistry {
    let tree = ConfigTree::from_value(json!({"directory": root}));
    let mut registry = ServiceRegistry::new(ConfigHandle::new(tree));
    registry.enroll("greeter", Arc::new(Greeter { greeting: "hello" }));
    registry
}

fn api() -> Application {
    Application::new("api", 0).host(LOCALHOST).routes(
        Router::new()
            .route("/greet", get(greet))
            .route("/stores", get(stores_up)),
    )
}

#[tokio::test]
async fn ping_metrics_and_registered_routes_are_served() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let serving = Server::new(registry(tmp.path()), vec![api()]).start().await?;
    let addr = serving.addr("api").expect("api bound");
    let base = format!("http://{addr}");

    let ping = reqwest::get(format!("{base}/ping")).await?;
    assert_eq!(ping.status(), HttpStatusCode::OK);
    let body: serde_json::Value = ping.json().await?;
    assert_eq!(body["status"], "ok");

    let greet = reqwest::get(format!("{base}/greet")).await?;
    assert_eq!(greet.status(), HttpStatusCode::OK);
    assert_eq!(greet.text().await?, "hello");

    let stores = reqwest::get(format!("{base}/stores")).await?.text().await?;
    assert!(stores.contains("Directory"));

    let metrics = reqwest::get(format!("{base}/metrics")).await?;
    assert_eq!(metrics.status(), HttpStatusCode::OK);
    assert!(metrics.text().await?.contains("backbone_store_connect_total"));

    let missing = reqwest::get(format!("{base}/nope")).await?;
    assert_eq!(missing.status(), HttpStatusCode::NOT_FOUND);

    serving.stop();
    Ok(())
}

#[tokio::test]
async fn each_application_gets_its_own_listener() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let apps = vec![api(), Application::new("admin", 0).host(LOCALHOST)];
    let serving = Server::new(registry(tmp.path()), apps).start().await?;

    let api_addr = serving.addr("api").expect("api bound");
    let admin_addr = serving.addr("admin").expect("admin bound");
    assert_ne!(api_addr.port(), admin_addr.port());

    let admin_greet = reqwest::get(format!("http://{admin_addr}/greet")).await?;
    assert_eq!(admin_greet.status(), HttpStatusCode::NOT_FOUND);
    let admin_ping = reqwest::get(format!("http://{admin_addr}/ping")).await?;
    assert_eq!(admin_ping.status(), HttpStatusCode::OK);

    serving.stop();
    Ok(())
}

#[tokio::test]
async fn port_in_use_is_a_bind_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let taken = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = taken.local_addr()?.port();

    let apps = vec![Application::new("clash", port).host(LOCALHOST)];
    let err = Server::new(registry(tmp.path()), apps).start().await.err().expect("bind must fail");
    assert!(matches!(err, ServerError::Bind { ref app, .. } if app == "clash"));
    Ok(())
}

#[tokio::test]
async fn registry_failure_is_a_startup_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let tree = ConfigTree::from_value(json!({
        "postgres": {"user": "app", "database": ""},
        "directory": tmp.path(),
    }));
    let server = Server::new(ServiceRegistry::new(ConfigHandle::new(tree)), vec![api()]);
    let registry = server.registry();

    let err = server.start().await.err().expect("initialize must fail");
    assert!(matches!(err, ServerError::Startup(_)));
    assert!(!registry.stores().is_connected(StoreKind::Directory));
    Ok(())
}

#[tokio::test]
async fn run_until_returns_once_shutdown_resolves() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    Server::new(registry(tmp.path()), vec![api()]).run_until(async {}).await?;
    Ok(())
}

struct RecordingProbe {
    seen: mpsc::UnboundedSender<ProbeCredentials>,
    fail: bool,
}

#[async_trait]
impl Probe for RecordingProbe {
    async fn start(&self, credentials: ProbeCredentials) -> anyhow::Result<()> {
        let _ = self.seen.send(credentials);
        if self.fail {
            anyhow::bail!("registration rejected");
        }
        Ok(())
    }
}

#[tokio::test]
async fn probe_receives_credentials_and_its_failure_is_not_fatal() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let probe = Arc::new(RecordingProbe { seen: tx, fail: true });

    let mut serving = Server::new(registry(tmp.path()), vec![api()])
        .with_probe(probe)
        .probe_credentials(ProbeCredentials::new("acct-1", "secret"))
        .start()
        .await?;
    serving.started().await;

    assert_eq!(rx.recv().await.map(|c| c.account_id), Some("acct-1".to_string()));
    let addr = serving.addr("api").expect("api bound");
    assert_eq!(reqwest::get(format!("http://{addr}/ping")).await?.status(), HttpStatusCode::OK);
    serving.stop();
    Ok(())
}

async fn echo(body: String) -> String {
    body
}

#[tokio::test]
async fn oversized_bodies_are_rejected() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let app = Application::new("small", 0)
        .host(LOCALHOST)
        .body_limit(16)
        .routes(Router::new().route("/echo", post(echo)));
    let serving = Server::new(registry(tmp.path()), vec![app]).start().await?;
    let url = format!("http://{}/echo", serving.addr("small").expect("small bound"));
    let client = reqwest::Client::new();

    let fits = client.post(&url).body("short").send().await?;
    assert_eq!(fits.status(), HttpStatusCode::OK);
    assert_eq!(fits.text().await?, "short");

    let too_big = client.post(&url).body("x".repeat(64)).send().await?;
    assert_eq!(too_big.status(), HttpStatusCode::PAYLOAD_TOO_LARGE);

    serving.stop();
    Ok(())
}

struct PanickingProbe;

#[async_trait]
impl Probe for PanickingProbe {
    async fn start(&self, _credentials: ProbeCredentials) -> anyhow::Result<()> {
        panic!("probe agent crashed")
    }
}

#[tokio::test]
async fn panicking_probe_does_not_take_the_server_down() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut serving = Server::new(registry(tmp.path()), vec![api()])
        .with_probe(Arc::new(PanickingProbe))
        .probe_credentials(ProbeCredentials::new("acct-2", "secret"))
        .start()
        .await?;
    serving.started().await;

    let addr = serving.addr("api").expect("api bound");
    assert_eq!(reqwest::get(format!("http://{addr}/ping")).await?.status(), HttpStatusCode::OK);
    serving.stop();
    Ok(())
}
