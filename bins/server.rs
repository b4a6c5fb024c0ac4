use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use configs::{ConfigHandle, ConfigTree};
use dotenvy::dotenv;
use server::{Application, Server, SharedRegistry};
use service::ServiceRegistry;
use tracing::{error, info};
use uuid::Uuid;

const DEFAULT_PORT: u16 = 8080;

fn init_logging() {
    // 提前加载 .env，使得 RUST_LOG / LOGFILE 等环境变量生效
    dotenv().ok();
    if let Err(e) = common::utils::logging::init_logging_from_env() {
        common::utils::logging::init_logging_default();
        error!(service = "backbone", event = "logfile_unavailable", error = %e, "falling back to stdout logging");
    }
    info!(service = "backbone", event = "logger_init", "tracing subscriber initialized");
}

async fn services(State(registry): State<SharedRegistry>) -> Json<Vec<String>> {
    Json(registry.names().into_iter().map(str::to_owned).collect())
}

fn port(config: &ConfigTree) -> u16 {
    config
        .lookup("server.port")
        .and_then(|v| v.as_u64())
        .and_then(|p| u16::try_from(p).ok())
        .unwrap_or(DEFAULT_PORT)
}

fn worker_threads(config: &ConfigTree) -> Option<usize> {
    config
        .lookup("server.worker_threads")
        .and_then(|v| v.as_u64())
        .and_then(|w| usize::try_from(w).ok())
        .filter(|w| *w > 0)
}

fn main() -> std::process::ExitCode {
    init_logging();

    let service_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    // Panic 钩子：捕获异常并输出错误日志
    std::panic::set_hook(Box::new(move |info| {
        error!(
            service = "backbone",
            event = "panic",
            %service_id,
            pid,
            message = %info,
            "unhandled panic occurred"
        );
    }));

    let config = match configs::load_default() {
        Ok(config) => config,
        Err(e) => {
            error!(service = "backbone", event = "config_invalid", error = %e, "cannot resolve configuration");
            return std::process::ExitCode::FAILURE;
        }
    };
    let port = port(&config);
    let threads = worker_threads(&config);

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(w) = threads {
        builder.worker_threads(w);
    }
    let rt = match builder.build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "backbone", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return std::process::ExitCode::FAILURE;
        }
    };

    info!(
        service = "backbone",
        event = "start",
        %service_id,
        pid,
        version,
        port,
        threads = threads.unwrap_or_default(),
        "backbone starting"
    );

    let registry = ServiceRegistry::new(ConfigHandle::new(config));
    let api = Application::new("api", port).routes(Router::new().route("/services", get(services)));
    let server = Server::new(registry, vec![api]);

    rt.block_on(async move {
        match server.run().await {
            Ok(()) => {
                info!(service = "backbone", event = "stop", %service_id, pid, "backbone stopped");
                std::process::ExitCode::SUCCESS
            }
            Err(e) => {
                error!(service = "backbone", event = "run_failed", error = %e, "server returned error");
                std::process::ExitCode::FAILURE
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn port_falls_back_when_missing_or_out_of_range() {
        assert_eq!(port(&ConfigTree::empty()), DEFAULT_PORT);
        assert_eq!(port(&ConfigTree::from_value(json!({"server": {"port": 70000}}))), DEFAULT_PORT);
        assert_eq!(port(&ConfigTree::from_value(json!({"server": {"port": 9000}}))), 9000);
    }

    #[test]
    fn zero_worker_threads_means_runtime_default() {
        assert_eq!(worker_threads(&ConfigTree::from_value(json!({"server": {"worker_threads": 0}}))), None);
        assert_eq!(worker_threads(&ConfigTree::from_value(json!({"server": {"worker_threads": 4}}))), Some(4));
    }
}
