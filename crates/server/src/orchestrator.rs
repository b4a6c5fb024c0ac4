use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use service::ServiceRegistry;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::{Application, RunningApp, SharedRegistry};
use crate::errors::ServerError;
use crate::probe::{Probe, ProbeCredentials};

/// Drives one process: applications first, then the probe, then the registry.
pub struct Server {
    registry: SharedRegistry,
    applications: Vec<Application>,
    probe: Option<Arc<dyn Probe>>,
    probe_credentials: Option<ProbeCredentials>,
}

impl Server {
    pub fn new(registry: ServiceRegistry, applications: Vec<Application>) -> Self {
        info!(
            applications = applications.len(),
            services = registry.len(),
            "server assembled"
        );
        Self { registry: Arc::new(registry), applications, probe: None, probe_credentials: None }
    }

    /// Attach a probe. It runs only if credentials are available, taken from
    /// [`Server::probe_credentials`] or else from the environment.
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn probe_credentials(mut self, credentials: ProbeCredentials) -> Self {
        self.probe_credentials = Some(credentials);
        self
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Bring everything up and return without waiting.
    ///
    /// Applications bind before stores connect, so `/ping` answers while the
    /// registry initializes. A bind failure or a registry failure stops the
    /// applications already running and is returned.
    pub async fn start(self) -> Result<Serving, ServerError> {
        let mut apps = Vec::with_capacity(self.applications.len());
        for app in self.applications {
            match app.start(Arc::clone(&self.registry)).await {
                Ok(running) => apps.push(running),
                Err(e) => {
                    apps.iter().for_each(RunningApp::stop);
                    return Err(e);
                }
            }
        }

        let probe = self.probe.and_then(|probe| {
            match self.probe_credentials.or_else(ProbeCredentials::from_env) {
                Some(credentials) => Some(spawn_probe(probe, credentials)),
                None => {
                    debug!("probe credentials absent, probe not started");
                    None
                }
            }
        });

        let starts = match self.registry.initialize().await {
            Ok(starts) => starts,
            Err(e) => {
                error!(error = %e, "registry initialize failed");
                apps.iter().for_each(RunningApp::stop);
                return Err(e.into());
            }
        };
        info!(applications = apps.len(), services = self.registry.len(), "server running");
        Ok(Serving { registry: self.registry, apps, starts, probe })
    }

    /// Start, then serve until Ctrl+C.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for ctrl-c, serving until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Start, then serve until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let serving = self.start().await?;
        shutdown.await;
        info!("shutdown requested");
        serving.stop();
        Ok(())
    }
}

fn spawn_probe(probe: Arc<dyn Probe>, credentials: ProbeCredentials) -> JoinHandle<()> {
    let account_id = credentials.account_id.clone();
    tokio::spawn(async move {
        match probe.start(credentials).await {
            Ok(()) => info!(%account_id, "probe attached"),
            Err(e) => {
                let error = format!("{e:#}");
                warn!(%account_id, %error, "probe failed to start");
            }
        }
    })
}

/// A started server.
pub struct Serving {
    registry: SharedRegistry,
    apps: Vec<RunningApp>,
    starts: Vec<JoinHandle<()>>,
    probe: Option<JoinHandle<()>>,
}

impl Serving {
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    pub fn apps(&self) -> &[RunningApp] {
        &self.apps
    }

    pub fn addr(&self, app: &str) -> Option<SocketAddr> {
        self.apps.iter().find(|a| a.name() == app).map(RunningApp::addr)
    }

    /// Wait for every service start hook (and the probe) to finish.
    pub async fn started(&mut self) {
        for handle in self.starts.drain(..).chain(self.probe.take()) {
            if let Err(e) = handle.await {
                warn!(error = %e, "startup task ended abnormally");
            }
        }
    }

    /// Stop listening. Start hooks and requests still in flight are not awaited.
    pub fn stop(self) {
        self.apps.iter().for_each(RunningApp::stop);
    }
}
