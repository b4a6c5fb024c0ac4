use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use common::metrics::SERVICE_START_FAILURES_TOTAL;
use configs::ConfigHandle;
use stores::Stores;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::errors::ServiceError;
use crate::traits::Startable;

struct ServiceEntry {
    instance: Arc<dyn Any + Send + Sync>,
    starter: Option<Arc<dyn Startable>>,
}

/// Name → service table plus the store aggregate every service shares.
///
/// Built and filled during bring-up, then shared behind an `Arc` once the
/// process starts serving; nothing mutates it after that point.
pub struct ServiceRegistry {
    services: HashMap<String, ServiceEntry>,
    stores: Arc<Stores>,
    config: ConfigHandle,
}

impl ServiceRegistry {
    pub fn new(config: ConfigHandle) -> Self {
        Self { services: HashMap::new(), stores: Arc::new(Stores::new()), config }
    }

    /// Shared handle to the stores, for services that need them after startup.
    pub fn stores(&self) -> Arc<Stores> {
        Arc::clone(&self.stores)
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Enroll a service with no startup hook. An existing entry under `name` is replaced.
    pub fn enroll<S>(&mut self, name: impl Into<String>, service: Arc<S>)
    where
        S: Send + Sync + 'static,
    {
        self.insert(name.into(), ServiceEntry { instance: service, starter: None });
    }

    /// Enroll a service whose [`Startable::start`] runs during [`ServiceRegistry::initialize`].
    pub fn enroll_startable<S>(&mut self, name: impl Into<String>, service: Arc<S>)
    where
        S: Startable + 'static,
    {
        let starter: Arc<dyn Startable> = service.clone();
        self.insert(name.into(), ServiceEntry { instance: service, starter: Some(starter) });
    }

    fn insert(&mut self, name: String, entry: ServiceEntry) {
        if self.services.insert(name.clone(), entry).is_some() {
            debug!(service = %name, "service replaced by later enrollment");
        }
    }

    /// Typed lookup. `None` when the name is unknown or enrolled under another type.
    pub fn find<S>(&self, name: &str) -> Option<Arc<S>>
    where
        S: Send + Sync + 'static,
    {
        let entry = self.services.get(name)?;
        Arc::clone(&entry.instance).downcast::<S>().ok()
    }

    /// Like [`ServiceRegistry::find`] but with a "not found" error for callers using `?`.
    pub fn require<S>(&self, name: &str) -> Result<Arc<S>, ServiceError>
    where
        S: Send + Sync + 'static,
    {
        self.find(name).ok_or_else(|| ServiceError::not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Connect the stores, then launch every start hook.
    ///
    /// Stores connect one at a time (relational, cache, directory, object) and
    /// a relational failure is returned before any service starts. Each start
    /// hook then runs in its own task; a hook that errors or panics is logged
    /// and counted without touching the others. The returned handles resolve
    /// when each hook finishes and never carry its failure.
    ///
    /// Meant to run once per process: a second call reconnects every store.
    #[instrument(skip_all)]
    pub async fn initialize(&self) -> Result<Vec<JoinHandle<()>>, ServiceError> {
        let config = self.config.current();
        self.stores.connect(&config).await?;

        let handles: Vec<JoinHandle<()>> = self
            .services
            .iter()
            .filter_map(|(name, entry)| {
                let starter = entry.starter.as_ref()?;
                Some(spawn_start(name.clone(), Arc::clone(starter)))
            })
            .collect();
        info!(enrolled = self.services.len(), starting = handles.len(), "services initialized");
        Ok(handles)
    }
}

fn spawn_start(name: String, starter: Arc<dyn Startable>) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Inner task so a panicking hook is reported here instead of tearing anything down.
        let outcome = tokio::spawn(async move { starter.start().await }).await;
        let failure = match outcome {
            Ok(Ok(())) => {
                debug!(service = %name, "service started");
                return;
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(e) => format!("start task aborted: {e}"),
        };
        error!(service = %name, error = %failure, "service start failed");
        SERVICE_START_FAILURES_TOTAL.with_label_values(&[&name]).inc();
    })
}
