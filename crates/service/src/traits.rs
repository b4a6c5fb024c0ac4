use async_trait::async_trait;

/// Optional startup hook for an enrolled service.
///
/// Services that implement it and are enrolled with
/// [`ServiceRegistry::enroll_startable`](crate::ServiceRegistry::enroll_startable)
/// get `start` run as their own task once every store is connected.
#[async_trait]
pub trait Startable: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;
}
