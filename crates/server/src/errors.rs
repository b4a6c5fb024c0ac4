use std::net::SocketAddr;

use service::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("application {app} could not bind {addr}: {source}")]
    Bind {
        app: String,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("startup failed: {0}")]
    Startup(#[from] ServiceError),
}
