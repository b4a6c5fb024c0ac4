//! Process orchestration: HTTP applications, the service registry and an
//! optional external probe, brought up in a fixed order.

pub mod application;
pub mod errors;
pub mod orchestrator;
pub mod probe;

pub use application::{Application, RunningApp, SharedRegistry};
pub use errors::ServerError;
pub use orchestrator::{Server, Serving};
pub use probe::{Probe, ProbeCredentials};
