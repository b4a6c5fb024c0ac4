//! Service registry: the process-wide table of named services and the single
//! store aggregate they share.
//!
//! - Services are plain `Arc`s; a startup hook is opted into through [`Startable`].
//! - [`ServiceRegistry::initialize`] connects stores first, then launches hooks.
//! - Lookups are typed and never panic on a miss.

pub mod errors;
pub mod hash;
pub mod registry;
pub mod traits;

pub use errors::ServiceError;
pub use hash::{hash, Algorithm};
pub use registry::ServiceRegistry;
pub use traits::Startable;
