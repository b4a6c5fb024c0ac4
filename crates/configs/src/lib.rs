//! Configuration resolution for the hosting process.
//!
//! A [`ConfigTree`] is read once from a TOML file, every key is lower-cased,
//! and environment variables named after top-level keys are layered on top:
//! nested sections take a JSON document that is deep-merged in, scalar keys
//! are replaced outright. The resolved tree is shared through a
//! [`ConfigHandle`] and only ever replaced wholesale.

mod errors;
mod handle;
mod merge;
mod sections;
mod tree;

pub use errors::ConfigError;
pub use handle::ConfigHandle;
pub use merge::{deep_merge, lowercase_keys};
pub use sections::{AwsConfig, DirectoryConfig, PostgresConfig, RedisConfig};
pub use tree::{ConfigTree, DEFAULT_CONFIG_PATH};

/// Resolve the tree from `CONFIG_PATH` (or [`DEFAULT_CONFIG_PATH`]) and the process environment.
pub fn load_default() -> Result<ConfigTree, ConfigError> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    ConfigTree::load(path)
}
