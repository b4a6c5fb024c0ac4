use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("environment override {key} is not valid JSON: {source}")]
    Override {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("config section `{section}` is malformed: {source}")]
    Section {
        section: String,
        #[source]
        source: serde_json::Error,
    },
}
