use std::fmt;

use async_trait::async_trait;
use common::env::first_var;

pub const PROBE_ACCOUNT_ID: &str = "PROBE_ACCOUNT_ID";
pub const PROBE_ACCOUNT_SECRET: &str = "PROBE_ACCOUNT_SECRET";

/// External monitoring agent attached to the process during bring-up.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn start(&self, credentials: ProbeCredentials) -> anyhow::Result<()>;
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProbeCredentials {
    pub account_id: String,
    pub secret: String,
}

impl ProbeCredentials {
    pub fn new(account_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { account_id: account_id.into(), secret: secret.into() }
    }

    /// Read `PROBE_ACCOUNT_ID` / `PROBE_ACCOUNT_SECRET`; `None` unless both are set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| first_var(&[name]))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Some(Self::new(present(PROBE_ACCOUNT_ID)?, present(PROBE_ACCOUNT_SECRET)?))
    }
}

impl fmt::Debug for ProbeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeCredentials")
            .field("account_id", &self.account_id)
            .field("secret", &"***")
            .finish()
    }
}
