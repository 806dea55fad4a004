use crate::descriptor::Credentials;
use crate::dispatch::PoolConfig;
use crate::executor::ExecutorConfig;
use crate::utils::backoff::BackoffConfig;
use crate::utils::config_io::load_cfg;
use crate::utils::logger::LoggerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdapterConfig {
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Used for subscriptions that do not carry their own login.
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub logger: LoggerConfig,
}

impl AdapterConfig {
    /// Loads from a file with `MQBRIDGE__` environment overrides applied.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        load_cfg(path)
    }
}
