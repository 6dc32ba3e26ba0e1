// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Kernel configuration plus the config service and storage port.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Key under which [`ConfigService::load_kernel_config`] reads the kernel config.
pub const KERNEL_CONFIG_KEY: &str = "kernel";

/// Runtime knobs for the tick controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    /// Tick budget for [`crate::Engine::run_until_converged`].
    pub tick_budget: u64,
    /// Upper bound on instances a single COPY may generate.
    pub max_instances: u32,
    /// Turn a failed rule application into a tick error.
    pub halt_on_fault: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            tick_budget: 256,
            max_instances: 1024,
            halt_on_fault: false,
        }
    }
}

impl KernelConfig {
    /// Parses and validates a YAML config.
    pub fn from_yaml_str(src: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(src)?;
        config.validate()
    }

    /// Parses and validates a JSON config.
    pub fn from_json_str(src: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(src)?;
        config.validate()
    }

    /// Rejects configurations the engine cannot run with.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.tick_budget == 0 {
            return Err(ConfigError::Invalid("tick_budget must be at least 1".into()));
        }
        if self.max_instances == 0 {
            return Err(ConfigError::Invalid("max_instances must be at least 1".into()));
        }
        Ok(self)
    }
}

/// Storage port for raw config blobs (keyed by logical name).
pub trait ConfigStore {
    /// Load a raw config blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("not found")]
    NotFound,
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// YAML deserialization failure.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// Value parsed but is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// Thin service that serializes config values and delegates storage to a `ConfigStore`.
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Create a new service using the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Consume the service and return the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Load and deserialize a config value for `key`. Returns `Ok(None)` if missing.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.store.load_raw(key) {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(None);
                }
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize and persist a config value for `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }

    /// Loads the kernel config, falling back to defaults when none is stored.
    pub fn load_kernel_config(&self) -> Result<KernelConfig, ConfigError> {
        self.load::<KernelConfig>(KERNEL_CONFIG_KEY)?
            .unwrap_or_default()
            .validate()
    }

    /// Persists `config` under [`KERNEL_CONFIG_KEY`].
    pub fn save_kernel_config(&self, config: &KernelConfig) -> Result<(), ConfigError> {
        self.save(KERNEL_CONFIG_KEY, config)
    }
}
