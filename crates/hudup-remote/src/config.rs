//! Registry and pools service configuration.

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

// Default values
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 10151;

/// Configuration of a [`Registry`].
///
/// [`Registry`]: crate::Registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct RegistryConfig {
    /// Host name advertised for exported objects
    #[cfg_attr(
        feature = "config",
        arg(long = "registry-host", env = "HUDUP_REGISTRY_HOST", default_value = DEFAULT_HOST)
    )]
    pub registry_host: String,

    /// Port objects are exported at when none is given
    #[cfg_attr(
        feature = "config",
        arg(long = "registry-port", env = "HUDUP_REGISTRY_PORT", default_value_t = DEFAULT_PORT)
    )]
    pub registry_port: u16,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_host: DEFAULT_HOST.to_owned(),
            registry_port: DEFAULT_PORT,
        }
    }
}

impl RegistryConfig {
    /// Set the advertised host name.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.registry_host = host.into();
        self
    }

    /// Set the default export port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.registry_port = port;
        self
    }
}

/// Configuration of a [`DatasetPoolsServiceImpl`].
///
/// [`DatasetPoolsServiceImpl`]: crate::pools::DatasetPoolsServiceImpl
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct PoolsServiceConfig {
    /// Port pools are exported at (defaults to the registry port)
    #[cfg_attr(feature = "config", arg(long = "pools-port", env = "HUDUP_POOLS_PORT"))]
    pub pools_port: Option<u16>,

    /// Export pool datasets as exclusive to their consumers
    #[cfg_attr(
        feature = "config",
        arg(long = "pools-exclusive", env = "HUDUP_POOLS_EXCLUSIVE")
    )]
    #[serde(default)]
    pub pools_exclusive: bool,
}

impl PoolsServiceConfig {
    /// Port pools are exported at, given the registry's default.
    #[inline]
    pub fn port_or(&self, registry_port: u16) -> u16 {
        self.pools_port.unwrap_or(registry_port)
    }

    /// Set the export port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.pools_port = Some(port);
        self
    }

    /// Set whether exported datasets are exclusive.
    #[must_use]
    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.pools_exclusive = exclusive;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let registry = RegistryConfig::default();
        assert_eq!(registry.registry_host, "localhost");
        assert_eq!(registry.registry_port, 10151);

        let pools = PoolsServiceConfig::default();
        assert_eq!(pools.port_or(registry.registry_port), 10151);
        assert!(!pools.pools_exclusive);
    }

    #[test]
    fn builders() {
        let registry = RegistryConfig::default().with_host("0.0.0.0").with_port(9000);
        assert_eq!(registry.registry_host, "0.0.0.0");
        assert_eq!(registry.registry_port, 9000);

        let pools = PoolsServiceConfig::default().with_port(9001).with_exclusive(true);
        assert_eq!(pools.port_or(registry.registry_port), 9001);
        assert!(pools.pools_exclusive);
    }

    #[test]
    fn deserializes_with_missing_exclusive() {
        let pools: PoolsServiceConfig = serde_json::from_str(r#"{"pools_port":null}"#).unwrap();
        assert_eq!(pools, PoolsServiceConfig::default());
    }
}
