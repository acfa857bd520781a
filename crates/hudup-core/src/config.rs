//! Flat key-value data configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Location of the store backing a dataset.
pub const STORE_URI_KEY: &str = "store_uri";
/// Real name of the configuration unit.
pub const CONFIG_UNIT_KEY: &str = "hdp_config";
/// Real name of the rating unit.
pub const RATING_UNIT_KEY: &str = "hdp_rating";
/// Real name of the user unit.
pub const USER_UNIT_KEY: &str = "hdp_user";
/// Real name of the item unit.
pub const ITEM_UNIT_KEY: &str = "hdp_item";
/// Real name of the sample unit.
pub const SAMPLE_UNIT_KEY: &str = "hdp_sample";
/// Real name of the context template unit.
pub const CONTEXT_TEMPLATE_UNIT_KEY: &str = "hdp_context_template";
/// Lower bound of rating values.
pub const MIN_RATING_KEY: &str = "min_rating";
/// Upper bound of rating values.
pub const MAX_RATING_KEY: &str = "max_rating";
/// Identifier of the store, used to match pairs in a pool.
pub const URI_ID_KEY: &str = "uri_id";
/// Whether the dataset is loaded fully into memory.
pub const ONLY_MEMORY_KEY: &str = "only_memory";
/// Name of the knowledge base a pointer refers to.
pub const KBASE_NAME_KEY: &str = "kbase_name";
/// Account used to reach a remote server.
pub const ACCOUNT_NAME_KEY: &str = "account_name";
/// Host of a remote server.
pub const SERVER_HOST_KEY: &str = "server_host";
/// Port of a remote server.
pub const SERVER_PORT_KEY: &str = "server_port";

/// Default lower bound of rating values.
pub const DEFAULT_MIN_RATING: f64 = 1.0;
/// Default upper bound of rating values.
pub const DEFAULT_MAX_RATING: f64 = 5.0;

/// File name of a knowledge base configuration stored beside its data.
pub const KBASE_CONFIG_FILE: &str = "kbase.hdp";

/// Flat key-value configuration identifying a store, its units and its
/// rating bounds.
///
/// Values are kept as JSON values so that a configuration can be moved
/// across process boundaries unchanged. Insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataConfig {
    entries: Map<String, Value>,
}

impl DataConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration pointing at the given store.
    pub fn with_store_uri(uri: impl Into<String>) -> Self {
        let mut config = Self::new();
        config.put(STORE_URI_KEY, uri.into());
        config
    }

    /// Inserts or replaces a value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Removes a value, returning it if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the value as a string. Numbers and booleans are rendered.
    pub fn get_as_string(&self, key: &str) -> Option<String> {
        match self.entries.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Returns the value as a real number, parsing strings if needed.
    pub fn get_as_real(&self, key: &str) -> Option<f64> {
        match self.entries.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the value as an integer, parsing strings if needed.
    pub fn get_as_int(&self, key: &str) -> Option<i64> {
        match self.entries.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the value as a boolean, parsing strings if needed.
    pub fn get_as_bool(&self, key: &str) -> Option<bool> {
        match self.entries.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn store_uri(&self) -> Option<String> {
        self.get_as_string(STORE_URI_KEY)
    }

    pub fn set_store_uri(&mut self, uri: impl Into<String>) {
        self.put(STORE_URI_KEY, uri.into());
    }

    /// Identifier of the store; falls back to the store URI.
    pub fn uri_id(&self) -> Option<String> {
        self.get_as_string(URI_ID_KEY).or_else(|| self.store_uri())
    }

    pub fn set_uri_id(&mut self, uri_id: impl Into<String>) {
        self.put(URI_ID_KEY, uri_id.into());
    }

    pub fn rating_unit(&self) -> String {
        self.unit(RATING_UNIT_KEY)
    }

    pub fn user_unit(&self) -> String {
        self.unit(USER_UNIT_KEY)
    }

    pub fn item_unit(&self) -> String {
        self.unit(ITEM_UNIT_KEY)
    }

    pub fn sample_unit(&self) -> String {
        self.unit(SAMPLE_UNIT_KEY)
    }

    pub fn context_template_unit(&self) -> String {
        self.unit(CONTEXT_TEMPLATE_UNIT_KEY)
    }

    /// Real name of a unit; the key itself when not overridden.
    fn unit(&self, key: &str) -> String {
        self.get_as_string(key).unwrap_or_else(|| key.to_owned())
    }

    pub fn min_rating(&self) -> f64 {
        self.get_as_real(MIN_RATING_KEY)
            .unwrap_or(DEFAULT_MIN_RATING)
    }

    pub fn max_rating(&self) -> f64 {
        self.get_as_real(MAX_RATING_KEY)
            .unwrap_or(DEFAULT_MAX_RATING)
    }

    pub fn set_rating_bounds(&mut self, min: f64, max: f64) {
        self.put(MIN_RATING_KEY, min);
        self.put(MAX_RATING_KEY, max);
    }

    /// Whether a loaded dataset should be kept fully in memory.
    pub fn is_only_memory(&self) -> bool {
        self.get_as_bool(ONLY_MEMORY_KEY).unwrap_or(false)
    }

    pub fn set_only_memory(&mut self, only_memory: bool) {
        self.put(ONLY_MEMORY_KEY, only_memory);
    }

    pub fn kbase_name(&self) -> Option<String> {
        self.get_as_string(KBASE_NAME_KEY)
    }

    pub fn set_kbase_name(&mut self, name: impl Into<String>) {
        self.put(KBASE_NAME_KEY, name.into());
    }

    pub fn account_name(&self) -> Option<String> {
        self.get_as_string(ACCOUNT_NAME_KEY)
    }

    pub fn server_host(&self) -> Option<String> {
        self.get_as_string(SERVER_HOST_KEY)
    }

    pub fn server_port(&self) -> Option<u16> {
        self.get_as_int(SERVER_PORT_KEY)
            .and_then(|port| u16::try_from(port).ok())
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loads a configuration stored as a JSON object.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::configuration()
                .with_message(format!("cannot read {}", path.display()))
                .with_source(e)
        })?;

        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Saves the configuration as a JSON object.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, bytes).await.map_err(|e| {
            Error::configuration()
                .with_message(format!("cannot write {}", path.display()))
                .with_source(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config = DataConfig::with_store_uri("mem://fixture");

        assert_eq!(config.store_uri().as_deref(), Some("mem://fixture"));
        assert_eq!(config.uri_id().as_deref(), Some("mem://fixture"));
        assert_eq!(config.user_unit(), USER_UNIT_KEY);
        assert_eq!(config.min_rating(), DEFAULT_MIN_RATING);
        assert_eq!(config.max_rating(), DEFAULT_MAX_RATING);
        assert!(!config.is_only_memory());
    }

    #[test]
    fn typed_accessors_parse_strings() {
        let mut config = DataConfig::new();
        config.put(MAX_RATING_KEY, "10");
        config.put(SERVER_PORT_KEY, "10151");
        config.put(ONLY_MEMORY_KEY, "true");

        assert_eq!(config.max_rating(), 10.0);
        assert_eq!(config.server_port(), Some(10151));
        assert!(config.is_only_memory());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(KBASE_CONFIG_FILE);

        let mut config = DataConfig::with_store_uri("mem://kb");
        config.set_kbase_name("green_fall");
        config.save(&path).await.unwrap();

        let loaded = DataConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.kbase_name().as_deref(), Some("green_fall"));
    }

    #[tokio::test]
    async fn load_missing_file_is_configuration_error() {
        let error = DataConfig::load("/nonexistent/kbase.hdp").await.unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::Configuration);
    }
}
