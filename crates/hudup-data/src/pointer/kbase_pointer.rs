use std::path::PathBuf;

use hudup_core::Result;
use hudup_core::config::{DataConfig, KBASE_CONFIG_FILE};

use super::{Pointer, PointerDataset};
use crate::dataset::Dataset;

/// Points at a knowledge base stored beside a dataset.
#[derive(Debug)]
pub struct KBase;

impl Pointer for KBase {
    const NAME: &'static str = "kbase";

    fn target(config: &DataConfig) -> Option<String> {
        config.kbase_name()
    }
}

pub type KBasePointer = PointerDataset<KBase>;

impl KBasePointer {
    /// Creates a pointer naming a knowledge base in the given store.
    pub fn named(store_uri: impl Into<String>, kbase_name: impl Into<String>) -> Self {
        let mut config = DataConfig::with_store_uri(store_uri);
        config.set_kbase_name(kbase_name);
        Self::new(Some(config))
    }

    /// Reads the knowledge base configuration saved under the store URI
    /// and layers it over this pointer's configuration.
    ///
    /// Returns `None` when the pointer has no store URI.
    pub async fn load_kbase_config(&self) -> Result<Option<DataConfig>> {
        let Some(mut config) = self.config().await else {
            return Ok(None);
        };
        let Some(store_uri) = config.store_uri() else {
            return Ok(None);
        };

        let store = store_uri.strip_prefix("file://").unwrap_or(&store_uri);
        let path = PathBuf::from(store).join(KBASE_CONFIG_FILE);
        let stored = DataConfig::load(&path).await?;
        for (key, value) in stored.iter() {
            config.put(key.clone(), value.clone());
        }

        Ok(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use hudup_core::ErrorKind;

    use super::*;

    #[tokio::test]
    async fn loads_kbase_config_beside_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut stored = DataConfig::new();
        stored.set_kbase_name("green_fall");
        stored.put("alg_name", "neighbor_cf");
        stored.save(dir.path().join(KBASE_CONFIG_FILE)).await.unwrap();

        let store = format!("file://{}", dir.path().display());
        let pointer = KBasePointer::named(store.clone(), "stale_name");
        let config = pointer.load_kbase_config().await.unwrap().unwrap();

        assert_eq!(config.store_uri(), Some(store));
        assert_eq!(config.kbase_name().as_deref(), Some("green_fall"));
        assert_eq!(config.get_as_string("alg_name").as_deref(), Some("neighbor_cf"));
        assert_eq!(pointer.target().await.as_deref(), Some("stale_name"));
    }

    #[tokio::test]
    async fn missing_kbase_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pointer = KBasePointer::named(dir.path().display().to_string(), "kb");

        let error = pointer.load_kbase_config().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn no_store_uri_means_no_config() {
        let pointer = KBasePointer::new(Some(DataConfig::new()));
        assert!(pointer.load_kbase_config().await.unwrap().is_none());
    }
}
