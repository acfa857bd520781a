//! Turning a configuration into a provider or a dataset.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hudup_core::config::DataConfig;
use hudup_core::{Error, Result};
use tokio::sync::RwLock;

use crate::TRACING_TARGET_PROVIDER;
use crate::dataset::SharedDataset;
use crate::pointer::KBasePointer;
use crate::provider::{Provider, ProviderFactory};
use crate::scanner::Scanner;
use crate::snapshot::Snapshot;

/// Builds datasets from configurations.
#[async_trait]
pub trait DatasetLoader: Send + Sync + fmt::Debug {
    async fn load(&self, config: &DataConfig) -> Result<SharedDataset>;
}

/// Provider factories keyed by the scheme of the store URI.
///
/// Constructed explicitly and handed to whoever needs to open stores.
/// Loading picks the dataset shape from the configuration: a knowledge base
/// name gives a [`KBasePointer`], `only_memory` a [`Snapshot`] and anything
/// else a [`Scanner`].
#[derive(Debug, Default)]
pub struct DriverRegistry {
    factories: RwLock<BTreeMap<String, Arc<dyn ProviderFactory>>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under its scheme, returning the one it replaces.
    pub async fn register(
        &self,
        factory: Arc<dyn ProviderFactory>,
    ) -> Option<Arc<dyn ProviderFactory>> {
        let scheme = factory.scheme().to_owned();
        tracing::debug!(target: TRACING_TARGET_PROVIDER, scheme = %scheme, "driver registered");
        self.factories.write().await.insert(scheme, factory)
    }

    pub async fn unregister(&self, scheme: &str) -> Option<Arc<dyn ProviderFactory>> {
        self.factories.write().await.remove(scheme)
    }

    pub async fn schemes(&self) -> Vec<String> {
        self.factories.read().await.keys().cloned().collect()
    }

    /// Opens a connection to the store named by the configuration.
    pub async fn open_provider(&self, config: &DataConfig) -> Result<Arc<dyn Provider>> {
        let uri = config
            .store_uri()
            .ok_or_else(|| Error::configuration().with_message("missing store uri"))?;
        let scheme = uri
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| Error::configuration().with_message(format!("no scheme in {uri}")))?;

        let factory = self
            .factories
            .read()
            .await
            .get(scheme)
            .cloned()
            .ok_or_else(|| {
                Error::not_found().with_message(format!("no driver for scheme {scheme}"))
            })?;

        factory.open(config).await
    }

    /// Forgets every factory.
    pub async fn clear(&self) {
        self.factories.write().await.clear();
    }
}

#[async_trait]
impl DatasetLoader for DriverRegistry {
    async fn load(&self, config: &DataConfig) -> Result<SharedDataset> {
        if config.kbase_name().is_some() {
            return Ok(Arc::new(KBasePointer::new(Some(config.clone()))));
        }

        let provider = self.open_provider(config).await?;
        if config.is_only_memory() {
            Ok(Arc::new(Snapshot::from_provider(provider).await?))
        } else {
            Ok(Arc::new(Scanner::new(provider)))
        }
    }
}
