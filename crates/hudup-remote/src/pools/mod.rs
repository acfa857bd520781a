//! Named dataset pools shared with remote clients.

mod client;
mod item;
mod remote;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use hudup_core::export::{ExportSlot, Stub, Unexporter};
use hudup_core::{Error, Result};
use tokio::sync::Mutex;

pub use self::client::{ClientStatus, ClientWrapper, PoolClient};
pub use self::item::DatasetPoolExchangedItem;
pub use self::remote::{PoolsRequest, PoolsResponse, PoolsServer, PoolsServiceStub};
use crate::TRACING_TARGET_POOLS;
use crate::config::PoolsServiceConfig;
use crate::exchanged::DatasetPoolExchanged;
use crate::registry::Registry;

/// A registry of named pools, each tracked with the clients using it.
#[async_trait]
pub trait DatasetPoolsService: Send + Sync {
    async fn contains(&self, name: &str) -> Result<bool>;

    /// The pool registered under `name`.
    async fn get(&self, name: &str) -> Result<Option<DatasetPoolExchanged>>;

    async fn names(&self) -> Result<Vec<String>>;

    /// Registers and exports a pool under a new name.
    ///
    /// Returns false, leaving the registered pool untouched, if the name
    /// is taken.
    async fn put(
        &self,
        name: &str,
        pool: DatasetPoolExchanged,
        clients: &[Arc<dyn PoolClient>],
    ) -> Result<bool>;

    /// Reconciles a registered pool with a client's view of it; false if
    /// there is no such pool.
    async fn update(&self, name: &str, pool: DatasetPoolExchanged) -> Result<bool>;

    /// Starts tracking a client of a pool; false if there is no such pool
    /// or the client is tracked already.
    async fn add_client(&self, name: &str, client: Arc<dyn PoolClient>) -> Result<bool>;

    /// Stops tracking a client in every pool. With `released`, the client
    /// is also asked to release, once however many pools it used.
    ///
    /// Returns whether the client was tracked anywhere.
    async fn remove_client(&self, client: &Arc<dyn PoolClient>, released: bool) -> Result<bool>;

    /// Removes and closes a pool; false if there is no such pool.
    async fn remove(&self, name: &str) -> Result<bool>;

    /// Removes and closes every pool.
    async fn clear(&self) -> Result<()>;
}

/// The in-process [`DatasetPoolsService`].
///
/// Mutations are serialized by one lock over the pool table. Pools leaving
/// the table are closed after the lock is released, since closing calls
/// back into clients.
pub struct DatasetPoolsServiceImpl {
    registry: Arc<Registry>,
    config: PoolsServiceConfig,
    items: Mutex<BTreeMap<String, DatasetPoolExchangedItem>>,
    export: ExportSlot,
}

impl DatasetPoolsServiceImpl {
    pub fn new(registry: Arc<Registry>, config: PoolsServiceConfig) -> Self {
        Self {
            registry,
            config,
            items: Mutex::default(),
            export: ExportSlot::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &PoolsServiceConfig {
        &self.config
    }

    /// Port pools are exported at.
    pub fn port(&self) -> u16 {
        self.config.port_or(self.registry.config().registry_port)
    }

    /// Number of clients tracked for a pool.
    pub async fn client_count(&self, name: &str) -> Option<usize> {
        self.items
            .lock()
            .await
            .get(name)
            .map(DatasetPoolExchangedItem::client_count)
    }

    /// Asks every client of a pool to reload it, outside the lock. Returns
    /// how many clients were asked, or `None` without such a pool.
    pub async fn reset_clients(&self, name: &str) -> Option<usize> {
        let clients: Vec<ClientWrapper> = {
            let items = self.items.lock().await;
            items.get(name)?.clients().cloned().collect()
        };

        for client in &clients {
            if let Err(error) = client.reset().await {
                tracing::warn!(
                    target: TRACING_TARGET_POOLS,
                    pool = name,
                    client = client.name(),
                    error = %error,
                    "cannot reset pool client"
                );
            }
        }

        Some(clients.len())
    }

    /// Serves the service itself through the registry.
    pub async fn export(self: &Arc<Self>) -> Result<Stub> {
        let port = self.port();
        self.export
            .export_with(|| async move {
                let server = Arc::new(PoolsServer::new(self));
                let stub = self.registry.export(server, port).await?;
                let unexporter: std::sync::Weak<dyn Unexporter> = self.registry.unexporter();
                Ok((stub, unexporter))
            })
            .await
    }

    pub async fn unexport(&self) -> Result<()> {
        self.export.unexport().await
    }

    /// Unexports the service and closes every pool.
    pub async fn close(&self) {
        if let Err(error) = self.unexport().await {
            tracing::warn!(
                target: TRACING_TARGET_POOLS,
                error = %error,
                "cannot unexport pools service"
            );
        }

        // Never fails in process.
        let _ = DatasetPoolsService::clear(self).await;
    }
}

impl std::fmt::Debug for DatasetPoolsServiceImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetPoolsServiceImpl")
            .field("registry", &self.registry.id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatasetPoolsService for DatasetPoolsServiceImpl {
    async fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.items.lock().await.contains_key(name))
    }

    async fn get(&self, name: &str) -> Result<Option<DatasetPoolExchanged>> {
        Ok(self
            .items
            .lock()
            .await
            .get(name)
            .map(|item| item.pool().clone()))
    }

    async fn names(&self) -> Result<Vec<String>> {
        Ok(self.items.lock().await.keys().cloned().collect())
    }

    async fn put(
        &self,
        name: &str,
        pool: DatasetPoolExchanged,
        clients: &[Arc<dyn PoolClient>],
    ) -> Result<bool> {
        if name.is_empty() {
            return Err(Error::invalid_input().with_message("pool name is empty"));
        }

        let mut items = self.items.lock().await;
        if items.contains_key(name) {
            return Ok(false);
        }

        let mut pool = pool;
        pool.fill_missing_uuid();
        let exported = pool
            .export(&self.registry, self.port(), self.config.pools_exclusive)
            .await;

        let mut item = DatasetPoolExchangedItem::new(name, exported);
        for client in clients {
            item.add_client(client);
        }

        tracing::info!(
            target: TRACING_TARGET_POOLS,
            pool = name,
            pairs = item.pool().len(),
            clients = item.client_count(),
            "pool registered"
        );
        items.insert(name.to_owned(), item);
        Ok(true)
    }

    async fn update(&self, name: &str, pool: DatasetPoolExchanged) -> Result<bool> {
        let mut items = self.items.lock().await;
        let Some(item) = items.get_mut(name) else {
            return Ok(false);
        };

        item.pool_mut().sync_with_client_pool(&pool).await;
        let exported = item
            .pool()
            .export(&self.registry, self.port(), self.config.pools_exclusive)
            .await;
        *item.pool_mut() = exported;

        tracing::info!(
            target: TRACING_TARGET_POOLS,
            pool = name,
            pairs = item.pool().len(),
            "pool updated"
        );
        Ok(true)
    }

    async fn add_client(&self, name: &str, client: Arc<dyn PoolClient>) -> Result<bool> {
        let mut items = self.items.lock().await;
        Ok(items
            .get_mut(name)
            .is_some_and(|item| item.add_client(&client)))
    }

    async fn remove_client(&self, client: &Arc<dyn PoolClient>, released: bool) -> Result<bool> {
        let removed: Vec<ClientWrapper> = {
            let mut items = self.items.lock().await;
            items
                .values_mut()
                .filter_map(|item| item.remove_client(client))
                .collect()
        };

        if released && let Some(first) = removed.first() {
            first.close().await?;
        }

        tracing::debug!(
            target: TRACING_TARGET_POOLS,
            pools = removed.len(),
            released,
            "pool client removed"
        );
        Ok(!removed.is_empty())
    }

    async fn remove(&self, name: &str) -> Result<bool> {
        let removed = self.items.lock().await.remove(name);
        match removed {
            Some(item) => {
                item.close().await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear(&self) -> Result<()> {
        let items = std::mem::take(&mut *self.items.lock().await);
        for item in items.into_values() {
            item.close().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hudup_core::config::DataConfig;
    use hudup_core::types::RatingTriple;
    use hudup_data::pair::DatasetPair;
    use hudup_data::pool::DatasetPool;
    use hudup_data::snapshot::Snapshot;
    use hudup_data::SharedDataset;

    use super::client::tests::CountingClient;
    use super::*;
    use crate::config::RegistryConfig;

    fn snapshot(uri: &str) -> SharedDataset {
        Arc::new(Snapshot::from_triples(
            Some(DataConfig::with_store_uri(uri)),
            [RatingTriple::new(1, 10, 4.0)],
        ))
    }

    fn pool(prefix: &str) -> DatasetPoolExchanged {
        DatasetPoolExchanged::from_pool(&DatasetPool::from_pairs([DatasetPair::new(
            snapshot(&format!("mem://{prefix}/training")),
            snapshot(&format!("mem://{prefix}/testing")),
        )]))
    }

    fn service() -> DatasetPoolsServiceImpl {
        DatasetPoolsServiceImpl::new(
            Registry::new(RegistryConfig::default()),
            PoolsServiceConfig::default(),
        )
    }

    #[tokio::test]
    async fn put_refuses_taken_names() {
        let service = service();

        assert!(service.put("p", pool("first"), &[]).await.unwrap());
        assert!(!service.put("p", pool("second"), &[]).await.unwrap());

        let registered = service.get("p").await.unwrap().unwrap();
        let training = registered.get(0).unwrap().training.as_ref().unwrap().dataset();
        let uri = training.config().await.and_then(|c| c.store_uri());
        assert_eq!(uri.as_deref(), Some("mem://first/training"));
        assert_eq!(service.registry().len().await, 2);

        assert!(service.remove("p").await.unwrap());
        assert!(!service.contains("p").await.unwrap());
        assert!(!service.remove("p").await.unwrap());
        assert!(service.registry().is_empty().await);
    }

    #[tokio::test]
    async fn remove_releases_every_client() {
        let service = service();
        let (first, first_shared) = CountingClient::shared();
        let (second, second_shared) = CountingClient::shared();

        service
            .put("p", pool("p"), &[first_shared.clone()])
            .await
            .unwrap();
        assert!(service.add_client("p", second_shared.clone()).await.unwrap());
        assert!(!service.add_client("p", second_shared).await.unwrap());
        assert!(!service.add_client("missing", first_shared).await.unwrap());
        assert_eq!(service.client_count("p").await, Some(2));

        service.remove("p").await.unwrap();
        assert_eq!(first.released(), 1);
        assert_eq!(second.released(), 1);
    }

    #[tokio::test]
    async fn removed_client_is_released_once() {
        let service = service();
        let (client, shared) = CountingClient::shared();

        service.put("a", pool("a"), &[shared.clone()]).await.unwrap();
        service.put("b", pool("b"), &[shared.clone()]).await.unwrap();

        assert!(service.remove_client(&shared, true).await.unwrap());
        assert_eq!(client.released(), 1);
        assert_eq!(service.client_count("a").await, Some(0));
        assert_eq!(service.client_count("b").await, Some(0));

        assert!(!service.remove_client(&shared, true).await.unwrap());
        assert_eq!(client.released(), 1);

        // Pools outlive their clients.
        assert_eq!(service.names().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn update_syncs_with_the_client_view() {
        let service = service();
        service.put("p", pool("old"), &[]).await.unwrap();

        let replacement = pool("new");
        assert!(service.update("p", replacement.clone()).await.unwrap());
        assert!(!service.update("missing", replacement.clone()).await.unwrap());

        let registered = service.get("p").await.unwrap().unwrap();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered.get(0).unwrap().key(), replacement.get(0).unwrap().key());
        // The old pair was withdrawn, the new one exported.
        assert_eq!(service.registry().len().await, 2);
    }

    #[tokio::test]
    async fn clear_closes_everything() {
        let service = service();
        let (client, shared) = CountingClient::shared();
        service.put("a", pool("a"), &[shared]).await.unwrap();
        service.put("b", pool("b"), &[]).await.unwrap();

        service.clear().await.unwrap();

        assert!(service.names().await.unwrap().is_empty());
        assert_eq!(client.released(), 1);
        assert!(service.registry().is_empty().await);
    }

    /// Client reading the pool back from the service while reloading.
    struct ReloadingClient {
        service: std::sync::Weak<DatasetPoolsServiceImpl>,
        seen: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl PoolClient for ReloadingClient {
        fn name(&self) -> String {
            "reloading".to_owned()
        }

        async fn release_pool(&self) -> Result<()> {
            Ok(())
        }

        async fn reload_pool(&self) -> Result<()> {
            let service = self.service.upgrade().ok_or_else(Error::closed)?;
            if let Some(pool) = service.get("p").await? {
                self.seen
                    .fetch_add(pool.len(), std::sync::atomic::Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn clients_reload_without_the_lock_held() {
        let service = Arc::new(service());
        let client = Arc::new(ReloadingClient {
            service: Arc::downgrade(&service),
            seen: Default::default(),
        });
        let shared: Arc<dyn PoolClient> = client.clone();
        service.put("p", pool("p"), &[shared]).await.unwrap();

        let reset = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            service.reset_clients("p"),
        )
        .await;

        assert_eq!(reset.unwrap(), Some(1));
        assert_eq!(client.seen.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(service.reset_clients("missing").await, None);
    }
}
