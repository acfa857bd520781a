use std::any::Any;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use hudup_core::export::Stub;
use hudup_core::{Error, ErrorKind, Result};
use hudup_data::SharedDataset;
use hudup_data::pair::PairSlot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DatasetPoolsService, DatasetPoolsServiceImpl, PoolClient};
use crate::TRACING_TARGET_POOLS;
use crate::exchanged::{DatasetPoolExchanged, PoolManifest};
use crate::registry::{Registry, RemoteObject};
use crate::remote::DatasetRemote;

/// One pools service operation. Pools travel as manifests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum PoolsRequest {
    Contains(String),
    Get(String),
    Names,
    Put { name: String, pool: PoolManifest },
    Update { name: String, pool: PoolManifest },
    Remove(String),
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PoolsResponse {
    Done,
    Flag(bool),
    Names(Vec<String>),
    Pool(Option<PoolManifest>),
    Failed {
        kind: ErrorKind,
        message: Option<String>,
    },
}

/// Serves a [`DatasetPoolsServiceImpl`] through its registry.
#[derive(Debug)]
pub struct PoolsServer {
    service: Weak<DatasetPoolsServiceImpl>,
}

impl PoolsServer {
    pub fn new(service: &Arc<DatasetPoolsServiceImpl>) -> Self {
        Self {
            service: Arc::downgrade(service),
        }
    }

    async fn handle(&self, request: PoolsRequest) -> Result<PoolsResponse> {
        let service = self
            .service
            .upgrade()
            .ok_or_else(|| Error::closed().with_message("pools service is gone"))?;
        let registry = service.registry();

        Ok(match request {
            PoolsRequest::Contains(name) => PoolsResponse::Flag(service.contains(&name).await?),
            PoolsRequest::Get(name) => match service.get(&name).await? {
                Some(pool) => PoolsResponse::Pool(Some(pool.manifest().await)),
                None => PoolsResponse::Pool(None),
            },
            PoolsRequest::Names => PoolsResponse::Names(service.names().await?),
            PoolsRequest::Put { name, pool } => {
                let pool = DatasetPoolExchanged::bind(&pool, registry);
                PoolsResponse::Flag(service.put(&name, pool, &[]).await?)
            }
            PoolsRequest::Update { name, pool } => {
                let pool = DatasetPoolExchanged::bind(&pool, registry);
                PoolsResponse::Flag(service.update(&name, pool).await?)
            }
            PoolsRequest::Remove(name) => PoolsResponse::Flag(service.remove(&name).await?),
            PoolsRequest::Clear => {
                service.clear().await?;
                PoolsResponse::Done
            }
        })
    }
}

#[async_trait]
impl RemoteObject for PoolsServer {
    async fn invoke(&self, frame: Value) -> Result<Value> {
        let request: PoolsRequest = serde_json::from_value(frame).map_err(|e| {
            Error::transport()
                .with_message("undecodable pools request")
                .with_source(e)
        })?;

        let response = self.handle(request).await.unwrap_or_else(|error| {
            tracing::debug!(
                target: TRACING_TARGET_POOLS,
                error = %error,
                "pools operation failed"
            );
            PoolsResponse::Failed {
                kind: error.kind(),
                message: error.message.clone(),
            }
        });

        Ok(serde_json::to_value(response)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A [`DatasetPoolsService`] reached through a registry.
///
/// Pools handed to it are exported at `port` before their manifest is
/// sent. Clients cannot be tracked remotely.
#[derive(Debug, Clone)]
pub struct PoolsServiceStub {
    stub: Stub,
    registry: Arc<Registry>,
    port: u16,
}

impl PoolsServiceStub {
    pub fn new(stub: Stub, registry: Arc<Registry>, port: u16) -> Self {
        Self {
            stub,
            registry,
            port,
        }
    }

    async fn request(&self, request: PoolsRequest) -> Result<PoolsResponse> {
        match self.registry.call(&self.stub, &request).await? {
            PoolsResponse::Failed { kind, message } => {
                let error = Error::new(kind);
                Err(match message {
                    Some(message) => error.with_message(message),
                    None => error,
                })
            }
            response => Ok(response),
        }
    }

    async fn flag(&self, request: PoolsRequest) -> Result<bool> {
        match self.request(request).await? {
            PoolsResponse::Flag(flag) => Ok(flag),
            other => Err(unexpected(&other)),
        }
    }

    async fn manifest(&self, pool: &DatasetPoolExchanged) -> PoolManifest {
        pool.export(&self.registry, self.port, false)
            .await
            .manifest()
            .await
    }

    /// Exports `pool` and sends it. Exports made for a request the service
    /// refused or never answered are withdrawn again.
    async fn send_pool<F>(&self, pool: &DatasetPoolExchanged, request: F) -> Result<bool>
    where
        F: FnOnce(PoolManifest) -> PoolsRequest,
    {
        let fresh = unexported_datasets(pool).await;
        let manifest = self.manifest(pool).await;
        let accepted = self.flag(request(manifest)).await;
        if matches!(accepted, Ok(true)) {
            return accepted;
        }

        for dataset in fresh {
            if let Err(error) = dataset.export_slot().unexport().await {
                tracing::warn!(
                    target: TRACING_TARGET_POOLS,
                    error = %error,
                    "cannot withdraw refused pool export"
                );
            }
        }
        accepted
    }
}

/// Local datasets of a pool that are not exported yet.
async fn unexported_datasets(pool: &DatasetPoolExchanged) -> Vec<SharedDataset> {
    let mut datasets = Vec::new();
    for pair in pool.iter() {
        for slot in PairSlot::ALL {
            let Some(remote) = pair.remote(slot) else {
                continue;
            };

            let inner = match remote.as_wrapper() {
                Some(wrapper) => wrapper.remote().await,
                None => Some(remote.clone()),
            };
            if let Some(DatasetRemote::Local(dataset)) = inner
                && !dataset.export_slot().is_exported().await
            {
                datasets.push(dataset);
            }
        }
    }
    datasets
}

fn unexpected(response: &PoolsResponse) -> Error {
    Error::transport().with_message(format!("unexpected pools reply: {response:?}"))
}

#[async_trait]
impl DatasetPoolsService for PoolsServiceStub {
    async fn contains(&self, name: &str) -> Result<bool> {
        self.flag(PoolsRequest::Contains(name.to_owned())).await
    }

    async fn get(&self, name: &str) -> Result<Option<DatasetPoolExchanged>> {
        match self.request(PoolsRequest::Get(name.to_owned())).await? {
            PoolsResponse::Pool(manifest) => Ok(manifest
                .map(|manifest| DatasetPoolExchanged::bind(&manifest, &self.registry))),
            other => Err(unexpected(&other)),
        }
    }

    async fn names(&self) -> Result<Vec<String>> {
        match self.request(PoolsRequest::Names).await? {
            PoolsResponse::Names(names) => Ok(names),
            other => Err(unexpected(&other)),
        }
    }

    async fn put(
        &self,
        name: &str,
        pool: DatasetPoolExchanged,
        clients: &[Arc<dyn PoolClient>],
    ) -> Result<bool> {
        if !clients.is_empty() {
            return Err(Error::unsupported().with_message("clients cannot be tracked remotely"));
        }

        self.send_pool(&pool, |pool| PoolsRequest::Put {
            name: name.to_owned(),
            pool,
        })
        .await
    }

    async fn update(&self, name: &str, pool: DatasetPoolExchanged) -> Result<bool> {
        self.send_pool(&pool, |pool| PoolsRequest::Update {
            name: name.to_owned(),
            pool,
        })
        .await
    }

    async fn add_client(&self, _name: &str, _client: Arc<dyn PoolClient>) -> Result<bool> {
        Err(Error::unsupported().with_message("clients cannot be tracked remotely"))
    }

    async fn remove_client(&self, _client: &Arc<dyn PoolClient>, _released: bool) -> Result<bool> {
        Err(Error::unsupported().with_message("clients cannot be tracked remotely"))
    }

    async fn remove(&self, name: &str) -> Result<bool> {
        self.flag(PoolsRequest::Remove(name.to_owned())).await
    }

    async fn clear(&self) -> Result<()> {
        match self.request(PoolsRequest::Clear).await? {
            PoolsResponse::Done => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use hudup_core::config::DataConfig;
    use hudup_core::types::RatingTriple;
    use hudup_data::pair::DatasetPair;
    use hudup_data::pool::DatasetPool;
    use hudup_data::snapshot::Snapshot;

    use super::*;
    use crate::config::{PoolsServiceConfig, RegistryConfig};

    fn snapshot(uri: &str) -> SharedDataset {
        Arc::new(Snapshot::from_triples(
            Some(DataConfig::with_store_uri(uri)),
            [RatingTriple::new(1, 10, 4.0)],
        ))
    }

    async fn connect() -> (Arc<DatasetPoolsServiceImpl>, PoolsServiceStub) {
        let registry = Registry::new(RegistryConfig::default());
        let service = Arc::new(DatasetPoolsServiceImpl::new(
            registry.clone(),
            PoolsServiceConfig::default(),
        ));
        let stub = service.export().await.unwrap();
        (service, PoolsServiceStub::new(stub, registry, 0))
    }

    #[tokio::test]
    async fn pools_round_trip_through_the_registry() {
        let (service, remote) = connect().await;
        let pool = DatasetPoolExchanged::from_pool(&DatasetPool::from_pairs([DatasetPair::new(
            snapshot("mem://training"),
            snapshot("mem://testing"),
        )]));

        assert!(remote.put("shared", pool.clone(), &[]).await.unwrap());
        assert!(!remote.put("shared", pool.clone(), &[]).await.unwrap());
        assert!(service.contains("shared").await.unwrap());
        assert_eq!(remote.names().await.unwrap(), vec!["shared"]);

        let fetched = remote.get("shared").await.unwrap().unwrap();
        assert_eq!(fetched.get(0).unwrap().key(), pool.get(0).unwrap().key());

        let client_pool = fetched.to_dataset_pool_client();
        let training = client_pool.get(0).unwrap().training.clone().unwrap();
        assert!(training.rating(1, 10).await.unwrap().is_some());

        assert!(remote.remove("shared").await.unwrap());
        assert!(!remote.contains("shared").await.unwrap());
    }

    #[tokio::test]
    async fn refused_pools_leave_no_exports_behind() {
        let (service, remote) = connect().await;
        let pool = |prefix: &str| {
            DatasetPoolExchanged::from_pool(&DatasetPool::from_pairs([DatasetPair::new(
                snapshot(&format!("mem://{prefix}/training")),
                snapshot(&format!("mem://{prefix}/testing")),
            )]))
        };
        assert!(remote.put("shared", pool("first"), &[]).await.unwrap());
        let before = service.registry().len().await;

        assert!(!remote.put("shared", pool("second"), &[]).await.unwrap());
        assert!(!remote.update("missing", pool("third")).await.unwrap());
        assert_eq!(service.registry().len().await, before);

        // Datasets exported before the refused call stay exported.
        let accepted = pool("fourth");
        assert!(remote.put("other", accepted.clone(), &[]).await.unwrap());
        let after = service.registry().len().await;
        assert!(!remote.put("other", accepted, &[]).await.unwrap());
        assert_eq!(service.registry().len().await, after);
    }

    #[tokio::test]
    async fn client_tracking_stays_local() {
        let (_service, remote) = connect().await;
        let error = remote.remove_client(&placeholder(), false).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unsupported);
    }

    fn placeholder() -> Arc<dyn PoolClient> {
        let (_, shared) = super::super::client::tests::CountingClient::shared();
        shared
    }
}
