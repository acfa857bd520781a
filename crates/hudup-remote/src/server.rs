//! Serving a dataset to registry callers.

use std::any::Any;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use hudup_core::export::{Stub, Unexporter};
use hudup_core::fetcher::drain_boxed;
use hudup_core::{Error, Result};
use hudup_data::snapshot::Snapshot;
use hudup_data::{Dataset, SharedDataset};
use serde_json::Value;

use crate::TRACING_TARGET_SERVER;
use crate::protocol::{DatasetRequest, DatasetResponse, DatasetTransfer};
use crate::registry::{Registry, RemoteObject};

/// Answers [`DatasetRequest`]s against one dataset.
///
/// Datasets produced by an operation go back by value when they are
/// snapshots and are exported at the server's own port otherwise.
#[derive(Debug)]
pub struct DatasetServer {
    dataset: SharedDataset,
    registry: Weak<Registry>,
    port: u16,
}

impl DatasetServer {
    pub fn new(dataset: SharedDataset, registry: &Arc<Registry>, port: u16) -> Self {
        Self {
            dataset,
            registry: Arc::downgrade(registry),
            port,
        }
    }

    pub fn dataset(&self) -> &SharedDataset {
        &self.dataset
    }

    /// Runs one operation.
    pub async fn handle(&self, request: DatasetRequest) -> Result<DatasetResponse> {
        use DatasetResponse as R;

        let dataset = &self.dataset;
        let response = match request {
            DatasetRequest::Kind => R::Kind(dataset.kind()),
            DatasetRequest::Config => R::Config(dataset.config().await),
            DatasetRequest::SetConfig(config) => {
                dataset.set_config(config).await;
                R::Done
            }
            DatasetRequest::IsExclusive => R::Flag(dataset.is_exclusive().await),
            DatasetRequest::SetExclusive(exclusive) => {
                dataset.set_exclusive(exclusive).await;
                R::Done
            }
            DatasetRequest::FetchUserIds => R::Ids(drain_boxed(dataset.fetch_user_ids().await?).await?),
            DatasetRequest::UserId(external) => R::Id(dataset.user_id(&external).await?),
            DatasetRequest::UserExternalRecord(id) => {
                R::Record(dataset.user_external_record(id).await?)
            }
            DatasetRequest::FetchItemIds => R::Ids(drain_boxed(dataset.fetch_item_ids().await?).await?),
            DatasetRequest::ItemId(external) => R::Id(dataset.item_id(&external).await?),
            DatasetRequest::ItemExternalRecord(id) => {
                R::Record(dataset.item_external_record(id).await?)
            }
            DatasetRequest::Rating { user_id, item_id } => {
                R::Rating(dataset.rating(user_id, item_id).await?)
            }
            DatasetRequest::UserRating(id) => R::Vector(dataset.user_rating(id).await?),
            DatasetRequest::FetchUserRatings => {
                R::Vectors(drain_boxed(dataset.fetch_user_ratings().await?).await?)
            }
            DatasetRequest::ItemRating(id) => R::Vector(dataset.item_rating(id).await?),
            DatasetRequest::FetchItemRatings => {
                R::Vectors(drain_boxed(dataset.fetch_item_ratings().await?).await?)
            }
            DatasetRequest::CreateUserMatrix => R::Matrix(dataset.create_user_matrix().await?),
            DatasetRequest::CreateItemMatrix => R::Matrix(dataset.create_item_matrix().await?),
            DatasetRequest::UserProfile(id) => R::Profile(dataset.user_profile(id).await?),
            DatasetRequest::FetchUserProfiles => {
                R::Profiles(drain_boxed(dataset.fetch_user_profiles().await?).await?)
            }
            DatasetRequest::UserAttributes => R::Attributes(dataset.user_attributes().await?),
            DatasetRequest::ItemProfile(id) => R::Profile(dataset.item_profile(id).await?),
            DatasetRequest::FetchItemProfiles => {
                R::Profiles(drain_boxed(dataset.fetch_item_profiles().await?).await?)
            }
            DatasetRequest::ItemAttributes => R::Attributes(dataset.item_attributes().await?),
            DatasetRequest::ProfileOf(context) => R::Profile(dataset.profile_of(&context).await?),
            DatasetRequest::ProfilesOf(id) => R::ProfileTable(dataset.profiles_of(id).await?),
            DatasetRequest::FetchSample => {
                R::Profiles(drain_boxed(dataset.fetch_sample().await?).await?)
            }
            DatasetRequest::CtSchema => R::Schema(dataset.ct_schema().await?),
            DatasetRequest::Catchup => match dataset.catchup().await? {
                Some(caught) => R::Dataset(Some(self.transfer(caught).await?)),
                None => R::Dataset(None),
            },
            DatasetRequest::SelectByContexts(contexts) => {
                let selected = dataset.select_by_contexts(&contexts).await?;
                R::Dataset(Some(self.transfer(selected).await?))
            }
            DatasetRequest::CloneDataset => {
                let copy = dataset.clone_dataset().await?;
                R::Dataset(Some(self.transfer(copy).await?))
            }
            DatasetRequest::Clear => {
                dataset.clear().await;
                R::Done
            }
            DatasetRequest::Unexport => {
                dataset.export_slot().unexport().await?;
                R::Done
            }
        };

        Ok(response)
    }

    async fn transfer(&self, dataset: SharedDataset) -> Result<DatasetTransfer> {
        if let Some(snapshot) = dataset.as_any().downcast_ref::<Snapshot>() {
            return Ok(DatasetTransfer::Value {
                config: snapshot.config().await,
                data: Box::new(snapshot.data().await.as_ref().clone()),
            });
        }

        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| Error::transport().with_message("registry is gone"))?;
        let stub = export_dataset(&registry, &dataset, self.port).await?;
        Ok(DatasetTransfer::Exported { stub })
    }
}

#[async_trait]
impl RemoteObject for DatasetServer {
    async fn invoke(&self, frame: Value) -> Result<Value> {
        let request: DatasetRequest = serde_json::from_value(frame).map_err(|e| {
            Error::transport()
                .with_message("undecodable request frame")
                .with_source(e)
        })?;

        let operation = request.name();
        let response = match self.handle(request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(
                    target: TRACING_TARGET_SERVER,
                    operation,
                    error = %error,
                    "dataset operation failed"
                );
                DatasetResponse::failed(&error)
            }
        };

        Ok(serde_json::to_value(response)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Exports a dataset at `port`, returning its existing stub if it already
/// is exported.
pub async fn export_dataset(
    registry: &Arc<Registry>,
    dataset: &SharedDataset,
    port: u16,
) -> Result<Stub> {
    dataset
        .export_slot()
        .export_with(|| register(registry, dataset, port))
        .await
}

async fn register(
    registry: &Arc<Registry>,
    dataset: &SharedDataset,
    port: u16,
) -> Result<(Stub, Weak<dyn Unexporter>)> {
    let server = DatasetServer::new(dataset.clone(), registry, port);
    let stub = registry.export(Arc::new(server), port).await?;
    Ok((stub, registry.unexporter()))
}

impl Registry {
    /// The dataset behind a stub, if it is served by this registry.
    pub async fn resolve_dataset(&self, stub: &Stub) -> Option<SharedDataset> {
        let object = self.resolve(stub).await?;
        object
            .as_any()
            .downcast_ref::<DatasetServer>()
            .map(|server| server.dataset().clone())
    }
}

#[cfg(test)]
mod tests {
    use hudup_core::ErrorKind;
    use hudup_core::config::DataConfig;
    use hudup_core::types::RatingTriple;
    use hudup_data::pointer::NullPointer;

    use super::*;
    use crate::config::RegistryConfig;

    fn snapshot() -> SharedDataset {
        Arc::new(Snapshot::from_triples(
            Some(DataConfig::with_store_uri("mem://fixture")),
            [RatingTriple::new(1, 10, 4.0)],
        ))
    }

    #[tokio::test]
    async fn export_is_idempotent_and_resolvable() {
        let registry = Registry::new(RegistryConfig::default());
        let dataset = snapshot();

        let first = export_dataset(&registry, &dataset, 0).await.unwrap();
        let second = export_dataset(&registry, &dataset, 0).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len().await, 1);

        let resolved = registry.resolve_dataset(&first).await.unwrap();
        assert!(hudup_data::dataset::same_dataset(&resolved, &dataset));
    }

    #[tokio::test]
    async fn clear_withdraws_the_export() {
        let registry = Registry::new(RegistryConfig::default());
        let dataset = snapshot();
        let stub = export_dataset(&registry, &dataset, 0).await.unwrap();

        let reply: DatasetResponse = registry.call(&stub, &DatasetRequest::Clear).await.unwrap();
        assert_eq!(reply, DatasetResponse::Done);
        assert!(!registry.is_exported(&stub).await);
        assert!(!dataset.export_slot().is_exported().await);
    }

    #[tokio::test]
    async fn failures_travel_as_replies() {
        let registry = Registry::new(RegistryConfig::default());
        let pointer: SharedDataset = Arc::new(hudup_data::pointer::ServerPointer::new(None));
        let stub = export_dataset(&registry, &pointer, 0).await.unwrap();

        let reply: DatasetResponse = registry
            .call(&stub, &DatasetRequest::FetchUserIds)
            .await
            .unwrap();
        let error = reply.into_result().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn in_memory_catchup_stays_put() {
        let registry = Registry::new(RegistryConfig::default());
        let pointer: SharedDataset = Arc::new(NullPointer::default());
        let stub = export_dataset(&registry, &pointer, 0).await.unwrap();

        let reply: DatasetResponse = registry.call(&stub, &DatasetRequest::Catchup).await.unwrap();
        assert_eq!(reply, DatasetResponse::Dataset(None));
    }
}
