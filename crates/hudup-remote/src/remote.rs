//! Client side of an exported dataset.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use hudup_core::Result;
use hudup_core::config::DataConfig;
use hudup_core::export::{ExportSlot, Stub};
use hudup_core::fetcher::{BoxFetcher, MemFetcher};
use hudup_core::types::{
    AttributeList, AttributeValue, Context, ContextList, ContextTemplateSchema, ExternalRecord,
    Id, MemProfiles, Profile, Rating, RatingMatrix, RatingVector,
};
use hudup_data::provider::Provider;
use hudup_data::snapshot::Snapshot;
use hudup_data::{Dataset, DatasetKind, SharedDataset};

use crate::TRACING_TARGET_WRAPPER;
use crate::protocol::{DatasetRequest, DatasetResponse, DatasetTransfer, unexpected};
use crate::registry::Registry;
use crate::wrapper::DatasetRemoteWrapper;

/// Sends a request and unpacks the expected reply variant.
macro_rules! reply {
    ($stub:expr, $request:expr, $variant:ident) => {{
        let request = $request;
        let name = request.name();
        match $stub.request(request).await {
            Ok(DatasetResponse::$variant(value)) => Ok(value),
            Ok(other) => Err(unexpected(name, &other)),
            Err(error) => Err(error),
        }
    }};
}

/// Proxy for a dataset exported in a registry.
///
/// Every operation is one call through the registry. Failures are returned
/// as they are, transport failures included; [`DatasetRemoteWrapper`] is the
/// layer that softens them.
#[derive(Debug)]
pub struct DatasetStub {
    stub: Stub,
    registry: Arc<Registry>,
    export: ExportSlot,
}

impl DatasetStub {
    pub fn new(stub: Stub, registry: Arc<Registry>) -> Self {
        Self {
            stub,
            registry,
            export: ExportSlot::new(),
        }
    }

    pub fn stub(&self) -> Stub {
        self.stub
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Sends one request, turning a failure reply into an error.
    pub async fn request(&self, request: DatasetRequest) -> Result<DatasetResponse> {
        let response: DatasetResponse = self.registry.call(&self.stub, &request).await?;
        response.into_result()
    }

    /// Asks the serving side to withdraw the dataset's export.
    pub async fn unexport_remote(&self) -> Result<()> {
        self.request(DatasetRequest::Unexport).await.map(|_| ())
    }

    fn receive(&self, transfer: DatasetTransfer) -> SharedDataset {
        receive(transfer, &self.registry)
    }

    async fn receive_some(&self, request: DatasetRequest) -> Result<SharedDataset> {
        let name = request.name();
        match reply!(self, request, Dataset)? {
            Some(transfer) => Ok(self.receive(transfer)),
            None => Err(unexpected(name, &DatasetResponse::Dataset(None))),
        }
    }
}

/// Rebuilds a dataset received from the serving side.
///
/// Exported datasets come back wrapped exclusively: the receiver owns them
/// and clearing the wrapper clears them remotely.
pub fn receive(transfer: DatasetTransfer, registry: &Arc<Registry>) -> SharedDataset {
    match transfer {
        DatasetTransfer::Value { config, data } => Arc::new(Snapshot::new(config, *data)),
        DatasetTransfer::Exported { stub } => {
            let remote = DatasetRemote::connect(stub, registry.clone());
            Arc::new(DatasetRemoteWrapper::new(remote, true))
        }
    }
}

fn fetcher<E>(items: Vec<E>) -> Result<BoxFetcher<E>>
where
    E: Clone + Send + Sync + 'static,
{
    Ok(Box::new(MemFetcher::new(items)))
}

#[async_trait]
impl Dataset for DatasetStub {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Remote
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn export_slot(&self) -> &ExportSlot {
        &self.export
    }

    async fn config(&self) -> Option<DataConfig> {
        let result: Result<Option<DataConfig>> = reply!(self, DatasetRequest::Config, Config);
        result.unwrap_or_else(|error| {
            tracing::warn!(
                target: TRACING_TARGET_WRAPPER,
                object_id = %self.stub.object_id,
                error = %error,
                "cannot read remote config"
            );
            None
        })
    }

    async fn set_config(&self, config: Option<DataConfig>) {
        if let Err(error) = self.request(DatasetRequest::SetConfig(config)).await {
            tracing::warn!(
                target: TRACING_TARGET_WRAPPER,
                object_id = %self.stub.object_id,
                error = %error,
                "cannot set remote config"
            );
        }
    }

    async fn is_exclusive(&self) -> bool {
        let result: Result<bool> = reply!(self, DatasetRequest::IsExclusive, Flag);
        result.unwrap_or_else(|error| {
            tracing::warn!(
                target: TRACING_TARGET_WRAPPER,
                object_id = %self.stub.object_id,
                error = %error,
                "cannot read remote exclusivity"
            );
            false
        })
    }

    async fn set_exclusive(&self, exclusive: bool) {
        if let Err(error) = self.request(DatasetRequest::SetExclusive(exclusive)).await {
            tracing::warn!(
                target: TRACING_TARGET_WRAPPER,
                object_id = %self.stub.object_id,
                error = %error,
                "cannot set remote exclusivity"
            );
        }
    }

    async fn provider(&self) -> Option<Arc<dyn Provider>> {
        None
    }

    async fn fetch_user_ids(&self) -> Result<BoxFetcher<Id>> {
        fetcher(reply!(self, DatasetRequest::FetchUserIds, Ids)?)
    }

    async fn user_id(&self, external: &AttributeValue) -> Result<Id> {
        reply!(self, DatasetRequest::UserId(external.clone()), Id)
    }

    async fn user_external_record(&self, user_id: Id) -> Result<Option<ExternalRecord>> {
        reply!(self, DatasetRequest::UserExternalRecord(user_id), Record)
    }

    async fn fetch_item_ids(&self) -> Result<BoxFetcher<Id>> {
        fetcher(reply!(self, DatasetRequest::FetchItemIds, Ids)?)
    }

    async fn item_id(&self, external: &AttributeValue) -> Result<Id> {
        reply!(self, DatasetRequest::ItemId(external.clone()), Id)
    }

    async fn item_external_record(&self, item_id: Id) -> Result<Option<ExternalRecord>> {
        reply!(self, DatasetRequest::ItemExternalRecord(item_id), Record)
    }

    async fn rating(&self, user_id: Id, item_id: Id) -> Result<Option<Rating>> {
        reply!(self, DatasetRequest::Rating { user_id, item_id }, Rating)
    }

    async fn user_rating(&self, user_id: Id) -> Result<Option<RatingVector>> {
        reply!(self, DatasetRequest::UserRating(user_id), Vector)
    }

    async fn fetch_user_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        fetcher(reply!(self, DatasetRequest::FetchUserRatings, Vectors)?)
    }

    async fn item_rating(&self, item_id: Id) -> Result<Option<RatingVector>> {
        reply!(self, DatasetRequest::ItemRating(item_id), Vector)
    }

    async fn fetch_item_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        fetcher(reply!(self, DatasetRequest::FetchItemRatings, Vectors)?)
    }

    async fn create_user_matrix(&self) -> Result<Option<RatingMatrix>> {
        reply!(self, DatasetRequest::CreateUserMatrix, Matrix)
    }

    async fn create_item_matrix(&self) -> Result<Option<RatingMatrix>> {
        reply!(self, DatasetRequest::CreateItemMatrix, Matrix)
    }

    async fn user_profile(&self, user_id: Id) -> Result<Option<Profile>> {
        reply!(self, DatasetRequest::UserProfile(user_id), Profile)
    }

    async fn fetch_user_profiles(&self) -> Result<BoxFetcher<Profile>> {
        fetcher(reply!(self, DatasetRequest::FetchUserProfiles, Profiles)?)
    }

    async fn user_attributes(&self) -> Result<AttributeList> {
        reply!(self, DatasetRequest::UserAttributes, Attributes)
    }

    async fn item_profile(&self, item_id: Id) -> Result<Option<Profile>> {
        reply!(self, DatasetRequest::ItemProfile(item_id), Profile)
    }

    async fn fetch_item_profiles(&self) -> Result<BoxFetcher<Profile>> {
        fetcher(reply!(self, DatasetRequest::FetchItemProfiles, Profiles)?)
    }

    async fn item_attributes(&self) -> Result<AttributeList> {
        reply!(self, DatasetRequest::ItemAttributes, Attributes)
    }

    async fn profile_of(&self, context: &Context) -> Result<Option<Profile>> {
        reply!(self, DatasetRequest::ProfileOf(context.clone()), Profile)
    }

    async fn profiles_of(&self, template_id: Id) -> Result<Option<MemProfiles>> {
        reply!(self, DatasetRequest::ProfilesOf(template_id), ProfileTable)
    }

    async fn fetch_sample(&self) -> Result<BoxFetcher<Profile>> {
        fetcher(reply!(self, DatasetRequest::FetchSample, Profiles)?)
    }

    async fn ct_schema(&self) -> Result<Option<ContextTemplateSchema>> {
        reply!(self, DatasetRequest::CtSchema, Schema)
    }

    async fn catchup(&self) -> Result<Option<SharedDataset>> {
        match reply!(self, DatasetRequest::Catchup, Dataset)? {
            Some(transfer) => Ok(Some(self.receive(transfer))),
            None => Ok(None),
        }
    }

    async fn select_by_contexts(&self, contexts: &ContextList) -> Result<SharedDataset> {
        self.receive_some(DatasetRequest::SelectByContexts(contexts.clone()))
            .await
    }

    async fn clone_dataset(&self) -> Result<SharedDataset> {
        self.receive_some(DatasetRequest::CloneDataset).await
    }

    /// Clears the remote dataset. Failures are logged.
    async fn clear(&self) {
        if let Err(error) = self.request(DatasetRequest::Clear).await {
            tracing::warn!(
                target: TRACING_TARGET_WRAPPER,
                object_id = %self.stub.object_id,
                error = %error,
                "cannot clear remote dataset"
            );
        }

        if let Err(error) = self.export.unexport().await {
            tracing::warn!(
                target: TRACING_TARGET_WRAPPER,
                error = %error,
                "cannot unexport dataset proxy"
            );
        }
    }
}

/// A dataset reachable from here: either in this process, or a proxy for
/// one exported in a registry.
#[derive(Debug, Clone)]
pub enum DatasetRemote {
    Local(SharedDataset),
    Stub(Arc<DatasetStub>),
}

impl DatasetRemote {
    pub fn connect(stub: Stub, registry: Arc<Registry>) -> Self {
        Self::Stub(Arc::new(DatasetStub::new(stub, registry)))
    }

    /// The dataset as a trait object.
    pub fn dataset(&self) -> SharedDataset {
        match self {
            Self::Local(dataset) => dataset.clone(),
            Self::Stub(stub) => stub.clone() as SharedDataset,
        }
    }

    pub fn as_local(&self) -> Option<&SharedDataset> {
        match self {
            Self::Local(dataset) => Some(dataset),
            Self::Stub(_) => None,
        }
    }

    pub fn as_stub(&self) -> Option<&Arc<DatasetStub>> {
        match self {
            Self::Local(_) => None,
            Self::Stub(stub) => Some(stub),
        }
    }

    /// The local dataset if it is a remote wrapper.
    pub fn as_wrapper(&self) -> Option<&DatasetRemoteWrapper> {
        self.as_local()?
            .as_any()
            .downcast_ref::<DatasetRemoteWrapper>()
    }

    /// The stub callers elsewhere reach this dataset by, if any.
    pub async fn stub(&self) -> Option<Stub> {
        match self {
            Self::Local(dataset) => dataset.export_slot().stub().await,
            Self::Stub(stub) => Some(stub.stub()),
        }
    }

    /// The dataset at the end of any chain of wrappers.
    ///
    /// Stubs served by their own registry are resolved to the dataset they
    /// proxy. `None` when a wrapper along the way was released.
    pub async fn innermost(&self) -> Option<SharedDataset> {
        let mut current = self.clone();
        loop {
            current = match current {
                Self::Local(dataset) => {
                    match dataset.as_any().downcast_ref::<DatasetRemoteWrapper>() {
                        Some(wrapper) => wrapper.remote().await?,
                        None => return Some(dataset),
                    }
                }
                Self::Stub(stub) => match stub.registry().resolve_dataset(&stub.stub()).await {
                    Some(dataset) => Self::Local(dataset),
                    None => return Some(stub as SharedDataset),
                },
            };
        }
    }
}

impl From<SharedDataset> for DatasetRemote {
    fn from(dataset: SharedDataset) -> Self {
        Self::Local(dataset)
    }
}

#[cfg(test)]
mod tests {
    use hudup_core::ErrorKind;
    use hudup_core::fetcher::drain_boxed;
    use hudup_core::types::RatingTriple;
    use hudup_data::pointer::ServerPointer;

    use super::*;
    use crate::config::RegistryConfig;
    use crate::server::export_dataset;

    fn snapshot() -> SharedDataset {
        Arc::new(Snapshot::from_triples(
            Some(DataConfig::with_store_uri("mem://remote")),
            [
                RatingTriple::new(1, 10, 4.0),
                RatingTriple::new(2, 10, 5.0),
                RatingTriple::new(2, 20, 3.0),
            ],
        ))
    }

    async fn connect(registry: &Arc<Registry>, dataset: &SharedDataset) -> DatasetStub {
        let stub = export_dataset(registry, dataset, 0).await.unwrap();
        DatasetStub::new(stub, registry.clone())
    }

    #[tokio::test]
    async fn reads_go_through_the_registry() {
        let registry = Registry::new(RegistryConfig::default());
        let dataset = snapshot();
        let proxy = connect(&registry, &dataset).await;

        assert_eq!(proxy.kind(), DatasetKind::Remote);
        assert_eq!(
            proxy.config().await.and_then(|c| c.store_uri()).as_deref(),
            Some("mem://remote")
        );

        let user_ids = drain_boxed(proxy.fetch_user_ids().await.unwrap()).await.unwrap();
        assert_eq!(user_ids, vec![1, 2]);

        let rating = proxy.rating(2, 20).await.unwrap().unwrap();
        assert_eq!(rating.value, 3.0);
        assert!(proxy.rating(1, 20).await.unwrap().is_none());

        dataset.set_exclusive(true).await;
        assert!(proxy.is_exclusive().await);
    }

    #[tokio::test]
    async fn snapshots_come_back_by_value() {
        let registry = Registry::new(RegistryConfig::default());
        let dataset = snapshot();
        let proxy = connect(&registry, &dataset).await;

        let copy = proxy.clone_dataset().await.unwrap();
        assert_eq!(copy.kind(), DatasetKind::Snapshot);
        assert_eq!(registry.len().await, 1);
        assert!(copy.rating(1, 10).await.unwrap().is_some());

        // Already in memory on the serving side.
        assert!(proxy.catchup().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_stub_is_a_transport_failure() {
        let registry = Registry::new(RegistryConfig::default());
        let dataset = snapshot();
        let proxy = connect(&registry, &dataset).await;

        dataset.export_slot().unexport().await.unwrap();

        let error = proxy.fetch_item_ids().await.unwrap_err();
        assert!(error.is_transport());
        assert!(proxy.config().await.is_none());
        assert!(!proxy.is_exclusive().await);
    }

    #[tokio::test]
    async fn remote_failures_keep_their_kind() {
        let registry = Registry::new(RegistryConfig::default());
        let pointer: SharedDataset = Arc::new(ServerPointer::to_server("localhost", 10151, None));
        let proxy = connect(&registry, &pointer).await;

        let error = proxy.user_rating(1).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn innermost_resolves_local_stubs() {
        let registry = Registry::new(RegistryConfig::default());
        let dataset = snapshot();
        let proxy = Arc::new(connect(&registry, &dataset).await);

        let wrapper: SharedDataset = Arc::new(DatasetRemoteWrapper::new(
            DatasetRemote::Stub(proxy),
            false,
        ));
        let remote = DatasetRemote::Local(wrapper);

        let innermost = remote.innermost().await.unwrap();
        assert!(hudup_data::dataset::same_dataset(&innermost, &dataset));
    }
}
