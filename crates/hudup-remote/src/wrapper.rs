//! Local dataset handle over a [`DatasetRemote`].

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use hudup_core::config::DataConfig;
use hudup_core::export::{ExportSlot, Stub};
use hudup_core::fetcher::{BoxFetcher, MemFetcher};
use hudup_core::types::{
    AttributeList, AttributeValue, Context, ContextList, ContextTemplateSchema, ExternalRecord,
    INVALID_ID, Id, MemProfiles, Profile, Rating, RatingMatrix, RatingVector,
};
use hudup_core::{Error, Result};
use hudup_data::provider::Provider;
use hudup_data::{Dataset, DatasetKind, SharedDataset};
use tokio::sync::RwLock;

use crate::TRACING_TARGET_WRAPPER;
use crate::registry::Registry;
use crate::remote::DatasetRemote;
use crate::server::export_dataset;

/// A dataset handle delegating to a [`DatasetRemote`].
///
/// Reads that fail to reach the remote side are logged and answered with
/// an empty fetcher, [`INVALID_ID`] or `None`. Any other failure, and every
/// failure of an operation producing a dataset, is returned.
///
/// The wrapper's own exclusivity decides what teardown does: an exclusive
/// wrapper owns the remote dataset and clears it, a shared one only lets go
/// of its reference.
#[derive(Debug)]
pub struct DatasetRemoteWrapper {
    remote: RwLock<Option<DatasetRemote>>,
    kind: DatasetKind,
    exclusive: AtomicBool,
    export: ExportSlot,
}

impl DatasetRemoteWrapper {
    pub fn new(remote: DatasetRemote, exclusive: bool) -> Self {
        let kind = match &remote {
            DatasetRemote::Local(dataset) => dataset.kind(),
            DatasetRemote::Stub(_) => DatasetKind::Remote,
        };

        Self {
            remote: RwLock::new(Some(remote)),
            kind,
            exclusive: AtomicBool::new(exclusive),
            export: ExportSlot::new(),
        }
    }

    /// The wrapped dataset, `None` once released.
    pub async fn remote(&self) -> Option<DatasetRemote> {
        self.remote.read().await.clone()
    }

    pub async fn is_released(&self) -> bool {
        self.remote.read().await.is_none()
    }

    fn exclusive(&self) -> bool {
        self.exclusive.load(Ordering::SeqCst)
    }

    async fn inner(&self) -> Result<SharedDataset> {
        match self.remote.read().await.as_ref() {
            Some(remote) => Ok(remote.dataset()),
            None => Err(Error::closed().with_message("remote dataset was released")),
        }
    }

    /// Runs a read, answering `default` when the remote side is unreachable.
    async fn read<T, F, Fut>(&self, operation: &'static str, default: T, f: F) -> Result<T>
    where
        F: FnOnce(SharedDataset) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match f(self.inner().await?).await {
            Err(error) if error.is_transport() => {
                tracing::warn!(
                    target: TRACING_TARGET_WRAPPER,
                    operation,
                    error = %error,
                    "remote read failed, answering default"
                );
                Ok(default)
            }
            result => result,
        }
    }

    async fn read_fetcher<E, F, Fut>(&self, operation: &'static str, f: F) -> Result<BoxFetcher<E>>
    where
        E: Clone + Send + Sync + 'static,
        F: FnOnce(SharedDataset) -> Fut,
        Fut: Future<Output = Result<BoxFetcher<E>>>,
    {
        self.read(operation, Box::new(MemFetcher::<E>::empty()) as BoxFetcher<E>, f)
            .await
    }

    /// Exports the wrapped dataset at `port`.
    ///
    /// A stub is passed through as it is; `None` once released.
    pub async fn export_inside(&self, registry: &Arc<Registry>, port: u16) -> Result<Option<Stub>> {
        match self.remote().await {
            Some(DatasetRemote::Local(dataset)) => {
                export_dataset(registry, &dataset, port).await.map(Some)
            }
            Some(DatasetRemote::Stub(stub)) => Ok(Some(stub.stub())),
            None => Ok(None),
        }
    }

    /// Releases the wrapped dataset and the wrapper's own export.
    ///
    /// An exclusive wrapper clears the remote dataset first; failures doing
    /// so are logged. A shared wrapper leaves it untouched.
    pub async fn unexport(&self) -> Result<()> {
        let remote = self.remote.write().await.take();
        if let Some(remote) = remote
            && self.exclusive()
        {
            tracing::debug!(
                target: TRACING_TARGET_WRAPPER,
                "clearing exclusively owned remote dataset"
            );
            remote.dataset().clear().await;
        }

        self.export.unexport().await
    }

    /// Withdraws the remote dataset's export and releases it, whoever owns
    /// it. The dataset is not cleared.
    pub async fn force_unexport(&self) -> Result<()> {
        let remote = self.remote.write().await.take();
        let withdrawn = match &remote {
            Some(DatasetRemote::Stub(stub)) => stub.unexport_remote().await,
            Some(DatasetRemote::Local(dataset)) => dataset.export_slot().unexport().await,
            None => Ok(()),
        };

        if let Err(error) = withdrawn {
            tracing::warn!(
                target: TRACING_TARGET_WRAPPER,
                error = %error,
                "cannot withdraw remote export"
            );
        }

        self.export.unexport().await
    }
}

#[async_trait]
impl Dataset for DatasetRemoteWrapper {
    fn kind(&self) -> DatasetKind {
        self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn export_slot(&self) -> &ExportSlot {
        &self.export
    }

    async fn config(&self) -> Option<DataConfig> {
        self.inner().await.ok()?.config().await
    }

    async fn set_config(&self, config: Option<DataConfig>) {
        if let Ok(dataset) = self.inner().await {
            dataset.set_config(config).await;
        }
    }

    async fn is_exclusive(&self) -> bool {
        self.exclusive()
    }

    async fn set_exclusive(&self, exclusive: bool) {
        self.exclusive.store(exclusive, Ordering::SeqCst);
    }

    async fn provider(&self) -> Option<Arc<dyn Provider>> {
        self.inner().await.ok()?.provider().await
    }

    async fn fetch_user_ids(&self) -> Result<BoxFetcher<Id>> {
        self.read_fetcher("fetch_user_ids", |d| async move { d.fetch_user_ids().await })
            .await
    }

    async fn user_id(&self, external: &AttributeValue) -> Result<Id> {
        self.read("user_id", INVALID_ID, |d| async move { d.user_id(external).await })
            .await
    }

    async fn user_external_record(&self, user_id: Id) -> Result<Option<ExternalRecord>> {
        self.read("user_external_record", None, |d| async move {
            d.user_external_record(user_id).await
        })
        .await
    }

    async fn fetch_item_ids(&self) -> Result<BoxFetcher<Id>> {
        self.read_fetcher("fetch_item_ids", |d| async move { d.fetch_item_ids().await })
            .await
    }

    async fn item_id(&self, external: &AttributeValue) -> Result<Id> {
        self.read("item_id", INVALID_ID, |d| async move { d.item_id(external).await })
            .await
    }

    async fn item_external_record(&self, item_id: Id) -> Result<Option<ExternalRecord>> {
        self.read("item_external_record", None, |d| async move {
            d.item_external_record(item_id).await
        })
        .await
    }

    async fn rating(&self, user_id: Id, item_id: Id) -> Result<Option<Rating>> {
        self.read("rating", None, |d| async move { d.rating(user_id, item_id).await })
            .await
    }

    async fn user_rating(&self, user_id: Id) -> Result<Option<RatingVector>> {
        self.read("user_rating", None, |d| async move { d.user_rating(user_id).await })
            .await
    }

    async fn fetch_user_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        self.read_fetcher("fetch_user_ratings", |d| async move {
            d.fetch_user_ratings().await
        })
        .await
    }

    async fn item_rating(&self, item_id: Id) -> Result<Option<RatingVector>> {
        self.read("item_rating", None, |d| async move { d.item_rating(item_id).await })
            .await
    }

    async fn fetch_item_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        self.read_fetcher("fetch_item_ratings", |d| async move {
            d.fetch_item_ratings().await
        })
        .await
    }

    async fn create_user_matrix(&self) -> Result<Option<RatingMatrix>> {
        self.read("create_user_matrix", None, |d| async move {
            d.create_user_matrix().await
        })
        .await
    }

    async fn create_item_matrix(&self) -> Result<Option<RatingMatrix>> {
        self.read("create_item_matrix", None, |d| async move {
            d.create_item_matrix().await
        })
        .await
    }

    async fn user_profile(&self, user_id: Id) -> Result<Option<Profile>> {
        self.read("user_profile", None, |d| async move { d.user_profile(user_id).await })
            .await
    }

    async fn fetch_user_profiles(&self) -> Result<BoxFetcher<Profile>> {
        self.read_fetcher("fetch_user_profiles", |d| async move {
            d.fetch_user_profiles().await
        })
        .await
    }

    async fn user_attributes(&self) -> Result<AttributeList> {
        self.read("user_attributes", AttributeList::new(), |d| async move {
            d.user_attributes().await
        })
        .await
    }

    async fn item_profile(&self, item_id: Id) -> Result<Option<Profile>> {
        self.read("item_profile", None, |d| async move { d.item_profile(item_id).await })
            .await
    }

    async fn fetch_item_profiles(&self) -> Result<BoxFetcher<Profile>> {
        self.read_fetcher("fetch_item_profiles", |d| async move {
            d.fetch_item_profiles().await
        })
        .await
    }

    async fn item_attributes(&self) -> Result<AttributeList> {
        self.read("item_attributes", AttributeList::new(), |d| async move {
            d.item_attributes().await
        })
        .await
    }

    async fn profile_of(&self, context: &Context) -> Result<Option<Profile>> {
        self.read("profile_of", None, |d| async move { d.profile_of(context).await })
            .await
    }

    async fn profiles_of(&self, template_id: Id) -> Result<Option<MemProfiles>> {
        self.read("profiles_of", None, |d| async move {
            d.profiles_of(template_id).await
        })
        .await
    }

    async fn fetch_sample(&self) -> Result<BoxFetcher<Profile>> {
        self.read_fetcher("fetch_sample", |d| async move { d.fetch_sample().await })
            .await
    }

    async fn ct_schema(&self) -> Result<Option<ContextTemplateSchema>> {
        self.read("ct_schema", None, |d| async move { d.ct_schema().await })
            .await
    }

    async fn catchup(&self) -> Result<Option<SharedDataset>> {
        self.inner().await?.catchup().await
    }

    async fn select_by_contexts(&self, contexts: &ContextList) -> Result<SharedDataset> {
        self.inner().await?.select_by_contexts(contexts).await
    }

    /// Copies the wrapped dataset; the copy gets a wrapper of its own with
    /// the same exclusivity.
    async fn clone_dataset(&self) -> Result<SharedDataset> {
        let copy = self.inner().await?.clone_dataset().await?;
        Ok(Arc::new(Self::new(
            DatasetRemote::Local(copy),
            self.exclusive(),
        )))
    }

    async fn clear(&self) {
        if let Err(error) = self.unexport().await {
            tracing::warn!(
                target: TRACING_TARGET_WRAPPER,
                error = %error,
                "cannot unexport remote wrapper"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use hudup_core::ErrorKind;
    use hudup_core::fetcher::drain_boxed;
    use hudup_core::types::{ContextList, RatingTriple};
    use hudup_data::pointer::KBasePointer;
    use hudup_data::provider::MemProvider;
    use hudup_data::scanner::Scanner;
    use hudup_data::snapshot::Snapshot;

    use super::*;
    use crate::config::RegistryConfig;

    fn snapshot() -> SharedDataset {
        Arc::new(Snapshot::from_triples(
            Some(DataConfig::with_store_uri("mem://wrapped")),
            [RatingTriple::new(1, 10, 4.0), RatingTriple::new(2, 20, 2.0)],
        ))
    }

    async fn wrap(
        registry: &Arc<Registry>,
        dataset: &SharedDataset,
        exclusive: bool,
    ) -> (Stub, DatasetRemoteWrapper) {
        let stub = export_dataset(registry, dataset, 0).await.unwrap();
        let remote = DatasetRemote::connect(stub, registry.clone());
        (stub, DatasetRemoteWrapper::new(remote, exclusive))
    }

    #[tokio::test]
    async fn unreachable_reads_answer_defaults() {
        let registry = Registry::new(RegistryConfig::default());
        let dataset = snapshot();
        let (_, wrapper) = wrap(&registry, &dataset, false).await;

        assert!(wrapper.rating(1, 10).await.unwrap().is_some());

        registry.shutdown().await;

        let ids = drain_boxed(wrapper.fetch_user_ids().await.unwrap()).await.unwrap();
        assert!(ids.is_empty());
        assert_eq!(
            wrapper.user_id(&AttributeValue::Integer(1)).await.unwrap(),
            INVALID_ID
        );
        assert!(wrapper.rating(1, 10).await.unwrap().is_none());
        assert!(wrapper.user_profile(1).await.unwrap().is_none());

        let error = wrapper.clone_dataset().await.unwrap_err();
        assert!(error.is_transport());
    }

    #[tokio::test]
    async fn unsupported_reads_still_fail() {
        let registry = Registry::new(RegistryConfig::default());
        let pointer: SharedDataset = Arc::new(KBasePointer::named("file:///tmp/kb", "green"));
        let (_, wrapper) = wrap(&registry, &pointer, false).await;

        let error = wrapper.fetch_item_ids().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unsupported);
        assert_eq!(wrapper.kind(), DatasetKind::Remote);
    }

    #[tokio::test]
    async fn exclusive_unexport_clears_the_remote_dataset() {
        let registry = Registry::new(RegistryConfig::default());
        let dataset = snapshot();
        let (stub, wrapper) = wrap(&registry, &dataset, true).await;

        wrapper.unexport().await.unwrap();

        assert!(wrapper.is_released().await);
        assert!(!registry.is_exported(&stub).await);
        assert!(dataset.config().await.is_none());
    }

    #[tokio::test]
    async fn shared_unexport_leaves_the_remote_dataset() {
        let registry = Registry::new(RegistryConfig::default());
        let dataset = snapshot();
        let (stub, wrapper) = wrap(&registry, &dataset, false).await;

        wrapper.clear().await;

        assert!(wrapper.is_released().await);
        assert!(registry.is_exported(&stub).await);
        assert!(dataset.config().await.is_some());

        let error = wrapper.fetch_user_ids().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Closed);
    }

    #[tokio::test]
    async fn forced_unexport_withdraws_without_clearing() {
        let registry = Registry::new(RegistryConfig::default());
        let dataset = snapshot();
        let (stub, wrapper) = wrap(&registry, &dataset, false).await;

        wrapper.force_unexport().await.unwrap();

        assert!(!registry.is_exported(&stub).await);
        assert!(dataset.config().await.is_some());
    }

    #[tokio::test]
    async fn remote_selection_is_owned_by_the_caller() {
        let registry = Registry::new(RegistryConfig::default());
        let provider = Arc::new(MemProvider::from_triples(
            DataConfig::with_store_uri("mem://scanned"),
            [RatingTriple::new(1, 10, 4.0)],
        ));
        let scanner: SharedDataset = Arc::new(Scanner::new(provider));
        let (_, wrapper) = wrap(&registry, &scanner, false).await;

        let selected = wrapper
            .select_by_contexts(&ContextList::default())
            .await
            .unwrap();
        assert_eq!(registry.len().await, 2);
        assert!(selected.is_exclusive().await);

        selected.clear().await;
        assert_eq!(registry.len().await, 1);

        let caught = wrapper.catchup().await.unwrap().unwrap();
        assert_eq!(caught.kind(), DatasetKind::Snapshot);
        assert!(caught.rating(1, 10).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn export_inside_reuses_the_stub() {
        let registry = Registry::new(RegistryConfig::default());
        let dataset = snapshot();
        let wrapper = DatasetRemoteWrapper::new(DatasetRemote::Local(dataset.clone()), false);

        let first = wrapper.export_inside(&registry, 0).await.unwrap().unwrap();
        let second = wrapper.export_inside(&registry, 0).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(dataset.export_slot().stub().await, Some(first));
    }
}
