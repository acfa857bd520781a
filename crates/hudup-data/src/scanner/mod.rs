//! Live datasets answering every query from a provider.

mod semi_scanner;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use hudup_core::config::DataConfig;
use hudup_core::export::ExportSlot;
use hudup_core::fetcher::{BoxFetcher, Mapper, MetaFetcher};
use hudup_core::types::{
    AttributeList, AttributeValue, Context, ContextList, ContextTemplateSchema, ExternalRecord,
    INVALID_ID, Id, MemProfiles, Profile, Rating, RatingVector,
};
use hudup_core::{Error, Result};
use tokio::sync::RwLock;

pub use self::semi_scanner::SemiScanner;
use crate::TRACING_TARGET_SCANNER;
use crate::dataset::{Dataset, DatasetBase, DatasetKind, SharedDataset};
use crate::provider::Provider;
use crate::snapshot::{Snapshot, SnapshotData};

/// A dataset that round-trips to its provider on every read.
///
/// Nothing is cached. Clearing the scanner closes the provider, after which
/// reads fail with [`ErrorKind::Closed`].
///
/// [`ErrorKind::Closed`]: hudup_core::ErrorKind::Closed
#[derive(Debug)]
pub struct Scanner {
    base: DatasetBase,
    provider: RwLock<Option<Arc<dyn Provider>>>,
}

impl Scanner {
    /// Binds a scanner to a provider, taking over its configuration.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            base: DatasetBase::new(Some(provider.config().clone())),
            provider: RwLock::new(Some(provider)),
        }
    }

    /// The bound provider and the configuration naming its units.
    async fn connection(&self) -> Result<(Arc<dyn Provider>, DataConfig)> {
        let provider = self
            .provider
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::closed().with_message("scanner is cleared"))?;
        let config = self
            .base
            .config()
            .await
            .unwrap_or_else(|| provider.config().clone());
        Ok((provider, config))
    }

    pub(crate) fn base(&self) -> &DatasetBase {
        &self.base
    }

    /// Reopens the same store for a new dataset.
    pub(crate) async fn duplicate_provider(&self) -> Result<Arc<dyn Provider>> {
        let (provider, _) = self.connection().await?;
        provider.duplicate().await
    }
}

#[async_trait]
impl Dataset for Scanner {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Scanner
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn export_slot(&self) -> &ExportSlot {
        self.base.export_slot()
    }

    async fn config(&self) -> Option<DataConfig> {
        self.base.config().await
    }

    async fn set_config(&self, config: Option<DataConfig>) {
        self.base.set_config(config).await;
    }

    async fn is_exclusive(&self) -> bool {
        self.base.is_exclusive()
    }

    async fn set_exclusive(&self, exclusive: bool) {
        self.base.set_exclusive(exclusive);
    }

    async fn provider(&self) -> Option<Arc<dyn Provider>> {
        self.provider.read().await.clone()
    }

    async fn fetch_user_ids(&self) -> Result<BoxFetcher<Id>> {
        let (provider, config) = self.connection().await?;
        provider.profile_ids(&config.user_unit()).await
    }

    async fn user_id(&self, external: &AttributeValue) -> Result<Id> {
        let (provider, config) = self.connection().await?;
        let id = provider.internal_id(&config.user_unit(), external).await?;
        Ok(id.unwrap_or(INVALID_ID))
    }

    async fn user_external_record(&self, user_id: Id) -> Result<Option<ExternalRecord>> {
        let (provider, config) = self.connection().await?;
        provider.external_record(&config.user_unit(), user_id).await
    }

    async fn fetch_item_ids(&self) -> Result<BoxFetcher<Id>> {
        let (provider, config) = self.connection().await?;
        provider.profile_ids(&config.item_unit()).await
    }

    async fn item_id(&self, external: &AttributeValue) -> Result<Id> {
        let (provider, config) = self.connection().await?;
        let id = provider.internal_id(&config.item_unit(), external).await?;
        Ok(id.unwrap_or(INVALID_ID))
    }

    async fn item_external_record(&self, item_id: Id) -> Result<Option<ExternalRecord>> {
        let (provider, config) = self.connection().await?;
        provider.external_record(&config.item_unit(), item_id).await
    }

    async fn rating(&self, user_id: Id, item_id: Id) -> Result<Option<Rating>> {
        let (provider, _) = self.connection().await?;
        let vector = provider.user_rating_vector(user_id).await?;
        Ok(vector.and_then(|v| v.get(item_id).cloned()))
    }

    async fn user_rating(&self, user_id: Id) -> Result<Option<RatingVector>> {
        let (provider, _) = self.connection().await?;
        provider.user_rating_vector(user_id).await
    }

    async fn fetch_user_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        let (provider, config) = self.connection().await?;
        let ids = provider.profile_ids(&config.user_unit()).await?;
        let mapper: Mapper<Id, RatingVector> = Arc::new(move |id: Id| {
            let provider = provider.clone();
            async move { provider.user_rating_vector(id).await }.boxed()
        });
        Ok(Box::new(MetaFetcher::new(ids, mapper)))
    }

    async fn item_rating(&self, item_id: Id) -> Result<Option<RatingVector>> {
        let (provider, _) = self.connection().await?;
        provider.item_rating_vector(item_id).await
    }

    async fn fetch_item_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        let (provider, config) = self.connection().await?;
        let ids = provider.profile_ids(&config.item_unit()).await?;
        let mapper: Mapper<Id, RatingVector> = Arc::new(move |id: Id| {
            let provider = provider.clone();
            async move { provider.item_rating_vector(id).await }.boxed()
        });
        Ok(Box::new(MetaFetcher::new(ids, mapper)))
    }

    async fn user_profile(&self, user_id: Id) -> Result<Option<Profile>> {
        let (provider, config) = self.connection().await?;
        provider.profile(&config.user_unit(), user_id).await
    }

    async fn fetch_user_profiles(&self) -> Result<BoxFetcher<Profile>> {
        let (provider, config) = self.connection().await?;
        provider.profiles(&config.user_unit(), None).await
    }

    async fn user_attributes(&self) -> Result<AttributeList> {
        let (provider, config) = self.connection().await?;
        provider.attributes(&config.user_unit()).await
    }

    async fn item_profile(&self, item_id: Id) -> Result<Option<Profile>> {
        let (provider, config) = self.connection().await?;
        provider.profile(&config.item_unit(), item_id).await
    }

    async fn fetch_item_profiles(&self) -> Result<BoxFetcher<Profile>> {
        let (provider, config) = self.connection().await?;
        provider.profiles(&config.item_unit(), None).await
    }

    async fn item_attributes(&self) -> Result<AttributeList> {
        let (provider, config) = self.connection().await?;
        provider.attributes(&config.item_unit()).await
    }

    async fn profile_of(&self, context: &Context) -> Result<Option<Profile>> {
        let (provider, _) = self.connection().await?;
        provider.cts_manager().profile_of(context).await
    }

    async fn profiles_of(&self, template_id: Id) -> Result<Option<MemProfiles>> {
        let (provider, _) = self.connection().await?;
        provider.cts_manager().profiles_of(template_id).await
    }

    async fn fetch_sample(&self) -> Result<BoxFetcher<Profile>> {
        let (provider, config) = self.connection().await?;
        provider.profiles(&config.sample_unit(), None).await
    }

    async fn ct_schema(&self) -> Result<Option<ContextTemplateSchema>> {
        let (provider, _) = self.connection().await?;
        provider.cts_manager().ct_schema().await.map(Some)
    }

    async fn catchup(&self) -> Result<Option<SharedDataset>> {
        let data = SnapshotData::read(self).await?;
        tracing::debug!(
            target: TRACING_TARGET_SCANNER,
            users = data.user_ratings.len(),
            items = data.item_ratings.len(),
            "scanner caught up into snapshot"
        );

        Ok(Some(Arc::new(Snapshot::new(self.config().await, data))))
    }

    async fn select_by_contexts(&self, contexts: &ContextList) -> Result<SharedDataset> {
        tracing::info!(
            target: TRACING_TARGET_SCANNER,
            contexts = contexts.len(),
            "selecting contexts in memory instead of through the provider"
        );

        let semi = SemiScanner::new(self.duplicate_provider().await?).await?;
        let selected = semi.select_by_contexts(contexts).await;
        semi.clear().await;
        selected
    }

    async fn clone_dataset(&self) -> Result<SharedDataset> {
        let scanner = Scanner::new(self.duplicate_provider().await?);
        scanner.set_config(self.config().await).await;
        Ok(Arc::new(scanner))
    }

    async fn clear(&self) {
        self.base.clear().await;

        let Some(provider) = self.provider.write().await.take() else {
            return;
        };
        if let Err(error) = provider.close().await {
            tracing::warn!(
                target: TRACING_TARGET_SCANNER,
                error = %error,
                "failed to close provider while clearing scanner"
            );
        }
    }
}
