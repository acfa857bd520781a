use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use hudup_core::Result;
use hudup_core::config::DataConfig;
use hudup_core::export::ExportSlot;
use hudup_core::fetcher::{BoxFetcher, MemFetcher};
use hudup_core::types::{
    AttributeList, AttributeValue, Context, ContextList, ContextTemplateSchema, ExternalRecord,
    INVALID_ID, Id, MemProfiles, Profile, Rating, RatingVector,
};

use crate::dataset::{Dataset, DatasetBase, DatasetKind, SharedDataset};
use crate::provider::Provider;

/// A pointer to nothing.
///
/// Every fetch answers an empty fetcher, every id lookup [`INVALID_ID`] and
/// every other lookup `None` or an empty attribute list. Nothing fails.
/// Pairs use it as a placeholder testing set.
#[derive(Debug, Default)]
pub struct NullPointer {
    base: DatasetBase,
}

impl NullPointer {
    pub fn new(config: Option<DataConfig>) -> Self {
        Self {
            base: DatasetBase::new(config),
        }
    }
}

fn empty<E: Send + Sync + 'static>() -> Result<BoxFetcher<E>> {
    Ok(Box::new(MemFetcher::<E>::empty()))
}

#[async_trait]
impl Dataset for NullPointer {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Pointer
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
        None
    }

    async fn fetch_user_ids(&self) -> Result<BoxFetcher<Id>> {
        empty()
    }

    async fn user_id(&self, _external: &AttributeValue) -> Result<Id> {
        Ok(INVALID_ID)
    }

    async fn user_external_record(&self, _user_id: Id) -> Result<Option<ExternalRecord>> {
        Ok(None)
    }

    async fn fetch_item_ids(&self) -> Result<BoxFetcher<Id>> {
        empty()
    }

    async fn item_id(&self, _external: &AttributeValue) -> Result<Id> {
        Ok(INVALID_ID)
    }

    async fn item_external_record(&self, _item_id: Id) -> Result<Option<ExternalRecord>> {
        Ok(None)
    }

    async fn rating(&self, _user_id: Id, _item_id: Id) -> Result<Option<Rating>> {
        Ok(None)
    }

    async fn user_rating(&self, _user_id: Id) -> Result<Option<RatingVector>> {
        Ok(None)
    }

    async fn fetch_user_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        empty()
    }

    async fn item_rating(&self, _item_id: Id) -> Result<Option<RatingVector>> {
        Ok(None)
    }

    async fn fetch_item_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        empty()
    }

    async fn user_profile(&self, _user_id: Id) -> Result<Option<Profile>> {
        Ok(None)
    }

    async fn fetch_user_profiles(&self) -> Result<BoxFetcher<Profile>> {
        empty()
    }

    async fn user_attributes(&self) -> Result<AttributeList> {
        Ok(AttributeList::default())
    }

    async fn item_profile(&self, _item_id: Id) -> Result<Option<Profile>> {
        Ok(None)
    }

    async fn fetch_item_profiles(&self) -> Result<BoxFetcher<Profile>> {
        empty()
    }

    async fn item_attributes(&self) -> Result<AttributeList> {
        Ok(AttributeList::default())
    }

    async fn profile_of(&self, _context: &Context) -> Result<Option<Profile>> {
        Ok(None)
    }

    async fn profiles_of(&self, _template_id: Id) -> Result<Option<MemProfiles>> {
        Ok(None)
    }

    async fn fetch_sample(&self) -> Result<BoxFetcher<Profile>> {
        empty()
    }

    async fn ct_schema(&self) -> Result<Option<ContextTemplateSchema>> {
        Ok(None)
    }

    async fn catchup(&self) -> Result<Option<SharedDataset>> {
        Ok(None)
    }

    async fn select_by_contexts(&self, _contexts: &ContextList) -> Result<SharedDataset> {
        Ok(Arc::new(NullPointer::new(self.config().await)))
    }

    async fn clone_dataset(&self) -> Result<SharedDataset> {
        let copy = NullPointer::new(self.config().await);
        copy.base.set_exclusive(self.base.is_exclusive());
        Ok(Arc::new(copy))
    }

    async fn clear(&self) {
        self.base.clear().await;
    }
}
