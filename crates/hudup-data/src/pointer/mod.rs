//! Datasets that hold no data, only a reference to something else.
//!
//! [`KBasePointer`] and [`ServerPointer`] refuse every read with
//! [`ErrorKind::Unsupported`]; what they offer is their own narrower API,
//! such as [`PointerDataset::target`]. [`NullPointer`] is the zero-value
//! pointer and answers every read with an empty result instead.
//!
//! No pointer has a provider.
//!
//! [`ErrorKind::Unsupported`]: hudup_core::ErrorKind::Unsupported

mod kbase_pointer;
mod null_pointer;
mod server_pointer;

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use hudup_core::config::DataConfig;
use hudup_core::export::ExportSlot;
use hudup_core::fetcher::BoxFetcher;
use hudup_core::types::{
    AttributeList, AttributeValue, Context, ContextList, ContextTemplateSchema, ExternalRecord,
    Id, MemProfiles, Profile, Rating, RatingMatrix, RatingVector,
};
use hudup_core::{Error, Result};

pub use self::kbase_pointer::{KBase, KBasePointer};
pub use self::null_pointer::NullPointer;
pub use self::server_pointer::{Server, ServerPointer};
use crate::TRACING_TARGET_POINTER;
use crate::dataset::{Dataset, DatasetBase, DatasetKind, SharedDataset};
use crate::provider::Provider;

/// What a pointer refers to.
pub trait Pointer: Send + Sync + fmt::Debug + 'static {
    /// Short name used in messages, e.g. `kbase`.
    const NAME: &'static str;

    /// Describes the target named by a configuration, if it names one.
    fn target(config: &DataConfig) -> Option<String>;
}

/// A pointer erased into a [`Dataset`].
pub struct PointerDataset<P> {
    base: DatasetBase,
    _pointer: PhantomData<fn() -> P>,
}

impl<P: Pointer> PointerDataset<P> {
    pub fn new(config: Option<DataConfig>) -> Self {
        Self {
            base: DatasetBase::new(config),
            _pointer: PhantomData,
        }
    }

    /// Describes what this pointer refers to.
    pub async fn target(&self) -> Option<String> {
        P::target(self.base.config().await.as_ref()?)
    }

    fn unsupported<T>(&self, operation: &str) -> Result<T> {
        tracing::debug!(
            target: TRACING_TARGET_POINTER,
            pointer = P::NAME,
            operation,
            "pointer read refused"
        );

        Err(Error::unsupported().with_message(format!(
            "{} pointer does not support {operation}",
            P::NAME
        )))
    }
}

impl<P> fmt::Debug for PointerDataset<P>
where
    P: Pointer,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointerDataset")
            .field("pointer", &P::NAME)
            .field("base", &self.base)
            .finish()
    }
}

#[async_trait]
impl<P: Pointer> Dataset for PointerDataset<P> {
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
        self.unsupported("fetch_user_ids")
    }

    async fn user_id(&self, _external: &AttributeValue) -> Result<Id> {
        self.unsupported("user_id")
    }

    async fn user_external_record(&self, _user_id: Id) -> Result<Option<ExternalRecord>> {
        self.unsupported("user_external_record")
    }

    async fn fetch_item_ids(&self) -> Result<BoxFetcher<Id>> {
        self.unsupported("fetch_item_ids")
    }

    async fn item_id(&self, _external: &AttributeValue) -> Result<Id> {
        self.unsupported("item_id")
    }

    async fn item_external_record(&self, _item_id: Id) -> Result<Option<ExternalRecord>> {
        self.unsupported("item_external_record")
    }

    async fn rating(&self, _user_id: Id, _item_id: Id) -> Result<Option<Rating>> {
        self.unsupported("rating")
    }

    async fn user_rating(&self, _user_id: Id) -> Result<Option<RatingVector>> {
        self.unsupported("user_rating")
    }

    async fn fetch_user_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        self.unsupported("fetch_user_ratings")
    }

    async fn item_rating(&self, _item_id: Id) -> Result<Option<RatingVector>> {
        self.unsupported("item_rating")
    }

    async fn fetch_item_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        self.unsupported("fetch_item_ratings")
    }

    async fn create_user_matrix(&self) -> Result<Option<RatingMatrix>> {
        self.unsupported("create_user_matrix")
    }

    async fn create_item_matrix(&self) -> Result<Option<RatingMatrix>> {
        self.unsupported("create_item_matrix")
    }

    async fn user_profile(&self, _user_id: Id) -> Result<Option<Profile>> {
        self.unsupported("user_profile")
    }

    async fn fetch_user_profiles(&self) -> Result<BoxFetcher<Profile>> {
        self.unsupported("fetch_user_profiles")
    }

    async fn user_attributes(&self) -> Result<AttributeList> {
        self.unsupported("user_attributes")
    }

    async fn item_profile(&self, _item_id: Id) -> Result<Option<Profile>> {
        self.unsupported("item_profile")
    }

    async fn fetch_item_profiles(&self) -> Result<BoxFetcher<Profile>> {
        self.unsupported("fetch_item_profiles")
    }

    async fn item_attributes(&self) -> Result<AttributeList> {
        self.unsupported("item_attributes")
    }

    async fn profile_of(&self, _context: &Context) -> Result<Option<Profile>> {
        self.unsupported("profile_of")
    }

    async fn profiles_of(&self, _template_id: Id) -> Result<Option<MemProfiles>> {
        self.unsupported("profiles_of")
    }

    async fn fetch_sample(&self) -> Result<BoxFetcher<Profile>> {
        self.unsupported("fetch_sample")
    }

    async fn ct_schema(&self) -> Result<Option<ContextTemplateSchema>> {
        self.unsupported("ct_schema")
    }

    async fn catchup(&self) -> Result<Option<SharedDataset>> {
        self.unsupported("catchup")
    }

    async fn select_by_contexts(&self, _contexts: &ContextList) -> Result<SharedDataset> {
        self.unsupported("select_by_contexts")
    }

    async fn clone_dataset(&self) -> Result<SharedDataset> {
        let copy = Self::new(self.config().await);
        copy.set_exclusive(self.is_exclusive().await).await;
        Ok(Arc::new(copy))
    }

    async fn clear(&self) {
        self.base.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use hudup_core::ErrorKind;

    use super::*;

    #[tokio::test]
    async fn reads_are_unsupported() {
        let pointer = ServerPointer::new(None);

        let error = pointer.fetch_user_ids().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unsupported);
        let error = pointer.catchup().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unsupported);
        assert!(pointer.provider().await.is_none());
    }

    #[tokio::test]
    async fn clone_keeps_pointer_kind_and_config() {
        let mut config = DataConfig::new();
        config.set_kbase_name("green_fall");
        let pointer = KBasePointer::new(Some(config.clone()));
        pointer.set_exclusive(true).await;

        let copy = pointer.clone_dataset().await.unwrap();

        assert_eq!(copy.kind(), DatasetKind::Pointer);
        assert!(copy.as_any().is::<KBasePointer>());
        assert_eq!(copy.config().await, Some(config));
        assert!(copy.is_exclusive().await);
    }
}
