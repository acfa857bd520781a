//! The dataset capability and what every dataset shape shares.

mod base;
mod lease;
mod matrix;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hudup_core::Result;
use hudup_core::config::DataConfig;
use hudup_core::export::ExportSlot;
use hudup_core::fetcher::BoxFetcher;
use hudup_core::types::{
    AttributeList, AttributeValue, Context, ContextList, ContextTemplateSchema, ExternalRecord,
    Id, MatrixOrientation, MemProfiles, Profile, Rating, RatingMatrix, RatingVector,
};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, IntoStaticStr};

pub use self::base::DatasetBase;
pub use self::lease::DatasetLease;
pub use self::matrix::create_matrix;
use crate::provider::Provider;

/// Dataset shared between owners.
pub type SharedDataset = Arc<dyn Dataset>;

/// The shape of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, IntoStaticStr)]
#[derive(Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Complete in-memory copy.
    Snapshot,
    /// Live view over a provider.
    Scanner,
    /// Reference holding no data.
    Pointer,
    /// Proxy for a dataset living behind a registry.
    Remote,
}

/// Read access to ratings, profiles and contexts of users and items.
///
/// Lookups answer `None`, an empty fetcher or [`INVALID_ID`] when there is
/// no such data. Every fetcher handed out must be closed by the caller.
///
/// [`INVALID_ID`]: hudup_core::INVALID_ID
#[async_trait]
pub trait Dataset: Send + Sync + fmt::Debug + 'static {
    fn kind(&self) -> DatasetKind;

    fn as_any(&self) -> &dyn Any;

    /// Stub bookkeeping for remote export.
    fn export_slot(&self) -> &ExportSlot;

    async fn config(&self) -> Option<DataConfig>;

    async fn set_config(&self, config: Option<DataConfig>);

    /// Exclusive datasets are cleared when their owner is done with them.
    async fn is_exclusive(&self) -> bool;

    async fn set_exclusive(&self, exclusive: bool);

    async fn provider(&self) -> Option<Arc<dyn Provider>>;

    async fn fetch_user_ids(&self) -> Result<BoxFetcher<Id>>;

    /// Internal id of the user with the given external key.
    async fn user_id(&self, external: &AttributeValue) -> Result<Id>;

    async fn user_external_record(&self, user_id: Id) -> Result<Option<ExternalRecord>>;

    async fn fetch_item_ids(&self) -> Result<BoxFetcher<Id>>;

    /// Internal id of the item with the given external key.
    async fn item_id(&self, external: &AttributeValue) -> Result<Id>;

    async fn item_external_record(&self, item_id: Id) -> Result<Option<ExternalRecord>>;

    async fn rating(&self, user_id: Id, item_id: Id) -> Result<Option<Rating>>;

    async fn user_rating(&self, user_id: Id) -> Result<Option<RatingVector>>;

    async fn fetch_user_ratings(&self) -> Result<BoxFetcher<RatingVector>>;

    async fn item_rating(&self, item_id: Id) -> Result<Option<RatingVector>>;

    async fn fetch_item_ratings(&self) -> Result<BoxFetcher<RatingVector>>;

    /// Users by items matrix of every rating.
    async fn create_user_matrix(&self) -> Result<Option<RatingMatrix>> {
        create_matrix(self, MatrixOrientation::UserItem).await.map(Some)
    }

    /// Items by users matrix of every rating.
    async fn create_item_matrix(&self) -> Result<Option<RatingMatrix>> {
        create_matrix(self, MatrixOrientation::ItemUser).await.map(Some)
    }

    async fn user_profile(&self, user_id: Id) -> Result<Option<Profile>>;

    async fn fetch_user_profiles(&self) -> Result<BoxFetcher<Profile>>;

    async fn user_attributes(&self) -> Result<AttributeList>;

    async fn item_profile(&self, item_id: Id) -> Result<Option<Profile>>;

    async fn fetch_item_profiles(&self) -> Result<BoxFetcher<Profile>>;

    async fn item_attributes(&self) -> Result<AttributeList>;

    /// Profile describing a context value.
    async fn profile_of(&self, context: &Context) -> Result<Option<Profile>>;

    /// Profile table of a context template.
    async fn profiles_of(&self, template_id: Id) -> Result<Option<MemProfiles>>;

    async fn fetch_sample(&self) -> Result<BoxFetcher<Profile>>;

    async fn ct_schema(&self) -> Result<Option<ContextTemplateSchema>>;

    /// Materializes the dataset in memory.
    ///
    /// `None` means this dataset already is in memory and should be used as
    /// it is; see [`catchup`].
    async fn catchup(&self) -> Result<Option<SharedDataset>>;

    /// New dataset keeping only ratings whose contexts can be inferred from
    /// `contexts`.
    async fn select_by_contexts(&self, contexts: &ContextList) -> Result<SharedDataset>;

    /// New dataset of the same shape over the same data.
    async fn clone_dataset(&self) -> Result<SharedDataset>;

    /// Tears the dataset down. Never fails; problems are logged.
    async fn clear(&self);
}

/// Materializes a dataset, returning the dataset itself when it is
/// already in memory.
pub async fn catchup(dataset: &SharedDataset) -> Result<SharedDataset> {
    Ok(dataset.catchup().await?.unwrap_or_else(|| dataset.clone()))
}

/// Returns true if both handles point at the same dataset object.
pub fn same_dataset(a: &SharedDataset, b: &SharedDataset) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
