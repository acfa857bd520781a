//! Complete in-memory datasets.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use hudup_core::Result;
use hudup_core::config::DataConfig;
use hudup_core::export::ExportSlot;
use hudup_core::fetcher::{BoxFetcher, MemFetcher, drain_boxed};
use hudup_core::types::{
    AttributeList, AttributeValue, Context, ContextList, ContextTemplateSchema, CtsProfiles,
    ExternalRecord, INVALID_ID, Id, MemProfiles, Profile, Rating, RatingMatrix, RatingTriple,
    RatingVector,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::TRACING_TARGET_SNAPSHOT;
use crate::dataset::{Dataset, DatasetBase, DatasetKind, SharedDataset};
use crate::provider::{Provider, profile_of_context};
use crate::scanner::Scanner;

/// Everything a snapshot holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotData {
    pub user_records: BTreeMap<Id, ExternalRecord>,
    pub user_ratings: BTreeMap<Id, RatingVector>,
    pub user_profiles: MemProfiles,
    pub item_records: BTreeMap<Id, ExternalRecord>,
    pub item_ratings: BTreeMap<Id, RatingVector>,
    pub item_profiles: MemProfiles,
    pub ct_schema: ContextTemplateSchema,
    pub cts_profiles: CtsProfiles,
    pub sample_profiles: Vec<Profile>,
}

impl SnapshotData {
    /// Reads a dataset completely, draining and closing each fetcher once.
    pub async fn read<D>(dataset: &D) -> Result<Self>
    where
        D: Dataset + ?Sized,
    {
        let user_ids = drain_boxed(dataset.fetch_user_ids().await?).await?;
        let item_ids = drain_boxed(dataset.fetch_item_ids().await?).await?;

        let mut data = Self::default();
        for vector in drain_boxed(dataset.fetch_user_ratings().await?).await? {
            data.user_ratings.insert(vector.id(), vector);
        }
        for vector in drain_boxed(dataset.fetch_item_ratings().await?).await? {
            data.item_ratings.insert(vector.id(), vector);
        }

        data.user_profiles = MemProfiles::from_profiles(
            dataset.user_attributes().await?,
            drain_boxed(dataset.fetch_user_profiles().await?).await?,
        );
        data.user_profiles.fill_union(user_ids.iter().copied());
        data.item_profiles = MemProfiles::from_profiles(
            dataset.item_attributes().await?,
            drain_boxed(dataset.fetch_item_profiles().await?).await?,
        );
        data.item_profiles.fill_union(item_ids.iter().copied());

        for id in user_ids {
            if let Some(record) = dataset.user_external_record(id).await? {
                data.user_records.insert(id, record);
            }
        }
        for id in item_ids {
            if let Some(record) = dataset.item_external_record(id).await? {
                data.item_records.insert(id, record);
            }
        }

        data.sample_profiles = drain_boxed(dataset.fetch_sample().await?).await?;
        data.ct_schema = dataset.ct_schema().await?.unwrap_or_default();
        for template_id in data.ct_schema.ids() {
            if let Some(profiles) = dataset.profiles_of(template_id).await? {
                data.cts_profiles.insert(template_id, profiles);
            }
        }

        Ok(data)
    }

    /// Upserts a rating into both indexes.
    pub fn put_rating(&mut self, user_id: Id, item_id: Id, rating: Rating) {
        self.user_ratings
            .entry(user_id)
            .or_insert_with(|| RatingVector::user(user_id))
            .put(item_id, rating.clone());
        self.item_ratings
            .entry(item_id)
            .or_insert_with(|| RatingVector::item(item_id))
            .put(user_id, rating);

        self.user_profiles.fill_union([user_id]);
        self.item_profiles.fill_union([item_id]);
    }

    pub fn user_ids(&self) -> Vec<Id> {
        let ids: BTreeSet<Id> = self
            .user_profiles
            .ids()
            .into_iter()
            .chain(self.user_ratings.keys().copied())
            .collect();
        ids.into_iter().collect()
    }

    pub fn item_ids(&self) -> Vec<Id> {
        let ids: BTreeSet<Id> = self
            .item_profiles
            .ids()
            .into_iter()
            .chain(self.item_ratings.keys().copied())
            .collect();
        ids.into_iter().collect()
    }

    /// Copy keeping only ratings whose contexts infer from `contexts`.
    pub fn select(&self, contexts: &ContextList) -> Self {
        let select = |ratings: &BTreeMap<Id, RatingVector>| -> BTreeMap<Id, RatingVector> {
            ratings
                .iter()
                .filter_map(|(id, vector)| vector.select(contexts).map(|v| (*id, v)))
                .collect()
        };

        Self {
            user_ratings: select(&self.user_ratings),
            item_ratings: select(&self.item_ratings),
            ..self.clone()
        }
    }
}

fn find_record(records: &BTreeMap<Id, ExternalRecord>, external: &AttributeValue) -> Id {
    records
        .iter()
        .find(|(_, record)| record.value == *external)
        .map_or(INVALID_ID, |(id, _)| *id)
}

/// A dataset holding a complete in-memory copy of its data.
///
/// Copies made by [`Dataset::clone_dataset`] and [`Snapshot::assign`] share
/// the data until one side writes to it.
#[derive(Debug, Default)]
pub struct Snapshot {
    base: DatasetBase,
    data: RwLock<Arc<SnapshotData>>,
}

impl Snapshot {
    pub fn new(config: Option<DataConfig>, data: SnapshotData) -> Self {
        Self::from_shared(config, Arc::new(data))
    }

    fn from_shared(config: Option<DataConfig>, data: Arc<SnapshotData>) -> Self {
        Self {
            base: DatasetBase::new(config),
            data: RwLock::new(data),
        }
    }

    /// Builds a snapshot from rating triples.
    pub fn from_triples(
        config: Option<DataConfig>,
        triples: impl IntoIterator<Item = RatingTriple>,
    ) -> Self {
        let mut data = SnapshotData::default();
        for triple in triples {
            data.put_rating(triple.user_id, triple.item_id, triple.rating);
        }
        Self::new(config, data)
    }

    /// Builds a snapshot from the present cells of a matrix.
    pub fn from_matrix(config: Option<DataConfig>, matrix: &RatingMatrix) -> Self {
        Self::from_triples(config, matrix.triples())
    }

    /// Reads everything a provider holds. The provider is closed afterwards,
    /// whether reading succeeded or not.
    pub async fn from_provider(provider: Arc<dyn Provider>) -> Result<Self> {
        let config = provider.config().clone();
        let scanner = Scanner::new(provider);
        let data = SnapshotData::read(&scanner).await;
        scanner.clear().await;

        Ok(Self::new(Some(config), data?))
    }

    /// Upserts a rating, keeping the user and item indexes consistent.
    pub async fn put_rating(&self, user_id: Id, item_id: Id, rating: Rating) {
        let mut data = self.data.write().await;
        Arc::make_mut(&mut *data).put_rating(user_id, item_id, rating);
    }

    /// Takes over the data and configuration of another snapshot.
    ///
    /// Nothing is copied; the two snapshots share data until either writes.
    pub async fn assign(&self, other: &Snapshot) {
        let data = other.data.read().await.clone();
        let config = other.base.config().await;

        *self.data.write().await = data;
        self.base.set_config(config).await;
    }

    /// Current contents.
    pub async fn data(&self) -> Arc<SnapshotData> {
        self.data.read().await.clone()
    }
}

#[async_trait]
impl Dataset for Snapshot {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Snapshot
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
        Ok(Box::new(MemFetcher::new(self.data().await.user_ids())))
    }

    async fn user_id(&self, external: &AttributeValue) -> Result<Id> {
        Ok(find_record(&self.data().await.user_records, external))
    }

    async fn user_external_record(&self, user_id: Id) -> Result<Option<ExternalRecord>> {
        Ok(self.data().await.user_records.get(&user_id).cloned())
    }

    async fn fetch_item_ids(&self) -> Result<BoxFetcher<Id>> {
        Ok(Box::new(MemFetcher::new(self.data().await.item_ids())))
    }

    async fn item_id(&self, external: &AttributeValue) -> Result<Id> {
        Ok(find_record(&self.data().await.item_records, external))
    }

    async fn item_external_record(&self, item_id: Id) -> Result<Option<ExternalRecord>> {
        Ok(self.data().await.item_records.get(&item_id).cloned())
    }

    async fn rating(&self, user_id: Id, item_id: Id) -> Result<Option<Rating>> {
        let data = self.data().await;
        Ok(data
            .user_ratings
            .get(&user_id)
            .and_then(|vector| vector.get(item_id))
            .cloned())
    }

    async fn user_rating(&self, user_id: Id) -> Result<Option<RatingVector>> {
        Ok(self.data().await.user_ratings.get(&user_id).cloned())
    }

    async fn fetch_user_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        let data = self.data().await;
        Ok(Box::new(data.user_ratings.values().cloned().collect::<MemFetcher<_>>()))
    }

    async fn item_rating(&self, item_id: Id) -> Result<Option<RatingVector>> {
        Ok(self.data().await.item_ratings.get(&item_id).cloned())
    }

    async fn fetch_item_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        let data = self.data().await;
        Ok(Box::new(data.item_ratings.values().cloned().collect::<MemFetcher<_>>()))
    }

    async fn user_profile(&self, user_id: Id) -> Result<Option<Profile>> {
        Ok(self.data().await.user_profiles.get(user_id).cloned())
    }

    async fn fetch_user_profiles(&self) -> Result<BoxFetcher<Profile>> {
        Ok(Box::new(self.data().await.user_profiles.fetch()))
    }

    async fn user_attributes(&self) -> Result<AttributeList> {
        Ok(self.data().await.user_profiles.attributes().clone())
    }

    async fn item_profile(&self, item_id: Id) -> Result<Option<Profile>> {
        Ok(self.data().await.item_profiles.get(item_id).cloned())
    }

    async fn fetch_item_profiles(&self) -> Result<BoxFetcher<Profile>> {
        Ok(Box::new(self.data().await.item_profiles.fetch()))
    }

    async fn item_attributes(&self) -> Result<AttributeList> {
        Ok(self.data().await.item_profiles.attributes().clone())
    }

    async fn profile_of(&self, context: &Context) -> Result<Option<Profile>> {
        Ok(profile_of_context(&self.data().await.cts_profiles, context))
    }

    async fn profiles_of(&self, template_id: Id) -> Result<Option<MemProfiles>> {
        Ok(self.data().await.cts_profiles.get(&template_id).cloned())
    }

    async fn fetch_sample(&self) -> Result<BoxFetcher<Profile>> {
        Ok(Box::new(MemFetcher::new(self.data().await.sample_profiles.clone())))
    }

    async fn ct_schema(&self) -> Result<Option<ContextTemplateSchema>> {
        Ok(Some(self.data().await.ct_schema.clone()))
    }

    async fn catchup(&self) -> Result<Option<SharedDataset>> {
        Ok(None)
    }

    async fn select_by_contexts(&self, contexts: &ContextList) -> Result<SharedDataset> {
        let selected = self.data().await.select(contexts);
        Ok(Arc::new(Snapshot::new(self.config().await, selected)))
    }

    async fn clone_dataset(&self) -> Result<SharedDataset> {
        Ok(Arc::new(Snapshot::from_shared(
            self.config().await,
            self.data().await,
        )))
    }

    async fn clear(&self) {
        self.base.clear().await;
        *self.data.write().await = Arc::default();

        tracing::debug!(target: TRACING_TARGET_SNAPSHOT, "snapshot cleared");
    }
}
