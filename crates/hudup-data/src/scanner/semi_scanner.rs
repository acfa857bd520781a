use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use hudup_core::Result;
use hudup_core::config::DataConfig;
use hudup_core::export::ExportSlot;
use hudup_core::fetcher::{BoxFetcher, MemFetcher, drain_boxed};
use hudup_core::types::{
    AttributeList, AttributeValue, Context, ContextList, ContextTemplateSchema, ExternalRecord,
    Id, MemProfiles, Profile, Rating, RatingVector,
};
use tokio::sync::RwLock;

use super::Scanner;
use crate::TRACING_TARGET_SCANNER;
use crate::dataset::{Dataset, DatasetKind, SharedDataset};
use crate::provider::Provider;
use crate::snapshot::{Snapshot, SnapshotData};

/// Ratings cached by a [`SemiScanner`], indexed both ways.
#[derive(Debug, Default)]
struct RatingCache {
    user_ratings: BTreeMap<Id, RatingVector>,
    item_ratings: BTreeMap<Id, RatingVector>,
}

impl RatingCache {
    /// Indexes user vectors and derives the item index as their transpose.
    ///
    /// Only rated cells are transposed, so an item nobody rated has no
    /// vector.
    fn from_user_ratings(vectors: Vec<RatingVector>) -> Self {
        let mut item_ratings: BTreeMap<Id, RatingVector> = BTreeMap::new();
        for vector in vectors.iter().filter(|v| !v.is_empty()) {
            for (item_id, rating) in vector.iter().filter(|(_, r)| r.is_rated()) {
                item_ratings
                    .entry(item_id)
                    .or_insert_with(|| RatingVector::item(item_id))
                    .put(vector.id(), rating.clone());
            }
        }

        let user_ratings = vectors.into_iter().map(|v| (v.id(), v)).collect();
        Self {
            user_ratings,
            item_ratings,
        }
    }

    fn select(&self, contexts: &ContextList) -> Self {
        let select = |ratings: &BTreeMap<Id, RatingVector>| -> BTreeMap<Id, RatingVector> {
            ratings
                .iter()
                .filter_map(|(id, vector)| vector.select(contexts).map(|v| (*id, v)))
                .collect()
        };

        Self {
            user_ratings: select(&self.user_ratings),
            item_ratings: select(&self.item_ratings),
        }
    }
}

/// A scanner that keeps the whole rating matrix in memory.
///
/// Rating reads are served from the cache once it is loaded; until then,
/// and for everything that is not a rating, reads go to the provider.
/// Profiles, records and contexts are never cached.
#[derive(Debug)]
pub struct SemiScanner {
    scanner: Scanner,
    cache: RwLock<Option<Arc<RatingCache>>>,
}

impl SemiScanner {
    /// Creates a scanner and loads its cache.
    pub async fn new(provider: Arc<dyn Provider>) -> Result<Self> {
        let semi = Self::unloaded(provider);
        semi.reload().await?;
        Ok(semi)
    }

    /// Creates a scanner whose cache is not loaded yet.
    pub fn unloaded(provider: Arc<dyn Provider>) -> Self {
        Self {
            scanner: Scanner::new(provider),
            cache: RwLock::new(None),
        }
    }

    /// Rebuilds the cache from the provider.
    ///
    /// The previous cache keeps serving reads until the new one is complete.
    pub async fn reload(&self) -> Result<()> {
        let vectors = drain_boxed(self.scanner.fetch_user_ratings().await?).await?;
        let cache = RatingCache::from_user_ratings(vectors);

        tracing::debug!(
            target: TRACING_TARGET_SCANNER,
            users = cache.user_ratings.len(),
            items = cache.item_ratings.len(),
            "rating cache loaded"
        );

        *self.cache.write().await = Some(Arc::new(cache));
        Ok(())
    }

    pub async fn is_loaded(&self) -> bool {
        self.cache.read().await.is_some()
    }

    async fn cached(&self) -> Option<Arc<RatingCache>> {
        self.cache.read().await.clone()
    }

    async fn with_cache(&self, provider: Arc<dyn Provider>, cache: RatingCache) -> Self {
        let semi = Self::unloaded(provider);
        semi.scanner.set_config(self.config().await).await;
        *semi.cache.write().await = Some(Arc::new(cache));
        semi
    }
}

#[async_trait]
impl Dataset for SemiScanner {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Scanner
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn export_slot(&self) -> &ExportSlot {
        self.scanner.base().export_slot()
    }

    async fn config(&self) -> Option<DataConfig> {
        self.scanner.config().await
    }

    async fn set_config(&self, config: Option<DataConfig>) {
        self.scanner.set_config(config).await;
    }

    async fn is_exclusive(&self) -> bool {
        self.scanner.is_exclusive().await
    }

    async fn set_exclusive(&self, exclusive: bool) {
        self.scanner.set_exclusive(exclusive).await;
    }

    async fn provider(&self) -> Option<Arc<dyn Provider>> {
        self.scanner.provider().await
    }

    async fn fetch_user_ids(&self) -> Result<BoxFetcher<Id>> {
        match self.cached().await {
            Some(cache) => Ok(Box::new(cache.user_ratings.keys().copied().collect::<MemFetcher<_>>())),
            None => self.scanner.fetch_user_ids().await,
        }
    }

    async fn user_id(&self, external: &AttributeValue) -> Result<Id> {
        self.scanner.user_id(external).await
    }

    async fn user_external_record(&self, user_id: Id) -> Result<Option<ExternalRecord>> {
        self.scanner.user_external_record(user_id).await
    }

    async fn fetch_item_ids(&self) -> Result<BoxFetcher<Id>> {
        match self.cached().await {
            Some(cache) => Ok(Box::new(cache.item_ratings.keys().copied().collect::<MemFetcher<_>>())),
            None => self.scanner.fetch_item_ids().await,
        }
    }

    async fn item_id(&self, external: &AttributeValue) -> Result<Id> {
        self.scanner.item_id(external).await
    }

    async fn item_external_record(&self, item_id: Id) -> Result<Option<ExternalRecord>> {
        self.scanner.item_external_record(item_id).await
    }

    async fn rating(&self, user_id: Id, item_id: Id) -> Result<Option<Rating>> {
        match self.cached().await {
            Some(cache) => Ok(cache
                .user_ratings
                .get(&user_id)
                .and_then(|v| v.get(item_id))
                .cloned()),
            None => self.scanner.rating(user_id, item_id).await,
        }
    }

    async fn user_rating(&self, user_id: Id) -> Result<Option<RatingVector>> {
        match self.cached().await {
            Some(cache) => Ok(cache.user_ratings.get(&user_id).cloned()),
            None => self.scanner.user_rating(user_id).await,
        }
    }

    async fn fetch_user_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        match self.cached().await {
            Some(cache) => Ok(Box::new(
                cache.user_ratings.values().cloned().collect::<MemFetcher<_>>(),
            )),
            None => self.scanner.fetch_user_ratings().await,
        }
    }

    async fn item_rating(&self, item_id: Id) -> Result<Option<RatingVector>> {
        match self.cached().await {
            Some(cache) => Ok(cache.item_ratings.get(&item_id).cloned()),
            None => self.scanner.item_rating(item_id).await,
        }
    }

    async fn fetch_item_ratings(&self) -> Result<BoxFetcher<RatingVector>> {
        match self.cached().await {
            Some(cache) => Ok(Box::new(
                cache.item_ratings.values().cloned().collect::<MemFetcher<_>>(),
            )),
            None => self.scanner.fetch_item_ratings().await,
        }
    }

    async fn user_profile(&self, user_id: Id) -> Result<Option<Profile>> {
        self.scanner.user_profile(user_id).await
    }

    async fn fetch_user_profiles(&self) -> Result<BoxFetcher<Profile>> {
        self.scanner.fetch_user_profiles().await
    }

    async fn user_attributes(&self) -> Result<AttributeList> {
        self.scanner.user_attributes().await
    }

    async fn item_profile(&self, item_id: Id) -> Result<Option<Profile>> {
        self.scanner.item_profile(item_id).await
    }

    async fn fetch_item_profiles(&self) -> Result<BoxFetcher<Profile>> {
        self.scanner.fetch_item_profiles().await
    }

    async fn item_attributes(&self) -> Result<AttributeList> {
        self.scanner.item_attributes().await
    }

    async fn profile_of(&self, context: &Context) -> Result<Option<Profile>> {
        self.scanner.profile_of(context).await
    }

    async fn profiles_of(&self, template_id: Id) -> Result<Option<MemProfiles>> {
        self.scanner.profiles_of(template_id).await
    }

    async fn fetch_sample(&self) -> Result<BoxFetcher<Profile>> {
        self.scanner.fetch_sample().await
    }

    async fn ct_schema(&self) -> Result<Option<ContextTemplateSchema>> {
        self.scanner.ct_schema().await
    }

    async fn catchup(&self) -> Result<Option<SharedDataset>> {
        let data = SnapshotData::read(self).await?;
        Ok(Some(Arc::new(Snapshot::new(self.config().await, data))))
    }

    async fn select_by_contexts(&self, contexts: &ContextList) -> Result<SharedDataset> {
        let selected = match self.cached().await {
            Some(cache) => cache.select(contexts),
            None => {
                let vectors = drain_boxed(self.scanner.fetch_user_ratings().await?).await?;
                RatingCache::from_user_ratings(vectors).select(contexts)
            }
        };

        let provider = self.scanner.duplicate_provider().await?;
        Ok(Arc::new(self.with_cache(provider, selected).await))
    }

    async fn clone_dataset(&self) -> Result<SharedDataset> {
        let provider = self.scanner.duplicate_provider().await?;
        let semi = SemiScanner::unloaded(provider);
        semi.set_config(self.config().await).await;
        *semi.cache.write().await = self.cached().await;
        Ok(Arc::new(semi))
    }

    async fn clear(&self) {
        *self.cache.write().await = None;
        self.scanner.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use hudup_core::fetcher::drain_boxed;
    use hudup_core::types::{ContextTemplate, ContextValue, RatingTriple};

    use super::*;
    use crate::provider::MemProvider;

    const ITEM_A: Id = 100;
    const ITEM_B: Id = 200;

    fn provider() -> Arc<MemProvider> {
        Arc::new(MemProvider::from_triples(
            DataConfig::with_store_uri("mem://fixture"),
            [
                RatingTriple::new(1, ITEM_A, 4.0),
                RatingTriple::new(2, ITEM_A, 5.0),
                RatingTriple::new(2, ITEM_B, 3.0),
            ],
        ))
    }

    #[tokio::test]
    async fn item_index_is_transpose_of_user_index() {
        let semi = SemiScanner::new(provider()).await.unwrap();

        let items = drain_boxed(semi.fetch_item_ids().await.unwrap()).await.unwrap();
        assert_eq!(items, vec![ITEM_A, ITEM_B]);

        let item_a = semi.item_rating(ITEM_A).await.unwrap().unwrap();
        assert_eq!(item_a.field_ids(), vec![1, 2]);
        assert_eq!(item_a.get(1).map(|r| r.value), Some(4.0));
        assert_eq!(item_a.get(2).map(|r| r.value), Some(5.0));
    }

    #[tokio::test]
    async fn unrated_cells_stay_out_of_the_item_index() {
        const ITEM_C: Id = 300;
        let provider = Arc::new(MemProvider::from_triples(
            DataConfig::with_store_uri("mem://fixture"),
            [
                RatingTriple::new(1, ITEM_A, 4.0),
                RatingTriple::new(1, ITEM_C, f64::NAN),
            ],
        ));
        let semi = SemiScanner::new(provider).await.unwrap();

        let items = drain_boxed(semi.fetch_item_ids().await.unwrap()).await.unwrap();
        assert_eq!(items, vec![ITEM_A]);
        assert!(semi.item_rating(ITEM_C).await.unwrap().is_none());

        let item_a = semi.item_rating(ITEM_A).await.unwrap().unwrap();
        assert!(item_a.is_rated(1));
    }

    #[tokio::test]
    async fn cached_reads_skip_provider() {
        let provider = provider();
        let semi = SemiScanner::new(provider.clone()).await.unwrap();
        let before = provider.stats().queries();

        semi.rating(2, ITEM_B).await.unwrap();
        semi.item_rating(ITEM_A).await.unwrap();

        assert_eq!(provider.stats().queries(), before);
        assert_eq!(provider.stats().open_fetchers(), 0);
    }

    #[tokio::test]
    async fn unloaded_reads_fall_back_to_provider() {
        let provider = provider();
        let semi = SemiScanner::unloaded(provider.clone());
        assert!(!semi.is_loaded().await);

        let before = provider.stats().queries();
        let rating = semi.rating(1, ITEM_A).await.unwrap();
        assert_eq!(rating.map(|r| r.value), Some(4.0));
        assert!(provider.stats().queries() > before);

        semi.reload().await.unwrap();
        assert!(semi.is_loaded().await);
    }

    #[tokio::test]
    async fn reload_picks_up_new_ratings() {
        let provider = provider();
        let semi = SemiScanner::new(provider.clone()).await.unwrap();

        provider
            .update_rating(&RatingTriple::new(3, ITEM_B, 1.0))
            .await
            .unwrap();
        assert!(semi.user_rating(3).await.unwrap().is_none());

        semi.reload().await.unwrap();
        assert!(semi.user_rating(3).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn select_by_contexts_keeps_matching_ratings() {
        let provider = provider();
        let template = ContextTemplate::new(1, "companion");
        let context = |value: &str| {
            ContextList::from(vec![Context::new(
                template.clone(),
                Some(ContextValue::Text(value.into())),
            )])
        };
        provider
            .update_rating(&RatingTriple {
                user_id: 3,
                item_id: ITEM_B,
                rating: Rating::new(2.0).with_contexts(context("family")),
            })
            .await
            .unwrap();
        provider
            .update_rating(&RatingTriple {
                user_id: 4,
                item_id: ITEM_B,
                rating: Rating::new(5.0).with_contexts(context("alone")),
            })
            .await
            .unwrap();

        let semi = SemiScanner::new(provider.clone()).await.unwrap();
        let selected = semi.select_by_contexts(&context("family")).await.unwrap();

        assert!(selected.user_rating(3).await.unwrap().is_some());
        assert!(selected.user_rating(4).await.unwrap().is_none());

        semi.clear().await;
        assert!(selected.user_profile(3).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn scanner_selection_goes_through_memory() {
        let provider = provider();
        let scanner = Scanner::new(provider.clone());
        let template = ContextTemplate::new(1, "companion");
        let query = ContextList::from(vec![Context::new(template, None)]);

        let selected = scanner.select_by_contexts(&query).await.unwrap();

        // Ratings without contexts infer from any non-empty query.
        assert_eq!(selected.item_rating(ITEM_A).await.unwrap().unwrap().len(), 2);
        assert_eq!(provider.stats().open_fetchers(), 0);
    }
}
