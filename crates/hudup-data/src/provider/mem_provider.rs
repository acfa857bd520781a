use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use hudup_core::config::DataConfig;
use hudup_core::fetcher::{BoxFetcher, Fetcher, FetcherMetadata, MemFetcher};
use hudup_core::types::{
    AttributeList, AttributeValue, Context, ContextTemplate, ContextTemplateSchema, CtsProfiles,
    ExternalRecord, Id, MemProfiles, Profile, RatingTriple, RatingVector,
};
use hudup_core::{Error, Result};
use tokio::sync::RwLock;

use super::{CtsManager, ProfileSelector, Provider, ProviderFactory, profile_of_context};
use crate::TRACING_TARGET_PROVIDER;

/// Scheme of in-memory stores.
const MEM_SCHEME: &str = "mem";

/// Query counters shared by every connection to one in-memory store.
#[derive(Debug, Default)]
pub struct ProviderStats {
    queries: AtomicUsize,
    open_fetchers: AtomicUsize,
}

impl ProviderStats {
    /// Number of round-trips served.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of fetchers handed out and not yet closed.
    pub fn open_fetchers(&self) -> usize {
        self.open_fetchers.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct MemStore {
    profiles: BTreeMap<String, MemProfiles>,
    user_ratings: BTreeMap<Id, RatingVector>,
    item_ratings: BTreeMap<Id, RatingVector>,
    records: BTreeMap<String, BTreeMap<Id, ExternalRecord>>,
    schema: ContextTemplateSchema,
    cts_profiles: CtsProfiles,
}

impl MemStore {
    fn put_rating(&mut self, config: &DataConfig, triple: &RatingTriple) {
        let RatingTriple {
            user_id,
            item_id,
            rating,
        } = triple;

        self.user_ratings
            .entry(*user_id)
            .or_insert_with(|| RatingVector::user(*user_id))
            .put(*item_id, rating.clone());
        self.item_ratings
            .entry(*item_id)
            .or_insert_with(|| RatingVector::item(*item_id))
            .put(*user_id, rating.clone());

        self.table_mut(&config.user_unit()).fill_union([*user_id]);
        self.table_mut(&config.item_unit()).fill_union([*item_id]);
    }

    fn table_mut(&mut self, unit: &str) -> &mut MemProfiles {
        self.profiles.entry(unit.to_owned()).or_default()
    }
}

/// Counts itself open until closed.
#[derive(Debug)]
struct TrackedFetcher<E> {
    inner: MemFetcher<E>,
    stats: Arc<ProviderStats>,
    open: bool,
}

impl<E> TrackedFetcher<E> {
    fn new(items: Vec<E>, stats: Arc<ProviderStats>) -> Self {
        stats.open_fetchers.fetch_add(1, Ordering::SeqCst);
        Self {
            inner: MemFetcher::new(items),
            stats,
            open: true,
        }
    }
}

#[async_trait]
impl<E: Send + Sync> Fetcher<E> for TrackedFetcher<E> {
    async fn advance(&mut self) -> Result<bool> {
        self.inner.advance().await
    }

    fn current(&self) -> Option<&E> {
        self.inner.current()
    }

    async fn reset(&mut self) -> Result<()> {
        self.inner.reset().await
    }

    fn metadata(&self) -> FetcherMetadata {
        self.inner.metadata()
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.stats.open_fetchers.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.close().await
    }
}

/// A provider over an in-memory store.
///
/// Every connection made by [`Provider::duplicate`] shares the store and
/// its [`ProviderStats`], but is closed independently.
#[derive(Debug)]
pub struct MemProvider {
    config: DataConfig,
    store: Arc<RwLock<MemStore>>,
    stats: Arc<ProviderStats>,
    closed: AtomicBool,
}

impl MemProvider {
    pub fn new(config: DataConfig) -> Self {
        Self::with_store(config, MemStore::default())
    }

    /// Creates a store holding the given ratings.
    pub fn from_triples(config: DataConfig, triples: impl IntoIterator<Item = RatingTriple>) -> Self {
        let mut store = MemStore::default();
        for triple in triples {
            store.put_rating(&config, &triple);
        }
        Self::with_store(config, store)
    }

    fn with_store(config: DataConfig, store: MemStore) -> Self {
        Self {
            config,
            store: Arc::new(RwLock::new(store)),
            stats: Arc::default(),
            closed: AtomicBool::new(false),
        }
    }

    /// Another connection to the same store under a different configuration.
    pub fn connect(&self, config: DataConfig) -> Self {
        Self {
            config,
            store: self.store.clone(),
            stats: self.stats.clone(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn stats(&self) -> Arc<ProviderStats> {
        self.stats.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn put_external_record(&self, unit: &str, id: Id, record: ExternalRecord) {
        let mut store = self.store.write().await;
        store
            .records
            .entry(unit.to_owned())
            .or_default()
            .insert(id, record);
    }

    pub async fn put_context_template(&self, template: ContextTemplate) {
        self.store.write().await.schema.add(template);
    }

    /// Adds a profile to the table of a context template.
    pub async fn put_cts_profile(&self, template_id: Id, profile: Profile) -> bool {
        let mut store = self.store.write().await;
        let table = store
            .cts_profiles
            .entry(template_id)
            .or_insert_with(|| MemProfiles::new(profile.attributes().clone()));
        table.put(profile)
    }

    fn begin_query(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::closed().with_message("provider is closed"));
        }
        self.stats.queries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn tracked<E>(&self, items: Vec<E>) -> BoxFetcher<E>
    where
        E: Send + Sync + 'static,
    {
        Box::new(TrackedFetcher::new(items, self.stats.clone()))
    }
}

#[async_trait]
impl Provider for MemProvider {
    fn config(&self) -> &DataConfig {
        &self.config
    }

    async fn profile_ids(&self, unit: &str) -> Result<BoxFetcher<Id>> {
        self.begin_query()?;
        let store = self.store.read().await;
        let ids = store.profiles.get(unit).map(MemProfiles::ids).unwrap_or_default();
        Ok(self.tracked(ids))
    }

    async fn user_rating_vector(&self, user_id: Id) -> Result<Option<RatingVector>> {
        self.begin_query()?;
        Ok(self.store.read().await.user_ratings.get(&user_id).cloned())
    }

    async fn item_rating_vector(&self, item_id: Id) -> Result<Option<RatingVector>> {
        self.begin_query()?;
        Ok(self.store.read().await.item_ratings.get(&item_id).cloned())
    }

    async fn profiles(
        &self,
        unit: &str,
        selector: Option<&ProfileSelector>,
    ) -> Result<BoxFetcher<Profile>> {
        self.begin_query()?;
        let store = self.store.read().await;
        let profiles: Vec<Profile> = store
            .profiles
            .get(unit)
            .map(|table| {
                table
                    .iter()
                    .filter(|p| selector.is_none_or(|s| s.matches(p)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(self.tracked(profiles))
    }

    async fn profile(&self, unit: &str, id: Id) -> Result<Option<Profile>> {
        self.begin_query()?;
        let store = self.store.read().await;
        Ok(store.profiles.get(unit).and_then(|t| t.get(id)).cloned())
    }

    async fn attributes(&self, unit: &str) -> Result<AttributeList> {
        self.begin_query()?;
        let store = self.store.read().await;
        Ok(store
            .profiles
            .get(unit)
            .map(|t| t.attributes().clone())
            .unwrap_or_default())
    }

    async fn external_record(&self, unit: &str, id: Id) -> Result<Option<ExternalRecord>> {
        self.begin_query()?;
        let store = self.store.read().await;
        Ok(store.records.get(unit).and_then(|r| r.get(&id)).cloned())
    }

    async fn internal_id(&self, unit: &str, external: &AttributeValue) -> Result<Option<Id>> {
        self.begin_query()?;
        let store = self.store.read().await;
        Ok(store.records.get(unit).and_then(|records| {
            records
                .iter()
                .find(|(_, record)| record.value == *external)
                .map(|(id, _)| *id)
        }))
    }

    async fn update_rating(&self, triple: &RatingTriple) -> Result<bool> {
        self.begin_query()?;
        self.store.write().await.put_rating(&self.config, triple);
        Ok(true)
    }

    async fn update_profile(&self, unit: &str, profile: Profile) -> Result<bool> {
        self.begin_query()?;
        let mut store = self.store.write().await;
        let table = store
            .profiles
            .entry(unit.to_owned())
            .or_insert_with(|| MemProfiles::new(profile.attributes().clone()));
        Ok(table.put(profile))
    }

    fn cts_manager(&self) -> Arc<dyn CtsManager> {
        Arc::new(MemCtsManager {
            store: self.store.clone(),
        })
    }

    async fn duplicate(&self) -> Result<Arc<dyn Provider>> {
        self.begin_query()?;
        Ok(Arc::new(self.connect(self.config.clone())))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                target: TRACING_TARGET_PROVIDER,
                store_uri = ?self.config.store_uri(),
                "provider closed"
            );
        }
        Ok(())
    }
}

#[derive(Debug)]
struct MemCtsManager {
    store: Arc<RwLock<MemStore>>,
}

#[async_trait]
impl CtsManager for MemCtsManager {
    async fn ct_schema(&self) -> Result<ContextTemplateSchema> {
        Ok(self.store.read().await.schema.clone())
    }

    async fn profile_of(&self, context: &Context) -> Result<Option<Profile>> {
        Ok(profile_of_context(&self.store.read().await.cts_profiles, context))
    }

    async fn profiles_of(&self, template_id: Id) -> Result<Option<MemProfiles>> {
        Ok(self.store.read().await.cts_profiles.get(&template_id).cloned())
    }

    async fn cts_profiles(&self) -> Result<CtsProfiles> {
        Ok(self.store.read().await.cts_profiles.clone())
    }
}

/// Factory of in-memory providers, addressed as `mem://<name>`.
#[derive(Debug, Default)]
pub struct MemDriver {
    stores: RwLock<BTreeMap<String, Arc<MemProvider>>>,
}

impl MemDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a store reachable under `mem://<name>`.
    pub async fn register(&self, name: impl Into<String>, provider: Arc<MemProvider>) {
        self.stores.write().await.insert(name.into(), provider);
    }

    pub async fn unregister(&self, name: &str) -> Option<Arc<MemProvider>> {
        self.stores.write().await.remove(name)
    }
}

#[async_trait]
impl ProviderFactory for MemDriver {
    fn scheme(&self) -> &str {
        MEM_SCHEME
    }

    async fn open(&self, config: &DataConfig) -> Result<Arc<dyn Provider>> {
        let uri = config
            .store_uri()
            .ok_or_else(|| Error::configuration().with_message("missing store uri"))?;
        let name = uri
            .strip_prefix("mem://")
            .ok_or_else(|| Error::configuration().with_message(format!("not a mem uri: {uri}")))?;

        let stores = self.stores.read().await;
        let provider = stores
            .get(name)
            .ok_or_else(|| Error::not_found().with_message(format!("no store named {name}")))?;

        Ok(Arc::new(provider.connect(config.clone())))
    }
}

#[cfg(test)]
mod tests {
    use hudup_core::fetcher::drain_boxed;
    use hudup_core::types::ContextValue;

    use super::*;

    fn provider() -> MemProvider {
        MemProvider::from_triples(
            DataConfig::with_store_uri("mem://fixture"),
            [RatingTriple::new(1, 10, 4.0), RatingTriple::new(2, 10, 5.0)],
        )
    }

    #[tokio::test]
    async fn ratings_are_indexed_both_ways() {
        let provider = provider();
        let config = provider.config().clone();

        let users = drain_boxed(provider.profile_ids(&config.user_unit()).await.unwrap())
            .await
            .unwrap();
        assert_eq!(users, vec![1, 2]);

        let item = provider.item_rating_vector(10).await.unwrap().unwrap();
        assert_eq!(item.field_ids(), vec![1, 2]);
        assert_eq!(provider.stats().open_fetchers(), 0);
    }

    #[tokio::test]
    async fn closed_connection_rejects_queries() {
        let provider = provider();
        let other = provider.duplicate().await.unwrap();

        provider.close().await.unwrap();
        provider.close().await.unwrap();

        let error = provider.user_rating_vector(1).await.unwrap_err();
        assert_eq!(error.kind(), hudup_core::ErrorKind::Closed);
        assert!(other.user_rating_vector(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn external_ids_resolve_both_ways() {
        let provider = provider();
        let unit = provider.config().item_unit();
        provider
            .put_external_record(&unit, 10, ExternalRecord::new("movies", "imdb", "tt01"))
            .await;

        let id = provider.internal_id(&unit, &"tt01".into()).await.unwrap();
        assert_eq!(id, Some(10));
        assert!(provider.external_record(&unit, 11).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn context_profiles_by_value() {
        let provider = provider();
        let template = ContextTemplate::new(1, "location");
        provider.put_context_template(template.clone()).await;
        provider
            .put_cts_profile(1, Profile::with_id(AttributeList::with_key("id"), 7))
            .await;

        let cts = provider.cts_manager();
        let context = Context::new(template, Some(ContextValue::Integer(7)));
        assert!(cts.profile_of(&context).await.unwrap().is_some());
        assert_eq!(cts.ct_schema().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn driver_opens_registered_store() {
        let driver = MemDriver::new();
        driver.register("fixture", Arc::new(provider())).await;

        let opened = driver
            .open(&DataConfig::with_store_uri("mem://fixture"))
            .await
            .unwrap();
        assert!(opened.user_rating_vector(2).await.unwrap().is_some());

        let missing = driver.open(&DataConfig::with_store_uri("mem://other")).await;
        assert_eq!(missing.unwrap_err().kind(), hudup_core::ErrorKind::NotFound);
    }
}
