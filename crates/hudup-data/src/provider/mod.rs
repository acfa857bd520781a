//! The data-access collaborator behind scanners.

mod mem_provider;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hudup_core::Result;
use hudup_core::config::DataConfig;
use hudup_core::fetcher::BoxFetcher;
use hudup_core::types::{
    AttributeList, AttributeValue, Context, ContextTemplateSchema, ContextValue, CtsProfiles,
    ExternalRecord, Id, MemProfiles, Profile, RatingTriple, RatingVector,
};

pub use self::mem_provider::{MemDriver, MemProvider, ProviderStats};

/// Read/write access to a store of ratings and profiles.
///
/// Units are the real names of the tables, as given by a [`DataConfig`].
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    fn config(&self) -> &DataConfig;

    /// Ids of every profile of the unit.
    async fn profile_ids(&self, unit: &str) -> Result<BoxFetcher<Id>>;

    async fn user_rating_vector(&self, user_id: Id) -> Result<Option<RatingVector>>;

    async fn item_rating_vector(&self, item_id: Id) -> Result<Option<RatingVector>>;

    /// Profiles of the unit accepted by the selector.
    async fn profiles(
        &self,
        unit: &str,
        selector: Option<&ProfileSelector>,
    ) -> Result<BoxFetcher<Profile>>;

    async fn profile(&self, unit: &str, id: Id) -> Result<Option<Profile>>;

    async fn attributes(&self, unit: &str) -> Result<AttributeList>;

    async fn external_record(&self, unit: &str, id: Id) -> Result<Option<ExternalRecord>>;

    /// Reverse lookup of an external key.
    async fn internal_id(&self, unit: &str, external: &AttributeValue) -> Result<Option<Id>>;

    async fn update_rating(&self, triple: &RatingTriple) -> Result<bool>;

    async fn update_profile(&self, unit: &str, profile: Profile) -> Result<bool>;

    fn cts_manager(&self) -> Arc<dyn CtsManager>;

    /// Opens another connection to the same store.
    async fn duplicate(&self) -> Result<Arc<dyn Provider>>;

    /// Releases the connection. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Context template schema and per-template profile tables of a store.
#[async_trait]
pub trait CtsManager: Send + Sync + fmt::Debug {
    async fn ct_schema(&self) -> Result<ContextTemplateSchema>;

    /// Profile describing the value of a context within its template.
    async fn profile_of(&self, context: &Context) -> Result<Option<Profile>>;

    async fn profiles_of(&self, template_id: Id) -> Result<Option<MemProfiles>>;

    async fn cts_profiles(&self) -> Result<CtsProfiles>;
}

/// Creates providers for one store URI scheme.
#[async_trait]
pub trait ProviderFactory: Send + Sync + fmt::Debug {
    /// Scheme handled, e.g. `mem` for `mem://ratings`.
    fn scheme(&self) -> &str;

    async fn open(&self, config: &DataConfig) -> Result<Arc<dyn Provider>>;
}

/// Filter applied by [`Provider::profiles`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSelector {
    pub ids: Option<BTreeSet<Id>>,
    pub attribute: Option<(String, AttributeValue)>,
}

impl ProfileSelector {
    pub fn by_ids(ids: impl IntoIterator<Item = Id>) -> Self {
        Self {
            ids: Some(ids.into_iter().collect()),
            attribute: None,
        }
    }

    pub fn by_attribute(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            ids: None,
            attribute: Some((name.into(), value.into())),
        }
    }

    pub fn matches(&self, profile: &Profile) -> bool {
        let id_ok = match (&self.ids, profile.id()) {
            (None, _) => true,
            (Some(ids), Some(id)) => ids.contains(&id),
            (Some(_), None) => false,
        };
        let attribute_ok = self
            .attribute
            .as_ref()
            .is_none_or(|(name, value)| profile.value_of(name) == Some(value));

        id_ok && attribute_ok
    }
}

/// Looks up the profile of a context value in its template's table.
///
/// Only integer values address a profile.
pub fn profile_of_context(cts_profiles: &CtsProfiles, context: &Context) -> Option<Profile> {
    let Some(ContextValue::Integer(value)) = context.value else {
        return None;
    };
    let id = Id::try_from(value).ok()?;

    cts_profiles
        .get(&context.template.id)
        .and_then(|profiles| profiles.get(id))
        .cloned()
}
