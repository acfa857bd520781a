//! Profiles and in-memory profile tables.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{AttributeList, AttributeValue, Id};
use crate::fetcher::MemFetcher;

/// Key attribute name used when a table has to invent a schema.
const DEFAULT_ID_NAME: &str = "profileid";

/// A row of attribute values described by an attribute list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    attributes: AttributeList,
    values: Vec<AttributeValue>,
}

impl Profile {
    /// Creates a profile with every value null.
    pub fn new(attributes: AttributeList) -> Self {
        let values = vec![AttributeValue::Null; attributes.len()];
        Self { attributes, values }
    }

    /// Creates a profile holding only its id.
    pub fn with_id(attributes: AttributeList, id: Id) -> Self {
        let mut profile = Self::new(attributes);
        profile.set_id(id);
        profile
    }

    pub fn attributes(&self) -> &AttributeList {
        &self.attributes
    }

    pub fn value(&self, index: usize) -> Option<&AttributeValue> {
        self.values.get(index)
    }

    /// Returns the value of the named attribute.
    pub fn value_of(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .index_of(name)
            .and_then(|index| self.values.get(index))
    }

    pub fn set_value(&mut self, index: usize, value: impl Into<AttributeValue>) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value.into();
        }
    }

    /// Id held by the key attribute, or `None` without a key.
    pub fn id(&self) -> Option<Id> {
        self.attributes
            .key()
            .and_then(|key| self.values.get(key))
            .and_then(AttributeValue::as_id)
    }

    pub fn set_id(&mut self, id: Id) {
        if let Some(key) = self.attributes.key() {
            self.set_value(key, id);
        }
    }
}

/// In-memory profile table keyed by profile id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemProfiles {
    attributes: AttributeList,
    profiles: BTreeMap<Id, Profile>,
}

impl MemProfiles {
    pub fn new(attributes: AttributeList) -> Self {
        Self {
            attributes,
            profiles: BTreeMap::new(),
        }
    }

    /// Builds a table from profiles that carry an id; others are skipped.
    pub fn from_profiles(attributes: AttributeList, profiles: impl IntoIterator<Item = Profile>) -> Self {
        let mut table = Self::new(attributes);
        for profile in profiles {
            table.put(profile);
        }
        table
    }

    pub fn attributes(&self) -> &AttributeList {
        &self.attributes
    }

    pub fn get(&self, id: Id) -> Option<&Profile> {
        self.profiles.get(&id)
    }

    /// Inserts or replaces a profile; returns false if it has no id.
    pub fn put(&mut self, profile: Profile) -> bool {
        match profile.id() {
            Some(id) => {
                self.profiles.insert(id, profile);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: Id) -> Option<Profile> {
        self.profiles.remove(&id)
    }

    pub fn contains(&self, id: Id) -> bool {
        self.profiles.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<Id> {
        self.profiles.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    /// Fetcher over the profile ids.
    pub fn fetch_ids(&self) -> MemFetcher<Id> {
        MemFetcher::new(self.ids())
    }

    /// Fetcher over the profiles.
    pub fn fetch(&self) -> MemFetcher<Profile> {
        MemFetcher::new(self.profiles.values().cloned().collect())
    }

    /// Adds an id-only profile for every id not yet present.
    ///
    /// A table without a schema gets an integer key attribute first.
    pub fn fill_union(&mut self, ids: impl IntoIterator<Item = Id>) {
        if self.attributes.is_empty() {
            self.attributes = AttributeList::with_key(DEFAULT_ID_NAME);
        }

        for id in ids {
            if !self.profiles.contains_key(&id) {
                let profile = Profile::with_id(self.attributes.clone(), id);
                self.profiles.insert(id, profile);
            }
        }
    }

    /// Keeps exactly the given ids, inventing id-only profiles where missing.
    pub fn fill_as(&mut self, ids: impl IntoIterator<Item = Id>) {
        let ids: BTreeSet<Id> = ids.into_iter().collect();
        self.profiles.retain(|id, _| ids.contains(id));
        self.fill_union(ids);
    }

    pub fn clear(&mut self) {
        self.profiles.clear();
    }
}
