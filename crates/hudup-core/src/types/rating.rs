//! Ratings and sparse rating vectors.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{ContextList, Id};
use crate::error::{Error, Result};
use crate::text::TextParsable;

/// A single rating value with the contexts it was given in.
///
/// A rating whose value is NaN is unrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    #[serde(with = "unrated")]
    pub value: f64,
    #[serde(default)]
    pub contexts: ContextList,
    #[serde(default)]
    pub rated_date: Option<Timestamp>,
}

impl Rating {
    /// Creates a rating with the given value and no contexts.
    pub fn new(value: f64) -> Self {
        Self {
            value,
            contexts: ContextList::default(),
            rated_date: None,
        }
    }

    /// Creates an unrated rating.
    pub fn unrated() -> Self {
        Self::new(f64::NAN)
    }

    #[must_use]
    pub fn with_contexts(mut self, contexts: ContextList) -> Self {
        self.contexts = contexts;
        self
    }

    #[must_use]
    pub fn with_rated_date(mut self, rated_date: Timestamp) -> Self {
        self.rated_date = Some(rated_date);
        self
    }

    pub fn is_rated(&self) -> bool {
        !self.value.is_nan()
    }
}

impl TextParsable for Rating {
    fn to_text(&self) -> Result<String> {
        Err(Error::unsupported().with_message("rating has no text form"))
    }

    fn parse_text(_text: &str) -> Result<Self> {
        Err(Error::unsupported().with_message("rating has no text form"))
    }
}

/// Serializes NaN as `null` so unrated values survive JSON frames.
mod unrated {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &f64,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Whether a rating vector is indexed by user or by item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorKind {
    /// Ratings a user gave, keyed by item id.
    User,
    /// Ratings an item received, keyed by user id.
    Item,
}

/// Sparse vector of ratings keyed by the ids of the opposite namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingVector {
    id: Id,
    kind: VectorKind,
    ratings: BTreeMap<Id, Rating>,
}

impl RatingVector {
    pub fn new(id: Id, kind: VectorKind) -> Self {
        Self {
            id,
            kind,
            ratings: BTreeMap::new(),
        }
    }

    /// Creates an empty vector of a user.
    pub fn user(id: Id) -> Self {
        Self::new(id, VectorKind::User)
    }

    /// Creates an empty vector of an item.
    pub fn item(id: Id) -> Self {
        Self::new(id, VectorKind::Item)
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn kind(&self) -> VectorKind {
        self.kind
    }

    pub fn get(&self, field_id: Id) -> Option<&Rating> {
        self.ratings.get(&field_id)
    }

    pub fn put(&mut self, field_id: Id, rating: Rating) {
        self.ratings.insert(field_id, rating);
    }

    pub fn remove(&mut self, field_id: Id) -> Option<Rating> {
        self.ratings.remove(&field_id)
    }

    pub fn contains(&self, field_id: Id) -> bool {
        self.ratings.contains_key(&field_id)
    }

    /// Returns true if the field holds a rated value.
    pub fn is_rated(&self, field_id: Id) -> bool {
        self.ratings.get(&field_id).is_some_and(Rating::is_rated)
    }

    /// Ids of every field, rated or not, in ascending order.
    pub fn field_ids(&self) -> Vec<Id> {
        self.ratings.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &Rating)> {
        self.ratings.iter().map(|(id, rating)| (*id, rating))
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// Number of rated fields.
    pub fn count(&self) -> usize {
        self.ratings.values().filter(|r| r.is_rated()).count()
    }

    /// Mean of the rated values, NaN when nothing is rated.
    pub fn mean(&self) -> f64 {
        let (sum, count) = self
            .ratings
            .values()
            .filter(|r| r.is_rated())
            .fold((0.0, 0usize), |(sum, count), r| (sum + r.value, count + 1));

        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }

    /// Keeps the ratings whose contexts can be inferred from `contexts`.
    ///
    /// Returns `None` when no rating survives.
    pub fn select(&self, contexts: &ContextList) -> Option<RatingVector> {
        let ratings: BTreeMap<_, _> = self
            .ratings
            .iter()
            .filter(|(_, rating)| rating.contexts.can_infer_from(contexts))
            .map(|(id, rating)| (*id, rating.clone()))
            .collect();

        (!ratings.is_empty()).then(|| RatingVector {
            id: self.id,
            kind: self.kind,
            ratings,
        })
    }
}

impl TextParsable for RatingVector {
    /// Formats as `kind:id|field=value,field=value`. Contexts and dates are
    /// not part of the text form.
    fn to_text(&self) -> Result<String> {
        let kind = match self.kind {
            VectorKind::User => "user",
            VectorKind::Item => "item",
        };
        let fields = self
            .ratings
            .iter()
            .filter(|(_, r)| r.is_rated())
            .map(|(id, r)| format!("{id}={}", r.value))
            .collect::<Vec<_>>()
            .join(",");

        Ok(format!("{kind}:{}|{fields}", self.id))
    }

    fn parse_text(text: &str) -> Result<Self> {
        let malformed = || Error::serialization().with_message(format!("malformed vector {text:?}"));

        let (head, fields) = text.trim().split_once('|').ok_or_else(malformed)?;
        let (kind, id) = head.split_once(':').ok_or_else(malformed)?;
        let kind = match kind {
            "user" => VectorKind::User,
            "item" => VectorKind::Item,
            _ => return Err(malformed()),
        };
        let id: Id = id.parse().map_err(|_| malformed())?;

        let mut vector = RatingVector::new(id, kind);
        for field in fields.split(',').filter(|f| !f.is_empty()) {
            let (field_id, value) = field.split_once('=').ok_or_else(malformed)?;
            let field_id: Id = field_id.parse().map_err(|_| malformed())?;
            let value: f64 = value.parse().map_err(|_| malformed())?;
            vector.put(field_id, Rating::new(value));
        }

        Ok(vector)
    }
}

/// A `(user, item, rating)` triple, the unit of bulk loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingTriple {
    pub user_id: Id,
    pub item_id: Id,
    pub rating: Rating,
}

impl RatingTriple {
    pub fn new(user_id: Id, item_id: Id, value: f64) -> Self {
        Self {
            user_id,
            item_id,
            rating: Rating::new(value),
        }
    }
}

impl TextParsable for RatingTriple {
    fn to_text(&self) -> Result<String> {
        Ok(format!("{},{},{}", self.user_id, self.item_id, self.rating.value))
    }

    fn parse_text(text: &str) -> Result<Self> {
        let malformed =
            || Error::serialization().with_message(format!("malformed rating triple {text:?}"));

        let mut parts = text.trim().split(',').map(str::trim);
        let (Some(user), Some(item), Some(value), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        Ok(Self::new(
            user.parse().map_err(|_| malformed())?,
            item.parse().map_err(|_| malformed())?,
            value.parse().map_err(|_| malformed())?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Context, ContextTemplate, ContextValue};

    #[test]
    fn mean_ignores_unrated_fields() {
        let mut vector = RatingVector::user(1);
        vector.put(10, Rating::new(4.0));
        vector.put(11, Rating::new(2.0));
        vector.put(12, Rating::unrated());

        assert_eq!(vector.count(), 2);
        assert_eq!(vector.mean(), 3.0);
        assert!(!vector.is_rated(12));
        assert!(RatingVector::item(5).mean().is_nan());
    }

    #[test]
    fn select_keeps_inferable_ratings() {
        let time = ContextTemplate::new(1, "time");
        let morning = Context::new(time.clone(), Some(ContextValue::Text("morning".into())));
        let evening = Context::new(time, Some(ContextValue::Text("evening".into())));

        let mut vector = RatingVector::user(1);
        vector.put(10, Rating::new(4.0).with_contexts(ContextList::from(vec![morning.clone()])));
        vector.put(11, Rating::new(2.0).with_contexts(ContextList::from(vec![evening])));

        let selected = vector.select(&ContextList::from(vec![morning])).unwrap();
        assert_eq!(selected.field_ids(), vec![10]);

        // Ratings without contexts never match an empty query.
        assert!(vector.select(&ContextList::default()).is_none());
    }

    #[test]
    fn unrated_survives_json() {
        let json = serde_json::to_string(&Rating::unrated()).unwrap();
        let back: Rating = serde_json::from_str(&json).unwrap();
        assert!(!back.is_rated());
    }

    #[test]
    fn rating_has_no_text_form() {
        let error = Rating::new(1.0).to_text().unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::Unsupported);
    }

    #[test]
    fn triple_text() {
        let triple = RatingTriple::parse_text(" 3, 7 ,4.5").unwrap();
        assert_eq!(triple, RatingTriple::new(3, 7, 4.5));
        assert_eq!(triple.to_text().unwrap(), "3,7,4.5");
        assert!(RatingTriple::parse_text("3,7").is_err());
        assert!(RatingTriple::parse_text("3,7,x").is_err());
    }

    #[test]
    fn vector_text() {
        let vector = RatingVector::parse_text("item:7|1=4,2=5").unwrap();
        assert_eq!(vector.kind(), VectorKind::Item);
        assert_eq!(vector.get(2).map(|r| r.value), Some(5.0));
        assert_eq!(vector.to_text().unwrap(), "item:7|1=4,2=5");
    }
}
