//! Attribute schemas and attribute values.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, IntoStaticStr};

use super::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, IntoStaticStr)]
#[derive(Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Bit,
    Nominal,
    Integer,
    Real,
    Text,
    Time,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered attribute schema of a profile table, with an optional key
/// attribute holding the profile id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeList {
    attributes: Vec<Attribute>,
    key: Option<usize>,
}

impl AttributeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a schema holding only an integer key attribute.
    pub fn with_key(name: impl Into<String>) -> Self {
        Self {
            attributes: vec![Attribute::new(name, AttributeType::Integer)],
            key: Some(0),
        }
    }

    pub fn add(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    pub fn get(&self, index: usize) -> Option<&Attribute> {
        self.attributes.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Index of the key attribute.
    pub fn key(&self) -> Option<usize> {
        self.key
    }

    pub fn set_key(&mut self, index: usize) {
        if index < self.attributes.len() {
            self.key = Some(index);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    #[default]
    Null,
    Bit(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Time(Timestamp),
}

impl AttributeValue {
    /// Interprets the value as an identifier.
    pub fn as_id(&self) -> Option<Id> {
        match self {
            Self::Integer(v) => Id::try_from(*v).ok(),
            Self::Real(v) if v.fract() == 0.0 => Some(*v as Id),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Id> for AttributeValue {
    fn from(value: Id) -> Self {
        Self::Integer(value.into())
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}
