use serde::{Deserialize, Serialize};

use super::AttributeValue;
use crate::error::{Error, Result};
use crate::text::TextParsable;

/// Link between an internal id and a key in an external store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecord {
    /// Unit (table) of the external store.
    pub unit: String,
    /// Attribute (column) holding the external key.
    pub attribute: String,
    pub value: AttributeValue,
}

impl ExternalRecord {
    pub fn new(
        unit: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self {
            unit: unit.into(),
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

impl TextParsable for ExternalRecord {
    /// Formats as `unit,attribute,value`; only text values have a text form.
    fn to_text(&self) -> Result<String> {
        match &self.value {
            AttributeValue::Text(value) => Ok(format!("{},{},{value}", self.unit, self.attribute)),
            AttributeValue::Integer(value) => Ok(format!("{},{},{value}", self.unit, self.attribute)),
            other => Err(Error::unsupported()
                .with_message(format!("external value {other:?} has no text form"))),
        }
    }

    fn parse_text(text: &str) -> Result<Self> {
        let mut parts = text.trim().splitn(3, ',');
        let (Some(unit), Some(attribute), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::serialization()
                .with_message(format!("malformed external record {text:?}")));
        };

        Ok(Self::new(unit, attribute, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_value_is_kept_verbatim() {
        let record = ExternalRecord::parse_text("movies,imdb_id,tt0111161").unwrap();
        assert_eq!(record.value, AttributeValue::Text("tt0111161".into()));
        assert_eq!(record.to_text().unwrap(), "movies,imdb_id,tt0111161");
    }
}
