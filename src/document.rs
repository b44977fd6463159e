//! The analyzed document model: the typed value streamed to a storage
//! back-end after analysis.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// A numeric value as stored in document meta data. Integer representation
/// is preferred, floating point is the fallback.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericValue {
    /// Signed integer value
    Int(i64),
    /// Floating point value
    Float(f64),
}

impl NumericValue {
    /// Parses a numeric value from its string form. Integers win over
    /// floats when both readings are possible.
    pub fn parse(src: &str) -> Result<NumericValue> {
        let trimmed = src.trim();
        if let Ok(val) = i64::from_str(trimmed) {
            return Ok(NumericValue::Int(val));
        }
        match f64::from_str(trimmed) {
            Ok(val) => Ok(NumericValue::Float(val)),
            Err(_) => Err(Error::InvalidArgument(format!(
                "'{}' is not a numeric value",
                src
            ))),
        }
    }

    /// Returns the value as `f64`, widening integers.
    pub fn as_f64(&self) -> f64 {
        match *self {
            NumericValue::Int(val) => val as f64,
            NumericValue::Float(val) => val,
        }
    }
}

impl fmt::Display for NumericValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            NumericValue::Int(val) => write!(f, "{}", val),
            NumericValue::Float(val) => write!(f, "{}", val),
        }
    }
}

impl From<i64> for NumericValue {
    fn from(val: i64) -> NumericValue {
        NumericValue::Int(val)
    }
}

impl From<f64> for NumericValue {
    fn from(val: f64) -> NumericValue {
        NumericValue::Float(val)
    }
}

/// A typed index term with its ordinal position in the document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    /// Term type name (the feature type it was produced for)
    #[serde(rename = "type")]
    pub kind: String,
    /// Normalized term value
    pub value: String,
    /// Ordinal position, counting from 1
    pub pos: u32,
}

impl Term {
    /// Creates a new term.
    pub fn new(kind: impl Into<String>, value: impl Into<String>, pos: u32) -> Term {
        Term {
            kind: kind.into(),
            value: value.into(),
            pos,
        }
    }
}

/// A named document attribute, stored verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAttribute {
    /// Attribute name
    pub name: String,
    /// Attribute value
    pub value: String,
}

/// A named numeric meta data element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetaData {
    /// Meta data field name
    pub name: String,
    /// Numeric value of the field
    pub value: NumericValue,
}

/// The result of a document analysis: attributes, meta data and the two
/// positioned term lists for the search and the forward index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Name of the sub-document type this document was built from. Empty
    /// for a document analyzed in single-document mode.
    pub sub_document_type: String,
    /// Document attributes
    pub attributes: Vec<DocumentAttribute>,
    /// Numeric document meta data
    pub metadata: Vec<DocumentMetaData>,
    /// Terms of the search index
    pub search_terms: Vec<Term>,
    /// Terms of the forward index
    pub forward_terms: Vec<Term>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Document {
        Document::default()
    }

    /// Appends an attribute.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.push(DocumentAttribute {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Sets a meta data element, replacing a previous value of the same name.
    pub fn set_metadata(&mut self, name: impl Into<String>, value: NumericValue) {
        let name = name.into();
        if let Some(entry) = self.metadata.iter_mut().find(|m| m.name == name) {
            entry.value = value;
        } else {
            self.metadata.push(DocumentMetaData { name, value });
        }
    }

    /// Appends a term to the search index.
    pub fn add_search_term(&mut self, term: Term) {
        self.search_terms.push(term);
    }

    /// Appends a term to the forward index.
    pub fn add_forward_term(&mut self, term: Term) {
        self.forward_terms.push(term);
    }

    /// Looks up a meta data value by name.
    pub fn metadata_value(&self, name: &str) -> Option<NumericValue> {
        self.metadata.iter().find(|m| m.name == name).map(|m| m.value)
    }

    /// True if the document carries no terms, attributes or meta data.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
            && self.metadata.is_empty()
            && self.search_terms.is_empty()
            && self.forward_terms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_parse_prefers_int() {
        assert_eq!(NumericValue::parse("42").unwrap(), NumericValue::Int(42));
        assert_eq!(NumericValue::parse(" -7 ").unwrap(), NumericValue::Int(-7));
        assert_eq!(
            NumericValue::parse("3.25").unwrap(),
            NumericValue::Float(3.25)
        );
        assert!(NumericValue::parse("x1").is_err());
    }

    #[test]
    fn metadata_replaces_same_name() {
        let mut doc = Document::new();
        doc.set_metadata("doclen", NumericValue::Int(1));
        doc.set_metadata("doclen", NumericValue::Int(2));
        assert_eq!(doc.metadata.len(), 1);
        assert_eq!(doc.metadata_value("doclen"), Some(NumericValue::Int(2)));
    }
}
