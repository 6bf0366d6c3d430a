//! ObjectId casting for selectors, update documents and pipelines
//!
//! Callers routinely pass identifiers around as hex strings. Before a value
//! reaches the driver, every string that is exactly the canonical 24-digit
//! hex form of an ObjectId is rewritten into a real `ObjectId`, at any depth.
//!
//! Casting never touches its input: documents and arrays are rebuilt, so a
//! caller's selector is the same after the call as before it.
//!
//! # Example
//!
//! ```
//! use bson::{doc, Bson};
//! use yieldb::cast::IdCaster;
//!
//! let selector = doc! { "owner": { "$in": ["5f1d7f1b9d3e2a0012345678", "bob"] } };
//! let cast = IdCaster::default().cast_document(&selector);
//!
//! let owners = cast.get_document("owner").unwrap().get_array("$in").unwrap();
//! assert!(matches!(owners[0], Bson::ObjectId(_)));
//! assert_eq!(owners[1], Bson::String("bob".to_string()));
//! ```

use bson::{oid::ObjectId, Bson, Document};

/// Length of the hex encoding of a 12-byte ObjectId
const OBJECT_ID_HEX_LENGTH: usize = 24;

/// Field that always holds a document identifier
pub const ID_FIELD: &str = "_id";

/// Which strings are candidates for ObjectId casting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CastMode {
    /// Cast every canonical hex string, wherever it appears
    #[default]
    Lenient,

    /// Cast only values reached through an `_id` key
    ///
    /// Everything below an `_id` key counts, so `{ _id: { $in: [..] } }`
    /// still has its members cast.
    IdFieldsOnly,

    /// Never cast strings; callers pass `ObjectId` values themselves
    Strict,
}

/// Checks if a string has the exact ObjectId hex shape (24 hex digits)
pub fn is_object_id_hex(value: &str) -> bool {
    value.len() == OBJECT_ID_HEX_LENGTH && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parses a string into an ObjectId if it has the exact hex shape
pub fn parse_object_id(value: &str) -> Option<ObjectId> {
    if !is_object_id_hex(value) {
        return None;
    }
    ObjectId::parse_str(value).ok()
}

/// Recursive hex string to ObjectId rewriter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdCaster {
    mode: CastMode,
}

impl IdCaster {
    /// Create a caster with the given mode
    pub fn new(mode: CastMode) -> Self {
        Self { mode }
    }

    /// Get the cast mode
    pub fn mode(&self) -> CastMode {
        self.mode
    }

    /// Cast a value, returning a rewritten copy
    pub fn cast(&self, value: &Bson) -> Bson {
        self.cast_value(value, false)
    }

    /// Cast a value that is known to be an identifier (an `_id` value)
    pub fn cast_id(&self, value: &Bson) -> Bson {
        self.cast_value(value, true)
    }

    /// Cast every value of a document, returning a fresh document
    pub fn cast_document(&self, doc: &Document) -> Document {
        self.cast_fields(doc, false)
    }

    fn cast_value(&self, value: &Bson, in_id: bool) -> Bson {
        match value {
            Bson::String(s) if self.casts_strings(in_id) => match parse_object_id(s) {
                Some(oid) => Bson::ObjectId(oid),
                None => value.clone(),
            },
            Bson::Document(doc) => Bson::Document(self.cast_fields(doc, in_id)),
            Bson::Array(items) => Bson::Array(
                items.iter().map(|item| self.cast_value(item, in_id)).collect(),
            ),
            other => other.clone(),
        }
    }

    fn cast_fields(&self, doc: &Document, in_id: bool) -> Document {
        doc.iter()
            .map(|(key, value)| {
                let cast = self.cast_value(value, in_id || key == ID_FIELD);
                (key.clone(), cast)
            })
            .collect()
    }

    fn casts_strings(&self, in_id: bool) -> bool {
        match self.mode {
            CastMode::Lenient => true,
            CastMode::IdFieldsOnly => in_id,
            CastMode::Strict => false,
        }
    }
}

/// Cast a value with the default (lenient) caster
pub fn cast(value: &Bson) -> Bson {
    IdCaster::default().cast(value)
}

/// Cast a document with the default (lenient) caster
pub fn cast_document(doc: &Document) -> Document {
    IdCaster::default().cast_document(doc)
}
