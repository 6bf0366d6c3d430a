//! Selector construction from flexible caller input

use bson::{oid::ObjectId, Bson, Document};

use crate::cast::{IdCaster, ID_FIELD};
use crate::{Result, YieldbError};

/// What the caller passed where a selector is expected
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SelectorInput {
    /// Nothing was passed
    #[default]
    Empty,
    /// A bare identifier, matched against `_id`
    Id(Bson),
    /// A selector document
    Selector(Document),
}

impl SelectorInput {
    /// Returns true if nothing was passed
    pub fn is_empty(&self) -> bool {
        matches!(self, SelectorInput::Empty)
    }
}

impl From<()> for SelectorInput {
    fn from(_: ()) -> Self {
        SelectorInput::Empty
    }
}

impl From<Document> for SelectorInput {
    fn from(doc: Document) -> Self {
        SelectorInput::Selector(doc)
    }
}

impl From<&Document> for SelectorInput {
    fn from(doc: &Document) -> Self {
        SelectorInput::Selector(doc.clone())
    }
}

impl From<ObjectId> for SelectorInput {
    fn from(oid: ObjectId) -> Self {
        SelectorInput::Id(Bson::ObjectId(oid))
    }
}

impl From<&str> for SelectorInput {
    fn from(id: &str) -> Self {
        SelectorInput::Id(Bson::String(id.to_string()))
    }
}

impl From<String> for SelectorInput {
    fn from(id: String) -> Self {
        SelectorInput::Id(Bson::String(id))
    }
}

impl From<Bson> for SelectorInput {
    fn from(value: Bson) -> Self {
        match value {
            Bson::Null | Bson::Undefined => SelectorInput::Empty,
            Bson::Document(doc) => SelectorInput::Selector(doc),
            other => SelectorInput::Id(other),
        }
    }
}

impl<T: Into<SelectorInput>> From<Option<T>> for SelectorInput {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// Build a selector document; `Empty` matches every document
pub fn build_selector(input: SelectorInput, caster: &IdCaster) -> Document {
    match input {
        SelectorInput::Empty => Document::new(),
        SelectorInput::Id(id) => {
            let mut selector = Document::new();
            selector.insert(ID_FIELD, caster.cast_id(&id));
            selector
        }
        SelectorInput::Selector(doc) => caster.cast_document(&doc),
    }
}

/// Build a selector for operations that must not run without one
///
/// An explicit empty document is still accepted and matches everything;
/// only the absence of a selector is rejected.
pub fn require_selector(input: SelectorInput, caster: &IdCaster) -> Result<Document> {
    if input.is_empty() {
        return Err(YieldbError::MissingSelector);
    }
    Ok(build_selector(input, caster))
}
