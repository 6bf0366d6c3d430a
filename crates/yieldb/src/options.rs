//! Per-call options and result shapes
//!
//! Options are recognized by name (`select`, `skip`, `limit`, `sort`,
//! `multi`, `fullResult`, `new`, `overwrite`). Anything else lands in
//! [`Options::extra`] and is handed to the driver's own option struct for the
//! operation, using the driver's camelCase names (`batchSize`, `comment`,
//! `upsert`, ...).

use bson::{Bson, Document};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Result, YieldbError};

/// Per-call configuration for a collection operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    /// Field projection
    pub select: Option<Document>,
    /// Number of documents to skip
    pub skip: Option<u64>,
    /// Maximum number of documents
    pub limit: Option<i64>,
    /// Sort order
    pub sort: Option<Document>,
    /// Affect every matching document (default: true)
    pub multi: Option<bool>,
    /// Resolve to the full result envelope (default: true)
    pub full_result: Option<bool>,
    /// Return the post-modification document (default: true)
    pub new: Option<bool>,
    /// Send a non-operator update as a replacement (default: false)
    pub overwrite: Option<bool>,
    /// Unrecognized keys, passed through to the driver
    pub extra: Document,
}

impl Options {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a mapping
    ///
    /// `select` and `sort` accept either a document or the compact string
    /// form (`"name -_id"`).
    pub fn from_document(doc: Document) -> Result<Self> {
        let mut options = Options::new();

        for (key, value) in doc {
            match key.as_str() {
                "select" => options.select = Some(parse_projection(&value)?),
                "sort" => options.sort = Some(parse_sort(&value)?),
                "skip" => {
                    let skip = as_i64(&value, "skip")?;
                    options.skip = Some(u64::try_from(skip).map_err(|_| {
                        YieldbError::InvalidOptions(format!("skip must be non-negative, got {}", skip))
                    })?);
                }
                "limit" => options.limit = Some(as_i64(&value, "limit")?),
                "multi" => options.multi = Some(as_bool(&value, "multi")?),
                "fullResult" => options.full_result = Some(as_bool(&value, "fullResult")?),
                "new" => options.new = Some(as_bool(&value, "new")?),
                "overwrite" => options.overwrite = Some(as_bool(&value, "overwrite")?),
                _ => {
                    options.extra.insert(key, value);
                }
            }
        }

        Ok(options)
    }

    /// Set the projection
    pub fn select(mut self, projection: Document) -> Self {
        self.select = Some(projection);
        self
    }

    /// Set the number of documents to skip
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Set the maximum number of documents to return
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the sort order
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set whether updates and removes affect every match
    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = Some(multi);
        self
    }

    /// Set whether to resolve to the full result envelope
    pub fn full_result(mut self, full_result: bool) -> Self {
        self.full_result = Some(full_result);
        self
    }

    /// Set whether findOneAndUpdate returns the modified document
    pub fn new_document(mut self, new: bool) -> Self {
        self.new = Some(new);
        self
    }

    /// Set whether a non-operator update replaces the document
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = Some(overwrite);
        self
    }

    /// Add a driver option by its driver name
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub(crate) fn is_multi(&self) -> bool {
        self.multi.unwrap_or(true)
    }

    pub(crate) fn is_full_result(&self) -> bool {
        self.full_result.unwrap_or(true)
    }

    pub(crate) fn is_new(&self) -> bool {
        self.new.unwrap_or(true)
    }

    pub(crate) fn is_overwrite(&self) -> bool {
        self.overwrite.unwrap_or(false)
    }

    /// Build a driver option struct from the pass-through keys
    pub(crate) fn driver_options<O>(&self) -> Result<O>
    where
        O: DeserializeOwned + Default,
    {
        if self.extra.is_empty() {
            return Ok(O::default());
        }
        bson::from_document(self.extra.clone()).map_err(|e| {
            YieldbError::InvalidOptions(format!("unsupported driver option: {}", e))
        })
    }
}

impl TryFrom<Document> for Options {
    type Error = YieldbError;

    fn try_from(doc: Document) -> Result<Self> {
        Options::from_document(doc)
    }
}

fn as_i64(value: &Bson, key: &str) -> Result<i64> {
    match value {
        Bson::Int32(n) => Ok(i64::from(*n)),
        Bson::Int64(n) => Ok(*n),
        Bson::Double(f) if f.fract() == 0.0 => Ok(*f as i64),
        other => Err(YieldbError::InvalidOptions(format!(
            "{} must be an integer, got {}",
            key, other
        ))),
    }
}

fn as_bool(value: &Bson, key: &str) -> Result<bool> {
    value.as_bool().ok_or_else(|| {
        YieldbError::InvalidOptions(format!("{} must be a boolean, got {}", key, value))
    })
}

/// Parse a projection given as a document or as `"a -b"`
pub fn parse_projection(value: &Bson) -> Result<Document> {
    parse_field_list(value, "select", 1, 0)
}

/// Parse a sort order given as a document or as `"a -b"`
pub fn parse_sort(value: &Bson) -> Result<Document> {
    parse_field_list(value, "sort", 1, -1)
}

fn parse_field_list(value: &Bson, key: &str, include: i32, exclude: i32) -> Result<Document> {
    match value {
        Bson::Document(doc) => Ok(doc.clone()),
        Bson::String(fields) => {
            let mut doc = Document::new();
            for field in fields.split_whitespace() {
                match field.strip_prefix('-') {
                    Some(name) if !name.is_empty() => doc.insert(name, exclude),
                    Some(_) => {
                        return Err(YieldbError::InvalidOptions(format!(
                            "{} has an empty field name",
                            key
                        )))
                    }
                    None => doc.insert(field.trim_start_matches('+'), include),
                };
            }
            Ok(doc)
        }
        other => Err(YieldbError::InvalidOptions(format!(
            "{} must be a document or a string, got {}",
            key, other
        ))),
    }
}

/// A result in full envelope form or reduced to a convenience value
#[derive(Debug, Clone, PartialEq)]
pub enum Shaped<F, R> {
    Full(F),
    Reduced(R),
}

impl<F, R> Shaped<F, R> {
    /// Returns true for the full envelope form
    pub fn is_full(&self) -> bool {
        matches!(self, Shaped::Full(_))
    }

    /// Get the full envelope, if that is what was requested
    pub fn into_full(self) -> Option<F> {
        match self {
            Shaped::Full(full) => Some(full),
            Shaped::Reduced(_) => None,
        }
    }

    /// Get the reduced value, if that is what was requested
    pub fn into_reduced(self) -> Option<R> {
        match self {
            Shaped::Full(_) => None,
            Shaped::Reduced(reduced) => Some(reduced),
        }
    }
}

impl Shaped<WriteResult, u64> {
    /// Number of documents matched, whichever form was requested
    pub fn n(&self) -> u64 {
        match self {
            Shaped::Full(result) => result.n,
            Shaped::Reduced(n) => *n,
        }
    }
}

/// Full result of an insert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertResult {
    /// Write acknowledged
    pub ok: bool,
    /// Number of documents inserted
    pub n: u64,
    /// Identifiers of the inserted documents, in input order
    pub inserted_ids: Vec<Bson>,
}

/// Full result of an update or remove
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteResult {
    /// Write acknowledged
    pub ok: bool,
    /// Documents matched (updates) or deleted (removes)
    pub n: u64,
    /// Documents modified; not reported by removes
    #[serde(rename = "nModified", skip_serializing_if = "Option::is_none")]
    pub n_modified: Option<u64>,
    /// Identifier of an upserted document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<Bson>,
}

impl WriteResult {
    pub(crate) fn from_update(result: mongodb::results::UpdateResult) -> Self {
        Self {
            ok: true,
            n: result.matched_count,
            n_modified: Some(result.modified_count),
            upserted_id: result.upserted_id,
        }
    }

    pub(crate) fn from_delete(result: mongodb::results::DeleteResult) -> Self {
        Self {
            ok: true,
            n: result.deleted_count,
            n_modified: None,
            upserted_id: None,
        }
    }
}
