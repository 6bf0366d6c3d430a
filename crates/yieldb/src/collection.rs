//! Collection operations
//!
//! Every method normalizes its arguments immediately and returns either a
//! query builder (`find`, `find_one`, `aggregate`) or a [`Deferred`]
//! operation. Argument problems (a missing selector, a missing update, a
//! malformed pipeline or insert) are returned right away as `Err`; nothing
//! is sent to the server until the returned value is awaited.
//!
//! # Example
//!
//! ```ignore
//! let users = db.col("users")?;
//!
//! let mut zelda = doc! { "name": "Zelda" };
//! users.insert(&mut zelda, None)?.await?;
//! let id = zelda.get_object_id("_id")?;
//!
//! let found = users.find_one(id.to_hex(), None)?.await?;
//! let matched = users
//!     .update(id, doc! { "$set": { "rating": 5 } }, Options::new().multi(false))?
//!     .await?
//!     .n();
//! ```

use std::sync::Arc;

use bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::options::{
    CountOptions, DeleteOptions, FindOneAndDeleteOptions, FindOneAndReplaceOptions,
    FindOneAndUpdateOptions, FindOptions, InsertManyOptions, ReplaceOptions, ReturnDocument,
    UpdateOptions,
};
use tracing::{debug, debug_span, Instrument};

use crate::cast::{IdCaster, ID_FIELD};
use crate::connection::Connection;
use crate::deferred::Deferred;
use crate::options::{InsertResult, Options, Shaped, WriteResult};
use crate::query::{build_pipeline, Aggregate, Many, One, Query};
use crate::selector::{build_selector, require_selector, SelectorInput};
use crate::validation::ValidatedCollectionName;
use crate::{Result, YieldbError};

/// Documents handed to [`Collection::insert`]
///
/// Documents are borrowed mutably: any document without an `_id` gets a new
/// `ObjectId` written into it.
#[derive(Debug)]
pub enum InsertDocs<'a> {
    One(&'a mut Document),
    Many(&'a mut [Document]),
    /// A dynamic value; must be a document or an array of documents
    Value(&'a mut Bson),
}

impl<'a> From<&'a mut Document> for InsertDocs<'a> {
    fn from(doc: &'a mut Document) -> Self {
        InsertDocs::One(doc)
    }
}

impl<'a> From<&'a mut [Document]> for InsertDocs<'a> {
    fn from(docs: &'a mut [Document]) -> Self {
        InsertDocs::Many(docs)
    }
}

impl<'a> From<&'a mut Vec<Document>> for InsertDocs<'a> {
    fn from(docs: &'a mut Vec<Document>) -> Self {
        InsertDocs::Many(docs.as_mut_slice())
    }
}

impl<'a> From<&'a mut Bson> for InsertDocs<'a> {
    fn from(value: &'a mut Bson) -> Self {
        InsertDocs::Value(value)
    }
}

/// Attach an `_id` to every document missing one, and snapshot the documents
fn prepare_inserts(docs: InsertDocs<'_>) -> Result<(Vec<Document>, bool)> {
    let (targets, single): (Vec<&mut Document>, bool) = match docs {
        InsertDocs::One(doc) => (vec![doc], true),
        InsertDocs::Many(docs) => (docs.iter_mut().collect(), false),
        InsertDocs::Value(Bson::Document(doc)) => (vec![doc], true),
        InsertDocs::Value(Bson::Array(items)) => {
            let mut targets = Vec::with_capacity(items.len());
            for (index, item) in items.iter_mut().enumerate() {
                match item {
                    Bson::Document(doc) => targets.push(doc),
                    other => {
                        return Err(YieldbError::InvalidInsert(format!(
                            "element {} is not a document: {}",
                            index, other
                        )))
                    }
                }
            }
            (targets, false)
        }
        InsertDocs::Value(Bson::Null) | InsertDocs::Value(Bson::Undefined) => {
            return Err(YieldbError::InvalidInsert("missing documents".to_string()))
        }
        InsertDocs::Value(other) => {
            return Err(YieldbError::InvalidInsert(format!(
                "expected a document or an array of documents, got {}",
                other
            )))
        }
    };

    if targets.is_empty() {
        return Err(YieldbError::InvalidInsert(
            "cannot insert an empty list of documents".to_string(),
        ));
    }

    let snapshot = targets
        .into_iter()
        .map(|doc| {
            if !doc.contains_key(ID_FIELD) {
                doc.insert(ID_FIELD, ObjectId::new());
            }
            doc.clone()
        })
        .collect();

    Ok((snapshot, single))
}

/// Wrap an update without `$` operators in `$set`
fn into_modifiers(update: Document) -> Document {
    if has_operators(&update) {
        update
    } else {
        doc! { "$set": update }
    }
}

fn has_operators(update: &Document) -> bool {
    update.keys().any(|k| k.starts_with('$'))
}

fn return_document(options: &Options) -> ReturnDocument {
    if options.is_new() {
        ReturnDocument::After
    } else {
        ReturnDocument::Before
    }
}

fn find_and_update_options(options: &Options) -> Result<FindOneAndUpdateOptions> {
    let mut update: FindOneAndUpdateOptions = options.driver_options()?;
    update.return_document = Some(return_document(options));
    if let Some(projection) = &options.select {
        update.projection = Some(projection.clone());
    }
    if let Some(sort) = &options.sort {
        update.sort = Some(sort.clone());
    }
    Ok(update)
}

fn find_and_replace_options(options: &Options) -> Result<FindOneAndReplaceOptions> {
    let mut replace: FindOneAndReplaceOptions = options.driver_options()?;
    replace.return_document = Some(return_document(options));
    if let Some(projection) = &options.select {
        replace.projection = Some(projection.clone());
    }
    if let Some(sort) = &options.sort {
        replace.sort = Some(sort.clone());
    }
    Ok(replace)
}

fn find_and_delete_options(options: &Options) -> Result<FindOneAndDeleteOptions> {
    let mut delete: FindOneAndDeleteOptions = options.driver_options()?;
    if let Some(projection) = &options.select {
        delete.projection = Some(projection.clone());
    }
    if let Some(sort) = &options.sort {
        delete.sort = Some(sort.clone());
    }
    Ok(delete)
}

/// A zero limit counts everything; the server rejects `$limit: 0`
fn count_options(options: &Options) -> Result<CountOptions> {
    let mut count: CountOptions = options.driver_options()?;
    if let Some(skip) = options.skip {
        count.skip = Some(skip);
    }
    match options.limit {
        Some(0) | None => {}
        Some(limit) => count.limit = Some(limit.unsigned_abs()),
    }
    Ok(count)
}

/// Namespace bound to a shared connection
#[derive(Clone)]
pub struct Collection {
    name: ValidatedCollectionName,
    conn: Arc<Connection>,
    inner: mongodb::Collection<Document>,
    caster: IdCaster,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name.as_str())
            .field("caster", &self.caster)
            .finish_non_exhaustive()
    }
}

impl Collection {
    pub(crate) fn new(name: ValidatedCollectionName, conn: Arc<Connection>, caster: IdCaster) -> Self {
        let inner = conn.get_collection(name.as_str());
        Self {
            name,
            conn,
            inner,
            caster,
        }
    }

    /// Get the collection name
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Get the driver collection, for operations this layer does not cover
    pub fn native(&self) -> &mongodb::Collection<Document> {
        &self.inner
    }

    /// Get the caster applied to this collection's arguments
    pub fn caster(&self) -> &IdCaster {
        &self.caster
    }

    fn find_options(&self, options: &Options) -> Result<FindOptions> {
        let mut find: FindOptions = options.driver_options()?;
        if let Some(projection) = &options.select {
            find.projection = Some(projection.clone());
        }
        if let Some(sort) = &options.sort {
            find.sort = Some(sort.clone());
        }
        if let Some(skip) = options.skip {
            find.skip = Some(skip);
        }
        if let Some(limit) = options.limit {
            find.limit = Some(limit);
        }
        Ok(find)
    }

    /// Find every document matching the selector
    pub fn find(
        &self,
        selector: impl Into<SelectorInput>,
        options: impl Into<Option<Options>>,
    ) -> Result<Query<Many>> {
        let options = options.into().unwrap_or_default();
        let selector = build_selector(selector.into(), &self.caster);
        let find = self.find_options(&options)?;
        Ok(Query::new(
            self.inner.clone(),
            self.conn.clone(),
            self.caster,
            selector,
            find,
        ))
    }

    /// Find the first document matching the selector
    pub fn find_one(
        &self,
        selector: impl Into<SelectorInput>,
        options: impl Into<Option<Options>>,
    ) -> Result<Query<One>> {
        let options = options.into().unwrap_or_default();
        let selector = build_selector(selector.into(), &self.caster);
        let find = self.find_options(&options)?;
        Ok(Query::new(
            self.inner.clone(),
            self.conn.clone(),
            self.caster,
            selector,
            find,
        ))
    }

    /// Insert one or more documents
    ///
    /// Documents without an `_id` are given one before this returns, so the
    /// caller's documents carry their identifiers once the insert resolves.
    /// With `fullResult: false` the operation resolves to the inserted
    /// documents instead of the result envelope.
    pub fn insert<'a>(
        &self,
        docs: impl Into<InsertDocs<'a>>,
        options: impl Into<Option<Options>>,
    ) -> Result<Deferred<Shaped<InsertResult, Vec<Document>>>> {
        let options = options.into().unwrap_or_default();
        let (docs, single) = prepare_inserts(docs.into())?;
        let insert_options: InsertManyOptions = options.driver_options()?;
        let full_result = options.is_full_result();

        let collection = self.inner.clone();
        let conn = self.conn.clone();
        let span = debug_span!("insert", collection = %self.name, count = docs.len(), single);

        Ok(Deferred::new(
            async move {
                conn.ensure_open()?;
                debug!("Inserting documents");

                collection
                    .insert_many(&docs)
                    .with_options(insert_options)
                    .await?;

                let inserted_ids: Vec<Bson> = docs
                    .iter()
                    .filter_map(|doc| doc.get(ID_FIELD).cloned())
                    .collect();
                debug!(inserted = inserted_ids.len(), "Insert complete");

                if full_result {
                    Ok(Shaped::Full(InsertResult {
                        ok: true,
                        n: inserted_ids.len() as u64,
                        inserted_ids,
                    }))
                } else {
                    Ok(Shaped::Reduced(docs))
                }
            }
            .instrument(span),
        ))
    }

    /// Update documents matching the selector
    ///
    /// `multi` defaults to true. An update without `$` operators is applied
    /// with `$set`, or as a replacement when `overwrite` is set. Resolves to
    /// the write envelope, or to the matched count with `fullResult: false`.
    pub fn update(
        &self,
        selector: impl Into<SelectorInput>,
        update: impl Into<Option<Document>>,
        options: impl Into<Option<Options>>,
    ) -> Result<Deferred<Shaped<WriteResult, u64>>> {
        let options = options.into().unwrap_or_default();
        let selector = require_selector(selector.into(), &self.caster)?;
        let update = update.into().ok_or(YieldbError::MissingUpdate)?;
        let update = self.caster.cast_document(&update);

        let full_result = options.is_full_result();
        let multi = options.is_multi();
        let replace = options.is_overwrite() && !has_operators(&update);

        let collection = self.inner.clone();
        let conn = self.conn.clone();
        let span = debug_span!("update", collection = %self.name, multi, replace);

        let op = if replace {
            let replace_options: ReplaceOptions = options.driver_options()?;
            Deferred::new(async move {
                conn.ensure_open()?;
                debug!("Replacing document");
                let result = collection
                    .replace_one(selector, update)
                    .with_options(replace_options)
                    .await?;
                Ok(WriteResult::from_update(result))
            })
        } else {
            let update_options: UpdateOptions = options.driver_options()?;
            let update = into_modifiers(update);
            Deferred::new(async move {
                conn.ensure_open()?;
                debug!("Updating documents");
                let action = if multi {
                    collection.update_many(selector, update)
                } else {
                    collection.update_one(selector, update)
                };
                let result = action.with_options(update_options).await?;
                Ok(WriteResult::from_update(result))
            })
        };

        Ok(Deferred::new(
            async move {
                let result = op.await?;
                debug!(matched = result.n, modified = ?result.n_modified, "Update complete");
                Ok(if full_result {
                    Shaped::Full(result)
                } else {
                    Shaped::Reduced(result.n)
                })
            }
            .instrument(span),
        ))
    }

    /// Remove documents matching the selector
    ///
    /// `multi` defaults to true. Resolves to the write envelope, or to the
    /// deleted count with `fullResult: false`.
    pub fn remove(
        &self,
        selector: impl Into<SelectorInput>,
        options: impl Into<Option<Options>>,
    ) -> Result<Deferred<Shaped<WriteResult, u64>>> {
        let options = options.into().unwrap_or_default();
        let selector = require_selector(selector.into(), &self.caster)?;
        let delete_options: DeleteOptions = options.driver_options()?;

        let full_result = options.is_full_result();
        let multi = options.is_multi();

        let collection = self.inner.clone();
        let conn = self.conn.clone();
        let span = debug_span!("remove", collection = %self.name, multi);

        Ok(Deferred::new(
            async move {
                conn.ensure_open()?;
                debug!("Removing documents");

                let action = if multi {
                    collection.delete_many(selector)
                } else {
                    collection.delete_one(selector)
                };
                let result = WriteResult::from_delete(action.with_options(delete_options).await?);

                debug!(deleted = result.n, "Remove complete");
                Ok(if full_result {
                    Shaped::Full(result)
                } else {
                    Shaped::Reduced(result.n)
                })
            }
            .instrument(span),
        ))
    }

    /// Update the first matching document and return it
    ///
    /// `new` defaults to true, returning the document after modification.
    /// Resolves to `None` when nothing matched.
    pub fn find_one_and_update(
        &self,
        selector: impl Into<SelectorInput>,
        update: impl Into<Option<Document>>,
        options: impl Into<Option<Options>>,
    ) -> Result<Deferred<Option<Document>>> {
        let options = options.into().unwrap_or_default();
        let selector = build_selector(selector.into(), &self.caster);
        let update = update.into().ok_or(YieldbError::MissingUpdate)?;
        let update = self.caster.cast_document(&update);

        let collection = self.inner.clone();
        let conn = self.conn.clone();
        let span = debug_span!("find_one_and_update", collection = %self.name);

        let op = if options.is_overwrite() && !has_operators(&update) {
            let replace_options = find_and_replace_options(&options)?;

            Deferred::new(async move {
                conn.ensure_open()?;
                let found = collection
                    .find_one_and_replace(selector, update)
                    .with_options(replace_options)
                    .await?;
                Ok(found)
            })
        } else {
            let update_options = find_and_update_options(&options)?;
            let update = into_modifiers(update);

            Deferred::new(async move {
                conn.ensure_open()?;
                let found = collection
                    .find_one_and_update(selector, update)
                    .with_options(update_options)
                    .await?;
                Ok(found)
            })
        };

        Ok(Deferred::new(
            async move {
                debug!("Finding and updating document");
                let found = op.await?;
                debug!(found = found.is_some(), "Find and update complete");
                Ok(found)
            }
            .instrument(span),
        ))
    }

    /// Remove the first matching document and return it
    ///
    /// Resolves to `None` when nothing matched.
    pub fn find_one_and_remove(
        &self,
        selector: impl Into<SelectorInput>,
        options: impl Into<Option<Options>>,
    ) -> Result<Deferred<Option<Document>>> {
        let options = options.into().unwrap_or_default();
        let selector = build_selector(selector.into(), &self.caster);

        let delete_options = find_and_delete_options(&options)?;

        let collection = self.inner.clone();
        let conn = self.conn.clone();
        let span = debug_span!("find_one_and_remove", collection = %self.name);

        Ok(Deferred::new(
            async move {
                conn.ensure_open()?;
                debug!("Finding and removing document");

                let found = collection
                    .find_one_and_delete(selector)
                    .with_options(delete_options)
                    .await?;

                debug!(found = found.is_some(), "Find and remove complete");
                Ok(found)
            }
            .instrument(span),
        ))
    }

    /// Run an aggregation pipeline
    ///
    /// `pipeline` must be an array of stage documents; a `Vec<Document>`
    /// converts directly.
    pub fn aggregate(
        &self,
        pipeline: impl Into<Bson>,
        options: impl Into<Option<Options>>,
    ) -> Result<Aggregate> {
        let options = options.into().unwrap_or_default();
        let pipeline = build_pipeline(pipeline.into(), &self.caster)?;
        let aggregate_options = options.driver_options()?;
        Ok(Aggregate::new(
            self.inner.clone(),
            self.conn.clone(),
            pipeline,
            aggregate_options,
        ))
    }

    /// Count documents matching the selector
    pub fn count(
        &self,
        selector: impl Into<SelectorInput>,
        options: impl Into<Option<Options>>,
    ) -> Result<Deferred<u64>> {
        let options = options.into().unwrap_or_default();
        let selector = build_selector(selector.into(), &self.caster);

        let count_options = count_options(&options)?;

        let collection = self.inner.clone();
        let conn = self.conn.clone();
        let span = debug_span!("count", collection = %self.name);

        Ok(Deferred::new(
            async move {
                conn.ensure_open()?;
                let count = collection
                    .count_documents(selector)
                    .with_options(count_options)
                    .await?;
                debug!(count, "Count complete");
                Ok(count)
            }
            .instrument(span),
        ))
    }
}
