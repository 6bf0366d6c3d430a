//! Query builders for find, findOne and aggregate
//!
//! A builder is consumed in one of two ways, never both:
//!
//! - `.await` (or [`Query::exec`]) resolves to the whole result at once;
//! - [`Query::stream`] yields documents one by one as the cursor advances.
//!   An `Err` item is the last item of a failed stream; `None` marks the end.
//!
//! Builders are `Clone`, so the same query can be run again from a copy.

use std::future::IntoFuture;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_stream::try_stream;
use bson::{Bson, Document};
use futures::stream::{BoxStream, Stream, TryStreamExt};
use mongodb::options::{AggregateOptions, FindOptions};
use mongodb::Collection;
use tracing::{debug, debug_span, Instrument};

use crate::cast::IdCaster;
use crate::connection::Connection;
use crate::deferred::Deferred;
use crate::selector::{build_selector, SelectorInput};
use crate::{Result, YieldbError};

/// How a find query turns its documents into a result
pub trait QueryMode: Send + 'static {
    /// Resolved value of the query
    type Output: Send + 'static;

    /// Operation name used in logs
    const NAME: &'static str;

    /// Adjust the driver options just before execution
    fn prepare(_options: &mut FindOptions) {}

    /// Build the result from the fetched documents
    fn collect(docs: Vec<Document>) -> Self::Output;
}

/// `find`: every matching document
#[derive(Debug)]
pub enum Many {}

/// `findOne`: the first matching document, if any
#[derive(Debug)]
pub enum One {}

impl QueryMode for Many {
    type Output = Vec<Document>;
    const NAME: &'static str = "find";

    fn collect(docs: Vec<Document>) -> Self::Output {
        docs
    }
}

impl QueryMode for One {
    type Output = Option<Document>;
    const NAME: &'static str = "findOne";

    fn prepare(options: &mut FindOptions) {
        options.limit = Some(1);
    }

    fn collect(docs: Vec<Document>) -> Self::Output {
        docs.into_iter().next()
    }
}

/// Find query bound to a normalized selector
pub struct Query<M: QueryMode = Many> {
    collection: Collection<Document>,
    conn: Arc<Connection>,
    caster: IdCaster,
    selector: Document,
    options: FindOptions,
    mode: PhantomData<fn() -> M>,
}

impl<M: QueryMode> Clone for Query<M> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            conn: self.conn.clone(),
            caster: self.caster,
            selector: self.selector.clone(),
            options: self.options.clone(),
            mode: PhantomData,
        }
    }
}

impl<M: QueryMode> std::fmt::Debug for Query<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("mode", &M::NAME)
            .field("collection", &self.collection.name())
            .field("selector", &self.selector)
            .field("options", &self.options)
            .finish()
    }
}

impl<M: QueryMode> Query<M> {
    pub(crate) fn new(
        collection: Collection<Document>,
        conn: Arc<Connection>,
        caster: IdCaster,
        selector: Document,
        options: FindOptions,
    ) -> Self {
        Self {
            collection,
            conn,
            caster,
            selector,
            options,
            mode: PhantomData,
        }
    }

    /// Merge more criteria into the selector
    ///
    /// The criteria are cast like any selector; keys already present are
    /// replaced.
    pub fn filter(mut self, criteria: impl Into<SelectorInput>) -> Self {
        let criteria = build_selector(criteria.into(), &self.caster);
        for (key, value) in criteria {
            self.selector.insert(key, value);
        }
        self
    }

    /// Set the projection
    pub fn select(mut self, projection: Document) -> Self {
        self.options.projection = Some(projection);
        self
    }

    /// Set the sort order
    pub fn sort(mut self, sort: Document) -> Self {
        self.options.sort = Some(sort);
        self
    }

    /// Set the number of documents to skip
    pub fn skip(mut self, skip: u64) -> Self {
        self.options.skip = Some(skip);
        self
    }

    /// Set the maximum number of documents to return
    pub fn limit(mut self, limit: i64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Get the collection name
    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    /// Get the normalized selector
    pub fn selector(&self) -> &Document {
        &self.selector
    }

    /// Get the projection
    pub fn get_projection(&self) -> Option<&Document> {
        self.options.projection.as_ref()
    }

    /// Get the sort document
    pub fn get_sort(&self) -> Option<&Document> {
        self.options.sort.as_ref()
    }

    /// Get the skip value
    pub fn get_skip(&self) -> Option<u64> {
        self.options.skip
    }

    /// Get the limit value
    pub fn get_limit(&self) -> Option<i64> {
        self.options.limit
    }

    /// Run the query, resolving to the complete result
    pub fn exec(self) -> Deferred<M::Output> {
        let Query {
            collection,
            conn,
            selector,
            mut options,
            ..
        } = self;
        M::prepare(&mut options);

        let span = debug_span!("query", op = M::NAME, collection = %collection.name());
        Deferred::new(
            async move {
                conn.ensure_open()?;
                debug!("Executing query");

                let cursor = collection.find(selector).with_options(options).await?;
                let docs: Vec<Document> = cursor.try_collect().await?;

                debug!(returned = docs.len(), "Query complete");
                Ok(M::collect(docs))
            }
            .instrument(span),
        )
    }

    /// Run the query as a stream of documents
    ///
    /// The cursor is opened on the first poll.
    pub fn stream(self) -> DocumentStream {
        let Query {
            collection,
            conn,
            selector,
            mut options,
            ..
        } = self;
        M::prepare(&mut options);

        DocumentStream::new(try_stream! {
            conn.ensure_open()?;
            debug!(op = M::NAME, collection = %collection.name(), "Opening query cursor");
            let mut cursor = collection.find(selector).with_options(options).await?;
            while let Some(doc) = cursor.try_next().await? {
                yield doc;
            }
        })
    }
}

impl<M: QueryMode> IntoFuture for Query<M> {
    type Output = Result<M::Output>;
    type IntoFuture = Deferred<M::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.exec()
    }
}

/// Aggregation pipeline bound to a collection
#[derive(Clone)]
pub struct Aggregate {
    collection: Collection<Document>,
    conn: Arc<Connection>,
    pipeline: Vec<Document>,
    options: AggregateOptions,
}

impl std::fmt::Debug for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregate")
            .field("collection", &self.collection.name())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl Aggregate {
    pub(crate) fn new(
        collection: Collection<Document>,
        conn: Arc<Connection>,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> Self {
        Self {
            collection,
            conn,
            pipeline,
            options,
        }
    }

    /// Get the normalized pipeline
    pub fn pipeline(&self) -> &[Document] {
        &self.pipeline
    }

    /// Run the pipeline, resolving to every result document
    pub fn exec(self) -> Deferred<Vec<Document>> {
        let Aggregate {
            collection,
            conn,
            pipeline,
            options,
        } = self;

        let span = debug_span!("aggregate", collection = %collection.name(), stages = pipeline.len());
        Deferred::new(
            async move {
                conn.ensure_open()?;
                debug!("Executing aggregation");

                let cursor = collection.aggregate(pipeline).with_options(options).await?;
                let docs: Vec<Document> = cursor.try_collect().await?;

                debug!(returned = docs.len(), "Aggregation complete");
                Ok(docs)
            }
            .instrument(span),
        )
    }

    /// Run the pipeline as a stream of documents
    pub fn stream(self) -> DocumentStream {
        let Aggregate {
            collection,
            conn,
            pipeline,
            options,
        } = self;

        DocumentStream::new(try_stream! {
            conn.ensure_open()?;
            debug!(collection = %collection.name(), stages = pipeline.len(), "Opening aggregation cursor");
            let mut cursor = collection.aggregate(pipeline).with_options(options).await?;
            while let Some(doc) = cursor.try_next().await? {
                yield doc;
            }
        })
    }
}

impl IntoFuture for Aggregate {
    type Output = Result<Vec<Document>>;
    type IntoFuture = Deferred<Vec<Document>>;

    fn into_future(self) -> Self::IntoFuture {
        self.exec()
    }
}

/// Normalize an aggregation pipeline
///
/// The pipeline must be an array of stage documents. Every stage is cast,
/// and a `$match` stage given a bare identifier (`{ $match: "<hex>" }`)
/// becomes a match on `_id`.
pub(crate) fn build_pipeline(pipeline: Bson, caster: &IdCaster) -> Result<Vec<Document>> {
    let stages = match pipeline {
        Bson::Array(stages) => stages,
        _ => {
            return Err(YieldbError::InvalidPipeline(
                "pipeline must be an array".to_string(),
            ))
        }
    };

    stages
        .into_iter()
        .map(|stage| match stage {
            Bson::Document(stage) => Ok(build_stage(stage, caster)),
            _ => Err(YieldbError::InvalidPipeline(
                "pipeline stages must be documents".to_string(),
            )),
        })
        .collect()
}

fn build_stage(stage: Document, caster: &IdCaster) -> Document {
    stage
        .into_iter()
        .map(|(operator, value)| {
            let value = match value {
                Bson::Document(criteria) => Bson::Document(caster.cast_document(&criteria)),
                id @ (Bson::String(_) | Bson::ObjectId(_)) if operator == "$match" => {
                    Bson::Document(build_selector(SelectorInput::Id(id), caster))
                }
                other => caster.cast(&other),
            };
            (operator, value)
        })
        .collect()
}

/// Stream of documents from a find or aggregate cursor
#[must_use = "streams do nothing unless polled"]
pub struct DocumentStream {
    inner: BoxStream<'static, Result<Document>>,
}

impl DocumentStream {
    fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Document>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl Stream for DocumentStream {
    type Item = Result<Document>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for DocumentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStream").finish_non_exhaustive()
    }
}
