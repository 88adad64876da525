//! Main document store interface.
//!
//! [`DocumentStore`] owns a [`StoreBackend`] and exposes the typed operations: one-shot
//! reads and queries, the write pass-throughs, cursor pagination, and realtime
//! subscriptions.
//!
//! # Example
//!
//! ```ignore
//! use docwire::prelude::*;
//!
//! let store = DocumentStore::new(backend);
//! let contacts = collection::<Contact>("contacts");
//!
//! let sasha = store.add(&contacts, &Contact { name: "Sasha".into(), year: 1987 }).await?;
//! let found: Option<Doc<Contact>> = store.get(&sasha).await?;
//!
//! let born_early = store
//!     .query(&contacts, Query::from(vec![Filter::lt("year", 1990), order_by("year")]))
//!     .await?;
//! ```

use std::fmt::{Debug, Formatter};

use log::{debug, warn};
use uuid::Uuid;

use crate::{
    backend::StoreBackend,
    collection::{Collection, QuerySource},
    document::{Doc, Model, ModelExt},
    error::{DocumentStoreError, DocumentStoreResult},
    field_path::FieldPath,
    native::{NativeSnapshot, NativeValue, WatchEvent, WatchTarget},
    page::Page,
    query::{Query, QueryFragment, limit, order, order_by},
    reference::Ref,
    subscription::SubscriptionBuilder,
    transcode::to_native,
    value::Value,
};

/// Identifies a single document: either a reference or a collection plus an id.
pub enum DocTarget<M> {
    Ref(Ref<M>),
    CollectionId(Collection<M>, String),
}

impl<M: Model> DocTarget<M> {
    /// Resolves the target to a reference.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if the id is not a valid document id.
    pub fn into_ref(self) -> DocumentStoreResult<Ref<M>> {
        match self {
            DocTarget::Ref(reference) => Ok(reference),
            DocTarget::CollectionId(collection, id) => collection.reference(id),
        }
    }
}

impl<M> Debug for DocTarget<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DocTarget::Ref(reference) => f.debug_tuple("Ref").field(reference).finish(),
            DocTarget::CollectionId(collection, id) => f
                .debug_tuple("CollectionId")
                .field(collection)
                .field(id)
                .finish(),
        }
    }
}

impl<M> From<Ref<M>> for DocTarget<M> {
    fn from(reference: Ref<M>) -> Self {
        DocTarget::Ref(reference)
    }
}

impl<M> From<&Ref<M>> for DocTarget<M> {
    fn from(reference: &Ref<M>) -> Self {
        DocTarget::Ref(reference.clone())
    }
}

impl<M> From<(&Collection<M>, &str)> for DocTarget<M> {
    fn from((collection, id): (&Collection<M>, &str)) -> Self {
        DocTarget::CollectionId(collection.clone(), id.to_string())
    }
}

impl<M> From<(&Collection<M>, String)> for DocTarget<M> {
    fn from((collection, id): (&Collection<M>, String)) -> Self {
        DocTarget::CollectionId(collection.clone(), id)
    }
}

/// A single field change applied by [`DocumentStore::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub field: FieldPath,
    pub value: Value,
}

/// Builds a [`FieldUpdate`]. The value may be a sentinel such as [`Value::clear`] or
/// [`Value::increment`].
pub fn field(path: impl Into<FieldPath>, value: impl Into<Value>) -> FieldUpdate {
    FieldUpdate { field: path.into(), value: value.into() }
}

/// Store-wide settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Skip (and log) records that fail to decode instead of failing the whole read.
    ///
    /// Only multi-document results are affected. Single-document reads always report
    /// the decode error.
    pub skip_malformed_records: bool,
}

/// A document store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
    config: StoreConfig,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend and default settings.
    pub fn new(backend: B) -> Self {
        Self { backend, config: StoreConfig::default() }
    }

    pub fn builder(backend: B) -> DocumentStoreBuilder<B> {
        DocumentStoreBuilder::new(backend)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// Reads a single document.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is invalid, the backend fails, or the record does
    /// not decode into `M`.
    pub async fn get<M: Model>(
        &self,
        target: impl Into<DocTarget<M>>,
    ) -> DocumentStoreResult<Option<Doc<M>>> {
        let reference = target.into().into_ref()?;

        debug!("getting document {reference}");

        match self.backend.get_document(&reference.handle()).await? {
            Some(snapshot) => Doc::from_snapshot(&snapshot).map(Some),
            None => Ok(None),
        }
    }

    /// Runs a query against a collection or collection group.
    ///
    /// Documents come back in the order the store returned them. An empty vector means
    /// nothing matched.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidQuery`] if the query does not serialize, and
    /// [`DocumentStoreError::QueryExecution`] if the store rejects it.
    pub async fn query<M: Model>(
        &self,
        source: &impl QuerySource<M>,
        query: Query,
    ) -> DocumentStoreResult<Vec<Doc<M>>> {
        let native = query.to_native(source.query_target())?;

        debug!(
            "running query on {:?} ({} filters, {} orderings)",
            native.target,
            native.filters.len(),
            native.orderings.len()
        );

        let snapshots = self.backend.execute_query(native).await?;
        decode_snapshots(&snapshots, self.config)
    }

    /// Reads every document of a collection or collection group.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or a record does not decode.
    pub async fn all<M: Model>(
        &self,
        source: &impl QuerySource<M>,
    ) -> DocumentStoreResult<Vec<Doc<M>>> {
        self.query(source, Query::new()).await
    }

    /// Runs `query` limited to `page_size` documents and prepares the query for the
    /// following page.
    ///
    /// A query without ordering clauses is ordered by its inequality field, if it has
    /// one, or else by document id.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidQuery`] if `page_size` is zero, plus every
    /// error of [`query`](Self::query).
    pub async fn query_page<M: Model>(
        &self,
        source: &impl QuerySource<M>,
        query: Query,
        page_size: usize,
    ) -> DocumentStoreResult<Page<Doc<M>>> {
        if page_size == 0 {
            return Err(DocumentStoreError::InvalidQuery(
                "page size must be positive".to_string(),
            ));
        }

        let query = with_stable_ordering(query);
        let items = self
            .query(source, query.clone().and(limit(page_size)))
            .await?;

        let next = match items.last() {
            Some(last) if items.len() == page_size => {
                Some(query.resume_after(last.reference.raw(), &last.data.to_value()?))
            }
            _ => None,
        };

        Ok(Page::builder(items)
            .with_next_query(next)
            .build())
    }

    /// Creates or overwrites a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is invalid, `data` does not serialize to a map, or
    /// the backend fails.
    pub async fn set<M: Model>(
        &self,
        target: impl Into<DocTarget<M>>,
        data: &M,
    ) -> DocumentStoreResult<()> {
        let reference = target.into().into_ref()?;
        let fields = data.to_native_map()?;

        debug!("setting document {reference}");

        self.backend
            .set_document(&reference.handle(), fields)
            .await
    }

    /// Creates a document with a generated id.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` does not serialize to a map or the backend fails.
    pub async fn add<M: Model>(
        &self,
        collection: &Collection<M>,
        data: &M,
    ) -> DocumentStoreResult<Ref<M>> {
        let reference = collection.reference(Uuid::new_v4().simple().to_string())?;

        self.set(&reference, data).await?;
        Ok(reference)
    }

    /// Changes individual fields of an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] for an empty field path and
    /// [`DocumentStoreError::DocumentNotFound`] if the document does not exist.
    pub async fn update<M: Model>(
        &self,
        target: impl Into<DocTarget<M>>,
        updates: Vec<FieldUpdate>,
    ) -> DocumentStoreResult<()> {
        let reference = target.into().into_ref()?;
        let fields = updates
            .into_iter()
            .map(|update| {
                if update.field.is_empty() || update.field.is_document_id() {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "cannot update field '{}'",
                        update.field
                    )));
                }
                Ok((update.field, to_native(&update.value)))
            })
            .collect::<DocumentStoreResult<Vec<(FieldPath, NativeValue)>>>()?;

        debug!("updating {} fields of document {reference}", fields.len());

        self.backend
            .update_document(&reference.handle(), fields)
            .await
    }

    /// Deletes a document. Deleting a missing document succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is invalid or the backend fails.
    pub async fn remove<M: Model>(
        &self,
        target: impl Into<DocTarget<M>>,
    ) -> DocumentStoreResult<()> {
        let reference = target.into().into_ref()?;

        debug!("removing document {reference}");

        self.backend
            .delete_document(&reference.handle())
            .await
    }

    /// Prepares a realtime subscription to the results of `query`.
    ///
    /// Nothing is registered until [`SubscriptionBuilder::listen`] is awaited.
    pub fn subscribe_to_query<M: Model>(
        &self,
        source: &impl QuerySource<M>,
        query: Query,
    ) -> SubscriptionBuilder<'_, B, Vec<Doc<M>>> {
        let config = self.config;
        let target = query
            .to_native(source.query_target())
            .map(WatchTarget::Query);

        SubscriptionBuilder::new(&self.backend, target, move |event| match event {
            WatchEvent::Query(snapshots) => decode_snapshots(&snapshots, config),
            WatchEvent::Error(error) => Err(error),
            WatchEvent::Document(_) => Err(unexpected_event("document", "query")),
        })
    }

    /// Prepares a realtime subscription to a single document.
    ///
    /// Snapshots are `None` while the document does not exist.
    pub fn subscribe_to_document<M: Model>(
        &self,
        target: impl Into<DocTarget<M>>,
    ) -> SubscriptionBuilder<'_, B, Option<Doc<M>>> {
        let target = target
            .into()
            .into_ref()
            .map(|reference| WatchTarget::Document(reference.handle()));

        SubscriptionBuilder::new(&self.backend, target, move |event| match event {
            WatchEvent::Document(Some(snapshot)) => Doc::from_snapshot(&snapshot).map(Some),
            WatchEvent::Document(None) => Ok(None),
            WatchEvent::Error(error) => Err(error),
            WatchEvent::Query(_) => Err(unexpected_event("query", "document")),
        })
    }

    /// Shuts down the store and releases backend resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown operation fails.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await?;

        Ok(())
    }
}

/// Builder for [`DocumentStore`].
#[derive(Debug)]
pub struct DocumentStoreBuilder<B: StoreBackend> {
    backend: B,
    config: StoreConfig,
}

impl<B: StoreBackend> DocumentStoreBuilder<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, config: StoreConfig::default() }
    }

    /// When `true`, records that fail to decode are skipped and logged; otherwise the
    /// whole read fails. Defaults to `false`.
    pub fn skip_malformed_records(mut self, skip: bool) -> Self {
        self.config.skip_malformed_records = skip;
        self
    }

    pub fn build(self) -> DocumentStore<B> {
        DocumentStore { backend: self.backend, config: self.config }
    }
}

fn unexpected_event(got: &str, expected: &str) -> DocumentStoreError {
    DocumentStoreError::Backend(format!("received a {got} event on a {expected} watch"))
}

/// Makes the order of a paged query total.
///
/// A query without orderings is ordered by its inequality field, if it has one. A
/// document id ordering in the direction of the last ordering is then appended unless
/// present, so the resume cursor of a page is unique even among equal field values.
fn with_stable_ordering(query: Query) -> Query {
    let mut inequality = None;
    let mut last_direction = None;
    let mut has_document_id = false;

    for fragment in query.fragments() {
        match fragment {
            QueryFragment::Where(clause) if clause.op.is_inequality() && inequality.is_none() => {
                inequality = Some(clause.field.clone());
            }
            QueryFragment::Order(clause) => {
                last_direction = Some(clause.direction);
                has_document_id |= clause.field.is_document_id();
            }
            _ => {}
        }
    }

    let query = match (last_direction, inequality) {
        (None, Some(field)) if !field.is_document_id() => query.and(order_by(field)),
        _ => query,
    };

    if has_document_id {
        return query;
    }

    query.and(order(
        FieldPath::document_id(),
        last_direction.unwrap_or_default(),
        [],
    ))
}

pub(crate) fn decode_snapshots<M: Model>(
    snapshots: &[NativeSnapshot],
    config: StoreConfig,
) -> DocumentStoreResult<Vec<Doc<M>>> {
    let mut docs = Vec::with_capacity(snapshots.len());

    for snapshot in snapshots {
        match Doc::from_snapshot(snapshot) {
            Ok(doc) => docs.push(doc),
            Err(error) if config.skip_malformed_records => {
                warn!("skipping malformed record {}: {error}", snapshot.handle.path());
            }
            Err(error) => return Err(error),
        }
    }

    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{DocumentHandle, NativeMap};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Contact {
        name: String,
        year: i64,
    }

    fn snapshot(path: &str, data: NativeMap) -> NativeSnapshot {
        NativeSnapshot::new(DocumentHandle::for_path(path), data)
    }

    fn records() -> Vec<NativeSnapshot> {
        vec![
            snapshot(
                "contacts/sasha",
                NativeMap::from_iter([
                    ("name".to_string(), NativeValue::String("Sasha".into())),
                    ("year".to_string(), NativeValue::Integer(1987)),
                ]),
            ),
            snapshot(
                "contacts/broken",
                NativeMap::from_iter([("name".to_string(), NativeValue::Integer(1))]),
            ),
        ]
    }

    #[test]
    fn malformed_records_fail_by_default() {
        let result = decode_snapshots::<Contact>(&records(), StoreConfig::default());

        assert!(result.is_err());
    }

    #[test]
    fn malformed_records_can_be_skipped() {
        let config = StoreConfig { skip_malformed_records: true };
        let docs = decode_snapshots::<Contact>(&records(), config).unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id(), "sasha");
        assert_eq!(docs[0].data, Contact { name: "Sasha".into(), year: 1987 });
    }

    #[test]
    fn paged_queries_end_with_document_id() {
        let orderings = |query: Query| -> Vec<String> {
            with_stable_ordering(query)
                .fragments()
                .iter()
                .filter_map(|fragment| match fragment {
                    QueryFragment::Order(clause) => Some(clause.field.to_string()),
                    _ => None,
                })
                .collect()
        };
        let id = FieldPath::document_id().to_string();

        assert_eq!(
            orderings(Query::from(crate::query::Filter::gt("year", 1980))),
            vec!["year".to_string(), id.clone()]
        );
        assert_eq!(orderings(Query::new()), vec![id.clone()]);
        assert_eq!(orderings(Query::from(order_by("name"))), vec!["name".to_string(), id.clone()]);
        assert_eq!(orderings(Query::from(order_by(FieldPath::document_id()))), vec![id]);
    }

    #[test]
    fn field_updates() {
        let update = field(["address", "city"], Value::clear());

        assert_eq!(update.field.to_string(), "address.city");
        assert!(update.value.is_sentinel());
    }
}
