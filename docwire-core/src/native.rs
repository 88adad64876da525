//! Wire-level types exchanged with the store driver.
//!
//! Everything in this module belongs to the driver's side of the
//! [`StoreBackend`](crate::backend::StoreBackend) boundary: native values, document
//! handles, snapshots, the serialized query, and the watch plumbing. Application code
//! normally never touches these directly; the transcoder and the query builder
//! produce and consume them.

use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::{
    error::DocumentStoreError,
    field_path::FieldPath,
    query::{Direction, WhereOp},
    value::Number,
};

/// Separator between path segments of a native document handle.
pub const PATH_SEPARATOR: char = '/';

/// Native field map. Iteration follows insertion order.
pub type NativeMap = IndexMap<String, NativeValue>;

/// The store's own handle to a document, addressed by its slash-separated path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentHandle {
    path: String,
}

impl DocumentHandle {
    /// Builds a handle for the given full document path (`handleFor`).
    pub fn for_path(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// The full document path (`pathOf`).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The last path segment.
    pub fn id(&self) -> &str {
        self.path
            .rsplit(PATH_SEPARATOR)
            .next()
            .unwrap_or_default()
    }

    /// Everything before the last segment.
    pub fn collection_path(&self) -> &str {
        self.path
            .rsplit_once(PATH_SEPARATOR)
            .map(|(collection, _)| collection)
            .unwrap_or_default()
    }

    /// The id of the collection directly containing the document.
    pub fn collection_id(&self) -> &str {
        let collection = self.collection_path();
        collection
            .rsplit(PATH_SEPARATOR)
            .next()
            .unwrap_or_default()
    }
}

/// A value in the store's native representation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NativeValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    String(String),
    Array(Vec<NativeValue>),
    Map(NativeMap),
    Reference(DocumentHandle),
    /// Field deletion marker (`deleteFieldMarker()`).
    DeleteField,
    /// Atomic increment instruction (`incrementMarker(delta)`).
    Increment(Number),
}

impl NativeValue {
    pub fn as_map(&self) -> Option<&NativeMap> {
        match self {
            NativeValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns `true` for write-only instructions.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, NativeValue::DeleteField | NativeValue::Increment(_))
    }
}

/// A point-in-time read of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeSnapshot {
    pub handle: DocumentHandle,
    pub data: NativeMap,
}

impl NativeSnapshot {
    pub fn new(handle: DocumentHandle, data: NativeMap) -> Self {
        Self { handle, data }
    }
}

/// Where a native query looks for documents.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryTarget {
    /// Direct children of the collection at this path.
    Collection(String),
    /// Every collection with this id, under any parent.
    Group(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeFilter {
    pub field: FieldPath,
    pub op: WhereOp,
    pub value: NativeValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeOrder {
    pub field: FieldPath,
    pub direction: Direction,
}

/// A positional cursor bound. `values[i]` applies to `orderings[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeBound {
    pub values: Vec<NativeValue>,
    /// `true` for `startAt`/`endAt`, `false` for `startAfter`/`endBefore`.
    pub inclusive: bool,
}

/// A serialized query (`buildQuery(collectionPath, filters, orderings, cursors, limit)`).
///
/// Filters and orderings are kept in the order the caller supplied them.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeQuery {
    pub target: QueryTarget,
    pub filters: Vec<NativeFilter>,
    pub orderings: Vec<NativeOrder>,
    pub start: Option<NativeBound>,
    pub end: Option<NativeBound>,
    pub limit: Option<usize>,
}

impl NativeQuery {
    /// A query returning every document of the target.
    pub fn new(target: QueryTarget) -> Self {
        Self {
            target,
            filters: Vec::new(),
            orderings: Vec::new(),
            start: None,
            end: None,
            limit: None,
        }
    }
}

/// What a standing watch observes.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchTarget {
    Query(NativeQuery),
    Document(DocumentHandle),
}

/// Event pushed by the driver to a watch listener.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// Full current result set of a query watch.
    Query(Vec<NativeSnapshot>),
    /// Current state of a document watch; `None` while the document does not exist.
    Document(Option<NativeSnapshot>),
    /// The watch failed and will deliver nothing further.
    Error(DocumentStoreError),
}

/// Callback the driver invokes for each watch event.
pub type WatchListener = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// Driver-side registration of a watch; [`unregister`](Self::unregister) removes it.
pub struct WatchRegistration {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchRegistration {
    pub fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        Self { unregister: Some(Box::new(unregister)) }
    }

    /// A registration with nothing to remove, e.g. for a watch that failed up front.
    pub fn noop() -> Self {
        Self { unregister: None }
    }

    pub fn unregister(mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl Debug for WatchRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistration")
            .field("active", &self.unregister.is_some())
            .finish()
    }
}
