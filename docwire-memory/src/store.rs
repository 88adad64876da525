//! In-memory storage implementation of the store driver.
//!
//! Documents live in a single ordered map keyed by their full path, so collection
//! queries and collection group queries are plain scans. Standing watches are
//! re-evaluated after every committed write and notified only when their result
//! changes.

use std::{
    collections::BTreeMap,
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use async_trait::async_trait;
use log::debug;
use mea::{mutex::Mutex as AsyncMutex, rwlock::RwLock};

use docwire_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    field_path::FieldPath,
    native::{
        DocumentHandle, NativeMap, NativeQuery, NativeSnapshot, NativeValue, WatchEvent,
        WatchListener, WatchRegistration, WatchTarget,
    },
    reference::from_native_handle,
    value::Number,
};

use crate::evaluator::{self, Documents};

struct Watcher {
    target: WatchTarget,
    listener: WatchListener,
    last: WatchEvent,
}

#[derive(Default)]
struct Watchers {
    next_id: u64,
    entries: BTreeMap<u64, Watcher>,
}

struct Inner {
    documents: RwLock<Documents>,
    watchers: Mutex<Watchers>,
    /// Serializes commits and watch registration so listeners see events in commit order.
    dispatch: AsyncMutex<()>,
    enforce_query_constraints: bool,
}

/// Thread-safe in-memory document store driver.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data and watches.
///
/// Listeners run after the document and watcher locks are released, so a listener may
/// read from the store or cancel its own watch. They do run under the dispatch lock that
/// orders commits and watch registration, so writing to the store or opening a new
/// watch from inside a listener deadlocks.
///
/// # Example
///
/// ```ignore
/// use docwire_memory::InMemoryStore;
/// use docwire::store::DocumentStore;
///
/// let store = DocumentStore::new(InMemoryStore::new());
/// let contacts = collection::<Contact>("contacts");
/// store.set((&contacts, "sasha"), &sasha).await?;
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    /// Creates a new empty store that enforces the store's query constraints.
    pub fn new() -> Self {
        Self::with_constraints(true)
    }

    /// Creates a builder for constructing an `InMemoryStore` with custom options.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docwire_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder()
    ///     .enforce_query_constraints(false)
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    fn with_constraints(enforce_query_constraints: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                documents: RwLock::new(Documents::new()),
                watchers: Mutex::new(Watchers::default()),
                dispatch: AsyncMutex::new(()),
                enforce_query_constraints,
            }),
        }
    }

    /// Number of documents currently stored, across all collections.
    pub async fn len(&self) -> usize {
        self.inner.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_query(&self, query: &NativeQuery) -> DocumentStoreResult<()> {
        if self.inner.enforce_query_constraints {
            evaluator::validate(query)?;
        }
        Ok(())
    }

    fn watchers(&self) -> MutexGuard<'_, Watchers> {
        lock_watchers(&self.inner.watchers)
    }

    /// Applies `mutate` atomically, then notifies every watch whose result changed.
    ///
    /// Nothing is committed and nobody is notified when `mutate` fails.
    async fn commit<F>(&self, mutate: F) -> DocumentStoreResult<()>
    where
        F: FnOnce(&mut Documents) -> DocumentStoreResult<()> + Send,
    {
        let _dispatch = self.inner.dispatch.lock().await;

        let pending = {
            let mut documents = self.inner.documents.write().await;
            mutate(&mut documents)?;
            self.changed_watches(&documents)
        };

        for (listener, event) in pending {
            listener(event);
        }

        Ok(())
    }

    fn changed_watches(&self, documents: &Documents) -> Vec<(WatchListener, WatchEvent)> {
        let mut watchers = self.watchers();

        watchers
            .entries
            .values_mut()
            .filter_map(|watcher| {
                let event = evaluate(&watcher.target, documents);
                if event == watcher.last {
                    return None;
                }
                watcher.last = event.clone();
                Some((watcher.listener.clone(), event))
            })
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("enforce_query_constraints", &self.inner.enforce_query_constraints)
            .field("watches", &self.watchers().entries.len())
            .finish()
    }
}

fn lock_watchers(watchers: &Mutex<Watchers>) -> MutexGuard<'_, Watchers> {
    // Listeners never run under this lock.
    watchers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn evaluate(target: &WatchTarget, documents: &Documents) -> WatchEvent {
    match target {
        WatchTarget::Query(query) => WatchEvent::Query(evaluator::execute(query, documents)),
        WatchTarget::Document(handle) => WatchEvent::Document(
            documents
                .get(handle.path())
                .map(|data| NativeSnapshot::new(handle.clone(), data.clone())),
        ),
    }
}

fn number_value(number: Number) -> NativeValue {
    match number {
        Number::Integer(value) => NativeValue::Integer(value),
        Number::Double(value) => NativeValue::Double(value),
    }
}

fn contains_sentinel(value: &NativeValue) -> bool {
    match value {
        NativeValue::DeleteField | NativeValue::Increment(_) => true,
        NativeValue::Array(items) => items.iter().any(contains_sentinel),
        NativeValue::Map(map) => map.values().any(contains_sentinel),
        _ => false,
    }
}

/// Resolves write instructions inside a value being stored. `None` means "omit the field".
fn resolve_value(value: NativeValue) -> DocumentStoreResult<Option<NativeValue>> {
    match value {
        NativeValue::DeleteField => Ok(None),
        NativeValue::Increment(delta) => Ok(Some(number_value(delta))),
        NativeValue::Map(map) => Ok(Some(NativeValue::Map(resolve_map(map)?))),
        NativeValue::Array(items) if items.iter().any(contains_sentinel) => {
            Err(DocumentStoreError::InvalidDocument(
                "field operations cannot be used inside arrays".to_string(),
            ))
        }
        other => Ok(Some(other)),
    }
}

fn resolve_map(map: NativeMap) -> DocumentStoreResult<NativeMap> {
    let mut resolved = NativeMap::with_capacity(map.len());
    for (key, value) in map {
        if let Some(value) = resolve_value(value)? {
            resolved.insert(key, value);
        }
    }
    Ok(resolved)
}

fn increment(current: Option<&NativeValue>, delta: Number) -> NativeValue {
    match (current, delta) {
        (Some(NativeValue::Integer(value)), Number::Integer(delta)) => {
            NativeValue::Integer(value.saturating_add(delta))
        }
        (Some(NativeValue::Integer(value)), Number::Double(delta)) => {
            NativeValue::Double(*value as f64 + delta)
        }
        (Some(NativeValue::Double(value)), delta) => NativeValue::Double(value + delta.as_f64()),
        // Non-numeric or missing fields are replaced by the delta.
        (_, delta) => number_value(delta),
    }
}

/// Writes one field of a partial update, creating intermediate maps as needed.
fn apply_update(
    document: &mut NativeMap,
    field: &FieldPath,
    value: NativeValue,
) -> DocumentStoreResult<()> {
    let Some((last, parents)) = field.segments().split_last() else {
        return Err(DocumentStoreError::InvalidDocument("empty field path".to_string()));
    };
    let deleting = matches!(value, NativeValue::DeleteField);

    let mut current = document;
    for segment in parents {
        if deleting && current.get(segment).and_then(NativeValue::as_map).is_none() {
            return Ok(());
        }
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| NativeValue::Map(NativeMap::new()));
        if entry.as_map().is_none() {
            *entry = NativeValue::Map(NativeMap::new());
        }
        let NativeValue::Map(map) = entry else {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "cannot descend into field {field}"
            )));
        };
        current = map;
    }

    match value {
        NativeValue::DeleteField => {
            current.shift_remove(last);
        }
        NativeValue::Increment(delta) => {
            let next = increment(current.get(last), delta);
            current.insert(last.clone(), next);
        }
        other => {
            if let Some(resolved) = resolve_value(other)? {
                current.insert(last.clone(), resolved);
            }
        }
    }

    Ok(())
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn get_document(
        &self,
        handle: &DocumentHandle,
    ) -> DocumentStoreResult<Option<NativeSnapshot>> {
        let documents = self.inner.documents.read().await;

        Ok(documents
            .get(handle.path())
            .map(|data| NativeSnapshot::new(handle.clone(), data.clone())))
    }

    async fn execute_query(&self, query: NativeQuery) -> DocumentStoreResult<Vec<NativeSnapshot>> {
        self.check_query(&query)?;

        let documents = self.inner.documents.read().await;
        Ok(evaluator::execute(&query, &documents))
    }

    async fn watch(
        &self,
        target: WatchTarget,
        listener: WatchListener,
    ) -> DocumentStoreResult<WatchRegistration> {
        let _dispatch = self.inner.dispatch.lock().await;

        if let WatchTarget::Query(query) = &target {
            self.check_query(query)?;
        }

        let initial = {
            let documents = self.inner.documents.read().await;
            evaluate(&target, &documents)
        };

        let id = {
            let mut watchers = self.watchers();
            let id = watchers.next_id;
            watchers.next_id += 1;
            watchers.entries.insert(
                id,
                Watcher { target, listener: listener.clone(), last: initial.clone() },
            );
            id
        };
        debug!("Registered watch {id}");

        listener(initial);

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        Ok(WatchRegistration::new(move || {
            if let Some(inner) = inner.upgrade() {
                if lock_watchers(&inner.watchers).entries.remove(&id).is_some() {
                    debug!("Removed watch {id}");
                }
            }
        }))
    }

    async fn set_document(
        &self,
        handle: &DocumentHandle,
        data: NativeMap,
    ) -> DocumentStoreResult<()> {
        from_native_handle(handle)?;
        let data = resolve_map(data)?;
        let path = handle.path().to_string();

        self.commit(move |documents| {
            documents.insert(path, data);
            Ok(())
        })
        .await
    }

    async fn update_document(
        &self,
        handle: &DocumentHandle,
        fields: Vec<(FieldPath, NativeValue)>,
    ) -> DocumentStoreResult<()> {
        let path = handle.path().to_string();

        self.commit(move |documents| {
            let document = documents
                .get_mut(&path)
                .ok_or_else(|| DocumentStoreError::DocumentNotFound(path.clone()))?;

            let mut updated = document.clone();
            for (field, value) in fields {
                apply_update(&mut updated, &field, value)?;
            }
            *document = updated;

            Ok(())
        })
        .await
    }

    async fn delete_document(&self, handle: &DocumentHandle) -> DocumentStoreResult<()> {
        let path = handle.path().to_string();

        self.commit(move |documents| {
            documents.remove(&path);
            Ok(())
        })
        .await
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docwire_memory::InMemoryStore;
/// use docwire::backend::StoreBackendBuilder;
///
/// let permissive = InMemoryStore::builder()
///     .enforce_query_constraints(false)
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryStoreBuilder {
    enforce_query_constraints: bool,
}

impl InMemoryStoreBuilder {
    /// Whether queries the hosted store would reject (inequalities on several fields,
    /// oversized `in` operands, ...) fail with
    /// [`QueryExecution`](DocumentStoreError::QueryExecution). Enabled by default.
    pub fn enforce_query_constraints(mut self, enforce: bool) -> Self {
        self.enforce_query_constraints = enforce;
        self
    }
}

impl Default for InMemoryStoreBuilder {
    fn default() -> Self {
        Self { enforce_query_constraints: true }
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new, empty [`InMemoryStore`]. This always succeeds.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::with_constraints(self.enforce_query_constraints))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docwire_core::{
        native::{NativeFilter, NativeOrder, QueryTarget},
        query::{Direction, WhereOp},
    };

    fn handle(path: &str) -> DocumentHandle {
        DocumentHandle::for_path(path)
    }

    fn contact(name: &str, year: i64) -> NativeMap {
        NativeMap::from_iter([
            ("name".to_string(), NativeValue::String(name.to_string())),
            ("year".to_string(), NativeValue::Integer(year)),
        ])
    }

    fn recorder() -> (WatchListener, Arc<Mutex<Vec<WatchEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let listener: WatchListener =
            Arc::new(move |event: WatchEvent| sink.lock().unwrap().push(event));
        (listener, events)
    }

    fn by_year() -> NativeQuery {
        NativeQuery {
            orderings: vec![NativeOrder { field: "year".into(), direction: Direction::Asc }],
            ..NativeQuery::new(QueryTarget::Collection("contacts".to_string()))
        }
    }

    fn two_inequalities() -> NativeQuery {
        NativeQuery {
            filters: vec![
                NativeFilter {
                    field: "year".into(),
                    op: WhereOp::Gt,
                    value: NativeValue::Integer(1980),
                },
                NativeFilter {
                    field: "name".into(),
                    op: WhereOp::Lt,
                    value: NativeValue::String("T".to_string()),
                },
            ],
            ..NativeQuery::new(QueryTarget::Collection("contacts".to_string()))
        }
    }

    #[tokio::test]
    async fn set_get_delete() {
        let store = InMemoryStore::new();
        let sasha = handle("contacts/sasha");

        assert!(store.get_document(&sasha).await.unwrap().is_none());

        store.set_document(&sasha, contact("Sasha", 1987)).await.unwrap();
        let snapshot = store.get_document(&sasha).await.unwrap().unwrap();
        assert_eq!(snapshot.data, contact("Sasha", 1987));
        assert_eq!(store.len().await, 1);

        store.delete_document(&sasha).await.unwrap();
        store.delete_document(&sasha).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn set_rejects_malformed_paths() {
        let store = InMemoryStore::new();

        let result = store.set_document(&handle("contacts"), contact("Sasha", 1987)).await;

        assert!(matches!(result, Err(DocumentStoreError::MalformedPath(_))));
    }

    #[tokio::test]
    async fn set_resolves_field_operations() {
        let store = InMemoryStore::new();
        let mut data = contact("Sasha", 1987);
        data.insert("nickname".to_string(), NativeValue::DeleteField);
        data.insert("visits".to_string(), NativeValue::Increment(Number::Integer(3)));

        store.set_document(&handle("contacts/sasha"), data).await.unwrap();

        let stored = store.get_document(&handle("contacts/sasha")).await.unwrap().unwrap().data;
        assert!(!stored.contains_key("nickname"));
        assert_eq!(stored.get("visits"), Some(&NativeValue::Integer(3)));
    }

    #[tokio::test]
    async fn set_rejects_field_operations_in_arrays() {
        let store = InMemoryStore::new();
        let mut data = contact("Sasha", 1987);
        data.insert("tags".to_string(), NativeValue::Array(vec![NativeValue::DeleteField]));

        let result = store.set_document(&handle("contacts/sasha"), data).await;

        assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn update_merges_nested_fields() {
        let store = InMemoryStore::new();
        let sasha = handle("contacts/sasha");
        let mut data = contact("Sasha", 1987);
        data.insert(
            "address".to_string(),
            NativeValue::Map(NativeMap::from_iter([
                ("city".to_string(), NativeValue::String("Moscow".to_string())),
                ("zip".to_string(), NativeValue::String("101000".to_string())),
            ])),
        );
        store.set_document(&sasha, data).await.unwrap();

        store
            .update_document(
                &sasha,
                vec![
                    (
                        FieldPath::from(["address", "city"]),
                        NativeValue::String("Paris".to_string()),
                    ),
                    (FieldPath::from("year"), NativeValue::Increment(Number::Integer(1))),
                    (FieldPath::from("name"), NativeValue::DeleteField),
                    (
                        FieldPath::from(["stats", "score"]),
                        NativeValue::Increment(Number::Double(0.5)),
                    ),
                ],
            )
            .await
            .unwrap();

        let stored = store.get_document(&sasha).await.unwrap().unwrap().data;
        let address = stored.get("address").and_then(NativeValue::as_map).unwrap();
        assert_eq!(address.get("city"), Some(&NativeValue::String("Paris".to_string())));
        assert_eq!(address.get("zip"), Some(&NativeValue::String("101000".to_string())));
        assert_eq!(stored.get("year"), Some(&NativeValue::Integer(1988)));
        assert!(!stored.contains_key("name"));
        let stats = stored.get("stats").and_then(NativeValue::as_map).unwrap();
        assert_eq!(stats.get("score"), Some(&NativeValue::Double(0.5)));
    }

    #[tokio::test]
    async fn increment_widens_to_double() {
        let store = InMemoryStore::new();
        let sasha = handle("contacts/sasha");
        store.set_document(&sasha, contact("Sasha", 1987)).await.unwrap();

        store
            .update_document(
                &sasha,
                vec![("year".into(), NativeValue::Increment(Number::Double(0.5)))],
            )
            .await
            .unwrap();

        let stored = store.get_document(&sasha).await.unwrap().unwrap().data;
        assert_eq!(stored.get("year"), Some(&NativeValue::Double(1987.5)));
    }

    #[tokio::test]
    async fn update_requires_existing_document() {
        let store = InMemoryStore::new();

        let result = store
            .update_document(&handle("contacts/nobody"), vec![("name".into(), NativeValue::Null)])
            .await;

        assert_eq!(
            result,
            Err(DocumentStoreError::DocumentNotFound("contacts/nobody".to_string()))
        );
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn failed_update_leaves_document_untouched() {
        let store = InMemoryStore::new();
        let sasha = handle("contacts/sasha");
        store.set_document(&sasha, contact("Sasha", 1987)).await.unwrap();

        let result = store
            .update_document(
                &sasha,
                vec![
                    ("name".into(), NativeValue::String("Alex".to_string())),
                    (
                        "tags".into(),
                        NativeValue::Array(vec![NativeValue::Increment(Number::Integer(1))]),
                    ),
                ],
            )
            .await;

        assert!(result.is_err());
        let stored = store.get_document(&sasha).await.unwrap().unwrap().data;
        assert_eq!(stored, contact("Sasha", 1987));
    }

    #[tokio::test]
    async fn query_watch_sees_changes_in_order() {
        let store = InMemoryStore::new();
        store.set_document(&handle("contacts/sasha"), contact("Sasha", 1987)).await.unwrap();
        let (listener, events) = recorder();

        let registration = store.watch(WatchTarget::Query(by_year()), listener).await.unwrap();
        store.set_document(&handle("contacts/lesha"), contact("Lesha", 1995)).await.unwrap();
        // Unrelated documents do not produce an event.
        store.set_document(&handle("cities/moscow"), NativeMap::new()).await.unwrap();
        store.delete_document(&handle("contacts/sasha")).await.unwrap();
        registration.unregister();
        store.delete_document(&handle("contacts/lesha")).await.unwrap();

        let ids: Vec<Vec<String>> = events
            .lock()
            .unwrap()
            .iter()
            .map(|event| match event {
                WatchEvent::Query(snapshots) => {
                    snapshots.iter().map(|snapshot| snapshot.handle.id().to_string()).collect()
                }
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![vec!["sasha"], vec!["sasha", "lesha"], vec!["lesha"]]);
    }

    #[tokio::test]
    async fn document_watch_reports_absence() {
        let store = InMemoryStore::new();
        let sasha = handle("contacts/sasha");
        let (listener, events) = recorder();

        let _registration =
            store.watch(WatchTarget::Document(sasha.clone()), listener).await.unwrap();
        store.set_document(&sasha, contact("Sasha", 1987)).await.unwrap();
        store.delete_document(&sasha).await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], WatchEvent::Document(None));
        assert_eq!(
            events[1],
            WatchEvent::Document(Some(NativeSnapshot::new(sasha.clone(), contact("Sasha", 1987))))
        );
        assert_eq!(events[2], WatchEvent::Document(None));
    }

    #[tokio::test]
    async fn rejects_unsupported_queries() {
        let store = InMemoryStore::new();
        let (listener, events) = recorder();

        let executed = store.execute_query(two_inequalities()).await;
        let watched = store.watch(WatchTarget::Query(two_inequalities()), listener).await;

        assert!(matches!(executed, Err(DocumentStoreError::QueryExecution(_))));
        assert!(matches!(watched, Err(DocumentStoreError::QueryExecution(_))));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn permissive_store_runs_unsupported_queries() {
        let store = InMemoryStore::builder()
            .enforce_query_constraints(false)
            .build()
            .await
            .unwrap();
        store.set_document(&handle("contacts/sasha"), contact("Sasha", 1987)).await.unwrap();
        store.set_document(&handle("contacts/tati"), contact("Tati", 1989)).await.unwrap();

        let snapshots = store.execute_query(two_inequalities()).await.unwrap();

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].handle.id(), "sasha");
    }

    #[tokio::test]
    async fn registration_outliving_store_is_harmless() {
        let store = InMemoryStore::new();
        let (listener, _events) = recorder();
        let registration = store.watch(WatchTarget::Query(by_year()), listener).await.unwrap();

        drop(store);
        registration.unregister();
    }
}
