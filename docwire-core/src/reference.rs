//! Document references.
//!
//! A reference identifies a document by the path of the collection that holds it plus
//! the document id. [`RawRef`] is the untyped form embedded in [`Value`](crate::value::Value);
//! [`Ref<M>`] carries the model type of the referenced document.
//!
//! References travel to the store as native [`DocumentHandle`]s whose path joins every
//! segment with `/`, e.g. `contacts/sasha/messages/m1`.

use std::{
    fmt::{Debug, Display, Formatter},
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{
    collection::Collection,
    document::Model,
    error::{DocumentStoreError, DocumentStoreResult},
    native::{DocumentHandle, PATH_SEPARATOR},
    value::REFERENCE_TOKEN,
};

/// Untyped reference: collection path segments plus document id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawRef {
    collection: Vec<String>,
    id: String,
}

impl RawRef {
    /// Creates a reference after validating every segment.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if the id or a collection segment is
    /// empty or contains `/`, or if the collection path does not name a collection.
    pub fn new(collection: Vec<String>, id: impl Into<String>) -> DocumentStoreResult<Self> {
        let id = id.into();

        validate_segment(&id, "document id")?;
        if collection.len() % 2 == 0 {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "'{}' is not a collection path",
                collection.join("/")
            )));
        }
        for segment in &collection {
            validate_segment(segment, "collection segment")?;
        }

        Ok(Self { collection, id })
    }

    /// Parses a full document path.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::MalformedPath`] unless the path alternates
    /// collection and id segments and ends with an id.
    pub fn parse(path: &str) -> DocumentStoreResult<Self> {
        let mut segments: Vec<String> = path
            .split(PATH_SEPARATOR)
            .map(str::to_string)
            .collect();

        if segments.len() < 2 || segments.iter().any(String::is_empty) {
            return Err(DocumentStoreError::MalformedPath(path.to_string()));
        }
        // The collection part must have an odd number of segments.
        if (segments.len() - 1) % 2 == 0 {
            return Err(DocumentStoreError::MalformedPath(path.to_string()));
        }

        let id = segments.pop().unwrap_or_default();
        Ok(Self { collection: segments, id })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Segments of the containing collection's path.
    pub fn collection_path(&self) -> &[String] {
        &self.collection
    }

    /// Id of the containing collection (its last path segment).
    pub fn collection_id(&self) -> &str {
        self.collection
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// The document owning the containing subcollection, if any.
    pub fn parent(&self) -> Option<RawRef> {
        let len = self.collection.len();
        if len < 3 {
            return None;
        }

        Some(RawRef {
            collection: self.collection[..len - 2].to_vec(),
            id: self.collection[len - 2].clone(),
        })
    }

    /// Full slash-separated document path.
    pub fn path(&self) -> String {
        let mut path = self.collection.join("/");
        path.push(PATH_SEPARATOR);
        path.push_str(&self.id);
        path
    }

    /// Attaches a model type.
    pub fn typed<M: Model>(self) -> Ref<M> {
        Ref::from_raw(self)
    }
}

impl Display for RawRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

fn validate_segment(segment: &str, what: &str) -> DocumentStoreResult<()> {
    if segment.is_empty() {
        return Err(DocumentStoreError::InvalidDocument(format!("{what} must not be empty")));
    }
    if segment.contains(PATH_SEPARATOR) {
        return Err(DocumentStoreError::InvalidDocument(format!(
            "{what} '{segment}' must not contain '{PATH_SEPARATOR}'"
        )));
    }
    Ok(())
}

/// Encodes a reference as the store's native document handle.
pub fn to_native_handle(reference: &RawRef) -> DocumentHandle {
    DocumentHandle::for_path(reference.path())
}

/// Decodes a native document handle, re-deriving the collection chain.
///
/// # Errors
///
/// Returns [`DocumentStoreError::MalformedPath`] if the handle's path is not a
/// well-formed `collection/id(/collection/id)*` chain.
pub fn from_native_handle(handle: &DocumentHandle) -> DocumentStoreResult<RawRef> {
    RawRef::parse(handle.path())
}

/// Typed reference to a document holding an `M`.
///
/// Equality and hashing follow the document path only.
pub struct Ref<M> {
    raw: RawRef,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Ref<M> {
    /// Builds a reference without a round trip to the store.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if `id` is empty or contains `/`.
    pub fn new(collection: &Collection<M>, id: impl Into<String>) -> DocumentStoreResult<Self> {
        RawRef::new(collection.segments().to_vec(), id).map(Self::from_raw)
    }

    pub fn from_raw(raw: RawRef) -> Self {
        Self { raw, _marker: PhantomData }
    }

    pub fn id(&self) -> &str {
        self.raw.id()
    }

    /// The collection holding the referenced document.
    pub fn collection(&self) -> Collection<M> {
        Collection::from_segments(self.raw.collection_path().to_vec())
    }

    pub fn path(&self) -> String {
        self.raw.path()
    }

    pub fn raw(&self) -> &RawRef {
        &self.raw
    }

    pub fn into_raw(self) -> RawRef {
        self.raw
    }

    /// Reinterprets the reference as pointing at another model type.
    pub fn cast<T: Model>(self) -> Ref<T> {
        Ref::from_raw(self.raw)
    }

    pub(crate) fn handle(&self) -> DocumentHandle {
        to_native_handle(&self.raw)
    }
}

impl<M> Clone for Ref<M> {
    fn clone(&self) -> Self {
        Self { raw: self.raw.clone(), _marker: PhantomData }
    }
}

impl<M> PartialEq for Ref<M> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<M> Eq for Ref<M> {}

impl<M> Hash for Ref<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<M> Debug for Ref<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Ref").field(&self.raw.path()).finish()
    }
}

impl<M> Display for Ref<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl<M> Serialize for Ref<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(REFERENCE_TOKEN, &self.raw.path())
    }
}

impl<'de, M> Deserialize<'de> for Ref<M> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = deserializer.deserialize_newtype_struct(REFERENCE_TOKEN, RefVisitor)?;
        Ok(Self { raw, _marker: PhantomData })
    }
}

struct RefVisitor;

impl<'de> de::Visitor<'de> for RefVisitor {
    type Value = RawRef;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a document path")
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> Result<Self::Value, D::Error> {
        let path = String::deserialize(deserializer)?;
        self.visit_str(&path)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        RawRef::parse(value).map_err(E::custom)
    }
}
