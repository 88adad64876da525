//! Collection handles.
//!
//! Handles are plain values naming where documents live; they hold no connection and
//! carry the model type through [`PhantomData`]. Every store operation takes one of them
//! (or a [`Ref`](crate::reference::Ref) built from one).
//!
//! # Collection Types
//!
//! - [`Collection`] - a top-level collection or a concrete subcollection path
//! - [`Subcollection`] - a subcollection template resolved against a parent reference
//! - [`Group`] - every collection sharing an id, under any parent
//!
//! # Example
//!
//! ```ignore
//! use docwire::prelude::*;
//!
//! let contacts = collection::<Contact>("contacts");
//! let messages = subcollection::<Message, Contact>("messages", &contacts);
//!
//! let sasha = contacts.reference("sasha")?;
//! let sasha_messages = messages.of(&sasha);
//! assert_eq!(sasha_messages.path(), "contacts/sasha/messages");
//!
//! let all_messages = group::<Message>("messages");
//! ```

use std::{
    fmt::{Debug, Formatter},
    marker::PhantomData,
};

use crate::{
    document::Model,
    error::DocumentStoreResult,
    native::{PATH_SEPARATOR, QueryTarget},
    reference::{RawRef, Ref},
};

/// Something a query can run against.
pub trait QuerySource<M: Model>: Send + Sync {
    /// The native target the query is addressed to.
    fn query_target(&self) -> QueryTarget;
}

/// A collection of `M` documents, addressed by its full path.
pub struct Collection<M> {
    segments: Vec<String>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Collection<M> {
    /// Creates a handle from a slash-separated path, e.g. `"contacts"` or
    /// `"contacts/sasha/messages"`.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();

        Self::from_segments(
            path.split(PATH_SEPARATOR)
                .map(str::to_string)
                .collect(),
        )
    }

    pub(crate) fn from_segments(segments: Vec<String>) -> Self {
        Self { segments, _marker: PhantomData }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The collection id (last path segment).
    pub fn id(&self) -> &str {
        self.segments
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Full slash-separated path.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    /// The document owning this collection when it is a subcollection.
    pub fn parent(&self) -> Option<RawRef> {
        let len = self.segments.len();
        if len < 3 {
            return None;
        }

        RawRef::new(self.segments[..len - 2].to_vec(), self.segments[len - 2].clone()).ok()
    }

    /// Builds a reference to the document `id` of this collection.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`](crate::error::DocumentStoreError::InvalidDocument)
    /// if `id` is empty or contains `/`.
    pub fn reference(&self, id: impl Into<String>) -> DocumentStoreResult<Ref<M>> {
        Ref::new(self, id)
    }

    /// Reinterprets the collection as holding another model type.
    pub fn with_type<T: Model>(&self) -> Collection<T> {
        Collection::from_segments(self.segments.clone())
    }
}

impl<M: Model> QuerySource<M> for Collection<M> {
    fn query_target(&self) -> QueryTarget {
        QueryTarget::Collection(self.path())
    }
}

impl<M> Clone for Collection<M> {
    fn clone(&self) -> Self {
        Self { segments: self.segments.clone(), _marker: PhantomData }
    }
}

impl<M> PartialEq for Collection<M> {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl<M> Eq for Collection<M> {}

impl<M> Debug for Collection<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Collection")
            .field(&self.segments.join("/"))
            .finish()
    }
}

/// A subcollection named `name` under every document of a `P` collection.
pub struct Subcollection<M, P> {
    name: String,
    parent: Collection<P>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model, P: Model> Subcollection<M, P> {
    pub fn new(name: impl Into<String>, parent: &Collection<P>) -> Self {
        Self {
            name: name.into(),
            parent: parent.clone(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> &Collection<P> {
        &self.parent
    }

    /// Resolves the subcollection of the given parent document.
    pub fn of(&self, parent: &Ref<P>) -> Collection<M> {
        let mut segments = parent.raw().collection_path().to_vec();
        segments.push(parent.id().to_string());
        segments.push(self.name.clone());

        Collection::from_segments(segments)
    }

    /// Resolves the subcollection of the parent document with id `parent_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent_id` is not a valid document id.
    pub fn of_id(&self, parent_id: impl Into<String>) -> DocumentStoreResult<Collection<M>> {
        Ok(self.of(&self.parent.reference(parent_id)?))
    }

    /// The group of every `name` collection, whatever its parent.
    pub fn group(&self) -> Group<M> {
        Group::new(self.name.clone())
    }
}

impl<M, P> Clone for Subcollection<M, P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            parent: self.parent.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M, P> Debug for Subcollection<M, P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subcollection")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .finish()
    }
}

/// Every collection with the id `id`, at any depth.
pub struct Group<M> {
    id: String,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Group<M> {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), _marker: PhantomData }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl<M: Model> QuerySource<M> for Group<M> {
    fn query_target(&self) -> QueryTarget {
        QueryTarget::Group(self.id.clone())
    }
}

impl<M> Clone for Group<M> {
    fn clone(&self) -> Self {
        Self { id: self.id.clone(), _marker: PhantomData }
    }
}

impl<M> Debug for Group<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Group").field(&self.id).finish()
    }
}

/// Creates a top-level collection handle.
pub fn collection<M: Model>(name: impl Into<String>) -> Collection<M> {
    Collection::new(name)
}

/// Creates a subcollection template under `parent`.
pub fn subcollection<M: Model, P: Model>(
    name: impl Into<String>,
    parent: &Collection<P>,
) -> Subcollection<M, P> {
    Subcollection::new(name, parent)
}

/// Creates a collection group handle.
pub fn group<M: Model>(id: impl Into<String>) -> Group<M> {
    Group::new(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Contact {
        name: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Message {
        text: String,
    }

    #[test]
    fn resolves_subcollections() {
        let contacts = collection::<Contact>("contacts");
        let messages = subcollection::<Message, Contact>("messages", &contacts);

        let sasha = contacts.reference("sasha").unwrap();
        let sasha_messages = messages.of(&sasha);

        assert_eq!(sasha_messages.path(), "contacts/sasha/messages");
        assert_eq!(sasha_messages.id(), "messages");
        assert_eq!(sasha_messages.parent().unwrap().path(), "contacts/sasha");
        assert_eq!(messages.of_id("sasha").unwrap(), sasha_messages);

        let message = sasha_messages.reference("m1").unwrap();
        assert_eq!(message.path(), "contacts/sasha/messages/m1");
    }

    #[test]
    fn query_targets() {
        let contacts = collection::<Contact>("contacts");
        let messages = group::<Message>("messages");

        assert_eq!(contacts.query_target(), QueryTarget::Collection("contacts".to_string()));
        assert_eq!(messages.query_target(), QueryTarget::Group("messages".to_string()));
        assert!(contacts.parent().is_none());
    }
}
