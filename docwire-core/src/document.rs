//! Core traits and types for typed documents.
//!
//! Any serde model can be stored: [`Model`] is implemented for every type that is
//! `Serialize + DeserializeOwned + Send + Sync + 'static`. A read produces a [`Doc<M>`],
//! the pair of the document's [`Ref<M>`] and its decoded data.
//!
//! # Example
//!
//! ```ignore
//! use docwire::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub name: String,
//! }
//!
//! let users = collection::<User>("users");
//! let user: Option<Doc<User>> = store.get(&users.reference("sasha")?).await?;
//! ```

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    native::{NativeMap, NativeSnapshot},
    reference::{Ref, from_native_handle},
    transcode::{from_native, to_native},
    value::{self, Value},
};

/// Marker trait for types that can be stored as documents.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Model for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Extension trait converting models to and from the store's native representation.
///
/// This trait is automatically implemented for all types that implement [`Model`].
pub trait ModelExt: Model {
    /// Converts this model to a domain value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_value(&self) -> DocumentStoreResult<Value>;

    /// Creates a model from a domain value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not match the model's shape.
    fn from_value(value: Value) -> DocumentStoreResult<Self>;

    /// Converts this model to a native field map ready to be written.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if the model does not serialize
    /// to a map.
    fn to_native_map(&self) -> DocumentStoreResult<NativeMap>;

    /// Decodes a model from a native field map.
    ///
    /// # Errors
    ///
    /// Returns an error if a nested reference is malformed or the shape does not match.
    fn from_native_map(map: &NativeMap) -> DocumentStoreResult<Self>;
}

impl<M: Model> ModelExt for M {
    fn to_value(&self) -> DocumentStoreResult<Value> {
        value::to_value(self)
    }

    fn from_value(value: Value) -> DocumentStoreResult<Self> {
        value::from_value(value)
    }

    fn to_native_map(&self) -> DocumentStoreResult<NativeMap> {
        match self.to_value()? {
            Value::Map(map) => Ok(map
                .iter()
                .map(|(key, value)| (key.clone(), to_native(value)))
                .collect()),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "documents must serialize to a map, found {other:?}"
            ))),
        }
    }

    fn from_native_map(map: &NativeMap) -> DocumentStoreResult<Self> {
        let fields = map
            .iter()
            .map(|(key, value)| Ok((key.clone(), from_native(value)?)))
            .collect::<DocumentStoreResult<value::Map>>()?;

        Self::from_value(Value::Map(fields))
    }
}

/// A document read from the store: its reference and a snapshot of its data.
///
/// Two `Doc`s are the same document when their references are equal; the data is a
/// point-in-time copy and is never updated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Doc<M> {
    pub reference: Ref<M>,
    pub data: M,
}

impl<M: Model> Doc<M> {
    pub fn new(reference: Ref<M>, data: M) -> Self {
        Self { reference, data }
    }

    pub fn id(&self) -> &str {
        self.reference.id()
    }

    /// Decodes a native snapshot, deriving the reference from its handle.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::MalformedPath`] if the handle is malformed, or a
    /// serialization error if the data does not match `M`.
    pub fn from_snapshot(snapshot: &NativeSnapshot) -> DocumentStoreResult<Self> {
        let reference = from_native_handle(&snapshot.handle)?.typed::<M>();
        let data = M::from_native_map(&snapshot.data)?;

        Ok(Self { reference, data })
    }
}
