//! Store driver abstraction.
//!
//! The typed layer never talks to a database directly. Every read, write and watch goes
//! through the [`StoreBackend`] trait, which speaks the native vocabulary of
//! [`crate::native`]: document handles, native values, serialized queries and watch
//! registrations.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The driver contract
//! - [`StoreBackendBuilder`]: Factory trait for creating driver instances
//!
//! # Examples
//!
//! ```ignore
//! use docwire::backend::StoreBackend;
//! use docwire::native::{DocumentHandle, NativeQuery, QueryTarget};
//!
//! let backend = MyBackendImpl::new();
//!
//! let sasha = backend.get_document(&DocumentHandle::for_path("contacts/sasha")).await?;
//! let everyone = backend
//!     .execute_query(NativeQuery::new(QueryTarget::Collection("contacts".into())))
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

use crate::{
    error::DocumentStoreResult,
    field_path::FieldPath,
    native::{
        DocumentHandle, NativeMap, NativeQuery, NativeSnapshot, NativeValue, WatchListener,
        WatchRegistration, WatchTarget,
    },
};

/// Abstract interface for document store drivers.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks.
///
/// # Error Handling
///
/// Drivers report a query shape the store refuses as
/// [`DocumentStoreError::QueryExecution`](crate::error::DocumentStoreError::QueryExecution)
/// and transport or authorization failures as
/// [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend).
/// A missing document is not an error for reads.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Reads a single document.
    ///
    /// # Arguments
    ///
    /// * `handle` - The document to read
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(snapshot))` with the stored fields, or `Ok(None)` when the
    /// document does not exist.
    async fn get_document(
        &self,
        handle: &DocumentHandle,
    ) -> DocumentStoreResult<Option<NativeSnapshot>>;

    /// Runs a serialized query.
    ///
    /// # Arguments
    ///
    /// * `query` - The query, already validated and serialized by the typed layer
    ///
    /// # Returns
    ///
    /// Returns the matching documents in result order, or
    /// [`DocumentStoreError::QueryExecution`](crate::error::DocumentStoreError::QueryExecution)
    /// if the store refuses the query shape.
    async fn execute_query(&self, query: NativeQuery) -> DocumentStoreResult<Vec<NativeSnapshot>>;

    /// Starts a standing watch.
    ///
    /// The listener receives the current state of the target as its first event and the
    /// full new state after every change. A failing watch delivers a single
    /// [`WatchEvent::Error`](crate::native::WatchEvent::Error) and then nothing else.
    ///
    /// # Arguments
    ///
    /// * `target` - The query or document to watch
    /// * `listener` - Callback receiving every event of the watch
    ///
    /// # Returns
    ///
    /// Returns the registration of the watch. Dropping it does not stop the watch; call
    /// [`WatchRegistration::unregister`].
    async fn watch(
        &self,
        target: WatchTarget,
        listener: WatchListener,
    ) -> DocumentStoreResult<WatchRegistration>;

    /// Creates or overwrites a document.
    ///
    /// Sentinel values in `data` are applied: [`NativeValue::DeleteField`] leaves the
    /// field out and [`NativeValue::Increment`] stores the delta.
    ///
    /// # Arguments
    ///
    /// * `handle` - The document to write
    /// * `data` - The complete new field map
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` on success, or a [`DocumentStoreError`](crate::error::DocumentStoreError)
    /// on failure.
    async fn set_document(
        &self,
        handle: &DocumentHandle,
        data: NativeMap,
    ) -> DocumentStoreResult<()>;

    /// Changes individual fields of an existing document.
    ///
    /// # Arguments
    ///
    /// * `handle` - The document to change
    /// * `fields` - Field paths paired with their new values or sentinel operations
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentNotFound`](crate::error::DocumentStoreError::DocumentNotFound)
    /// if the document does not exist.
    async fn update_document(
        &self,
        handle: &DocumentHandle,
        fields: Vec<(FieldPath, NativeValue)>,
    ) -> DocumentStoreResult<()>;

    /// Deletes a document. Deleting a missing document succeeds.
    ///
    /// # Arguments
    ///
    /// * `handle` - The document to delete
    async fn delete_document(&self, handle: &DocumentHandle) -> DocumentStoreResult<()>;

    /// Cleanly shuts down the driver, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn get_document(
        &self,
        handle: &DocumentHandle,
    ) -> DocumentStoreResult<Option<NativeSnapshot>> {
        (*self).get_document(handle).await
    }

    async fn execute_query(&self, query: NativeQuery) -> DocumentStoreResult<Vec<NativeSnapshot>> {
        (*self).execute_query(query).await
    }

    async fn watch(
        &self,
        target: WatchTarget,
        listener: WatchListener,
    ) -> DocumentStoreResult<WatchRegistration> {
        (*self).watch(target, listener).await
    }

    async fn set_document(
        &self,
        handle: &DocumentHandle,
        data: NativeMap,
    ) -> DocumentStoreResult<()> {
        (*self).set_document(handle, data).await
    }

    async fn update_document(
        &self,
        handle: &DocumentHandle,
        fields: Vec<(FieldPath, NativeValue)>,
    ) -> DocumentStoreResult<()> {
        (*self)
            .update_document(handle, fields)
            .await
    }

    async fn delete_document(&self, handle: &DocumentHandle) -> DocumentStoreResult<()> {
        (*self).delete_document(handle).await
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend,
{
    async fn get_document(
        &self,
        handle: &DocumentHandle,
    ) -> DocumentStoreResult<Option<NativeSnapshot>> {
        (**self).get_document(handle).await
    }

    async fn execute_query(&self, query: NativeQuery) -> DocumentStoreResult<Vec<NativeSnapshot>> {
        (**self).execute_query(query).await
    }

    async fn watch(
        &self,
        target: WatchTarget,
        listener: WatchListener,
    ) -> DocumentStoreResult<WatchRegistration> {
        (**self).watch(target, listener).await
    }

    async fn set_document(
        &self,
        handle: &DocumentHandle,
        data: NativeMap,
    ) -> DocumentStoreResult<()> {
        (**self).set_document(handle, data).await
    }

    async fn update_document(
        &self,
        handle: &DocumentHandle,
        fields: Vec<(FieldPath, NativeValue)>,
    ) -> DocumentStoreResult<()> {
        (**self)
            .update_document(handle, fields)
            .await
    }

    async fn delete_document(&self, handle: &DocumentHandle) -> DocumentStoreResult<()> {
        (**self).delete_document(handle).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
