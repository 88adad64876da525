//! Typed access to a Firestore-style document database.
//!
//! This crate is the primary entry point for users of docwire. It re-exports the core
//! types from `docwire-core` and the in-memory driver from `docwire-memory`.
//!
//! # Features
//!
//! - **Typed documents** - Models are plain serde types; references carry their model type
//! - **Collections** - Top-level collections, subcollections and collection groups
//! - **Composable queries** - Filters, orderings with pagination cursors, and limits
//! - **Realtime subscriptions** - Callbacks or streams of live query and document snapshots
//! - **Pluggable drivers** - Everything talks to the store through [`backend::StoreBackend`]
//!
//! # Quick Start
//!
//! ```ignore
//! use docwire::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Contact {
//!     pub name: String,
//!     pub year: i64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), DocumentStoreError> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     let contacts = collection::<Contact>("contacts");
//!
//!     store.set((&contacts, "sasha"), &Contact { name: "Sasha".into(), year: 1987 }).await?;
//!     store.set((&contacts, "tati"), &Contact { name: "Tati".into(), year: 1989 }).await?;
//!
//!     let oldest = store
//!         .query(&contacts, Query::from(vec![order_by("year"), limit(1)]))
//!         .await?;
//!     println!("oldest contact: {}", oldest[0].data.name);
//!
//!     let subscription = store
//!         .subscribe_to_query(&contacts, Query::from(Filter::gte("year", 1988)))
//!         .on_error(|error| eprintln!("subscription failed: {error}"))
//!         .listen(|docs| println!("{} contacts born since 1988", docs.len()))
//!         .await;
//!
//!     store.update((&contacts, "sasha"), vec![field("year", Value::increment(1))]).await?;
//!
//!     subscription.cancel();
//!     store.shutdown().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory driver for development and testing

pub mod prelude;

pub use docwire_core::{
    backend, collection, document, error, field_path, native, page, query, reference, store,
    subscription, timestamp, transcode, value,
};

/// In-memory storage backend implementations.
pub mod memory {
    pub use docwire_memory::{InMemoryStore, InMemoryStoreBuilder};
}
