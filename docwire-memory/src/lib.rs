//! In-memory store driver for docwire.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend`
//! trait. It evaluates queries with the hosted store's semantics (cross-type value
//! ordering, cursor bounds, collection group scans) and pushes realtime snapshots to
//! standing watches, which makes it suitable for development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads through an async-aware RwLock
//! - **Full query support** - Filters, multi-field orderings, cursors and limits
//! - **Query constraints** - Optionally rejects queries the hosted store would reject
//! - **Realtime watches** - Query and document watches notified in commit order
//!
//! # Quick Start
//!
//! ```ignore
//! use docwire::prelude::*;
//! use docwire::memory::InMemoryStore;
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
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docwire_memory;

mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
