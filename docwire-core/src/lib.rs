//! A typed access layer over a remote document database.
//!
//! This crate is the core of the docwire project and provides:
//!
//! - **Value model** ([`value`], [`transcode`]) - Domain values, the serde bridge, and the
//!   conversion to and from the store's native values
//! - **References** ([`reference`]) - Typed document references and their native handles
//! - **Collections** ([`collection`]) - Collection, subcollection and collection group handles
//! - **Documents** ([`document`]) - The model trait and decoded documents
//! - **Query construction** ([`query`]) - Composable filters, orderings, cursors and limits
//! - **Store backend abstraction** ([`backend`], [`native`]) - The driver contract
//! - **Document store** ([`store`]) - Reads, queries, writes and pagination ([`page`])
//! - **Realtime subscriptions** ([`subscription`]) - Live query and document snapshots
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docwire::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Contact {
//!     pub name: String,
//!     pub year: i64,
//! }
//!
//! let contacts = collection::<Contact>("contacts");
//! let first_two = store
//!     .query(&contacts, Query::from(vec![order_by("year"), limit(2)]))
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docwire_core;

pub mod backend;
pub mod collection;
pub mod document;
pub mod error;
pub mod field_path;
pub mod native;
pub mod page;
pub mod query;
pub mod reference;
pub mod store;
pub mod subscription;
pub mod timestamp;
pub mod transcode;
pub mod value;
