//! Convenient re-exports of commonly used types from docwire.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and functions without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docwire::prelude::*;
//! ```

pub use docwire_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    collection::{Collection, Group, QuerySource, Subcollection, collection, group, subcollection},
    document::{Doc, Model, ModelExt},
    error::{DocumentStoreError, DocumentStoreResult},
    field_path::FieldPath,
    page::Page,
    query::{
        Cursor, CursorKind, Direction, Filter, Query, QueryBuilder, QueryFragment, WhereOp,
        end_at, end_before, filter, limit, order, order_by, start_after, start_at,
    },
    reference::{RawRef, Ref},
    store::{DocTarget, DocumentStore, FieldUpdate, field},
    subscription::{Subscription, SubscriptionStream},
    value::{Number, Value},
};
