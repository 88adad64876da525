//! Cursor-based pagination.
//!
//! The store has no notion of offsets: a page is a limited query, and the following page
//! is the same query resumed right after the last document of the current one. See
//! [`DocumentStore::query_page`](crate::store::DocumentStore::query_page).

use crate::query::Query;

/// A single page of query results.
///
/// # Type Parameters
///
/// * `T` - The type of items contained in this page
///
/// # Example
///
/// ```ignore
/// let mut page = store.query_page(&contacts, Query::from(order_by("year")), 2).await?;
///
/// loop {
///     for contact in &page.items {
///         println!("{}", contact.data.name);
///     }
///     match page.next_query() {
///         Some(next) => page = store.query_page(&contacts, next.clone(), 2).await?,
///         None => break,
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    next: Option<Query>,
}

impl<T> Page<T> {
    /// Creates a new builder for constructing a page.
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }

    /// The query fetching the following page, or `None` if this is the last one.
    pub fn next_query(&self) -> Option<&Query> {
        self.next.as_ref()
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self { items: Vec::new(), next: None }
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Builder for constructing [`Page`] instances with fluent API.
pub struct PageBuilder<T> {
    items: Vec<T>,
    next: Option<Query>,
}

impl<T> PageBuilder<T> {
    /// Creates a new builder with the given items.
    pub fn new(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    /// Sets the query of the following page (or `None` if this is the last page).
    pub fn with_next_query(mut self, next: Option<Query>) -> Self {
        self.next = next;
        self
    }

    /// Builds and returns the final [`Page`] instance.
    pub fn build(self) -> Page<T> {
        Page { items: self.items, next: self.next }
    }
}
