//! Query construction for document stores.
//!
//! A [`Query`] is an ordered list of immutable [`QueryFragment`]s: filters, orderings
//! (each carrying its own pagination cursors) and limits. Fragments are plain values and
//! can be built once and shared between queries.
//!
//! # Query Building
//!
//! ```ignore
//! use docwire::prelude::*;
//!
//! let query = Query::from(vec![
//!     filter("year", WhereOp::Gte, 1987),
//!     order("year", Direction::Asc, vec![start_after(1989)]),
//!     limit(2),
//! ]);
//!
//! // or, fluently
//! let query = Query::builder()
//!     .filter("year", WhereOp::Gte, 1987)
//!     .order("year", Direction::Asc, vec![start_after(1989)])
//!     .limit(2)
//!     .build();
//! ```
//!
//! # Serialization
//!
//! [`Query::to_native`] turns the fragments into a [`NativeQuery`]. Filters and
//! orderings keep the order they were supplied in. Cursor values are grouped by kind
//! into a start and an end bound whose values line up with the orderings, so the
//! cursor attached to ordering *k* always bounds ordering *k*.

use std::fmt::{Display, Formatter};

use crate::{
    document::{Doc, Model, ModelExt},
    error::{DocumentStoreError, DocumentStoreResult},
    field_path::FieldPath,
    native::{
        DocumentHandle, NativeBound, NativeFilter, NativeOrder, NativeQuery, NativeValue,
        PATH_SEPARATOR, QueryTarget,
    },
    reference::{RawRef, to_native_handle},
    transcode::to_native,
    value::Value,
};

/// Comparison operators for filter clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WhereOp {
    /// `==`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// The array field holds the operand.
    ArrayContains,
    /// The field equals one of the operand's values.
    In,
    /// The array field holds at least one of the operand's values.
    ArrayContainsAny,
}

impl WhereOp {
    /// The operator as the store spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            WhereOp::Eq => "==",
            WhereOp::Lt => "<",
            WhereOp::Lte => "<=",
            WhereOp::Gt => ">",
            WhereOp::Gte => ">=",
            WhereOp::ArrayContains => "array-contains",
            WhereOp::In => "in",
            WhereOp::ArrayContainsAny => "array-contains-any",
        }
    }

    /// Range comparisons, limited by the store to a single field per query.
    pub fn is_inequality(&self) -> bool {
        matches!(self, WhereOp::Lt | WhereOp::Lte | WhereOp::Gt | WhereOp::Gte)
    }
}

impl Display for WhereOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction for an ordering clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Ascending order (earliest or smallest first).
    #[default]
    Asc,
    /// Descending order (latest or largest first).
    Desc,
}

/// Which side of the result a cursor bounds, and whether the bound is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorKind {
    StartAt,
    StartAfter,
    EndAt,
    EndBefore,
}

impl CursorKind {
    pub fn is_start(&self) -> bool {
        matches!(self, CursorKind::StartAt | CursorKind::StartAfter)
    }

    pub fn is_inclusive(&self) -> bool {
        matches!(self, CursorKind::StartAt | CursorKind::EndAt)
    }

    fn name(&self) -> &'static str {
        match self {
            CursorKind::StartAt => "start_at",
            CursorKind::StartAfter => "start_after",
            CursorKind::EndAt => "end_at",
            CursorKind::EndBefore => "end_before",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum CursorValue {
    Value(Value),
    Document { reference: RawRef, data: Value },
    Invalid(DocumentStoreError),
    Unbounded,
}

/// A pagination cursor attached to an ordering clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    kind: CursorKind,
    value: CursorValue,
}

impl Cursor {
    pub fn new(kind: CursorKind, value: impl Into<Value>) -> Self {
        Self { kind, value: CursorValue::Value(value.into()) }
    }

    /// A cursor whose value is absent.
    ///
    /// A query holding one of these applies no cursor bound at all, which lets callers
    /// express "first page" with the same query shape as the following pages.
    pub fn unbounded(kind: CursorKind) -> Self {
        Self { kind, value: CursorValue::Unbounded }
    }

    /// Builds a cursor from `value` when present, or an unbounded one otherwise.
    pub fn optional(kind: CursorKind, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => Self::new(kind, value),
            None => Self::unbounded(kind),
        }
    }

    /// A cursor taking its value from `doc`'s field under the ordering it is attached to.
    pub fn from_doc<M: Model>(kind: CursorKind, doc: &Doc<M>) -> Self {
        Self::from_data(kind, doc.reference.raw().clone(), doc.data.to_value())
    }

    pub(crate) fn from_data(
        kind: CursorKind,
        reference: RawRef,
        data: DocumentStoreResult<Value>,
    ) -> Self {
        let value = match data {
            Ok(data) => CursorValue::Document { reference, data },
            Err(error) => CursorValue::Invalid(error),
        };
        Self { kind, value }
    }

    pub fn start_at_doc<M: Model>(doc: &Doc<M>) -> Self {
        Self::from_doc(CursorKind::StartAt, doc)
    }

    pub fn start_after_doc<M: Model>(doc: &Doc<M>) -> Self {
        Self::from_doc(CursorKind::StartAfter, doc)
    }

    pub fn end_at_doc<M: Model>(doc: &Doc<M>) -> Self {
        Self::from_doc(CursorKind::EndAt, doc)
    }

    pub fn end_before_doc<M: Model>(doc: &Doc<M>) -> Self {
        Self::from_doc(CursorKind::EndBefore, doc)
    }

    pub fn kind(&self) -> CursorKind {
        self.kind
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self.value, CursorValue::Unbounded)
    }

    /// Resolves the native bound value for the ordering on `field`, or `None` when the
    /// cursor is unbounded.
    fn resolve(
        &self,
        field: &FieldPath,
        target: &QueryTarget,
    ) -> DocumentStoreResult<Option<NativeValue>> {
        let value = match &self.value {
            CursorValue::Unbounded => return Ok(None),
            CursorValue::Invalid(error) => return Err(error.clone()),
            CursorValue::Value(value) => to_native(value),
            CursorValue::Document { reference, .. } if field.is_document_id() => {
                NativeValue::Reference(to_native_handle(reference))
            }
            CursorValue::Document { data, .. } => {
                to_native(data.get_path(field.segments()).unwrap_or(&Value::Null))
            }
        };

        reject_field_operations(&value, field)?;

        if field.is_document_id() {
            document_id_operand(value, target).map(Some)
        } else {
            Ok(Some(value))
        }
    }
}

/// Starts the result at documents whose ordering field equals `value`.
pub fn start_at(value: impl Into<Value>) -> Cursor {
    Cursor::new(CursorKind::StartAt, value)
}

/// Starts the result right after documents whose ordering field equals `value`.
pub fn start_after(value: impl Into<Value>) -> Cursor {
    Cursor::new(CursorKind::StartAfter, value)
}

/// Ends the result at documents whose ordering field equals `value`.
pub fn end_at(value: impl Into<Value>) -> Cursor {
    Cursor::new(CursorKind::EndAt, value)
}

/// Ends the result right before documents whose ordering field equals `value`.
pub fn end_before(value: impl Into<Value>) -> Cursor {
    Cursor::new(CursorKind::EndBefore, value)
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub field: FieldPath,
    pub op: WhereOp,
    /// Operand, already transcoded.
    pub value: NativeValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderClause {
    pub field: FieldPath,
    pub direction: Direction,
    pub cursors: Vec<Cursor>,
}

/// A single piece of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFragment {
    Where(WhereClause),
    Order(OrderClause),
    Limit(usize),
}

/// Creates a filter clause. The operand is transcoded immediately.
pub fn filter(field: impl Into<FieldPath>, op: WhereOp, value: impl Into<Value>) -> QueryFragment {
    QueryFragment::Where(WhereClause {
        field: field.into(),
        op,
        value: to_native(&value.into()),
    })
}

/// Creates an ordering clause with its pagination cursors.
pub fn order(
    field: impl Into<FieldPath>,
    direction: Direction,
    cursors: impl IntoIterator<Item = Cursor>,
) -> QueryFragment {
    QueryFragment::Order(OrderClause {
        field: field.into(),
        direction,
        cursors: cursors.into_iter().collect(),
    })
}

/// Creates an ascending ordering clause without cursors.
pub fn order_by(field: impl Into<FieldPath>) -> QueryFragment {
    order(field, Direction::Asc, [])
}

/// Caps the number of returned documents.
pub fn limit(n: usize) -> QueryFragment {
    QueryFragment::Limit(n)
}

/// Shorthands for the filter operators.
///
/// ```ignore
/// let query = Query::from(vec![
///     Filter::gte("year", 1987),
///     Filter::array_contains("tags", "friend"),
/// ]);
/// ```
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<FieldPath>, value: impl Into<Value>) -> QueryFragment {
        filter(field, WhereOp::Eq, value)
    }

    pub fn lt(field: impl Into<FieldPath>, value: impl Into<Value>) -> QueryFragment {
        filter(field, WhereOp::Lt, value)
    }

    pub fn lte(field: impl Into<FieldPath>, value: impl Into<Value>) -> QueryFragment {
        filter(field, WhereOp::Lte, value)
    }

    pub fn gt(field: impl Into<FieldPath>, value: impl Into<Value>) -> QueryFragment {
        filter(field, WhereOp::Gt, value)
    }

    pub fn gte(field: impl Into<FieldPath>, value: impl Into<Value>) -> QueryFragment {
        filter(field, WhereOp::Gte, value)
    }

    pub fn array_contains(field: impl Into<FieldPath>, value: impl Into<Value>) -> QueryFragment {
        filter(field, WhereOp::ArrayContains, value)
    }

    pub fn is_in<V: Into<Value>>(
        field: impl Into<FieldPath>,
        values: impl IntoIterator<Item = V>,
    ) -> QueryFragment {
        filter(field, WhereOp::In, Value::Array(values.into_iter().map(Into::into).collect()))
    }

    pub fn array_contains_any<V: Into<Value>>(
        field: impl Into<FieldPath>,
        values: impl IntoIterator<Item = V>,
    ) -> QueryFragment {
        filter(
            field,
            WhereOp::ArrayContainsAny,
            Value::Array(values.into_iter().map(Into::into).collect()),
        )
    }
}

/// A query: an ordered sequence of fragments.
///
/// An empty query matches every document of its source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    fragments: Vec<QueryFragment>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    pub fn fragments(&self) -> &[QueryFragment] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Appends the fragments of `other` after those of `self`.
    pub fn and(mut self, other: impl Into<Query>) -> Self {
        self.fragments.extend(other.into().fragments);
        self
    }

    /// Replaces every ordering's start cursor with one resuming after the given document.
    ///
    /// Unbounded cursors are dropped as well, since they would disable the new bound.
    pub(crate) fn resume_after(&self, reference: &RawRef, data: &Value) -> Query {
        let fragments = self
            .fragments
            .iter()
            .map(|fragment| match fragment {
                QueryFragment::Order(clause) => {
                    let mut cursors: Vec<Cursor> = clause
                        .cursors
                        .iter()
                        .filter(|cursor| !cursor.kind.is_start() && !cursor.is_unbounded())
                        .cloned()
                        .collect();
                    cursors.push(Cursor::from_data(
                        CursorKind::StartAfter,
                        reference.clone(),
                        Ok(data.clone()),
                    ));

                    QueryFragment::Order(OrderClause { cursors, ..clause.clone() })
                }
                other => other.clone(),
            })
            .collect();

        Query { fragments }
    }

    /// Serializes the query for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidQuery`] when a field path is empty, when
    /// cursors of one kind are not supplied on a contiguous prefix of the orderings,
    /// when `start_at`/`start_after` (or `end_at`/`end_before`) are mixed, or when an
    /// ordering carries two cursors bounding the same side.
    pub fn to_native(&self, target: QueryTarget) -> DocumentStoreResult<NativeQuery> {
        let mut native = NativeQuery::new(target);
        let mut start = BoundBuilder::default();
        let mut end = BoundBuilder::default();
        let mut unbounded = false;

        for fragment in &self.fragments {
            match fragment {
                QueryFragment::Where(clause) => {
                    validate_field(&clause.field)?;
                    reject_field_operations(&clause.value, &clause.field)?;

                    let value = if clause.field.is_document_id() {
                        document_id_operand(clause.value.clone(), &native.target)?
                    } else {
                        clause.value.clone()
                    };

                    native.filters.push(NativeFilter {
                        field: clause.field.clone(),
                        op: clause.op,
                        value,
                    });
                }
                QueryFragment::Order(clause) => {
                    validate_field(&clause.field)?;

                    let position = native.orderings.len();
                    let mut seen_start = false;
                    let mut seen_end = false;

                    for cursor in &clause.cursors {
                        let (seen, bound) = if cursor.kind.is_start() {
                            (&mut seen_start, &mut start)
                        } else {
                            (&mut seen_end, &mut end)
                        };

                        if *seen {
                            return Err(DocumentStoreError::InvalidQuery(format!(
                                "ordering on '{}' has more than one {} cursor",
                                clause.field,
                                if cursor.kind.is_start() { "start" } else { "end" },
                            )));
                        }
                        *seen = true;

                        let value = match cursor.resolve(&clause.field, &native.target)? {
                            Some(value) => value,
                            None => {
                                unbounded = true;
                                NativeValue::Null
                            }
                        };
                        bound.push(cursor.kind, position, &clause.field, value)?;
                    }

                    native.orderings.push(NativeOrder {
                        field: clause.field.clone(),
                        direction: clause.direction,
                    });
                }
                QueryFragment::Limit(n) => native.limit = Some(*n),
            }
        }

        if !unbounded {
            native.start = start.build();
            native.end = end.build();
        }

        Ok(native)
    }
}

impl From<Vec<QueryFragment>> for Query {
    fn from(fragments: Vec<QueryFragment>) -> Self {
        Self { fragments }
    }
}

impl From<QueryFragment> for Query {
    fn from(fragment: QueryFragment) -> Self {
        Self { fragments: vec![fragment] }
    }
}

impl FromIterator<QueryFragment> for Query {
    fn from_iter<I: IntoIterator<Item = QueryFragment>>(iter: I) -> Self {
        Self { fragments: iter.into_iter().collect() }
    }
}

/// Collects the cursor values of one side of the query.
#[derive(Default)]
struct BoundBuilder {
    kind: Option<CursorKind>,
    values: Vec<NativeValue>,
}

impl BoundBuilder {
    fn push(
        &mut self,
        kind: CursorKind,
        position: usize,
        field: &FieldPath,
        value: NativeValue,
    ) -> DocumentStoreResult<()> {
        match self.kind {
            Some(existing) if existing != kind => {
                return Err(DocumentStoreError::InvalidQuery(format!(
                    "cannot mix {} and {} cursors in one query",
                    existing.name(),
                    kind.name()
                )));
            }
            _ => self.kind = Some(kind),
        }

        if self.values.len() != position {
            return Err(DocumentStoreError::InvalidQuery(format!(
                "{} cursor on '{}' requires a {} cursor on every preceding ordering",
                kind.name(),
                field,
                kind.name()
            )));
        }

        self.values.push(value);
        Ok(())
    }

    fn build(self) -> Option<NativeBound> {
        self.kind.map(|kind| NativeBound {
            values: self.values,
            inclusive: kind.is_inclusive(),
        })
    }
}

fn validate_field(field: &FieldPath) -> DocumentStoreResult<()> {
    if field.is_empty() {
        return Err(DocumentStoreError::InvalidQuery(format!(
            "invalid field path '{field}'"
        )));
    }
    Ok(())
}

/// Field operations only make sense inside write payloads.
fn reject_field_operations(value: &NativeValue, field: &FieldPath) -> DocumentStoreResult<()> {
    match value {
        NativeValue::DeleteField | NativeValue::Increment(_) => {
            Err(DocumentStoreError::InvalidQuery(format!(
                "field operations cannot be used as query values on '{field}'"
            )))
        }
        NativeValue::Array(items) => {
            items.iter().try_for_each(|item| reject_field_operations(item, field))
        }
        NativeValue::Map(map) => {
            map.values().try_for_each(|item| reject_field_operations(item, field))
        }
        _ => Ok(()),
    }
}

/// Document id operands are compared as references; plain ids are resolved against
/// the queried collection.
fn document_id_operand(
    value: NativeValue,
    target: &QueryTarget,
) -> DocumentStoreResult<NativeValue> {
    match value {
        NativeValue::Reference(_) => Ok(value),
        NativeValue::Array(items) => Ok(NativeValue::Array(
            items
                .into_iter()
                .map(|item| document_id_operand(item, target))
                .collect::<DocumentStoreResult<_>>()?,
        )),
        NativeValue::String(id) => {
            let path = match target {
                QueryTarget::Collection(collection) if !id.contains(PATH_SEPARATOR) => {
                    format!("{collection}{PATH_SEPARATOR}{id}")
                }
                QueryTarget::Collection(_) => id,
                QueryTarget::Group(_) if id.contains(PATH_SEPARATOR) => id,
                QueryTarget::Group(group) => {
                    return Err(DocumentStoreError::InvalidQuery(format!(
                        "document id '{id}' on collection group '{group}' must be a full \
                         document path"
                    )));
                }
            };

            match RawRef::parse(&path) {
                Ok(_) => Ok(NativeValue::Reference(DocumentHandle::for_path(path))),
                Err(_) => Err(DocumentStoreError::InvalidQuery(format!(
                    "invalid document id '{path}'"
                ))),
            }
        }
        other => Err(DocumentStoreError::InvalidQuery(format!(
            "document id must be compared with a string or reference, found {other:?}"
        ))),
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    fragments: Vec<QueryFragment>,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filter clause.
    pub fn filter(self, field: impl Into<FieldPath>, op: WhereOp, value: impl Into<Value>) -> Self {
        self.fragment(filter(field, op, value))
    }

    /// Appends an ordering clause with its cursors.
    pub fn order(
        self,
        field: impl Into<FieldPath>,
        direction: Direction,
        cursors: impl IntoIterator<Item = Cursor>,
    ) -> Self {
        self.fragment(order(field, direction, cursors))
    }

    /// Appends an ascending ordering clause.
    pub fn order_by(self, field: impl Into<FieldPath>) -> Self {
        self.fragment(order_by(field))
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(self, n: usize) -> Self {
        self.fragment(limit(n))
    }

    pub fn fragment(mut self, fragment: QueryFragment) -> Self {
        self.fragments.push(fragment);
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        Query { fragments: self.fragments }
    }
}
