//! Query evaluation over in-memory documents.
//!
//! Values are compared with the store's cross-type ordering: null, booleans, numbers,
//! timestamps, strings, references, arrays, maps. Integers and doubles compare by
//! numeric value.

use std::{cmp::Ordering, collections::BTreeMap};

use chrono::{DateTime, Utc};

use docwire_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    field_path::FieldPath,
    native::{
        DocumentHandle, NativeBound, NativeFilter, NativeMap, NativeOrder, NativeQuery,
        NativeSnapshot, NativeValue, PATH_SEPARATOR, QueryTarget,
    },
    query::{Direction, WhereOp},
};

/// Documents keyed by their full path.
pub(crate) type Documents = BTreeMap<String, NativeMap>;

/// Upper bound on the operand size of `in` and `array-contains-any`.
pub(crate) const MAX_DISJUNCTION_VALUES: usize = 10;

/// Borrowed, totally ordered view of a native value.
#[derive(Debug, Clone)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    String(&'a str),
    Reference(&'a str),
    Array(Vec<Comparable<'a>>),
    /// Entries sorted by key.
    Map(Vec<(&'a str, Comparable<'a>)>),
}

impl<'a> From<&'a NativeValue> for Comparable<'a> {
    fn from(value: &'a NativeValue) -> Self {
        match value {
            NativeValue::Null => Comparable::Null,
            NativeValue::Boolean(value) => Comparable::Bool(*value),
            NativeValue::Integer(value) => Comparable::Integer(*value),
            NativeValue::Double(value) => Comparable::Double(*value),
            NativeValue::Timestamp(value) => Comparable::Timestamp(*value),
            NativeValue::String(value) => Comparable::String(value),
            NativeValue::Reference(handle) => Comparable::Reference(handle.path()),
            NativeValue::Array(items) => {
                Comparable::Array(items.iter().map(Comparable::from).collect())
            }
            NativeValue::Map(fields) => {
                let mut entries: Vec<_> = fields
                    .iter()
                    .map(|(key, value)| (key.as_str(), Comparable::from(value)))
                    .collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                Comparable::Map(entries)
            }
            // Never stored.
            NativeValue::DeleteField | NativeValue::Increment(_) => Comparable::Null,
        }
    }
}

impl Comparable<'_> {
    fn type_rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Bool(_) => 1,
            Comparable::Integer(_) | Comparable::Double(_) => 2,
            Comparable::Timestamp(_) => 3,
            Comparable::String(_) => 4,
            Comparable::Reference(_) => 5,
            Comparable::Array(_) => 6,
            Comparable::Map(_) => 7,
        }
    }

    fn same_type(&self, other: &Self) -> bool {
        self.type_rank() == other.type_rank()
    }

    fn as_array(&self) -> Option<&[Comparable<'_>]> {
        match self {
            Comparable::Array(items) => Some(items),
            _ => None,
        }
    }
}

fn compare_doubles(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl Ord for Comparable<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::Integer(a), Comparable::Integer(b)) => a.cmp(b),
            (Comparable::Integer(a), Comparable::Double(b)) => compare_doubles(*a as f64, *b),
            (Comparable::Double(a), Comparable::Integer(b)) => compare_doubles(*a, *b as f64),
            (Comparable::Double(a), Comparable::Double(b)) => compare_doubles(*a, *b),
            (Comparable::Timestamp(a), Comparable::Timestamp(b)) => a.cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::Reference(a), Comparable::Reference(b)) => a
                .split(PATH_SEPARATOR)
                .cmp(b.split(PATH_SEPARATOR)),
            (Comparable::Array(a), Comparable::Array(b)) => a.cmp(b),
            (Comparable::Map(a), Comparable::Map(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Comparable<'_> {}

fn lookup<'a>(path: &'a str, data: &'a NativeMap, field: &FieldPath) -> Option<Comparable<'a>> {
    if field.is_document_id() {
        return Some(Comparable::Reference(path));
    }

    let (first, rest) = field.segments().split_first()?;
    let mut value = data.get(first)?;
    for segment in rest {
        value = value.as_map()?.get(segment)?;
    }

    Some(Comparable::from(value))
}

fn in_target(path: &str, target: &QueryTarget) -> bool {
    let Some((collection, _)) = path.rsplit_once(PATH_SEPARATOR) else {
        return false;
    };

    match target {
        QueryTarget::Collection(expected) => collection == expected,
        QueryTarget::Group(id) => collection
            .rsplit(PATH_SEPARATOR)
            .next()
            .is_some_and(|last| last == id),
    }
}

fn matches(filter: &NativeFilter, path: &str, data: &NativeMap) -> bool {
    let Some(field) = lookup(path, data, &filter.field) else {
        return false;
    };
    let operand = Comparable::from(&filter.value);

    match filter.op {
        WhereOp::Eq => field == operand,
        WhereOp::Lt => field.same_type(&operand) && field < operand,
        WhereOp::Lte => field.same_type(&operand) && field <= operand,
        WhereOp::Gt => field.same_type(&operand) && field > operand,
        WhereOp::Gte => field.same_type(&operand) && field >= operand,
        WhereOp::ArrayContains => field
            .as_array()
            .is_some_and(|items| items.contains(&operand)),
        WhereOp::In => operand
            .as_array()
            .is_some_and(|values| values.contains(&field)),
        WhereOp::ArrayContainsAny => match (field.as_array(), operand.as_array()) {
            (Some(items), Some(values)) => values.iter().any(|value| items.contains(value)),
            _ => false,
        },
    }
}

fn inequality_fields(query: &NativeQuery) -> Vec<&FieldPath> {
    let mut fields: Vec<&FieldPath> = Vec::new();
    for filter in &query.filters {
        if filter.op.is_inequality() && !fields.contains(&&filter.field) {
            fields.push(&filter.field);
        }
    }
    fields
}

/// Explicit orderings, the implicit one on the inequality field, and the trailing
/// document id tie-break.
fn effective_orderings(query: &NativeQuery) -> Vec<NativeOrder> {
    let mut orderings = query.orderings.clone();

    if orderings.is_empty() {
        if let Some(field) = inequality_fields(query).first() {
            orderings.push(NativeOrder { field: (*field).clone(), direction: Direction::Asc });
        }
    }

    if !orderings.iter().any(|order| order.field.is_document_id()) {
        let direction = orderings
            .last()
            .map(|order| order.direction)
            .unwrap_or_default();
        orderings.push(NativeOrder { field: FieldPath::document_id(), direction });
    }

    orderings
}

fn directed(ordering: Ordering, direction: Direction) -> Ordering {
    match direction {
        Direction::Asc => ordering,
        Direction::Desc => ordering.reverse(),
    }
}

fn compare_keys(a: &[Comparable<'_>], b: &[Comparable<'_>], orderings: &[NativeOrder]) -> Ordering {
    a.iter()
        .zip(b)
        .zip(orderings)
        .map(|((a, b), order)| directed(a.cmp(b), order.direction))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn compare_to_bound(
    keys: &[Comparable<'_>],
    bound: &NativeBound,
    orderings: &[NativeOrder],
) -> Ordering {
    keys.iter()
        .zip(&bound.values)
        .zip(orderings)
        .map(|((key, value), order)| directed(key.cmp(&Comparable::from(value)), order.direction))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn after_start(keys: &[Comparable<'_>], bound: &NativeBound, orderings: &[NativeOrder]) -> bool {
    match compare_to_bound(keys, bound, orderings) {
        Ordering::Greater => true,
        Ordering::Equal => bound.inclusive,
        Ordering::Less => false,
    }
}

fn before_end(keys: &[Comparable<'_>], bound: &NativeBound, orderings: &[NativeOrder]) -> bool {
    match compare_to_bound(keys, bound, orderings) {
        Ordering::Less => true,
        Ordering::Equal => bound.inclusive,
        Ordering::Greater => false,
    }
}

fn count_ops(query: &NativeQuery, ops: &[WhereOp]) -> usize {
    query
        .filters
        .iter()
        .filter(|filter| ops.contains(&filter.op))
        .count()
}

/// Checks the composite-query rules the store enforces.
///
/// # Errors
///
/// Returns [`DocumentStoreError::QueryExecution`] describing the first violated rule.
pub(crate) fn validate(query: &NativeQuery) -> DocumentStoreResult<()> {
    let inequalities = inequality_fields(query);

    if let [first, second, ..] = inequalities.as_slice() {
        return Err(DocumentStoreError::QueryExecution(format!(
            "all where filters with an inequality (<, <=, >, or >=) must be on the same field, \
             but you have inequality filters on '{first}' and '{second}'"
        )));
    }

    if let (Some(field), Some(order)) = (inequalities.first(), query.orderings.first()) {
        if order.field != **field {
            return Err(DocumentStoreError::QueryExecution(format!(
                "you have a where filter with an inequality on field '{field}' and so you must \
                 also use '{field}' as your first ordering, but your first ordering is on '{}'",
                order.field
            )));
        }
    }

    if count_ops(query, &[WhereOp::ArrayContains]) > 1 {
        return Err(DocumentStoreError::QueryExecution(
            "you cannot use more than one 'array-contains' filter".to_string(),
        ));
    }
    if count_ops(query, &[WhereOp::In, WhereOp::ArrayContainsAny]) > 1 {
        return Err(DocumentStoreError::QueryExecution(
            "you cannot use more than one 'in' or 'array-contains-any' filter".to_string(),
        ));
    }

    for filter in &query.filters {
        if !matches!(filter.op, WhereOp::In | WhereOp::ArrayContainsAny) {
            continue;
        }
        match &filter.value {
            NativeValue::Array(values)
                if !values.is_empty() && values.len() <= MAX_DISJUNCTION_VALUES => {}
            _ => {
                return Err(DocumentStoreError::QueryExecution(format!(
                    "a non-empty array of at most {MAX_DISJUNCTION_VALUES} values is required for \
                     '{}' filters on '{}'",
                    filter.op, filter.field
                )));
            }
        }
    }

    for (name, bound) in [("start", &query.start), ("end", &query.end)] {
        if let Some(bound) = bound {
            if bound.values.len() > query.orderings.len() {
                return Err(DocumentStoreError::QueryExecution(format!(
                    "too many {name} cursor values: {} provided for {} orderings",
                    bound.values.len(),
                    query.orderings.len()
                )));
            }
        }
    }

    Ok(())
}

/// Runs `query` over `documents`.
pub(crate) fn execute(query: &NativeQuery, documents: &Documents) -> Vec<NativeSnapshot> {
    let orderings = effective_orderings(query);

    let mut rows: Vec<(&String, &NativeMap, Vec<Comparable<'_>>)> = documents
        .iter()
        .filter(|(path, _)| in_target(path, &query.target))
        .filter(|(path, data)| {
            query
                .filters
                .iter()
                .all(|filter| matches(filter, path, data))
        })
        .filter_map(|(path, data)| {
            let keys = orderings
                .iter()
                .map(|order| lookup(path, data, &order.field))
                .collect::<Option<Vec<_>>>()?;
            Some((path, data, keys))
        })
        .filter(|(_, _, keys)| {
            query
                .start
                .as_ref()
                .is_none_or(|bound| after_start(keys, bound, &orderings))
                && query
                    .end
                    .as_ref()
                    .is_none_or(|bound| before_end(keys, bound, &orderings))
        })
        .collect();

    rows.sort_by(|a, b| compare_keys(&a.2, &b.2, &orderings));

    rows.into_iter()
        .take(query.limit.unwrap_or(usize::MAX))
        .map(|(path, data, _)| {
            NativeSnapshot::new(DocumentHandle::for_path(path.as_str()), data.clone())
        })
        .collect()
}
