//! Field paths.
//!
//! A [`FieldPath`] names a possibly nested field by its segments, so a map key holding
//! a dot is never confused with nesting. The reserved [`FieldPath::document_id`] path
//! addresses the document id in filters and orderings.

use std::fmt::{Display, Formatter};

/// Reserved segment addressing the document id instead of a stored field.
pub const DOCUMENT_ID_SEGMENT: &str = "__name__";

/// Path to a field, possibly nested inside map-valued fields.
///
/// A single name addresses a top-level field; a sequence of names walks into maps:
///
/// ```ignore
/// let city = FieldPath::from(["address", "city"]);
/// assert_eq!(city.to_string(), "address.city");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { segments: segments.into_iter().map(Into::into).collect() }
    }

    /// The path addressing a document's own id.
    pub fn document_id() -> Self {
        Self::new([DOCUMENT_ID_SEGMENT])
    }

    pub fn is_document_id(&self) -> bool {
        self.segments.len() == 1 && self.segments[0] == DOCUMENT_ID_SEGMENT
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() || self.segments.iter().any(|segment| segment.is_empty())
    }

    /// Dot-joined form used in diagnostics.
    pub fn canonical_string(&self) -> String {
        self.segments.join(".")
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_string())
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        Self::new([value])
    }
}

impl From<String> for FieldPath {
    fn from(value: String) -> Self {
        Self::new([value])
    }
}

impl<const N: usize> From<[&str; N]> for FieldPath {
    fn from(value: [&str; N]) -> Self {
        Self::new(value)
    }
}

impl From<Vec<&str>> for FieldPath {
    fn from(value: Vec<&str>) -> Self {
        Self::new(value)
    }
}

impl From<Vec<String>> for FieldPath {
    fn from(value: Vec<String>) -> Self {
        Self::new(value)
    }
}

impl From<&FieldPath> for FieldPath {
    fn from(value: &FieldPath) -> Self {
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_paths_keep_segment_order() {
        let path = FieldPath::from(["address", "city"]);

        assert_eq!(path.segments(), &["address".to_string(), "city".to_string()]);
        assert_eq!(path.to_string(), "address.city");
        assert!(!path.is_document_id());
    }

    #[test]
    fn document_id_path() {
        assert!(FieldPath::document_id().is_document_id());
        assert!(FieldPath::from("").is_empty());
    }
}
