//! Domain-level values and the serde bridge to typed models.
//!
//! [`Value`] is the closed set of shapes a model can take on its way to and from the
//! store: plain scalars and containers, cross-collection references, and the two
//! write-only sentinel operations. Models are converted with [`to_value`] and
//! [`from_value`], which drive a dedicated serde `Serializer`/`Deserializer` pair.
//!
//! # Example
//!
//! ```ignore
//! use docwire_core::value::{to_value, from_value, Value};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Contact { name: String, year: i64 }
//!
//! let value = to_value(&Contact { name: "Sasha".into(), year: 1987 })?;
//! let contact: Contact = from_value(value)?;
//! ```

mod de;
mod ser;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    document::Model,
    error::DocumentStoreResult,
    reference::{RawRef, Ref},
};

pub use de::ValueDeserializer;
pub use ser::ValueSerializer;

/// Newtype struct name that marks a serialized reference.
pub(crate) const REFERENCE_TOKEN: &str = "$docwire::Reference";
/// Newtype struct name that marks a serialized timestamp.
pub(crate) const TIMESTAMP_TOKEN: &str = "$docwire::Timestamp";

/// Ordered map of field names to values. Iteration follows insertion order.
pub type Map = IndexMap<String, Value>;

/// A numeric delta or scalar, keeping integers and doubles apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Double(f64),
}

impl Number {
    /// Returns the number widened to `f64`.
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Integer(value) => *value as f64,
            Number::Double(value) => *value,
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Integer(value)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number::Integer(value as i64)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Double(value)
    }
}

/// A domain value as seen by application code.
///
/// References and sentinel operations are explicit variants, so transcoding is an
/// exhaustive match and no map content can ever be mistaken for one of them.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    String(String),
    Array(Vec<Value>),
    Map(Map),
    /// Reference to a document in any collection.
    Reference(RawRef),
    /// Write-only instruction removing the field.
    Clear,
    /// Write-only instruction adding the delta to the stored number.
    Increment(Number),
}

impl Value {
    /// Sentinel removing a field on write.
    pub fn clear() -> Self {
        Value::Clear
    }

    /// Sentinel atomically adding `delta` to a numeric field on write.
    pub fn increment(delta: impl Into<Number>) -> Self {
        Value::Increment(delta.into())
    }

    /// Returns `true` for [`Value::Clear`] and [`Value::Increment`].
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Value::Clear | Value::Increment(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&RawRef> {
        match self {
            Value::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    /// Follows a nested field path through maps.
    pub fn get_path<'a>(&'a self, segments: &[String]) -> Option<&'a Value> {
        segments
            .iter()
            .try_fold(self, |value, segment| value.as_map()?.get(segment))
    }
}

/// Converts a serializable model into a [`Value`].
///
/// # Errors
///
/// Returns [`DocumentStoreError::Serialization`](crate::error::DocumentStoreError::Serialization)
/// if the model cannot be represented (e.g. a map with non-string keys).
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> DocumentStoreResult<Value> {
    value.serialize(ValueSerializer)
}

/// Converts a [`Value`] back into a model.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Serialization`](crate::error::DocumentStoreError::Serialization)
/// if the value does not match the model's shape.
pub fn from_value<T: DeserializeOwned>(value: Value) -> DocumentStoreResult<T> {
    T::deserialize(ValueDeserializer::new(value))
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl From<RawRef> for Value {
    fn from(value: RawRef) -> Self {
        Value::Reference(value)
    }
}

impl<M: Model> From<Ref<M>> for Value {
    fn from(value: Ref<M>) -> Self {
        Value::Reference(value.into_raw())
    }
}

impl<M: Model> From<&Ref<M>> for Value {
    fn from(value: &Ref<M>) -> Self {
        Value::Reference(value.raw().clone())
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Value::Map(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Boolean(value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Value::Integer(value),
                None => Value::Double(number.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(value) => Value::String(value),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => Value::Map(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use crate::collection::Collection;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Address {
        city: String,
        zip: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Contact {
        name: String,
        year: i64,
        tags: Vec<String>,
        address: Address,
        #[serde(with = "crate::timestamp")]
        birthday: DateTime<Utc>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Message {
        author: Ref<Contact>,
        text: String,
    }

    fn sasha() -> Contact {
        Contact {
            name: "Sasha".to_string(),
            year: 1987,
            tags: vec!["friend".to_string()],
            address: Address { city: "Moscow".to_string(), zip: None },
            birthday: Utc.with_ymd_and_hms(1987, 2, 11, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn serializes_structs_in_field_order() {
        let value = to_value(&sasha()).unwrap();
        let keys: Vec<_> = value.as_map().unwrap().keys().cloned().collect();

        assert_eq!(keys, vec!["name", "year", "tags", "address", "birthday"]);
        assert_eq!(
            value.get_path(&["address".to_string(), "zip".to_string()]),
            Some(&Value::Null)
        );
        assert!(matches!(
            value.as_map().unwrap().get("birthday"),
            Some(Value::Timestamp(_))
        ));
    }

    #[test]
    fn models_round_trip() {
        let contact = sasha();
        let back: Contact = from_value(to_value(&contact).unwrap()).unwrap();

        assert_eq!(back, contact);
    }

    #[test]
    fn references_become_reference_values() {
        let contacts = Collection::<Contact>::new("contacts");
        let message = Message {
            author: contacts.reference("sasha").unwrap(),
            text: "+1".to_string(),
        };

        let value = to_value(&message).unwrap();
        let author = value.as_map().unwrap().get("author").unwrap();
        assert_eq!(author.as_reference().unwrap().path(), "contacts/sasha");

        let back: Message = from_value(value).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn other_serializers_see_plain_strings() {
        let contacts = Collection::<Contact>::new("contacts");
        let reference = contacts.reference("tati").unwrap();

        assert_eq!(serde_json::to_value(&reference).unwrap(), json!("contacts/tati"));
    }

    #[test]
    fn converts_json_values() {
        let value = Value::from(json!({ "a": [1, 2.5, null], "b": { "c": "d" } }));

        assert_eq!(
            value,
            Value::Map(Map::from_iter([
                (
                    "a".to_string(),
                    Value::Array(vec![Value::Integer(1), Value::Double(2.5), Value::Null])
                ),
                (
                    "b".to_string(),
                    Value::Map(Map::from_iter([("c".to_string(), Value::from("d"))]))
                ),
            ]))
        );
    }

    #[test]
    fn rejects_non_string_map_keys() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(1, "one");

        assert!(to_value(&map).is_err());
    }

    #[test]
    fn json_objects_keep_key_order() {
        let value = Value::from(json!({ "zeta": 1, "alpha": { "second": 2, "first": 1 } }));

        let Value::Map(fields) = value else {
            panic!("expected a map");
        };
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        let Some(Value::Map(nested)) = fields.get("alpha") else {
            panic!("expected a nested map");
        };
        assert_eq!(nested.keys().collect::<Vec<_>>(), vec!["second", "first"]);
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Channel {
        Silent,
        Email(String),
        Phone { number: String, texts: bool },
    }

    #[test]
    fn enums_round_trip_through_values() {
        let channels = vec![
            Channel::Silent,
            Channel::Email("sasha@example.com".to_string()),
            Channel::Phone { number: "555-0100".to_string(), texts: true },
        ];

        let value = to_value(&channels).unwrap();

        assert!(matches!(&value, Value::Array(items) if items[0] == Value::from("Silent")));
        assert_eq!(from_value::<Vec<Channel>>(value).unwrap(), channels);
    }
}
