//! Serde serializer producing [`Value`]s.
//!
//! References and timestamps are recognized by the reserved newtype names their serde
//! impls emit, so they keep their own variants instead of collapsing to strings.

use chrono::{DateTime, Utc};
use serde::ser::{self, Serialize};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    reference::RawRef,
    value::{Map, REFERENCE_TOKEN, TIMESTAMP_TOKEN, Value},
};

/// Serde serializer producing a [`Value`] tree.
///
/// References and timestamps are recognized by their reserved newtype names and
/// turned into [`Value::Reference`] and [`Value::Timestamp`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = DocumentStoreError;

    type SerializeSeq = SerializeVec;
    type SerializeTuple = SerializeVec;
    type SerializeTupleStruct = SerializeVec;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeMap;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> DocumentStoreResult<Value> {
        Ok(Value::Boolean(v))
    }

    fn serialize_i8(self, v: i8) -> DocumentStoreResult<Value> {
        Ok(Value::Integer(v as i64))
    }

    fn serialize_i16(self, v: i16) -> DocumentStoreResult<Value> {
        Ok(Value::Integer(v as i64))
    }

    fn serialize_i32(self, v: i32) -> DocumentStoreResult<Value> {
        Ok(Value::Integer(v as i64))
    }

    fn serialize_i64(self, v: i64) -> DocumentStoreResult<Value> {
        Ok(Value::Integer(v))
    }

    fn serialize_u8(self, v: u8) -> DocumentStoreResult<Value> {
        Ok(Value::Integer(v as i64))
    }

    fn serialize_u16(self, v: u16) -> DocumentStoreResult<Value> {
        Ok(Value::Integer(v as i64))
    }

    fn serialize_u32(self, v: u32) -> DocumentStoreResult<Value> {
        Ok(Value::Integer(v as i64))
    }

    fn serialize_u64(self, v: u64) -> DocumentStoreResult<Value> {
        i64::try_from(v)
            .map(Value::Integer)
            .map_err(|_| DocumentStoreError::Serialization(format!("integer {v} out of range")))
    }

    fn serialize_f32(self, v: f32) -> DocumentStoreResult<Value> {
        Ok(Value::Double(v as f64))
    }

    fn serialize_f64(self, v: f64) -> DocumentStoreResult<Value> {
        Ok(Value::Double(v))
    }

    fn serialize_char(self, v: char) -> DocumentStoreResult<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> DocumentStoreResult<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> DocumentStoreResult<Value> {
        Ok(Value::Array(
            v.iter()
                .map(|byte| Value::Integer(*byte as i64))
                .collect(),
        ))
    }

    fn serialize_none(self) -> DocumentStoreResult<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> DocumentStoreResult<Value> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> DocumentStoreResult<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> DocumentStoreResult<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> DocumentStoreResult<Value> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> DocumentStoreResult<Value> {
        match name {
            REFERENCE_TOKEN => match value.serialize(self)? {
                Value::String(path) => Ok(Value::Reference(RawRef::parse(&path)?)),
                other => Err(DocumentStoreError::Serialization(format!(
                    "expected a reference path, found {other:?}"
                ))),
            },
            TIMESTAMP_TOKEN => match value.serialize(self)? {
                Value::String(text) => DateTime::parse_from_rfc3339(&text)
                    .map(|timestamp| Value::Timestamp(timestamp.with_timezone(&Utc)))
                    .map_err(|err| DocumentStoreError::Serialization(err.to_string())),
                other => Err(DocumentStoreError::Serialization(format!(
                    "expected an RFC 3339 timestamp, found {other:?}"
                ))),
            },
            _ => value.serialize(self),
        }
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> DocumentStoreResult<Value> {
        let mut map = Map::new();
        map.insert(variant.to_string(), value.serialize(self)?);

        Ok(Value::Map(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> DocumentStoreResult<SerializeVec> {
        Ok(SerializeVec { items: Vec::with_capacity(len.unwrap_or(0)) })
    }

    fn serialize_tuple(self, len: usize) -> DocumentStoreResult<SerializeVec> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> DocumentStoreResult<SerializeVec> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> DocumentStoreResult<SerializeTupleVariant> {
        Ok(SerializeTupleVariant {
            variant: variant.to_string(),
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> DocumentStoreResult<SerializeMap> {
        Ok(SerializeMap { map: Map::new(), next_key: None })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> DocumentStoreResult<SerializeMap> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> DocumentStoreResult<SerializeStructVariant> {
        Ok(SerializeStructVariant {
            variant: variant.to_string(),
            map: Map::new(),
        })
    }
}

pub struct SerializeVec {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SerializeVec {
    type Ok = Value;
    type Error = DocumentStoreError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> DocumentStoreResult<()> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> DocumentStoreResult<Value> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SerializeVec {
    type Ok = Value;
    type Error = DocumentStoreError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> DocumentStoreResult<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> DocumentStoreResult<Value> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SerializeVec {
    type Ok = Value;
    type Error = DocumentStoreError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> DocumentStoreResult<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> DocumentStoreResult<Value> {
        ser::SerializeSeq::end(self)
    }
}

pub struct SerializeTupleVariant {
    variant: String,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = Value;
    type Error = DocumentStoreError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> DocumentStoreResult<()> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> DocumentStoreResult<Value> {
        let mut map = Map::new();
        map.insert(self.variant, Value::Array(self.items));

        Ok(Value::Map(map))
    }
}

pub struct SerializeMap {
    map: Map,
    next_key: Option<String>,
}

impl ser::SerializeMap for SerializeMap {
    type Ok = Value;
    type Error = DocumentStoreError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> DocumentStoreResult<()> {
        match key.serialize(ValueSerializer)? {
            Value::String(key) => {
                self.next_key = Some(key);
                Ok(())
            }
            other => Err(DocumentStoreError::Serialization(format!(
                "map keys must be strings, found {other:?}"
            ))),
        }
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> DocumentStoreResult<()> {
        let key = self.next_key.take().ok_or_else(|| {
            DocumentStoreError::Serialization("map value serialized before its key".to_string())
        })?;
        self.map.insert(key, value.serialize(ValueSerializer)?);

        Ok(())
    }

    fn end(self) -> DocumentStoreResult<Value> {
        Ok(Value::Map(self.map))
    }
}

impl ser::SerializeStruct for SerializeMap {
    type Ok = Value;
    type Error = DocumentStoreError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> DocumentStoreResult<()> {
        self.map.insert(key.to_string(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> DocumentStoreResult<Value> {
        Ok(Value::Map(self.map))
    }
}

pub struct SerializeStructVariant {
    variant: String,
    map: Map,
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = Value;
    type Error = DocumentStoreError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> DocumentStoreResult<()> {
        self.map.insert(key.to_string(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> DocumentStoreResult<Value> {
        let mut outer = Map::new();
        outer.insert(self.variant, Value::Map(self.map));

        Ok(Value::Map(outer))
    }
}
