//! Serde deserializer reading models back out of a [`Value`].

use chrono::SecondsFormat;
use serde::de::{
    self, DeserializeSeed, EnumAccess, IntoDeserializer, MapAccess, SeqAccess, VariantAccess,
    Visitor,
};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    value::{REFERENCE_TOKEN, TIMESTAMP_TOKEN, Value},
};

/// Serde deserializer reading a model out of a [`Value`] tree.
///
/// References are presented as their path string and timestamps as RFC 3339 strings,
/// so plain `String` and `chrono::DateTime` fields accept them as well.
#[derive(Debug, Clone)]
pub struct ValueDeserializer {
    value: Value,
}

impl ValueDeserializer {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

fn sentinel_error() -> DocumentStoreError {
    DocumentStoreError::Serialization("sentinel field operations cannot be read".to_string())
}

impl<'de> de::Deserializer<'de> for ValueDeserializer {
    type Error = DocumentStoreError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> DocumentStoreResult<V::Value> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Boolean(value) => visitor.visit_bool(value),
            Value::Integer(value) => visitor.visit_i64(value),
            Value::Double(value) => visitor.visit_f64(value),
            Value::Timestamp(value) => {
                visitor.visit_string(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::String(value) => visitor.visit_string(value),
            Value::Reference(reference) => visitor.visit_string(reference.path()),
            Value::Array(items) => {
                let len = items.len();
                let mut seq = SeqDeserializer { iter: items.into_iter() };
                let value = visitor.visit_seq(&mut seq)?;

                if seq.iter.len() == 0 {
                    Ok(value)
                } else {
                    Err(de::Error::invalid_length(len, &"fewer elements in array"))
                }
            }
            Value::Map(map) => visitor.visit_map(MapDeserializer {
                iter: map.into_iter(),
                value: None,
            }),
            Value::Clear | Value::Increment(_) => Err(sentinel_error()),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> DocumentStoreResult<V::Value> {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> DocumentStoreResult<V::Value> {
        match (name, self.value) {
            (REFERENCE_TOKEN, Value::Reference(reference)) => {
                let path = Value::String(reference.path());
                visitor.visit_newtype_struct(ValueDeserializer::new(path))
            }
            (TIMESTAMP_TOKEN, Value::Timestamp(timestamp)) => {
                visitor.visit_newtype_struct(ValueDeserializer::new(Value::String(
                    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                )))
            }
            (_, value) => visitor.visit_newtype_struct(ValueDeserializer::new(value)),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> DocumentStoreResult<V::Value> {
        match self.value {
            Value::String(variant) => visitor.visit_enum(EnumDeserializer { variant, value: None }),
            Value::Map(map) if map.len() == 1 => {
                let (variant, value) = map.into_iter().next().ok_or_else(|| {
                    DocumentStoreError::Serialization("empty enum map".to_string())
                })?;
                visitor.visit_enum(EnumDeserializer { variant, value: Some(value) })
            }
            other => Err(DocumentStoreError::Serialization(format!(
                "expected an enum variant, found {other:?}"
            ))),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> DocumentStoreResult<V::Value> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            other => Err(DocumentStoreError::Serialization(format!(
                "expected null, found {other:?}"
            ))),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit_struct seq tuple tuple_struct map struct identifier
        ignored_any
    }
}

struct SeqDeserializer {
    iter: std::vec::IntoIter<Value>,
}

impl<'de> SeqAccess<'de> for SeqDeserializer {
    type Error = DocumentStoreError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> DocumentStoreResult<Option<T::Value>> {
        match self.iter.next() {
            Some(value) => seed.deserialize(ValueDeserializer::new(value)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapDeserializer {
    iter: indexmap::map::IntoIter<String, Value>,
    value: Option<Value>,
}

impl<'de> MapAccess<'de> for MapDeserializer {
    type Error = DocumentStoreError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> DocumentStoreResult<Option<K::Value>> {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(key.into_deserializer()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> DocumentStoreResult<V::Value> {
        match self.value.take() {
            Some(value) => seed.deserialize(ValueDeserializer::new(value)),
            None => Err(DocumentStoreError::Serialization(
                "map value requested before its key".to_string(),
            )),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct EnumDeserializer {
    variant: String,
    value: Option<Value>,
}

impl<'de> EnumAccess<'de> for EnumDeserializer {
    type Error = DocumentStoreError;
    type Variant = VariantDeserializer;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> DocumentStoreResult<(V::Value, VariantDeserializer)> {
        let variant = seed.deserialize(IntoDeserializer::<DocumentStoreError>::into_deserializer(
            self.variant,
        ))?;
        Ok((variant, VariantDeserializer { value: self.value }))
    }
}

struct VariantDeserializer {
    value: Option<Value>,
}

impl<'de> VariantAccess<'de> for VariantDeserializer {
    type Error = DocumentStoreError;

    fn unit_variant(self) -> DocumentStoreResult<()> {
        match self.value {
            None | Some(Value::Null) => Ok(()),
            Some(other) => Err(DocumentStoreError::Serialization(format!(
                "expected a unit variant, found {other:?}"
            ))),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> DocumentStoreResult<T::Value> {
        match self.value {
            Some(value) => seed.deserialize(ValueDeserializer::new(value)),
            None => Err(DocumentStoreError::Serialization(
                "expected a newtype variant".to_string(),
            )),
        }
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> DocumentStoreResult<V::Value> {
        match self.value {
            Some(value @ Value::Array(_)) => {
                de::Deserializer::deserialize_any(ValueDeserializer::new(value), visitor)
            }
            _ => Err(DocumentStoreError::Serialization(
                "expected a tuple variant".to_string(),
            )),
        }
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> DocumentStoreResult<V::Value> {
        match self.value {
            Some(value @ Value::Map(_)) => {
                de::Deserializer::deserialize_any(ValueDeserializer::new(value), visitor)
            }
            _ => Err(DocumentStoreError::Serialization(
                "expected a struct variant".to_string(),
            )),
        }
    }
}
