//! Conversion between domain [`Value`]s and the store's [`NativeValue`]s.
//!
//! Both directions are pure recursive transforms that build new containers, keep the
//! container kind, and keep map keys in their input order. Sentinel operations only
//! travel towards the store: [`from_native`] refuses to turn a native sentinel back
//! into [`Value::Clear`] or [`Value::Increment`].

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    native::NativeValue,
    reference::{from_native_handle, to_native_handle},
    value::Value,
};

/// Rewrites a domain value for transmission to the store.
pub fn to_native(value: &Value) -> NativeValue {
    match value {
        Value::Reference(reference) => NativeValue::Reference(to_native_handle(reference)),
        Value::Clear => NativeValue::DeleteField,
        Value::Increment(delta) => NativeValue::Increment(*delta),
        Value::Array(items) => NativeValue::Array(items.iter().map(to_native).collect()),
        Value::Map(fields) => NativeValue::Map(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), to_native(value)))
                .collect(),
        ),
        Value::Null => NativeValue::Null,
        Value::Boolean(value) => NativeValue::Boolean(*value),
        Value::Integer(value) => NativeValue::Integer(*value),
        Value::Double(value) => NativeValue::Double(*value),
        Value::Timestamp(value) => NativeValue::Timestamp(*value),
        Value::String(value) => NativeValue::String(value.clone()),
    }
}

/// Rewrites a native value read from the store into a domain value.
///
/// # Errors
///
/// Returns [`DocumentStoreError::MalformedPath`] if a nested document handle does not
/// decode to a reference, and [`DocumentStoreError::InvalidDocument`] if the driver
/// hands back a write-only sentinel.
pub fn from_native(value: &NativeValue) -> DocumentStoreResult<Value> {
    Ok(match value {
        NativeValue::Reference(handle) => Value::Reference(from_native_handle(handle)?),
        NativeValue::Array(items) => Value::Array(
            items
                .iter()
                .map(from_native)
                .collect::<DocumentStoreResult<Vec<_>>>()?,
        ),
        NativeValue::Map(fields) => Value::Map(
            fields
                .iter()
                .map(|(key, value)| Ok((key.clone(), from_native(value)?)))
                .collect::<DocumentStoreResult<_>>()?,
        ),
        NativeValue::DeleteField | NativeValue::Increment(_) => {
            return Err(DocumentStoreError::InvalidDocument(
                "sentinel field operations are write-only".to_string(),
            ));
        }
        NativeValue::Null => Value::Null,
        NativeValue::Boolean(value) => Value::Boolean(*value),
        NativeValue::Integer(value) => Value::Integer(*value),
        NativeValue::Double(value) => Value::Double(*value),
        NativeValue::Timestamp(value) => Value::Timestamp(*value),
        NativeValue::String(value) => Value::String(value.clone()),
    })
}
