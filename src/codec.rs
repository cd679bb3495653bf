//! Canonical payload encoding.
//!
//! A payload is rendered to compact JSON with object keys in sorted order,
//! then the UTF-8 bytes of that text are hex encoded for storage in a block
//! body. Both steps are reversible, and the same logical payload always
//! produces the same body.
//!
//! Key order is imposed here rather than taken from `serde_json::Map`, whose
//! iteration order changes when the `preserve_order` feature is enabled
//! anywhere in the build.

use crate::error::{BlockError, Result};
use serde::de::DeserializeOwned;
use serde::ser;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Render a payload as canonical compact JSON.
///
/// Fails if the payload contains a NaN or infinite float, which JSON cannot
/// represent.
pub fn canonicalize<T: Serialize + ?Sized>(payload: &T) -> Result<String> {
    payload.serialize(FiniteCheck)?;
    let value = serde_json::to_value(payload)?;
    Ok(render(&value))
}

/// Render a JSON value compactly with object keys sorted bytewise.
pub fn render(value: &Value) -> String {
    let mut out = String::new();
    write_sorted(value, &mut out);
    out
}

fn write_sorted(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_sorted(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_sorted(item, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hex encoded canonical payload text, as stored in a block body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct EncodedBody(String);

impl EncodedBody {
    /// Canonicalize and encode any serializable payload.
    pub fn encode<T: Serialize + ?Sized>(payload: &T) -> Result<Self> {
        Ok(Self::from_canonical(&canonicalize(payload)?))
    }

    /// Encode a JSON value. Never fails.
    pub fn from_value(value: &Value) -> Self {
        Self::from_canonical(&render(value))
    }

    /// Encode text that is already in canonical form.
    pub(crate) fn from_canonical(text: &str) -> Self {
        Self(hex::encode(text.as_bytes()))
    }

    /// Wrap a hex string without checking it.
    #[cfg(test)]
    pub(crate) fn from_hex(hex: String) -> Self {
        Self(hex)
    }

    /// The hex string as stored.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reverse the hex encoding, recovering the canonical text.
    pub fn canonical(&self) -> Result<String> {
        let bytes = hex::decode(&self.0)
            .map_err(|e| BlockError::CorruptPayload(format!("invalid hex body: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| BlockError::CorruptPayload(format!("body is not UTF-8: {}", e)))
    }

    /// Decode the body back into structured data.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let text = self.canonical()?;
        serde_json::from_str(&text)
            .map_err(|e| BlockError::CorruptPayload(format!("unparseable body: {}", e)))
    }
}

impl std::fmt::Display for EncodedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Walks a payload and rejects non-finite floats, which `serde_json::to_value`
/// would otherwise turn into `null`.
struct FiniteCheck;

type CheckResult = std::result::Result<(), serde_json::Error>;

fn check_float(v: f64) -> CheckResult {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ser::Error::custom(format!("non-finite float {} cannot be encoded", v)))
    }
}

macro_rules! accept {
    ($($method:ident: $ty:ty),* $(,)?) => {
        $(fn $method(self, _: $ty) -> CheckResult { Ok(()) })*
    };
}

impl ser::Serializer for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    accept! {
        serialize_bool: bool,
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_char: char,
        serialize_str: &str,
        serialize_bytes: &[u8],
        serialize_unit_struct: &'static str,
    }

    fn serialize_f32(self, v: f32) -> CheckResult {
        check_float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> CheckResult {
        check_float(v)
    }

    fn serialize_none(self) -> CheckResult {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> CheckResult {
        value.serialize(self)
    }

    fn serialize_unit(self) -> CheckResult {
        Ok(())
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> CheckResult {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> CheckResult {
        key.serialize(FiniteCheck)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}
