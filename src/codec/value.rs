//! Column values.

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use super::Decimal;
use crate::protocol::Kind;

/// A decoded row: one value per column, in schema order.
pub type Row = Vec<Value>;

/// A single column value.
///
/// `Null` is only valid in nullable columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Decimal(Decimal),
    Float32(f32),
    Float64(f64),
    Uuid(Uuid),
    String(String),
    Binary(Bytes),
    Timestamp(DateTime<Utc>),
    Duration(TimeDelta),
    Null,
}

impl Value {
    /// Kind of this value, `None` for `Null`.
    pub fn kind(&self) -> Option<Kind> {
        Some(match self {
            Value::Bool(_) => Kind::Bool,
            Value::UInt8(_) => Kind::UInt8,
            Value::UInt16(_) => Kind::UInt16,
            Value::UInt32(_) => Kind::UInt32,
            Value::UInt64(_) => Kind::UInt64,
            Value::Int8(_) => Kind::Int8,
            Value::Int16(_) => Kind::Int16,
            Value::Int32(_) => Kind::Int32,
            Value::Int64(_) => Kind::Int64,
            Value::Decimal(_) => Kind::Decimal,
            Value::Float32(_) => Kind::Float32,
            Value::Float64(_) => Kind::Float64,
            Value::Uuid(_) => Kind::Uuid,
            Value::String(_) => Kind::String,
            Value::Binary(_) => Kind::Binary,
            Value::Timestamp(_) => Kind::Timestamp,
            Value::Duration(_) => Kind::Duration,
            Value::Null => return None,
        })
    }

    /// Kind name for error messages.
    pub fn kind_name(&self) -> &'static str {
        self.kind().map_or("null", Kind::name)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    Decimal => Decimal,
    f32 => Float32,
    f64 => Float64,
    Uuid => Uuid,
    String => String,
    Bytes => Binary,
    DateTime<Utc> => Timestamp,
    TimeDelta => Duration,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(Bytes::from(v))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Binary(Bytes::copy_from_slice(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
