//! Wire type registry.
//!
//! Every column is described by a single tag byte:
//! ```text
//! ┌──────────────────────┬──────────┐
//! │ Kind index           │ Nullable │
//! │ bits 1-7             │ bit 0    │
//! └──────────────────────┴──────────┘
//! ```
//!
//! The least significant bit marks the nullable form, so `Int32` is tag 14 and
//! nullable `Int32` is tag 15. Tags above 33 are unknown.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{Decimal, Value};
use crate::error::{Result, TableTransferError};

/// Bit marking the nullable form of a kind.
pub const NULLABLE_BIT: u8 = 0b0000_0001;

/// Highest valid tag byte.
pub const MAX_TAG: u8 = (Kind::ALL.len() as u8) * 2 - 1;

/// Primitive value kinds, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Kind {
    Bool = 0,
    UInt8 = 1,
    UInt16 = 2,
    UInt32 = 3,
    UInt64 = 4,
    Int8 = 5,
    Int16 = 6,
    Int32 = 7,
    Int64 = 8,
    Decimal = 9,
    Float32 = 10,
    Float64 = 11,
    Uuid = 12,
    String = 13,
    Binary = 14,
    Timestamp = 15,
    Duration = 16,
}

impl Kind {
    /// All kinds, indexed by their wire index.
    pub const ALL: [Kind; 17] = [
        Kind::Bool,
        Kind::UInt8,
        Kind::UInt16,
        Kind::UInt32,
        Kind::UInt64,
        Kind::Int8,
        Kind::Int16,
        Kind::Int32,
        Kind::Int64,
        Kind::Decimal,
        Kind::Float32,
        Kind::Float64,
        Kind::Uuid,
        Kind::String,
        Kind::Binary,
        Kind::Timestamp,
        Kind::Duration,
    ];

    /// Human readable name, used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Bool => "bool",
            Kind::UInt8 => "u8",
            Kind::UInt16 => "u16",
            Kind::UInt32 => "u32",
            Kind::UInt64 => "u64",
            Kind::Int8 => "i8",
            Kind::Int16 => "i16",
            Kind::Int32 => "i32",
            Kind::Int64 => "i64",
            Kind::Decimal => "decimal",
            Kind::Float32 => "f32",
            Kind::Float64 => "f64",
            Kind::Uuid => "uuid",
            Kind::String => "string",
            Kind::Binary => "binary",
            Kind::Timestamp => "timestamp",
            Kind::Duration => "duration",
        }
    }

    /// Fixed payload width in bytes, or `None` for length-prefixed kinds.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Kind::Bool | Kind::UInt8 | Kind::Int8 => Some(1),
            Kind::UInt16 | Kind::Int16 => Some(2),
            Kind::UInt32 | Kind::Int32 | Kind::Float32 => Some(4),
            Kind::UInt64 | Kind::Int64 | Kind::Float64 => Some(8),
            Kind::Timestamp | Kind::Duration => Some(8),
            Kind::Decimal | Kind::Uuid => Some(16),
            Kind::String | Kind::Binary => None,
        }
    }
}

/// A column's wire type: a kind plus nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WireType {
    /// Value kind carried by the column.
    pub kind: Kind,
    /// Whether each value is preceded by a presence byte and may be `Null`.
    #[serde(default)]
    pub nullable: bool,
}

impl WireType {
    /// Non-nullable wire type for `kind`.
    pub const fn new(kind: Kind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    /// Nullable wire type for `kind`.
    pub const fn nullable(kind: Kind) -> Self {
        Self {
            kind,
            nullable: true,
        }
    }

    /// Encode as a tag byte.
    ///
    /// # Example
    ///
    /// ```
    /// use tabletransfer::protocol::{Kind, WireType};
    ///
    /// assert_eq!(WireType::new(Kind::Int32).tag(), 14);
    /// assert_eq!(WireType::nullable(Kind::Int32).tag(), 15);
    /// ```
    #[inline]
    pub fn tag(self) -> u8 {
        ((self.kind as u8) << 1) | (self.nullable as u8)
    }

    /// Decode a tag byte. Returns `None` for tags outside the known set.
    #[inline]
    pub fn from_tag(tag: u8) -> Option<Self> {
        let kind = *Kind::ALL.get((tag >> 1) as usize)?;
        Some(Self {
            kind,
            nullable: tag & NULLABLE_BIT != 0,
        })
    }

    /// Infer a wire type from a sample value.
    ///
    /// Value kinds map to their non-nullable form. `String` and `Binary` map
    /// to their nullable form since their host representations permit
    /// absence. `Null` carries no kind and cannot be inferred.
    pub fn infer(value: &Value) -> Option<Self> {
        let kind = value.kind()?;
        Some(match kind {
            Kind::String | Kind::Binary => Self::nullable(kind),
            _ => Self::new(kind),
        })
    }

    /// Infer one wire type per column from a sample row.
    pub fn infer_row<'a, I>(row: I) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        row.into_iter()
            .enumerate()
            .map(|(column, value)| {
                Self::infer(value).ok_or(TableTransferError::UnregisteredKind { column })
            })
            .collect()
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "nullable {}", self.kind.name())
        } else {
            f.write_str(self.kind.name())
        }
    }
}

/// Static mapping from a Rust type to its wire type.
///
/// `Option<T>` maps to the nullable form of `T`.
pub trait WireTyped {
    const WIRE_TYPE: WireType;
}

macro_rules! wire_typed {
    ($($ty:ty => $kind:expr),* $(,)?) => {
        $(
            impl WireTyped for $ty {
                const WIRE_TYPE: WireType = WireType::new($kind);
            }
        )*
    };
}

wire_typed! {
    bool => Kind::Bool,
    u8 => Kind::UInt8,
    u16 => Kind::UInt16,
    u32 => Kind::UInt32,
    u64 => Kind::UInt64,
    i8 => Kind::Int8,
    i16 => Kind::Int16,
    i32 => Kind::Int32,
    i64 => Kind::Int64,
    Decimal => Kind::Decimal,
    f32 => Kind::Float32,
    f64 => Kind::Float64,
    Uuid => Kind::Uuid,
    String => Kind::String,
    Bytes => Kind::Binary,
    Vec<u8> => Kind::Binary,
    DateTime<Utc> => Kind::Timestamp,
    TimeDelta => Kind::Duration,
}

impl<T: WireTyped> WireTyped for Option<T> {
    const WIRE_TYPE: WireType = WireType::nullable(T::WIRE_TYPE.kind);
}

/// Wire type registered for `T`.
#[inline]
pub fn wire_type_of<T: WireTyped>() -> WireType {
    T::WIRE_TYPE
}
