//! Codec module - values and their per-kind wire encodings.
//!
//! - [`Value`] - a single column value, one variant per [`Kind`](crate::protocol::Kind)
//! - [`Decimal`] - exact 96-bit fixed-point decimal
//! - [`write_value`] / [`read_value`] - the primitive codec
//!
//! # Example
//!
//! ```
//! use tabletransfer::codec::{read_value, write_value, Value, WireReader};
//! use tabletransfer::protocol::{Kind, WireType};
//!
//! let ty = WireType::nullable(Kind::String);
//! let mut buf = Vec::new();
//! write_value(&mut buf, ty, &Value::from("hello")).unwrap();
//!
//! let mut reader = WireReader::new(buf.as_slice());
//! assert_eq!(read_value(&mut reader, ty).unwrap(), Value::from("hello"));
//! ```

mod decimal;
mod primitive;
mod value;

pub use decimal::{Decimal, MAX_MANTISSA, MAX_SCALE};
pub use primitive::{
    read_value, write_7bit_len, write_binary, write_string, write_value, WireReader, ABSENT,
    DEFAULT_MAX_BINARY_LEN, DEFAULT_MAX_STRING_LEN, PRESENT,
};
pub use value::{Row, Value};
