//! Protocol module - wire types, schema, and header framing.
//!
//! This module implements the self-describing part of the format:
//! - Wire type tags (one byte per column)
//! - Schema header (version, column count, tags, optional names)
//! - Row continuation flags

mod schema;
mod wire_type;

pub use schema::{read_header, write_header, Schema, HEADER_FIXED_SIZE};
pub use wire_type::{wire_type_of, Kind, WireType, WireTyped, MAX_TAG, NULLABLE_BIT};

/// Protocol major version. Readers reject any other version.
pub const PROTOCOL_VERSION: i32 = 2;

/// Continuation flag written before every row.
pub const ROW_FOLLOWS: u8 = 1;

/// Continuation flag terminating the row body.
pub const END_OF_TABLE: u8 = 0;
