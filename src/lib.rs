//! # tabletransfer
//!
//! Self-describing binary protocol for streaming typed tables between
//! processes.
//!
//! A table is a header (version, column types, optional names) followed by
//! framed rows and a terminating flag. Readers learn the schema from the
//! header and decode rows lazily, one at a time.
//!
//! ## Architecture
//!
//! - **Protocol**: wire type tags, schema header, continuation flags
//! - **Codec**: per-kind value encodings and the [`Value`] model
//! - **Encoder / Decoder**: [`TableWriter`] and [`TableReader`] over `std::io`
//! - **Async writer**: [`AsyncTableWriter`] buffers rows and flushes to any
//!   tokio `AsyncWrite`
//!
//! ## Example
//!
//! ```
//! use tabletransfer::{read_table, write_table, Kind, Schema, Value, WireType};
//!
//! let schema = Schema::with_names(
//!     vec![WireType::new(Kind::Int32), WireType::nullable(Kind::String)],
//!     vec!["id".into(), "name".into()],
//! )
//! .unwrap();
//!
//! let rows = vec![
//!     vec![Value::Int32(0), Value::from("a")],
//!     vec![Value::Int32(42), Value::Null],
//! ];
//! let bytes = write_table(Vec::new(), schema, &rows).unwrap();
//!
//! let reader = read_table(bytes.as_slice()).unwrap();
//! assert_eq!(reader.schema().index_of("name"), Some(1));
//! let decoded: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
//! assert_eq!(decoded, rows);
//! ```

pub mod codec;
pub mod error;
pub mod protocol;

mod decoder;
mod encoder;
mod writer;

pub use codec::{Decimal, Row, Value};
pub use decoder::{read_table, ReaderConfig, TableReader};
pub use encoder::{write_table, write_table_inferred, TableWriter};
pub use error::{ConversionError, Result, TableTransferError};
pub use protocol::{Kind, Schema, WireType, WireTyped, PROTOCOL_VERSION};
pub use writer::{
    write_table_async, write_table_inferred_async, AsyncTableWriter, WriterConfig,
    DEFAULT_FLUSH_THRESHOLD,
};
