//! Row stream decoder.
//!
//! A [`TableReader`] is a lazy, forward-only sequence of rows bound to the
//! stream it reads from. It moves through three states:
//!
//! - `Header`: consuming the schema (inside [`TableReader::open`])
//! - `Rows`: each pull reads one continuation flag, then one row when the
//!   flag is nonzero
//! - `Done`: the terminating flag was read or an error occurred
//!
//! Nothing else may read from the stream while the reader holds it. Use
//! [`TableReader::finish`] to skip to the end of the table and get the stream
//! back for the next table, or [`TableReader::into_inner`] to abandon the
//! table mid-way.
//!
//! # Example
//!
//! ```
//! use tabletransfer::{write_table, Kind, Schema, TableReader, Value, WireType};
//!
//! let schema = Schema::new(vec![WireType::nullable(Kind::Int32)]);
//! let rows = vec![vec![Value::Int32(1)], vec![Value::Null]];
//! let bytes = write_table(Vec::new(), schema, rows).unwrap();
//!
//! let reader = TableReader::open(bytes.as_slice()).unwrap();
//! let rows: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
//! assert_eq!(rows, vec![vec![Value::Int32(1)], vec![Value::Null]]);
//! ```

use std::io::Read;
use std::iter::FusedIterator;

use crate::codec::{read_value, Row, WireReader, DEFAULT_MAX_BINARY_LEN, DEFAULT_MAX_STRING_LEN};
use crate::error::{Result, TableTransferError};
use crate::protocol::{read_header, Schema, PROTOCOL_VERSION};

/// Configuration for reading tables.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Protocol version the header must carry.
    pub version: i32,
    /// Maximum accepted string length in bytes.
    pub max_string_len: u32,
    /// Maximum accepted blob length in bytes.
    pub max_binary_len: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            max_string_len: DEFAULT_MAX_STRING_LEN,
            max_binary_len: DEFAULT_MAX_BINARY_LEN,
        }
    }
}

/// Decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Consuming the schema header.
    Header,
    /// Between rows.
    Rows,
    /// End of table reached, or failed.
    Done,
}

/// Lazy table decoder.
///
/// Pass an owned reader to hand the stream over, or `&mut reader` to keep
/// ownership with the caller.
#[derive(Debug)]
pub struct TableReader<R: Read> {
    reader: Option<WireReader<R>>,
    schema: Schema,
    state: State,
    rows_read: u64,
}

impl<R: Read> TableReader<R> {
    /// Read the header with default configuration.
    pub fn open(reader: R) -> Result<Self> {
        Self::open_with_config(reader, ReaderConfig::default())
    }

    /// Read the header.
    ///
    /// On failure the stream is dropped before the error is returned.
    pub fn open_with_config(reader: R, config: ReaderConfig) -> Result<Self> {
        let mut table = Self {
            reader: Some(WireReader::with_limits(
                reader,
                config.max_string_len,
                config.max_binary_len,
            )),
            schema: Schema::empty(),
            state: State::Header,
            rows_read: 0,
        };
        table.read_header(config.version)?;
        Ok(table)
    }

    fn read_header(&mut self, version: i32) -> Result<()> {
        debug_assert_eq!(self.state, State::Header);
        let Some(reader) = self.reader.as_mut() else {
            return Err(TableTransferError::Finished);
        };
        match read_header(reader, version) {
            Ok(schema) => {
                self.schema = schema;
                self.state = State::Rows;
                Ok(())
            }
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Rows decoded so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Whether the end of the table (or an error) has been reached.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Bytes consumed since the start of the table, while the stream is held.
    pub fn position(&self) -> Option<u64> {
        self.reader.as_ref().map(WireReader::position)
    }

    /// Decode the next row, or `None` at end of table.
    ///
    /// After an error the stream has been released and every later call
    /// returns `Ok(None)`.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        if self.state != State::Rows {
            return Ok(None);
        }
        match self.read_row() {
            Ok(row) => Ok(row),
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    fn read_row(&mut self) -> Result<Option<Row>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        if !reader.read_bool()? {
            self.state = State::Done;
            tracing::debug!(rows = self.rows_read, "Reached end of table");
            return Ok(None);
        }

        let index = self.rows_read;
        let mut row = Vec::with_capacity(self.schema.len());
        for (column, ty) in self.schema.columns().iter().enumerate() {
            let value = read_value(reader, *ty).map_err(|e| e.at_column(index, column))?;
            row.push(value);
        }
        self.rows_read += 1;
        Ok(Some(row))
    }

    /// Drop the stream and stop.
    fn release(&mut self) {
        self.state = State::Done;
        self.reader = None;
    }

    /// Read and discard the remaining rows, then return the stream
    /// positioned just past this table.
    pub fn finish(mut self) -> Result<R> {
        while self.next_row()?.is_some() {}
        self.reader
            .take()
            .map(WireReader::into_inner)
            .ok_or(TableTransferError::Finished)
    }

    /// Abandon the table and return the stream where it stands.
    ///
    /// Unless the table was fully read, the stream is left mid-table.
    /// Returns `None` if the stream was already released by an error.
    pub fn into_inner(mut self) -> Option<R> {
        self.state = State::Done;
        self.reader.take().map(WireReader::into_inner)
    }
}

impl<R: Read> Iterator for TableReader<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl<R: Read> FusedIterator for TableReader<R> {}

impl<R: Read> Drop for TableReader<R> {
    fn drop(&mut self) {
        if self.state == State::Rows && self.reader.is_some() {
            tracing::debug!(
                rows = self.rows_read,
                "Table reader dropped before end of table"
            );
        }
    }
}

/// Open a table on `reader` with default configuration.
pub fn read_table<R: Read>(reader: R) -> Result<TableReader<R>> {
    TableReader::open(reader)
}
