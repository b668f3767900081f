//! Row stream encoder.
//!
//! Writes a header followed by one framed row per call:
//! ```text
//! ┌────────┬──────┬─────┬──────┬────────┬──────┬─────┬────────┐
//! │ Header │ 0x01 │ row │ 0x01 │  ...   │ 0x01 │ row │ 0x00   │
//! └────────┴──────┴─────┴──────┴────────┴──────┴─────┴────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use tabletransfer::{Kind, Schema, TableWriter, Value, WireType};
//!
//! let schema = Schema::new(vec![WireType::new(Kind::Int32)]);
//! let mut writer = TableWriter::new(Vec::new(), schema).unwrap();
//! writer.write_row([Value::Int32(1)]).unwrap();
//! writer.write_row([Value::Int32(2)]).unwrap();
//! let bytes = writer.finish().unwrap();
//! assert_eq!(*bytes.last().unwrap(), 0);
//! ```

use std::borrow::Borrow;
use std::io::Write;

use crate::codec::{write_value, Value};
use crate::error::{Result, TableTransferError};
use crate::protocol::{write_header, Schema, WireType, END_OF_TABLE, PROTOCOL_VERSION, ROW_FOLLOWS};

/// Encoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Accepting rows.
    Open,
    /// A row failed part-way; its bytes are already in the writer.
    Failed,
    /// Terminator written.
    Finished,
}

/// Synchronous table encoder.
///
/// The header is written on construction. Rows must match the schema width.
/// Dropping the writer without calling [`finish`](TableWriter::finish) leaves
/// the table unterminated.
#[derive(Debug)]
pub struct TableWriter<W: Write> {
    writer: W,
    schema: Schema,
    rows_written: u64,
    state: State,
}

impl<W: Write> TableWriter<W> {
    /// Write the header for `schema` using [`PROTOCOL_VERSION`].
    pub fn new(writer: W, schema: Schema) -> Result<Self> {
        Self::with_version(writer, schema, PROTOCOL_VERSION)
    }

    /// Write the header for `schema` stamped with an explicit version.
    pub fn with_version(mut writer: W, schema: Schema, version: i32) -> Result<Self> {
        write_header(&mut writer, &schema, version)?;
        Ok(Self {
            writer,
            schema,
            rows_written: 0,
            state: State::Open,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Whether a row failed and the writer refuses further use.
    pub fn is_poisoned(&self) -> bool {
        self.state == State::Failed
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Write one row.
    ///
    /// Values are pulled from `row` in column order. A row with too few
    /// values fails with [`TableTransferError::RowWidth`]; one with too many
    /// fails with [`TableTransferError::TrailingValue`]. Any failure leaves
    /// the stream mid-row, so every later call returns
    /// [`TableTransferError::Poisoned`].
    pub fn write_row<I, V>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Borrow<Value>,
    {
        self.check_open()?;
        let result = self.encode_row(row);
        if result.is_err() {
            self.state = State::Failed;
            tracing::debug!(row = self.rows_written, "Table writer failed mid-row");
        }
        result
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            State::Open => Ok(()),
            State::Failed => Err(TableTransferError::Poisoned {
                row: self.rows_written,
            }),
            State::Finished => Err(TableTransferError::Finished),
        }
    }

    fn encode_row<I, V>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Borrow<Value>,
    {
        let index = self.rows_written;
        let expected = self.schema.len();
        let mut values = row.into_iter();

        self.writer.write_all(&[ROW_FOLLOWS])?;
        for (column, ty) in self.schema.columns().iter().enumerate() {
            let Some(value) = values.next() else {
                return Err(TableTransferError::RowWidth {
                    row: index,
                    column,
                    expected,
                });
            };
            write_value(&mut self.writer, *ty, value.borrow())
                .map_err(|e| e.at_column(index, column))?;
        }
        if values.next().is_some() {
            return Err(TableTransferError::TrailingValue {
                row: index,
                expected,
            });
        }

        self.rows_written += 1;
        Ok(())
    }

    /// Write every row from `rows`.
    pub fn write_rows<T, I, V>(&mut self, rows: T) -> Result<()>
    where
        T: IntoIterator<Item = I>,
        I: IntoIterator<Item = V>,
        V: Borrow<Value>,
    {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Write the end-of-table flag. Further rows are rejected.
    pub(crate) fn end(&mut self) -> Result<()> {
        self.check_open()?;
        self.writer.write_all(&[END_OF_TABLE])?;
        self.state = State::Finished;
        tracing::debug!(rows = self.rows_written, "Finished table");
        Ok(())
    }

    /// Terminate the table, flush, and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.end()?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Write a complete table: header, every row, terminator.
pub fn write_table<W, T, I, V>(writer: W, schema: Schema, rows: T) -> Result<W>
where
    W: Write,
    T: IntoIterator<Item = I>,
    I: IntoIterator<Item = V>,
    V: Borrow<Value>,
{
    let mut table = TableWriter::new(writer, schema)?;
    table.write_rows(rows)?;
    table.finish()
}

/// Write a complete table whose column types are inferred from the first row.
///
/// With no rows at all an empty table (zero columns, no names) is written and
/// `names` is ignored.
pub fn write_table_inferred<W, T>(writer: W, rows: T, names: Option<Vec<String>>) -> Result<W>
where
    W: Write,
    T: IntoIterator<Item = Vec<Value>>,
{
    let mut rows = rows.into_iter();
    let Some(first) = rows.next() else {
        return write_table(writer, Schema::empty(), std::iter::empty::<Vec<Value>>());
    };

    let schema = inferred_schema(&first, names)?;
    let mut table = TableWriter::new(writer, schema)?;
    table.write_row(first)?;
    table.write_rows(rows)?;
    table.finish()
}

/// Build a schema from a sample row.
pub(crate) fn inferred_schema(first: &[Value], names: Option<Vec<String>>) -> Result<Schema> {
    let columns = WireType::infer_row(first)?;
    match names {
        Some(names) => Schema::with_names(columns, names),
        None => Ok(Schema::new(columns)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireReader;
    use crate::protocol::{read_header, Kind};
    use std::io::Cursor;

    fn int_string_schema() -> Schema {
        Schema::new(vec![
            WireType::new(Kind::Int32),
            WireType::nullable(Kind::String),
        ])
    }

    #[test]
    fn test_row_framing_bytes() {
        let mut writer = TableWriter::new(Vec::new(), int_string_schema()).unwrap();
        let header_len = writer.get_ref().len();

        writer
            .write_row([Value::Int32(42), Value::Null])
            .unwrap();
        let bytes = writer.finish().unwrap();

        assert_eq!(&bytes[header_len..], &[1, 42, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_short_row_names_row_and_column() {
        let mut writer = TableWriter::new(Vec::new(), int_string_schema()).unwrap();
        writer
            .write_row([Value::Int32(1), Value::from("a")])
            .unwrap();

        let err = writer.write_row([Value::Int32(2)]).unwrap_err();
        assert!(matches!(
            err,
            TableTransferError::RowWidth {
                row: 1,
                column: 1,
                expected: 2
            }
        ));
    }

    #[test]
    fn test_long_row_names_row() {
        let mut writer = TableWriter::new(Vec::new(), int_string_schema()).unwrap();
        let err = writer
            .write_row([Value::Int32(2), Value::Null, Value::Bool(true)])
            .unwrap_err();
        assert!(matches!(
            err,
            TableTransferError::TrailingValue { row: 0, expected: 2 }
        ));
    }

    #[test]
    fn test_conversion_error_has_context() {
        let mut writer = TableWriter::new(Vec::new(), int_string_schema()).unwrap();
        let err = writer
            .write_row([Value::from("oops"), Value::Null])
            .unwrap_err();
        match err {
            TableTransferError::AtColumn { row, column, source } => {
                assert_eq!((row, column), (0, 0));
                assert!(matches!(*source, TableTransferError::ValueConversion(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_borrowed_rows() {
        let rows = vec![vec![Value::Int32(1), Value::from("x")]];
        let mut writer = TableWriter::new(Vec::new(), int_string_schema()).unwrap();
        for row in &rows {
            writer.write_row(row).unwrap();
        }
        assert_eq!(writer.rows_written(), 1);
    }

    #[test]
    fn test_write_after_finish_rejected() {
        let mut writer = TableWriter::new(Vec::new(), Schema::empty()).unwrap();
        writer.end().unwrap();
        assert!(matches!(
            writer.write_row(Vec::<Value>::new()),
            Err(TableTransferError::Finished)
        ));
        assert!(matches!(writer.end(), Err(TableTransferError::Finished)));
    }

    #[test]
    fn test_failed_row_poisons_writer() {
        let schema = Schema::new(vec![WireType::new(Kind::Int8), WireType::new(Kind::Int8)]);
        let mut writer = TableWriter::new(Vec::new(), schema).unwrap();
        writer.write_row([Value::Int8(0), Value::Int8(0)]).unwrap();

        assert!(writer.write_row([Value::Int8(1)]).is_err());
        assert!(writer.is_poisoned());
        assert!(matches!(
            writer.write_row([Value::Int8(2), Value::Int8(3)]),
            Err(TableTransferError::Poisoned { row: 1 })
        ));
        assert!(matches!(
            writer.finish(),
            Err(TableTransferError::Poisoned { row: 1 })
        ));
    }

    #[test]
    fn test_conversion_error_poisons_writer() {
        let mut writer = TableWriter::new(Vec::new(), int_string_schema()).unwrap();
        writer
            .write_row([Value::Int32(7), Value::Bool(true)])
            .unwrap_err();
        assert!(matches!(
            writer.end(),
            Err(TableTransferError::Poisoned { row: 0 })
        ));
        assert_eq!(writer.rows_written(), 0);
    }

    #[test]
    fn test_inferred_schema_from_first_row() {
        let rows = vec![
            vec![Value::Int64(1), Value::from("a")],
            vec![Value::Int64(2), Value::Null],
        ];
        let bytes = write_table_inferred(Vec::new(), rows, Some(vec!["n".into(), "s".into()]))
            .unwrap();

        let mut r = WireReader::new(Cursor::new(bytes));
        let schema = read_header(&mut r, PROTOCOL_VERSION).unwrap();
        assert_eq!(
            schema.columns(),
            &[WireType::new(Kind::Int64), WireType::nullable(Kind::String)]
        );
        assert_eq!(schema.names().unwrap(), &["n".to_string(), "s".to_string()]);
    }

    #[test]
    fn test_inferred_without_rows_is_empty_table() {
        let bytes =
            write_table_inferred(Vec::new(), Vec::<Vec<Value>>::new(), Some(vec!["x".into()]))
                .unwrap();
        assert_eq!(bytes, [2, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_inferred_null_first_value_fails() {
        let rows = vec![vec![Value::Null]];
        assert!(matches!(
            write_table_inferred(Vec::new(), rows, None),
            Err(TableTransferError::UnregisteredKind { column: 0 })
        ));
    }
}
