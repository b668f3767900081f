//! Error types for tabletransfer.

use thiserror::Error;

use crate::protocol::WireType;

/// Main error type for all table encode/decode operations.
#[derive(Debug, Error)]
pub enum TableTransferError {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while handling a schema descriptor.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Header version differs from the version this side speaks.
    #[error("{}", version_message(*found, *expected))]
    VersionMismatch {
        /// Version read from the stream.
        found: i32,
        /// Version this reader expects.
        expected: i32,
        /// Byte offset of the version field.
        position: u64,
    },

    /// A column tag byte does not name any known wire type.
    #[error("Unknown wire tag {tag} at byte {position}")]
    UnknownWireTag { tag: u8, position: u64 },

    /// A row ran out of values before every column was written.
    #[error("Row {row} has no value for column {column}; schema declares {expected} columns")]
    RowWidth {
        row: u64,
        column: usize,
        expected: usize,
    },

    /// A row yielded more values than the schema declares.
    #[error("Row {row} has more values than the {expected} declared columns")]
    TrailingValue { row: u64, expected: usize },

    /// A value does not match the wire type of its column.
    #[error("Value conversion error: {0}")]
    ValueConversion(#[from] ConversionError),

    /// A failure while encoding or decoding one column value.
    #[error("Error at row {row}, column {column}: {source}")]
    AtColumn {
        row: u64,
        column: usize,
        #[source]
        source: Box<TableTransferError>,
    },

    /// Column names do not line up with column types.
    #[error("Schema has {columns} columns but {names} names")]
    NameCount { names: usize, columns: usize },

    /// No wire type can be inferred for a sample value.
    #[error("Cannot infer a wire type for column {column} from a null value")]
    UnregisteredKind { column: usize },

    /// Bytes on the wire are structurally invalid.
    #[error("Invalid data at byte {position}: {reason}")]
    InvalidData { position: u64, reason: String },

    /// The stream ended in the middle of a table.
    #[error("Unexpected end of stream at byte {position}")]
    UnexpectedEof { position: u64 },

    /// The table was already terminated.
    #[error("Table already finished")]
    Finished,

    /// A row failed part-way through; the table cannot be completed.
    #[error("Table writer failed at row {row} and cannot continue")]
    Poisoned { row: u64 },
}

/// A value could not be coerced to the wire type declared for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// The value's kind differs from the column's kind.
    #[error("expected {expected}, found {found}")]
    KindMismatch {
        expected: WireType,
        found: &'static str,
    },

    /// The value is representable in memory but not on the wire.
    #[error("{0} is out of range for its wire encoding")]
    OutOfRange(&'static str),

    /// The value is finer than the 100 ns tick its kind is encoded in.
    #[error("{0} has precision finer than 100 ns")]
    SubTickPrecision(&'static str),
}

fn version_message(found: i32, expected: i32) -> String {
    if expected < found {
        format!(
            "Data is encoded with protocol version {found} but this reader speaks version {expected}; upgrade the reader to parse it"
        )
    } else {
        format!(
            "Data is encoded with outdated protocol version {found} but this reader speaks version {expected}; downgrade the reader to parse it"
        )
    }
}

impl TableTransferError {
    /// Wrap this error with row/column context.
    pub(crate) fn at_column(self, row: u64, column: usize) -> Self {
        TableTransferError::AtColumn {
            row,
            column,
            source: Box::new(self),
        }
    }

    /// Byte position of a read-side error, if it carries one.
    pub fn position(&self) -> Option<u64> {
        match self {
            TableTransferError::VersionMismatch { position, .. }
            | TableTransferError::UnknownWireTag { position, .. }
            | TableTransferError::InvalidData { position, .. }
            | TableTransferError::UnexpectedEof { position } => Some(*position),
            TableTransferError::AtColumn { source, .. } => source.position(),
            _ => None,
        }
    }
}

/// Result type alias using TableTransferError.
pub type Result<T> = std::result::Result<T, TableTransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_message_names_reader_behind() {
        let err = TableTransferError::VersionMismatch {
            found: 3,
            expected: 2,
            position: 0,
        };
        assert!(err.to_string().contains("upgrade the reader"));
    }

    #[test]
    fn test_version_message_names_data_behind() {
        let err = TableTransferError::VersionMismatch {
            found: 1,
            expected: 2,
            position: 0,
        };
        assert!(err.to_string().contains("outdated"));
        assert!(err.to_string().contains("downgrade"));
    }

    #[test]
    fn test_position_through_context() {
        let err = TableTransferError::UnexpectedEof { position: 17 }.at_column(4, 1);
        assert_eq!(err.position(), Some(17));
        assert!(err.to_string().contains("row 4, column 1"));
    }
}
