//! Table schema and header encoding.
//!
//! Header layout:
//! ```text
//! ┌──────────┬──────────┬───────┬───────────────┬─────────────────────┐
//! │ Version  │ Columns  │ Names │ Tags          │ Names (if flagged)  │
//! │ i32 LE   │ u32 LE   │ 1 byte│ 1 byte × C    │ 7-bit len + UTF-8 × C│
//! └──────────┴──────────┴───────┴───────────────┴─────────────────────┘
//! ```

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use super::WireType;
use crate::codec::{write_string, WireReader};
use crate::error::{ConversionError, Result, TableTransferError};

/// Size of the fixed part of the header (version, column count, names flag).
pub const HEADER_FIXED_SIZE: usize = 9;

/// Upper bound on the up-front column allocation when reading a header.
const MAX_PREALLOCATED_COLUMNS: usize = 1024;

/// Ordered column types with optional column names.
///
/// When names are present there is exactly one per column.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "SchemaDescriptor")]
pub struct Schema {
    columns: Vec<WireType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    names: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct SchemaDescriptor {
    columns: Vec<WireType>,
    #[serde(default)]
    names: Option<Vec<String>>,
}

impl TryFrom<SchemaDescriptor> for Schema {
    type Error = TableTransferError;

    fn try_from(d: SchemaDescriptor) -> Result<Self> {
        match d.names {
            Some(names) => Schema::with_names(d.columns, names),
            None => Ok(Schema::new(d.columns)),
        }
    }
}

impl Schema {
    /// Schema without column names.
    pub fn new(columns: Vec<WireType>) -> Self {
        Self {
            columns,
            names: None,
        }
    }

    /// Schema with one name per column.
    pub fn with_names(columns: Vec<WireType>, names: Vec<String>) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(TableTransferError::NameCount {
                names: names.len(),
                columns: columns.len(),
            });
        }
        Ok(Self {
            columns,
            names: Some(names),
        })
    }

    /// Zero columns, no names.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Column types in wire order.
    pub fn columns(&self) -> &[WireType] {
        &self.columns
    }

    /// Column names, one per column, if the header carries them.
    pub fn names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    /// Number of columns.
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has zero columns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Type of the column at `index`.
    pub fn column(&self, index: usize) -> Option<WireType> {
        self.columns.get(index).copied()
    }

    /// Index of the column called `name`, if names are present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.as_ref()?.iter().position(|n| n == name)
    }

    /// JSON descriptor, e.g. `{"columns":[{"kind":"int32","nullable":false}]}`.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON descriptor produced by [`Schema::to_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl FromIterator<WireType> for Schema {
    fn from_iter<I: IntoIterator<Item = WireType>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Write the table header.
pub fn write_header<W: Write + ?Sized>(w: &mut W, schema: &Schema, version: i32) -> Result<()> {
    let columns =
        u32::try_from(schema.len()).map_err(|_| ConversionError::OutOfRange("column count"))?;

    let mut fixed = [0u8; HEADER_FIXED_SIZE];
    fixed[0..4].copy_from_slice(&version.to_le_bytes());
    fixed[4..8].copy_from_slice(&columns.to_le_bytes());
    fixed[8] = schema.names.is_some() as u8;
    w.write_all(&fixed)?;

    let tags: Vec<u8> = schema.columns.iter().map(|ty| ty.tag()).collect();
    w.write_all(&tags)?;

    if let Some(names) = &schema.names {
        for name in names {
            write_string(w, name)?;
        }
    }

    tracing::debug!(
        version,
        columns,
        named = schema.names.is_some(),
        "Wrote table header"
    );
    Ok(())
}

/// Read and validate the table header.
///
/// Fails with [`TableTransferError::VersionMismatch`] before reading anything
/// past the version field when the version differs from `version`.
pub fn read_header<R: Read>(r: &mut WireReader<R>, version: i32) -> Result<Schema> {
    let position = r.position();
    let found = r.read_i32()?;
    if found != version {
        return Err(TableTransferError::VersionMismatch {
            found,
            expected: version,
            position,
        });
    }

    let count = r.read_u32()? as usize;
    let named = r.read_bool()?;

    let mut columns = Vec::with_capacity(count.min(MAX_PREALLOCATED_COLUMNS));
    for _ in 0..count {
        let position = r.position();
        let tag = r.read_u8()?;
        let ty = WireType::from_tag(tag)
            .ok_or(TableTransferError::UnknownWireTag { tag, position })?;
        columns.push(ty);
    }

    let names = if named {
        let mut names = Vec::with_capacity(count.min(MAX_PREALLOCATED_COLUMNS));
        for _ in 0..count {
            names.push(r.read_string()?);
        }
        Some(names)
    } else {
        None
    };

    tracing::debug!(version, columns = count, named, "Read table header");
    Ok(Schema { columns, names })
}
