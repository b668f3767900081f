//! Buffered async table writer.
//!
//! Rows are encoded synchronously into an in-memory buffer. Once the buffer
//! grows past the flush threshold it is written to the destination in one
//! `write_all`, so a slow destination sees few large writes instead of many
//! small ones.
//!
//! # Architecture
//!
//! ```text
//! rows ─► TableWriter ─► BytesMut ─(> threshold / finish)─► AsyncWrite
//! ```
//!
//! The bytes produced are identical to [`TableWriter`](crate::TableWriter)
//! for any threshold. A row that fails is cut from the buffer before anything
//! else can flush it, and the writer refuses further rows.

use std::borrow::Borrow;

use bytes::buf::Writer;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::codec::Value;
use crate::encoder::{inferred_schema, TableWriter};
use crate::error::{Result, TableTransferError};
use crate::protocol::{Schema, PROTOCOL_VERSION};

/// Default flush threshold (64 KB).
pub const DEFAULT_FLUSH_THRESHOLD: usize = 64 * 1024;

/// Cap on the buffer capacity reserved up front.
const MAX_INITIAL_CAPACITY: usize = 1024 * 1024;

/// Configuration for the async writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Flush once more than this many bytes are buffered.
    pub flush_threshold: usize,
    /// Protocol version stamped into the header.
    pub version: i32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            version: PROTOCOL_VERSION,
        }
    }
}

/// Table encoder that buffers in memory and flushes to an async destination.
///
/// Dropping the writer without [`finish`](AsyncTableWriter::finish) discards
/// whatever is still buffered.
pub struct AsyncTableWriter<W> {
    /// Taken by `finish`.
    dest: Option<W>,
    encoder: TableWriter<Writer<BytesMut>>,
    flush_threshold: usize,
    bytes_flushed: u64,
}

impl<W: AsyncWrite + Unpin> AsyncTableWriter<W> {
    /// Buffer the header for `schema` with default configuration.
    pub fn new(dest: W, schema: Schema) -> Result<Self> {
        Self::with_config(dest, schema, WriterConfig::default())
    }

    /// Buffer the header for `schema`.
    ///
    /// Nothing reaches `dest` until the first flush.
    pub fn with_config(dest: W, schema: Schema, config: WriterConfig) -> Result<Self> {
        let capacity = config.flush_threshold.saturating_add(1).min(MAX_INITIAL_CAPACITY);
        let buffer = BytesMut::with_capacity(capacity).writer();
        let encoder = TableWriter::with_version(buffer, schema, config.version)?;
        Ok(Self {
            dest: Some(dest),
            encoder,
            flush_threshold: config.flush_threshold,
            bytes_flushed: 0,
        })
    }

    pub fn schema(&self) -> &Schema {
        self.encoder.schema()
    }

    pub fn rows_written(&self) -> u64 {
        self.encoder.rows_written()
    }

    /// Bytes waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.encoder.get_ref().get_ref().len()
    }

    /// Bytes already handed to the destination.
    pub fn bytes_flushed(&self) -> u64 {
        self.bytes_flushed
    }

    /// Encode one row, flushing if the buffer passed the threshold.
    ///
    /// On failure the partial row is removed from the buffer and every later
    /// call fails with [`TableTransferError::Poisoned`].
    pub async fn write_row<I, V>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Borrow<Value>,
    {
        let mark = self.buffered();
        if let Err(e) = self.encoder.write_row(row) {
            if self.encoder.is_poisoned() {
                self.encoder.get_mut().get_mut().truncate(mark);
            }
            return Err(e);
        }
        if self.buffered() > self.flush_threshold {
            self.flush_buffer().await?;
        }
        Ok(())
    }

    /// Encode every row from `rows`.
    pub async fn write_rows<T, I, V>(&mut self, rows: T) -> Result<()>
    where
        T: IntoIterator<Item = I>,
        I: IntoIterator<Item = V>,
        V: Borrow<Value>,
    {
        for row in rows {
            self.write_row(row).await?;
        }
        Ok(())
    }

    async fn flush_buffer(&mut self) -> Result<()> {
        let buffer = self.encoder.get_mut().get_mut();
        if buffer.is_empty() {
            return Ok(());
        }
        let Some(dest) = self.dest.as_mut() else {
            return Err(TableTransferError::Finished);
        };
        dest.write_all(buffer).await?;
        let len = buffer.len();
        buffer.clear();

        self.bytes_flushed += len as u64;
        tracing::trace!(bytes = len, total = self.bytes_flushed, "Flushed table buffer");
        Ok(())
    }

    /// Terminate the table, flush everything, and return the destination.
    ///
    /// The final flush happens regardless of the threshold.
    pub async fn finish(mut self) -> Result<W> {
        self.encoder.end()?;
        self.flush_buffer().await?;
        let mut dest = self.dest.take().ok_or(TableTransferError::Finished)?;
        dest.flush().await?;
        Ok(dest)
    }
}

impl<W> Drop for AsyncTableWriter<W> {
    fn drop(&mut self) {
        if self.dest.is_some() {
            tracing::debug!(
                rows = self.encoder.rows_written(),
                buffered = self.encoder.get_ref().get_ref().len(),
                "Async table writer dropped before finish"
            );
        }
    }
}

/// Write a complete table to an async destination.
pub async fn write_table_async<W, T, I, V>(
    dest: W,
    schema: Schema,
    rows: T,
    config: WriterConfig,
) -> Result<W>
where
    W: AsyncWrite + Unpin,
    T: IntoIterator<Item = I>,
    I: IntoIterator<Item = V>,
    V: Borrow<Value>,
{
    let mut table = AsyncTableWriter::with_config(dest, schema, config)?;
    table.write_rows(rows).await?;
    table.finish().await
}

/// Write a complete table to an async destination, inferring column types
/// from the first row.
///
/// With no rows an empty table is written and `names` is ignored.
pub async fn write_table_inferred_async<W, T>(
    dest: W,
    rows: T,
    names: Option<Vec<String>>,
    config: WriterConfig,
) -> Result<W>
where
    W: AsyncWrite + Unpin,
    T: IntoIterator<Item = Vec<Value>>,
{
    let mut rows = rows.into_iter();
    let Some(first) = rows.next() else {
        return AsyncTableWriter::with_config(dest, Schema::empty(), config)?
            .finish()
            .await;
    };

    let schema = inferred_schema(&first, names)?;
    let mut table = AsyncTableWriter::with_config(dest, schema, config)?;
    table.write_row(first).await?;
    table.write_rows(rows).await?;
    table.finish().await
}
