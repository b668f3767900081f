//! Pipe demo - stream a table through an in-memory duplex pipe.
//!
//! The producer task encodes rows with [`AsyncTableWriter`] while the
//! consumer collects the bytes and decodes them with [`TableReader`].
//!
//! ```text
//! cargo run --example pipe
//! ```

use chrono::{SubsecRound, Utc};
use tabletransfer::{
    AsyncTableWriter, Kind, Schema, TableReader, Value, WireType, WriterConfig,
};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

#[tokio::main]
async fn main() -> tabletransfer::Result<()> {
    let schema = Schema::with_names(
        vec![
            WireType::new(Kind::UInt32),
            WireType::nullable(Kind::String),
            WireType::new(Kind::Timestamp),
        ],
        vec!["index".into(), "label".into(), "created".into()],
    )?;

    let (producer, mut consumer) = duplex(4096);

    let writer = tokio::spawn(async move {
        let config = WriterConfig {
            flush_threshold: 1024,
            ..WriterConfig::default()
        };
        let mut table = AsyncTableWriter::with_config(producer, schema, config)?;
        for i in 0..10u32 {
            let label = (i % 3 != 0).then(|| format!("item {i}"));
            // timestamps travel in 100 ns ticks
            let created = Utc::now().trunc_subsecs(6);
            table
                .write_row([Value::UInt32(i), Value::from(label), Value::from(created)])
                .await?;
        }
        let mut producer = table.finish().await?;
        producer.shutdown().await?;
        Ok::<_, tabletransfer::TableTransferError>(())
    });

    let mut bytes = Vec::new();
    consumer.read_to_end(&mut bytes).await?;
    writer.await.map_err(std::io::Error::other)??;

    let reader = TableReader::open(bytes.as_slice())?;
    let names = reader.schema().names().unwrap_or_default().join(", ");
    println!("columns: {names}");
    for row in reader {
        println!("{:?}", row?);
    }
    Ok(())
}
