//! # KVX Extract - JSON-Schema Extractor
//!
//! Reads an entire key/value database, groups keys into entity instances by
//! their inferred id path, infers one schema variant per instance, and
//! writes the merged JSON Schema.
//!
//! ## Usage
//!
//! ```bash
//! # Everything is driven by config.ini
//! kvx-extract
//!
//! # Point at a different config or output file
//! kvx-extract --config ./prod.ini --output ./prod_schema.json
//!
//! # Enable debug logging
//! RUST_LOG=debug kvx-extract
//! ```
//!
//! `config.ini` supplies the store connection (`[redis_connection]`) and the
//! extractor settings (`[extractor]`: database, batch_size,
//! export_variations).

use anyhow::Result;
use clap::Parser;
use kvx_core::config::load_settings;
use kvx_core::{Sink, Source, Transform};
use kvx_io::sink_schema::JsonSchemaSink;
use kvx_io::source_redis::RedisSource;
use kvx_tx::NestedObjectTransform;
use std::path::PathBuf;
use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for the JSON-Schema extractor
#[derive(Parser, Debug)]
#[command(name = "kvx-extract")]
#[command(about = "JSON-Schema extractor for flat key/value stores")]
struct Args {
    /// Store connection and extractor settings (INI)
    #[arg(short, long, default_value = "config.ini")]
    config: PathBuf,

    /// Merged schema output file
    #[arg(short, long, default_value = "output_schema.json")]
    output: PathBuf,

    /// Per-entity variations output file (written when the config enables
    /// export_variations)
    #[arg(long, default_value = "output_schema_variations.json")]
    variations_output: PathBuf,

    /// Buffer size for operator message channels
    #[arg(long, default_value_t = 8)]
    channel_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let (store, extractor) = load_settings(&args.config)?;

    let cancel = CancellationToken::new();
    let (source_tx, transform_rx) = mpsc::channel(args.channel_capacity);
    let (transform_tx, sink_rx) = mpsc::channel(args.channel_capacity);

    let mut source = RedisSource::new("redis-source".to_string(), store, &extractor);
    let mut transform = NestedObjectTransform::new("nested-objects".to_string());
    let variations = extractor
        .export_variations
        .then(|| args.variations_output.clone());
    let mut sink = JsonSchemaSink::new("json-schema".to_string(), args.output.clone(), variations);

    let c_source = cancel.child_token();
    let source_handle = tokio::spawn(async move { source.run(source_tx, c_source).await });
    let c_transform = cancel.child_token();
    let transform_handle =
        tokio::spawn(async move { transform.run(transform_rx, transform_tx, c_transform).await });
    let c_sink = cancel.child_token();
    let sink_handle = tokio::spawn(async move { sink.run(sink_rx, c_sink).await });

    let pipeline = async {
        source_handle.await??;
        transform_handle.await??;
        sink_handle.await??;
        anyhow::Ok(())
    };

    tokio::select! {
        _ = signal::ctrl_c() => {
            println!("\nReceived Ctrl-C, shutting down...");
            cancel.cancel();
            Ok(())
        }
        result = pipeline => result,
    }
}
