//! # KVX Relational - Relational Model Generator
//!
//! Reads an entire key/value database, classifies keys through the labelled
//! pattern table, assembles entity instances, synthesizes tables with
//! primary/foreign keys, and writes `CREATE TABLE` DDL.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults: config.ini, patterns.yaml, db 3, threshold 75, schema.sql
//! kvx-relational
//!
//! # Pin the synthetic-id seed for reproducible runs
//! kvx-relational --db 0 --seed 42 --output out.sql
//! ```

use anyhow::Result;
use clap::Parser;
use kvx_core::config::load_settings;
use kvx_core::{Sink, Source, SyntheticIds, Transform};
use kvx_io::sink_sql::SqlSink;
use kvx_io::source_redis::RedisSource;
use kvx_tx::{AssembleTransform, KeyParseTransform, PatternTable};
use std::path::PathBuf;
use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for the relational model generator
#[derive(Parser, Debug)]
#[command(name = "kvx-relational")]
#[command(about = "Relational model generator for flat key/value stores")]
struct Args {
    /// Store connection settings (INI)
    #[arg(short, long, default_value = "config.ini")]
    config: PathBuf,

    /// Labelled key-pattern table (YAML)
    #[arg(short, long, default_value = "patterns.yaml")]
    patterns: PathBuf,

    /// Logical database index to extract
    #[arg(long, default_value_t = 3)]
    db: i64,

    /// Minimum similarity (0-100) to treat two names as related
    #[arg(long, default_value_t = 75)]
    threshold: u32,

    /// DDL output file
    #[arg(short, long, default_value = "schema.sql")]
    output: PathBuf,

    /// Seed for synthetic ids; omit for a random seed
    #[arg(long)]
    seed: Option<u64>,

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
    let table = PatternTable::load(&args.patterns)?;
    let ids = match args.seed {
        Some(seed) => SyntheticIds::seeded(seed),
        None => SyntheticIds::from_entropy(),
    };

    let cancel = CancellationToken::new();
    let (source_tx, parse_rx) = mpsc::channel(args.channel_capacity);
    let (parse_tx, assemble_rx) = mpsc::channel(args.channel_capacity);
    let (assemble_tx, sink_rx) = mpsc::channel(args.channel_capacity);

    let mut source =
        RedisSource::new("redis-source".to_string(), store, &extractor).with_database(args.db);
    let mut parse = KeyParseTransform::new("key-parse".to_string(), table, ids);
    let mut assemble = AssembleTransform::new("assemble".to_string());
    let mut sink = SqlSink::new("sql-schema".to_string(), args.output.clone(), args.threshold);

    let c_source = cancel.child_token();
    let source_handle = tokio::spawn(async move { source.run(source_tx, c_source).await });
    let c_parse = cancel.child_token();
    let parse_handle = tokio::spawn(async move { parse.run(parse_rx, parse_tx, c_parse).await });
    let c_assemble = cancel.child_token();
    let assemble_handle =
        tokio::spawn(async move { assemble.run(assemble_rx, assemble_tx, c_assemble).await });
    let c_sink = cancel.child_token();
    let sink_handle = tokio::spawn(async move { sink.run(sink_rx, c_sink).await });

    let pipeline = async {
        source_handle.await??;
        parse_handle.await??;
        assemble_handle.await??;
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
