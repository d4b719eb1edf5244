//! # KVX Core - Key/Value Schema Extraction Core Library
//!
//! This crate provides the foundational types, traits, and abstractions for
//! reconstructing relational and JSON-Schema views of flat key/value stores.
//! It defines the messaging system, operator interfaces, and configuration
//! structures used throughout the KVX ecosystem.
//!
//! ## Key Components
//!
//! - **Message System**: Type-safe batch passing between pipeline operators
//! - **Operator Traits**: Source, Transform, and Sink abstractions for building pipelines
//! - **Value Model**: A tagged variant covering every store value shape
//! - **Configuration**: INI store settings and YAML key-pattern tables
//! - **Error Handling**: Error taxonomy for pipeline operations
//!
//! ## Example Usage
//!
//! ```rust
//! use kvx_core::{KeyValue, Message, Source, Sink};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! // A pipeline passes batches of key/value pairs from a source,
//! // through transforms, into a sink.
//! # async fn example() -> anyhow::Result<()> {
//! let (tx, rx) = mpsc::channel::<Message<KeyValue>>(8);
//! let cancel = CancellationToken::new();
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod entity;
pub mod key;
pub mod table;
pub mod value;

pub use config::{ExtractorSettings, PatternSpec, PatternsSpec, StoreSettings};
pub use entity::{Attribute, EntityObject, SyntheticIds};
pub use key::{Components, KeyValue, ParsedKey, PatternLabel};
pub use table::{Column, ColumnType, ForeignKey, PrimaryKey, Table};
pub use value::Value;

/// Type alias for the sender side of a message channel between pipeline operators
pub type BatchTx<T> = mpsc::Sender<Message<T>>;

/// Type alias for the receiver side of a message channel between pipeline operators
pub type BatchRx<T> = mpsc::Receiver<Message<T>>;

/// Messages passed between pipeline operators
///
/// The payload type changes along the pipeline: the store adapter emits raw
/// key/value pairs, the parser emits classified keys, the assembler emits
/// entity objects. Every stage sees the same two message kinds.
#[derive(Debug, Clone)]
pub enum Message<T> {
    /// A batch of payload items
    Batch(Vec<T>),

    /// End-of-stream marker
    ///
    /// Signals that no more data will be sent through this channel. Sinks
    /// finalize and write their outputs only after observing this marker,
    /// so a cancelled pipeline never leaves partial files behind.
    Eos,
}

/// Error taxonomy for KVX pipeline operations
#[derive(Debug, thiserror::Error)]
pub enum KvxError {
    /// Missing config section, malformed pattern file, or an invalid
    /// pattern template. Fatal before any store access.
    #[error("config error: {0}")]
    Config(String),

    /// Store connection refused or key enumeration failure. Fatal.
    #[error("ingest error: {0}")]
    Ingest(String),

    /// Channel communication error
    ///
    /// Occurs when a message channel between operators is unexpectedly
    /// closed, typically indicating a downstream operator has failed.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Base trait for all pipeline operators
///
/// Provides basic metadata about the operator; used for logging and
/// diagnostics.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Returns the unique name/identifier of this operator
    fn name(&self) -> &str;
}

/// Trait for data source operators
///
/// Sources are the entry points of pipelines, responsible for enumerating
/// and fetching data from the backing store and converting it into the
/// internal message format.
#[async_trait]
pub trait Source<T: Send + 'static>: Operator {
    /// Run the source operator
    ///
    /// # Arguments
    /// * `tx` - Channel sender for publishing batches to downstream operators
    /// * `cancel` - Cancellation token for graceful shutdown
    async fn run(&mut self, tx: BatchTx<T>, cancel: CancellationToken) -> Result<()>;
}

/// Trait for data transformation operators
///
/// Transforms are the processing units of pipelines. Some are streaming
/// (key parsing), others are barriers that accumulate until end-of-stream
/// (entity assembly, instance grouping).
#[async_trait]
pub trait Transform<I: Send + 'static, O: Send + 'static>: Operator {
    /// Run the transform operator
    ///
    /// # Arguments
    /// * `rx` - Channel receiver for consuming input batches
    /// * `tx` - Channel sender for publishing transformed batches
    /// * `cancel` - Cancellation token for graceful shutdown
    async fn run(
        &mut self,
        rx: BatchRx<I>,
        tx: BatchTx<O>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// Trait for data sink operators
///
/// Sinks are the exit points of pipelines, responsible for writing the
/// reconstructed schemas to files once the stream is complete.
#[async_trait]
pub trait Sink<T: Send + 'static>: Operator {
    /// Run the sink operator
    ///
    /// # Arguments
    /// * `rx` - Channel receiver for consuming input batches
    /// * `cancel` - Cancellation token for graceful shutdown
    async fn run(&mut self, rx: BatchRx<T>, cancel: CancellationToken) -> Result<()>;
}
