//! # KVX Transforms - Key Parsing and Assembly Operators
//!
//! This crate provides the processing stages of the KVX pipeline along with
//! the schema engines they feed:
//!
//! - **Key Parse**: classify keys via the labelled pattern table and flatten
//!   structured values into synthetic flat keys
//! - **Assemble**: group parsed pairs into entity instances (attributes,
//!   1:1 aggregates, aggregate arrays)
//! - **Nested Objects**: the JSON-Schema path's grouper, materializing one
//!   nested object per entity instance
//! - **JSON-Schema Engine**: per-instance inference, variant hashing, and
//!   variant combination
//! - **Relational Engine**: table/key synthesis, type voting, DDL emission
//!
//! The parse stage streams batch-by-batch; assembly and grouping are
//! barriers that emit once the stream ends, since instances may span
//! batches.

use anyhow::Result;
use async_trait::async_trait;
use kvx_core::{
    BatchRx, BatchTx, EntityObject, KeyValue, KvxError, Message, Operator, ParsedKey, SyntheticIds,
    Transform,
};
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod assemble;
pub mod fuzzy;
pub mod group;
pub mod parser;
pub mod relational;
pub mod schema_json;

pub use parser::PatternTable;

/// Streaming transform: classify raw pairs through the pattern table and
/// flatten structured values.
pub struct KeyParseTransform {
    id: String,
    table: PatternTable,
    ids: SyntheticIds,
}

impl KeyParseTransform {
    pub fn new(id: String, table: PatternTable, ids: SyntheticIds) -> Self {
        Self { id, table, ids }
    }
}

#[async_trait]
impl Operator for KeyParseTransform {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Transform<KeyValue, ParsedKey> for KeyParseTransform {
    async fn run(
        &mut self,
        mut rx: BatchRx<KeyValue>,
        tx: BatchTx<ParsedKey>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut synthetic_ids = 0usize;

        while let Some(msg) = rx.recv().await {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match msg {
                Message::Batch(pairs) => {
                    let parsed = parser::parse_pairs(pairs, &self.table, &mut self.ids);
                    synthetic_ids += parsed
                        .iter()
                        .filter(|p| p.components.synthetic_id)
                        .count();
                    if tx.send(Message::Batch(parsed)).await.is_err() {
                        return Err(KvxError::ChannelClosed("key-parse").into());
                    }
                }
                Message::Eos => {
                    if synthetic_ids > 0 {
                        warn!(count = synthetic_ids, "keys without a discoverable id");
                    }
                    let _ = tx.send(Message::Eos).await;
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Barrier transform: accumulate parsed pairs and assemble entity instances
/// at end-of-stream.
pub struct AssembleTransform {
    id: String,
}

impl AssembleTransform {
    pub fn new(id: String) -> Self {
        Self { id }
    }
}

#[async_trait]
impl Operator for AssembleTransform {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Transform<ParsedKey, EntityObject> for AssembleTransform {
    async fn run(
        &mut self,
        mut rx: BatchRx<ParsedKey>,
        tx: BatchTx<EntityObject>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut pending: Vec<ParsedKey> = Vec::new();

        while let Some(msg) = rx.recv().await {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match msg {
                Message::Batch(parsed) => pending.extend(parsed),
                Message::Eos => {
                    let objects = assemble::group_into_objects(std::mem::take(&mut pending));
                    info!(instances = objects.len(), "assembled entity instances");
                    if tx.send(Message::Batch(objects)).await.is_err() {
                        return Err(KvxError::ChannelClosed("assemble").into());
                    }
                    let _ = tx.send(Message::Eos).await;
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Barrier transform: group raw pairs by inferred id path and materialize
/// one nested object per entity instance at end-of-stream.
pub struct NestedObjectTransform {
    id: String,
}

impl NestedObjectTransform {
    pub fn new(id: String) -> Self {
        Self { id }
    }
}

#[async_trait]
impl Operator for NestedObjectTransform {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Transform<KeyValue, JsonValue> for NestedObjectTransform {
    async fn run(
        &mut self,
        mut rx: BatchRx<KeyValue>,
        tx: BatchTx<JsonValue>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut pending: Vec<KeyValue> = Vec::new();

        while let Some(msg) = rx.recv().await {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match msg {
                Message::Batch(pairs) => pending.extend(pairs),
                Message::Eos => {
                    let groups = group::group_pairs(std::mem::take(&mut pending));
                    info!(groups = groups.len(), "grouped pairs by id path");
                    let objects: Vec<JsonValue> = groups
                        .iter()
                        .map(|(key, members)| group::build_nested(key, members))
                        .collect();
                    if tx.send(Message::Batch(objects)).await.is_err() {
                        return Err(KvxError::ChannelClosed("nested-objects").into());
                    }
                    let _ = tx.send(Message::Eos).await;
                    break;
                }
            }
        }
        Ok(())
    }
}
