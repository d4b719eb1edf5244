//! Merged JSON-Schema sink.

use anyhow::{Context, Result};
use async_trait::async_trait;
use kvx_core::{BatchRx, Message, Operator, Sink};
use kvx_tx::schema_json;
use serde_json::{json, Map, Value as JsonValue};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Consumes materialized entity instances, groups their schema variants,
/// and writes the merged schema once the stream ends.
pub struct JsonSchemaSink {
    id: String,
    output: PathBuf,
    /// When set, the per-entity `(variant, count)` list is written here too.
    variations_output: Option<PathBuf>,
}

impl JsonSchemaSink {
    pub fn new(id: String, output: PathBuf, variations_output: Option<PathBuf>) -> Self {
        Self {
            id,
            output,
            variations_output,
        }
    }

    fn finalize(&self, objects: &[JsonValue]) -> Result<()> {
        let mut schemas = Vec::with_capacity(objects.len());
        for object in objects {
            match schema_json::extract_schema(object) {
                Some(entry) => schemas.push(entry),
                None => warn!("skipping instance with no entity"),
            }
        }

        let grouped = schema_json::group_variations(schemas);

        let mut properties = Map::new();
        for (entity, variants) in &grouped {
            properties.insert(entity.clone(), schema_json::combine_variations(variants));
        }
        let merged = json!({"type": "object", "properties": properties});

        write_json(&self.output, &merged)?;
        info!(path = %self.output.display(), entities = grouped.len(), "wrote merged schema");

        if let Some(path) = &self.variations_output {
            let mut by_entity = Map::new();
            for (entity, variants) in &grouped {
                let entries: Vec<JsonValue> = variants
                    .iter()
                    .map(|(schema, count)| json!([schema, count]))
                    .collect();
                by_entity.insert(entity.clone(), JsonValue::Array(entries));
            }
            write_json(path, &JsonValue::Object(by_entity))?;
            info!(path = %path.display(), "wrote schema variations");
        }

        Ok(())
    }
}

fn write_json(path: &PathBuf, value: &JsonValue) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl Operator for JsonSchemaSink {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Sink<JsonValue> for JsonSchemaSink {
    async fn run(&mut self, mut rx: BatchRx<JsonValue>, cancel: CancellationToken) -> Result<()> {
        let mut objects: Vec<JsonValue> = Vec::new();

        while let Some(msg) = rx.recv().await {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match msg {
                Message::Batch(batch) => objects.extend(batch),
                Message::Eos => {
                    self.finalize(&objects)?;
                    break;
                }
            }
        }
        Ok(())
    }
}
