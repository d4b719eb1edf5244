//! Relational DDL sink.

use anyhow::{Context, Result};
use async_trait::async_trait;
use kvx_core::{BatchRx, EntityObject, Message, Operator, Sink};
use kvx_tx::relational;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Consumes assembled entity instances and writes `CREATE TABLE` statements
/// once the stream ends. Statements are also echoed to stdout.
pub struct SqlSink {
    id: String,
    output: PathBuf,
    threshold: u32,
}

impl SqlSink {
    pub fn new(id: String, output: PathBuf, threshold: u32) -> Self {
        Self {
            id,
            output,
            threshold,
        }
    }

    fn finalize(&self, objects: &[EntityObject]) -> Result<()> {
        let tables = relational::generate_relational_model(objects, self.threshold);
        let statements = relational::generate_sql_schema(&tables);

        for statement in &statements {
            println!("{}", statement);
        }

        std::fs::write(&self.output, statements.join("\n\n"))
            .with_context(|| format!("write {}", self.output.display()))?;
        info!(
            path = %self.output.display(),
            tables = tables.len(),
            "wrote relational schema"
        );
        Ok(())
    }
}

#[async_trait]
impl Operator for SqlSink {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Sink<EntityObject> for SqlSink {
    async fn run(
        &mut self,
        mut rx: BatchRx<EntityObject>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut objects: Vec<EntityObject> = Vec::new();

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
