//! Redis store adapter: enumerate keys, fetch typed values in pipelines,
//! normalize every pair.

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use kvx_core::{BatchTx, ExtractorSettings, KeyValue, KvxError, Message, Operator, Source, StoreSettings, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Sorted-set scores above this are geospatial encodings, not ranks.
const GEO_SCORE_LIMIT: f64 = 1e13;

/// The store's advertised value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreType {
    Str,
    List,
    Set,
    Hash,
    ZSet,
    Json,
    Unknown,
}

impl StoreType {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "string" => StoreType::Str,
            "list" => StoreType::List,
            "set" => StoreType::Set,
            "hash" => StoreType::Hash,
            "zset" => StoreType::ZSet,
            // RedisJSON reports its own module type.
            "ReJSON-RL" => StoreType::Json,
            _ => StoreType::Unknown,
        }
    }
}

/// Source operator reading an entire logical database.
///
/// Keys are collected with cursor-based `SCAN`, values fetched in pipelines
/// of `batch_size` commands (one `TYPE` probe round, one fetch round), and
/// the full pair list is emitted downstream sorted by key.
pub struct RedisSource {
    pub id: String,
    pub store: StoreSettings,
    pub database: i64,
    pub batch_size: usize,
}

impl RedisSource {
    pub fn new(id: String, store: StoreSettings, extractor: &ExtractorSettings) -> Self {
        Self {
            id,
            store,
            database: extractor.database,
            batch_size: extractor.batch_size.max(1),
        }
    }

    pub fn with_database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    fn url(&self) -> String {
        format!(
            "redis://{}:{}/{}",
            self.store.host, self.store.port, self.database
        )
    }

    async fn collect_keys(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("COUNT")
                .arg(self.batch_size)
                .query_async(conn)
                .await
                .map_err(|e| KvxError::Ingest(format!("SCAN failed: {}", e)))?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }

    /// Fetch one batch of values: a pipeline of `TYPE` probes, then `MGET`
    /// for the string group and a pipeline of typed fetches for the rest.
    async fn fetch_batch(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        keys: &[String],
    ) -> Result<Vec<KeyValue>> {
        let mut probe = redis::pipe();
        for key in keys {
            probe.cmd("TYPE").arg(key);
        }
        let tags: Vec<String> = probe
            .query_async(conn)
            .await
            .map_err(|e| KvxError::Ingest(format!("TYPE probe failed: {}", e)))?;

        let mut string_keys: Vec<&String> = Vec::new();
        let mut other_keys: Vec<(&String, StoreType)> = Vec::new();
        for (key, tag) in keys.iter().zip(&tags) {
            match StoreType::from_tag(tag) {
                StoreType::Str => string_keys.push(key),
                other => other_keys.push((key, other)),
            }
        }

        let mut values: IndexMap<&String, Value> = IndexMap::new();

        if !string_keys.is_empty() {
            let fetched: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
                .arg(&string_keys)
                .query_async(conn)
                .await
                .map_err(|e| KvxError::Ingest(format!("MGET failed: {}", e)))?;
            for (key, bytes) in string_keys.iter().zip(fetched) {
                values.insert(*key, decode_string(key, bytes));
            }
        }

        if !other_keys.is_empty() {
            let mut pipe = redis::pipe();
            for (key, store_type) in &other_keys {
                match store_type {
                    StoreType::List => pipe.cmd("LRANGE").arg(key).arg(0).arg(-1),
                    StoreType::Set => pipe.cmd("SMEMBERS").arg(key),
                    StoreType::Hash => pipe.cmd("HGETALL").arg(key),
                    StoreType::ZSet => {
                        pipe.cmd("ZRANGE").arg(key).arg(0).arg(-1).arg("WITHSCORES")
                    }
                    StoreType::Json => pipe.cmd("JSON.GET").arg(key).arg("$"),
                    // Alignment no-op keeping results zipped with keys.
                    _ => pipe.cmd("EXISTS").arg(key),
                };
            }
            let fetched: Vec<redis::Value> = pipe
                .query_async(conn)
                .await
                .map_err(|e| KvxError::Ingest(format!("value pipeline failed: {}", e)))?;
            for ((key, store_type), raw) in other_keys.iter().zip(fetched) {
                values.insert(*key, decode_typed(key, *store_type, raw));
            }
        }

        // Re-emit in the order the keys were given.
        Ok(keys
            .iter()
            .map(|key| {
                let value = values.shift_remove(key).unwrap_or(Value::Null);
                KeyValue::new(key.clone(), value)
            })
            .collect())
    }
}

/// Decode a plain string value. Unprintable payloads (bitmaps, bitstreams,
/// hyperloglogs) carry no schema information and demote to null.
fn decode_string(key: &str, bytes: Option<Vec<u8>>) -> Value {
    let Some(bytes) = bytes else {
        return Value::Null;
    };
    match String::from_utf8(bytes) {
        Ok(text) => {
            if text.chars().any(char::is_control) {
                warn!(key, "unprintable string value");
                Value::Null
            } else {
                Value::normalize(&text)
            }
        }
        Err(_) => {
            warn!(key, "binary string value");
            Value::Null
        }
    }
}

fn decode_typed(key: &str, store_type: StoreType, raw: redis::Value) -> Value {
    let decoded = match store_type {
        StoreType::List => redis::from_redis_value::<Vec<String>>(&raw)
            .map(|items| Value::List(items.into_iter().map(Value::Str).collect())),
        StoreType::Set => redis::from_redis_value::<Vec<String>>(&raw)
            .map(|items| Value::Set(items.into_iter().map(Value::Str).collect())),
        StoreType::Hash => redis::from_redis_value::<Vec<(String, String)>>(&raw).map(|fields| {
            Value::Map(
                fields
                    .into_iter()
                    .map(|(name, value)| (name, Value::Str(value)))
                    .collect(),
            )
        }),
        StoreType::ZSet => {
            redis::from_redis_value::<Vec<(String, f64)>>(&raw).map(|members| {
                if members.iter().any(|(_, score)| *score > GEO_SCORE_LIMIT) {
                    // Geospatial encodings masquerade as sorted sets.
                    Value::Null
                } else {
                    Value::List(
                        members
                            .into_iter()
                            .map(|(member, _)| Value::Str(member))
                            .collect(),
                    )
                }
            })
        }
        StoreType::Json => redis::from_redis_value::<String>(&raw).map(|text| decode_json_root(&text)),
        _ => Ok(Value::Null),
    };

    match decoded {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = %e, "value decode failed");
            Value::Null
        }
    }
}

/// A root-path JSON fetch always wraps the document in a one-element list.
fn decode_json_root(text: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Array(mut wrapper)) if wrapper.len() == 1 => {
            Value::from_json(wrapper.remove(0))
        }
        Ok(document) => Value::from_json(document),
        Err(_) => Value::Null,
    }
}

#[async_trait]
impl Operator for RedisSource {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Source<KeyValue> for RedisSource {
    async fn run(&mut self, tx: BatchTx<KeyValue>, cancel: CancellationToken) -> Result<()> {
        let client = redis::Client::open(self.url())
            .map_err(|e| KvxError::Ingest(format!("invalid store url: {}", e)))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                KvxError::Ingest(format!(
                    "connection to {}:{} failed: {}",
                    self.store.host, self.store.port, e
                ))
            })?;

        info!(
            host = %self.store.host,
            port = self.store.port,
            db = self.database,
            "connected to store"
        );

        let keys = self.collect_keys(&mut conn, &cancel).await?;
        info!(keys = keys.len(), "collected keys");

        let mut pairs: Vec<KeyValue> = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                return Ok(());
            }
            pairs.extend(self.fetch_batch(&mut conn, chunk).await?);
        }

        pairs.sort_by(|a, b| a.key.cmp(&b.key));

        for chunk in pairs.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if tx.send(Message::Batch(chunk.to_vec())).await.is_err() {
                break;
            }
        }
        let _ = tx.send(Message::Eos).await; // best-effort

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_type_tags_map_to_json() {
        assert_eq!(StoreType::from_tag("ReJSON-RL"), StoreType::Json);
        assert_eq!(StoreType::from_tag("string"), StoreType::Str);
        assert_eq!(StoreType::from_tag("stream"), StoreType::Unknown);
    }

    #[test]
    fn unprintable_strings_demote_to_null() {
        assert_eq!(decode_string("k", Some(b"\x00\x01".to_vec())), Value::Null);
        assert_eq!(
            decode_string("k", Some(b"with\nnewline".to_vec())),
            Value::Null
        );
        assert_eq!(
            decode_string("k", Some(b"plain".to_vec())),
            Value::Str("plain".into())
        );
        assert_eq!(decode_string("k", None), Value::Null);
    }

    #[test]
    fn json_root_wrapper_is_unwrapped() {
        let value = decode_json_root(r#"[{"a": 1}]"#);
        match value {
            Value::Map(map) => assert_eq!(map.get("a"), Some(&Value::Int(1))),
            other => panic!("expected map, got {:?}", other),
        }
    }
}
