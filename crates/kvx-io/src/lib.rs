//! # KVX I/O - Store Adapter and Output Sinks
//!
//! This crate provides the concrete source and sink implementations for the
//! KVX pipeline.
//!
//! ## Source
//! - **Redis**: cursor-based key enumeration and pipelined, type-aware value
//!   fetching; every pair is normalized before it enters the pipeline
//!
//! ## Sinks
//! - **JSON Schema**: merged schema file plus optional per-entity variations
//! - **SQL**: relational model synthesis and `CREATE TABLE` DDL output
//!
//! Sinks only write after end-of-stream, so cancelled runs leave no partial
//! files behind.

/// Redis store adapter
pub mod source_redis;

/// Merged JSON-Schema file sink
pub mod sink_schema;

/// Relational DDL file sink
pub mod sink_sql;
