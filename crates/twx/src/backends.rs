// ai
//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 Sources hand over the raw buffered bytes, Sinks talk to the search engine,
//! and the dead-letter queue catches whatever fell off the truck in between.
//!
//! 🎭 This module is the casting agency. Need the batch from S3? From a local file?
//! From a HashMap pretending to be a bucket? We've got a backend for that.
//!
//! # Knowledge Graph 🧠
//! - Pattern: trait → concrete impls → `*Backend` enum that dispatches with a `match`.
//! - Every method takes `&self`: one pipeline is built at cold start and shared by
//!   every invocation through an `Arc`. Backends that keep state keep it behind a Mutex.
//! - [`Source`]: `fetch(object)` → raw bytes. No parsing.
//! - [`Sink`]: index lifecycle (`index_exists`, `create_index`, `put_mapping`) plus
//!   `send(payload)` for one rendered `_bulk` body. Returns the per-item verdicts
//!   and leaves retry decisions to the indexer.
//! - [`DeadLetterQueue`]: `send(origin, letters)`, one call per object.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::common::ObjectRef;
use crate::error::{SubmitError, is_retryable_status};

pub mod elasticsearch;
pub mod file;
pub mod in_mem;
pub mod s3;

pub use elasticsearch::{ElasticsearchConfig, ElasticsearchSink};
pub use file::{FileDeadLetter, FileDeadLetterConfig, FileSource};
pub use in_mem::{InMemoryDeadLetter, InMemorySink, InMemorySource};
pub use s3::{S3DeadLetter, S3DeadLetterConfig, S3Source, StorageConfig};

// ===== Source Trait and Backend Enum =====

/// 🚰 Something that can hand over the bytes of one buffered object.
///
/// # Contract
/// - Returns the object exactly as stored. Gzip, trailing commas and all.
/// - A missing object is an `Err`, not an empty vec. Empty vec means an empty object.
#[async_trait]
pub trait Source: std::fmt::Debug + Send + Sync {
    async fn fetch(&self, object: &ObjectRef) -> Result<Vec<u8>>;
}

/// 🎭 The many faces of a Source. Callers never need to know where the bytes came from.
#[derive(Debug)]
pub enum SourceBackend {
    S3(S3Source),
    File(FileSource),
    InMemory(InMemorySource),
}

#[async_trait]
impl Source for SourceBackend {
    async fn fetch(&self, object: &ObjectRef) -> Result<Vec<u8>> {
        match self {
            SourceBackend::S3(source) => source.fetch(object).await,
            SourceBackend::File(source) => source.fetch(object).await,
            SourceBackend::InMemory(source) => source.fetch(object).await,
        }
    }
}

// ===== Sink Trait and Backend Enum =====

/// 🕳️ The search engine, as far as the indexer is concerned.
///
/// Sinks are I/O only. They do not chunk, do not retry, and do not transform.
/// Chunking and retries live in the indexer. Transforming lives in the composer.
///
/// # Contract 📜
/// - `send` returns `Err(SubmitError)` when the request as a whole failed, and
///   `Ok(BulkResponse)` otherwise, even if every single item inside it failed.
/// - `close` MUST be called before the process exits. Skipping it is rude.
#[async_trait]
pub trait Sink: std::fmt::Debug + Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool>;
    async fn create_index(&self, index: &str, body: &Value) -> Result<()>;
    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()>;
    /// 📡 Send one fully rendered NDJSON `_bulk` body.
    async fn send(&self, payload: String) -> std::result::Result<BulkResponse, SubmitError>;
    /// 🗑️ Flush, finalize, and release.
    async fn close(&self) -> Result<()>;
}

/// 🎭 The many faces of a Sink.
#[derive(Debug)]
pub enum SinkBackend {
    Elasticsearch(ElasticsearchSink),
    InMemory(InMemorySink),
}

#[async_trait]
impl Sink for SinkBackend {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.index_exists(index).await,
            SinkBackend::InMemory(sink) => sink.index_exists(index).await,
        }
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.create_index(index, body).await,
            SinkBackend::InMemory(sink) => sink.create_index(index, body).await,
        }
    }

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()> {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.put_mapping(index, mapping).await,
            SinkBackend::InMemory(sink) => sink.put_mapping(index, mapping).await,
        }
    }

    async fn send(&self, payload: String) -> std::result::Result<BulkResponse, SubmitError> {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.send(payload).await,
            SinkBackend::InMemory(sink) => sink.send(payload).await,
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.close().await,
            SinkBackend::InMemory(sink) => sink.close().await,
        }
    }
}

// ===== Bulk response =====

/// 📬 What `_bulk` says back. `errors` is a hint, `items` is the truth.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

/// 📄 One entry of `items`: a single-key object named after the action.
/// We only ever send `index`, but the cluster is allowed its own opinions.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BulkItem {
    #[serde(alias = "create", alias = "update", alias = "delete")]
    pub index: BulkItemResult,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BulkItemResult {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl BulkItemResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 🔄 429 and 5xx get another go. A mapping conflict will still be a mapping conflict tomorrow.
    pub fn is_retryable(&self) -> bool {
        !self.is_success() && is_retryable_status(self.status)
    }

    /// 📝 `type: reason` when the engine explained itself, just the status otherwise.
    pub fn reason(&self) -> String {
        match &self.error {
            Some(error) => {
                let kind = error.get("type").and_then(Value::as_str).unwrap_or("unknown");
                let reason = error.get("reason").and_then(Value::as_str).unwrap_or("");
                format!("status {}: {kind}: {reason}", self.status)
            }
            None => format!("status {}", self.status),
        }
    }
}

impl BulkItem {
    /// 🏗️ Shorthand for the in-memory engine and the tests.
    pub fn new(id: impl Into<String>, status: u16, error: Option<Value>) -> Self {
        Self {
            index: BulkItemResult {
                id: Some(id.into()),
                status,
                error,
            },
        }
    }
}

// ===== Dead letters =====

/// ⚰️ One thing that did not make it, and why.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeadLetter {
    /// 🏷️ `fetch`, `parse`, `normalize` or `index`.
    pub stage: &'static str,
    #[serde(flatten)]
    pub origin: ObjectRef,
    pub reason: String,
    /// 📦 The raw record, the document, the raw content, or null when there was nothing to keep.
    pub payload: Value,
}

impl DeadLetter {
    pub fn new(stage: &'static str, origin: &ObjectRef, reason: impl Into<String>, payload: Value) -> Self {
        Self {
            stage,
            origin: origin.clone(),
            reason: reason.into(),
            payload,
        }
    }
}

/// 🧾 NDJSON rendering shared by the file and S3 queues. One letter per line, trailing `\n`.
pub(crate) fn render_dead_letters(letters: &[DeadLetter]) -> Result<String> {
    let mut rendered = String::new();
    for letter in letters {
        rendered.push_str(&serde_json::to_string(letter)?);
        rendered.push('\n');
    }
    Ok(rendered)
}

/// ⚰️ Where failed records go to be looked at later. Or never. But at least they could be.
///
/// # Contract 📜
/// - Called once per object, with every letter that object produced.
/// - Failing to write is an `Err` the pipeline logs and swallows. It never fails the batch.
#[async_trait]
pub trait DeadLetterQueue: std::fmt::Debug + Send + Sync {
    async fn send(&self, origin: &ObjectRef, letters: Vec<DeadLetter>) -> Result<()>;
}

/// 🎭 The many faces of a dead-letter queue. `Disabled` logs and lets go.
#[derive(Debug)]
pub enum DeadLetterBackend {
    S3(S3DeadLetter),
    File(FileDeadLetter),
    InMemory(InMemoryDeadLetter),
    Disabled,
}

#[async_trait]
impl DeadLetterQueue for DeadLetterBackend {
    async fn send(&self, origin: &ObjectRef, letters: Vec<DeadLetter>) -> Result<()> {
        match self {
            DeadLetterBackend::S3(queue) => queue.send(origin, letters).await,
            DeadLetterBackend::File(queue) => queue.send(origin, letters).await,
            DeadLetterBackend::InMemory(queue) => queue.send(origin, letters).await,
            DeadLetterBackend::Disabled => {
                for letter in &letters {
                    warn!(
                        stage = letter.stage,
                        origin = %origin,
                        "🗑️ dead letter dropped (no queue configured): {}",
                        letter.reason
                    );
                }
                Ok(())
            }
        }
    }
}
