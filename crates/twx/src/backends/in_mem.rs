// ai
//! 🧠 In-memory backends: a bucket, a cluster and a dead-letter queue that live in RAM.
//!
//! Used by the tests, and by `twx-cli --dry-run` for when you want to see what *would*
//! happen without bothering a real cluster at 3am.
//!
//! 🔒 Everything is `Arc<tokio::sync::Mutex<..>>` and `Clone`, so a test can keep one
//! handle and give the other to the pipeline. Everyone shares the same state.
//! Communist data, but in a good way.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::trace;

use super::{BulkItem, BulkResponse, DeadLetter, DeadLetterQueue, Sink, Source};
use crate::common::ObjectRef;
use crate::error::SubmitError;

// ===== Source =====

/// 🪣 A bucket made of HashMap.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    objects: Arc<Mutex<HashMap<ObjectRef, Vec<u8>>>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, object: ObjectRef, content: impl Into<Vec<u8>>) {
        self.objects.lock().await.insert(object, content.into());
    }
}

#[async_trait]
impl Source for InMemorySource {
    async fn fetch(&self, object: &ObjectRef) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(object)
            .cloned()
            .with_context(|| format!("💀 No such object {object}. We checked every pocket of the HashMap."))
    }
}

// ===== Sink =====

/// 🔍 A very small search engine. Upserts by `_id`, keeps mappings, and fails on command.
///
/// Failures are scripted per `send` call, first in first out:
/// - [`InMemorySink::fail_next_request`] makes the whole request fail once.
/// - [`InMemorySink::fail_items_once`] makes specific ids fail with a status once.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    documents: Arc<Mutex<HashMap<String, Value>>>,
    indices: Arc<Mutex<HashMap<String, Value>>>,
    payloads: Arc<Mutex<Vec<String>>>,
    mapping_updates: Arc<Mutex<usize>>,
    refuse_mappings: Arc<Mutex<bool>>,
    request_failures: Arc<Mutex<VecDeque<SubmitError>>>,
    item_failures: Arc<Mutex<VecDeque<HashMap<String, u16>>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📦 Snapshot of the stored documents, keyed by `_id`.
    pub async fn documents(&self) -> HashMap<String, Value> {
        self.documents.lock().await.clone()
    }

    /// 📬 Every `_bulk` body received, in order. Retries included.
    pub async fn payloads(&self) -> Vec<String> {
        self.payloads.lock().await.clone()
    }

    pub async fn mapping_of(&self, index: &str) -> Option<Value> {
        self.indices.lock().await.get(index).cloned()
    }

    pub async fn mapping_updates(&self) -> usize {
        *self.mapping_updates.lock().await
    }

    /// 🙅 Every subsequent create/put-mapping call errors, like a cluster with a conflicting mapping.
    pub async fn refuse_mappings(&self) {
        *self.refuse_mappings.lock().await = true;
    }

    pub async fn fail_next_request(&self, error: SubmitError) {
        self.request_failures.lock().await.push_back(error);
    }

    pub async fn fail_items_once(&self, failures: impl IntoIterator<Item = (&str, u16)>) {
        let the_script = failures
            .into_iter()
            .map(|(id, status)| (id.to_string(), status))
            .collect();
        self.item_failures.lock().await.push_back(the_script);
    }

    async fn check_mappings_allowed(&self, index: &str) -> Result<()> {
        if *self.refuse_mappings.lock().await {
            anyhow::bail!("💀 illegal_argument_exception: mapper for [{index}] conflicts with existing mapping");
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.indices.lock().await.contains_key(index))
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        self.check_mappings_allowed(index).await?;
        let the_mapping = body.get("mappings").cloned().unwrap_or(Value::Null);
        self.indices.lock().await.insert(index.to_string(), the_mapping);
        Ok(())
    }

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()> {
        self.check_mappings_allowed(index).await?;
        self.indices.lock().await.insert(index.to_string(), mapping.clone());
        *self.mapping_updates.lock().await += 1;
        Ok(())
    }

    async fn send(&self, payload: String) -> std::result::Result<BulkResponse, SubmitError> {
        trace!("📬 in-memory engine received {} bytes", payload.len());
        self.payloads.lock().await.push(payload.clone());

        if let Some(error) = self.request_failures.lock().await.pop_front() {
            return Err(error);
        }
        let the_script = self.item_failures.lock().await.pop_front().unwrap_or_default();

        let mut the_lines = payload.lines();
        let mut the_items = Vec::new();
        let mut the_documents = self.documents.lock().await;
        while let Some(action_line) = the_lines.next() {
            let action: Value = serde_json::from_str(action_line)
                .map_err(|e| SubmitError::Rejected { status: 400, body: e.to_string() })?;
            let source_line = the_lines.next().ok_or_else(|| SubmitError::Rejected {
                status: 400,
                body: "action line without a source line".to_string(),
            })?;
            let source: Value = serde_json::from_str(source_line)
                .map_err(|e| SubmitError::Rejected { status: 400, body: e.to_string() })?;
            let id = action["index"]["_id"].as_str().unwrap_or_default().to_string();

            match the_script.get(&id) {
                Some(&status) => the_items.push(BulkItem::new(
                    id,
                    status,
                    Some(serde_json::json!({ "type": "scripted_failure", "reason": "told to fail" })),
                )),
                None => {
                    let status = if the_documents.insert(id.clone(), source).is_some() { 200 } else { 201 };
                    the_items.push(BulkItem::new(id, status, None));
                }
            }
        }

        Ok(BulkResponse {
            took: 0,
            errors: the_items.iter().any(|item| !item.index.is_success()),
            items: the_items,
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// ===== Dead letters =====

/// ⚰️ A dead-letter queue you can read back.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDeadLetter {
    letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl InMemoryDeadLetter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().await.clone()
    }
}

#[async_trait]
impl DeadLetterQueue for InMemoryDeadLetter {
    async fn send(&self, _origin: &ObjectRef, letters: Vec<DeadLetter>) -> Result<()> {
        self.letters.lock().await.extend(letters);
        Ok(())
    }
}
