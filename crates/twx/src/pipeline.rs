// ai
//! 🚰 The Pipeline: fetch, decode, normalize, index, dead-letter. Once per object.
//!
//! ```text
//!  ObjectRef ──▶ Source::fetch ──▶ decode_object   ──▶ TweetNormalizer ──▶ BulkIndexer
//!      │              │ 💀               │ 💀               │ 💀 per record    │ 💀 per doc / batch
//!      │              ▼                  ▼                  ▼                  ▼
//!      └──────────────────────────── dead letters, flushed once per object ──────────▶ DLQ
//! ```
//!
//! 🧠 Knowledge graph:
//! - Built once per process, shared by every invocation (`Arc<Pipeline>` in the lambda).
//! - Objects run one after another. A failure at any stage stops *that* object only.
//! - Nothing escapes [`Pipeline::process`]. Every failure is logged, counted in the
//!   [`InvocationReport`], and dead-lettered when there is something worth keeping.
//! - A dead-letter write failure is logged and swallowed. The DLQ is the last resort,
//!   there is no last-last resort.

use anyhow::Result;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::backends::{DeadLetter, DeadLetterBackend, DeadLetterQueue, Source, SourceBackend};
use crate::common::{ObjectRef, TweetDocument};
use crate::error::PipelineError;
use crate::indexer::BulkIndexer;
use crate::report::{InvocationReport, ObjectOutcome};
use crate::transforms::{TweetNormalizer, decode_object};

/// 🚰 Everything one invocation needs, injected at construction.
#[derive(Debug)]
pub struct Pipeline {
    source: SourceBackend,
    normalizer: TweetNormalizer,
    indexer: BulkIndexer,
    dead_letter: DeadLetterBackend,
}

impl Pipeline {
    pub fn new(
        source: SourceBackend,
        normalizer: TweetNormalizer,
        indexer: BulkIndexer,
        dead_letter: DeadLetterBackend,
    ) -> Self {
        Self {
            source,
            normalizer,
            indexer,
            dead_letter,
        }
    }

    /// 🚀 Process every object, no deadline.
    pub async fn process(&self, objects: &[ObjectRef]) -> InvocationReport {
        self.process_until(objects, None).await
    }

    /// 🚀 Process every object. Index retries will not sleep past `deadline`.
    pub async fn process_until(&self, objects: &[ObjectRef], deadline: Option<Instant>) -> InvocationReport {
        info!("🚰 processing {} objects", objects.len());
        let mut report = InvocationReport::default();
        for object in objects {
            report.objects.push(self.process_object(object, deadline).await);
        }
        let totals = report.totals();
        info!(
            "✅ invocation done: {} objects ({} failed), {} records, {} indexed, {} dead-lettered",
            totals.objects, totals.failed_objects, totals.records_seen, totals.indexed, totals.dead_lettered
        );
        report
    }

    async fn process_object(&self, object: &ObjectRef, deadline: Option<Instant>) -> ObjectOutcome {
        let mut outcome = ObjectOutcome::new(object.clone());
        let mut letters = Vec::new();
        self.run_stages(object, deadline, &mut outcome, &mut letters).await;

        outcome.dead_lettered = letters.len();
        if !letters.is_empty() {
            if let Err(err) = self.dead_letter.send(object, letters).await {
                error!("💀 dead letters for {object} were lost: {err:#}");
                outcome.errors.push(format!("dead letter write failed: {err:#}"));
            }
        }
        outcome
    }

    async fn run_stages(
        &self,
        object: &ObjectRef,
        deadline: Option<Instant>,
        outcome: &mut ObjectOutcome,
        letters: &mut Vec<DeadLetter>,
    ) {
        let origin = object.to_string();

        // 🪣 fetch
        let content = match self.source.fetch(object).await {
            Ok(content) => content,
            Err(err) => {
                let failure = PipelineError::Fetch { origin, message: format!("{err:#}") };
                error!("💀 {failure}");
                letters.push(DeadLetter::new(failure.stage(), object, failure.to_string(), Value::Null));
                outcome.fail(failure.to_string());
                return;
            }
        };

        // 🧩 decode
        let records = match decode_object(&object.key, &content) {
            Ok(records) => records,
            Err(err) => {
                let failure = PipelineError::Parse { origin, message: format!("{err:#}") };
                error!("💀 {failure}");
                let raw = Value::String(String::from_utf8_lossy(&content).into_owned());
                letters.push(DeadLetter::new(failure.stage(), object, failure.to_string(), raw));
                outcome.fail(failure.to_string());
                return;
            }
        };
        outcome.records_seen = records.len();

        // 🐦 normalize, one record at a time, casualties set aside
        let mut documents: Vec<TweetDocument> = Vec::with_capacity(records.len());
        for (position, raw) in records.into_iter().enumerate() {
            match self.normalizer.normalize(&raw) {
                Ok(document) => documents.push(document),
                Err(source) => {
                    let failure = PipelineError::Normalize { origin: origin.clone(), position, source };
                    warn!("⚠️ {failure}");
                    letters.push(DeadLetter::new(failure.stage(), object, failure.to_string(), raw));
                    outcome.normalize_failures += 1;
                    outcome.wound(failure.to_string());
                }
            }
        }
        outcome.normalized = documents.len();
        info!(
            "🐦 {object}: {} records, {} documents, {} normalization failures",
            outcome.records_seen, outcome.normalized, outcome.normalize_failures
        );

        // 📦 index
        match self.indexer.index_until(&documents, deadline).await {
            Ok(index_report) => {
                outcome.indexed = index_report.indexed;
                for failed in index_report.failed {
                    let payload = serde_json::to_value(&failed.document).unwrap_or(Value::Null);
                    outcome.wound(format!("document {} not indexed: {}", failed.document.id, failed.reason));
                    letters.push(DeadLetter::new("index", object, failed.reason, payload));
                }
            }
            Err(err) => {
                let failure = PipelineError::Index { origin, message: format!("{err:#}") };
                error!("💀 {failure}");
                for document in &documents {
                    let payload = serde_json::to_value(document).unwrap_or(Value::Null);
                    letters.push(DeadLetter::new(failure.stage(), object, failure.to_string(), payload));
                }
                outcome.fail(failure.to_string());
            }
        }
    }

    pub fn index_name(&self) -> &str {
        self.indexer.index_name()
    }

    /// 🗑️ Close the sink on the way out.
    pub async fn close(&self) -> Result<()> {
        self.indexer.close().await
    }
}
