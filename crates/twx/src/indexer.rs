// ai
//! 📦 The Bulk Indexer: makes sure the index exists, cuts the batch into chunks,
//! and keeps asking politely until every document landed or ran out of chances.
//!
//! 🎬 COLD OPEN - INT. CLUSTER LOADING DOCK - EVERY FEW MINUTES
//!
//! A few thousand tweets arrive. The dock takes a thousand at a time. Some get stamped
//! "201", some get "429 come back later", and one gets "400, your timestamp is a poem".
//! The first kind go home. The second kind get back in line, alone, after a nap.
//! The third kind go to the dead-letter office. Nobody gets silently dropped.
//!
//! 🧠 Knowledge graph:
//! - `ensure_index`: HEAD → create with the mapping, or re-apply it with put-mapping.
//! - `chunk_documents`: contiguous, ordered, the last one may be short.
//! - Per chunk: compose NDJSON → `sink.send` → sort items into indexed / retry / failed.
//!   Only the retry subset is resubmitted. Whole-request failures retry the whole pending set.
//! - Upsert by `_id` means a resubmitted document can never become a duplicate.

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backends::{BulkResponse, Sink, SinkBackend};
use crate::common::TweetDocument;
use crate::composers::{Composer, NdjsonComposer};
use crate::error::SubmitError;
use crate::mapping::{create_index_body, index_mapping};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::transforms::ElasticsearchBulk;

/// ⚰️ A document that did not make it, with the last thing the engine said about it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailedDocument {
    pub document: TweetDocument,
    pub reason: String,
}

/// 📊 How one `index` call went.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct IndexReport {
    pub indexed: usize,
    pub chunks: usize,
    /// 🔄 Resubmissions across all chunks. First attempts are not counted.
    pub retries: usize,
    pub failed: Vec<FailedDocument>,
}

/// ✂️ Contiguous chunks of at most `chunk_size` documents, in order.
pub fn chunk_documents(documents: &[TweetDocument], chunk_size: usize) -> std::slice::Chunks<'_, TweetDocument> {
    documents.chunks(chunk_size.max(1))
}

/// 📦 Owns the sink and knows which index to aim at.
#[derive(Debug)]
pub struct BulkIndexer {
    sink: SinkBackend,
    index: String,
    chunk_size: usize,
    retry: RetryConfig,
}

impl BulkIndexer {
    pub fn new(sink: SinkBackend, index: impl Into<String>, chunk_size: usize, retry: RetryConfig) -> Self {
        Self {
            sink,
            index: index.into(),
            chunk_size: chunk_size.max(1),
            retry,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// 🏗️ Create the index with the mapping if it is missing, otherwise re-apply the mapping.
    pub async fn ensure_index(&self) -> Result<()> {
        let exists = self
            .sink
            .index_exists(&self.index)
            .await
            .with_context(|| format!("💀 Could not tell whether index '{}' exists", self.index))?;
        if exists {
            debug!("🗺️ index '{}' exists, re-applying the mapping", self.index);
            self.sink.put_mapping(&self.index, &index_mapping()).await
        } else {
            info!("🏗️ creating index '{}'", self.index);
            self.sink.create_index(&self.index, &create_index_body()).await
        }
    }

    /// 🚀 Index everything, with no deadline on retries.
    pub async fn index(&self, documents: &[TweetDocument]) -> Result<IndexReport> {
        self.index_until(documents, None).await
    }

    /// 🚀 Index everything. Retries stop early rather than sleep past `deadline`.
    ///
    /// `Err` only when the index lifecycle step failed, in which case nothing was sent.
    /// Everything that goes wrong after that is reported per document in [`IndexReport::failed`].
    pub async fn index_until(&self, documents: &[TweetDocument], deadline: Option<Instant>) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        if documents.is_empty() {
            return Ok(report);
        }
        self.ensure_index().await?;

        let policy = RetryPolicy::new(self.retry.clone()).with_deadline(deadline);
        let total_chunks = documents.len().div_ceil(self.chunk_size);
        for (ctr, chunk) in chunk_documents(documents, self.chunk_size).enumerate() {
            info!(
                "📦 loading chunk {} of {} ({} documents) into '{}'",
                ctr + 1,
                total_chunks,
                chunk.len(),
                self.index
            );
            self.index_chunk(chunk, &policy, &mut report).await;
            report.chunks += 1;
        }
        Ok(report)
    }

    async fn index_chunk(&self, chunk: &[TweetDocument], policy: &RetryPolicy, report: &mut IndexReport) {
        let mut pending: Vec<&TweetDocument> = chunk.iter().collect();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let payload = match NdjsonComposer.compose::<ElasticsearchBulk>(&pending, &self.index) {
                Ok(payload) => payload,
                Err(err) => {
                    fail_all(report, &pending, &format!("{err:#}"));
                    return;
                }
            };

            let outcome = self
                .sink
                .send(payload)
                .await
                .and_then(|response| check_alignment(response, pending.len()));

            match outcome {
                Ok(response) => {
                    let mut retry_next = Vec::new();
                    let mut last_reason = String::new();
                    for (doc, item) in pending.iter().zip(&response.items) {
                        let item = &item.index;
                        if item.is_success() {
                            report.indexed += 1;
                        } else if item.is_retryable() {
                            last_reason = item.reason();
                            retry_next.push(*doc);
                        } else {
                            warn!("⚰️ document {} rejected for good: {}", doc.id, item.reason());
                            report.failed.push(FailedDocument {
                                document: (*doc).clone(),
                                reason: item.reason(),
                            });
                        }
                    }
                    if retry_next.is_empty() {
                        return;
                    }
                    if !policy.backoff(attempts).await {
                        warn!("⚰️ {} documents still failing after {attempts} attempts", retry_next.len());
                        fail_all(report, &retry_next, &last_reason);
                        return;
                    }
                    debug!("🔄 resubmitting {} of {} documents", retry_next.len(), pending.len());
                    report.retries += 1;
                    pending = retry_next;
                }
                Err(err) => {
                    let reason = err.to_string();
                    if err.is_retryable() && policy.backoff(attempts).await {
                        warn!("🔄 bulk request failed, retrying: {reason}");
                        report.retries += 1;
                        continue;
                    }
                    warn!("⚰️ bulk request failed for {} documents: {reason}", pending.len());
                    fail_all(report, &pending, &reason);
                    return;
                }
            }
        }
    }

    /// 🗑️ Close the sink. Call it. Always.
    pub async fn close(&self) -> Result<()> {
        self.sink.close().await
    }
}

/// 🧮 One item per document, or the response is lying to us.
fn check_alignment(response: BulkResponse, expected: usize) -> std::result::Result<BulkResponse, SubmitError> {
    if response.items.len() == expected {
        Ok(response)
    } else {
        Err(SubmitError::BadResponse(format!(
            "expected {expected} items, got {}",
            response.items.len()
        )))
    }
}

fn fail_all(report: &mut IndexReport, documents: &[&TweetDocument], reason: &str) {
    report.failed.extend(documents.iter().map(|doc| FailedDocument {
        document: (*doc).clone(),
        reason: reason.to_string(),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemorySink;
    use crate::common::fixtures;

    fn the_quick_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            jitter: false,
        }
    }

    fn the_indexer(sink: &InMemorySink, chunk_size: usize) -> BulkIndexer {
        BulkIndexer::new(SinkBackend::InMemory(sink.clone()), "tweets", chunk_size, the_quick_retry())
    }

    #[test]
    fn the_one_where_2500_documents_become_1000_1000_500() {
        let the_docs = fixtures::documents(2500);
        let the_chunks: Vec<&[TweetDocument]> = chunk_documents(&the_docs, 1000).collect();
        assert_eq!(the_chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![1000, 1000, 500]);
        assert_eq!(the_chunks[1][0].id, "1000");
        assert_eq!(the_chunks[2][499].id, "2499");
    }

    #[tokio::test]
    async fn the_one_where_every_chunk_is_one_bulk_request() -> Result<()> {
        let the_sink = InMemorySink::new();
        let the_report = the_indexer(&the_sink, 1000).index(&fixtures::documents(2500)).await?;

        assert_eq!(the_report.indexed, 2500);
        assert_eq!(the_report.chunks, 3);
        assert_eq!(the_report.retries, 0);
        assert!(the_report.failed.is_empty());
        assert_eq!(the_sink.payloads().await.len(), 3);
        assert_eq!(the_sink.documents().await.len(), 2500);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_same_id_twice_leaves_one_document_and_the_last_word() -> Result<()> {
        let the_sink = InMemorySink::new();
        let the_indexer = the_indexer(&the_sink, 1000);
        let mut the_doc = fixtures::document("1254");

        the_indexer.index(std::slice::from_ref(&the_doc)).await?;
        the_doc.tweet = "second draft".to_string();
        the_indexer.index(std::slice::from_ref(&the_doc)).await?;

        let the_stored = the_sink.documents().await;
        assert_eq!(the_stored.len(), 1);
        assert_eq!(the_stored["1254"]["tweet"], "second draft");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_index_is_created_once_and_then_remapped() -> Result<()> {
        let the_sink = InMemorySink::new();
        let the_indexer = the_indexer(&the_sink, 10);

        the_indexer.index(&fixtures::documents(1)).await?;
        assert_eq!(the_sink.mapping_of("tweets").await, Some(index_mapping()));
        assert_eq!(the_sink.mapping_updates().await, 0);

        the_indexer.index(&fixtures::documents(1)).await?;
        assert_eq!(the_sink.mapping_updates().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_throttled_item_is_resubmitted_alone_and_lands() -> Result<()> {
        let the_sink = InMemorySink::new();
        the_sink.fail_items_once([("1", 429)]).await;

        let the_report = the_indexer(&the_sink, 10).index(&fixtures::documents(3)).await?;
        assert_eq!(the_report.indexed, 3);
        assert_eq!(the_report.retries, 1);
        assert!(the_report.failed.is_empty());

        let the_payloads = the_sink.payloads().await;
        assert_eq!(the_payloads.len(), 2);
        assert_eq!(the_payloads[1].lines().count(), 2, "only the throttled doc goes again");
        assert!(the_payloads[1].contains("\"_id\":\"1\""));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_bad_document_is_dead_lettered_without_a_retry() -> Result<()> {
        let the_sink = InMemorySink::new();
        the_sink.fail_items_once([("2", 400)]).await;

        let the_report = the_indexer(&the_sink, 10).index(&fixtures::documents(3)).await?;
        assert_eq!(the_report.indexed, 2);
        assert_eq!(the_report.retries, 0);
        assert_eq!(the_report.failed.len(), 1);
        assert_eq!(the_report.failed[0].document.id, "2");
        assert!(the_report.failed[0].reason.contains("status 400"));
        assert_eq!(the_sink.payloads().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_item_that_never_recovers_runs_out_of_attempts() -> Result<()> {
        let the_sink = InMemorySink::new();
        for _ in 0..3 {
            the_sink.fail_items_once([("0", 503)]).await;
        }

        let the_report = the_indexer(&the_sink, 10).index(&fixtures::documents(2)).await?;
        assert_eq!(the_report.indexed, 1);
        assert_eq!(the_report.retries, 2);
        assert_eq!(the_report.failed.len(), 1);
        assert!(the_report.failed[0].reason.contains("503"));
        assert_eq!(the_sink.payloads().await.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_whole_request_failure_is_retried_then_lands() -> Result<()> {
        let the_sink = InMemorySink::new();
        the_sink.fail_next_request(SubmitError::Transport("connection reset".into())).await;

        let the_report = the_indexer(&the_sink, 10).index(&fixtures::documents(4)).await?;
        assert_eq!(the_report.indexed, 4);
        assert_eq!(the_report.retries, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_400_request_fails_its_chunk_but_not_the_next_one() -> Result<()> {
        let the_sink = InMemorySink::new();
        the_sink
            .fail_next_request(SubmitError::Rejected { status: 400, body: "malformed".into() })
            .await;

        let the_report = the_indexer(&the_sink, 2).index(&fixtures::documents(4)).await?;
        assert_eq!(the_report.chunks, 2);
        assert_eq!(the_report.indexed, 2);
        assert_eq!(the_report.failed.len(), 2);
        assert_eq!(the_report.failed[0].document.id, "0");
        assert_eq!(the_report.retries, 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_refused_mapping_stops_everything_before_it_starts() {
        let the_sink = InMemorySink::new();
        the_sink.refuse_mappings().await;

        let the_result = the_indexer(&the_sink, 10).index(&fixtures::documents(2)).await;
        assert!(the_result.is_err());
        assert!(the_sink.payloads().await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_nothing_to_index_means_nothing_to_ask() -> Result<()> {
        let the_sink = InMemorySink::new();
        let the_report = the_indexer(&the_sink, 10).index(&[]).await?;
        assert_eq!(the_report, IndexReport::default());
        assert_eq!(the_sink.mapping_of("tweets").await, None);
        Ok(())
    }
}
