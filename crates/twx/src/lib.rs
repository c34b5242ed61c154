// ai
//! 🐦 twx: buffered tweets in, enriched documents out, bulk-indexed by id.
//!
//! 🎬 *[a delivery stream flushes. an object lands in a bucket. a lambda wakes up.]*
//!
//! 🧠 Knowledge graph:
//! - [`transforms`]: decode the buffered object, normalize each tweet, render bulk lines.
//! - [`sentiment`]: polarity scoring (VADER by default) and the three-bucket rule.
//! - [`indexer`]: index lifecycle, chunking, per-item retry.
//! - [`backends`]: S3 / file / in-memory sources, Elasticsearch / in-memory sinks, dead-letter queues.
//! - [`pipeline`]: the per-object orchestration that never lets an error escape.
//! - [`app_config`]: figment, env + TOML.
//!
//! The binaries (`twx-cli`, `twx-lambda`) only pick a source and call [`build_pipeline`].

use anyhow::{Context, Result};

pub mod app_config;
pub mod backends;
pub mod common;
pub mod composers;
pub mod error;
pub mod indexer;
pub mod mapping;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod sentiment;
pub mod transforms;

use crate::app_config::{AppConfig, DeadLetterConfig};
use crate::backends::{
    DeadLetterBackend, ElasticsearchSink, FileDeadLetter, S3DeadLetter, SinkBackend, SourceBackend, StorageConfig,
    s3::s3_client,
};
use crate::indexer::BulkIndexer;
use crate::pipeline::Pipeline;
use crate::sentiment::VaderScorer;
use crate::transforms::TweetNormalizer;

/// 📡 The real cluster, as configured.
pub fn elasticsearch_sink(app_config: &AppConfig) -> Result<SinkBackend> {
    let sink = ElasticsearchSink::new(app_config.search.clone())
        .context("💀 Could not stand up the Elasticsearch sink")?;
    Ok(SinkBackend::Elasticsearch(sink))
}

/// ⚰️ Whatever dead-letter queue the config asked for.
pub async fn build_dead_letter(config: &DeadLetterConfig, storage: &StorageConfig) -> Result<DeadLetterBackend> {
    Ok(match config {
        DeadLetterConfig::S3(s3_config) => {
            DeadLetterBackend::S3(S3DeadLetter::new(s3_client(storage).await, s3_config.clone()))
        }
        DeadLetterConfig::File(file_config) => DeadLetterBackend::File(
            FileDeadLetter::new(file_config.clone())
                .await
                .context("💀 Could not open the dead letter file")?,
        ),
        DeadLetterConfig::Disabled => DeadLetterBackend::Disabled,
    })
}

/// 🏗️ Wire a pipeline from config. The caller brings the source and the sink;
/// the VADER scorer, the indexer and the dead-letter queue come from here.
pub async fn build_pipeline(app_config: &AppConfig, source: SourceBackend, sink: SinkBackend) -> Result<Pipeline> {
    let indexer = BulkIndexer::new(
        sink,
        app_config.search.index.clone(),
        app_config.search.chunk_size,
        app_config.retry.clone(),
    );
    let normalizer = TweetNormalizer::new(Box::new(VaderScorer::new()));
    let dead_letter = build_dead_letter(&app_config.dead_letter, &app_config.storage).await?;
    Ok(Pipeline::new(source, normalizer, indexer, dead_letter))
}
