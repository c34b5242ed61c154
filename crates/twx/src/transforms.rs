// ai
//! 🔄 Transforms: the Rosetta Stone between a tweet blob and a bulk line 🎭🚀
//!
//! 🎬 COLD OPEN - INT. TRANSLATION BOOTH - 2:47 AM
//!
//! Raw tweet JSON on the left screen, ninety fields deep, half of them null.
//! Elasticsearch bulk format on the right. In between: this module.
//!
//! ## Architecture 📐
//!
//! ```text
//!   buffered object          raw records            documents             wire
//!  ┌───────────────┐      ┌──────────────┐      ┌───────────────┐    ┌──────────────┐
//!  │ {..},\n{..},\n│─────▶│ Vec<Value>   │─────▶│ TweetDocument │───▶│ action\n     │
//!  └───────────────┘      └──────────────┘      └───────────────┘    │ source       │
//!    firehose::decode       IngestTransform       EgressTransform    └──────────────┘
//!                          (TweetNormalizer)     (ElasticsearchBulk)
//! ```
//!
//! ## Knowledge Graph 🧠
//! - `firehose`: unglues the comma-separated buffer into records (and gunzips first if needed).
//! - `tweet`: [`IngestTransform`] impl. Raw record → [`TweetDocument`]. Pure. Fails per record.
//! - `elasticsearch`: [`EgressTransform`] impl. Document → two NDJSON lines for `_bulk`.
//!
//! ⚠️ The singularity will merge all data formats into pure consciousness.
//! Until then, we serde. 🦆

use anyhow::Result;
use serde_json::Value;

use crate::common::TweetDocument;
use crate::error::NormalizeError;

pub mod elasticsearch;
pub mod firehose;
pub mod tweet;

pub use elasticsearch::ElasticsearchBulk;
pub use firehose::{decode_buffered, decode_object};
pub use tweet::{TweetNormalizer, extract_mentions};

/// 📥 IngestTransform: a raw source record in, a [`TweetDocument`] out.
///
/// # Contract 📜
/// - Pure: same record, same document. No I/O, no clocks, no randomness.
/// - Fails with [`NormalizeError`] when a required field is absent. The caller skips
///   that record and keeps the rest of the batch. One bad tweet does not sink the ship.
pub trait IngestTransform {
    fn transform_record(&self, raw: &Value) -> std::result::Result<TweetDocument, NormalizeError>;
}

/// 📤 EgressTransform: a [`TweetDocument`] in, the sink's wire format out.
///
/// # Contract 📜
/// - Borrows the document because the indexer may resubmit it on retry.
/// - Output is the exact per-document text the composer joins into a payload.
pub trait EgressTransform {
    fn transform_doc(doc: &TweetDocument, index: &str) -> Result<String>;
}
