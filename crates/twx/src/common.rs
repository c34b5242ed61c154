// ai
//! 📦 Common data structures: the building blocks of twx
//!
//! 🎬 COLD OPEN - INT. S3 BUCKET - SOMETIME AFTER THE FIREHOSE FLUSHED
//!
//! A buffered object lands. Inside: a few hundred tweets, comma-glued together
//! like a chain letter nobody asked for. Each one will be read, judged for its
//! emotional state, stripped of everything but the essentials, and shipped to
//! the search cluster. This module holds the shapes they take along the way.
//!
//! 🧠 Knowledge graph:
//! - [`ObjectRef`]: where a buffered batch lives (bucket + key). Input to the pipeline.
//! - [`TweetDocument`]: the normalized, indexable document. Output of the normalizer,
//!   input to the bulk indexer. Its `id` is the upsert key. Stable. Sacred. Do not touch.
//! - [`Sentiment`]: the three moods a tweet is allowed to have.
//!
//! 🦆

use serde::{Deserialize, Serialize};

/// 🪣 A pointer to one buffered object in storage.
///
/// The lambda builds these from S3 notifications, the CLI builds them from local paths.
/// The bucket is meaningless for local files and nobody is offended by that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// 😊😐😠 The emotional range of a tweet, as far as the index is concerned.
///
/// Serialized lowercase because the `sentiment` field is a `keyword` and
/// `"Positive"` vs `"positive"` is the kind of bug that costs a weekend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Positive => "positive",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 👤 The author, reduced to the two facts the index cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TweetUser {
    pub id: i64,
    pub name: String,
}

/// 🎯 One normalized tweet, ready for `_bulk`.
///
/// Field names match the index mapping exactly. Rename one here and the
/// mapping quietly grows a sibling field. Ask me how I know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TweetDocument {
    /// 🔑 The upsert key. Same tweet, same id, same document. Forever.
    pub id: String,
    pub tweet: String,
    /// ⏱️ Epoch milliseconds. The `date` mapping takes it as-is.
    pub timestamp: i64,
    pub user: TweetUser,
    pub sentiment: Sentiment,
    /// 📍 GeoJSON point, verbatim, or null. We do not do geography here.
    pub coordinates: Option<serde_json::Value>,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! 🧪 Shared test fixtures. A small zoo of tweets, hand-raised in captivity.

    use super::*;
    use serde_json::{Value, json};

    /// 🐦 A raw tweet with everything the normalizer wants.
    pub(crate) fn raw_tweet(id: u64, text: &str) -> Value {
        json!({
            "id": id,
            "id_str": id.to_string(),
            "text": text,
            "timestamp_ms": "1589212345678",
            "created_at": "Mon May 11 15:52:25 +0000 2020",
            "user": { "id": 42, "name": "Ada" },
            "coordinates": null,
            "entities": { "hashtags": [ { "text": "rust" }, { "text": "search" } ] }
        })
    }

    /// 📄 A normalized document with a predictable shape.
    pub(crate) fn document(id: &str) -> TweetDocument {
        TweetDocument {
            id: id.to_string(),
            tweet: format!("tweet number {id}"),
            timestamp: 1589212345678,
            user: TweetUser {
                id: 42,
                name: "Ada".to_string(),
            },
            sentiment: Sentiment::Neutral,
            coordinates: None,
            hashtags: vec![],
            mentions: vec![],
        }
    }

    pub(crate) fn documents(count: usize) -> Vec<TweetDocument> {
        (0..count).map(|i| document(&i.to_string())).collect()
    }
}
