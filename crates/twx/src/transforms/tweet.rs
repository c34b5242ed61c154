// ai
//! 🐦 Tweet Normalizer: ninety fields in, nine fields out.
//!
//! The raw tweet is a loosely-typed `serde_json::Value`. We pick out the id, the text,
//! a timestamp, the author, the coordinates and the hashtags, score the text for mood,
//! and scrape @mentions with a regex. Everything else is left on the cutting room floor.
//!
//! 🧠 Knowledge graph:
//! - Implements [`IngestTransform`].
//! - Id: `id_str` wins, `id` is the fallback (numbers get stringified).
//! - Timestamp: `timestamp_ms` (string or number) wins, `created_at` is the fallback.
//! - Sentiment: injected [`PolarityScorer`] + [`classify`].
//! - Mentions: `@\w+`, order kept, duplicates kept, case kept.

use std::sync::LazyLock;

use chrono::DateTime;
use regex::Regex;
use serde_json::Value;

use super::IngestTransform;
use crate::common::{TweetDocument, TweetUser};
use crate::error::NormalizeError;
use crate::sentiment::{PolarityScorer, classify};

/// 🔎 `@` followed by one or more word characters. Unicode-aware, like the tweets.
static MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\w+").expect("mention pattern is a valid regex"));

/// 📅 Twitter's `created_at` dialect: `Wed Oct 10 20:19:24 +0000 2018`.
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// 🔎 Every @mention in the text, in order of appearance. Duplicates are a feature.
pub fn extract_mentions(text: &str) -> Vec<String> {
    MENTION_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// 🐦 Turns raw tweets into [`TweetDocument`]s.
pub struct TweetNormalizer {
    scorer: Box<dyn PolarityScorer>,
}

impl TweetNormalizer {
    pub fn new(scorer: Box<dyn PolarityScorer>) -> Self {
        Self { scorer }
    }

    /// 🎯 The public face of the transform. Same thing, friendlier name.
    pub fn normalize(&self, raw: &Value) -> Result<TweetDocument, NormalizeError> {
        self.transform_record(raw)
    }
}

impl std::fmt::Debug for TweetNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TweetNormalizer").finish_non_exhaustive()
    }
}

impl IngestTransform for TweetNormalizer {
    fn transform_record(&self, raw: &Value) -> Result<TweetDocument, NormalizeError> {
        let id = extract_id(raw)?;
        let text = required_str(raw, &["text"])?;
        let timestamp = extract_timestamp(raw)?;
        let user = TweetUser {
            id: required_i64(raw, &["user", "id"])?,
            name: required_str(raw, &["user", "name"])?.to_string(),
        };
        let coordinates = raw.get("coordinates").filter(|v| !v.is_null()).cloned();
        let hashtags = extract_hashtags(raw)?;

        // 😊😐😠 the only "expensive" step in here, and it's a lexicon lookup
        let sentiment = classify(self.scorer.polarity(text));

        Ok(TweetDocument {
            id,
            tweet: text.to_string(),
            timestamp,
            user,
            sentiment,
            coordinates,
            hashtags,
            mentions: extract_mentions(text),
        })
    }
}

/// 🧭 Walk a path of object keys. Absent and `null` both count as missing.
fn lookup<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cursor = raw;
    for key in path {
        cursor = cursor.get(key)?;
    }
    (!cursor.is_null()).then_some(cursor)
}

fn required<'a>(raw: &'a Value, path: &[&str]) -> Result<&'a Value, NormalizeError> {
    lookup(raw, path).ok_or_else(|| NormalizeError::MissingField(path.join(".")))
}

fn required_str<'a>(raw: &'a Value, path: &[&str]) -> Result<&'a str, NormalizeError> {
    required(raw, path)?
        .as_str()
        .ok_or_else(|| NormalizeError::WrongType {
            field: path.join("."),
            expected: "a string",
        })
}

/// 🔢 Accepts a JSON integer or a numeric string, because Twitter ships both.
fn required_i64(raw: &Value, path: &[&str]) -> Result<i64, NormalizeError> {
    let value = required(raw, path)?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| NormalizeError::WrongType {
            field: path.join("."),
            expected: "an integer",
        })
}

fn extract_id(raw: &Value) -> Result<String, NormalizeError> {
    // 🪪 an empty id_str is no id at all, so `id` gets its turn
    if let Some(id) = lookup(raw, &["id_str"]).and_then(Value::as_str).filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }
    match required(raw, &["id"])? {
        Value::Number(n) if n.is_u64() || n.is_i64() => Ok(n.to_string()),
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        _ => Err(NormalizeError::WrongType {
            field: "id".to_string(),
            expected: "an integer or string",
        }),
    }
}

fn extract_timestamp(raw: &Value) -> Result<i64, NormalizeError> {
    if let Some(value) = lookup(raw, &["timestamp_ms"]) {
        return value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| NormalizeError::BadTimestamp {
                field: "timestamp_ms".to_string(),
                value: value.to_string(),
            });
    }

    // 📅 no epoch millis? fall back to the human-ish date string
    match lookup(raw, &["created_at"]).and_then(Value::as_str) {
        Some(created_at) => DateTime::parse_from_str(created_at, CREATED_AT_FORMAT)
            .map(|dt| dt.timestamp_millis())
            .map_err(|_| NormalizeError::BadTimestamp {
                field: "created_at".to_string(),
                value: created_at.to_string(),
            }),
        None => Err(NormalizeError::MissingField("timestamp_ms".to_string())),
    }
}

/// #️⃣ Straight from the pre-parsed entities. We do not scan the text for these.
fn extract_hashtags(raw: &Value) -> Result<Vec<String>, NormalizeError> {
    let hashtags = required(raw, &["entities", "hashtags"])?
        .as_array()
        .ok_or_else(|| NormalizeError::WrongType {
            field: "entities.hashtags".to_string(),
            expected: "an array",
        })?;

    hashtags
        .iter()
        .map(|tag| {
            tag.get("text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| NormalizeError::MissingField("entities.hashtags[].text".to_string()))
        })
        .collect()
}
