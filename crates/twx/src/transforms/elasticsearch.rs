// ai
//! 📡 Elasticsearch Bulk Transform: formatting tweets for the bulk API's peculiar tastes 🚀🔄
//!
//! The bulk API has rules:
//! Rule 1: Two lines per document. Action metadata, then document source. Always.
//! Rule 2: Newline-delimited. Not comma-separated. NEWLINES.
//! Rule 3: The trailing newline on the whole body matters. The composer owns that one.
//!
//! ## Knowledge Graph 🧠
//! - Implements: `EgressTransform` (`TweetDocument` → bulk wire format)
//! - Action is always `index`, never `create`: `index` overwrites by `_id`, which is
//!   what makes re-delivery of the same tweet an upsert instead of a duplicate.
//! - `_id` ← `TweetDocument::id`, `_index` ← the configured index name.
//!
//! ⚠️ When the singularity happens, the bulk API will still require two lines
//! per document. Some things transcend consciousness. 🦆

use super::EgressTransform;
use crate::common::TweetDocument;
use anyhow::{Context, Result};
use serde_json::json;

/// 📡 ElasticsearchBulk: the format whisperer for `_bulk` upserts.
///
/// ```text
/// {"index":{"_index":"tweets","_id":"1254"}}
/// {"id":"1254","tweet":"...","sentiment":"neutral",...}
/// ```
pub struct ElasticsearchBulk;

impl EgressTransform for ElasticsearchBulk {
    fn transform_doc(doc: &TweetDocument, index: &str) -> Result<String> {
        let the_action_line = json!({ "index": { "_index": index, "_id": doc.id } });
        let the_action_serialized = serde_json::to_string(&the_action_line).context(
            "💀 Failed to serialize bulk action metadata. The JSON that describes JSON has failed to become JSON.",
        )?;
        let the_source_serialized = serde_json::to_string(doc).with_context(|| {
            format!("💀 Failed to serialize tweet {} for the bulk body", doc.id)
        })?;

        // 🎯 the sacred two-line format. no third line. the bulk API is watching.
        Ok(format!("{the_action_serialized}\n{the_source_serialized}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::fixtures;
    use serde_json::Value;

    #[test]
    fn the_one_where_the_action_line_carries_the_upsert_key() -> Result<()> {
        let the_doc = fixtures::document("doc-42");
        let the_bulk_output = ElasticsearchBulk::transform_doc(&the_doc, "the-answer-index")?;
        let the_lines: Vec<&str> = the_bulk_output.split('\n').collect();

        assert_eq!(the_lines.len(), 2, "ES bulk format demands exactly two lines");

        let the_action: Value = serde_json::from_str(the_lines[0])?;
        assert_eq!(the_action["index"]["_id"], "doc-42");
        assert_eq!(the_action["index"]["_index"], "the-answer-index");
        assert!(the_action.get("create").is_none(), "create would refuse a second delivery");

        let the_source: Value = serde_json::from_str(the_lines[1])?;
        assert_eq!(the_source["id"], "doc-42");
        assert_eq!(the_source["user"]["name"], "Ada");
        Ok(())
    }

    #[test]
    fn the_one_where_newlines_inside_a_tweet_do_not_break_the_two_line_rule() -> Result<()> {
        let mut the_doc = fixtures::document("multi");
        the_doc.tweet = "line one\nline two\n\"quoted\" 🔥".to_string();
        let the_bulk_output = ElasticsearchBulk::transform_doc(&the_doc, "tweets")?;
        assert_eq!(the_bulk_output.split('\n').count(), 2);

        let the_source: Value = serde_json::from_str(the_bulk_output.split('\n').nth(1).unwrap_or(""))?;
        assert_eq!(the_source["tweet"], "line one\nline two\n\"quoted\" 🔥");
        Ok(())
    }
}
