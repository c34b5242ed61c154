// ai
//! 🗺️ The index mapping: the contract between our documents and the cluster.
//!
//! Applied verbatim on every invocation: `PUT /<index>` with `{"mappings": ...}` the first
//! time, `PUT /<index>/_mapping` ever after. Existing indices were built with these exact
//! types, so `id` stays `text` even though `keyword` would be nicer. Changing a field's
//! type here does not migrate anything. It makes put-mapping fail, loudly, every batch.

use serde_json::{Value, json};

/// 🗺️ The `properties` block for the tweets index.
pub fn index_mapping() -> Value {
    json!({
        "properties": {
            "id": { "type": "text" },
            "tweet": { "type": "text" },
            "timestamp": { "type": "date" },
            "user": {
                "properties": {
                    "id": { "type": "long" },
                    "name": { "type": "text" }
                }
            },
            "sentiment": { "type": "keyword" },
            "coordinates": {
                "properties": {
                    "coordinates": { "type": "geo_point" },
                    "type": { "type": "keyword" }
                }
            },
            "hashtags": { "type": "text" },
            "mentions": { "type": "text" }
        }
    })
}

/// 🏗️ Body for index creation. Same mapping, one level of wrapping.
pub fn create_index_body() -> Value {
    json!({ "mappings": index_mapping() })
}
