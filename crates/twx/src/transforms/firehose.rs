// ai
//! 🧩 Firehose buffer decoding: ungluing comma-glued tweets.
//!
//! The stream listener writes every tweet as `json + ",\n"` and the delivery stream
//! concatenates those into one S3 object. The result is almost a JSON array, missing
//! only its brackets and carrying one trailing comma too many.
//!
//! Recipe: gunzip if the gzip magic (or a `.gz` key) says so, trim trailing whitespace, drop one
//! trailing comma, wrap in `[` `]`, parse. All or nothing: if the array does not
//! parse, the whole object is a parse error. Partial parsing of a corrupt buffer
//! would produce records we cannot trust.

use std::io::Read;

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use serde_json::Value;

/// 🫁 The first two bytes of every gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// 🧩 Decode one buffered object into its raw records. Gzip is detected by its magic bytes.
pub fn decode_buffered(content: &[u8]) -> Result<Vec<Value>> {
    decode(content, false)
}

/// 🧩 Like [`decode_buffered`], but a key ending in `.gz` is gunzipped whatever its first
/// bytes claim.
pub fn decode_object(key: &str, content: &[u8]) -> Result<Vec<Value>> {
    decode(content, key.ends_with(".gz"))
}

fn decode(content: &[u8], gzipped: bool) -> Result<Vec<Value>> {
    let text = if gzipped || content.starts_with(&GZIP_MAGIC) {
        let mut inflated = String::new();
        MultiGzDecoder::new(content)
            .read_to_string(&mut inflated)
            .context("💀 The object looked gzipped but would not inflate. Half a gzip is no gzip.")?;
        inflated
    } else {
        String::from_utf8(content.to_vec())
            .context("💀 The buffered object is not valid UTF-8. Tweets are text. This was not.")?
    };

    let trimmed = text.trim_end();
    let trimmed = trimmed.strip_suffix(',').unwrap_or(trimmed).trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let wrapped = format!("[{trimmed}]");
    let records: Vec<Value> = serde_json::from_str(&wrapped).context(
        "💀 The buffered content is not a comma-separated run of JSON objects, even after cleanup.",
    )?;
    Ok(records)
}
