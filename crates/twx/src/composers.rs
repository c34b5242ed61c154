// ai
//! 🎬 *[a chunk of tweets waits. the bulk endpoint hungers.]*
//!
//! 🎼 The Composers module: the transform-and-assemble step for one chunk.
//!
//! A composer takes a slice of documents, runs each through an [`EgressTransform`],
//! and joins the results into the payload the sink sends in one request.
//!
//! 🧠 Knowledge graph:
//! - **NDJSON** (`NdjsonComposer`): `\n`-delimited with a trailing `\n`. What `/_bulk` demands.
//! - The indexer calls `compose` once per chunk, and again for the retry subset.
//!
//! 🦆 (the duck composes... symphonies? payloads? both? the duck has no comment.)

use crate::common::TweetDocument;
use crate::transforms::EgressTransform;
use anyhow::Result;

/// 🎼 Composes documents into a single wire-format payload.
pub trait Composer: std::fmt::Debug {
    fn compose<T: EgressTransform>(&self, docs: &[&TweetDocument], index: &str) -> Result<String>;
}

/// 📡 Newline-Delimited JSON: the format ES `/_bulk` demands.
///
/// After compose: "action1\nsource1\naction2\nsource2\n".
/// What's the DEAL with NDJSON? It's JSON but unfriendly. Every line is lonely.
#[derive(Debug, Clone, Copy, Default)]
pub struct NdjsonComposer;

impl Composer for NdjsonComposer {
    fn compose<T: EgressTransform>(&self, docs: &[&TweetDocument], index: &str) -> Result<String> {
        // 🧮 vibes-based capacity estimate: tweets are small, action lines are smaller
        let mut payload = String::with_capacity(docs.len() * 512);
        for doc in docs {
            payload.push_str(&T::transform_doc(doc, index)?);
            payload.push('\n');
        }
        // ✅ trailing \n included. ES bulk requires it, nobody complains.
        Ok(payload)
    }
}
