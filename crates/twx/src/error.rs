// ai
//! 💀 The error taxonomy: every way a batch can go sideways, with a name tag.
//!
//! anyhow carries the context chain around inside the backends. These enums exist
//! for the places where the *kind* of failure changes what we do next:
//! retry it, skip the record, or dead-letter the whole object.
//!
//! 🧠 Knowledge graph:
//! - [`PipelineError`]: the per-object stage that failed. Caught at the object boundary. Never escapes.
//! - [`NormalizeError`]: one tweet was missing a piece. That tweet is skipped, its siblings live on.
//! - [`SubmitError`]: the search engine said no. `is_retryable()` decides if we ask again.

use thiserror::Error;

/// 🚧 Which stage of the per-object pipeline gave up.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 🪣 The raw batch could not be read from storage.
    #[error("fetch failed for {origin}: {message}")]
    Fetch { origin: String, message: String },

    /// 🧩 The buffered content was not valid JSON after cleanup.
    #[error("parse failed for {origin}: {message}")]
    Parse { origin: String, message: String },

    /// 🐦 A single record could not be normalized.
    #[error("normalize failed for record #{position} of {origin}: {source}")]
    Normalize {
        origin: String,
        position: usize,
        #[source]
        source: NormalizeError,
    },

    /// 📡 The index lifecycle or a bulk submission failed.
    #[error("index failed for {origin}: {message}")]
    Index { origin: String, message: String },
}

impl PipelineError {
    /// 🏷️ Short stage label, used in reports and dead letters.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Parse { .. } => "parse",
            Self::Normalize { .. } => "normalize",
            Self::Index { .. } => "index",
        }
    }
}

/// 🐦 Why one raw tweet refused to become a document.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("field `{field}` should be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    #[error("field `{field}` is not a usable timestamp: {value}")]
    BadTimestamp { field: String, value: String },
}

/// 📡 A bulk submission that did not land.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// 🔌 Never got an answer. Connection refused, timeout, DNS, the usual suspects.
    #[error("transport failure talking to the search engine: {0}")]
    Transport(String),

    /// 🙅 Got an answer, and the answer was a non-2xx status.
    #[error("search engine answered {status}: {body}")]
    Rejected { status: u16, body: String },

    /// 🧩 Got a 2xx, but the body was not a bulk response we could read.
    #[error("unreadable bulk response: {0}")]
    BadResponse(String),
}

impl SubmitError {
    /// 🔄 Worth another try? Transport hiccups, throttling and 5xx: yes. A 400: no, it'll be a 400 forever.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::BadResponse(_) => true,
            Self::Rejected { status, .. } => is_retryable_status(*status),
        }
    }
}

/// 🔄 The statuses that mean "not now" rather than "never".
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}
