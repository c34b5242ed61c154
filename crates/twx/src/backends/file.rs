// ai
//! 📁 File backends: for replaying buffered batches from disk, and for keeping
//! dead letters somewhere you can `tail -f`.
//!
//! 🧠 Knowledge graph:
//! - [`FileSource`] reads `ObjectRef::key` as a path. The bucket is decorative.
//! - [`FileDeadLetter`] appends NDJSON lines. It never truncates: a dead letter
//!   file is evidence, and you do not shred evidence on startup.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::trace;

use super::{DeadLetter, DeadLetterQueue, Source, render_dead_letters};
use crate::common::ObjectRef;

/// 📂 Reads local files. One file is one buffered object.
#[derive(Debug, Default, Clone)]
pub struct FileSource;

impl FileSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Source for FileSource {
    async fn fetch(&self, object: &ObjectRef) -> Result<Vec<u8>> {
        tokio::fs::read(&object.key).await.with_context(|| {
            format!(
                "💀 Could not read '{}'. We stared at the path. The path stared back.",
                object.key
            )
        })
    }
}

/// 🔧 Where file dead letters land.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FileDeadLetterConfig {
    pub file_name: PathBuf,
}

/// ⚰️ Appends dead letters to one NDJSON file. One writer at a time, courtesy of the Mutex.
#[derive(Debug)]
pub struct FileDeadLetter {
    file_buf: Mutex<BufWriter<File>>,
    config: FileDeadLetterConfig,
}

impl FileDeadLetter {
    /// 🚀 Opens (or creates) the file in append mode. Existing letters are kept.
    pub async fn new(config: FileDeadLetterConfig) -> Result<Self> {
        let file_handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.file_name)
            .await
            .with_context(|| {
                format!(
                    "💀 The dead letter file '{}' could not be opened. \
                     One of us was wrong about whether the parent directory existed. It was us.",
                    config.file_name.display()
                )
            })?;
        Ok(Self {
            file_buf: Mutex::new(BufWriter::new(file_handle)),
            config,
        })
    }
}

#[async_trait]
impl DeadLetterQueue for FileDeadLetter {
    async fn send(&self, origin: &ObjectRef, letters: Vec<DeadLetter>) -> Result<()> {
        let rendered = render_dead_letters(&letters)?;
        trace!(
            "⚰️ appending {} dead letters for {origin} to {}",
            letters.len(),
            self.config.file_name.display()
        );
        let mut file_buf = self.file_buf.lock().await;
        file_buf.write_all(rendered.as_bytes()).await?;
        // -- flushed per object. a crash between objects should not eat the evidence.
        file_buf
            .flush()
            .await
            .context("💀 Dead letters were written to the buffer but never made it to disk")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn the_one_where_a_local_file_is_an_object() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let the_path = the_dir.path().join("batch-1");
        tokio::fs::write(&the_path, b"{\"id\":1},\n").await?;

        let the_bytes = FileSource::new()
            .fetch(&ObjectRef::new("local", the_path.to_string_lossy()))
            .await?;
        assert_eq!(the_bytes, b"{\"id\":1},\n");
        assert!(FileSource::new().fetch(&ObjectRef::new("local", "/definitely/not/here")).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_dead_letters_pile_up_instead_of_overwriting() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let the_config = FileDeadLetterConfig {
            file_name: the_dir.path().join("dead.ndjson"),
        };
        let the_origin = ObjectRef::new("b", "k");

        let the_queue = FileDeadLetter::new(the_config.clone()).await?;
        the_queue
            .send(&the_origin, vec![DeadLetter::new("parse", &the_origin, "bad", json!("x"))])
            .await?;
        drop(the_queue);

        // -- a fresh handle, like a new lambda container, must append and not truncate
        let the_queue = FileDeadLetter::new(the_config.clone()).await?;
        the_queue
            .send(&the_origin, vec![DeadLetter::new("index", &the_origin, "400", json!({"id": "1"}))])
            .await?;

        let the_contents = tokio::fs::read_to_string(&the_config.file_name).await?;
        let the_lines: Vec<Value> = the_contents
            .lines()
            .map(serde_json::from_str)
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(the_lines.len(), 2);
        assert_eq!(the_lines[0]["stage"], "parse");
        assert_eq!(the_lines[1]["payload"]["id"], "1");
        Ok(())
    }
}
