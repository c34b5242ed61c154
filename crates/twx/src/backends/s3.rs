// ai
//! ☁️ S3 backends: reading buffered batches, writing dead letters.
//!
//! 🧠 Knowledge graph:
//! - [`s3_client`] is called once at cold start. The client is cloned into whoever needs it
//!   (clones share the connection pool, they are cheap).
//! - [`S3Source`]: `GetObject`, body collected into memory. Buffered batches are small.
//! - [`S3DeadLetter`]: `PutObject` of one NDJSON file per origin object, at
//!   `{prefix}/{origin_bucket}/{origin_key}.dead.ndjson`. Same origin, same key, so a
//!   redelivered batch overwrites its own dead letters instead of piling up duplicates.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use serde::Deserialize;
use tracing::{debug, info};

use super::{DeadLetter, DeadLetterQueue, Source, render_dead_letters};
use crate::common::ObjectRef;

/// 🔧 How to reach S3. Everything optional: the Lambda environment knows the rest.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct StorageConfig {
    #[serde(default)]
    pub region: Option<String>,
    /// 🧪 For S3-compatible stores (MinIO, LocalStack). Switches to path-style addressing.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

/// 🏗️ Build the S3 client from the ambient AWS config, with our overrides on top.
pub async fn s3_client(config: &StorageConfig) -> Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(ref region) = config.region {
        loader = loader.region(aws_sdk_s3::config::Region::new(region.clone()));
    }
    let sdk_config = loader.load().await;

    let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config);
    if let Some(ref endpoint_url) = config.endpoint_url {
        s3_config = s3_config.endpoint_url(endpoint_url).force_path_style(true);
    }
    Client::from_conf(s3_config.build())
}

/// 🪣 Reads buffered batches out of S3.
#[derive(Debug, Clone)]
pub struct S3Source {
    client: Client,
}

impl S3Source {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Source for S3Source {
    async fn fetch(&self, object: &ObjectRef) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| format!("💀 GetObject {object} failed. The bucket kept its secrets."))?;
        let bytes = output
            .body
            .collect()
            .await
            .with_context(|| format!("💀 GetObject {object} started streaming and then stopped caring"))?
            .into_bytes();
        debug!("🪣 fetched {} bytes from {object}", bytes.len());
        Ok(bytes.to_vec())
    }
}

/// 🔧 Where S3 dead letters land.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct S3DeadLetterConfig {
    pub bucket: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "dead-letters".to_string()
}

/// 🗝️ `{prefix}/{origin_bucket}/{origin_key}.dead.ndjson`, deterministic by construction.
pub fn dead_letter_key(prefix: &str, origin: &ObjectRef) -> String {
    let prefix = prefix.trim_matches('/');
    let key = format!("{}/{}.dead.ndjson", origin.bucket, origin.key);
    if prefix.is_empty() { key } else { format!("{prefix}/{key}") }
}

/// ⚰️ One NDJSON object of dead letters per origin object.
#[derive(Debug, Clone)]
pub struct S3DeadLetter {
    client: Client,
    config: S3DeadLetterConfig,
}

impl S3DeadLetter {
    pub fn new(client: Client, config: S3DeadLetterConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl DeadLetterQueue for S3DeadLetter {
    async fn send(&self, origin: &ObjectRef, letters: Vec<DeadLetter>) -> Result<()> {
        let key = dead_letter_key(&self.config.prefix, origin);
        let body = render_dead_letters(&letters)?;
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .content_type("application/x-ndjson")
            .body(ByteStream::from(body.into_bytes()))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| format!("💀 Could not write dead letters to s3://{}/{key}", self.config.bucket))?;
        info!(
            "⚰️ wrote {} dead letters for {origin} to s3://{}/{key}",
            letters.len(),
            self.config.bucket
        );
        Ok(())
    }
}
