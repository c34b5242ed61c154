// ai
//! 🔧 App Configuration: the sacred env-and-TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge." 🦆
//!
//! 🏗️ Powered by Figment. Two layers:
//! - environment variables prefixed `TWX_`, with `__` for nesting
//!   (`TWX_SEARCH__URL`, `TWX_RETRY__MAX_ATTEMPTS`, `TWX_DEAD_LETTER__S3__BUCKET`)
//! - an optional TOML file, which wins on conflicts
//!
//! The lambda usually runs on env vars alone. The CLI usually brings a `twx.toml`.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::{ElasticsearchConfig, FileDeadLetterConfig, S3DeadLetterConfig, StorageConfig};
use crate::retry::RetryConfig;

/// 📦 One struct to rule them all.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// 📡 The search cluster, the index, and how big a chunk to send it.
    pub search: ElasticsearchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dead_letter: DeadLetterConfig,
}

/// ⚰️ Where failed records go. Externally tagged, so in TOML:
///
/// ```toml
/// [dead_letter.s3]
/// bucket = "my-dlq"
/// prefix = "tweets"
/// ```
///
/// or `dead_letter = "disabled"`. Capitalized variant names work too.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeadLetterConfig {
    #[serde(alias = "S3")]
    S3(S3DeadLetterConfig),
    #[serde(alias = "File")]
    File(FileDeadLetterConfig),
    #[default]
    #[serde(alias = "Disabled")]
    Disabled,
}

impl AppConfig {
    /// 🚧 Values serde happily accepts and the pipeline cannot live with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.search.url.trim().is_empty() {
            anyhow::bail!("💀 search.url is empty. We need somewhere to send the tweets.");
        }
        if self.search.index.trim().is_empty() {
            anyhow::bail!("💀 search.index is empty. Documents need a home with a name.");
        }
        if self.search.chunk_size == 0 {
            anyhow::bail!("💀 search.chunk_size is 0. Zero tweets per request is a very long loop.");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("💀 retry.max_attempts is 0. Even pessimists try once.");
        }
        if self.retry.multiplier < 1.0 {
            anyhow::bail!("💀 retry.multiplier is below 1.0. Backoff is supposed to back OFF.");
        }
        Ok(())
    }
}

/// 🚀 Load the config from env vars and, if given, a TOML file. Then validate it.
///
/// - `None` → env vars only.
/// - `Some(path)` → env vars + TOML, merged. TOML wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("TWX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (TWX_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (TWX_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config
        .validate()
        .context("💀 The configuration parsed, but it does not make sense")?;
    Ok(app_config)
}
