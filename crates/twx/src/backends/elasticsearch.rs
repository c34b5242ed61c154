// ai
//! 📡 The Elasticsearch backend: index lifecycle and `_bulk`, over plain reqwest.
//!
//! 🧠 Knowledge graph:
//! - `HEAD /<index>` → exists? (200 yes, 404 no, anything else is a problem)
//! - `PUT /<index>` with `{"mappings": ...}` → create
//! - `PUT /<index>/_mapping` → re-apply the mapping on an existing index
//! - `POST /_bulk` with `application/x-ndjson` → one chunk
//! - Auth: API key wins over basic auth. This is not a democracy.
//!
//! Knock knock. Who's there? HTTP POST. HTTP POST who? HTTP POST your NDJSON
//! and hope the cluster's in a good mood.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, header::CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use super::{BulkResponse, Sink};
use crate::error::SubmitError;

/// 🔧 Where the cluster lives and how to talk to it.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ElasticsearchConfig {
    /// 📡 Base URL, e.g. `https://search.example.com:443`. Trailing slash optional.
    pub url: String,
    /// 🔒 Username. "password123" is not a password. It is a confession.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key, the velvet rope variant of authentication.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_index")]
    pub index: String,
    /// 📦 Documents per `_bulk` request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_index() -> String {
    "tweets".to_string()
}

// -- 📦 a thousand tweets per request. round number, small payload, the cluster stays calm.
fn default_chunk_size() -> usize {
    1000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl ElasticsearchConfig {
    /// 🧪 Everything defaulted except the URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            api_key: None,
            index: default_index(),
            chunk_size: default_chunk_size(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// 📡 The sink side of the cluster. Pure I/O, zero buffering.
#[derive(Debug)]
pub struct ElasticsearchSink {
    client: reqwest::Client,
    config: ElasticsearchConfig,
}

impl ElasticsearchSink {
    /// 🚀 Build the HTTP client once. It is reused by every request of every invocation.
    pub fn new(config: ElasticsearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably the TLS stack. Either way: tragic.")?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        // -- one slash of difference. infinite suffering of difference.
        format!("{}/{}", self.config.url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {api_key}"))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    /// 📤 PUT a JSON body. Reading the status is the caller's job.
    async fn put_json(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let the_body = serde_json::to_string(body).context("💀 could not serialize the request body")?;
        self.authorize(self.client.put(self.endpoint(path)))
            .header(CONTENT_TYPE, "application/json")
            .body(the_body)
            .send()
            .await
            .with_context(|| format!("💀 PUT /{path} never reached the cluster"))
    }
}

#[async_trait]
impl Sink for ElasticsearchSink {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self
            .authorize(self.client.head(self.endpoint(index)))
            .send()
            .await
            .with_context(|| format!("💀 Knocked on index '{index}' to see if it exists. Got ghosted."))?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => anyhow::bail!("💀 HEAD /{index} answered {status}. Neither yes nor no. Rude."),
        }
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        let response = self.put_json(index, body).await?;
        let status = response.status();
        if status.is_success() {
            debug!("🏗️ created index '{index}'");
            return Ok(());
        }
        let the_body = response.text().await.unwrap_or_default();
        // -- another invocation won the race. fine. the mapping is re-applied next time.
        if the_body.contains("resource_already_exists_exception") {
            debug!("🏗️ index '{index}' appeared between HEAD and PUT, carrying on");
            return Ok(());
        }
        anyhow::bail!("💀 Creating index '{index}' failed with {status}: {the_body}")
    }

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()> {
        let response = self.put_json(&format!("{index}/_mapping"), mapping).await?;
        let status = response.status();
        if !status.is_success() {
            let the_body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 Re-applying the mapping to '{index}' failed with {status}: {the_body}. \
                 Someone changed a field type. It was probably us."
            );
        }
        debug!("🗺️ mapping re-applied to '{index}'");
        Ok(())
    }

    /// 📡 POST one rendered NDJSON body to `/_bulk`. No retries here. Retries are the indexer's problem.
    async fn send(&self, payload: String) -> std::result::Result<BulkResponse, SubmitError> {
        trace!("📡 sending {} bytes to /_bulk", payload.len());
        let response = self
            .authorize(self.client.post(self.endpoint("_bulk")))
            // ⚠️ x-ndjson, not json. The x- prefix means "we made this up but we're committing to it."
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(payload)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(format!("{e:#}")))?;

        let status = response.status();
        let the_body = response
            .text()
            .await
            .map_err(|e| SubmitError::Transport(format!("{e:#}")))?;
        if !status.is_success() {
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
                body: the_body,
            });
        }
        serde_json::from_str(&the_body).map_err(|e| SubmitError::BadResponse(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        debug!("🗑️ Elasticsearch sink closing. No buffer to flush, just vibes to release.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn the_sink_for(server: &MockServer) -> ElasticsearchSink {
        ElasticsearchSink::new(ElasticsearchConfig::new(server.uri())).expect("💀 client should build")
    }

    #[tokio::test]
    async fn the_one_where_head_tells_us_whether_the_index_exists() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/tweets"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&the_server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&the_server)
            .await;

        let the_sink = the_sink_for(&the_server);
        assert!(the_sink.index_exists("tweets").await?);
        assert!(!the_sink.index_exists("nope").await?);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_create_and_put_mapping_hit_the_right_urls() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/tweets"))
            .and(body_string_contains("\"mappings\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
            .expect(1)
            .mount(&the_server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/tweets/_mapping"))
            .and(body_string_contains("geo_point"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
            .expect(1)
            .mount(&the_server)
            .await;

        let the_sink = the_sink_for(&the_server);
        the_sink.create_index("tweets", &crate::mapping::create_index_body()).await?;
        the_sink.put_mapping("tweets", &crate::mapping::index_mapping()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_conflicting_mapping_is_an_error_with_the_body_attached() {
        let the_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/tweets/_mapping"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "type": "illegal_argument_exception", "reason": "mapper [id] cannot be changed" }
            })))
            .mount(&the_server)
            .await;

        let the_err = the_sink_for(&the_server)
            .put_mapping("tweets", &crate::mapping::index_mapping())
            .await
            .expect_err("💀 a 400 should not be Ok");
        assert!(the_err.to_string().contains("cannot be changed"));
    }

    #[tokio::test]
    async fn the_one_where_bulk_goes_out_as_ndjson_with_the_api_key() {
        let the_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(header("content-type", "application/x-ndjson"))
            .and(header("authorization", "ApiKey sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "took": 5,
                "errors": false,
                "items": [ { "index": { "_id": "1", "status": 201 } } ]
            })))
            .expect(1)
            .mount(&the_server)
            .await;

        let mut the_config = ElasticsearchConfig::new(the_server.uri());
        the_config.api_key = Some("sekrit".to_string());
        the_config.username = Some("ignored".to_string());
        let the_sink = ElasticsearchSink::new(the_config).expect("💀 client");

        let the_response = the_sink
            .send("{\"index\":{\"_id\":\"1\"}}\n{}\n".to_string())
            .await
            .expect("💀 bulk should land");
        assert_eq!(the_response.items.len(), 1);
        assert!(!the_response.errors);
    }

    #[tokio::test]
    async fn the_one_where_status_codes_become_submit_errors() {
        let the_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .up_to_n_times(1)
            .mount(&the_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_string("definitely not json"))
            .mount(&the_server)
            .await;

        let the_sink = the_sink_for(&the_server);
        match the_sink.send(String::new()).await {
            Err(SubmitError::Rejected { status: 429, body }) => assert_eq!(body, "slow down"),
            other => panic!("💀 expected a 429 rejection, got {other:?}"),
        }
        match the_sink.send(String::new()).await {
            Err(err @ SubmitError::BadResponse(_)) => assert!(err.is_retryable()),
            other => panic!("💀 expected a bad response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn the_one_where_nobody_is_home() {
        // -- port 9 is the discard protocol. nothing answers there. nothing ever has.
        let the_sink = ElasticsearchSink::new(ElasticsearchConfig {
            connect_timeout_secs: 1,
            ..ElasticsearchConfig::new("http://127.0.0.1:9")
        })
        .expect("💀 client");
        let the_err = the_sink.send(String::new()).await.expect_err("💀 nobody should answer");
        assert!(matches!(the_err, SubmitError::Transport(_)));
    }
}
