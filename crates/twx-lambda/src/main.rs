// ai
//! ☁️ twx-lambda: the S3-triggered entry point.
//!
//! Cold start builds everything once: config from `TWX_*` env vars, the S3 client, the
//! HTTP client, the VADER lexicon. Every invocation after that borrows the same
//! `Arc<Pipeline>`. Logs are JSON, because CloudWatch Insights likes fields.

use std::sync::Arc;

use lambda_runtime::service_fn;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use twx::backends::{S3Source, SourceBackend, s3::s3_client};

mod handler;

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let app_config = twx::app_config::load_config(None)?;
    let source = SourceBackend::S3(S3Source::new(s3_client(&app_config.storage).await));
    let sink = twx::elasticsearch_sink(&app_config)?;
    let pipeline = Arc::new(twx::build_pipeline(&app_config, source, sink).await?);
    info!("☁️ twx lambda ready, indexing into '{}'", pipeline.index_name());

    lambda_runtime::run(service_fn(move |event| {
        let pipeline = Arc::clone(&pipeline);
        async move { handler::handle(&pipeline, event).await }
    }))
    .await
}
