// ai
//! 🚀 twx-cli: replay buffered tweet files through the same pipeline the lambda runs.
//!
//! 🎬 *[narrator voice]* "It all started with a file somebody downloaded from the bucket..."
//!
//! ```text
//! twx-cli --config twx.toml batch-1 batch-2 ./more-batches/
//! twx-cli --dry-run batch-1          # index into RAM, touch nothing real
//! ```
//!
//! Prints a summary table. Exits 1 when any object failed outright, so it can sit in a script.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use twx::backends::{FileSource, InMemorySink, SinkBackend, SourceBackend};
use twx::common::ObjectRef;

/// 🐦 Replay buffered tweet files into the search index.
#[derive(Debug, Parser)]
#[command(name = "twx-cli", version)]
struct Args {
    /// 🔧 TOML config. Defaults to `twx.toml` when that file exists; env vars (TWX_*) apply either way.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 🧪 Index into an in-memory engine instead of the configured cluster.
    #[arg(long)]
    dry_run: bool,

    /// 📂 Buffered files, or directories of them.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

/// 🔒 The explicit `--config`, or `twx.toml` if it happens to be lying around, or nothing.
fn resolve_config_file(explicit: Option<PathBuf>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            let exists = path.try_exists().with_context(|| {
                format!("💀 Could not check whether the config file '{}' exists", path.display())
            })?;
            if !exists {
                anyhow::bail!(
                    "💀 Configuration file '{}' does not exist. If it's a relative path, \
                     check your cwd, or use an absolute path to be absolutely certain.",
                    path.display()
                );
            }
            Ok(Some(path))
        }
        None => {
            let fallback = PathBuf::from("twx.toml");
            Ok(fallback.is_file().then_some(fallback))
        }
    }
}

/// 📂 Files stay files. Directories become their (sorted) regular files, one level deep.
fn expand_paths(paths: &[PathBuf]) -> Result<Vec<ObjectRef>> {
    let mut objects = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("💀 Could not list directory '{}'", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect();
            entries.sort();
            objects.extend(entries.iter().map(|p| local_object(p)));
        } else {
            objects.push(local_object(path));
        }
    }
    Ok(objects)
}

fn local_object(path: &Path) -> ObjectRef {
    ObjectRef::new("local", path.to_string_lossy())
}

async fn run(args: Args) -> Result<bool> {
    let config_file = resolve_config_file(args.config)?;
    let app_config = twx::app_config::load_config(config_file.as_deref())
        .context("💀 In twx-cli, we couldn't load the config. Make sure you didn't forget something obvious.")?;

    let objects = expand_paths(&args.paths)?;
    let sink = if args.dry_run {
        info!("🧪 dry run: documents go to RAM and stay there");
        SinkBackend::InMemory(InMemorySink::new())
    } else {
        twx::elasticsearch_sink(&app_config)?
    };

    let pipeline = twx::build_pipeline(&app_config, SourceBackend::File(FileSource::new()), sink).await?;
    let report = pipeline.process(&objects).await;
    pipeline.close().await?;

    println!("{}", report.render_table());
    for outcome in &report.objects {
        for message in &outcome.errors {
            error!("⚠️  {}: {message}", outcome.object);
        }
    }
    Ok(!report.has_failures())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            error!("💀 at least one object failed. See the table above.");
            std::process::exit(1);
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion, one layer at a time, sniffing for connection problems
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("onnection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }
            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: the search cluster isn't reachable. Check `search.url` (or TWX_SEARCH__URL), \
                     and that the cluster is actually running. Or try --dry-run to take it out of the picture."
                );
            }
            std::process::exit(1);
        }
    }
}
