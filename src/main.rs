//! CLI entry point for the chunkfetch tool.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use chunkfetch_core::{DownloadEngine, DownloadOptions, Downloader, HttpClient};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::{Settings, load_default_file_config};
use cli::{Args, parse_items_text};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let loaded = load_default_file_config()?;
    let file_config = loaded.config.clone().unwrap_or_default();
    let settings = Settings::resolve(&args, &file_config);

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > info
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.default_log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");
    debug!(
        path = ?loaded.path,
        loaded_from_file = loaded.loaded_from_file(),
        ?settings,
        "settings resolved"
    );

    let input_text = if !args.items.is_empty() {
        args.items.join("\n")
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read items from stdin")?;
        buffer
    } else {
        info!("No input provided. Pass URLs as arguments or pipe them via stdin.");
        info!("Example: chunkfetch https://example.com/file.iso");
        return Ok(ExitCode::SUCCESS);
    };

    let items = parse_items_text(&input_text);
    if items.is_empty() {
        info!("No items found in input");
        return Ok(ExitCode::SUCCESS);
    }

    let mut options = DownloadOptions::default()
        .with_timeout(settings.timeout)
        .with_max_retries(settings.max_retries)
        .with_chunk_threads(settings.chunk_threads)
        .with_min_size_for_chunking(settings.min_chunk_size)
        .with_min_part_size(settings.min_part_size);
    for (name, value) in &args.headers {
        options = options
            .with_header(name, value)
            .with_context(|| format!("Invalid header '{name}'"))?;
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling downloads");
            interrupt.cancel();
        }
    });

    let downloader = Downloader::new(HttpClient::with_connect_timeout(settings.connect_timeout))
        .with_cancellation(cancel);
    let engine = DownloadEngine::new(downloader, settings.max_concurrent_files)?
        .with_options(options);

    info!(
        items = items.len(),
        output_dir = %settings.output_dir.display(),
        "Starting downloads"
    );
    let result = engine
        .download_all_to_dir_concurrent(&items, &settings.output_dir)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    for name in result.failed() {
        warn!(name = %name, "download failed");
    }
    info!(
        succeeded = result.succeeded(),
        failed = result.failed().len(),
        "Downloads finished"
    );

    Ok(if result.is_complete_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
