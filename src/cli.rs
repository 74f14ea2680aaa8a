//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use chunkfetch_core::download::{NamedUrl, file_name_from_url};
use url::Url;

/// Name used when neither the item nor its URL provides one.
const DEFAULT_ITEM_NAME: &str = "download";

/// Download files reliably: range-chunked, resumable, retried, concurrent.
///
/// Each item is either `URL` or `NAME=URL`. Without items, one item per
/// line is read from stdin.
#[derive(Parser, Debug)]
#[command(name = "chunkfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Items to download (`URL` or `NAME=URL`)
    pub items: Vec<String>,

    /// Directory the files are written to (default: current directory)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum files downloaded at the same time (1-64)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub max_concurrent_files: Option<u8>,

    /// Range connections per file; 1 disables chunking (1-16)
    #[arg(short = 't', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub chunk_threads: Option<u8>,

    /// Maximum retry attempts for transient failures (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Per-request timeout in milliseconds (1-3600000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3_600_000))]
    pub timeout_ms: Option<u64>,

    /// Extra request header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the batch result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name missing in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Turns one input item into a named URL.
///
/// Items starting with `http://` or `https://` are URLs whose name comes
/// from the last path segment; anything else is split at the first `=`.
pub fn parse_item(raw: &str) -> NamedUrl {
    let raw = raw.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return NamedUrl::new(name_for_url(raw), raw);
    }
    match raw.split_once('=') {
        Some((name, url)) => NamedUrl::new(name.trim(), url.trim()),
        None => NamedUrl::new(name_for_url(raw), raw),
    }
}

fn name_for_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .as_ref()
        .and_then(file_name_from_url)
        .unwrap_or_else(|| DEFAULT_ITEM_NAME.to_string())
}

/// Parses stdin text: one item per line, blank lines and `#` comments skipped.
pub fn parse_items_text(text: &str) -> Vec<NamedUrl> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse_item)
        .collect()
}
