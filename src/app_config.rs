//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chunkfetch_core::download::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_THREADS, DEFAULT_MAX_CONCURRENT_FILES, DEFAULT_MAX_RETRIES,
    DEFAULT_MIN_PART_SIZE, DEFAULT_MIN_SIZE_FOR_CHUNKING, DEFAULT_REQUEST_TIMEOUT,
    MAX_CONCURRENT_FILES,
};

use crate::cli::Args;

/// TOML-like `key = value` file configuration for CLI defaults.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    /// Default output directory for downloads.
    pub output_dir: Option<PathBuf>,
    /// Files downloaded at the same time (same range as CLI).
    pub max_concurrent_files: Option<u8>,
    /// Range connections per file.
    pub chunk_threads: Option<u8>,
    /// Retry attempts for transient failures.
    pub max_retries: Option<u8>,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Client connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Resources smaller than this many bytes are never chunked.
    pub min_chunk_size: Option<u64>,
    /// Minimum bytes per planned part.
    pub min_part_size: Option<u64>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        validate_range(
            "max_concurrent_files",
            self.max_concurrent_files.map(u64::from),
            1,
            MAX_CONCURRENT_FILES as u64,
        )?;
        validate_range("chunk_threads", self.chunk_threads.map(u64::from), 1, 16)?;
        validate_range("max_retries", self.max_retries.map(u64::from), 0, 10)?;
        validate_range("timeout_ms", self.timeout_ms, 1, 3_600_000)?;
        validate_range("connect_timeout_secs", self.connect_timeout_secs, 1, 3600)?;
        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Log level used when neither `RUST_LOG` nor a CLI flag decides.
    #[must_use]
    pub fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

impl LoadedConfig {
    #[must_use]
    pub fn loaded_from_file(&self) -> bool {
        self.config.is_some()
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/chunkfetch/config.toml`
/// 2. `$HOME/.config/chunkfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("chunkfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("chunkfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.output_dir = Some(PathBuf::from(parsed));
            }
            "max_concurrent_files" => {
                cfg.max_concurrent_files = Some(parse_integer_u8(value).with_context(context)?);
            }
            "chunk_threads" => {
                cfg.chunk_threads = Some(parse_integer_u8(value).with_context(context)?);
            }
            "max_retries" => {
                cfg.max_retries = Some(parse_integer_u8(value).with_context(context)?);
            }
            "timeout_ms" => {
                cfg.timeout_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "min_chunk_size" => {
                cfg.min_chunk_size = Some(parse_integer_u64(value).with_context(context)?);
            }
            "min_part_size" => {
                cfg.min_part_size = Some(parse_integer_u64(value).with_context(context)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

/// Effective runtime settings after merging CLI flags, the config file and
/// built-in defaults, in that order of precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub max_concurrent_files: usize,
    pub chunk_threads: usize,
    pub max_retries: u32,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub min_chunk_size: u64,
    pub min_part_size: u64,
    pub default_log_level: &'static str,
}

impl Settings {
    #[must_use]
    pub fn resolve(args: &Args, file: &FileConfig) -> Self {
        let default_log_level = if args.quiet {
            "error"
        } else {
            match args.verbose {
                0 => file
                    .verbosity
                    .unwrap_or(VerbositySetting::Default)
                    .log_level(),
                1 => "debug",
                _ => "trace",
            }
        };

        Self {
            output_dir: args
                .output_dir
                .clone()
                .or_else(|| file.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            max_concurrent_files: args
                .max_concurrent_files
                .or(file.max_concurrent_files)
                .map_or(DEFAULT_MAX_CONCURRENT_FILES, usize::from),
            chunk_threads: args
                .chunk_threads
                .or(file.chunk_threads)
                .map_or(DEFAULT_CHUNK_THREADS, usize::from),
            max_retries: args
                .max_retries
                .or(file.max_retries)
                .map_or(DEFAULT_MAX_RETRIES, u32::from),
            timeout: args
                .timeout_ms
                .or(file.timeout_ms)
                .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_millis),
            connect_timeout: Duration::from_secs(
                file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
            ),
            min_chunk_size: file.min_chunk_size.unwrap_or(DEFAULT_MIN_SIZE_FOR_CHUNKING),
            min_part_size: file.min_part_size.unwrap_or(DEFAULT_MIN_PART_SIZE),
            default_log_level,
        }
    }
}
