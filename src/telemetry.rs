//! Telemetry and tracing utilities
//!
//! This module provides utilities for initializing and configuring tracing subscribers.
//!
//! ## Example
//!
//! ```rust,ignore
//! use assistant_relay::telemetry::{init_subscriber, SubscriberConfig, OutputFormat};
//!
//! let config = SubscriberConfig::builder()
//!     .log_level(tracing::Level::DEBUG)
//!     .output_format(OutputFormat::Json)
//!     .build();
//! let _guard = init_subscriber(config)?;
//! ```

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::error::{RelayError, Result};

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON with span context
    Json,
    /// Flattened JSON without span context
    JsonCompact,
}

impl std::str::FromStr for OutputFormat {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "json-compact" => Ok(Self::JsonCompact),
            _ => Err(RelayError::TelemetryInit(format!(
                "Invalid log format: {s}. Valid options: text, json, json-compact"
            ))),
        }
    }
}

/// Configuration for tracing subscriber
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub log_level: tracing::Level,
    pub output_format: OutputFormat,
    /// Write to stdout
    pub enable_console: bool,
    /// Also append to this file (optional)
    pub log_file: Option<PathBuf>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            output_format: OutputFormat::Text,
            enable_console: true,
            log_file: None,
        }
    }
}

impl SubscriberConfig {
    pub fn builder() -> SubscriberConfigBuilder {
        SubscriberConfigBuilder::default()
    }

    /// Read `RELAY_LOG_LEVEL`, `RELAY_LOG_FORMAT`, `RELAY_LOG_FILE` and
    /// `RELAY_LOG_CONSOLE` through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(level) = lookup("RELAY_LOG_LEVEL") {
            builder = builder.log_level_str(&level)?;
        }
        if let Some(format) = lookup("RELAY_LOG_FORMAT") {
            builder = builder.output_format(format.parse()?);
        }
        if let Some(file_path) = lookup("RELAY_LOG_FILE").filter(|p| !p.trim().is_empty()) {
            builder = builder.log_file(PathBuf::from(file_path));
        }
        if let Some(console) = lookup("RELAY_LOG_CONSOLE") {
            builder = builder.enable_console(parse_switch("RELAY_LOG_CONSOLE", &console)?);
        }

        Ok(builder.build())
    }
}

/// Builder for SubscriberConfig
#[derive(Debug, Default)]
pub struct SubscriberConfigBuilder {
    log_level: Option<tracing::Level>,
    output_format: Option<OutputFormat>,
    enable_console: Option<bool>,
    log_file: Option<PathBuf>,
}

impl SubscriberConfigBuilder {
    pub fn log_level(mut self, level: tracing::Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Set the log level from a string
    pub fn log_level_str(mut self, level: &str) -> Result<Self> {
        let level = match level.trim().to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => {
                return Err(RelayError::TelemetryInit(format!(
                    "Invalid log level: {level}. Valid options: trace, debug, info, warn, error"
                )));
            }
        };
        Ok(self.log_level(level))
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn enable_console(mut self, enable: bool) -> Self {
        self.enable_console = Some(enable);
        self
    }

    pub fn log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    pub fn build(self) -> SubscriberConfig {
        SubscriberConfig {
            log_level: self.log_level.unwrap_or(tracing::Level::INFO),
            output_format: self.output_format.unwrap_or_default(),
            enable_console: self.enable_console.unwrap_or(true),
            log_file: self.log_file,
        }
    }
}

fn parse_switch(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RelayError::TelemetryInit(format!(
            "Invalid value for {key}: {raw}. Expected true or false"
        ))),
    }
}

fn file_writer(path: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let file_name = path.file_name().ok_or_else(|| {
        RelayError::TelemetryInit(format!("Log file path has no file name: {}", path.display()))
    })?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| {
        RelayError::TelemetryInit(format!("Failed to create log directory {}: {e}", dir.display()))
    })?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

fn make_writer(config: &SubscriberConfig) -> Result<(BoxMakeWriter, Option<WorkerGuard>)> {
    match (&config.log_file, config.enable_console) {
        (Some(path), true) => {
            let (file, guard) = file_writer(path)?;
            Ok((BoxMakeWriter::new(std::io::stdout.and(file)), Some(guard)))
        }
        (Some(path), false) => {
            let (file, guard) = file_writer(path)?;
            Ok((BoxMakeWriter::new(file), Some(guard)))
        }
        (None, true) => Ok((BoxMakeWriter::new(std::io::stdout), None)),
        (None, false) => Ok((BoxMakeWriter::new(std::io::sink), None)),
    }
}

/// Initialize tracing subscriber with the given configuration
///
/// Returns the file writer's guard when file logging is enabled; it must be
/// kept alive for the duration of the program or buffered lines are lost.
/// A subscriber that is already installed is left in place.
pub fn init_subscriber(config: SubscriberConfig) -> Result<Option<WorkerGuard>> {
    let level_str = match config.log_level {
        tracing::Level::TRACE => "trace",
        tracing::Level::DEBUG => "debug",
        tracing::Level::INFO => "info",
        tracing::Level::WARN => "warn",
        tracing::Level::ERROR => "error",
    };
    let filter = format!("assistant_relay={level_str}");

    let (writer, guard) = make_writer(&config)?;
    let ansi = config.log_file.is_none() && config.enable_console;

    let init_result = match config.output_format {
        OutputFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .json()
            .try_init(),
        OutputFormat::JsonCompact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .try_init(),
        OutputFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .try_init(),
    };

    match init_result {
        Ok(()) => Ok(guard),
        Err(e) => {
            let error_msg = e.to_string();
            if error_msg.contains("global default trace dispatcher has already been set") {
                Ok(None)
            } else {
                Err(RelayError::TelemetryInit(format!(
                    "Failed to initialize tracing: {e}"
                )))
            }
        }
    }
}

/// Initialize tracing subscriber from the process environment.
///
/// Supported environment variables:
/// - `RELAY_LOG_LEVEL`: Log level (trace, debug, info, warn, error)
/// - `RELAY_LOG_FORMAT`: Output format (text, json, json-compact)
/// - `RELAY_LOG_FILE`: Log file path
/// - `RELAY_LOG_CONSOLE`: Also write to stdout (default true)
pub fn init_from_env() -> Result<Option<WorkerGuard>> {
    init_subscriber(SubscriberConfig::from_lookup(|key| std::env::var(key).ok())?)
}
