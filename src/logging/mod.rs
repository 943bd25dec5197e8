//! Logging infrastructure - structured tracing throughout the engine
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels per module
//! - Zero-cost when disabled
//! - Console output, optionally JSON, optionally mirrored to a file

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub use tracing::{debug, error, info, trace, warn};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the non-blocking file writer flushing for the process lifetime
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // DIRECTSTATS_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("DIRECTSTATS_LOG_LEVEL") {
            config.level = match level_str.to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::INFO,
            };
        }

        // DIRECTSTATS_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("DIRECTSTATS_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("DIRECTSTATS_LOG_JSON").is_ok();
        config.show_spans = std::env::var("DIRECTSTATS_LOG_SPANS").is_ok();

        config
    }

    /// Create high-performance config (minimal logging)
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Create debug config (verbose logging)
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some("directstats.log".to_string()),
            json_format: false,
            show_spans: true,
        }
    }
}

/// Initialize logging with default configuration
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber. If the host application already
/// installed one, that subscriber is left in place.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("directstats={}", config.level.as_str().to_lowercase()))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let console = (!config.json_format).then(|| {
            fmt::layer()
                .with_writer(io::stdout)
                .with_span_events(span_events.clone())
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions))
        });

        let console_json = config.json_format.then(|| {
            fmt::layer()
                .json()
                .with_writer(io::stdout)
                .with_span_events(span_events.clone())
                .with_target(true)
        });

        let file = config
            .log_path
            .as_deref()
            .filter(|_| config.file_output)
            .map(|path| {
                let path = Path::new(path);
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let name = path
                    .file_name()
                    .map(|n| n.to_owned())
                    .unwrap_or_else(|| "directstats.log".into());

                let (writer, guard) =
                    tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
                let _ = FILE_GUARD.set(guard);

                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_span_events(span_events.clone())
                    .with_target(true)
            });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .with(console_json)
            .with(file)
            .try_init()
            .ok();
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Engine-specific logging functions
// ============================================================================

/// Log block allocation
#[inline]
pub fn log_allocation(address: usize, size: usize, overhead: usize) {
    trace!(
        event = "allocation",
        address = format_args!("{:#x}", address),
        size_bytes = size,
        overhead_bytes = overhead,
        "Memory allocated"
    );
}

/// Log block reallocation
#[inline]
pub fn log_reallocation(old: usize, new: usize, size: usize) {
    trace!(
        event = "reallocation",
        from = format_args!("{:#x}", old),
        to = format_args!("{:#x}", new),
        size_bytes = size,
        "Memory reallocated"
    );
}

/// Log block release
#[inline]
pub fn log_deallocation(address: usize, size: usize) {
    trace!(
        event = "deallocation",
        address = format_args!("{:#x}", address),
        size_bytes = size,
        "Memory deallocated"
    );
}

/// Log an allocation the system allocator refused
pub fn log_allocation_failure(requested: usize) {
    error!(
        event = "allocation_failure",
        requested_bytes = requested,
        "Memory allocation failed"
    );
}

/// Log a new deferred-deallocation registration
#[inline]
pub fn log_registration(id: u64, addresses: usize) {
    trace!(
        event = "registration",
        registration = id,
        addresses,
        "Registered for deferred deallocation"
    );
}

/// Log completed reclamation of one registration
#[inline]
pub fn log_reclaimed(id: u64, freed: usize) {
    debug!(
        event = "reclaimed",
        registration = id,
        freed,
        "Registration reclaimed"
    );
}

/// Log a cleanup hook that panicked
pub fn log_cleanup_failure(id: u64, reason: &str) {
    error!(
        event = "cleanup_failure",
        registration = id,
        reason,
        "Cleanup hook failed, releasing memory anyway"
    );
}

/// Log a rejected buffer append
#[inline]
pub fn log_overrun(capacity: usize, max_size: usize, overruns: u64) {
    debug!(
        event = "overrun",
        capacity,
        max_size,
        overruns,
        "Buffer full, append rejected"
    );
}
