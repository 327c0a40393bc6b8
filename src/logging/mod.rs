//! Logging infrastructure - structured tracing for the object runtime
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Level from the runtime configuration, overridable per process through
//!   `LAZYCLONE_LOG_*` variables or `RUST_LOG`
//! - Zero-cost when disabled: hot-path events are `trace!`
//! - Console or file output (non-blocking appender), text or JSON
//! - Domain events for the clone protocol (fork, copy, recycle, freeze),
//!   the memo, the allocator and the cycle collector

use once_cell::sync::OnceCell;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub use tracing::{debug, error, info, trace, warn};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the non-blocking file writer flushing for the life of the process
static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

const LEVEL_ENV: &str = "LAZYCLONE_LOG_LEVEL";
const FILE_ENV: &str = "LAZYCLONE_LOG_FILE";
const JSON_ENV: &str = "LAZYCLONE_LOG_JSON";
const SPANS_ENV: &str = "LAZYCLONE_LOG_SPANS";

/// Where and how events are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    /// Log file; console output when unset
    pub log_path: Option<PathBuf>,
    pub json_format: bool,
    /// Emit span enter/close events
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

/// Parse a level name, case-insensitively
pub fn parse_level(name: &str) -> Option<Level> {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

impl LogConfig {
    /// The installed runtime configuration, then environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::from_runtime(&crate::config::get().log);

        if let Some(level) = std::env::var(LEVEL_ENV).ok().as_deref().and_then(parse_level) {
            config.level = level;
        }
        if let Some(path) = std::env::var_os(FILE_ENV) {
            config.log_path = Some(PathBuf::from(path));
        }
        config.json_format |= std::env::var_os(JSON_ENV).is_some();
        config.show_spans |= std::env::var_os(SPANS_ENV).is_some();
        config
    }

    /// Settings from the `[log]` table of the runtime configuration
    pub fn from_runtime(log: &crate::config::LogSettings) -> Self {
        Self {
            level: parse_level(&log.level).unwrap_or(Level::INFO),
            json_format: log.json,
            ..Self::default()
        }
    }

    /// Errors only, for benchmarks
    pub fn quiet() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Every protocol event, with spans, written to `path`
    pub fn verbose(path: impl Into<PathBuf>) -> Self {
        Self {
            level: Level::TRACE,
            log_path: Some(path.into()),
            json_format: false,
            show_spans: true,
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("lazyclone={}", self.level.as_str().to_ascii_lowercase()))
        })
    }
}

/// Initialize logging from the runtime configuration and environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with an explicit configuration.
///
/// Only the first call does anything. A subscriber already installed by the
/// host application is left in place.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let output = match &config.log_path {
            Some(path) => file_layer(&config, path),
            None => console_layer(&config),
        };
        let _ = tracing_subscriber::registry()
            .with(config.filter())
            .with(output)
            .try_init();
    });
}

fn console_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_writer(io::stdout)
        .with_span_events(config.span_events())
        .with_thread_ids(cfg!(debug_assertions))
        .with_line_number(cfg!(debug_assertions));
    if config.json_format {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

fn file_layer<S>(config: &LogConfig, path: &Path) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
    let _ = FILE_GUARD.set(guard);

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_span_events(config.span_events());
    if config.json_format {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ===== Allocator events =====

#[inline]
pub fn log_allocation(size: usize, ptr: *const u8) {
    trace!(event = "allocation", size_bytes = size, address = ?ptr);
}

#[inline]
pub fn log_deallocation(ptr: *const u8, owner: u32) {
    trace!(event = "deallocation", address = ?ptr, partition = owner);
}

// ===== Clone protocol events =====

#[inline]
pub fn log_freeze(class: &str, single: bool) {
    trace!(event = "freeze", class, single);
}

pub fn log_fork(label: usize, inherited: usize) {
    debug!(
        event = "fork",
        label = format_args!("{label:#x}"),
        inherited_entries = inherited,
        "label forked"
    );
}

#[inline]
pub fn log_copy(class: &str, from: usize, to: usize) {
    trace!(
        event = "copy",
        class,
        from = format_args!("{from:#x}"),
        to = format_args!("{to:#x}")
    );
}

#[inline]
pub fn log_recycle(class: &str, address: usize) {
    trace!(event = "recycle", class, address = format_args!("{address:#x}"));
}

pub fn log_memo_resize(old_capacity: usize, new_capacity: usize, dropped: usize) {
    debug!(
        event = "memo_resize",
        old_capacity,
        new_capacity,
        dropped_entries = dropped,
        "memo table grown"
    );
}

// ===== Cycle collector events =====

pub fn log_gc_start(candidates: usize) {
    debug!(event = "gc_start", candidates, "cycle collection started");
}

pub fn log_gc_mark(marked: usize) {
    trace!(event = "gc_mark", objects_marked = marked);
}

pub fn log_gc_sweep(swept: usize) {
    trace!(event = "gc_sweep", objects_swept = swept);
}

pub fn log_gc_complete(duration_us: u64, collected: usize, scanned: usize) {
    info!(
        event = "gc_complete",
        objects_collected = collected,
        candidates = scanned,
        duration_us,
        "cycle collection complete"
    );
}

// ===== Lifecycle =====

pub fn log_runtime_init() {
    info!(event = "runtime_init", version = env!("CARGO_PKG_VERSION"), "lazyclone runtime starting");
}

pub fn log_runtime_shutdown() {
    info!(event = "runtime_shutdown", "lazyclone runtime stopped");
}

/// Scoped timing of slow-path operations
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Logs the elapsed time of `operation` when the guard drops
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            debug!(
                operation = self.operation,
                duration_us = self.start.elapsed().as_micros() as u64,
                "operation timed"
            );
        }
    }
}
