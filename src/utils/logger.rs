use anyhow::Context;
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

/// Logging setup for applications embedding the library.
///
/// The library itself only emits `tracing` events; installing a subscriber
/// is left to the host, and this is the stock way to do it.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: String,
    pub file_dir: Option<String>,
    pub file_prefix: Option<String>,
    pub rolling: Option<String>,
    pub max_files: usize,
    /// Include the thread name in each line; useful when following a
    /// stream across scheduler workers.
    pub thread_names: bool,
}

impl LoggerConfig {
    /// Read LOG_LEVEL, LOG_FILE_DIR, LOG_FILE_PREFIX and LOG_ROLLING.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            cfg.level = level;
        }
        cfg.file_dir = std::env::var("LOG_FILE_DIR").ok();
        cfg.file_prefix = std::env::var("LOG_FILE_PREFIX").ok();
        if let Ok(rolling) = std::env::var("LOG_ROLLING") {
            cfg.rolling = Some(rolling);
        }
        cfg
    }

    /// Install a global `fmt` subscriber. A subscriber that is already set
    /// is left in place. The returned guard must be held for file output to
    /// be flushed.
    pub fn init(&self) -> anyhow::Result<Option<WorkerGuard>> {
        let level = Level::from_str(&self.level).unwrap_or(Level::INFO);

        let Some(dir) = self.file_dir.as_deref() else {
            let _ = tracing_subscriber::fmt()
                .with_max_level(level)
                .with_thread_names(self.thread_names)
                .try_init();
            tracing::debug!("logging to stdout");
            return Ok(None);
        };

        let prefix = self.file_prefix.as_deref().unwrap_or("titanrx");
        let rotation = match self.rolling.as_deref() {
            Some("hourly") => Rotation::HOURLY,
            Some("minutely") => Rotation::MINUTELY,
            Some("never") => Rotation::NEVER,
            _ => Rotation::DAILY,
        };

        let appender = RollingFileAppender::builder()
            .rotation(rotation)
            .max_log_files(self.max_files.max(1))
            .filename_prefix(prefix)
            .build(dir)
            .with_context(|| format!("failed to create rolling appender in {dir}"))?;

        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_thread_names(self.thread_names)
            .with_ansi(false)
            .with_writer(writer)
            .try_init();

        tracing::info!(dir, prefix, rolling = ?self.rolling, "logging to file");
        Ok(Some(guard))
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_dir: None,
            file_prefix: None,
            rolling: Some("daily".to_string()),
            max_files: 2,
            thread_names: true,
        }
    }
}

/// Rate limiter for a single log call site.
///
/// At most one message passes per `interval`; the next one that passes
/// reports how many were suppressed in between. Used through the
/// `*_throttled!` macros, e.g.
/// `warn_throttled!(Duration::from_secs(1), "dropping item")`.
pub struct Throttle {
    last: Mutex<Instant>,
    suppressed: AtomicU64,
    interval: Duration,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        // Start one interval in the past so the first message passes.
        let start = Instant::now()
            .checked_sub(interval)
            .unwrap_or_else(Instant::now);
        Self {
            last: Mutex::new(start),
            suppressed: AtomicU64::new(0),
            interval,
        }
    }

    /// Returns `Some(suppressed)` when a message may be emitted.
    #[inline]
    pub fn poll(&self) -> Option<u64> {
        let mut last = self.last.lock();
        if last.elapsed() >= self.interval {
            *last = Instant::now();
            Some(self.suppressed.swap(0, Ordering::Relaxed))
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            None
        }
    }
}

/// Level-generic throttled logging; `$level` is one of the `tracing`
/// macro names.
#[macro_export]
macro_rules! log_throttled {
    ($level:ident, $interval:expr, $($arg:tt)*) => {{
        static _THROTTLE: std::sync::OnceLock<$crate::utils::logger::Throttle> =
            std::sync::OnceLock::new();
        let t = _THROTTLE.get_or_init(|| $crate::utils::logger::Throttle::new($interval));
        if let Some(_suppressed) = t.poll() {
            if _suppressed > 0 {
                tracing::$level!(suppressed = _suppressed, $($arg)*);
            } else {
                tracing::$level!($($arg)*);
            }
        }
    }};
}

#[macro_export]
macro_rules! error_throttled { ($interval:expr, $($arg:tt)*) => { $crate::log_throttled!(error, $interval, $($arg)*); } }
#[macro_export]
macro_rules! warn_throttled  { ($interval:expr, $($arg:tt)*) => { $crate::log_throttled!(warn,  $interval, $($arg)*); } }
#[macro_export]
macro_rules! debug_throttled { ($interval:expr, $($arg:tt)*) => { $crate::log_throttled!(debug, $interval, $($arg)*); } }
