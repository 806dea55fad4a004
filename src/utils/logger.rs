use anyhow::Context;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggerConfig {
    #[serde(default = "LoggerConfig::default_level")]
    pub level: String,
    /// Write to rolling files in this directory instead of stdout.
    #[serde(default)]
    pub file_dir: Option<String>,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// `minutely`, `hourly` or `daily` (default).
    #[serde(default)]
    pub rolling: Option<String>,
    #[serde(default = "LoggerConfig::default_max_files")]
    pub max_files: usize,
}

impl LoggerConfig {
    fn default_level() -> String {
        "info".to_string()
    }

    fn default_max_files() -> usize {
        5
    }

    /// Reads `MQBRIDGE_LOG_LEVEL`, `MQBRIDGE_LOG_DIR`, `MQBRIDGE_LOG_PREFIX`
    /// and `MQBRIDGE_LOG_ROLLING`; unset variables keep their defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(level) = std::env::var("MQBRIDGE_LOG_LEVEL") {
            cfg.level = level;
        }
        cfg.file_dir = std::env::var("MQBRIDGE_LOG_DIR").ok();
        cfg.file_prefix = std::env::var("MQBRIDGE_LOG_PREFIX").ok();
        if let Ok(rolling) = std::env::var("MQBRIDGE_LOG_ROLLING") {
            cfg.rolling = Some(rolling);
        }
        cfg
    }

    fn rotation(&self) -> Rotation {
        match self.rolling.as_deref() {
            Some("minutely") => Rotation::MINUTELY,
            Some("hourly") => Rotation::HOURLY,
            _ => Rotation::DAILY,
        }
    }

    /// Installs a global fmt subscriber. The returned guard must be kept
    /// alive for file output to be flushed. A subscriber that is already
    /// installed is left in place.
    pub fn init(&self) -> anyhow::Result<Option<WorkerGuard>> {
        let level = Level::from_str(&self.level).unwrap_or(Level::INFO);

        let Some(dir) = self.file_dir.as_deref() else {
            let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
            return Ok(None);
        };

        let prefix = self.file_prefix.as_deref().unwrap_or("mqbridge");
        let appender = RollingFileAppender::builder()
            .rotation(self.rotation())
            .max_log_files(self.max_files)
            .filename_prefix(prefix)
            .build(dir)
            .with_context(|| format!("failed to create rolling log appender in {dir}"))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(writer)
            .try_init();
        tracing::info!("[Logger] writing to {dir}/{prefix}.* ({:?})", self.rolling);
        Ok(Some(guard))
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            file_dir: None,
            file_prefix: None,
            rolling: None,
            max_files: Self::default_max_files(),
        }
    }
}

/// Rate limiter for one log callsite.
///
/// `poll` lets one message through per interval and reports how many were
/// swallowed since the last one that got through.
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
    suppressed: AtomicU64,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
            suppressed: AtomicU64::new(0),
        }
    }

    pub fn poll(&self) -> Option<u64> {
        let mut last = self.last.lock();
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.interval => {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                None
            }
            _ => {
                *last = Some(now);
                Some(self.suppressed.swap(0, Ordering::Relaxed))
            }
        }
    }
}

/// Logs through `$throttle` (a [`Throttle`]), so each owner rate-limits
/// its own messages.
#[macro_export]
macro_rules! log_throttled {
    ($level:ident, $throttle:expr, $($arg:tt)*) => {{
        if let Some(suppressed) = $throttle.poll() {
            if suppressed > 0 {
                tracing::$level!(suppressed, $($arg)*);
            } else {
                tracing::$level!($($arg)*);
            }
        }
    }};
}

#[macro_export]
macro_rules! warn_throttled {
    ($throttle:expr, $($arg:tt)*) => { $crate::log_throttled!(warn, $throttle, $($arg)*) };
}
