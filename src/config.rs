use crate::scheduler::Schedulers;
use crate::utils::config_io::load_cfg_merge;
use crate::utils::logger::LoggerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;

/// Environment prefix for overrides, e.g. `RX_SCHEDULERS__IO_KEEP_ALIVE_MS=5000`.
pub const ENV_PREFIX: &str = "RX";

/// Process-wide settings for the scheduler pools and logging.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RxConfig {
    pub schedulers: SchedulerConfig,
    pub logger: LoggerConfig,
}

impl RxConfig {
    /// Merge the given files (missing ones are skipped) with `RX_*`
    /// environment overrides.
    pub fn load<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> anyhow::Result<Self> {
        load_cfg_merge(paths, Some(ENV_PREFIX))
    }

    /// Install the logger and reconfigure the global scheduler pools.
    pub fn apply(&self) -> anyhow::Result<Option<WorkerGuard>> {
        let guard = self.logger.init()?;
        Schedulers::init(self.schedulers.clone());
        Ok(guard)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Size of the computation pool; `None` or 0 means available parallelism.
    pub computation_threads: Option<usize>,
    /// Pin computation threads to cores round-robin.
    pub pin_computation_threads: bool,
    /// How long an idle io thread is kept for reuse.
    pub io_keep_alive_ms: u64,
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            computation_threads: None,
            pin_computation_threads: false,
            io_keep_alive_ms: 60_000,
            thread_name_prefix: "rx".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn computation_threads(&self) -> usize {
        self.computation_threads
            .filter(|n| *n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }

    #[inline]
    pub fn io_keep_alive(&self) -> Duration {
        Duration::from_millis(self.io_keep_alive_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: RxConfig =
            serde_json::from_str(r#"{"schedulers":{"computation_threads":3}}"#).unwrap();
        assert_eq!(cfg.schedulers.computation_threads(), 3);
        assert_eq!(cfg.schedulers.io_keep_alive(), Duration::from_secs(60));
        assert_eq!(cfg.schedulers.thread_name_prefix, "rx");
        assert_eq!(cfg.logger.level, "info");
    }

    #[test]
    fn zero_threads_falls_back_to_parallelism() {
        let cfg = SchedulerConfig {
            computation_threads: Some(0),
            ..Default::default()
        };
        assert!(cfg.computation_threads() >= 1);
    }

    #[test]
    fn load_without_files_uses_defaults() {
        let cfg = RxConfig::load(["/nonexistent/rx.toml"]).unwrap();
        assert!(!cfg.schedulers.pin_computation_threads);
    }
}
