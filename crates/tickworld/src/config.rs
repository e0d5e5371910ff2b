//! Runtime configuration for blocking runs.

use serde::Deserialize;
use tracing::warn;

/// Environment variable overriding the number of worker threads.
pub const WORKER_THREADS_ENV: &str = "TICKWORLD_WORKER_THREADS";

/// Default name given to runtime worker threads.
pub const DEFAULT_THREAD_NAME: &str = "tickworld-worker";

/// Configuration of the tokio runtime built by
/// [`World::run_blocking`](crate::World::run_blocking).
///
/// Embedding applications that already run inside tokio call
/// [`World::run`](crate::World::run) directly and never need this.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker thread count. `None` lets tokio decide (one per core).
    pub worker_threads: Option<usize>,
    /// Name given to worker threads.
    pub thread_name: String,
}

impl RuntimeConfig {
    /// Configuration with tokio's defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            worker_threads: None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }

    /// Read the worker count from `TICKWORLD_WORKER_THREADS`, falling back to
    /// tokio's default when unset or invalid.
    #[must_use]
    pub fn from_env() -> Self {
        let worker_threads = std::env::var(WORKER_THREADS_ENV)
            .ok()
            .and_then(|raw| parse_worker_threads(&raw));
        Self {
            worker_threads,
            ..Self::new()
        }
    }

    /// Override the worker thread count.
    #[must_use]
    pub fn with_worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = Some(count);
        self
    }

    /// Override the worker thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Build a multi-threaded runtime with timers and I/O enabled.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported by tokio if the runtime cannot start.
    pub fn build_runtime(&self) -> std::io::Result<tokio::runtime::Runtime> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all().thread_name(self.thread_name.clone());
        if let Some(count) = self.worker_threads.filter(|count| *count > 0) {
            builder.worker_threads(count);
        }
        builder.build()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_worker_threads(raw: &str) -> Option<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => {
            warn!(
                var = WORKER_THREADS_ENV,
                value = raw,
                "ignoring invalid worker thread count"
            );
            None
        }
        Ok(count) => Some(count),
    }
}
