use crate::cache::DEFAULT_DISK_USAGE_BYTES;
use std::env;
use std::path::PathBuf;

/// Default number of network workers.
pub const DEFAULT_NETWORK_THREADS: usize = 4;

/// Default cache directory name under the system temp dir.
pub const DEFAULT_CACHE_DIR: &str = "bees-cache";

/// Queue configuration.
///
/// Environment overrides (see [`QueueConfig::from_env`]):
/// - `BEES_NETWORK_THREADS`
/// - `BEES_CACHE_DIR`
/// - `BEES_CACHE_MAX_BYTES`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub network_threads: usize,
    pub cache_dir: PathBuf,
    pub max_cache_bytes: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            network_threads: DEFAULT_NETWORK_THREADS,
            cache_dir: env::temp_dir().join(DEFAULT_CACHE_DIR),
            max_cache_bytes: DEFAULT_DISK_USAGE_BYTES,
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by any `BEES_*` variables that parse.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(n) = env::var("BEES_NETWORK_THREADS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            cfg.network_threads = n.max(1);
        }
        if let Ok(dir) = env::var("BEES_CACHE_DIR") {
            if !dir.trim().is_empty() {
                cfg.cache_dir = PathBuf::from(dir);
            }
        }
        if let Some(bytes) = env::var("BEES_CACHE_MAX_BYTES")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            cfg.max_cache_bytes = bytes;
        }
        cfg
    }

    pub fn with_network_threads(mut self, n: usize) -> Self {
        self.network_threads = n;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_max_cache_bytes(mut self, bytes: u64) -> Self {
        self.max_cache_bytes = bytes;
        self
    }
}
