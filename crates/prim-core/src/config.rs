//! Optional pool config from .primrc or ~/.primrc (JSON). Merged with env and CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::PrimError;
use crate::pool::{LimitedPool, SubmitOptions};

pub const CONFIG_FILE: &str = ".primrc";

/// Optional config from file. Env and CLI override these.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    pub workers: Option<usize>,
    pub non_blocking: Option<bool>,
    pub timeout_ms: Option<u64>,
}

impl PoolConfig {
    /// Configured worker count, else the number of CPUs.
    pub fn effective_workers(&self) -> usize {
        self.workers
            .filter(|&n| n > 0)
            .unwrap_or_else(|| num_cpus::get().max(1))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn submit_options(&self) -> SubmitOptions {
        SubmitOptions {
            non_blocking: self.non_blocking.unwrap_or(false),
            label: None,
        }
    }

    pub fn build_pool(&self, name: &str) -> Result<LimitedPool, PrimError> {
        LimitedPool::new(name, self.effective_workers())
    }

    /// Fill unset fields from `other`.
    pub fn or(self, other: PoolConfig) -> PoolConfig {
        PoolConfig {
            workers: self.workers.or(other.workers),
            non_blocking: self.non_blocking.or(other.non_blocking),
            timeout_ms: self.timeout_ms.or(other.timeout_ms),
        }
    }
}

fn read_config(path: &Path) -> Option<PoolConfig> {
    let s = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<PoolConfig>(&s) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config file");
            None
        }
    }
}

fn dirs_home() -> Option<PathBuf> {
    #[cfg(unix)]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
}

/// Load config from .primrc in dir, else ~/.primrc. Missing or invalid file = default.
pub fn load_file_config(dir: &Path) -> PoolConfig {
    let mut candidates = vec![dir.join(CONFIG_FILE)];
    if let Some(home) = dirs_home() {
        candidates.push(home.join(CONFIG_FILE));
    }
    for path in &candidates {
        if path.is_file() {
            return read_config(path).unwrap_or_default();
        }
    }
    PoolConfig::default()
}

/// Boolean env value: `1`/`true`/`yes` or `0`/`false`/`no`, any case, trimmed.
pub fn env_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// PRIM_WORKERS, PRIM_NON_BLOCKING, PRIM_TIMEOUT_MS. Unparseable values are ignored.
pub fn env_config() -> PoolConfig {
    PoolConfig {
        workers: std::env::var("PRIM_WORKERS")
            .ok()
            .and_then(|v| v.trim().parse().ok()),
        non_blocking: std::env::var("PRIM_NON_BLOCKING")
            .ok()
            .and_then(|v| env_flag(&v)),
        timeout_ms: std::env::var("PRIM_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.trim().parse().ok()),
    }
}

/// Env over file. Callers layer CLI flags on top with `PoolConfig::or`.
pub fn load_config(dir: &Path) -> PoolConfig {
    env_config().or(load_file_config(dir))
}
