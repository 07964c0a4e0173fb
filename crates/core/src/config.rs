use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str) -> Option<T> {
    profiled_env_opt(profile, key).and_then(|v| v.parse().ok())
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref() {
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") => false,
        _ => default,
    }
}

// ── Engine config ─────────────────────────────────────────────

/// Process-wide engine settings, shared by every job a manager runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    /// Partition count used when a job does not specify one.
    #[serde(default = "default_partitions")]
    pub default_partitions: u32,
    /// How long the coordinator waits for every partition to report
    /// before failing the job.
    #[serde(default = "default_barrier_timeout_ms")]
    pub barrier_timeout_ms: u64,
    /// Hard cap on supersteps per job. `None` = run until global halt.
    #[serde(default)]
    pub max_supersteps: Option<u64>,
    /// Run vertex compute calls of one partition on the rayon pool.
    #[serde(default = "default_parallel_compute")]
    pub parallel_compute: bool,
    /// Supersteps of history kept by the router's dedup window.
    #[serde(default = "default_dedup_window")]
    pub dedup_window: u64,
}

fn default_partitions() -> u32 { 4 }
fn default_barrier_timeout_ms() -> u64 { 30_000 }
fn default_parallel_compute() -> bool { true }
fn default_dedup_window() -> u64 { 2 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            default_partitions: default_partitions(),
            barrier_timeout_ms: default_barrier_timeout_ms(),
            max_supersteps: None,
            parallel_compute: default_parallel_compute(),
            dedup_window: default_dedup_window(),
        }
    }
}

impl EngineConfig {
    /// Build config from environment variables, loading `.env` first.
    /// Profile is read from `SUPERSTEP_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        load_dotenv();
        let profile = env_or("SUPERSTEP_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            default_partitions: profiled_env_parse(p, "SUPERSTEP_DEFAULT_PARTITIONS")
                .unwrap_or_else(default_partitions),
            barrier_timeout_ms: profiled_env_parse(p, "SUPERSTEP_BARRIER_TIMEOUT_MS")
                .unwrap_or_else(default_barrier_timeout_ms),
            max_supersteps: profiled_env_parse(p, "SUPERSTEP_MAX_SUPERSTEPS"),
            parallel_compute: profiled_env_bool(
                p,
                "SUPERSTEP_PARALLEL_COMPUTE",
                default_parallel_compute(),
            ),
            dedup_window: profiled_env_parse(p, "SUPERSTEP_DEDUP_WINDOW")
                .unwrap_or_else(default_dedup_window),
        }
    }

    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.barrier_timeout_ms)
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Engine config loaded (profile: {}):", self.profile_label());
        tracing::info!("  partitions:  default={}", self.default_partitions);
        tracing::info!("  barrier:     timeout={}ms", self.barrier_timeout_ms);
        tracing::info!(
            "  supersteps:  max={}",
            self.max_supersteps
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unbounded".into())
        );
        tracing::info!(
            "  compute:     parallel={}, dedup_window={}",
            self.parallel_compute,
            self.dedup_window
        );
    }
}
