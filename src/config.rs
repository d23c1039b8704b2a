//! Environment-driven runtime configuration.
//!
//! Explicit `std::env::var` reads rather than a config-file DSL: there is
//! no file-based configuration concern in scope, just environment
//! variables read once at startup.

use std::env;
use std::time::Duration;

/// Runtime configuration for the pipeline and its dependents.
#[derive(Debug, Clone)]
pub struct YggdrasilConfig {
    /// Path to the embedded SQLite store; `:memory:` for ephemeral use.
    pub db_path: String,
    /// Default request deadline in milliseconds (`maxTimeMs`).
    pub max_time_ms: u64,
    /// Default for `requireMimirAnchor` when a request omits it.
    pub require_mimir_anchor: bool,
    /// Watcher HOT-queue rescan interval.
    pub watcher_hot_interval: Duration,
    /// Watcher WARM-queue rescan interval.
    pub watcher_warm_interval: Duration,
    /// Watcher COLD-queue rescan interval.
    pub watcher_cold_interval: Duration,
    /// Maximum retained alerts in the in-process ring buffer.
    pub alert_buffer_size: usize,
}

impl YggdrasilConfig {
    /// Build configuration from the process environment, falling back to
    /// documented defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("YGGDRASIL_DB_PATH").unwrap_or_else(|_| "yggdrasil.db".to_string()),
            max_time_ms: env_u64("YGGDRASIL_MAX_TIME_MS", 30_000),
            require_mimir_anchor: env_bool("YGGDRASIL_REQUIRE_MIMIR_ANCHOR", true),
            watcher_hot_interval: Duration::from_secs(env_u64(
                "YGGDRASIL_WATCHER_HOT_INTERVAL_SECS",
                3_600,
            )),
            watcher_warm_interval: Duration::from_secs(env_u64(
                "YGGDRASIL_WATCHER_WARM_INTERVAL_SECS",
                86_400,
            )),
            watcher_cold_interval: Duration::from_secs(env_u64(
                "YGGDRASIL_WATCHER_COLD_INTERVAL_SECS",
                604_800,
            )),
            alert_buffer_size: env_u64("YGGDRASIL_ALERT_BUFFER_SIZE", 1_000) as usize,
        }
    }
}

impl Default for YggdrasilConfig {
    fn default() -> Self {
        Self {
            db_path: "yggdrasil.db".to_string(),
            max_time_ms: 30_000,
            require_mimir_anchor: true,
            watcher_hot_interval: Duration::from_secs(3_600),
            watcher_warm_interval: Duration::from_secs(86_400),
            watcher_cold_interval: Duration::from_secs(604_800),
            alert_buffer_size: 1_000,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Adapter connection configuration, one per model provider.
///
/// `JWT_SECRET`/`JWT_EXPIRES_IN`/`DATABASE_URL`/`REDIS_URL` govern the
/// out-of-scope HTTP/auth layer and are intentionally not read here.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_ms: u64,
}

impl AdapterConfig {
    /// Read an adapter's configuration from a provider-specific env-var
    /// prefix, e.g. `from_env_prefix("GROQ")` reads `GROQ_API_KEY` and
    /// `GROQ_BASE_URL`. Absence of the API key means the adapter reports
    /// itself unavailable rather than failing startup.
    pub fn from_env_prefix(prefix: &str) -> Self {
        Self {
            api_key: env::var(format!("{prefix}_API_KEY")).ok(),
            base_url: env::var(format!("{prefix}_BASE_URL")).ok(),
            timeout_ms: env_u64(&format!("{prefix}_TIMEOUT_MS"), 15_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = YggdrasilConfig::default();
        assert_eq!(cfg.max_time_ms, 30_000);
        assert!(cfg.require_mimir_anchor);
        assert_eq!(cfg.watcher_hot_interval, Duration::from_secs(3_600));
        assert_eq!(cfg.watcher_warm_interval, Duration::from_secs(86_400));
        assert_eq!(cfg.watcher_cold_interval, Duration::from_secs(604_800));
        assert_eq!(cfg.alert_buffer_size, 1_000);
    }

    #[test]
    fn adapter_config_without_key_is_absent() {
        let cfg = AdapterConfig::from_env_prefix("YGG_TEST_NONEXISTENT_PROVIDER");
        assert!(cfg.api_key.is_none());
    }
}
