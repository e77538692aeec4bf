use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::models::TriggerPolicy;

/// Application-level constants
pub const APP_NAME: &str = "Reminder Buddy";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Schedule check cadence.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 10;

/// Delay before a declined or unanswered reminder is attempted again.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5 * 60;

/// Upper bound on one reminder attempt. A call rings for up to ~60s.
pub const DEFAULT_IN_FLIGHT_TIMEOUT_SECS: u64 = 60;

/// Cross-process change poll, matching the patient view's 1s reload.
pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 1000;

/// Maximum length of free-text medicine instructions.
pub const INSTRUCTIONS_MAX_LEN: usize = 500;

/// Timeout for requests to the calling backend.
pub const BACKEND_TIMEOUT_SECS: u64 = 30;

/// Default listen address for the HTTP API.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";

/// Medicine name spoken when a call-flow request does not name one.
pub const DEFAULT_SPOKEN_MEDICINE: &str = "your medication";

/// Get the application data directory.
/// ~/ReminderBuddy/ on all platforms, falling back to the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ReminderBuddy")
}

/// Path of the SQLite file that backs the medicine store.
pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("reminder_buddy.db")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "reminder_buddy=info,tower_http=info"
}

// ═══════════════════════════════════════════════════════════
// Runtime configuration
// ═══════════════════════════════════════════════════════════

/// Timing and trigger settings for the reminder engine.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub retry_delay: Duration,
    pub in_flight_timeout: Duration,
    pub trigger_policy: TriggerPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            in_flight_timeout: Duration::from_secs(DEFAULT_IN_FLIGHT_TIMEOUT_SECS),
            trigger_policy: TriggerPolicy::CatchUp,
        }
    }
}

/// Where outbound calls are placed and where call-flow callbacks land.
#[derive(Debug, Clone, Default)]
pub struct TelephonyConfig {
    /// Calling backend that owns the telephony credentials. `None` selects
    /// the local prompt transport and local call-flow rendering.
    pub backend_url: Option<String>,
    /// Public URL of this service, used in call-flow action links.
    pub public_base_url: Option<String>,
}

/// Full service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub listen_addr: SocketAddr,
    pub scheduler: SchedulerConfig,
    pub watch_interval: Duration,
    pub telephony: TelephonyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: app_data_dir(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            scheduler: SchedulerConfig::default(),
            watch_interval: Duration::from_millis(DEFAULT_WATCH_INTERVAL_MS),
            telephony: TelephonyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build the configuration from `REMINDER_BUDDY_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Unparsable values keep their default and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = non_empty(lookup("REMINDER_BUDDY_DATA_DIR")) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(addr) = parse_var(&lookup, "REMINDER_BUDDY_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "REMINDER_BUDDY_TICK_SECS") {
            config.scheduler.tick_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "REMINDER_BUDDY_RETRY_SECS") {
            config.scheduler.retry_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "REMINDER_BUDDY_IN_FLIGHT_TIMEOUT_SECS") {
            config.scheduler.in_flight_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(policy) = parse_var(&lookup, "REMINDER_BUDDY_TRIGGER_POLICY") {
            config.scheduler.trigger_policy = policy;
        }
        config.telephony.backend_url = non_empty(lookup("REMINDER_BUDDY_TELEPHONY_BACKEND_URL"))
            .map(|url| url.trim_end_matches('/').to_string());
        config.telephony.public_base_url = non_empty(lookup("REMINDER_BUDDY_PUBLIC_BASE_URL"))
            .map(|url| url.trim_end_matches('/').to_string());

        config
    }

    /// Public base URL for call-flow links, defaulting to the listen address.
    pub fn public_base_url(&self) -> String {
        self.telephony
            .public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.listen_addr))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = non_empty(lookup(key))?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_ends_with_app_folder() {
        assert!(app_data_dir().ends_with("ReminderBuddy"));
    }

    #[test]
    fn database_path_under_data_dir() {
        let dir = PathBuf::from("/tmp/rb");
        assert_eq!(database_path(&dir), PathBuf::from("/tmp/rb/reminder_buddy.db"));
    }

    #[test]
    fn default_timings() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config.scheduler.tick_interval, Duration::from_secs(10));
        assert_eq!(config.scheduler.retry_delay, Duration::from_secs(300));
        assert_eq!(config.scheduler.in_flight_timeout, Duration::from_secs(60));
        assert_eq!(config.scheduler.trigger_policy, TriggerPolicy::CatchUp);
        assert_eq!(config.watch_interval, Duration::from_secs(1));
        assert!(config.telephony.backend_url.is_none());
        assert_eq!(config.listen_addr.to_string(), DEFAULT_LISTEN_ADDR);
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("REMINDER_BUDDY_DATA_DIR", "/var/lib/rb"),
            ("REMINDER_BUDDY_LISTEN_ADDR", "0.0.0.0:8080"),
            ("REMINDER_BUDDY_TICK_SECS", "5"),
            ("REMINDER_BUDDY_RETRY_SECS", "120"),
            ("REMINDER_BUDDY_TRIGGER_POLICY", "exact_minute"),
            ("REMINDER_BUDDY_TELEPHONY_BACKEND_URL", "http://localhost:3001/"),
            ("REMINDER_BUDDY_PUBLIC_BASE_URL", "https://buddy.example.org"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/rb"));
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.scheduler.tick_interval, Duration::from_secs(5));
        assert_eq!(config.scheduler.retry_delay, Duration::from_secs(120));
        assert_eq!(config.scheduler.trigger_policy, TriggerPolicy::ExactMinute);
        assert_eq!(
            config.telephony.backend_url.as_deref(),
            Some("http://localhost:3001")
        );
        assert_eq!(config.public_base_url(), "https://buddy.example.org");
    }

    #[test]
    fn unparsable_values_keep_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("REMINDER_BUDDY_TICK_SECS", "soon"),
            ("REMINDER_BUDDY_TRIGGER_POLICY", "whenever"),
            ("REMINDER_BUDDY_TELEPHONY_BACKEND_URL", "   "),
        ]));
        assert_eq!(config.scheduler.tick_interval, Duration::from_secs(10));
        assert_eq!(config.scheduler.trigger_policy, TriggerPolicy::CatchUp);
        assert!(config.telephony.backend_url.is_none());
    }

    #[test]
    fn public_base_url_defaults_to_listen_addr() {
        let config = AppConfig::default();
        assert_eq!(config.public_base_url(), "http://127.0.0.1:3000");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.3.0");
    }
}
