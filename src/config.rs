// Runtime configuration, read from the environment (and `.env` if present).
//
// Every value has a default. A value that is set but cannot be parsed falls back to
// its default with a warning, so a typo never stops the process from starting.

use crate::core::moderation::AutoBanPolicy;
use crate::session::SessionSettings;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_RESTRICTED_WORDS: &str = "spam,abuse,violation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub storage: StorageBackend,
    pub bus_capacity: usize,
    pub session: SessionSettings,
    pub restricted_words: Vec<String>,
    /// Seeded into the moderation store on first start only.
    pub auto_ban: AutoBanPolicy,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = AutoBanPolicy::default();

        let session = SessionSettings {
            heartbeat_interval: Duration::from_secs(positive(
                &lookup,
                "REALTIME_HEARTBEAT_SECS",
                30,
            )),
            typing_sweep_interval: Duration::from_millis(positive(
                &lookup,
                "REALTIME_TYPING_SWEEP_MS",
                500,
            )),
            presence_stale_after: chrono::Duration::seconds(
                positive(&lookup, "REALTIME_PRESENCE_STALE_SECS", 90) as i64,
            ),
        };

        let restricted_words = lookup("REALTIME_RESTRICTED_WORDS")
            .unwrap_or_else(|| DEFAULT_RESTRICTED_WORDS.to_string())
            .split(',')
            .map(|word| word.trim().to_string())
            .filter(|word| !word.is_empty())
            .collect();

        let auto_ban = AutoBanPolicy {
            enabled: parse_or(&lookup, "AUTOBAN_ENABLED", defaults.enabled),
            threshold_count: parse_or(&lookup, "AUTOBAN_THRESHOLD", defaults.threshold_count),
            window_hours: parse_or(&lookup, "AUTOBAN_WINDOW_HOURS", defaults.window_hours),
            first_duration_hours: parse_or(
                &lookup,
                "AUTOBAN_FIRST_HOURS",
                defaults.first_duration_hours,
            ),
            second_duration_hours: parse_or(
                &lookup,
                "AUTOBAN_SECOND_HOURS",
                defaults.second_duration_hours,
            ),
            third_duration_hours: parse_or(
                &lookup,
                "AUTOBAN_THIRD_HOURS",
                defaults.third_duration_hours,
            ),
        };

        Self {
            data_dir: lookup("REALTIME_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            storage: parse_or(&lookup, "REALTIME_STORAGE", StorageBackend::Sqlite),
            bus_capacity: positive(&lookup, "REALTIME_BUS_CAPACITY", 256) as usize,
            session,
            restricted_words,
            auto_ban,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("realtime.db")
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, ?default, "Invalid config value, using default");
            default
        }),
    }
}

fn positive(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    match parse_or(lookup, key, default) {
        0 => {
            tracing::warn!(key, default, "Config value must be positive, using default");
            default
        }
        value => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = config(&[]);

        assert_eq!(config.storage, StorageBackend::Sqlite);
        assert_eq!(config.bus_capacity, 256);
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.session.typing_sweep_interval, Duration::from_millis(500));
        assert_eq!(config.session.presence_stale_after, chrono::Duration::seconds(90));
        assert_eq!(config.restricted_words, vec!["spam", "abuse", "violation"]);
        assert_eq!(config.auto_ban, AutoBanPolicy::default());
        assert_eq!(config.database_path(), PathBuf::from("data").join("realtime.db"));
    }

    #[test]
    fn test_values_are_read_from_the_environment() {
        let config = config(&[
            ("REALTIME_STORAGE", "Memory"),
            ("REALTIME_RESTRICTED_WORDS", " foo , ,bar "),
            ("AUTOBAN_ENABLED", "true"),
            ("AUTOBAN_THRESHOLD", "5"),
            ("REALTIME_DATA_DIR", "/tmp/realtime"),
        ]);

        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.restricted_words, vec!["foo", "bar"]);
        assert!(config.auto_ban.enabled);
        assert_eq!(config.auto_ban.threshold_count, 5);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/realtime"));
    }

    #[test]
    fn test_bad_values_fall_back_to_defaults() {
        let config = config(&[
            ("REALTIME_BUS_CAPACITY", "lots"),
            ("REALTIME_HEARTBEAT_SECS", "0"),
            ("REALTIME_STORAGE", "postgres"),
            ("AUTOBAN_WINDOW_HOURS", "-3"),
        ]);

        assert_eq!(config.bus_capacity, 256);
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.storage, StorageBackend::Sqlite);
        assert_eq!(config.auto_ban.window_hours, 24);
    }
}
