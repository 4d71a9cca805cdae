use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_JSON_LOG_FILE: &str = "chat-relay.logs.jsonl";

/// Logging settings resolved from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservabilitySettings {
    pub enabled: bool,
    /// Filter directive (`info`, `chat_relay_core=debug`, ...).
    pub filter: Option<String>,
    /// When set, logs are written as JSON lines to this file instead of stderr.
    pub json_log_path: Option<PathBuf>,
}

impl ObservabilitySettings {
    /// Reads `CHAT_RELAY_OBSERVABILITY_ENABLED` / `CHAT_RELAY_OBSERVABILITY`,
    /// `CHAT_RELAY_LOG_LEVEL` and `CHAT_RELAY_JSON_LOG_PATH`.
    pub fn from_env() -> Self {
        let enabled = [
            "CHAT_RELAY_OBSERVABILITY_ENABLED",
            "CHAT_RELAY_OBSERVABILITY",
        ]
        .into_iter()
        .find_map(|key| std::env::var(key).ok())
        .map(|value| parse_bool_env(&value).unwrap_or(true))
        .unwrap_or(true);

        Self {
            enabled,
            filter: non_empty_env("CHAT_RELAY_LOG_LEVEL"),
            json_log_path: non_empty_env("CHAT_RELAY_JSON_LOG_PATH").map(PathBuf::from),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if let Some(level) = &self.filter
            && let Ok(filter) = EnvFilter::try_new(level)
        {
            return filter;
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parses the boolean spellings accepted by `CHAT_RELAY_*` flags.
pub fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Initialize logging once per process from [`ObservabilitySettings::from_env`].
///
/// Console output goes to stderr so binaries can keep stdout for their own output.
/// `RUST_LOG` applies when `CHAT_RELAY_LOG_LEVEL` is unset or invalid.
pub fn init_observability() {
    init_observability_with(ObservabilitySettings::from_env());
}

/// Like [`init_observability`] with explicit settings. Later calls are no-ops.
pub fn init_observability_with(settings: ObservabilitySettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }

        let env_filter = settings.env_filter();
        if let Some(path) = &settings.json_log_path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = std::fs::create_dir_all(parent);
            }
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(DEFAULT_JSON_LOG_FILE);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_boolean_spellings() {
        assert_eq!(parse_bool_env(" On "), Some(true));
        assert_eq!(parse_bool_env("disabled"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn invalid_filter_falls_back_without_panicking() {
        let settings = ObservabilitySettings {
            enabled: true,
            filter: Some("[[not a filter".into()),
            json_log_path: None,
        };
        let _ = settings.env_filter();
    }
}
