use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default = "LoggingConfig::default_keep_days")]
    pub keep_days: u64,
    /// Mirror log lines to stderr. Off on device, where nothing reads the console.
    #[serde(default)]
    pub console: bool,
}

impl LoggingConfig {
    const fn default_enabled() -> bool {
        true
    }

    fn default_level() -> String {
        "info".to_string()
    }

    const fn default_keep_days() -> u64 {
        7
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            level: Self::default_level(),
            keep_days: Self::default_keep_days(),
            console: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: LoggingConfig = serde_json::from_str(r#"{"level":"debug"}"#).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.keep_days, 7);
        assert!(!cfg.console);
    }
}
