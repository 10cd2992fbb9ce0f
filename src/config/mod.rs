use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::breaker::{BreakerRegistry, BreakerSettings};

/// Gateway configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "gatekeeper")]
#[command(about = "Policy decision gateway")]
pub struct Config {
    /// Path to the rule YAML file
    #[arg(long, default_value = "rules.yaml", env = "GATEKEEPER_RULES_PATH")]
    pub rules_path: PathBuf,

    /// Rule file change check interval in seconds
    #[arg(
        long,
        default_value = "30",
        env = "GATEKEEPER_RULES_RELOAD_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub rules_reload_secs: u64,

    /// Observe only: flag/block become allow unless a rule overrides
    #[arg(long, env = "GATEKEEPER_SHADOW_MODE")]
    pub shadow_mode: bool,

    /// Audit log file (JSON lines); in-memory when unset
    #[arg(long, env = "GATEKEEPER_AUDIT_PATH")]
    pub audit_path: Option<PathBuf>,

    /// fsync the audit file after every record
    #[arg(long, env = "GATEKEEPER_AUDIT_SYNC")]
    pub audit_sync: bool,

    /// Audit chain verification interval in seconds (0 disables)
    #[arg(long, default_value = "300", env = "GATEKEEPER_AUDIT_VERIFY_SECS")]
    pub audit_verify_secs: u64,

    /// Latency budget in milliseconds for one decision
    #[arg(long, default_value = "100", env = "GATEKEEPER_LATENCY_BUDGET_MS")]
    pub latency_budget_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "GATEKEEPER_LOG_JSON")]
    pub log_json: bool,

    /// Consecutive failures before a breaker opens
    #[arg(long, default_value = "5", env = "GATEKEEPER_BREAKER_THRESHOLD")]
    pub breaker_failure_threshold: u32,

    /// Seconds an open breaker waits before a trial call
    #[arg(long, default_value = "30", env = "GATEKEEPER_BREAKER_RECOVERY_SECS")]
    pub breaker_recovery_secs: u64,

    /// Per-call timeout in milliseconds for guarded dependencies
    #[arg(long, env = "GATEKEEPER_BREAKER_CALL_TIMEOUT_MS")]
    pub breaker_call_timeout_ms: Option<u64>,

    /// Per-dependency breaker settings: name=threshold:recovery_secs[:timeout_ms]
    #[arg(
        long = "breaker",
        env = "GATEKEEPER_BREAKERS",
        value_delimiter = ',',
        value_parser = parse_breaker_override
    )]
    pub breakers: Vec<BreakerOverride>,
}

/// Breaker settings for one named dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerOverride {
    pub dependency: String,
    pub settings: BreakerSettings,
}

/// Parse `name=threshold:recovery_secs[:timeout_ms]`.
pub fn parse_breaker_override(s: &str) -> Result<BreakerOverride, String> {
    let (name, values) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=threshold:recovery_secs[:timeout_ms], got {:?}", s))?;

    let name = name.trim();
    if name.is_empty() {
        return Err("breaker name cannot be empty".to_string());
    }

    let parts: Vec<&str> = values.split(':').map(str::trim).collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("expected threshold:recovery_secs[:timeout_ms], got {:?}", values));
    }

    let failure_threshold: u32 = parts[0]
        .parse()
        .map_err(|_| format!("invalid failure threshold {:?}", parts[0]))?;
    if failure_threshold == 0 {
        return Err("failure threshold must be at least 1".to_string());
    }

    let recovery_secs: u64 = parts[1]
        .parse()
        .map_err(|_| format!("invalid recovery seconds {:?}", parts[1]))?;

    let call_timeout = match parts.get(2) {
        Some(ms) => Some(Duration::from_millis(
            ms.parse()
                .map_err(|_| format!("invalid timeout milliseconds {:?}", ms))?,
        )),
        None => None,
    };

    Ok(BreakerOverride {
        dependency: name.to_string(),
        settings: BreakerSettings {
            failure_threshold,
            recovery_timeout: Duration::from_secs(recovery_secs),
            call_timeout,
        },
    })
}

impl Config {
    /// Get rule reload interval as Duration, at least one second.
    pub fn rules_reload_interval(&self) -> Duration {
        Duration::from_secs(self.rules_reload_secs.max(1))
    }

    /// Audit verification interval, None when disabled.
    pub fn audit_verify_interval(&self) -> Option<Duration> {
        (self.audit_verify_secs > 0).then(|| Duration::from_secs(self.audit_verify_secs))
    }

    pub fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }

    /// Settings for dependencies without an override.
    pub fn breaker_defaults(&self) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: self.breaker_failure_threshold.max(1),
            recovery_timeout: Duration::from_secs(self.breaker_recovery_secs),
            call_timeout: self.breaker_call_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Per-dependency settings; the last override for a name wins.
    pub fn breaker_overrides(&self) -> HashMap<String, BreakerSettings> {
        self.breakers
            .iter()
            .map(|o| (o.dependency.clone(), o.settings))
            .collect()
    }

    pub fn breaker_registry(&self) -> BreakerRegistry {
        BreakerRegistry::with_overrides(self.breaker_defaults(), self.breaker_overrides())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rules_path: PathBuf::from("rules.yaml"),
            rules_reload_secs: 30,
            shadow_mode: false,
            audit_path: None,
            audit_sync: false,
            audit_verify_secs: 300,
            latency_budget_ms: 100,
            log_level: "info".to_string(),
            log_json: false,
            breaker_failure_threshold: 5,
            breaker_recovery_secs: 30,
            breaker_call_timeout_ms: None,
            breakers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.rules_path, PathBuf::from("rules.yaml"));
        assert!(!config.shadow_mode);
        assert_eq!(config.breaker_defaults(), BreakerSettings::default());
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config {
            rules_reload_secs: 60,
            audit_verify_secs: 0,
            latency_budget_ms: 25,
            ..Default::default()
        };

        assert_eq!(config.rules_reload_interval(), Duration::from_secs(60));
        assert_eq!(config.audit_verify_interval(), None);
        assert_eq!(config.latency_budget(), Duration::from_millis(25));
    }

    #[test]
    fn test_parse_breaker_override() {
        let parsed = parse_breaker_override("llm-classifier=3:10:500").unwrap();
        assert_eq!(parsed.dependency, "llm-classifier");
        assert_eq!(parsed.settings.failure_threshold, 3);
        assert_eq!(parsed.settings.recovery_timeout, Duration::from_secs(10));
        assert_eq!(parsed.settings.call_timeout, Some(Duration::from_millis(500)));

        let no_timeout = parse_breaker_override("geo=2:5").unwrap();
        assert_eq!(no_timeout.settings.call_timeout, None);
    }

    #[test]
    fn test_parse_breaker_override_rejects_garbage() {
        assert!(parse_breaker_override("llm").is_err());
        assert!(parse_breaker_override("=3:10").is_err());
        assert!(parse_breaker_override("llm=0:10").is_err());
        assert!(parse_breaker_override("llm=3").is_err());
        assert!(parse_breaker_override("llm=3:x").is_err());
        assert!(parse_breaker_override("llm=3:10:5:1").is_err());
    }

    #[test]
    fn test_zero_reload_interval_rejected() {
        let err = Config::try_parse_from(["gatekeeper", "--rules-reload-secs", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        let config = Config {
            rules_reload_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.rules_reload_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_cli_parsing() {
        let config = Config::try_parse_from([
            "gatekeeper",
            "--rules-path",
            "/etc/gatekeeper/rules.yaml",
            "--shadow-mode",
            "--breaker",
            "llm-classifier=2:15",
            "--breaker",
            "geo=4:60:250",
        ])
        .unwrap();

        assert!(config.shadow_mode);
        assert_eq!(config.breakers.len(), 2);

        let registry = config.breaker_registry();
        assert_eq!(registry.settings_for("llm-classifier").failure_threshold, 2);
        assert_eq!(
            registry.settings_for("geo").call_timeout,
            Some(Duration::from_millis(250))
        );
        assert_eq!(registry.settings_for("other"), config.breaker_defaults());
    }
}
