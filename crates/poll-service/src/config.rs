//! Live Poll Service configuration.
//!
//! Configuration is loaded from environment variables. Malformed values fail
//! startup instead of silently falling back to defaults.

use common::config::ObservabilityConfig;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Default WebSocket gateway bind address.
pub const DEFAULT_GATEWAY_BIND_ADDRESS: &str = "0.0.0.0:3001";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default upper bound for a round's vote-collection window.
pub const DEFAULT_MAX_TIMER_SECONDS: u64 = 600;

/// Default maximum number of options per round.
pub const DEFAULT_MAX_OPTIONS: usize = 10;

/// Default maximum display-name length (characters).
pub const DEFAULT_MAX_NAME_LENGTH: usize = 64;

/// Default capacity of the outbound notification channel.
pub const DEFAULT_NOTIFICATION_BUFFER: usize = 1024;

/// Default tracing filter.
pub const DEFAULT_LOG_FILTER: &str = "poll_service=debug,tower_http=debug";

/// Default session ID prefix.
pub const DEFAULT_SESSION_ID_PREFIX: &str = "poll";

/// Which participants must have voted before a round completes early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// Every currently connected participant must have voted. A participant
    /// joining mid-round without voting holds completion until the timer.
    #[default]
    AllConnected,
    /// Only participants connected when the round started are counted.
    /// Late joiners may vote but never hold completion.
    RoundRoster,
}

impl CompletionPolicy {
    /// Returns the policy as its configuration string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CompletionPolicy::AllConnected => "all_connected",
            CompletionPolicy::RoundRoster => "round_roster",
        }
    }
}

impl FromStr for CompletionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all_connected" => Ok(CompletionPolicy::AllConnected),
            "round_roster" => Ok(CompletionPolicy::RoundRoster),
            other => Err(ConfigError::InvalidValue(format!(
                "POLL_COMPLETION_POLICY must be all_connected or round_roster, got {other}"
            ))),
        }
    }
}

/// Limits applied to every round and participant, shared by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Longest allowed vote-collection window.
    pub max_timer_seconds: u64,
    /// Most options a round may offer.
    pub max_options: usize,
    /// Display names are truncated to this many characters.
    pub max_name_length: usize,
    /// Completion rule for early finalization.
    pub completion_policy: CompletionPolicy,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_timer_seconds: DEFAULT_MAX_TIMER_SECONDS,
            max_options: DEFAULT_MAX_OPTIONS,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            completion_policy: CompletionPolicy::AllConnected,
        }
    }
}

/// Live Poll Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket gateway bind address (default: "0.0.0.0:3001").
    pub gateway_bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Identifier of this polling session, used in logs.
    pub session_id: String,

    /// Round and participant limits.
    pub limits: SessionLimits,

    /// Capacity of the outbound notification broadcast channel.
    pub notification_buffer: usize,

    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let gateway_bind_address = vars
            .get("POLL_GATEWAY_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_GATEWAY_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("POLL_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let max_timer_seconds =
            parse_positive(vars, "POLL_MAX_TIMER_SECONDS", DEFAULT_MAX_TIMER_SECONDS)?;
        let max_options = parse_positive(vars, "POLL_MAX_OPTIONS", DEFAULT_MAX_OPTIONS)?;
        if max_options < 2 {
            return Err(ConfigError::InvalidValue(format!(
                "POLL_MAX_OPTIONS must be at least 2, got {max_options}"
            )));
        }
        let max_name_length =
            parse_positive(vars, "POLL_MAX_NAME_LENGTH", DEFAULT_MAX_NAME_LENGTH)?;
        let notification_buffer =
            parse_positive(vars, "POLL_NOTIFICATION_BUFFER", DEFAULT_NOTIFICATION_BUFFER)?;

        let completion_policy = match vars.get("POLL_COMPLETION_POLICY") {
            Some(value) => value.parse()?,
            None => CompletionPolicy::default(),
        };

        let json_logs = match vars.get("POLL_JSON_LOGS") {
            Some(value) => value.trim().parse::<bool>().map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "POLL_JSON_LOGS must be true or false, got {value}"
                ))
            })?,
            None => false,
        };

        let log_level = vars
            .get("POLL_LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        // Generate session ID
        let session_id = vars.get("POLL_SESSION_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_SESSION_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            gateway_bind_address,
            health_bind_address,
            session_id,
            limits: SessionLimits {
                max_timer_seconds,
                max_options,
                max_name_length,
                completion_policy,
            },
            notification_buffer,
            observability: ObservabilityConfig {
                log_level,
                json_logs,
            },
        })
    }
}

/// Parse a strictly positive numeric variable, falling back to `default` when unset.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = raw.trim().parse().map_err(|_| {
        ConfigError::InvalidValue(format!("{name} must be a positive integer, got {raw}"))
    })?;

    if value <= T::default() {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(value)
}
