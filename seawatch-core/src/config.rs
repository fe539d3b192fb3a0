//! Runtime configuration.
//!
//! All options are plain serde structs with camelCase names so the same JSON
//! file can be read by the server shell or any other embedding. Every field has
//! a default, so a partial file only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which grace period is armed after a reconnect has been made.
///
/// The very first connect always waits `initialDataTimeoutMs` for data. After
/// a watchdog or error triggered reconnect, either the same long window is
/// used again (`Initial`) or the shorter watchdog interval (`Watchdog`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GracePolicy {
    #[default]
    Initial,
    Watchdog,
}

/// Telemetry link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionConfig {
    /// Telemetry source host name or address
    pub host: String,
    /// Telemetry source TCP port
    pub port: u16,
    /// First reconnect delay
    pub base_reconnect_delay_ms: u64,
    /// Upper bound for the exponential part of the reconnect delay
    pub max_reconnect_delay_ms: u64,
    /// Random extra delay added to every reconnect, uniform in [0, jitter]
    pub jitter_ms: u64,
    /// How long a fresh connection may stay silent before it counts as failed
    pub initial_data_timeout_ms: u64,
    /// How long an established connection may stay silent
    pub no_data_watchdog_ms: u64,
    /// Grace period used after reconnects
    pub post_reconnect_grace: GracePolicy,
    /// Incomplete data older than this is discarded
    pub stale_buffer_ms: u64,
    /// Buffered bytes above this are discarded
    pub max_buffer_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            base_reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 60_000,
            jitter_ms: 500,
            initial_data_timeout_ms: 60_000,
            no_data_watchdog_ms: 15_000,
            post_reconnect_grace: GracePolicy::Initial,
            stale_buffer_ms: 5_000,
            max_buffer_bytes: 1 << 20,
        }
    }
}

/// Alarm thresholds and alert bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlarmConfig {
    /// Master switch; when off `trigger` is a no-op
    pub enabled: bool,
    /// Run the shallow water check in the periodic sweep
    pub depth_monitoring: bool,
    /// Run the CPA/TCPA check in the periodic sweep
    pub collision_monitoring: bool,
    /// Use the CPA threshold when classifying a target as dangerous
    pub cpa_alarm_enabled: bool,
    /// Use the TCPA threshold when classifying a target as dangerous
    pub tcpa_alarm_enabled: bool,
    /// CPA below this (nautical miles) is dangerous
    pub cpa_threshold_nm: f64,
    /// Approaching with TCPA below this (minutes) is dangerous
    pub tcpa_threshold_min: f64,
    /// Depth below this (meters) raises a shallow water alarm
    pub min_safe_depth_m: f64,
    /// Period of the alarm sweep
    pub evaluation_interval_ms: u64,
    /// Number of resolved alerts kept
    pub max_history: usize,
    /// Targets without an update for this long are dropped
    pub target_timeout_ms: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        AlarmConfig {
            enabled: true,
            depth_monitoring: true,
            collision_monitoring: true,
            cpa_alarm_enabled: true,
            tcpa_alarm_enabled: true,
            cpa_threshold_nm: 0.2,
            tcpa_threshold_min: 1.0,
            min_safe_depth_m: 5.0,
            evaluation_interval_ms: 5_000,
            max_history: 100,
            target_timeout_ms: 360_000,
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchConfig {
    pub connection: ConnectionConfig,
    pub alarms: AlarmConfig,
}

impl WatchConfig {
    /// Check that the values make sense together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.connection;
        if c.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if c.port == 0 {
            return Err(ConfigError::Zero("port"));
        }
        if c.base_reconnect_delay_ms == 0 {
            return Err(ConfigError::Zero("baseReconnectDelayMs"));
        }
        if c.max_reconnect_delay_ms < c.base_reconnect_delay_ms {
            return Err(ConfigError::BackoffOrder {
                base: c.base_reconnect_delay_ms,
                max: c.max_reconnect_delay_ms,
            });
        }
        if c.initial_data_timeout_ms == 0 {
            return Err(ConfigError::Zero("initialDataTimeoutMs"));
        }
        if c.no_data_watchdog_ms == 0 {
            return Err(ConfigError::Zero("noDataWatchdogMs"));
        }
        if c.stale_buffer_ms == 0 {
            return Err(ConfigError::Zero("staleBufferMs"));
        }
        if c.max_buffer_bytes == 0 {
            return Err(ConfigError::Zero("maxBufferBytes"));
        }

        let a = &self.alarms;
        for (name, value) in [
            ("cpaThresholdNm", a.cpa_threshold_nm),
            ("tcpaThresholdMin", a.tcpa_threshold_min),
            ("minSafeDepthM", a.min_safe_depth_m),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        if a.evaluation_interval_ms == 0 {
            return Err(ConfigError::Zero("evaluationIntervalMs"));
        }
        if a.max_history == 0 {
            return Err(ConfigError::Zero("maxHistory"));
        }
        Ok(())
    }
}
