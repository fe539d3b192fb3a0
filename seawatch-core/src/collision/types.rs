//! Collision Risk Types
//!
//! Value types shared by the calculator, the engine and the alert sweep.

use serde::{Deserialize, Serialize};

/// One instantaneous kinematic snapshot of a vessel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VesselState {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Course over ground in degrees, [0, 360)
    pub course_over_ground: f64,
    /// Speed over ground in knots
    pub speed_over_ground: f64,
    /// True heading in degrees, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Time of the fix in milliseconds
    pub timestamp_ms: u64,
}

impl VesselState {
    pub fn new(latitude: f64, longitude: f64, cog: f64, sog: f64) -> Self {
        VesselState {
            latitude,
            longitude,
            course_over_ground: cog,
            speed_over_ground: sog,
            heading: None,
            timestamp_ms: 0,
        }
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// True when latitude and longitude are within their ranges.
    pub fn has_valid_position(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// True when course and speed can be used for relative motion.
    pub fn has_valid_motion(&self) -> bool {
        (0.0..360.0).contains(&self.course_over_ground)
            && (0.0..=super::MAX_SPEED_KN).contains(&self.speed_over_ground)
    }
}

/// How a [`CpaResult`] came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpaStatus {
    /// TCPA is positive and within the horizon
    Valid,
    /// Position, course or speed unusable
    InvalidMotionData,
    /// Relative speed is effectively zero
    StationaryRelative,
    /// Closest approach is in the past
    Diverging,
    /// Closest approach is beyond the horizon
    OutOfRange,
}

impl Default for CpaStatus {
    fn default() -> Self {
        CpaStatus::InvalidMotionData
    }
}

impl std::fmt::Display for CpaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CpaStatus::Valid => write!(f, "Valid"),
            CpaStatus::InvalidMotionData => write!(f, "Invalid motion data"),
            CpaStatus::StationaryRelative => write!(f, "Stationary relative"),
            CpaStatus::Diverging => write!(f, "Diverging"),
            CpaStatus::OutOfRange => write!(f, "Out of range"),
        }
    }
}

/// Result of CPA/TCPA calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpaResult {
    /// Closest Point of Approach in nautical miles
    pub cpa: f64,
    /// Time to CPA in minutes, -1 when there is none
    pub tcpa: f64,
    /// Great-circle distance now, in nautical miles
    pub current_range: f64,
    /// Initial great-circle bearing from own ship to target, [0, 360)
    pub relative_bearing: f64,
    pub is_valid: bool,
    pub status: CpaStatus,
}

impl Default for CpaResult {
    fn default() -> Self {
        CpaResult {
            cpa: 0.0,
            tcpa: super::NO_TCPA,
            current_range: 0.0,
            relative_bearing: 0.0,
            is_valid: false,
            status: CpaStatus::InvalidMotionData,
        }
    }
}

/// Collision risk classification of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::None
    }
}

/// Alarm thresholds for CPA and TCPA.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpaThresholds {
    /// CPA below this is dangerous (NM)
    pub cpa_nm: f64,
    /// Approach within this is dangerous (minutes)
    pub tcpa_min: f64,
    pub cpa_enabled: bool,
    pub tcpa_enabled: bool,
}

impl Default for CpaThresholds {
    fn default() -> Self {
        CpaThresholds {
            cpa_nm: 0.2,
            tcpa_min: 1.0,
            cpa_enabled: true,
            tcpa_enabled: true,
        }
    }
}

impl CpaThresholds {
    pub fn from_config(config: &crate::config::AlarmConfig) -> Self {
        CpaThresholds {
            cpa_nm: config.cpa_threshold_nm,
            tcpa_min: config.tcpa_threshold_min,
            cpa_enabled: config.cpa_alarm_enabled,
            tcpa_enabled: config.tcpa_alarm_enabled,
        }
    }

    /// A valid result whose CPA or TCPA breaks an enabled threshold.
    pub fn is_dangerous(&self, result: &CpaResult) -> bool {
        if !result.is_valid {
            return false;
        }
        let cpa_alarm = self.cpa_enabled && result.cpa < self.cpa_nm;
        let tcpa_alarm = self.tcpa_enabled && result.tcpa > 0.0 && result.tcpa < self.tcpa_min;
        cpa_alarm || tcpa_alarm
    }
}
