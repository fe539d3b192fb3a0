//! Collision risk geometry
//!
//! Relative-motion calculations between own ship and AIS targets. Everything
//! here is a pure function of its inputs and can be called from any thread.
//!
//! # Architecture
//!
//! - **types**: `VesselState`, `CpaResult`, `CpaStatus`, thresholds
//! - **geo**: haversine range, initial bearing, dead reckoning
//! - **cpa**: closed-form CPA/TCPA on a local tangent plane
//! - **risk** (this file): graded risk levels
//!
//! # Usage
//!
//! ```rust,ignore
//! use seawatch_core::collision::{evaluate, CpaThresholds, VesselState};
//!
//! let own = VesselState::new(0.0, 0.0, 90.0, 10.0);
//! let target = VesselState::new(0.0, 0.1, 270.0, 10.0);
//! let result = evaluate(&own, &target);
//! if CpaThresholds::default().is_dangerous(&result) {
//!     // raise an alert
//! }
//! ```

mod cpa;
mod geo;
mod types;

pub use cpa::evaluate;
pub use geo::{haversine_nm, initial_bearing, normalize_angle, predict_position};
pub use types::{CpaResult, CpaStatus, CpaThresholds, RiskLevel, VesselState};

use serde::{Deserialize, Serialize};

/// Mean Earth radius in nautical miles
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Highest speed accepted from AIS, knots
pub const MAX_SPEED_KN: f64 = 102.2;

/// Relative speeds below 0.1 kn count as no relative motion
pub const MIN_RELATIVE_SPEED_NM_PER_MIN: f64 = 0.1 / 60.0;

/// TCPA horizon, 24 hours in minutes
pub const MAX_TCPA_MIN: f64 = 24.0 * 60.0;

/// TCPA value when there is no closest approach
pub const NO_TCPA: f64 = -1.0;

/// Distance and time bands for [`RiskLevel`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskProfile {
    /// NM
    pub critical_distance: f64,
    pub high_risk_distance: f64,
    pub medium_risk_distance: f64,
    pub low_risk_distance: f64,
    /// Minutes
    pub critical_time: f64,
    pub high_risk_time: f64,
    pub medium_risk_time: f64,
    /// CPA is divided by this before comparing
    pub safety_margin: f64,
}

impl Default for RiskProfile {
    fn default() -> Self {
        RiskProfile {
            critical_distance: 0.1,
            high_risk_distance: 0.25,
            medium_risk_distance: 0.5,
            low_risk_distance: 1.0,
            critical_time: 2.0,
            high_risk_time: 5.0,
            medium_risk_time: 10.0,
            safety_margin: 1.2,
        }
    }
}

impl RiskProfile {
    /// Grade a result. Anything but a valid approach is `RiskLevel::None`.
    pub fn classify(&self, result: &CpaResult) -> RiskLevel {
        if !result.is_valid {
            return RiskLevel::None;
        }
        let cpa = result.cpa / self.safety_margin;
        let tcpa = result.tcpa;

        if cpa <= self.critical_distance {
            if tcpa <= self.critical_time {
                RiskLevel::Critical
            } else if tcpa <= self.high_risk_time {
                RiskLevel::High
            } else {
                RiskLevel::Medium
            }
        } else if cpa <= self.high_risk_distance {
            if tcpa <= self.high_risk_time {
                RiskLevel::High
            } else if tcpa <= self.medium_risk_time {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            }
        } else if cpa <= self.medium_risk_distance {
            if tcpa <= self.medium_risk_time {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            }
        } else if cpa <= self.low_risk_distance {
            RiskLevel::Low
        } else {
            RiskLevel::None
        }
    }
}
