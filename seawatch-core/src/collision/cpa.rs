//! CPA/TCPA Calculation
//!
//! Computes Closest Point of Approach (CPA) and Time to CPA (TCPA)
//! between own ship and one target.

use nalgebra::Vector2;

use super::geo::{haversine_nm, initial_bearing};
use super::types::{CpaResult, CpaStatus, VesselState};
use super::{MAX_TCPA_MIN, MIN_RELATIVE_SPEED_NM_PER_MIN, NO_TCPA};

/// Calculate CPA and TCPA between own ship and target
///
/// Uses relative velocity method:
/// 1. Project both positions on a tangent plane at the mean latitude
/// 2. Compute relative position and velocity (target minus own ship)
/// 3. Find time when distance is minimized
///
/// Range and bearing are filled in whenever both positions are valid, even
/// when the motion data is not.
pub fn evaluate(own: &VesselState, target: &VesselState) -> CpaResult {
    if !own.has_valid_position() || !target.has_valid_position() {
        return CpaResult::default();
    }

    let current_range = haversine_nm(own.latitude, own.longitude, target.latitude, target.longitude);
    let relative_bearing =
        initial_bearing(own.latitude, own.longitude, target.latitude, target.longitude);

    let mut result = CpaResult {
        cpa: current_range,
        tcpa: NO_TCPA,
        current_range,
        relative_bearing,
        is_valid: false,
        status: CpaStatus::InvalidMotionData,
    };

    if !own.has_valid_motion() || !target.has_valid_motion() {
        return result;
    }

    let mean_lat = ((own.latitude + target.latitude) / 2.0).to_radians();
    let position = Vector2::new(
        (target.longitude - own.longitude) * 60.0 * mean_lat.cos(),
        (target.latitude - own.latitude) * 60.0,
    );
    let velocity = velocity_nm_per_min(target) - velocity_nm_per_min(own);

    if velocity.norm() < MIN_RELATIVE_SPEED_NM_PER_MIN {
        result.status = CpaStatus::StationaryRelative;
        return result;
    }

    // TCPA = -(r · v) / |v|²
    let tcpa = -position.dot(&velocity) / velocity.norm_squared();
    result.tcpa = tcpa;
    result.cpa = (position + velocity * tcpa).norm();

    result.status = if tcpa < 0.0 {
        CpaStatus::Diverging
    } else if tcpa > MAX_TCPA_MIN {
        CpaStatus::OutOfRange
    } else {
        CpaStatus::Valid
    };
    result.is_valid = result.status == CpaStatus::Valid;
    result
}

/// (east, north) velocity in NM per minute.
fn velocity_nm_per_min(vessel: &VesselState) -> Vector2<f64> {
    let speed = vessel.speed_over_ground / 60.0;
    let course = vessel.course_over_ground.to_radians();
    Vector2::new(speed * course.sin(), speed * course.cos())
}
