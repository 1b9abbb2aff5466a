// crates/photopipe-core/src/core/spatial.rs
// ============================================================================
// Module: Photopipe Spatial Math
// Description: Great-circle angular distance for reference-image ranking.
// Purpose: Provide the exact distance formula the reference finder ranks by.
// Dependencies: none beyond std
// ============================================================================

//! ## Overview
//! The spatial assigner ranks prior images by the law-of-cosines great-circle
//! distance between sky positions:
//!
//! ```text
//! distance = arccos(clamp(sin(dec)·sin(dec_i)
//!                       + cos(dec)·cos(dec_i)·cos(ra − ra_i), −1, 1))
//! ```
//!
//! Inputs and outputs are degrees. The clamp guards against floating-point
//! drift pushing the cosine argument outside `[-1, 1]` for near-identical
//! positions. Ranking is ascending by distance with an unspecified tie order.

// ============================================================================
// SECTION: Distance
// ============================================================================

/// Computes the great-circle angular distance between two sky positions.
///
/// All arguments and the result are in degrees. The law-of-cosines form loses
/// precision for very small separations relative to haversine, which is
/// acceptable here: the formula must match the ranking the store has always
/// produced, not survey-grade astrometry.
#[must_use]
pub fn angular_distance_deg(ra_a: f64, dec_a: f64, ra_b: f64, dec_b: f64) -> f64 {
    let dec_a = dec_a.to_radians();
    let dec_b = dec_b.to_radians();
    let delta_ra = (ra_a - ra_b).to_radians();
    let cosine = dec_a.sin() * dec_b.sin() + dec_a.cos() * dec_b.cos() * delta_ra.cos();
    cosine.clamp(-1.0, 1.0).acos().to_degrees()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::float_cmp,
        reason = "Test-only assertions are permitted."
    )]

    use proptest::prelude::proptest;

    use super::angular_distance_deg;

    #[test]
    fn identical_positions_are_zero_distance() {
        assert_eq!(angular_distance_deg(120.0, -30.0, 120.0, -30.0), 0.0);
    }

    #[test]
    fn quarter_circle_along_equator() {
        let distance = angular_distance_deg(0.0, 0.0, 90.0, 0.0);
        assert!((distance - 90.0).abs() < 1e-9);
    }

    #[test]
    fn pole_to_equator_is_ninety_degrees() {
        let distance = angular_distance_deg(45.0, 90.0, 200.0, 0.0);
        assert!((distance - 90.0).abs() < 1e-9);
    }

    #[test]
    fn clamp_absorbs_floating_point_drift() {
        // A separation tiny enough that the cosine argument may exceed 1.0.
        let distance = angular_distance_deg(10.0, 10.0, 10.0 + 1e-13, 10.0);
        assert!(distance.is_finite());
        assert!(distance >= 0.0);
    }

    proptest! {
        #[test]
        fn distance_is_symmetric_and_bounded(
            ra_a in 0.0_f64..360.0,
            dec_a in -90.0_f64..90.0,
            ra_b in 0.0_f64..360.0,
            dec_b in -90.0_f64..90.0,
        ) {
            let forward = angular_distance_deg(ra_a, dec_a, ra_b, dec_b);
            let reverse = angular_distance_deg(ra_b, dec_b, ra_a, dec_a);
            assert!((forward - reverse).abs() < 1e-9);
            assert!((0.0..=180.0 + 1e-9).contains(&forward));
        }
    }
}
