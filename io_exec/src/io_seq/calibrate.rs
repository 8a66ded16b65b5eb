//! Hydraulic calibration
//!
//! With every valve held open the legs are driven to their end stops. Calibration completes once
//! the femur and tibia angles of every limb have stopped changing for long enough.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::angle_reader::AngleMap;
use comms_if::joint::{JointKey, LegJoint, Limb, LIMBS, NUM_LIMBS};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum change of an angle between cycles for the limb to count as still.
///
/// Units: degrees
pub const CALIBRATION_EPSILON_DEG: f32 = 0.5;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Progress of the calibration.
#[derive(Debug, Clone)]
pub struct Calibration {
    stable_for: Duration,

    limbs: [LimbStability; NUM_LIMBS],
}

#[derive(Debug, Clone, Copy, Default)]
struct LimbStability {
    /// (femur, tibia) angles in the previous cycle.
    last: Option<(f32, f32)>,

    /// When the limb last started holding still.
    stable_since: Option<Instant>,
}

/// Final angles of a calibration, saved into the session.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationResult {
    /// Units: seconds since session start
    pub time_s: f64,

    pub limbs: Vec<LimbCalibration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LimbCalibration {
    pub limb: Limb,
    pub femur_angle_deg: Option<f32>,
    pub tibia_angle_deg: Option<f32>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Calibration {
    pub fn new(stable_for: Duration) -> Self {
        Self {
            stable_for,
            limbs: [LimbStability::default(); NUM_LIMBS],
        }
    }

    /// Compare this cycle's angles against the previous cycle's.
    ///
    /// A limb which moved by more than [`CALIBRATION_EPSILON_DEG`] on either axis, or which is
    /// missing a sample, restarts its stability timer.
    pub fn update(&mut self, angles: &AngleMap, now: Instant) {
        for limb in LIMBS.iter() {
            let state = &mut self.limbs[limb.index()];
            let current = limb_angles(angles, *limb);

            let still = match (state.last, current) {
                (Some(last), Some(current)) => is_leg_angle_stable(last, current),
                _ => false,
            };

            if !still {
                if state.stable_since.is_some() {
                    debug!("Limb {} moved, restarting its stability timer", limb.label());
                }
                state.stable_since = current.map(|_| now);
            }
            state.last = current;
        }
    }

    /// When the limb last started holding still, `None` if it has no samples.
    pub fn stable_since(&self, limb: Limb) -> Option<Instant> {
        self.limbs[limb.index()].stable_since
    }

    /// True once every limb has held still for the required time.
    pub fn is_complete(&self, now: Instant) -> bool {
        self.limbs.iter().all(|l| match l.stable_since {
            Some(t) => now.saturating_duration_since(t) >= self.stable_for,
            None => false,
        })
    }

    pub fn result(&self) -> CalibrationResult {
        CalibrationResult {
            time_s: util::session::get_elapsed_seconds(),
            limbs: LIMBS
                .iter()
                .map(|limb| {
                    let last = self.limbs[limb.index()].last;
                    LimbCalibration {
                        limb: *limb,
                        femur_angle_deg: last.map(|l| l.0),
                        tibia_angle_deg: last.map(|l| l.1),
                    }
                })
                .collect(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// True if neither the femur nor the tibia moved by more than [`CALIBRATION_EPSILON_DEG`].
pub fn is_leg_angle_stable(last: (f32, f32), current: (f32, f32)) -> bool {
    (current.0 - last.0).abs() <= CALIBRATION_EPSILON_DEG
        && (current.1 - last.1).abs() <= CALIBRATION_EPSILON_DEG
}

fn limb_angles(angles: &AngleMap, limb: Limb) -> Option<(f32, f32)> {
    let get = |joint| {
        angles
            .get(&JointKey::leg(limb, joint))
            .copied()
            .flatten()
    };
    Some((get(LegJoint::Femur)?, get(LegJoint::Tibia)?))
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::joint::all_joints;

    fn snapshot(angle: f32) -> AngleMap {
        all_joints().into_iter().map(|k| (k, Some(angle))).collect()
    }

    #[test]
    fn test_is_leg_angle_stable() {
        assert!(is_leg_angle_stable((10.0, 20.0), (10.4, 19.6)));
        assert!(!is_leg_angle_stable((10.0, 20.0), (10.6, 20.0)));
        assert!(!is_leg_angle_stable((10.0, 20.0), (10.0, 19.4)));

        // A change of exactly epsilon is still
        assert!(is_leg_angle_stable((10.0, 20.0), (10.5, 19.5)));
    }

    #[test]
    fn test_epsilon_change_keeps_timer() {
        let t0 = Instant::now();
        let mut calib = Calibration::new(Duration::from_secs(3));

        calib.update(&snapshot(10.0), t0);

        let mut moved = snapshot(10.0);
        moved.insert(JointKey::leg(Limb::LeftFront, LegJoint::Femur), Some(10.5));
        calib.update(&moved, t0 + Duration::from_secs(1));

        assert_eq!(calib.stable_since(Limb::LeftFront), Some(t0));
        assert!(calib.is_complete(t0 + Duration::from_secs(3)));
    }

    #[test]
    fn test_identical_snapshots_keep_timer() {
        let t0 = Instant::now();
        let mut calib = Calibration::new(Duration::from_secs(3));

        calib.update(&snapshot(5.0), t0);
        calib.update(&snapshot(5.0), t0 + Duration::from_secs(1));

        for limb in LIMBS.iter() {
            assert_eq!(calib.stable_since(*limb), Some(t0));
        }
        assert!(!calib.is_complete(t0 + Duration::from_secs(2)));
        assert!(calib.is_complete(t0 + Duration::from_secs(3)));
    }

    #[test]
    fn test_movement_resets_timer() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(1);
        let mut calib = Calibration::new(Duration::from_secs(3));

        calib.update(&snapshot(5.0), t0);

        let mut moved = snapshot(5.0);
        moved.insert(JointKey::leg(Limb::RightMiddle, LegJoint::Tibia), Some(5.6));
        calib.update(&moved, t1);

        assert_eq!(calib.stable_since(Limb::RightMiddle), Some(t1));
        assert_eq!(calib.stable_since(Limb::LeftFront), Some(t0));
        assert!(!calib.is_complete(t0 + Duration::from_secs(3)));
        assert!(calib.is_complete(t1 + Duration::from_secs(3)));
    }

    #[test]
    fn test_missing_sample() {
        let t0 = Instant::now();
        let mut calib = Calibration::new(Duration::from_secs(0));

        let mut angles = snapshot(0.0);
        angles.insert(JointKey::leg(Limb::LeftMiddle, LegJoint::Femur), None);
        calib.update(&angles, t0);

        assert_eq!(calib.stable_since(Limb::LeftMiddle), None);
        assert!(!calib.is_complete(t0));

        let result = calib.result();
        assert_eq!(result.limbs.len(), NUM_LIMBS);
        assert_eq!(result.limbs[1].femur_angle_deg, None);
        assert_eq!(result.limbs[0].femur_angle_deg, Some(0.0));
    }
}
