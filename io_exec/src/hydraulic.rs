//! # Hydraulic controller
//!
//! Bang-bang control of the femur and tibia joints. When any hydraulic joint is further than
//! [`PUMP_ACTIVATION_THRESHOLD_DEG`] from its target the pump runs at [`PUMP_ACTIVE_RPM`] and that
//! joint's valve opens towards the target. Otherwise the pump stops and the valves close.
//!
//! Valve openings are in the range [-1, +1], 0 being closed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, error};
use std::collections::BTreeMap;

use crate::{
    angle_reader::AngleMap,
    field_bus::FieldBus,
    params::ValveParams,
    valve::{ValveChannel, ValveDriver},
};
use comms_if::joint::JointKey;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Tracking error above which the pump runs.
///
/// Units: degrees
pub const PUMP_ACTIVATION_THRESHOLD_DEG: f32 = 2.0;

/// Pump speed while any joint is moving.
pub const PUMP_ACTIVE_RPM: u16 = 4096;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct HydraulicCtrl {
    channels: BTreeMap<JointKey, ValveChannel>,

    neutral_pulse_us: f32,

    full_open_offset_us: f32,

    calibration_opening: f32,

    active_opening: f32,

    openings: BTreeMap<JointKey, f32>,

    pump_rpm: u16,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HydraulicCtrl {
    pub fn new(params: &ValveParams) -> Self {
        let channels = params.joint_channels();
        let openings = channels.keys().map(|k| (*k, 0.0)).collect();

        Self {
            channels,
            neutral_pulse_us: params.neutral_pulse_us as f32,
            full_open_offset_us: params.full_open_offset_us as f32,
            calibration_opening: util::maths::clamp(params.calibration_opening, -1.0, 1.0),
            active_opening: util::maths::clamp(params.active_opening.abs(), 0.0, 1.0),
            openings,
            pump_rpm: 0,
        }
    }

    /// Compute the pump speed and valve openings from the joint targets and actual angles.
    ///
    /// A joint with no actual angle is left closed and doesn't activate the pump. Returns true if
    /// the pump is running.
    pub fn update(&mut self, targets: &BTreeMap<JointKey, f32>, actuals: &AngleMap) -> bool {
        let mut pump_on = false;

        for (key, opening) in self.openings.iter_mut() {
            let error = match (targets.get(key), actuals.get(key).copied().flatten()) {
                (Some(t), Some(a)) => t - a,
                _ => {
                    *opening = 0.0;
                    continue;
                }
            };

            if error.abs() > PUMP_ACTIVATION_THRESHOLD_DEG {
                pump_on = true;
                *opening = error.signum() * self.active_opening;
            } else {
                *opening = 0.0;
            }
        }

        self.pump_rpm = if pump_on { PUMP_ACTIVE_RPM } else { 0 };

        pump_on
    }

    /// Open every valve by the calibration opening and start the pump.
    pub fn open_all_for_calibration(&mut self) {
        let opening = self.calibration_opening;
        self.openings.values_mut().for_each(|o| *o = opening);
        self.pump_rpm = PUMP_ACTIVE_RPM;
        debug!("Opened all valves to {:.2} for calibration", opening);
    }

    /// Close every valve and stop the pump.
    pub fn close_all(&mut self) {
        self.openings.values_mut().for_each(|o| *o = 0.0);
        self.pump_rpm = 0;
    }

    pub fn opening(&self, key: JointKey) -> Option<f32> {
        self.openings.get(&key).copied()
    }

    pub fn pump_rpm(&self) -> u16 {
        self.pump_rpm
    }

    /// Pulse width of every valve channel.
    pub fn pulses(&self) -> BTreeMap<ValveChannel, u16> {
        self.openings
            .iter()
            .filter_map(|(key, opening)| {
                self.channels.get(key).map(|ch| {
                    let pulse = self.neutral_pulse_us + opening * self.full_open_offset_us;
                    (*ch, pulse.round().max(0.0) as u16)
                })
            })
            .collect()
    }

    /// Write the valve openings. Returns false, after logging, on failure.
    pub fn write_valves(&self, driver: &mut dyn ValveDriver) -> bool {
        match driver.bulk_write(&self.pulses()) {
            Ok(()) => true,
            Err(e) => {
                error!("Valve write failed: {}", e);
                false
            }
        }
    }

    /// Publish the pump speed. Returns false, after logging, on failure.
    pub fn write_pump(&self, bus: &mut dyn FieldBus) -> bool {
        match bus.publish_pump_rpm(self.pump_rpm) {
            Ok(()) => true,
            Err(e) => {
                error!("Pump write failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::test::test_params;
    use comms_if::joint::{all_joints, hydraulic_joints, LegJoint, Limb};

    fn targets(angle: f32) -> BTreeMap<JointKey, f32> {
        all_joints().into_iter().map(|k| (k, angle)).collect()
    }

    fn actuals(angle: Option<f32>) -> AngleMap {
        all_joints().into_iter().map(|k| (k, angle)).collect()
    }

    #[test]
    fn test_pump_activation() {
        let mut ctrl = HydraulicCtrl::new(&test_params().valve);
        let femur = JointKey::leg(Limb::LeftBack, LegJoint::Femur);

        let mut act = actuals(Some(10.0));
        act.insert(femur, Some(7.9));
        assert!(ctrl.update(&targets(10.0), &act));
        assert_eq!(ctrl.pump_rpm(), PUMP_ACTIVE_RPM);
        assert_eq!(ctrl.opening(femur), Some(0.8));
        assert_eq!(
            ctrl.opening(JointKey::leg(Limb::LeftBack, LegJoint::Tibia)),
            Some(0.0)
        );

        // Exactly on the threshold
        act.insert(femur, Some(8.0));
        assert!(!ctrl.update(&targets(10.0), &act));
        assert_eq!(ctrl.pump_rpm(), 0);

        // Within the threshold
        act.insert(femur, Some(8.5));
        assert!(!ctrl.update(&targets(10.0), &act));
        assert_eq!(ctrl.pump_rpm(), 0);
        assert_eq!(ctrl.opening(femur), Some(0.0));

        // Overshoot opens the other way
        act.insert(femur, Some(12.5));
        ctrl.update(&targets(10.0), &act);
        assert_eq!(ctrl.opening(femur), Some(-0.8));
    }

    #[test]
    fn test_absent_actuals_do_not_activate() {
        let mut ctrl = HydraulicCtrl::new(&test_params().valve);
        assert!(!ctrl.update(&targets(45.0), &actuals(None)));
        assert_eq!(ctrl.pump_rpm(), 0);
    }

    #[test]
    fn test_pulses() {
        let params = test_params().valve;
        let mut ctrl = HydraulicCtrl::new(&params);

        let pulses = ctrl.pulses();
        assert_eq!(pulses.len(), hydraulic_joints().len());
        assert!(pulses.values().all(|p| *p == 1500));

        ctrl.open_all_for_calibration();
        assert_eq!(ctrl.pump_rpm(), PUMP_ACTIVE_RPM);
        assert!(ctrl.pulses().values().all(|p| *p == 1250));

        ctrl.close_all();
        assert_eq!(ctrl.pump_rpm(), 0);
        assert!(ctrl.pulses().values().all(|p| *p == 1500));

        let mut act = actuals(Some(0.0));
        act.insert(JointKey::leg(Limb::RightFront, LegJoint::Tibia), Some(-10.0));
        ctrl.update(&targets(0.0), &act);
        // Right front tibia is on channel 16
        assert_eq!(ctrl.pulses().get(&16), Some(&1900));
    }
}
