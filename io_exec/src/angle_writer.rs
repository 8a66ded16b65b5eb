//! # Joint angle writer
//!
//! Holds the target angle of every joint. Only servo joints are flushed to the servo bus, the
//! hydraulic targets are used by the hydraulic controller.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{error, trace};
use std::collections::BTreeMap;

use crate::servo::{ServoBus, ServoId};
use comms_if::{
    joint::{all_joints, JointKey},
    msg::{HeadAngle, LegAngle},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct AngleWriter {
    servo_ids: BTreeMap<JointKey, ServoId>,

    targets: BTreeMap<JointKey, f32>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl AngleWriter {
    /// Create a writer with every target set to `initial_deg`.
    pub fn new(servo_ids: BTreeMap<JointKey, ServoId>, initial_deg: f32) -> Self {
        Self {
            servo_ids,
            targets: all_joints().into_iter().map(|k| (k, initial_deg)).collect(),
        }
    }

    pub fn stage(&mut self, key: JointKey, angle_deg: f32) {
        if angle_deg.is_finite() {
            self.targets.insert(key, angle_deg);
        } else {
            trace!("Ignoring non-finite target for {}", key);
        }
    }

    /// Stage every angle present in the messages, absent angles keep their previous target.
    pub fn stage_msgs(&mut self, leg: &LegAngle, head: &HeadAngle) {
        for key in all_joints() {
            if let Some(angle) = comms_if::msg::get_angle(leg, head, key) {
                self.stage(key, angle);
            }
        }
    }

    pub fn target(&self, key: JointKey) -> Option<f32> {
        self.targets.get(&key).copied()
    }

    pub fn targets(&self) -> &BTreeMap<JointKey, f32> {
        &self.targets
    }

    /// Write every servo joint's target in one transaction.
    ///
    /// Returns false, after logging, if the write failed.
    pub fn flush(&mut self, bus: &mut dyn ServoBus) -> bool {
        let angles: BTreeMap<ServoId, f32> = self
            .servo_ids
            .iter()
            .filter_map(|(key, id)| self.targets.get(key).map(|a| (*id, *a)))
            .collect();

        match bus.bulk_write(&angles) {
            Ok(()) => true,
            Err(e) => {
                error!("Servo write failed: {}", e);
                false
            }
        }
    }
}
