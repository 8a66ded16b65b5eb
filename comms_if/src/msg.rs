//! # Messages
//!
//! Messages exchanged between `io_exec`, `gait_exec` and the teleoperation source. All messages are
//! serialized as JSON.
//!
//! Angles are in degrees. A `None` angle in a measured message means the sensor did not report
//! this cycle; in a target message it means "keep the previous target".

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::joint::{HeadJoint, JointKey, LegJoint, Limb, NUM_LIMBS};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Topic of [`LegAngle`] messages.
pub const TOPIC_LEG_ANGLE: &str = "leg_angle";

/// Topic of [`HeadAngle`] messages.
pub const TOPIC_HEAD_ANGLE: &str = "head_angle";

/// Topic of [`VelocityCmd`] messages.
pub const TOPIC_CMD_VEL: &str = "cmd_vel";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Angles of every leg joint, indexed by [`Limb::index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LegAngle {
    pub coxa_angle_deg: [Option<f32>; NUM_LIMBS],
    pub femur_angle_deg: [Option<f32>; NUM_LIMBS],
    pub tibia_angle_deg: [Option<f32>; NUM_LIMBS],
}

/// Angles of the sensor head.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadAngle {
    pub pan_angle_deg: Option<f32>,
    pub tilt_angle_deg: Option<f32>,
}

/// Teleoperation velocity command.
///
/// Last value wins. The linear components drive the body, `angular_z` is the body turn rate and
/// `angular_x`/`angular_y` are the head tilt and pan rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityCmd {
    /// Units: metres/second
    pub linear_x: f32,
    /// Units: metres/second
    pub linear_y: f32,
    /// Head tilt rate. Units: degrees/second
    pub angular_x: f32,
    /// Head pan rate. Units: degrees/second
    pub angular_y: f32,
    /// Body turn rate, positive to the left. Units: radians/second
    pub angular_z: f32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LegAngle {
    /// Get the angle of a leg joint.
    pub fn get(&self, limb: Limb, joint: LegJoint) -> Option<f32> {
        self.array(joint)[limb.index()]
    }

    /// Set the angle of a leg joint.
    pub fn set(&mut self, limb: Limb, joint: LegJoint, angle_deg: Option<f32>) {
        self.array_mut(joint)[limb.index()] = angle_deg;
    }

    fn array(&self, joint: LegJoint) -> &[Option<f32>; NUM_LIMBS] {
        match joint {
            LegJoint::Coxa => &self.coxa_angle_deg,
            LegJoint::Femur => &self.femur_angle_deg,
            LegJoint::Tibia => &self.tibia_angle_deg,
        }
    }

    fn array_mut(&mut self, joint: LegJoint) -> &mut [Option<f32>; NUM_LIMBS] {
        match joint {
            LegJoint::Coxa => &mut self.coxa_angle_deg,
            LegJoint::Femur => &mut self.femur_angle_deg,
            LegJoint::Tibia => &mut self.tibia_angle_deg,
        }
    }
}

impl HeadAngle {
    pub fn get(&self, joint: HeadJoint) -> Option<f32> {
        match joint {
            HeadJoint::Pan => self.pan_angle_deg,
            HeadJoint::Tilt => self.tilt_angle_deg,
        }
    }

    pub fn set(&mut self, joint: HeadJoint, angle_deg: Option<f32>) {
        match joint {
            HeadJoint::Pan => self.pan_angle_deg = angle_deg,
            HeadJoint::Tilt => self.tilt_angle_deg = angle_deg,
        }
    }
}

/// Look up a joint's angle across a leg and head message pair.
pub fn get_angle(leg: &LegAngle, head: &HeadAngle, key: JointKey) -> Option<f32> {
    match key {
        JointKey::Leg(limb, joint) => leg.get(limb, joint),
        JointKey::Head(joint) => head.get(joint),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_leg_angle_indexing() {
        let mut msg = LegAngle::default();
        msg.set(Limb::RightBack, LegJoint::Femur, Some(12.5));

        assert_eq!(msg.femur_angle_deg[3], Some(12.5));
        assert_eq!(msg.get(Limb::RightBack, LegJoint::Femur), Some(12.5));
        assert_eq!(msg.get(Limb::RightBack, LegJoint::Tibia), None);
    }

    #[test]
    fn test_json_absent_angle() {
        let mut head = HeadAngle::default();
        head.set(HeadJoint::Tilt, Some(-4.0));

        let json = serde_json::to_string(&head).unwrap();
        assert_eq!(json, r#"{"pan_angle_deg":null,"tilt_angle_deg":-4.0}"#);
    }
}
