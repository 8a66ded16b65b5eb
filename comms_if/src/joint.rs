//! # Joint topology
//!
//! Every physical joint on the robot is identified by exactly one [`JointKey`]. The set of keys is
//! fixed: six limbs with a coxa, femur and tibia each, plus the pan and tilt axes of the sensor
//! head.
//!
//! Coxa and head joints are driven by servos on the serial bus, femur and tibia joints are
//! hydraulic and are sensed by the leg nodes on the field bus.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of limbs on the robot.
pub const NUM_LIMBS: usize = 6;

/// Total number of joints, legs and head.
pub const NUM_JOINTS: usize = NUM_LIMBS * 3 + 2;

/// All limbs, in message order.
pub const LIMBS: [Limb; NUM_LIMBS] = [
    Limb::LeftFront,
    Limb::LeftMiddle,
    Limb::LeftBack,
    Limb::RightBack,
    Limb::RightMiddle,
    Limb::RightFront,
];

/// Both head joints.
pub const HEAD_JOINTS: [HeadJoint; 2] = [HeadJoint::Pan, HeadJoint::Tilt];

/// The hydraulically actuated segments of each leg.
pub const HYDRAULIC_SEGMENTS: [LegJoint; 2] = [LegJoint::Femur, LegJoint::Tibia];

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// One of the six leg assemblies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Limb {
    LeftFront,
    LeftMiddle,
    LeftBack,
    RightBack,
    RightMiddle,
    RightFront,
}

/// A rotational axis on a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LegJoint {
    Coxa,
    Femur,
    Tibia,
}

/// A rotational axis on the sensor head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HeadJoint {
    Pan,
    Tilt,
}

/// Identifies one physical joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JointKey {
    Leg(Limb, LegJoint),
    Head(HeadJoint),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Limb {
    /// Index of the limb in the per-limb message arrays.
    pub fn index(self) -> usize {
        match self {
            Limb::LeftFront => 0,
            Limb::LeftMiddle => 1,
            Limb::LeftBack => 2,
            Limb::RightBack => 3,
            Limb::RightMiddle => 4,
            Limb::RightFront => 5,
        }
    }

    /// Short label used in logs, for example `F/L`.
    pub fn label(self) -> &'static str {
        match self {
            Limb::LeftFront => "F/L",
            Limb::LeftMiddle => "M/L",
            Limb::LeftBack => "B/L",
            Limb::RightBack => "B/R",
            Limb::RightMiddle => "M/R",
            Limb::RightFront => "F/R",
        }
    }

    /// The tripod this limb belongs to when walking.
    ///
    /// Tripod 0 is (LF, RM, LB), tripod 1 is (RF, LM, RB).
    pub fn tripod(self) -> usize {
        match self {
            Limb::LeftFront | Limb::RightMiddle | Limb::LeftBack => 0,
            Limb::RightFront | Limb::LeftMiddle | Limb::RightBack => 1,
        }
    }
}

impl JointKey {
    /// Build the key for a leg joint.
    pub const fn leg(limb: Limb, joint: LegJoint) -> Self {
        JointKey::Leg(limb, joint)
    }

    /// Build the key for a limb's coxa joint.
    pub const fn coxa(limb: Limb) -> Self {
        JointKey::Leg(limb, LegJoint::Coxa)
    }

    /// Human readable name of the joint, for example `LEG F/L Coxa`.
    pub fn name(&self) -> String {
        format!("{}", self)
    }

    /// True if the joint is hydraulically actuated.
    pub fn is_hydraulic(&self) -> bool {
        matches!(self, JointKey::Leg(_, LegJoint::Femur) | JointKey::Leg(_, LegJoint::Tibia))
    }

    /// True if the joint is driven by a servo on the serial bus.
    pub fn is_servo(&self) -> bool {
        !self.is_hydraulic()
    }
}

impl fmt::Display for JointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JointKey::Leg(limb, joint) => write!(f, "LEG {} {:?}", limb.label(), joint),
            JointKey::Head(joint) => write!(f, "HEAD {:?}", joint),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Every joint on the robot, legs first in limb order, then the head.
pub fn all_joints() -> Vec<JointKey> {
    let mut joints = Vec::with_capacity(NUM_JOINTS);
    for limb in LIMBS.iter() {
        for joint in [LegJoint::Coxa, LegJoint::Femur, LegJoint::Tibia].iter() {
            joints.push(JointKey::Leg(*limb, *joint));
        }
    }
    joints.extend(HEAD_JOINTS.iter().map(|j| JointKey::Head(*j)));
    joints
}

/// The coxa joint of every limb.
pub fn coxa_joints() -> Vec<JointKey> {
    LIMBS.iter().map(|l| JointKey::coxa(*l)).collect()
}

/// Every hydraulically actuated joint.
pub fn hydraulic_joints() -> Vec<JointKey> {
    all_joints().into_iter().filter(|k| k.is_hydraulic()).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_topology() {
        let joints = all_joints();
        assert_eq!(joints.len(), NUM_JOINTS);

        // Every joint has exactly one key
        let unique: HashSet<_> = joints.iter().collect();
        assert_eq!(unique.len(), NUM_JOINTS);

        assert_eq!(hydraulic_joints().len(), 12);
        assert_eq!(coxa_joints().len(), NUM_LIMBS);
        assert!(coxa_joints().iter().all(|k| k.is_servo()));
    }

    #[test]
    fn test_names() {
        assert_eq!(JointKey::coxa(Limb::LeftFront).name(), "LEG F/L Coxa");
        assert_eq!(
            JointKey::leg(Limb::RightBack, LegJoint::Tibia).name(),
            "LEG B/R Tibia"
        );
        assert_eq!(JointKey::Head(HeadJoint::Pan).name(), "HEAD Pan");
    }

    #[test]
    fn test_tripods() {
        let tripod_0: Vec<_> = LIMBS.iter().filter(|l| l.tripod() == 0).collect();
        assert_eq!(tripod_0.len(), 3);
        for (i, limb) in LIMBS.iter().enumerate() {
            assert_eq!(limb.index(), i);
        }
    }
}
