//! # I/O Executable Parameters
//!
//! Loaded from `params/io_exec.toml`. Per-limb arrays are in limb order: left front, left middle,
//! left back, right back, right middle, right front.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;
use std::{collections::BTreeMap, time::Duration};

use crate::{
    field_bus::{NodeId, SubjectId},
    servo::ServoId,
    valve::ValveChannel,
};
use comms_if::joint::{HeadJoint, JointKey, LegJoint, LIMBS, NUM_LIMBS};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct IoExecParams {
    pub servo: ServoParams,

    pub field_bus: FieldBusParams,

    pub valve: ValveParams,

    pub seq: SeqParams,

    #[serde(default)]
    pub sim: SimParams,
}

/// Serial servo bus.
#[derive(Debug, Clone, Deserialize)]
pub struct ServoParams {
    /// Serial device, e.g. `/dev/ttyUSB0`
    pub device: String,

    pub baud_rate: u32,

    /// Maximum time to wait for one status packet.
    ///
    /// Units: milliseconds
    pub timeout_ms: u64,

    /// Servo id of each coxa joint.
    pub coxa_ids: [ServoId; NUM_LIMBS],

    pub head_pan_id: ServoId,

    pub head_tilt_id: ServoId,
}

/// Cyphal field bus.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldBusParams {
    /// CAN interface, e.g. `can0`
    pub interface: String,

    /// Node id this executable publishes as.
    pub local_node_id: NodeId,

    /// Node id of each leg controller.
    pub leg_node_ids: [NodeId; NUM_LIMBS],

    /// Node id of the hydraulic pump controller.
    pub pump_node_id: NodeId,

    /// Subject the leg nodes publish the femur angle on.
    pub femur_angle_subject_id: SubjectId,

    /// Subject the leg nodes publish the tibia angle on.
    pub tibia_angle_subject_id: SubjectId,

    /// Subject of the pump speed setpoint.
    pub pump_rpm_subject_id: SubjectId,

    /// A femur or tibia reading older than this is treated as absent.
    ///
    /// Units: milliseconds
    pub sample_timeout_ms: u64,
}

/// Hydraulic valves on the SSC-32.
#[derive(Debug, Clone, Deserialize)]
pub struct ValveParams {
    pub device: String,

    pub baud_rate: u32,

    /// Valve channel of each femur joint.
    pub femur_channels: [ValveChannel; NUM_LIMBS],

    /// Valve channel of each tibia joint.
    pub tibia_channels: [ValveChannel; NUM_LIMBS],

    /// Pulse width at which a valve is closed.
    ///
    /// Units: microseconds
    pub neutral_pulse_us: u16,

    /// Pulse width offset from neutral at which a valve is fully open.
    ///
    /// Units: microseconds
    pub full_open_offset_us: u16,

    /// Valve opening commanded on every valve during calibration, between -1 and +1.
    pub calibration_opening: f32,

    /// Valve opening commanded on a joint whose tracking error exceeds the pump activation
    /// threshold, between 0 and 1. The sign follows the error.
    pub active_opening: f32,
}

/// I/O sequencing.
#[derive(Debug, Clone, Deserialize)]
pub struct SeqParams {
    /// Maximum time to wait for every field bus node to become connected, healthy, and
    /// operational before giving up.
    ///
    /// Units: seconds
    pub node_monitor_init_timeout_s: f64,

    /// Time every limb must hold still before calibration completes.
    ///
    /// Units: seconds
    pub calibration_stable_s: f64,

    /// Target of every joint before the first target message arrives.
    ///
    /// Units: degrees
    pub initial_angle_deg: f32,
}

/// Simulated hardware.
#[derive(Debug, Clone, Deserialize)]
pub struct SimParams {
    /// Rate a hydraulic joint moves at with its valve fully open and the pump running.
    ///
    /// Units: degrees/second
    pub hydraulic_rate_deg_s: f32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            hydraulic_rate_deg_s: 20.0,
        }
    }
}

impl ServoParams {
    /// Servo id of every servo driven joint.
    pub fn joint_ids(&self) -> BTreeMap<JointKey, ServoId> {
        let mut map: BTreeMap<JointKey, ServoId> = LIMBS
            .iter()
            .map(|l| (JointKey::coxa(*l), self.coxa_ids[l.index()]))
            .collect();
        map.insert(JointKey::Head(HeadJoint::Pan), self.head_pan_id);
        map.insert(JointKey::Head(HeadJoint::Tilt), self.head_tilt_id);
        map
    }

    /// Every servo id that must be found on the bus.
    pub fn required_ids(&self) -> Vec<ServoId> {
        self.joint_ids().values().copied().collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl FieldBusParams {
    /// The joint reported by each (node, subject) pair.
    pub fn joint_sources(&self) -> BTreeMap<(NodeId, SubjectId), JointKey> {
        let mut map = BTreeMap::new();
        for limb in LIMBS.iter() {
            let node_id = self.leg_node_ids[limb.index()];
            map.insert(
                (node_id, self.femur_angle_subject_id),
                JointKey::leg(*limb, LegJoint::Femur),
            );
            map.insert(
                (node_id, self.tibia_angle_subject_id),
                JointKey::leg(*limb, LegJoint::Tibia),
            );
        }
        map
    }

    /// Every node whose heartbeat is monitored.
    pub fn monitored_nodes(&self) -> Vec<NodeId> {
        let mut nodes = self.leg_node_ids.to_vec();
        nodes.push(self.pump_node_id);
        nodes
    }

    /// Subjects carrying scalar angle readings.
    pub fn real32_subjects(&self) -> Vec<SubjectId> {
        vec![self.femur_angle_subject_id, self.tibia_angle_subject_id]
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }
}

impl ValveParams {
    /// Valve channel of every hydraulic joint.
    pub fn joint_channels(&self) -> BTreeMap<JointKey, ValveChannel> {
        let mut map = BTreeMap::new();
        for limb in LIMBS.iter() {
            map.insert(
                JointKey::leg(*limb, LegJoint::Femur),
                self.femur_channels[limb.index()],
            );
            map.insert(
                JointKey::leg(*limb, LegJoint::Tibia),
                self.tibia_channels[limb.index()],
            );
        }
        map
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Parameters matching `params/io_exec.toml`.
    pub(crate) fn test_params() -> IoExecParams {
        util::params::parse(include_str!("../../params/io_exec.toml")).unwrap()
    }

    #[test]
    fn test_topology_maps() {
        let params = test_params();

        let servos = params.servo.joint_ids();
        assert_eq!(servos.len(), NUM_LIMBS + 2);
        assert!(servos.keys().all(|k| k.is_servo()));
        assert_eq!(
            servos.get(&JointKey::coxa(comms_if::joint::Limb::LeftFront)),
            Some(&1)
        );

        let sources = params.field_bus.joint_sources();
        assert_eq!(sources.len(), NUM_LIMBS * 2);
        assert!(sources.values().all(|k| k.is_hydraulic()));

        let channels = params.valve.joint_channels();
        assert_eq!(channels.len(), NUM_LIMBS * 2);

        assert_eq!(params.field_bus.monitored_nodes().len(), NUM_LIMBS + 1);
    }
}
