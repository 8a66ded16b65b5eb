//! # I/O sequencer
//!
//! This module implements the [`IoSeq`] state machine, which brings the robot's actuation hardware
//! up and then runs the per-cycle read/control/write loop. The phases are:
//!
//! - `InitDynamixel` - Find every servo on the serial bus and enable torque on them.
//! - `InitNodeMonitor` - Wait for every field bus node to be connected, healthy, and operational.
//! - `Calibrate` - Drive the hydraulic joints to their end stops until every limb holds still.
//! - `Active` - Read every joint, publish the actual angles, and drive the joints to the last
//!   received targets.
//!
//! Failing to find the servos, or the nodes not coming up in time, is fatal. Faults once running
//! are logged and the next cycle tries again.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod calibrate;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{error, info, warn};
use std::{
    fmt::Display,
    time::{Duration, Instant},
};

use crate::{
    angle_reader::AngleReader,
    angle_writer::AngleWriter,
    field_bus::{FieldBus, FieldBusMsg, NodeId},
    hydraulic::HydraulicCtrl,
    node_monitor::{self, NodeMonitor, NODE_TIMEOUT},
    params::{IoExecParams, SeqParams},
    servo::{ServoBus, ServoError, ServoId},
    valve::ValveDriver,
};
use comms_if::msg::{HeadAngle, LegAngle};

pub use calibrate::{
    is_leg_angle_stable, Calibration, CalibrationResult, LimbCalibration, CALIBRATION_EPSILON_DEG,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Session-relative path the calibration result is saved to.
pub const CALIBRATION_RESULT_PATH: &str = "calibration/result.json";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The hardware the sequencer drives.
pub struct Hardware {
    pub servo_bus: Box<dyn ServoBus>,
    pub field_bus: Box<dyn FieldBus>,
    pub valves: Box<dyn ValveDriver>,
}

pub struct IoSeq {
    params: SeqParams,

    phase: IoPhase,

    hw: Hardware,

    /// Servo ids which must be on the bus.
    required_servo_ids: Vec<ServoId>,

    reader: AngleReader,

    writer: AngleWriter,

    monitor: NodeMonitor,

    hydraulic: HydraulicCtrl,

    /// Latest target messages, absent joints hold their previous target.
    leg_target: LegAngle,
    head_target: HeadAngle,

    /// Nodes failing the health checks when last reported while active.
    active_node_faults: Vec<NodeId>,
}

/// Output of one step of the sequencer.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Actual joint angles read this cycle, only set while active.
    pub actual: Option<(LegAngle, HeadAngle)>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum IoPhase {
    InitDynamixel,
    InitNodeMonitor { since: Instant },
    Calibrate(Calibration),
    Active,
}

#[derive(Debug, thiserror::Error)]
pub enum IoSeqError {
    #[error("Servo discovery failed: {0}")]
    DiscoveryFailed(ServoError),

    #[error("No servos were found on the bus")]
    NoServosFound,

    #[error("Required servos are missing from the bus: {0:?}")]
    MissingServos(Vec<ServoId>),

    #[error("Could not enable servo torque: {0}")]
    TorqueEnableFailed(ServoError),

    #[error("Field bus nodes {nodes:?} were not ready after {waited_s:.1} s")]
    NodeMonitorTimeout { waited_s: f64, nodes: Vec<NodeId> },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Display for IoPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IoPhase::InitDynamixel => "InitDynamixel",
            IoPhase::InitNodeMonitor { .. } => "InitNodeMonitor",
            IoPhase::Calibrate(_) => "Calibrate",
            IoPhase::Active => "Active",
        };
        write!(f, "{}", name)
    }
}

impl IoSeq {
    pub fn new(params: &IoExecParams, hw: Hardware) -> Self {
        let servo_ids = params.servo.joint_ids();

        Self {
            params: params.seq.clone(),
            phase: IoPhase::InitDynamixel,
            hw,
            required_servo_ids: params.servo.required_ids(),
            reader: AngleReader::new(
                servo_ids.clone(),
                params.field_bus.joint_sources(),
                params.field_bus.sample_timeout(),
            ),
            writer: AngleWriter::new(servo_ids, params.seq.initial_angle_deg),
            monitor: NodeMonitor::new(params.field_bus.monitored_nodes()),
            hydraulic: HydraulicCtrl::new(&params.valve),
            leg_target: LegAngle::default(),
            head_target: HeadAngle::default(),
            active_node_faults: Vec::new(),
        }
    }

    pub fn phase(&self) -> &IoPhase {
        &self.phase
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, IoPhase::Active)
    }

    pub fn monitor(&self) -> &NodeMonitor {
        &self.monitor
    }

    pub fn hydraulic(&self) -> &HydraulicCtrl {
        &self.hydraulic
    }

    pub fn writer(&self) -> &AngleWriter {
        &self.writer
    }

    /// Merge a new leg target message, angles absent from the message keep their last target.
    pub fn set_leg_target(&mut self, msg: &LegAngle) {
        merge_leg(&mut self.leg_target, msg);
    }

    /// Merge a new head target message, angles absent from the message keep their last target.
    pub fn set_head_target(&mut self, msg: &HeadAngle) {
        if msg.pan_angle_deg.is_some() {
            self.head_target.pan_angle_deg = msg.pan_angle_deg;
        }
        if msg.tilt_angle_deg.is_some() {
            self.head_target.tilt_angle_deg = msg.tilt_angle_deg;
        }
    }

    /// Run one cycle.
    pub fn step(&mut self) -> Result<StepOutput, IoSeqError> {
        self.step_at(Instant::now())
    }

    /// Run one cycle with an explicit current time.
    pub fn step_at(&mut self, now: Instant) -> Result<StepOutput, IoSeqError> {
        self.drain_field_bus(now);

        let mut output = StepOutput::default();

        let phase = std::mem::replace(&mut self.phase, IoPhase::InitDynamixel);
        let prev = phase.to_string();

        let next = match phase {
            IoPhase::InitDynamixel => self.init_dynamixel(now)?,
            IoPhase::InitNodeMonitor { since } => self.init_node_monitor(since, now)?,
            IoPhase::Calibrate(calib) => self.calibrate(calib, now),
            IoPhase::Active => {
                output.actual = Some(self.active(now));
                IoPhase::Active
            }
        };

        if next.to_string() != prev {
            info!("I/O phase {} -> {}", prev, next);
        }

        self.phase = next;

        Ok(output)
    }

    /// Disable servo torque, close the valves, and stop the pump.
    pub fn shutdown(&mut self) {
        info!("Shutting down I/O");

        if let Err(e) = self
            .hw
            .servo_bus
            .set_torque(&self.required_servo_ids, false)
        {
            error!("Could not disable servo torque: {}", e);
        }

        self.hydraulic.close_all();
        self.hydraulic.write_valves(self.hw.valves.as_mut());
        self.hydraulic.write_pump(self.hw.field_bus.as_mut());
    }

    fn drain_field_bus(&mut self, now: Instant) {
        let msgs = match self.hw.field_bus.poll() {
            Ok(m) => m,
            Err(e) => {
                warn!("Field bus poll failed: {}", e);
                return;
            }
        };

        for msg in msgs {
            match msg {
                FieldBusMsg::Heartbeat {
                    node_id,
                    uptime_s,
                    health,
                    mode,
                } => self
                    .monitor
                    .on_heartbeat(node_id, uptime_s, health, mode, now),
                FieldBusMsg::Real32 {
                    node_id,
                    subject_id,
                    value,
                } => {
                    self.reader
                        .on_field_bus_sample(node_id, subject_id, value, now);
                }
            }
        }
    }

    fn init_dynamixel(&mut self, now: Instant) -> Result<IoPhase, IoSeqError> {
        let found = self
            .hw
            .servo_bus
            .discover()
            .map_err(IoSeqError::DiscoveryFailed)?;

        if found.is_empty() {
            return Err(IoSeqError::NoServosFound);
        }

        info!("Found servos {:?}", found);

        let missing: Vec<ServoId> = self
            .required_servo_ids
            .iter()
            .filter(|id| !found.contains(*id))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(IoSeqError::MissingServos(missing));
        }

        self.hw
            .servo_bus
            .set_torque(&self.required_servo_ids, true)
            .map_err(IoSeqError::TorqueEnableFailed)?;

        info!("Servo torque enabled");

        Ok(IoPhase::InitNodeMonitor { since: now })
    }

    fn init_node_monitor(&mut self, since: Instant, now: Instant) -> Result<IoPhase, IoSeqError> {
        let (connected, disconnected) = self.monitor.is_connected_at(now, NODE_TIMEOUT);
        let (healthy, unhealthy) = self.monitor.is_healthy();
        let (operational, not_operational) = self.monitor.is_operational();

        if connected && healthy && operational {
            info!(
                "All field bus nodes ready, detected {}",
                node_monitor::format_ids(&self.monitor.detected_nodes())
            );

            self.hydraulic.open_all_for_calibration();
            self.hydraulic.write_valves(self.hw.valves.as_mut());
            self.hydraulic.write_pump(self.hw.field_bus.as_mut());

            let stable_for = Duration::from_secs_f64(self.params.calibration_stable_s.max(0.0));
            return Ok(IoPhase::Calibrate(Calibration::new(stable_for)));
        }

        if !connected {
            warn!(
                "Nodes not connected: {}",
                node_monitor::format_ids(&disconnected)
            );
        }
        if !healthy {
            warn!("Nodes not healthy: {}", node_monitor::format_ids(&unhealthy));
        }
        if !operational {
            warn!(
                "Nodes not operational: {}",
                node_monitor::format_ids(&not_operational)
            );
        }

        let waited_s = now.saturating_duration_since(since).as_secs_f64();
        if waited_s > self.params.node_monitor_init_timeout_s {
            let (_, nodes) = self.monitor.all_ok_at(now, NODE_TIMEOUT);
            return Err(IoSeqError::NodeMonitorTimeout { waited_s, nodes });
        }

        Ok(IoPhase::InitNodeMonitor { since })
    }

    fn calibrate(&mut self, mut calib: Calibration, now: Instant) -> IoPhase {
        let angles = self.reader.refresh_field_bus(now);
        calib.update(angles, now);

        if calib.is_complete(now) {
            let result = calib.result();
            for limb in result.limbs.iter() {
                info!(
                    "Calibrated limb {}: femur {:?} deg, tibia {:?} deg",
                    limb.limb.label(),
                    limb.femur_angle_deg,
                    limb.tibia_angle_deg
                );
            }
            util::session::save(CALIBRATION_RESULT_PATH, result);

            self.hydraulic.close_all();
            self.hydraulic.write_valves(self.hw.valves.as_mut());
            self.hydraulic.write_pump(self.hw.field_bus.as_mut());

            return IoPhase::Active;
        }

        self.hydraulic.write_pump(self.hw.field_bus.as_mut());

        IoPhase::Calibrate(calib)
    }

    fn active(&mut self, now: Instant) -> (LegAngle, HeadAngle) {
        self.check_nodes_while_active(now);

        self.reader.read_all(self.hw.servo_bus.as_mut(), now);
        let actual = self.reader.to_msgs();

        self.writer.stage_msgs(&self.leg_target, &self.head_target);

        self.hydraulic
            .update(self.writer.targets(), self.reader.snapshot());

        self.writer.flush(self.hw.servo_bus.as_mut());
        self.hydraulic.write_valves(self.hw.valves.as_mut());
        self.hydraulic.write_pump(self.hw.field_bus.as_mut());

        actual
    }

    /// Log changes in the set of faulty nodes.
    fn check_nodes_while_active(&mut self, now: Instant) {
        let (ok, faults) = self.monitor.all_ok_at(now, NODE_TIMEOUT);

        if faults != self.active_node_faults {
            if ok {
                info!("All field bus nodes recovered");
            } else {
                error!(
                    "Field bus nodes not ready: {}",
                    node_monitor::format_ids(&faults)
                );
            }
            self.active_node_faults = faults;
        }
    }
}

fn merge_leg(target: &mut LegAngle, msg: &LegAngle) {
    merge_angles(&mut target.coxa_angle_deg, &msg.coxa_angle_deg);
    merge_angles(&mut target.femur_angle_deg, &msg.femur_angle_deg);
    merge_angles(&mut target.tibia_angle_deg, &msg.tibia_angle_deg);
}

fn merge_angles(target: &mut [Option<f32>], msg: &[Option<f32>]) {
    for (t, m) in target.iter_mut().zip(msg.iter()) {
        if m.is_some() {
            *t = *m;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::joint::{LegJoint, Limb};

    #[test]
    fn test_merge_leg() {
        let mut target = LegAngle::default();
        target.set(Limb::LeftFront, LegJoint::Coxa, Some(10.0));
        target.set(Limb::LeftFront, LegJoint::Femur, Some(20.0));

        let mut msg = LegAngle::default();
        msg.set(Limb::LeftFront, LegJoint::Femur, Some(-5.0));
        merge_leg(&mut target, &msg);

        assert_eq!(target.get(Limb::LeftFront, LegJoint::Coxa), Some(10.0));
        assert_eq!(target.get(Limb::LeftFront, LegJoint::Femur), Some(-5.0));
        assert_eq!(target.get(Limb::RightFront, LegJoint::Tibia), None);
    }
}
