//! # Simulated hardware
//!
//! A software stand-in for the servo bus, field bus, and valve controller, used by `io_exec --sim`
//! and by the tests. All three share one [`SimWorld`] so that e.g. opening a valve with the pump
//! running moves the joint the field bus reports.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    cell::{RefCell, RefMut},
    collections::{BTreeMap, BTreeSet, VecDeque},
    rc::Rc,
    time::Instant,
};

use crate::{
    field_bus::{FieldBus, FieldBusError, FieldBusMsg, Health, Mode, NodeId, SubjectId},
    io_seq::Hardware,
    params::IoExecParams,
    servo::{ServoBus, ServoError, ServoId},
    valve::{ValveChannel, ValveDriver, ValveError},
};
use comms_if::joint::JointKey;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// State of the simulated robot.
pub struct SimWorld {
    /// Present angle of every servo on the bus.
    pub servos: BTreeMap<ServoId, f32>,

    /// Servos which are on the bus but never respond to reads.
    pub unresponsive_servos: BTreeSet<ServoId>,

    pub torque_enabled: BTreeMap<ServoId, bool>,

    /// Fails every servo transaction when set.
    pub servo_bus_down: bool,

    pub nodes: BTreeMap<NodeId, SimNode>,

    pub hydraulic_joints: BTreeMap<JointKey, SimHydraulicJoint>,

    /// Last pulse width written to each valve channel.
    pub valve_pulses: BTreeMap<ValveChannel, u16>,

    /// Every pump speed published, oldest first.
    pub pump_rpm_log: Vec<u16>,

    /// Messages delivered on the next field bus poll, before the generated ones.
    pub injected: VecDeque<FieldBusMsg>,

    /// Units: degrees/second
    pub hydraulic_rate_deg_s: f32,

    neutral_pulse_us: f32,

    full_open_offset_us: f32,

    start: Instant,

    last_poll: Option<Instant>,
}

/// A field bus node.
#[derive(Debug, Clone, Copy)]
pub struct SimNode {
    pub health: Health,
    pub mode: Mode,

    /// A silent node sends no heartbeat.
    pub silent: bool,
}

/// A hydraulic joint and its sensor.
#[derive(Debug, Clone, Copy)]
pub struct SimHydraulicJoint {
    pub node_id: NodeId,
    pub subject_id: SubjectId,
    pub channel: ValveChannel,
    pub angle_deg: f32,

    /// A silent sensor publishes nothing.
    pub silent: bool,
}

/// Handle on a shared [`SimWorld`].
#[derive(Clone)]
pub struct SimHardware {
    world: Rc<RefCell<SimWorld>>,
}

struct SimServoBus {
    world: Rc<RefCell<SimWorld>>,
}

struct SimFieldBus {
    world: Rc<RefCell<SimWorld>>,
}

struct SimValves {
    world: Rc<RefCell<SimWorld>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimWorld {
    /// Build a world with every configured servo and node present and healthy, and every joint at
    /// 0 degrees.
    pub fn from_params(params: &IoExecParams) -> Self {
        let servos: BTreeMap<ServoId, f32> = params
            .servo
            .required_ids()
            .into_iter()
            .map(|id| (id, 0.0))
            .collect();
        let torque_enabled = servos.keys().map(|id| (*id, false)).collect();

        let nodes = params
            .field_bus
            .monitored_nodes()
            .into_iter()
            .map(|id| {
                (
                    id,
                    SimNode {
                        health: Health::Nominal,
                        mode: Mode::Operational,
                        silent: false,
                    },
                )
            })
            .collect();

        let channels = params.valve.joint_channels();
        let hydraulic_joints = params
            .field_bus
            .joint_sources()
            .into_iter()
            .filter_map(|((node_id, subject_id), key)| {
                channels.get(&key).map(|channel| {
                    (
                        key,
                        SimHydraulicJoint {
                            node_id,
                            subject_id,
                            channel: *channel,
                            angle_deg: 0.0,
                            silent: false,
                        },
                    )
                })
            })
            .collect();

        Self {
            servos,
            unresponsive_servos: BTreeSet::new(),
            torque_enabled,
            servo_bus_down: false,
            nodes,
            hydraulic_joints,
            valve_pulses: BTreeMap::new(),
            pump_rpm_log: Vec::new(),
            injected: VecDeque::new(),
            hydraulic_rate_deg_s: params.sim.hydraulic_rate_deg_s,
            neutral_pulse_us: params.valve.neutral_pulse_us as f32,
            full_open_offset_us: params.valve.full_open_offset_us as f32,
            start: Instant::now(),
            last_poll: None,
        }
    }

    /// Latest published pump speed.
    pub fn pump_rpm(&self) -> u16 {
        self.pump_rpm_log.last().copied().unwrap_or(0)
    }

    /// Move the hydraulic joints by their valve openings over the time since the last poll.
    fn integrate(&mut self, now: Instant) {
        let dt = match self.last_poll {
            Some(t) => now.saturating_duration_since(t).as_secs_f32(),
            None => 0.0,
        };
        self.last_poll = Some(now);

        if self.pump_rpm() == 0 || dt == 0.0 {
            return;
        }

        for joint in self.hydraulic_joints.values_mut() {
            let pulse = match self.valve_pulses.get(&joint.channel) {
                Some(p) => *p as f32,
                None => continue,
            };
            let opening = (pulse - self.neutral_pulse_us) / self.full_open_offset_us;
            joint.angle_deg += opening * self.hydraulic_rate_deg_s * dt;
        }
    }
}

impl SimHardware {
    pub fn new(world: SimWorld) -> Self {
        Self {
            world: Rc::new(RefCell::new(world)),
        }
    }

    pub fn world(&self) -> RefMut<'_, SimWorld> {
        self.world.borrow_mut()
    }

    /// Build a [`Hardware`] set backed by this world.
    pub fn hardware(&self) -> Hardware {
        Hardware {
            servo_bus: Box::new(SimServoBus {
                world: self.world.clone(),
            }),
            field_bus: Box::new(SimFieldBus {
                world: self.world.clone(),
            }),
            valves: Box::new(SimValves {
                world: self.world.clone(),
            }),
        }
    }
}

impl ServoBus for SimServoBus {
    fn discover(&mut self) -> Result<BTreeSet<ServoId>, ServoError> {
        let world = self.world.borrow();
        if world.servo_bus_down {
            return Err(ServoError::Timeout(0, 14));
        }
        Ok(world.servos.keys().copied().collect())
    }

    fn bulk_read(&mut self, ids: &[ServoId]) -> Result<BTreeMap<ServoId, f32>, ServoError> {
        let world = self.world.borrow();
        if world.servo_bus_down {
            return Err(ServoError::Timeout(0, 15));
        }
        Ok(ids
            .iter()
            .filter(|id| !world.unresponsive_servos.contains(*id))
            .filter_map(|id| world.servos.get(id).map(|a| (*id, *a)))
            .collect())
    }

    fn bulk_write(&mut self, angles: &BTreeMap<ServoId, f32>) -> Result<(), ServoError> {
        let mut world = self.world.borrow_mut();
        if world.servo_bus_down {
            return Err(ServoError::Timeout(0, 11));
        }
        for (id, angle) in angles {
            // Servos only move with torque enabled
            if world.torque_enabled.get(id).copied().unwrap_or(false) {
                world.servos.insert(*id, *angle);
            }
        }
        Ok(())
    }

    fn set_torque(&mut self, ids: &[ServoId], enabled: bool) -> Result<(), ServoError> {
        let mut world = self.world.borrow_mut();
        if world.servo_bus_down {
            return Err(ServoError::Timeout(0, 11));
        }
        for id in ids {
            if world.servos.contains_key(id) {
                world.torque_enabled.insert(*id, enabled);
            }
        }
        Ok(())
    }
}

impl FieldBus for SimFieldBus {
    fn poll(&mut self) -> Result<Vec<FieldBusMsg>, FieldBusError> {
        let mut world = self.world.borrow_mut();
        let now = Instant::now();
        world.integrate(now);

        let uptime_s = now.saturating_duration_since(world.start).as_secs() as u32;

        let mut msgs: Vec<FieldBusMsg> = world.injected.drain(..).collect();

        msgs.extend(
            world
                .nodes
                .iter()
                .filter(|(_, n)| !n.silent)
                .map(|(id, n)| FieldBusMsg::Heartbeat {
                    node_id: *id,
                    uptime_s,
                    health: n.health,
                    mode: n.mode,
                }),
        );

        msgs.extend(
            world
                .hydraulic_joints
                .values()
                .filter(|j| !j.silent)
                .map(|j| FieldBusMsg::Real32 {
                    node_id: j.node_id,
                    subject_id: j.subject_id,
                    value: j.angle_deg,
                }),
        );

        Ok(msgs)
    }

    fn publish_pump_rpm(&mut self, rpm: u16) -> Result<(), FieldBusError> {
        self.world.borrow_mut().pump_rpm_log.push(rpm);
        Ok(())
    }
}

impl ValveDriver for SimValves {
    fn bulk_write(&mut self, pulses_us: &BTreeMap<ValveChannel, u16>) -> Result<(), ValveError> {
        let mut world = self.world.borrow_mut();
        for (channel, pulse) in pulses_us {
            world.valve_pulses.insert(*channel, *pulse);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::test::test_params;
    use comms_if::joint::{LegJoint, Limb};
    use std::time::Duration;

    #[test]
    fn test_servos_need_torque() {
        let sim = SimHardware::new(SimWorld::from_params(&test_params()));
        let mut hw = sim.hardware();

        let mut angles = BTreeMap::new();
        angles.insert(1, 30.0);
        hw.servo_bus.bulk_write(&angles).unwrap();
        assert_eq!(hw.servo_bus.bulk_read(&[1]).unwrap().get(&1), Some(&0.0));

        hw.servo_bus.set_torque(&[1], true).unwrap();
        hw.servo_bus.bulk_write(&angles).unwrap();
        assert_eq!(hw.servo_bus.bulk_read(&[1]).unwrap().get(&1), Some(&30.0));
    }

    #[test]
    fn test_hydraulics_move_with_pump() {
        let sim = SimHardware::new(SimWorld::from_params(&test_params()));
        let mut hw = sim.hardware();
        let femur = JointKey::leg(Limb::LeftFront, LegJoint::Femur);

        // First poll only sets the integration epoch
        hw.field_bus.poll().unwrap();

        let channel = sim.world().hydraulic_joints[&femur].channel;
        let mut pulses = BTreeMap::new();
        pulses.insert(channel, 2000);
        hw.valves.bulk_write(&pulses).unwrap();

        // Valve open but no pump
        std::thread::sleep(Duration::from_millis(20));
        hw.field_bus.poll().unwrap();
        assert_eq!(sim.world().hydraulic_joints[&femur].angle_deg, 0.0);

        hw.field_bus.publish_pump_rpm(4096).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let msgs = hw.field_bus.poll().unwrap();
        assert!(sim.world().hydraulic_joints[&femur].angle_deg > 0.0);

        // One heartbeat per node and one sample per hydraulic joint
        let params = test_params();
        assert_eq!(
            msgs.len(),
            params.field_bus.monitored_nodes().len() + params.field_bus.joint_sources().len()
        );
    }
}
