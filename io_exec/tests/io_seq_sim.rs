//! Sequencer tests against the simulated hardware.

use std::time::{Duration, Instant};

use comms_if::{
    joint::{HeadJoint, JointKey, LegJoint, Limb},
    msg::{HeadAngle, LegAngle},
};
use io_lib::{
    field_bus::{FieldBusMsg, Health, Mode},
    hydraulic::PUMP_ACTIVE_RPM,
    io_seq::{IoPhase, IoSeq, IoSeqError},
    params::IoExecParams,
    sim::{SimHardware, SimWorld},
};

fn params() -> IoExecParams {
    util::params::parse(include_str!("../../params/io_exec.toml")).unwrap()
}

/// Simulated hardware with static hydraulics.
fn sim(params: &IoExecParams) -> SimHardware {
    let mut world = SimWorld::from_params(params);
    world.hydraulic_rate_deg_s = 0.0;
    SimHardware::new(world)
}

fn phase_name(seq: &IoSeq) -> String {
    seq.phase().to_string()
}

/// Step a new sequencer through to the active phase, returning the time of the last step.
fn bring_up(seq: &mut IoSeq, t0: Instant) -> Instant {
    seq.step_at(t0).unwrap();
    seq.step_at(t0).unwrap();
    let t1 = t0 + Duration::from_millis(50);
    seq.step_at(t1).unwrap();
    let t2 = t1 + Duration::from_secs(3);
    seq.step_at(t2).unwrap();
    assert!(seq.is_active(), "expected Active, found {}", phase_name(seq));
    t2
}

#[test]
fn test_bring_up() {
    let params = params();
    let sim = sim(&params);
    let mut seq = IoSeq::new(&params, sim.hardware());
    let t0 = Instant::now();

    assert_eq!(phase_name(&seq), "InitDynamixel");

    seq.step_at(t0).unwrap();
    assert_eq!(phase_name(&seq), "InitNodeMonitor");
    assert!(sim.world().torque_enabled.values().all(|t| *t));

    seq.step_at(t0).unwrap();
    assert_eq!(phase_name(&seq), "Calibrate");
    assert_eq!(sim.world().pump_rpm(), PUMP_ACTIVE_RPM);
    assert!(sim.world().valve_pulses.values().all(|p| *p == 1250));

    // Every limb needs to hold still for the calibration time
    let t1 = t0 + Duration::from_millis(50);
    seq.step_at(t1).unwrap();
    seq.step_at(t1 + Duration::from_secs(2)).unwrap();
    assert_eq!(phase_name(&seq), "Calibrate");
    assert_eq!(sim.world().pump_rpm(), PUMP_ACTIVE_RPM);

    seq.step_at(t1 + Duration::from_secs(3)).unwrap();
    assert_eq!(phase_name(&seq), "Active");
    assert_eq!(sim.world().pump_rpm(), 0);
    assert!(sim.world().valve_pulses.values().all(|p| *p == 1500));
}

#[test]
fn test_active_cycle() {
    let params = params();
    let sim = sim(&params);
    let mut seq = IoSeq::new(&params, sim.hardware());
    let t = bring_up(&mut seq, Instant::now());

    let mut leg = LegAngle::default();
    leg.set(Limb::LeftFront, LegJoint::Coxa, Some(20.0));
    leg.set(Limb::LeftFront, LegJoint::Femur, Some(10.0));
    seq.set_leg_target(&leg);
    seq.set_head_target(&HeadAngle {
        pan_angle_deg: Some(-15.0),
        tilt_angle_deg: None,
    });

    let out = seq.step_at(t + Duration::from_millis(50)).unwrap();
    let (actual_leg, _) = out.actual.unwrap();
    // Read happens before the write
    assert_eq!(actual_leg.get(Limb::LeftFront, LegJoint::Coxa), Some(0.0));
    assert_eq!(actual_leg.get(Limb::LeftFront, LegJoint::Femur), Some(0.0));

    // Left front femur is 10 degrees off target so the pump runs and its valve opens
    assert_eq!(sim.world().pump_rpm(), PUMP_ACTIVE_RPM);
    assert_eq!(sim.world().valve_pulses.get(&0), Some(&1900));
    assert_eq!(sim.world().valve_pulses.get(&1), Some(&1500));

    let out = seq.step_at(t + Duration::from_millis(100)).unwrap();
    let (actual_leg, actual_head) = out.actual.unwrap();
    assert_eq!(actual_leg.get(Limb::LeftFront, LegJoint::Coxa), Some(20.0));
    assert_eq!(actual_head.pan_angle_deg, Some(-15.0));
    assert_eq!(actual_head.tilt_angle_deg, Some(0.0));

    // Femur reaches its target
    sim.world()
        .hydraulic_joints
        .get_mut(&JointKey::leg(Limb::LeftFront, LegJoint::Femur))
        .unwrap()
        .angle_deg = 9.0;
    seq.step_at(t + Duration::from_millis(150)).unwrap();
    assert_eq!(sim.world().pump_rpm(), 0);
    assert_eq!(sim.world().valve_pulses.get(&0), Some(&1500));
}

#[test]
fn test_active_survives_bus_faults() {
    let params = params();
    let sim = sim(&params);
    let mut seq = IoSeq::new(&params, sim.hardware());
    let t = bring_up(&mut seq, Instant::now());

    sim.world().servo_bus_down = true;
    sim.world()
        .hydraulic_joints
        .get_mut(&JointKey::leg(Limb::RightBack, LegJoint::Tibia))
        .unwrap()
        .silent = true;

    let out = seq.step_at(t + Duration::from_secs(1)).unwrap();
    let (leg, head) = out.actual.unwrap();
    assert!(leg.coxa_angle_deg.iter().all(|a| a.is_none()));
    assert_eq!(head.get(HeadJoint::Tilt), None);
    // The last sample is older than the sample timeout
    assert_eq!(leg.get(Limb::RightBack, LegJoint::Tibia), None);
    assert_eq!(leg.get(Limb::RightBack, LegJoint::Femur), Some(0.0));
    assert!(seq.is_active());

    sim.world().servo_bus_down = false;
    let out = seq.step_at(t + Duration::from_secs(2)).unwrap();
    assert!(out.actual.unwrap().0.coxa_angle_deg.iter().all(|a| a.is_some()));
}

#[test]
fn test_missing_servo_is_fatal() {
    let params = params();
    let sim = sim(&params);
    sim.world().servos.remove(&params.servo.head_tilt_id);
    let mut seq = IoSeq::new(&params, sim.hardware());

    match seq.step_at(Instant::now()) {
        Err(IoSeqError::MissingServos(ids)) => assert_eq!(ids, vec![params.servo.head_tilt_id]),
        r => panic!("Expected MissingServos, got {:?}", r.map(|_| ())),
    }
}

#[test]
fn test_no_servos_is_fatal() {
    let params = params();
    let sim = sim(&params);
    sim.world().servos.clear();
    let mut seq = IoSeq::new(&params, sim.hardware());

    assert!(matches!(
        seq.step_at(Instant::now()),
        Err(IoSeqError::NoServosFound)
    ));
}

#[test]
fn test_node_monitor_waits_then_times_out() {
    let params = params();
    let sim = sim(&params);
    let silent = params.field_bus.leg_node_ids[2];
    let unhealthy = params.field_bus.pump_node_id;
    sim.world().nodes.get_mut(&silent).unwrap().silent = true;
    sim.world().nodes.get_mut(&unhealthy).unwrap().health = Health::Warning;

    let mut seq = IoSeq::new(&params, sim.hardware());
    let t0 = Instant::now();

    seq.step_at(t0).unwrap();
    seq.step_at(t0 + Duration::from_secs(1)).unwrap();
    seq.step_at(t0 + Duration::from_secs(30)).unwrap();
    assert!(matches!(seq.phase(), IoPhase::InitNodeMonitor { .. }));
    assert!(sim.world().pump_rpm_log.is_empty());

    match seq.step_at(t0 + Duration::from_secs(61)) {
        Err(IoSeqError::NodeMonitorTimeout { nodes, .. }) => {
            let mut expected = vec![silent, unhealthy];
            expected.sort_unstable();
            assert_eq!(nodes, expected);
        }
        r => panic!("Expected NodeMonitorTimeout, got {:?}", r.map(|_| ())),
    }
}

#[test]
fn test_node_monitor_recovers() {
    let params = params();
    let sim = sim(&params);
    let node = params.field_bus.leg_node_ids[0];
    sim.world().nodes.get_mut(&node).unwrap().mode = Mode::Initialization;

    let mut seq = IoSeq::new(&params, sim.hardware());
    let t0 = Instant::now();

    seq.step_at(t0).unwrap();
    seq.step_at(t0).unwrap();
    assert_eq!(phase_name(&seq), "InitNodeMonitor");

    sim.world().nodes.get_mut(&node).unwrap().mode = Mode::Operational;
    seq.step_at(t0 + Duration::from_secs(1)).unwrap();
    assert_eq!(phase_name(&seq), "Calibrate");
    assert_eq!(seq.monitor().detected_nodes(), params.field_bus.monitored_nodes());
}

#[test]
fn test_calibration_waits_for_stillness() {
    let params = params();
    let sim = sim(&params);
    let mut seq = IoSeq::new(&params, sim.hardware());
    let t0 = Instant::now();
    let tibia = JointKey::leg(Limb::LeftMiddle, LegJoint::Tibia);

    seq.step_at(t0).unwrap();
    seq.step_at(t0).unwrap();
    seq.step_at(t0).unwrap();
    assert_eq!(phase_name(&seq), "Calibrate");

    // Small movements don't restart the timer, large ones do
    sim.world().hydraulic_joints.get_mut(&tibia).unwrap().angle_deg = 0.3;
    seq.step_at(t0 + Duration::from_secs(1)).unwrap();
    sim.world().hydraulic_joints.get_mut(&tibia).unwrap().angle_deg = 2.0;
    seq.step_at(t0 + Duration::from_secs(2)).unwrap();

    seq.step_at(t0 + Duration::from_secs(3)).unwrap();
    seq.step_at(t0 + Duration::from_secs(4)).unwrap();
    assert_eq!(phase_name(&seq), "Calibrate");

    seq.step_at(t0 + Duration::from_secs(5)).unwrap();
    assert_eq!(phase_name(&seq), "Active");
}

#[test]
fn test_injected_samples_and_heartbeats() {
    let params = params();
    let sim = sim(&params);
    let mut seq = IoSeq::new(&params, sim.hardware());
    let t0 = Instant::now();

    // A node which isn't monitored is still detected
    sim.world().injected.push_back(FieldBusMsg::Heartbeat {
        node_id: 120,
        uptime_s: 1,
        health: Health::Nominal,
        mode: Mode::Operational,
    });
    seq.step_at(t0).unwrap();
    assert!(seq.monitor().detected_nodes().contains(&120));
}

#[test]
fn test_shutdown() {
    let params = params();
    let sim = sim(&params);
    let mut seq = IoSeq::new(&params, sim.hardware());
    let t = bring_up(&mut seq, Instant::now());

    let mut leg = LegAngle::default();
    leg.set(Limb::RightFront, LegJoint::Tibia, Some(40.0));
    seq.set_leg_target(&leg);
    seq.step_at(t + Duration::from_millis(50)).unwrap();
    assert_eq!(sim.world().pump_rpm(), PUMP_ACTIVE_RPM);

    seq.shutdown();
    assert!(sim.world().torque_enabled.values().all(|t| !*t));
    assert_eq!(sim.world().pump_rpm(), 0);
    assert!(sim.world().valve_pulses.values().all(|p| *p == 1500));
}
