//! # I/O Cycle Benchmark

use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::{Duration, Instant};

use comms_if::{
    joint::{LegJoint, LIMBS},
    msg::LegAngle,
};
use io_lib::{
    io_seq::IoSeq,
    params::IoExecParams,
    servo::packet::{build_instruction, sync_write_params, Instruction},
    sim::{SimHardware, SimWorld},
};

fn io_cycle_benchmark(c: &mut Criterion) {
    let params: IoExecParams =
        util::params::parse(include_str!("../../params/io_exec.toml")).unwrap();

    let mut world = SimWorld::from_params(&params);
    world.hydraulic_rate_deg_s = 0.0;
    let sim = SimHardware::new(world);
    let mut seq = IoSeq::new(&params, sim.hardware());

    // Bring up to the active phase
    let t0 = Instant::now();
    let stable = Duration::from_secs_f64(params.seq.calibration_stable_s);
    for t in [t0, t0, t0, t0 + stable].iter() {
        seq.step_at(*t).unwrap();
    }
    assert!(seq.is_active());

    // Random targets so the hydraulic controller has work to do
    let mut rng = StdRng::seed_from_u64(0);
    let mut targets = LegAngle::default();
    for limb in LIMBS.iter() {
        for joint in [LegJoint::Coxa, LegJoint::Femur, LegJoint::Tibia].iter() {
            targets.set(*limb, *joint, Some(rng.gen_range(-45.0..45.0)));
        }
    }
    seq.set_leg_target(&targets);

    c.bench_function("io_active_cycle", |b| {
        b.iter(|| seq.step_at(t0 + stable).unwrap())
    });

    let positions: Vec<(u8, Vec<u8>)> = (1..=8u8).map(|id| (id, vec![0, 8, 0, 0])).collect();
    c.bench_function("servo_sync_write_packet", |b| {
        b.iter(|| {
            build_instruction(
                0xFE,
                Instruction::SyncWrite,
                &sync_write_params(116, &positions),
            )
        })
    });
}

criterion_group!(benches, io_cycle_benchmark);
criterion_main!(benches);
