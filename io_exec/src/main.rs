//! Main I/O executable entry point.
//!
//! # Architecture
//!
//! - Initialise the session, logging, and parameters
//! - Open the hardware, or the simulated hardware with `--sim`
//! - Main loop:
//!     - Receive target angles from `gait_exec`
//!     - Step the I/O sequencer
//!     - Publish actual angles to `gait_exec`
//! - On Ctrl-C disable servo torque, close the valves, and stop the pump

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use structopt::StructOpt;

// Internal
use comms_if::net::{zmq, NetParams};
use io_lib::{
    field_bus::FieldBus,
    io_seq::{Hardware, IoSeq},
    link::{GaitLink, TargetMsg},
    params::IoExecParams,
    servo::Dynamixel,
    sim::{SimHardware, SimWorld},
    valve::Ssc32,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.05;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "io_exec", about = "Hexapod actuation I/O")]
struct Opts {
    /// Run against simulated hardware.
    #[structopt(long)]
    sim: bool,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("io_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    info!("Hexapod I/O Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: IoExecParams =
        util::params::load("io_exec.toml").wrap_err("Could not load io_exec params")?;
    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE HARDWARE ----

    // Keep the simulated world alive for the whole execution
    let sim = if opts.sim {
        info!("Using simulated hardware");
        Some(SimHardware::new(SimWorld::from_params(&params)))
    } else {
        None
    };

    let hw = match sim {
        Some(ref s) => s.hardware(),
        None => open_hardware(&params).wrap_err("Failed to open the hardware")?,
    };

    let mut io_seq = IoSeq::new(&params, hw);

    // ---- INITIALISE NETWORK ----

    let zmq_ctx = zmq::Context::new();

    let link =
        GaitLink::new(&zmq_ctx, &net_params).wrap_err("Failed to initialise the gait link")?;

    info!("Network initialised");

    // ---- SHUTDOWN HANDLER ----

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })
    .wrap_err("Failed to set the Ctrl-C handler")?;

    info!("Initialisation complete, entering main loop\n");

    // ---- MAIN LOOP ----

    let mut result = Ok(());

    while running.load(Ordering::SeqCst) {
        let cycle_start_instant = Instant::now();

        for msg in link.recv_targets() {
            match msg {
                TargetMsg::Leg(m) => io_seq.set_leg_target(&m),
                TargetMsg::Head(m) => io_seq.set_head_target(&m),
            }
        }

        match io_seq.step() {
            Ok(output) => {
                if let Some((leg, head)) = output.actual {
                    if let Err(e) = link.publish_actual(&leg, &head) {
                        warn!("{}", e);
                    }
                }
            }
            Err(e) => {
                result = Err(e).wrap_err("I/O sequencing failed");
                break;
            }
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        match Duration::from_secs_f64(CYCLE_PERIOD_S).checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
            ),
        }
    }

    // ---- SHUTDOWN ----

    io_seq.shutdown();

    info!("End of execution");

    session.exit();

    result
}

/// Open the real hardware.
fn open_hardware(params: &IoExecParams) -> Result<Hardware, Report> {
    let servo_bus = Dynamixel::open(
        &params.servo.device,
        params.servo.baud_rate,
        params.servo.timeout(),
    )
    .wrap_err("Failed to open the servo bus")?;

    let valves = Ssc32::open(&params.valve.device, params.valve.baud_rate)
        .wrap_err("Failed to open the valve controller")?;

    let field_bus = open_field_bus(params)?;

    Ok(Hardware {
        servo_bus: Box::new(servo_bus),
        field_bus,
        valves: Box::new(valves),
    })
}

#[cfg(target_os = "linux")]
fn open_field_bus(params: &IoExecParams) -> Result<Box<dyn FieldBus>, Report> {
    let codec = io_lib::field_bus::CyphalCodec::new(params.field_bus.real32_subjects());

    let can = io_lib::field_bus::CyphalCan::open(
        &params.field_bus.interface,
        codec,
        params.field_bus.local_node_id,
        params.field_bus.pump_rpm_subject_id,
    )
    .wrap_err("Failed to open the field bus")?;

    Ok(Box::new(can))
}

#[cfg(not(target_os = "linux"))]
fn open_field_bus(_params: &IoExecParams) -> Result<Box<dyn FieldBus>, Report> {
    Err(color_eyre::eyre::eyre!(
        "The field bus needs SocketCAN, use --sim on this platform"
    ))
}
