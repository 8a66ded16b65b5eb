//! Main gait executable entry point.
//!
//! # Architecture
//!
//! - Initialise the session, logging, and parameters
//! - Enter the initial gait state
//! - Main loop:
//!     - Receive actual leg angles from `io_exec` and velocity commands
//!     - Update the gait state machine and head controller
//!     - Publish the target angles to `io_exec`

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, info, warn};
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
use gait_lib::{
    gait_ctrl::{GaitInput, GaitOutput, GaitState},
    head_ctrl::{self, HeadCtrl},
    link::{Inbound, IoLink},
    params::GaitExecParams,
    robot::Robot,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    module::State,
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
#[structopt(name = "gait_exec", about = "Hexapod gait and head control")]
struct Opts {
    /// Log level, one of info, debug, trace.
    #[structopt(long, default_value = "trace")]
    log_level: LevelFilter,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    let session =
        Session::new("gait_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(opts.log_level, &session).wrap_err("Failed to initialise logging")?;

    info!("Hexapod Gait Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: GaitExecParams =
        util::params::load("gait_exec.toml").wrap_err("Could not load gait_exec params")?;
    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut gait_output = GaitOutput::default();
    let mut robot = Robot::new(GaitState::init(params.gait), &mut gait_output);

    let mut head_ctrl = HeadCtrl::default();
    head_ctrl
        .init(params.head.clone(), Some(&session))
        .wrap_err("Failed to initialise HeadCtrl")?;

    info!("Modules initialised");

    // ---- INITIALISE NETWORK ----

    let zmq_ctx = zmq::Context::new();

    let link = IoLink::new(&zmq_ctx, &net_params).wrap_err("Failed to initialise the I/O link")?;

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

    let mut inbound = Inbound::default();
    let mut last_cycle_instant = Instant::now();

    while running.load(Ordering::SeqCst) {
        let cycle_start_instant = Instant::now();
        let dt_s = (cycle_start_instant - last_cycle_instant).as_secs_f32();
        last_cycle_instant = cycle_start_instant;

        link.recv(&mut inbound, cycle_start_instant);

        // ---- GAIT ----

        let gait_input = GaitInput {
            actual: inbound.actual_leg(cycle_start_instant, params.gait.actual_timeout()),
            cmd: inbound.cmd,
            dt_s,
        };

        robot.update(&gait_input, &mut gait_output);

        // ---- HEAD ----

        let head_target = match head_ctrl.proc(&head_ctrl::InputData {
            cmd: inbound.cmd,
            dt_s,
        }) {
            Ok((output, report)) => {
                if report.pan_limited || report.tilt_limited {
                    debug!("Head at its limits: {:?}", report);
                }
                Some(output)
            }
            Err(e) => {
                warn!("HeadCtrl error: {}", e);
                None
            }
        };

        // ---- PUBLISH ----

        let head_target = head_target.unwrap_or_default();
        if let Err(e) = link.publish_target(&gait_output.target, &head_target) {
            warn!("{}", e);
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

    info!("End of execution in state {}", robot.state_name());

    session.exit();

    Ok(())
}
