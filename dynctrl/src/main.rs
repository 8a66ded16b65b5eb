//! # Servo maintenance tool
//!
//! Discover the servos on a bus, read their angles, or drive a single servo to an angle, without
//! running the rest of the I/O stack.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use std::time::Duration;
use structopt::StructOpt;

// Internal
use io_lib::servo::{Dynamixel, ServoBus, ServoId};
use util::logger::{logger_init_stdout, LevelFilter};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Time to wait for a servo to respond.
const TIMEOUT: Duration = Duration::from_millis(50);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "dynctrl", about = "Dynamixel servo maintenance")]
struct Opts {
    /// Serial device the servo bus is on.
    #[structopt(long, default_value = "/dev/ttyUSB0")]
    device: String,

    /// Baud rate of the servo bus.
    #[structopt(long, default_value = "115200")]
    baud: u32,

    #[structopt(subcommand)]
    cmd: Cmd,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
enum Cmd {
    /// Ping every id and list the servos which respond.
    #[structopt(name = "discover")]
    Discover,

    /// Read the present angle of one servo, or of every discovered servo.
    #[structopt(name = "get-angle")]
    GetAngle {
        #[structopt(long)]
        id: Option<ServoId>,
    },

    /// Enable torque on a servo and drive it to an angle.
    #[structopt(name = "set-angle")]
    SetAngle {
        #[structopt(long)]
        id: ServoId,

        /// Units: degrees
        #[structopt(long, allow_hyphen_values = true)]
        angle: f32,
    },
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    let opts = Opts::from_args();

    logger_init_stdout(LevelFilter::Info).wrap_err("Failed to initialise logging")?;

    let mut bus = Dynamixel::open(&opts.device, opts.baud, TIMEOUT)
        .wrap_err_with(|| format!("Failed to open {}", opts.device))?;

    match opts.cmd {
        Cmd::Discover => {
            let ids = bus.discover().wrap_err("Discovery failed")?;
            if ids.is_empty() {
                warn!("No servos found");
            }
            for id in ids {
                info!("Found servo {}", id);
            }
        }
        Cmd::GetAngle { id: Some(id) } => {
            let angle = bus
                .read_angle(id)
                .wrap_err_with(|| format!("Failed to read servo {}", id))?;
            info!("Servo {}: {:.2} deg", id, angle);
        }
        Cmd::GetAngle { id: None } => {
            let ids: Vec<ServoId> = bus
                .discover()
                .wrap_err("Discovery failed")?
                .into_iter()
                .collect();
            if ids.is_empty() {
                return Err(eyre!("No servos found"));
            }

            let angles = bus.bulk_read(&ids).wrap_err("Failed to read the servos")?;
            for id in ids {
                match angles.get(&id) {
                    Some(a) => info!("Servo {}: {:.2} deg", id, a),
                    None => warn!("Servo {}: no response", id),
                }
            }
        }
        Cmd::SetAngle { id, angle } => {
            bus.set_torque(&[id], true)
                .wrap_err_with(|| format!("Failed to enable torque on servo {}", id))?;
            bus.write_angle(id, angle)
                .wrap_err_with(|| format!("Failed to write servo {}", id))?;
            info!("Servo {} set to {:.2} deg", id, angle);
        }
    }

    Ok(())
}
