//! # I/O Library
//!
//! Drivers and control for the hexapod's actuation hardware: the servo bus driving the coxa and
//! head joints, the Cyphal field bus carrying the leg node sensors and pump setpoint, and the
//! hydraulic valves. [`io_seq::IoSeq`] sequences them from startup to the running control loop.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod angle_reader;
pub mod angle_writer;
pub mod field_bus;
pub mod hydraulic;
pub mod io_seq;
pub mod link;
pub mod node_monitor;
pub mod params;
pub mod servo;
pub mod sim;
pub mod valve;
