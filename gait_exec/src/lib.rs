//! # Gait library
//!
//! Decides the target joint angles of the hexapod from the velocity command and the actual
//! joint angles reported by `io_exec`.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Gait state machine
pub mod gait_ctrl;

/// Head pan/tilt control
pub mod head_ctrl;

/// Links to `io_exec` and the teleoperation source
pub mod link;

/// Gait executable parameters
pub mod params;

/// Generic state machine container
pub mod robot;
