//! # Gait Executable Parameters
//!
//! Loaded from `params/gait_exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;
use std::time::Duration;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GaitExecParams {
    pub gait: GaitParams,

    pub head: HeadCtrlParams,
}

/// Parameters of the gait state machine.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GaitParams {
    /// Coxa angle every leg starts from and returns to when standing.
    ///
    /// Units: degrees
    pub initial_coxa_angle_deg: f32,

    /// Linear velocity commands within this band are treated as zero.
    ///
    /// Units: metres/second
    pub linear_deadband_m_s: f32,

    /// Turn rate commands within this band are treated as zero.
    ///
    /// Units: radians/second
    pub angular_deadband_rad_s: f32,

    /// Peak coxa swing either side of the initial angle.
    ///
    /// Units: degrees
    pub swing_amplitude_deg: f32,

    /// Gait phase advance per metre travelled.
    ///
    /// Units: radians/metre
    pub walk_phase_gain_rad_m: f32,

    /// Gait phase advance per radian turned.
    pub turn_phase_gain: f32,

    /// Actual leg angles older than this are treated as absent.
    ///
    /// Units: milliseconds
    pub actual_timeout_ms: u64,
}

/// Parameters of the head controller.
#[derive(Debug, Clone, Deserialize)]
pub struct HeadCtrlParams {
    /// Minimum and maximum pan angle.
    ///
    /// Units: degrees
    pub pan_limits_deg: [f32; 2],

    /// Minimum and maximum tilt angle.
    ///
    /// Units: degrees
    pub tilt_limits_deg: [f32; 2],
}

impl Default for GaitParams {
    fn default() -> Self {
        Self {
            initial_coxa_angle_deg: 0.0,
            linear_deadband_m_s: 0.02,
            angular_deadband_rad_s: 0.05,
            swing_amplitude_deg: 15.0,
            walk_phase_gain_rad_m: 20.0,
            turn_phase_gain: 6.0,
            actual_timeout_ms: 500,
        }
    }
}

impl GaitParams {
    pub fn actual_timeout(&self) -> Duration {
        Duration::from_millis(self.actual_timeout_ms)
    }
}

impl Default for HeadCtrlParams {
    fn default() -> Self {
        Self {
            pan_limits_deg: [-90.0, 90.0],
            tilt_limits_deg: [-30.0, 45.0],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_params_file() {
        let params: GaitExecParams =
            util::params::parse(include_str!("../../params/gait_exec.toml")).unwrap();

        assert_eq!(params.gait.initial_coxa_angle_deg, 0.0);
        assert_eq!(params.gait.actual_timeout(), Duration::from_millis(500));
        assert!(params.head.pan_limits_deg[0] < params.head.pan_limits_deg[1]);
        assert!(params.head.tilt_limits_deg[0] < params.head.tilt_limits_deg[1]);
    }
}
