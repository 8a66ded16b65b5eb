//! # Head control
//!
//! Integrates the head rate components of the velocity command into pan and tilt targets, held
//! within the configured limits. Both axes start centred.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use serde::Serialize;

use crate::params::HeadCtrlParams;
use comms_if::msg::{HeadAngle, VelocityCmd};
use util::{module::State, session::Session};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Head control module state
#[derive(Default)]
pub struct HeadCtrl {
    pub(crate) params: HeadCtrlParams,

    pub(crate) report: StatusReport,

    /// Units: degrees
    pan_deg: f32,

    /// Units: degrees
    tilt_deg: f32,
}

/// Input data to head control.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputData {
    /// Latest velocity command, only `angular_x` (tilt) and `angular_y` (pan) are used.
    pub cmd: VelocityCmd,

    /// Units: seconds
    pub dt_s: f32,
}

/// Status report for head control processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    pub pan_limited: bool,
    pub tilt_limited: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum HeadCtrlError {
    #[error("The {0} limits are inverted: min {1} deg > max {2} deg")]
    InvalidLimits(&'static str, f32, f32),

    #[error("Head rate command is not finite: {0:?}")]
    NonFiniteCmd(VelocityCmd),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HeadCtrl {
    /// Current (pan, tilt) target.
    pub fn angles(&self) -> (f32, f32) {
        (self.pan_deg, self.tilt_deg)
    }
}

impl State for HeadCtrl {
    type InitData = HeadCtrlParams;
    type InitError = HeadCtrlError;

    type InputData = InputData;
    type OutputData = HeadAngle;
    type StatusReport = StatusReport;
    type ProcError = HeadCtrlError;

    fn init(
        &mut self,
        init_data: Self::InitData,
        _session: Option<&Session>,
    ) -> Result<(), Self::InitError> {
        let [pan_min, pan_max] = init_data.pan_limits_deg;
        if pan_min > pan_max {
            return Err(HeadCtrlError::InvalidLimits("pan", pan_min, pan_max));
        }
        let [tilt_min, tilt_max] = init_data.tilt_limits_deg;
        if tilt_min > tilt_max {
            return Err(HeadCtrlError::InvalidLimits("tilt", tilt_min, tilt_max));
        }

        self.params = init_data;
        self.pan_deg = util::maths::clamp(0.0, pan_min, pan_max);
        self.tilt_deg = util::maths::clamp(0.0, tilt_min, tilt_max);

        Ok(())
    }

    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        self.report = StatusReport::default();

        let cmd = input_data.cmd;
        if !cmd.angular_x.is_finite() || !cmd.angular_y.is_finite() {
            return Err(HeadCtrlError::NonFiniteCmd(cmd));
        }

        let (pan, pan_limited) = integrate(
            self.pan_deg,
            cmd.angular_y * input_data.dt_s,
            self.params.pan_limits_deg,
        );
        let (tilt, tilt_limited) = integrate(
            self.tilt_deg,
            cmd.angular_x * input_data.dt_s,
            self.params.tilt_limits_deg,
        );

        self.pan_deg = pan;
        self.tilt_deg = tilt;
        self.report.pan_limited = pan_limited;
        self.report.tilt_limited = tilt_limited;

        trace!("HeadCtrl output: pan {:.2} deg, tilt {:.2} deg", pan, tilt);

        Ok((
            HeadAngle {
                pan_angle_deg: Some(pan),
                tilt_angle_deg: Some(tilt),
            },
            self.report,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Add `delta` to `angle`, clamping to `limits`. Returns the new angle and whether it was clamped.
fn integrate(angle: f32, delta: f32, limits: [f32; 2]) -> (f32, bool) {
    let raw = angle + delta;
    let clamped = util::maths::clamp(raw, limits[0], limits[1]);
    (clamped, clamped != raw)
}

#[cfg(test)]
mod test {
    use super::*;

    fn cmd(tilt_rate: f32, pan_rate: f32) -> InputData {
        InputData {
            cmd: VelocityCmd {
                angular_x: tilt_rate,
                angular_y: pan_rate,
                ..Default::default()
            },
            dt_s: 0.5,
        }
    }

    #[test]
    fn test_head_integrates_and_limits() {
        let mut head = HeadCtrl::default();
        head.init(HeadCtrlParams::default(), None).unwrap();

        let (out, report) = head.proc(&cmd(10.0, -20.0)).unwrap();
        assert_eq!(out.pan_angle_deg, Some(-10.0));
        assert_eq!(out.tilt_angle_deg, Some(5.0));
        assert!(!report.pan_limited && !report.tilt_limited);

        // Tilt limit is 45 deg
        let (out, report) = head.proc(&cmd(200.0, 0.0)).unwrap();
        assert_eq!(out.tilt_angle_deg, Some(45.0));
        assert_eq!(out.pan_angle_deg, Some(-10.0));
        assert!(report.tilt_limited);
        assert!(!report.pan_limited);

        // Zero rate holds
        let (out, _) = head.proc(&cmd(0.0, 0.0)).unwrap();
        assert_eq!(head.angles(), (-10.0, 45.0));
        assert_eq!(out.tilt_angle_deg, Some(45.0));
    }

    #[test]
    fn test_head_errors() {
        let mut head = HeadCtrl::default();
        let params = HeadCtrlParams {
            pan_limits_deg: [10.0, -10.0],
            ..Default::default()
        };
        assert!(matches!(
            head.init(params, None),
            Err(HeadCtrlError::InvalidLimits("pan", _, _))
        ));

        head.init(HeadCtrlParams::default(), None).unwrap();
        assert!(head.proc(&cmd(f32::NAN, 0.0)).is_err());
        assert_eq!(head.angles(), (0.0, 0.0));
    }
}
