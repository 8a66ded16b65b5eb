//! # Gait control
//!
//! The gait state machine decides the coxa targets of every leg from the velocity command and the
//! actual joint angles. The states are:
//!
//! - `Init` - Drive every coxa to the initial angle and wait for them all to arrive.
//! - `Standing` - Hold every coxa at the initial angle.
//! - `TurningLeft`/`TurningRight` - Swing the coxas in a tripod pattern to turn on the spot.
//! - `Walking` - Swing the coxas in a tripod pattern to walk forwards or backwards.
//!
//! States are held by a [`crate::robot::Robot`], which performs the transitions.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod init;
mod standing;
mod turning;
mod walking;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use std::f32::consts::PI;

use crate::{params::GaitParams, robot::RobotState};
use comms_if::{
    joint::{JointKey, LegJoint, Limb, LIMBS, NUM_LIMBS},
    msg::{LegAngle, VelocityCmd},
};

pub use init::{Init, INIT_TOLERANCE_DEG};
pub use standing::Standing;
pub use turning::{TurnDirection, Turning};
pub use walking::Walking;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Input to one gait update.
#[derive(Debug, Clone, Default)]
pub struct GaitInput {
    /// Actual angle of every leg joint.
    pub actual: LegAngle,

    /// Latest velocity command.
    pub cmd: VelocityCmd,

    /// Time since the previous update.
    ///
    /// Units: seconds
    pub dt_s: f32,
}

/// Output of the gait state machine, held between updates.
#[derive(Debug, Clone, Default)]
pub struct GaitOutput {
    /// Target angle of every leg joint. Joints the gait doesn't control are `None`.
    pub target: LegAngle,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum GaitState {
    Init(Init),
    Standing(Standing),
    TurningLeft(Turning),
    TurningRight(Turning),
    Walking(Walking),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GaitInput {
    /// Actual angle of a leg joint. Head joints are not part of the gait input.
    pub fn angle(&self, key: JointKey) -> Option<f32> {
        match key {
            JointKey::Leg(limb, joint) => self.actual.get(limb, joint),
            JointKey::Head(_) => None,
        }
    }

    /// Human readable name of a joint.
    pub fn name(&self, key: JointKey) -> String {
        key.name()
    }

    /// Actual angle of every coxa, or `None` if any is absent.
    ///
    /// Absent angles are logged by joint name.
    pub fn coxa_angles(&self) -> Option<[f32; NUM_LIMBS]> {
        let mut angles = [0.0; NUM_LIMBS];
        let mut complete = true;

        for limb in LIMBS.iter() {
            let key = JointKey::coxa(*limb);
            match self.angle(key) {
                Some(a) => angles[limb.index()] = a,
                None => {
                    debug!("No angle from {}", self.name(key));
                    complete = false;
                }
            }
        }

        if complete {
            Some(angles)
        } else {
            None
        }
    }
}

impl GaitOutput {
    pub fn set_target(&mut self, key: JointKey, angle_deg: f32) {
        if let JointKey::Leg(limb, joint) = key {
            self.target.set(limb, joint, Some(angle_deg));
        }
    }

    pub fn target(&self, key: JointKey) -> Option<f32> {
        match key {
            JointKey::Leg(limb, joint) => self.target.get(limb, joint),
            JointKey::Head(_) => None,
        }
    }

    /// Set every coxa target to the same angle.
    pub fn set_all_coxa(&mut self, angle_deg: f32) {
        for limb in LIMBS.iter() {
            self.set_target(JointKey::coxa(*limb), angle_deg);
        }
    }
}

impl GaitState {
    /// The initial state.
    pub fn init(params: GaitParams) -> Self {
        GaitState::Init(Init::new(params))
    }

    pub fn standing(params: GaitParams) -> Self {
        GaitState::Standing(Standing::new(params))
    }

    pub fn turning(params: GaitParams, direction: TurnDirection) -> Self {
        let turning = Turning::new(params, direction);
        match direction {
            TurnDirection::Left => GaitState::TurningLeft(turning),
            TurnDirection::Right => GaitState::TurningRight(turning),
        }
    }

    pub fn walking(params: GaitParams) -> Self {
        GaitState::Walking(Walking::new(params))
    }
}

impl RobotState for GaitState {
    type Input = GaitInput;
    type Output = GaitOutput;

    fn name(&self) -> &'static str {
        match self {
            GaitState::Init(_) => "Init",
            GaitState::Standing(_) => "Standing",
            GaitState::TurningLeft(_) => "TurningLeft",
            GaitState::TurningRight(_) => "TurningRight",
            GaitState::Walking(_) => "Walking",
        }
    }

    fn on_enter(&mut self, output: &mut GaitOutput) {
        match self {
            GaitState::Init(s) => s.on_enter(output),
            GaitState::Standing(s) => s.on_enter(output),
            GaitState::TurningLeft(s) | GaitState::TurningRight(s) => s.on_enter(output),
            GaitState::Walking(s) => s.on_enter(output),
        }
    }

    fn on_exit(&mut self, _output: &mut GaitOutput) {
        debug!("Leaving gait state {}", self.name());
    }

    fn update(&mut self, input: &GaitInput, output: &mut GaitOutput) -> GaitState {
        match self {
            GaitState::Init(s) => s.update(input, output),
            GaitState::Standing(s) => s.update(input, output),
            GaitState::TurningLeft(s) | GaitState::TurningRight(s) => s.update(input, output),
            GaitState::Walking(s) => s.update(input, output),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Set the coxa targets of a tripod swing at the given phase.
///
/// The two tripods are half a cycle apart. With `mirror` set the right side swings opposite to
/// the left, which walks the body forwards, otherwise every leg swings the same way, which turns
/// it.
pub(crate) fn set_tripod_swing(
    output: &mut GaitOutput,
    params: &GaitParams,
    phase_rad: f32,
    mirror: bool,
) {
    for limb in LIMBS.iter() {
        let tripod_phase = phase_rad + PI * limb.tripod() as f32;
        let side = if mirror && is_right(*limb) { -1.0 } else { 1.0 };

        output.set_target(
            JointKey::leg(*limb, LegJoint::Coxa),
            params.initial_coxa_angle_deg + side * params.swing_amplitude_deg * tripod_phase.sin(),
        );
    }
}

/// Wrap a phase into [0, 2pi).
pub(crate) fn wrap_phase(phase_rad: f32) -> f32 {
    phase_rad.rem_euclid(2.0 * PI)
}

fn is_right(limb: Limb) -> bool {
    matches!(limb, Limb::RightBack | Limb::RightMiddle | Limb::RightFront)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tripod_swing() {
        let params = GaitParams::default();
        let mut output = GaitOutput::default();

        set_tripod_swing(&mut output, &params, PI / 2.0, true);

        let lf = output.target(JointKey::coxa(Limb::LeftFront)).unwrap();
        let lm = output.target(JointKey::coxa(Limb::LeftMiddle)).unwrap();
        let rm = output.target(JointKey::coxa(Limb::RightMiddle)).unwrap();
        let rf = output.target(JointKey::coxa(Limb::RightFront)).unwrap();

        assert!((lf - 15.0).abs() < 1e-4);
        assert!((lm + 15.0).abs() < 1e-4);
        // Right middle is in the same tripod as left front but mirrored
        assert!((rm + 15.0).abs() < 1e-4);
        assert!((rf - 15.0).abs() < 1e-4);

        set_tripod_swing(&mut output, &params, PI / 2.0, false);
        let rm = output.target(JointKey::coxa(Limb::RightMiddle)).unwrap();
        assert!((rm - 15.0).abs() < 1e-4);

        // Only coxas are driven
        assert_eq!(
            output.target(JointKey::leg(Limb::LeftFront, LegJoint::Femur)),
            None
        );
    }

    #[test]
    fn test_wrap_phase() {
        assert!((wrap_phase(2.0 * PI + 1.0) - 1.0).abs() < 1e-5);
        assert!((wrap_phase(-1.0) - (2.0 * PI - 1.0)).abs() < 1e-5);
    }
}
