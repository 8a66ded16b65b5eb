//! Turning states

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use super::{set_tripod_swing, wrap_phase, GaitInput, GaitOutput, GaitState};
use crate::params::GaitParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Turn on the spot by swinging every coxa the same way, tripods half a cycle apart.
#[derive(Debug, Clone, Copy)]
pub struct Turning {
    params: GaitParams,

    direction: TurnDirection,

    /// Units: radians
    phase_rad: f32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TurnDirection {
    /// Anticlockwise seen from above, positive `angular_z`
    Left,

    /// Clockwise seen from above, negative `angular_z`
    Right,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TurnDirection {
    fn sign(self) -> f32 {
        match self {
            TurnDirection::Left => 1.0,
            TurnDirection::Right => -1.0,
        }
    }
}

impl Turning {
    pub fn new(params: GaitParams, direction: TurnDirection) -> Self {
        Self {
            params,
            direction,
            phase_rad: 0.0,
        }
    }

    pub fn direction(&self) -> TurnDirection {
        self.direction
    }

    pub fn phase_rad(&self) -> f32 {
        self.phase_rad
    }

    pub(super) fn on_enter(&mut self, output: &mut GaitOutput) {
        self.phase_rad = 0.0;
        set_tripod_swing(output, &self.params, self.phase_rad, false);
    }

    pub(super) fn update(&mut self, input: &GaitInput, output: &mut GaitOutput) -> GaitState {
        if input.coxa_angles().is_none() {
            return self.as_state();
        }

        let turn = util::maths::deadband(input.cmd.angular_z, self.params.angular_deadband_rad_s);

        if turn == 0.0 {
            return GaitState::standing(self.params);
        }
        if turn.signum() != self.direction.sign() {
            let reverse = match self.direction {
                TurnDirection::Left => TurnDirection::Right,
                TurnDirection::Right => TurnDirection::Left,
            };
            return GaitState::turning(self.params, reverse);
        }

        self.phase_rad = wrap_phase(
            self.phase_rad
                + self.direction.sign() * self.params.turn_phase_gain * turn.abs() * input.dt_s,
        );
        set_tripod_swing(output, &self.params, self.phase_rad, false);

        self.as_state()
    }

    fn as_state(&self) -> GaitState {
        match self.direction {
            TurnDirection::Left => GaitState::TurningLeft(*self),
            TurnDirection::Right => GaitState::TurningRight(*self),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::joint::{JointKey, LegJoint, Limb, LIMBS};

    fn input(angular_z: f32) -> GaitInput {
        let mut input = GaitInput::default();
        for limb in LIMBS.iter() {
            input.actual.set(*limb, LegJoint::Coxa, Some(0.0));
        }
        input.cmd.angular_z = angular_z;
        input.dt_s = 0.05;
        input
    }

    #[test]
    fn test_turning_advances_phase() {
        let mut turning = Turning::new(GaitParams::default(), TurnDirection::Left);
        let mut output = GaitOutput::default();
        turning.on_enter(&mut output);

        assert!(matches!(
            turning.update(&input(1.0), &mut output),
            GaitState::TurningLeft(_)
        ));
        // 6 rad/rad * 1 rad/s * 0.05 s
        assert!((turning.phase_rad() - 0.3).abs() < 1e-5);

        // Tripods swing opposite ways
        let lf = output.target(JointKey::coxa(Limb::LeftFront)).unwrap();
        let rf = output.target(JointKey::coxa(Limb::RightFront)).unwrap();
        assert!(lf > 0.0);
        assert!((lf + rf).abs() < 1e-4);

        let mut right = Turning::new(GaitParams::default(), TurnDirection::Right);
        right.update(&input(-1.0), &mut output);
        // Phase runs backwards when turning right
        assert!((right.phase_rad() - (2.0 * std::f32::consts::PI - 0.3)).abs() < 1e-4);
    }

    #[test]
    fn test_turning_exits() {
        let mut turning = Turning::new(GaitParams::default(), TurnDirection::Right);
        let mut output = GaitOutput::default();

        assert!(matches!(
            turning.update(&input(0.0), &mut output),
            GaitState::Standing(_)
        ));
        assert!(matches!(
            turning.update(&input(0.5), &mut output),
            GaitState::TurningLeft(_)
        ));

        // Hold without coxa angles
        let before = turning.phase_rad();
        let mut blind = input(-1.0);
        blind.actual = Default::default();
        assert!(matches!(
            turning.update(&blind, &mut output),
            GaitState::TurningRight(_)
        ));
        assert_eq!(turning.phase_rad(), before);
    }
}
