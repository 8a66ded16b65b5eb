//! Walking state

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use super::{set_tripod_swing, wrap_phase, GaitInput, GaitOutput, GaitState};
use crate::params::GaitParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Walk forwards or backwards with an alternating tripod gait.
///
/// The gait phase advances in proportion to the commanded speed, so walking backwards runs the
/// swing in reverse.
#[derive(Debug, Clone, Copy)]
pub struct Walking {
    params: GaitParams,

    /// Units: radians
    phase_rad: f32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Walking {
    pub fn new(params: GaitParams) -> Self {
        Self {
            params,
            phase_rad: 0.0,
        }
    }

    pub fn phase_rad(&self) -> f32 {
        self.phase_rad
    }

    pub(super) fn on_enter(&mut self, output: &mut GaitOutput) {
        self.phase_rad = 0.0;
        set_tripod_swing(output, &self.params, self.phase_rad, true);
    }

    pub(super) fn update(&mut self, input: &GaitInput, output: &mut GaitOutput) -> GaitState {
        if input.coxa_angles().is_none() {
            return GaitState::Walking(*self);
        }

        let speed = util::maths::deadband(input.cmd.linear_x, self.params.linear_deadband_m_s);

        if speed == 0.0 {
            return GaitState::standing(self.params);
        }

        self.phase_rad = wrap_phase(
            self.phase_rad + self.params.walk_phase_gain_rad_m * speed * input.dt_s,
        );
        set_tripod_swing(output, &self.params, self.phase_rad, true);

        GaitState::Walking(*self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::joint::{JointKey, LegJoint, Limb, LIMBS};

    fn input(linear_x: f32) -> GaitInput {
        let mut input = GaitInput::default();
        for limb in LIMBS.iter() {
            input.actual.set(*limb, LegJoint::Coxa, Some(0.0));
        }
        input.cmd.linear_x = linear_x;
        input.dt_s = 0.05;
        input
    }

    #[test]
    fn test_walking() {
        let mut walking = Walking::new(GaitParams::default());
        let mut output = GaitOutput::default();
        walking.on_enter(&mut output);

        assert!(matches!(
            walking.update(&input(0.2), &mut output),
            GaitState::Walking(_)
        ));
        // 20 rad/m * 0.2 m/s * 0.05 s
        assert!((walking.phase_rad() - 0.2).abs() < 1e-5);

        // Left and right of the same tripod swing opposite ways
        let lf = output.target(JointKey::coxa(Limb::LeftFront)).unwrap();
        let rm = output.target(JointKey::coxa(Limb::RightMiddle)).unwrap();
        assert!(lf > 0.0);
        assert!((lf + rm).abs() < 1e-4);

        // Turning commands are ignored while walking
        let mut turn = input(0.2);
        turn.cmd.angular_z = 1.0;
        assert!(matches!(
            walking.update(&turn, &mut output),
            GaitState::Walking(_)
        ));

        assert!(matches!(
            walking.update(&input(0.01), &mut output),
            GaitState::Standing(_)
        ));
    }
}
