//! Init state

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info};

use super::{GaitInput, GaitOutput, GaitState};
use crate::params::GaitParams;
use comms_if::joint::{JointKey, LIMBS};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Every coxa must be within this of the initial angle before leaving Init.
///
/// Units: degrees
pub const INIT_TOLERANCE_DEG: f32 = 1.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Drive every coxa to the initial angle.
#[derive(Debug, Clone, Copy)]
pub struct Init {
    params: GaitParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Init {
    pub fn new(params: GaitParams) -> Self {
        Self { params }
    }

    pub(super) fn on_enter(&mut self, output: &mut GaitOutput) {
        output.set_all_coxa(self.params.initial_coxa_angle_deg);
    }

    pub(super) fn update(&mut self, input: &GaitInput, output: &mut GaitOutput) -> GaitState {
        let target = self.params.initial_coxa_angle_deg;
        output.set_all_coxa(target);

        let mut ready = true;

        for limb in LIMBS.iter() {
            let key = JointKey::coxa(*limb);
            match input.angle(key) {
                Some(a) if (a - target).abs() <= INIT_TOLERANCE_DEG => (),
                Some(a) => {
                    debug!("{} at {:.1} deg, waiting for {:.1} deg", input.name(key), a, target);
                    ready = false;
                }
                None => {
                    debug!("No angle from {}", input.name(key));
                    ready = false;
                }
            }
        }

        if ready {
            info!("All coxas at the initial angle");
            GaitState::standing(self.params)
        } else {
            GaitState::Init(*self)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::robot::RobotState;
    use comms_if::joint::{LegJoint, Limb};

    fn input(coxa: Option<f32>) -> GaitInput {
        let mut input = GaitInput::default();
        for limb in LIMBS.iter() {
            input.actual.set(*limb, LegJoint::Coxa, coxa);
        }
        input
    }

    #[test]
    fn test_init_waits_for_coxas() {
        let mut state = GaitState::init(GaitParams::default());
        let mut output = GaitOutput::default();
        state.on_enter(&mut output);

        for limb in LIMBS.iter() {
            assert_eq!(output.target(JointKey::coxa(*limb)), Some(0.0));
        }

        // All within tolerance
        assert_eq!(state.update(&input(Some(0.9)), &mut output).name(), "Standing");

        // One missing
        let mut missing = input(Some(0.0));
        missing.actual.set(Limb::RightMiddle, LegJoint::Coxa, None);
        assert_eq!(state.update(&missing, &mut output).name(), "Init");

        // One too far
        let mut far = input(Some(-0.5));
        far.actual.set(Limb::LeftBack, LegJoint::Coxa, Some(1.2));
        assert_eq!(state.update(&far, &mut output).name(), "Init");

        assert_eq!(state.update(&input(None), &mut output).name(), "Init");
    }
}
