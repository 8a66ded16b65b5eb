//! Standing state

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use super::{GaitInput, GaitOutput, GaitState, TurnDirection};
use crate::params::GaitParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Hold every coxa at the initial angle until a velocity is commanded.
#[derive(Debug, Clone, Copy)]
pub struct Standing {
    params: GaitParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Standing {
    pub fn new(params: GaitParams) -> Self {
        Self { params }
    }

    pub(super) fn on_enter(&mut self, output: &mut GaitOutput) {
        output.set_all_coxa(self.params.initial_coxa_angle_deg);
    }

    pub(super) fn update(&mut self, input: &GaitInput, output: &mut GaitOutput) -> GaitState {
        if input.coxa_angles().is_none() {
            return GaitState::Standing(*self);
        }

        output.set_all_coxa(self.params.initial_coxa_angle_deg);

        let turn = util::maths::deadband(input.cmd.angular_z, self.params.angular_deadband_rad_s);
        let walk = util::maths::deadband(input.cmd.linear_x, self.params.linear_deadband_m_s);

        if turn > 0.0 {
            GaitState::turning(self.params, TurnDirection::Left)
        } else if turn < 0.0 {
            GaitState::turning(self.params, TurnDirection::Right)
        } else if walk != 0.0 {
            GaitState::walking(self.params)
        } else {
            GaitState::Standing(*self)
        }
    }
}
