//! # Robot state container
//!
//! [`Robot`] owns the single live state of a state machine and swaps it when the state's update
//! names a different state. The old state's exit hook always runs before the new state's enter
//! hook.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A state which can be held by a [`Robot`].
pub trait RobotState: Sized {
    type Input;
    type Output;

    /// Name of the state, states with the same name are the same state.
    fn name(&self) -> &'static str;

    /// Called when the state becomes live.
    fn on_enter(&mut self, output: &mut Self::Output);

    /// Called when the state stops being live.
    fn on_exit(&mut self, output: &mut Self::Output);

    /// Run one cycle, returning the state to be in next.
    fn update(&mut self, input: &Self::Input, output: &mut Self::Output) -> Self;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Robot<S: RobotState> {
    state: S,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<S: RobotState> Robot<S> {
    /// Create a new robot, entering the initial state.
    pub fn new(mut initial: S, output: &mut S::Output) -> Self {
        info!("Entering state {}", initial.name());
        initial.on_enter(output);
        Self { state: initial }
    }

    /// Update the live state, transitioning if it names a different state.
    ///
    /// Returns true if a transition happened.
    pub fn update(&mut self, input: &S::Input, output: &mut S::Output) -> bool {
        let next = self.state.update(input, output);

        if next.name() == self.state.name() {
            return false;
        }

        info!("State {} -> {}", self.state.name(), next.name());

        self.state.on_exit(output);
        self.state = next;
        self.state.on_enter(output);

        true
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }
}
