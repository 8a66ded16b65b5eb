//! Transition ordering of the robot state container under random update sequences.

use rand::{rngs::StdRng, Rng, SeedableRng};

use comms_if::joint::{LegJoint, LIMBS};
use gait_lib::{
    gait_ctrl::{GaitInput, GaitOutput, GaitState},
    params::GaitParams,
    robot::{Robot, RobotState},
};

const NUM_SEQUENCES: usize = 1000;
const SEQUENCE_LEN: usize = 50;

const NAMES: [&str; 4] = ["A", "B", "C", "D"];

/// Hook calls recorded by [`Recording`] states.
#[derive(Debug, Default)]
struct Log {
    events: Vec<Event>,

    /// Names of the states currently entered.
    live: Vec<&'static str>,

    max_live: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    Enter(&'static str),
    Exit(&'static str),
}

/// A state which jumps to whichever state its input names.
struct Recording {
    name: &'static str,
}

impl RobotState for Recording {
    type Input = usize;
    type Output = Log;

    fn name(&self) -> &'static str {
        self.name
    }

    fn on_enter(&mut self, log: &mut Log) {
        log.events.push(Event::Enter(self.name));
        log.live.push(self.name);
        log.max_live = log.max_live.max(log.live.len());
    }

    fn on_exit(&mut self, log: &mut Log) {
        log.events.push(Event::Exit(self.name));
        let name = self.name;
        log.live.retain(|n| *n != name);
    }

    fn update(&mut self, input: &usize, _log: &mut Log) -> Self {
        Recording {
            name: NAMES[*input],
        }
    }
}

#[test]
fn test_exit_precedes_enter() {
    let mut rng = StdRng::seed_from_u64(0x6865_7861);

    for _ in 0..NUM_SEQUENCES {
        let mut log = Log::default();
        let mut robot = Robot::new(Recording { name: NAMES[0] }, &mut log);
        let mut expected_transitions = 0;
        let mut current = NAMES[0];

        for _ in 0..SEQUENCE_LEN {
            let next = rng.gen_range(0..NAMES.len());
            let transitioned = robot.update(&next, &mut log);

            assert_eq!(transitioned, NAMES[next] != current);
            if transitioned {
                expected_transitions += 1;
            }
            current = NAMES[next];
            assert_eq!(robot.state_name(), current);
        }

        // Initial enter, then an exit/enter pair per transition
        assert_eq!(log.events.len(), 1 + 2 * expected_transitions);
        assert_eq!(log.events[0], Event::Enter(NAMES[0]));

        for pair in log.events[1..].chunks(2) {
            match (pair[0], pair[1]) {
                (Event::Exit(old), Event::Enter(new)) => assert_ne!(old, new),
                p => panic!("Expected exit then enter, found {:?}", p),
            }
        }

        // Every enter is of the state the previous exit was not
        let mut entered = NAMES[0];
        for pair in log.events[1..].chunks(2) {
            assert_eq!(pair[0], Event::Exit(entered));
            if let Event::Enter(n) = pair[1] {
                entered = n;
            }
        }

        assert_eq!(log.max_live, 1);
        assert_eq!(log.live, vec![current]);
    }
}

#[test]
fn test_gait_random_commands() {
    let mut rng = StdRng::seed_from_u64(42);
    let params = GaitParams::default();

    for _ in 0..100 {
        let mut output = GaitOutput::default();
        let mut robot = Robot::new(GaitState::init(params), &mut output);

        for _ in 0..SEQUENCE_LEN {
            let mut input = GaitInput::default();
            input.dt_s = 0.05;
            input.cmd.linear_x = rng.gen_range(-0.3..0.3);
            input.cmd.angular_z = rng.gen_range(-1.0..1.0);

            // Occasionally drop a coxa sample
            let dropped = rng.gen_range(0..10) == 0;
            for (i, limb) in LIMBS.iter().enumerate() {
                let angle = if dropped && i == 0 {
                    None
                } else {
                    Some(rng.gen_range(-0.5..0.5))
                };
                input.actual.set(*limb, LegJoint::Coxa, angle);
            }

            let before = robot.state_name();
            let before_target = output.target;
            robot.update(&input, &mut output);

            if dropped {
                assert_eq!(robot.state_name(), before);
                if before != "Init" {
                    assert_eq!(output.target, before_target);
                }
            }

            // Coxa targets stay within the swing
            for limb in LIMBS.iter() {
                let target = output.target.get(*limb, LegJoint::Coxa).unwrap();
                assert!(target.abs() <= params.swing_amplitude_deg + 1e-3);
            }
        }
    }
}
