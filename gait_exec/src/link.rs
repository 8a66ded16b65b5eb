//! # I/O and teleoperation links
//!
//! Receives the actual leg angles from `io_exec` and the velocity commands from the
//! teleoperation source, and publishes the target joint angles back to `io_exec`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use std::time::{Duration, Instant};

use comms_if::{
    msg::{HeadAngle, LegAngle, VelocityCmd, TOPIC_CMD_VEL, TOPIC_HEAD_ANGLE, TOPIC_LEG_ANGLE},
    net::{zmq, NetParams, PubSubError, Publisher, RawMessage, Subscriber},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct IoLink {
    actual_sub: Subscriber,

    cmd_sub: Subscriber,

    target_pub: Publisher,
}

/// Latest value of every inbound stream.
///
/// Streams are last value wins, a field is only replaced when a newer message arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inbound {
    /// Actual leg angles and when they were received.
    pub leg: Option<(LegAngle, Instant)>,
    pub cmd: VelocityCmd,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Could not create the target angle publisher: {0}")]
    PublisherError(PubSubError),

    #[error("Could not create the {0} subscriber: {1}")]
    SubscriberError(&'static str, PubSubError),

    #[error("Could not publish the target angles: {0}")]
    PublishError(PubSubError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl IoLink {
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, LinkError> {
        let target_pub = Publisher::new(ctx, &params.gait_target_endpoint)
            .map_err(LinkError::PublisherError)?;

        let actual_sub = Subscriber::new(ctx, &params.io_actual_endpoint, &[TOPIC_LEG_ANGLE])
            .map_err(|e| LinkError::SubscriberError("actual angle", e))?;

        let cmd_sub = Subscriber::new(ctx, &params.cmd_vel_endpoint, &[TOPIC_CMD_VEL])
            .map_err(|e| LinkError::SubscriberError("velocity command", e))?;

        Ok(Self {
            actual_sub,
            cmd_sub,
            target_pub,
        })
    }

    /// Drain both subscribers into `inbound`, stamping messages with `now`.
    pub fn recv(&self, inbound: &mut Inbound, now: Instant) {
        for raw in drain(&self.actual_sub) {
            inbound.apply(&raw, now);
        }
        for raw in drain(&self.cmd_sub) {
            inbound.apply(&raw, now);
        }
    }

    /// Publish the target joint angles.
    pub fn publish_target(&self, leg: &LegAngle, head: &HeadAngle) -> Result<(), LinkError> {
        self.target_pub
            .publish(TOPIC_LEG_ANGLE, leg)
            .and_then(|_| self.target_pub.publish(TOPIC_HEAD_ANGLE, head))
            .map_err(LinkError::PublishError)
    }
}

impl Inbound {
    /// Decode a message received at `now` and store it, logging and dropping malformed ones.
    pub fn apply(&mut self, raw: &RawMessage, now: Instant) {
        let result = match raw.topic.as_str() {
            TOPIC_LEG_ANGLE => raw.decode().map(|m| self.leg = Some((m, now))),
            TOPIC_CMD_VEL => raw.decode().map(|m| self.cmd = m),
            t => {
                warn!("Unexpected topic {:?}", t);
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("{}", e);
        }
    }

    /// The actual leg angles, or all absent if none have arrived within `timeout` of `now`.
    pub fn actual_leg(&self, now: Instant, timeout: Duration) -> LegAngle {
        match self.leg {
            Some((leg, received)) if now.saturating_duration_since(received) <= timeout => leg,
            _ => LegAngle::default(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn drain(sub: &Subscriber) -> Vec<RawMessage> {
    let mut msgs = Vec::new();

    loop {
        match sub.try_recv() {
            Ok(Some(r)) => msgs.push(r),
            Ok(None) => break,
            Err(e) => {
                warn!("Error receiving: {}", e);
                break;
            }
        }
    }

    msgs
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        gait_ctrl::{GaitInput, GaitOutput, GaitState},
        params::GaitParams,
        robot::RobotState,
    };
    use comms_if::joint::{LegJoint, LIMBS};

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn raw(topic: &str, body: &str) -> RawMessage {
        RawMessage {
            topic: topic.into(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_inbound_last_value_wins() {
        let mut inbound = Inbound::default();
        let now = Instant::now();

        inbound.apply(
            &raw(
                TOPIC_CMD_VEL,
                r#"{"linear_x":0.1,"linear_y":0.0,"angular_x":0.0,"angular_y":0.0,"angular_z":0.0}"#,
            ),
            now,
        );
        inbound.apply(
            &raw(
                TOPIC_CMD_VEL,
                r#"{"linear_x":0.3,"linear_y":0.0,"angular_x":0.0,"angular_y":0.0,"angular_z":-1.0}"#,
            ),
            now,
        );
        assert_eq!(inbound.cmd.linear_x, 0.3);
        assert_eq!(inbound.cmd.angular_z, -1.0);

        // Malformed messages don't clear the last value
        inbound.apply(&raw(TOPIC_CMD_VEL, "{}"), now);
        assert_eq!(inbound.cmd.linear_x, 0.3);

        // Actual head angles aren't consumed
        inbound.apply(
            &raw(
                TOPIC_HEAD_ANGLE,
                r#"{"pan_angle_deg":1.0,"tilt_angle_deg":null}"#,
            ),
            now,
        );
        assert!(inbound.leg.is_none());
    }

    fn leg_msg(coxa_deg: f32) -> RawMessage {
        let mut leg = LegAngle::default();
        for limb in LIMBS.iter() {
            leg.set(*limb, LegJoint::Coxa, Some(coxa_deg));
        }
        RawMessage {
            topic: TOPIC_LEG_ANGLE.into(),
            body: serde_json::to_vec(&leg).unwrap(),
        }
    }

    #[test]
    fn test_actual_leg_expires() {
        let t0 = Instant::now();
        let mut inbound = Inbound::default();

        assert_eq!(inbound.actual_leg(t0, TIMEOUT), LegAngle::default());

        inbound.apply(&leg_msg(3.0), t0);
        let fresh = inbound.actual_leg(t0 + TIMEOUT, TIMEOUT);
        assert_eq!(fresh.get(LIMBS[0], LegJoint::Coxa), Some(3.0));

        let stale = inbound.actual_leg(t0 + TIMEOUT + Duration::from_millis(1), TIMEOUT);
        assert_eq!(stale, LegAngle::default());
    }

    #[test]
    fn test_stale_actual_freezes_walking() {
        let t0 = Instant::now();
        let mut inbound = Inbound::default();
        inbound.apply(&leg_msg(0.0), t0);

        let params = GaitParams::default();
        let mut state = GaitState::walking(params);
        let mut output = GaitOutput::default();
        state.on_enter(&mut output);

        let input_at = |inbound: &Inbound, now: Instant| GaitInput {
            actual: inbound.actual_leg(now, TIMEOUT),
            cmd: VelocityCmd {
                linear_x: 0.2,
                ..Default::default()
            },
            dt_s: 0.05,
        };

        // Fresh feedback advances the phase
        let next = state.update(&input_at(&inbound, t0), &mut output);
        assert_eq!(next.name(), "Walking");
        let phase = match next {
            GaitState::Walking(w) => w.phase_rad(),
            s => panic!("Expected Walking, found {:?}", s),
        };
        assert!(phase > 0.0);
        state = next;
        let target = output.target;

        // No actual angles since, so the gait holds
        let later = t0 + Duration::from_secs(2);
        let next = state.update(&input_at(&inbound, later), &mut output);
        match next {
            GaitState::Walking(w) => assert_eq!(w.phase_rad(), phase),
            s => panic!("Expected Walking, found {:?}", s),
        }
        assert_eq!(output.target, target);
    }
}
