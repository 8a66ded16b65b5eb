//! # Gait link
//!
//! Exchange of joint angles with `gait_exec`: actual angles are published, target angles are
//! received.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;

use comms_if::{
    msg::{HeadAngle, LegAngle, TOPIC_HEAD_ANGLE, TOPIC_LEG_ANGLE},
    net::{zmq, NetParams, PubSubError, Publisher, Subscriber},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct GaitLink {
    actual_pub: Publisher,

    target_sub: Subscriber,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A target message received from the gait executable.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetMsg {
    Leg(LegAngle),
    Head(HeadAngle),
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Could not create the actual angle publisher: {0}")]
    PublisherError(PubSubError),

    #[error("Could not create the target angle subscriber: {0}")]
    SubscriberError(PubSubError),

    #[error("Could not publish the actual angles: {0}")]
    PublishError(PubSubError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GaitLink {
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, LinkError> {
        let actual_pub = Publisher::new(ctx, &params.io_actual_endpoint)
            .map_err(LinkError::PublisherError)?;

        let target_sub = Subscriber::new(
            ctx,
            &params.gait_target_endpoint,
            &[TOPIC_LEG_ANGLE, TOPIC_HEAD_ANGLE],
        )
        .map_err(LinkError::SubscriberError)?;

        Ok(Self {
            actual_pub,
            target_sub,
        })
    }

    /// Receive every pending target message, oldest first.
    ///
    /// Malformed messages are logged and dropped.
    pub fn recv_targets(&self) -> Vec<TargetMsg> {
        let mut msgs = Vec::new();

        loop {
            let raw = match self.target_sub.try_recv() {
                Ok(Some(r)) => r,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error receiving target angles: {}", e);
                    break;
                }
            };

            let msg = match raw.topic.as_str() {
                TOPIC_LEG_ANGLE => raw.decode().map(TargetMsg::Leg),
                TOPIC_HEAD_ANGLE => raw.decode().map(TargetMsg::Head),
                t => {
                    warn!("Unexpected topic {:?}", t);
                    continue;
                }
            };

            match msg {
                Ok(m) => msgs.push(m),
                Err(e) => warn!("{}", e),
            }
        }

        msgs
    }

    /// Publish the actual joint angles.
    pub fn publish_actual(&self, leg: &LegAngle, head: &HeadAngle) -> Result<(), LinkError> {
        self.actual_pub
            .publish(TOPIC_LEG_ANGLE, leg)
            .and_then(|_| self.actual_pub.publish(TOPIC_HEAD_ANGLE, head))
            .map_err(LinkError::PublishError)
    }
}
