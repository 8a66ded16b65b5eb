//! # Publish/subscribe sockets
//!
//! Messages are sent as two-part zmq messages: the topic string then the JSON body. Subscribers
//! never block, [`Subscriber::try_recv`] returns `Ok(None)` once the inbound queue is empty so the
//! caller can drain it at the start of every cycle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{de::DeserializeOwned, Serialize};

use super::{zmq, MonitoredSocket, MonitoredSocketError, SocketOptions};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Binds a PUB socket and sends JSON messages on topics.
pub struct Publisher {
    socket: MonitoredSocket,
}

/// Connects a SUB socket to a [`Publisher`] and receives the topics it subscribed to.
pub struct Subscriber {
    socket: MonitoredSocket,
}

/// A message received by a [`Subscriber`], still to be decoded.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: String,
    pub body: Vec<u8>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("Could not subscribe to {0}: {1}")]
    SubscribeError(String, zmq::Error),

    #[error("Could not send the message: {0}")]
    SendError(zmq::Error),

    #[error("Could not receive a message: {0}")]
    RecvError(zmq::Error),

    #[error("Expected a two part message, found {0} parts")]
    MalformedMessage(usize),

    #[error("Could not serialize the message: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize the {0} message: {1}")]
    DeserializationError(String, serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Publisher {
    /// Create a new publisher bound to the given endpoint.
    ///
    /// This function will not block waiting for subscribers.
    pub fn new(ctx: &zmq::Context, endpoint: &str) -> Result<Self, PubSubError> {
        let socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            linger: 1,
            send_timeout: 10,
            send_hwm: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::PUB, socket_options, endpoint)?;

        Ok(Self { socket })
    }

    /// Serialize and send a message on the given topic.
    pub fn publish<T: Serialize>(&self, topic: &str, msg: &T) -> Result<(), PubSubError> {
        let body = serde_json::to_vec(msg).map_err(PubSubError::SerializationError)?;

        self.socket
            .send_multipart(vec![topic.as_bytes(), body.as_slice()], 0)
            .map_err(PubSubError::SendError)
    }

    /// True if at least one subscriber has connected.
    pub fn connected(&self) -> bool {
        self.socket.connected()
    }
}

impl Subscriber {
    /// Create a new subscriber connected to the given endpoint and subscribed to `topics`.
    pub fn new(ctx: &zmq::Context, endpoint: &str, topics: &[&str]) -> Result<Self, PubSubError> {
        let socket_options = SocketOptions {
            bind: false,
            block_on_first_connect: false,
            linger: 1,
            connect_timeout: 1000,
            recv_hwm: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::SUB, socket_options, endpoint)?;

        for topic in topics {
            socket
                .set_subscribe(topic.as_bytes())
                .map_err(|e| PubSubError::SubscribeError(topic.to_string(), e))?;
        }

        Ok(Self { socket })
    }

    /// Receive the next pending message, or `None` if the queue is empty.
    pub fn try_recv(&self) -> Result<Option<RawMessage>, PubSubError> {
        let parts = match self.socket.recv_multipart(zmq::DONTWAIT) {
            Ok(p) => p,
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(e) => return Err(PubSubError::RecvError(e)),
        };

        if parts.len() != 2 {
            return Err(PubSubError::MalformedMessage(parts.len()));
        }

        let mut parts = parts.into_iter();
        let topic = parts.next().unwrap_or_default();
        let body = parts.next().unwrap_or_default();

        Ok(Some(RawMessage {
            topic: String::from_utf8_lossy(&topic).into_owned(),
            body,
        }))
    }

    /// True if the subscriber is connected to its publisher.
    pub fn connected(&self) -> bool {
        self.socket.connected()
    }
}

impl RawMessage {
    /// Decode the body of the message.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PubSubError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| PubSubError::DeserializationError(self.topic.clone(), e))
    }
}
