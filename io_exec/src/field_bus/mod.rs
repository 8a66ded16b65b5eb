//! # Field bus
//!
//! The leg nodes and the hydraulic pump controller sit on a CAN bus speaking Cyphal. Each node
//! broadcasts a heartbeat carrying its health and operating mode, leg nodes also publish their
//! femur and tibia angle sensor readings as scalar messages.
//!
//! Only single-frame transfers are used so the codec in [`cyphal`] is a direct mapping between CAN
//! frames and [`FieldBusMsg`]s.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod cyphal;

#[cfg(target_os = "linux")]
mod can;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

#[cfg(target_os = "linux")]
pub use can::CyphalCan;
pub use cyphal::{CodecError, CyphalCodec};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Id of a node on the field bus.
pub type NodeId = u8;

/// Id of a Cyphal message subject.
pub type SubjectId = u16;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A field bus connecting the remote nodes.
pub trait FieldBus {
    /// Return every message received since the last poll. Never blocks.
    fn poll(&mut self) -> Result<Vec<FieldBusMsg>, FieldBusError>;

    /// Publish the hydraulic pump speed setpoint.
    fn publish_pump_rpm(&mut self, rpm: u16) -> Result<(), FieldBusError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Node health as reported in the heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Health {
    Nominal,
    Advisory,
    Caution,
    Warning,
}

/// Node operating mode as reported in the heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Operational,
    Initialization,
    Maintenance,
    SoftwareUpdate,
}

/// A message received from the field bus.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldBusMsg {
    Heartbeat {
        node_id: NodeId,
        uptime_s: u32,
        health: Health,
        mode: Mode,
    },
    Real32 {
        node_id: NodeId,
        subject_id: SubjectId,
        value: f32,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum FieldBusError {
    #[error("Could not open the CAN interface {0}: {1}")]
    OpenError(String, std::io::Error),

    #[error("CAN IO error: {0}")]
    IoError(std::io::Error),

    #[error("Could not build a CAN frame with id {0:#010x}")]
    FrameBuildError(u32),

    #[error("Codec error: {0}")]
    CodecError(#[from] CodecError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Health {
    pub fn from_raw(raw: u8) -> Self {
        match raw & 0x03 {
            0 => Health::Nominal,
            1 => Health::Advisory,
            2 => Health::Caution,
            _ => Health::Warning,
        }
    }

    pub fn to_raw(self) -> u8 {
        self as u8
    }
}

impl Mode {
    /// Decode the 3 bit mode field. Values above 3 are reserved and read as `SoftwareUpdate`.
    pub fn from_raw(raw: u8) -> Self {
        match raw & 0x07 {
            0 => Mode::Operational,
            1 => Mode::Initialization,
            2 => Mode::Maintenance,
            _ => Mode::SoftwareUpdate,
        }
    }

    pub fn to_raw(self) -> u8 {
        self as u8
    }
}

impl FieldBusMsg {
    /// Id of the node which sent the message.
    pub fn node_id(&self) -> NodeId {
        match self {
            FieldBusMsg::Heartbeat { node_id, .. } => *node_id,
            FieldBusMsg::Real32 { node_id, .. } => *node_id,
        }
    }
}
