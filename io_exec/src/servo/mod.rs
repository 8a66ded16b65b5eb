//! # Servo bus
//!
//! The coxa joints and the sensor head are driven by MX-28 servos on a shared half-duplex serial
//! bus using the Dynamixel 2.0 protocol. The rest of the software talks to the bus through the
//! [`ServoBus`] trait so it can be swapped for the simulated bus.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod dynamixel;
pub mod packet;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::{BTreeMap, BTreeSet};

pub use dynamixel::{Dynamixel, Mx28};
pub use packet::PacketError;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Id of a servo on the bus.
pub type ServoId = u8;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A bus of position controlled servos.
///
/// Angles are in degrees, 0 being the centre of travel.
pub trait ServoBus {
    /// Find every servo on the bus.
    fn discover(&mut self) -> Result<BTreeSet<ServoId>, ServoError>;

    /// Read the present angle of every servo in `ids` in one transaction.
    ///
    /// Servos which fail to respond are missing from the returned map, an error is only returned if
    /// the transaction itself couldn't be made.
    fn bulk_read(&mut self, ids: &[ServoId]) -> Result<BTreeMap<ServoId, f32>, ServoError>;

    /// Write the goal angle of every servo in `angles` in one transaction.
    fn bulk_write(&mut self, angles: &BTreeMap<ServoId, f32>) -> Result<(), ServoError>;

    /// Enable or disable the torque of every servo in `ids`.
    fn set_torque(&mut self, ids: &[ServoId], enabled: bool) -> Result<(), ServoError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ServoError {
    #[error("Could not open serial port {0}: {1}")]
    OpenError(String, serialport::Error),

    #[error("Serial IO error: {0}")]
    IoError(std::io::Error),

    #[error("Timed out waiting for a response (got {0} of {1} bytes)")]
    Timeout(usize, usize),

    #[error("Malformed packet: {0}")]
    PacketError(#[from] PacketError),

    #[error("Servo {id} reported error {error:#04x}")]
    ServoReported { id: ServoId, error: u8 },

    #[error("Expected a response from servo {expected}, found {found}")]
    UnexpectedId { expected: ServoId, found: ServoId },

    #[error("Servo {0} returned a malformed payload")]
    BadPayload(ServoId),
}
