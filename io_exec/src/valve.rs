//! # Hydraulic valve driver
//!
//! Each hydraulic joint has a proportional valve driven by an RC style PWM signal from an SSC-32
//! servo controller. A pulse of 1500 us closes the valve, shorter and longer pulses open it in
//! either direction.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace};
use std::{collections::BTreeMap, fmt::Write as _, io::Write, time::Duration};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Shortest pulse the SSC-32 accepts.
pub const MIN_PULSE_US: u16 = 500;

/// Longest pulse the SSC-32 accepts.
pub const MAX_PULSE_US: u16 = 2500;

/// Highest channel number on the SSC-32.
pub const MAX_CHANNEL: ValveChannel = 31;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// PWM channel a valve is connected to.
pub type ValveChannel = u8;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A driver for a group of valves.
pub trait ValveDriver {
    /// Set the pulse width of every channel in `pulses_us` in one transaction.
    fn bulk_write(&mut self, pulses_us: &BTreeMap<ValveChannel, u16>) -> Result<(), ValveError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// SSC-32 serial servo controller.
pub struct Ssc32<S> {
    port: S,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ValveError {
    #[error("Could not open serial port {0}: {1}")]
    OpenError(String, serialport::Error),

    #[error("Serial IO error: {0}")]
    IoError(std::io::Error),

    #[error("Channel {0} does not exist")]
    InvalidChannel(ValveChannel),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Ssc32<Box<dyn serialport::SerialPort>> {
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, ValveError> {
        let port = serialport::new(device, baud_rate)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| ValveError::OpenError(device.into(), e))?;

        debug!("Opened SSC-32 on {} at {} baud", device, baud_rate);

        Ok(Self::new(port))
    }
}

impl<S: Write> Ssc32<S> {
    pub fn new(port: S) -> Self {
        Self { port }
    }

    pub fn port_mut(&mut self) -> &mut S {
        &mut self.port
    }
}

impl<S: Write> ValveDriver for Ssc32<S> {
    fn bulk_write(&mut self, pulses_us: &BTreeMap<ValveChannel, u16>) -> Result<(), ValveError> {
        let cmd = group_move_command(pulses_us)?;

        trace!("SSC-32 {:?}", cmd);

        self.port
            .write_all(cmd.as_bytes())
            .and_then(|_| self.port.flush())
            .map_err(ValveError::IoError)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build an SSC-32 group move command, e.g. `#0P1500#1P1750\r`.
///
/// Pulse widths are saturated to the range the controller accepts.
pub fn group_move_command(pulses_us: &BTreeMap<ValveChannel, u16>) -> Result<String, ValveError> {
    let mut cmd = String::new();

    for (channel, pulse_us) in pulses_us {
        if *channel > MAX_CHANNEL {
            return Err(ValveError::InvalidChannel(*channel));
        }
        let pulse_us = (*pulse_us).max(MIN_PULSE_US).min(MAX_PULSE_US);
        // Writing to a String can't fail
        let _ = write!(cmd, "#{}P{}", channel, pulse_us);
    }
    cmd.push('\r');

    Ok(cmd)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_group_move_command() {
        let mut pulses = BTreeMap::new();
        pulses.insert(16, 1750);
        pulses.insert(0, 1500);
        pulses.insert(1, 100);

        assert_eq!(
            group_move_command(&pulses).unwrap(),
            "#0P1500#1P500#16P1750\r"
        );

        pulses.insert(40, 1500);
        assert!(matches!(
            group_move_command(&pulses),
            Err(ValveError::InvalidChannel(40))
        ));
    }

    #[test]
    fn test_bulk_write() {
        let mut ssc = Ssc32::new(Vec::new());
        let mut pulses = BTreeMap::new();
        pulses.insert(3, 1250);
        ssc.bulk_write(&pulses).unwrap();

        assert_eq!(ssc.port_mut().as_slice(), b"#3P1250\r");
    }
}
