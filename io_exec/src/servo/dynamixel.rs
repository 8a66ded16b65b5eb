//! Dynamixel protocol 2.0 driver for MX-28 servos

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace, warn};
use std::{
    collections::{BTreeMap, BTreeSet},
    io::{ErrorKind, Read, Write},
    time::{Duration, Instant},
};

use super::{
    packet::{self, Instruction, StatusPacket, BROADCAST_ID, HEADER, PREFIX_LEN},
    ServoBus, ServoError, ServoId,
};
use util::maths::{clamp, lin_map};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// MX-28 control table and position conversions.
pub struct Mx28;

/// Dynamixel protocol 2.0 driver over any byte stream, usually a serial port.
pub struct Dynamixel<S> {
    port: S,

    /// Maximum time to wait for one status packet.
    timeout: Duration,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Mx28 {
    pub const TORQUE_ENABLE_ADDR: u16 = 64;
    pub const GOAL_POSITION_ADDR: u16 = 116;
    pub const PRESENT_POSITION_ADDR: u16 = 132;
    pub const POSITION_LEN: u16 = 4;

    /// Number of position steps in one revolution.
    pub const STEPS_PER_REV: f32 = 4096.0;

    /// Convert a raw position into degrees, 0 being the centre of travel.
    pub fn raw_to_deg(raw: u32) -> f32 {
        lin_map((0.0, Self::STEPS_PER_REV), (-180.0, 180.0), raw as f32)
    }

    /// Convert degrees into a raw position, saturating at the ends of travel.
    pub fn deg_to_raw(angle_deg: f32) -> u32 {
        let raw = lin_map((-180.0, 180.0), (0.0, Self::STEPS_PER_REV), angle_deg);
        clamp(raw.round(), 0.0, Self::STEPS_PER_REV - 1.0) as u32
    }
}

impl Dynamixel<Box<dyn serialport::SerialPort>> {
    /// Open a serial port and create a driver on it.
    pub fn open(device: &str, baud_rate: u32, timeout: Duration) -> Result<Self, ServoError> {
        let port = serialport::new(device, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| ServoError::OpenError(device.into(), e))?;

        debug!("Opened {} at {} baud", device, baud_rate);

        Ok(Self::new(port, timeout))
    }
}

impl<S> Dynamixel<S>
where
    S: Read + Write,
{
    pub fn new(port: S, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut S {
        &mut self.port
    }

    /// Ping a single servo, returning true if it responded.
    pub fn ping(&mut self, id: ServoId) -> Result<bool, ServoError> {
        self.transmit(&packet::build_instruction(id, Instruction::Ping, &[]))?;

        match self.receive_status() {
            Ok(status) => Ok(status.id == id),
            Err(ServoError::Timeout(..)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read the present angle of a single servo.
    pub fn read_angle(&mut self, id: ServoId) -> Result<f32, ServoError> {
        let mut params = [0u8; 4];
        LittleEndian::write_u16(&mut params[0..2], Mx28::PRESENT_POSITION_ADDR);
        LittleEndian::write_u16(&mut params[2..4], Mx28::POSITION_LEN);
        self.transmit(&packet::build_instruction(id, Instruction::Read, &params))?;

        let status = self.receive_status()?;
        check_status(&status, id)?;
        position_from_status(&status)
    }

    /// Write the goal angle of a single servo.
    pub fn write_angle(&mut self, id: ServoId, angle_deg: f32) -> Result<(), ServoError> {
        let mut params = vec![0u8; 2];
        LittleEndian::write_u16(&mut params, Mx28::GOAL_POSITION_ADDR);
        params.extend_from_slice(&position_bytes(angle_deg));
        self.transmit(&packet::build_instruction(id, Instruction::Write, &params))?;

        let status = self.receive_status()?;
        check_status(&status, id)
    }

    fn transmit(&mut self, packet: &[u8]) -> Result<(), ServoError> {
        trace!("TX {:02X?}", packet);
        self.port.write_all(packet).map_err(ServoError::IoError)?;
        self.port.flush().map_err(ServoError::IoError)
    }

    /// Receive the next status packet on the bus.
    ///
    /// Bytes preceding a packet header are discarded.
    fn receive_status(&mut self) -> Result<StatusPacket, ServoError> {
        let start = Instant::now();

        // Sync onto the header
        let mut prefix = [0u8; PREFIX_LEN];
        let mut matched = 0;
        while matched < HEADER.len() {
            let mut byte = [0u8; 1];
            self.read_exact(&mut byte, start)?;
            if byte[0] == HEADER[matched] {
                matched += 1;
            } else if byte[0] == HEADER[0] {
                matched = 1;
            } else {
                matched = 0;
            }
        }
        prefix[..HEADER.len()].copy_from_slice(&HEADER);
        self.read_exact(&mut prefix[HEADER.len()..], start)?;

        let mut packet = prefix.to_vec();
        packet.resize(PREFIX_LEN + packet::body_len(&prefix), 0);
        self.read_exact(&mut packet[PREFIX_LEN..], start)?;

        trace!("RX {:02X?}", packet);

        Ok(packet::parse_status(&packet)?)
    }

    /// Fill `buf`, failing if the read timeout measured from `start` elapses.
    fn read_exact(&mut self, buf: &mut [u8], start: Instant) -> Result<(), ServoError> {
        let mut total_read = 0;

        while total_read < buf.len() {
            if start.elapsed() > self.timeout {
                return Err(ServoError::Timeout(total_read, buf.len()));
            }

            match self.port.read(&mut buf[total_read..]) {
                Ok(0) => std::thread::sleep(Duration::from_micros(100)),
                Ok(n) => total_read += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    return Err(ServoError::Timeout(total_read, buf.len()))
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                    std::thread::sleep(Duration::from_micros(100))
                }
                Err(e) => return Err(ServoError::IoError(e)),
            }
        }

        Ok(())
    }
}

impl<S> ServoBus for Dynamixel<S>
where
    S: Read + Write,
{
    fn discover(&mut self) -> Result<BTreeSet<ServoId>, ServoError> {
        self.transmit(&packet::build_instruction(
            BROADCAST_ID,
            Instruction::Ping,
            &[],
        ))?;

        // Every servo answers a broadcast ping, collect responses until the bus goes quiet
        let mut ids = BTreeSet::new();
        loop {
            match self.receive_status() {
                Ok(status) => {
                    debug!("Servo {} responded to ping", status.id);
                    ids.insert(status.id);
                }
                Err(ServoError::Timeout(..)) => break,
                Err(ServoError::PacketError(e)) => warn!("Malformed ping response: {}", e),
                Err(e) => return Err(e),
            }
        }

        Ok(ids)
    }

    fn bulk_read(&mut self, ids: &[ServoId]) -> Result<BTreeMap<ServoId, f32>, ServoError> {
        let params = packet::sync_read_params(Mx28::PRESENT_POSITION_ADDR, Mx28::POSITION_LEN, ids);
        self.transmit(&packet::build_instruction(
            BROADCAST_ID,
            Instruction::SyncRead,
            &params,
        ))?;

        // Servos answer in the order they were requested
        let mut angles = BTreeMap::new();
        for id in ids {
            let status = match self.receive_status() {
                Ok(s) => s,
                Err(ServoError::Timeout(..)) => {
                    warn!("Servo {} did not respond to the bulk read", id);
                    break;
                }
                Err(ServoError::PacketError(e)) => {
                    warn!("Malformed bulk read response: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match check_status(&status, status.id).and_then(|_| position_from_status(&status)) {
                Ok(angle_deg) if ids.contains(&status.id) => {
                    angles.insert(status.id, angle_deg);
                }
                Ok(_) => warn!("Unexpected bulk read response from servo {}", status.id),
                Err(e) => warn!("Bulk read of servo {} failed: {}", status.id, e),
            }
        }

        Ok(angles)
    }

    fn bulk_write(&mut self, angles: &BTreeMap<ServoId, f32>) -> Result<(), ServoError> {
        let data: Vec<(u8, Vec<u8>)> = angles
            .iter()
            .map(|(id, angle_deg)| (*id, position_bytes(*angle_deg).to_vec()))
            .collect();

        // Sync write has no response
        self.transmit(&packet::build_instruction(
            BROADCAST_ID,
            Instruction::SyncWrite,
            &packet::sync_write_params(Mx28::GOAL_POSITION_ADDR, &data),
        ))
    }

    fn set_torque(&mut self, ids: &[ServoId], enabled: bool) -> Result<(), ServoError> {
        let data: Vec<(u8, Vec<u8>)> = ids.iter().map(|id| (*id, vec![enabled as u8])).collect();

        self.transmit(&packet::build_instruction(
            BROADCAST_ID,
            Instruction::SyncWrite,
            &packet::sync_write_params(Mx28::TORQUE_ENABLE_ADDR, &data),
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_status(status: &StatusPacket, expected: ServoId) -> Result<(), ServoError> {
    if status.id != expected {
        return Err(ServoError::UnexpectedId {
            expected,
            found: status.id,
        });
    }
    if status.is_error() {
        return Err(ServoError::ServoReported {
            id: status.id,
            error: status.error,
        });
    }
    Ok(())
}

fn position_from_status(status: &StatusPacket) -> Result<f32, ServoError> {
    if status.params.len() != Mx28::POSITION_LEN as usize {
        return Err(ServoError::BadPayload(status.id));
    }
    Ok(Mx28::raw_to_deg(LittleEndian::read_u32(&status.params)))
}

fn position_bytes(angle_deg: f32) -> [u8; 4] {
    let mut bytes = [0u8; 4];
    LittleEndian::write_u32(&mut bytes, Mx28::deg_to_raw(angle_deg));
    bytes
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory port which replays canned responses and records what was written.
    #[derive(Default)]
    struct MockPort {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.rx.is_empty() {
                return Err(std::io::Error::new(ErrorKind::TimedOut, "empty"));
            }
            let n = buf.len().min(self.rx.len());
            for b in buf.iter_mut().take(n) {
                *b = self.rx.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn status(id: u8, params: &[u8]) -> Vec<u8> {
        let mut body = vec![0x55, 0x00];
        body.extend_from_slice(params);
        let mut p = HEADER.to_vec();
        p.push(id);
        p.extend_from_slice(&((body.len() + 2) as u16).to_le_bytes());
        p.extend_from_slice(&body);
        let crc = packet::crc16(&p);
        p.extend_from_slice(&crc.to_le_bytes());
        p
    }

    fn driver(responses: &[Vec<u8>]) -> Dynamixel<MockPort> {
        let mut port = MockPort::default();
        for r in responses {
            port.rx.extend(r.iter());
        }
        Dynamixel::new(port, Duration::from_millis(20))
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Mx28::raw_to_deg(2048), 0.0);
        assert_eq!(Mx28::raw_to_deg(3072), 90.0);
        assert_eq!(Mx28::deg_to_raw(0.0), 2048);
        assert_eq!(Mx28::deg_to_raw(-90.0), 1024);
        assert_eq!(Mx28::deg_to_raw(400.0), 4095);
    }

    #[test]
    fn test_discover() {
        let mut dxl = driver(&[status(1, &[0x06, 0x04, 0x26]), status(7, &[0x06, 0x04, 0x26])]);
        let ids = dxl.discover().unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![1, 7]);

        // Broadcast ping went out
        assert_eq!(dxl.port_mut().tx, packet::build_instruction(0xFE, Instruction::Ping, &[]));
    }

    #[test]
    fn test_bulk_read_partial() {
        // Servo 2 never answers, and there's line noise before the first response
        let mut first = vec![0x00, 0xFF, 0x13];
        first.extend(status(1, &3072u32.to_le_bytes()));
        let mut dxl = driver(&[first]);

        let angles = dxl.bulk_read(&[1, 2]).unwrap();
        assert_eq!(angles.get(&1), Some(&90.0));
        assert_eq!(angles.get(&2), None);
    }

    #[test]
    fn test_bulk_write_packet() {
        let mut dxl = driver(&[]);
        let mut angles = BTreeMap::new();
        angles.insert(1u8, 0.0f32);
        dxl.bulk_write(&angles).unwrap();

        let expected = packet::build_instruction(
            BROADCAST_ID,
            Instruction::SyncWrite,
            &[0x74, 0x00, 0x04, 0x00, 0x01, 0x00, 0x08, 0x00, 0x00],
        );
        assert_eq!(dxl.port_mut().tx, expected);
    }

    #[test]
    fn test_read_angle_error_status() {
        let mut response = status(3, &2048u32.to_le_bytes());
        // Set the error byte and fix up the CRC
        response[8] = 0x02;
        let crc_start = response.len() - 2;
        let crc = packet::crc16(&response[..crc_start]);
        response[crc_start..].copy_from_slice(&crc.to_le_bytes());

        let mut dxl = driver(&[response]);
        assert!(matches!(
            dxl.read_angle(3),
            Err(ServoError::ServoReported { id: 3, error: 0x02 })
        ));
    }
}
