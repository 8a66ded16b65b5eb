//! Dynamixel protocol 2.0 packet framing
//!
//! Instruction packet: `[FF FF FD 00] [ID] [LEN_L LEN_H] [INST] [PARAMS...] [CRC_L CRC_H]`
//!
//! Status packet: `[FF FF FD 00] [ID] [LEN_L LEN_H] [0x55] [ERR] [PARAMS...] [CRC_L CRC_H]`
//!
//! `LEN` counts everything after itself, including the CRC. Any `FF FF FD` sequence inside the
//! instruction and parameter fields is stuffed with an extra `FD`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Packet header, including the reserved byte.
pub const HEADER: [u8; 4] = [0xFF, 0xFF, 0xFD, 0x00];

/// Number of bytes before the instruction field: header, id and length.
pub const PREFIX_LEN: usize = 7;

/// Id addressing every servo on the bus.
pub const BROADCAST_ID: u8 = 0xFE;

/// Instruction byte of a status packet.
pub const STATUS_INSTRUCTION: u8 = 0x55;

/// Alert bit of the status error byte. Set on hardware errors, which don't fail the instruction.
const ERROR_ALERT_BIT: u8 = 0x80;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncRead = 0x82,
    SyncWrite = 0x83,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PacketError {
    #[error("Packet is too short ({0} bytes)")]
    TooShort(usize),

    #[error("Invalid packet header")]
    BadHeader,

    #[error("Packet length field ({field}) doesn't match the packet ({actual} bytes)")]
    BadLength { field: usize, actual: usize },

    #[error("CRC mismatch: computed {computed:#06x}, packet has {received:#06x}")]
    BadCrc { computed: u16, received: u16 },

    #[error("Expected a status packet, found instruction {0:#04x}")]
    NotStatus(u8),
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A status packet returned by a servo.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPacket {
    pub id: u8,
    pub error: u8,
    pub params: Vec<u8>,
}

impl StatusPacket {
    /// True if the servo reported that the instruction failed.
    pub fn is_error(&self) -> bool {
        self.error & !ERROR_ALERT_BIT != 0
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// CRC-16 used by protocol 2.0 (polynomial 0x8005, initial value 0, not reflected).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Build an instruction packet.
pub fn build_instruction(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(params.len() + 1);
    body.push(instruction as u8);
    body.extend_from_slice(params);
    let body = stuff(&body);

    let mut packet = Vec::with_capacity(PREFIX_LEN + body.len() + 2);
    packet.extend_from_slice(&HEADER);
    packet.push(id);
    let mut len = [0u8; 2];
    LittleEndian::write_u16(&mut len, (body.len() + 2) as u16);
    packet.extend_from_slice(&len);
    packet.extend_from_slice(&body);

    let mut crc = [0u8; 2];
    LittleEndian::write_u16(&mut crc, crc16(&packet));
    packet.extend_from_slice(&crc);

    packet
}

/// Build the parameters of a sync read of `len` bytes at `addr` from each of `ids`.
pub fn sync_read_params(addr: u16, len: u16, ids: &[u8]) -> Vec<u8> {
    let mut params = vec![0u8; 4];
    LittleEndian::write_u16(&mut params[0..2], addr);
    LittleEndian::write_u16(&mut params[2..4], len);
    params.extend_from_slice(ids);
    params
}

/// Build the parameters of a sync write at `addr`. Every entry in `data` must have the same length.
pub fn sync_write_params(addr: u16, data: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let item_len = data.first().map(|(_, d)| d.len()).unwrap_or(0);

    let mut params = vec![0u8; 4];
    LittleEndian::write_u16(&mut params[0..2], addr);
    LittleEndian::write_u16(&mut params[2..4], item_len as u16);
    for (id, d) in data {
        params.push(*id);
        params.extend_from_slice(d);
    }
    params
}

/// Number of bytes following the prefix of a packet, read from its length field.
pub fn body_len(prefix: &[u8]) -> usize {
    LittleEndian::read_u16(&prefix[5..7]) as usize
}

/// Parse a complete status packet.
pub fn parse_status(packet: &[u8]) -> Result<StatusPacket, PacketError> {
    // Prefix, instruction, error and CRC
    if packet.len() < PREFIX_LEN + 4 {
        return Err(PacketError::TooShort(packet.len()));
    }

    if packet[0..4] != HEADER {
        return Err(PacketError::BadHeader);
    }

    let len = body_len(packet);
    if len != packet.len() - PREFIX_LEN {
        return Err(PacketError::BadLength {
            field: len,
            actual: packet.len(),
        });
    }

    let crc_start = packet.len() - 2;
    let computed = crc16(&packet[..crc_start]);
    let received = LittleEndian::read_u16(&packet[crc_start..]);
    if computed != received {
        return Err(PacketError::BadCrc { computed, received });
    }

    let instruction = packet[PREFIX_LEN];
    if instruction != STATUS_INSTRUCTION {
        return Err(PacketError::NotStatus(instruction));
    }

    Ok(StatusPacket {
        id: packet[4],
        error: packet[PREFIX_LEN + 1],
        params: unstuff(&packet[PREFIX_LEN + 2..crc_start]),
    })
}

/// Insert an `FD` after every `FF FF FD` sequence.
fn stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for (i, byte) in data.iter().enumerate() {
        out.push(*byte);
        if i >= 2 && data[i - 2..=i] == [0xFF, 0xFF, 0xFD] {
            out.push(0xFD);
        }
    }
    out
}

/// Remove the `FD` following every `FF FF FD` sequence.
fn unstuff(data: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        out.push(data[i]);
        let n = out.len();
        if n >= 3 && out[n - 3..] == [0xFF, 0xFF, 0xFD] && data.get(i + 1) == Some(&0xFD) {
            i += 1;
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ping_packet() {
        assert_eq!(
            build_instruction(1, Instruction::Ping, &[]),
            vec![0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x03, 0x00, 0x01, 0x19, 0x4E]
        );
    }

    #[test]
    fn test_read_packet() {
        // Read 4 bytes of present position (132) from id 1
        assert_eq!(
            build_instruction(1, Instruction::Read, &[0x84, 0x00, 0x04, 0x00]),
            vec![0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x07, 0x00, 0x02, 0x84, 0x00, 0x04, 0x00, 0x1D, 0x15]
        );
    }

    #[test]
    fn test_parse_status() {
        // Ping response from id 1, model 0x0406, firmware 0x26
        let packet = [
            0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x07, 0x00, 0x55, 0x00, 0x06, 0x04, 0x26, 0x65, 0x5D,
        ];
        let status = parse_status(&packet).unwrap();
        assert_eq!(status.id, 1);
        assert!(!status.is_error());
        assert_eq!(status.params, vec![0x06, 0x04, 0x26]);

        let mut corrupted = packet;
        corrupted[9] = 0x07;
        assert!(matches!(
            parse_status(&corrupted),
            Err(PacketError::BadCrc { .. })
        ));

        assert_eq!(parse_status(&packet[..6]), Err(PacketError::TooShort(6)));
    }

    #[test]
    fn test_stuffing() {
        let data = [0x03, 0xFF, 0xFF, 0xFD, 0x01];
        let stuffed = stuff(&data);
        assert_eq!(stuffed, vec![0x03, 0xFF, 0xFF, 0xFD, 0xFD, 0x01]);
        assert_eq!(unstuff(&stuffed), data.to_vec());

        // Length field counts the stuffed byte
        let packet = build_instruction(2, Instruction::Write, &[0xFF, 0xFF, 0xFD]);
        assert_eq!(body_len(&packet), 7);
    }

    #[test]
    fn test_sync_params() {
        assert_eq!(
            sync_read_params(132, 4, &[1, 2]),
            vec![0x84, 0x00, 0x04, 0x00, 1, 2]
        );
        assert_eq!(
            sync_write_params(64, &[(1, vec![1]), (2, vec![1])]),
            vec![0x40, 0x00, 0x01, 0x00, 1, 1, 2, 1]
        );
    }
}
