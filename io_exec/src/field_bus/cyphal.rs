//! Cyphal/CAN single frame codec
//!
//! Message transfer CAN id layout (29 bit extended id):
//!
//! | bits  | field                               |
//! |-------|-------------------------------------|
//! | 28-26 | priority                            |
//! | 25    | service, 0 for messages             |
//! | 24    | anonymous                           |
//! | 23    | reserved, 0                         |
//! | 22-21 | reserved, 1                         |
//! | 20-8  | subject id                          |
//! | 7     | reserved, 0                         |
//! | 6-0   | source node id                      |
//!
//! The last byte of every frame is the tail byte: start of transfer, end of transfer, toggle and
//! the 5 bit transfer id. Payloads shorter than a type's size are zero extended.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};
use log::trace;
use std::collections::BTreeSet;

use super::{FieldBusMsg, Health, Mode, NodeId, SubjectId};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Fixed subject id of `uavcan.node.Heartbeat.1.0`.
pub const HEARTBEAT_SUBJECT_ID: SubjectId = 7509;

/// Nominal transfer priority.
pub const PRIORITY_NOMINAL: u8 = 4;

const SERVICE_BIT: u32 = 1 << 25;
const ANONYMOUS_BIT: u32 = 1 << 24;
const MESSAGE_RESERVED_BITS: u32 = (1 << 22) | (1 << 21);
const SUBJECT_ID_MASK: u32 = 0x1FFF;
const NODE_ID_MASK: u32 = 0x7F;

const TAIL_START: u8 = 0x80;
const TAIL_END: u8 = 0x40;
const TAIL_TOGGLE: u8 = 0x20;
const TRANSFER_ID_MASK: u8 = 0x1F;

/// Serialized size of `uavcan.node.Heartbeat.1.0`.
const HEARTBEAT_LEN: usize = 7;

/// Serialized size of `uavcan.primitive.scalar.Real32.1.0`.
const REAL32_LEN: usize = 4;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Decodes incoming frames into [`FieldBusMsg`]s.
#[derive(Debug, Clone, Default)]
pub struct CyphalCodec {
    /// Subjects carrying `Real32` values.
    real32_subjects: BTreeSet<SubjectId>,
}

/// Fields of a message transfer CAN id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageId {
    pub priority: u8,
    pub subject_id: SubjectId,
    pub source_node_id: NodeId,
    pub anonymous: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CodecError {
    #[error("Frame has no tail byte")]
    EmptyFrame,

    #[error("Node id {0} is out of range")]
    InvalidNodeId(NodeId),

    #[error("Subject id {0} is out of range")]
    InvalidSubjectId(SubjectId),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MessageId {
    /// Parse a CAN id, returning `None` for service transfers.
    pub fn parse(can_id: u32) -> Option<Self> {
        if can_id & SERVICE_BIT != 0 {
            return None;
        }

        Some(Self {
            priority: ((can_id >> 26) & 0x07) as u8,
            subject_id: ((can_id >> 8) & SUBJECT_ID_MASK) as SubjectId,
            source_node_id: (can_id & NODE_ID_MASK) as NodeId,
            anonymous: can_id & ANONYMOUS_BIT != 0,
        })
    }

    /// Build the CAN id of a message transfer.
    pub fn to_can_id(&self) -> u32 {
        let mut id = ((self.priority as u32 & 0x07) << 26)
            | MESSAGE_RESERVED_BITS
            | ((self.subject_id as u32 & SUBJECT_ID_MASK) << 8)
            | (self.source_node_id as u32 & NODE_ID_MASK);
        if self.anonymous {
            id |= ANONYMOUS_BIT;
        }
        id
    }
}

impl CyphalCodec {
    pub fn new<I: IntoIterator<Item = SubjectId>>(real32_subjects: I) -> Self {
        Self {
            real32_subjects: real32_subjects.into_iter().collect(),
        }
    }

    /// Decode a received frame.
    ///
    /// Frames which are not single frame message transfers on a known subject decode to `None`.
    pub fn decode(&self, can_id: u32, data: &[u8]) -> Result<Option<FieldBusMsg>, CodecError> {
        let (tail, payload) = match data.split_last() {
            Some(s) => s,
            None => return Err(CodecError::EmptyFrame),
        };

        let id = match MessageId::parse(can_id) {
            Some(id) if !id.anonymous => id,
            _ => return Ok(None),
        };

        if tail & (TAIL_START | TAIL_END) != (TAIL_START | TAIL_END) {
            trace!(
                "Ignoring multi-frame transfer on subject {} from node {}",
                id.subject_id,
                id.source_node_id
            );
            return Ok(None);
        }

        if id.subject_id == HEARTBEAT_SUBJECT_ID {
            let p = zero_extend::<HEARTBEAT_LEN>(payload);
            return Ok(Some(FieldBusMsg::Heartbeat {
                node_id: id.source_node_id,
                uptime_s: LittleEndian::read_u32(&p[0..4]),
                health: Health::from_raw(p[4]),
                mode: Mode::from_raw(p[5]),
            }));
        }

        if self.real32_subjects.contains(&id.subject_id) {
            let p = zero_extend::<REAL32_LEN>(payload);
            return Ok(Some(FieldBusMsg::Real32 {
                node_id: id.source_node_id,
                subject_id: id.subject_id,
                value: LittleEndian::read_f32(&p),
            }));
        }

        Ok(None)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Tail byte of a single frame transfer.
pub fn single_frame_tail(transfer_id: u8) -> u8 {
    TAIL_START | TAIL_END | TAIL_TOGGLE | (transfer_id & TRANSFER_ID_MASK)
}

/// Next transfer id after `transfer_id`.
pub fn next_transfer_id(transfer_id: u8) -> u8 {
    transfer_id.wrapping_add(1) & TRANSFER_ID_MASK
}

/// Encode a heartbeat frame.
pub fn encode_heartbeat(
    source_node_id: NodeId,
    transfer_id: u8,
    uptime_s: u32,
    health: Health,
    mode: Mode,
) -> Result<(u32, Vec<u8>), CodecError> {
    let mut data = vec![0u8; HEARTBEAT_LEN];
    LittleEndian::write_u32(&mut data[0..4], uptime_s);
    data[4] = health.to_raw();
    data[5] = mode.to_raw();
    encode_message(source_node_id, HEARTBEAT_SUBJECT_ID, transfer_id, data)
}

/// Encode a `uavcan.primitive.scalar.Real32.1.0` frame.
pub fn encode_real32(
    source_node_id: NodeId,
    subject_id: SubjectId,
    transfer_id: u8,
    value: f32,
) -> Result<(u32, Vec<u8>), CodecError> {
    let mut data = vec![0u8; REAL32_LEN];
    LittleEndian::write_f32(&mut data, value);
    encode_message(source_node_id, subject_id, transfer_id, data)
}

/// Encode a `uavcan.primitive.scalar.Natural16.1.0` frame.
pub fn encode_natural16(
    source_node_id: NodeId,
    subject_id: SubjectId,
    transfer_id: u8,
    value: u16,
) -> Result<(u32, Vec<u8>), CodecError> {
    let mut data = vec![0u8; 2];
    LittleEndian::write_u16(&mut data, value);
    encode_message(source_node_id, subject_id, transfer_id, data)
}

fn encode_message(
    source_node_id: NodeId,
    subject_id: SubjectId,
    transfer_id: u8,
    mut data: Vec<u8>,
) -> Result<(u32, Vec<u8>), CodecError> {
    if source_node_id as u32 > NODE_ID_MASK {
        return Err(CodecError::InvalidNodeId(source_node_id));
    }
    if subject_id as u32 > SUBJECT_ID_MASK {
        return Err(CodecError::InvalidSubjectId(subject_id));
    }

    let id = MessageId {
        priority: PRIORITY_NOMINAL,
        subject_id,
        source_node_id,
        anonymous: false,
    };

    data.push(single_frame_tail(transfer_id));
    Ok((id.to_can_id(), data))
}

fn zero_extend<const N: usize>(payload: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let n = payload.len().min(N);
    out[..n].copy_from_slice(&payload[..n]);
    out
}
