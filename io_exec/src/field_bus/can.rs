//! Cyphal over SocketCAN

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace, warn};
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket};
use std::io::ErrorKind;

use super::{
    cyphal::{self, CyphalCodec},
    FieldBus, FieldBusError, FieldBusMsg, NodeId, SubjectId,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Mask of the 29 bit extended CAN id.
const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// Upper limit on frames read in one poll, so a flooded bus can't stall the cycle.
const MAX_FRAMES_PER_POLL: usize = 512;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Field bus on a SocketCAN interface.
pub struct CyphalCan {
    socket: CanSocket,

    codec: CyphalCodec,

    /// Node id this executable publishes as.
    local_node_id: NodeId,

    /// Subject of the pump speed setpoint.
    pump_rpm_subject_id: SubjectId,

    pump_transfer_id: u8,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CyphalCan {
    /// Open the given CAN interface (e.g. `can0`) in non-blocking mode.
    pub fn open(
        interface: &str,
        codec: CyphalCodec,
        local_node_id: NodeId,
        pump_rpm_subject_id: SubjectId,
    ) -> Result<Self, FieldBusError> {
        let socket = CanSocket::open(interface)
            .map_err(|e| FieldBusError::OpenError(interface.into(), e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| FieldBusError::OpenError(interface.into(), e))?;

        debug!("Opened CAN interface {}", interface);

        Ok(Self {
            socket,
            codec,
            local_node_id,
            pump_rpm_subject_id,
            pump_transfer_id: 0,
        })
    }
}

impl FieldBus for CyphalCan {
    fn poll(&mut self) -> Result<Vec<FieldBusMsg>, FieldBusError> {
        let mut msgs = Vec::new();

        for _ in 0..MAX_FRAMES_PER_POLL {
            let frame = match self.socket.read_frame() {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(FieldBusError::IoError(e)),
            };

            // Cyphal only uses extended data frames
            let data_frame = match frame {
                CanFrame::Data(ref f) if f.is_extended() => f,
                _ => continue,
            };

            let can_id = data_frame.raw_id() & EXTENDED_ID_MASK;
            match self.codec.decode(can_id, data_frame.data()) {
                Ok(Some(msg)) => msgs.push(msg),
                Ok(None) => (),
                Err(e) => warn!("Could not decode frame {:#010x}: {}", can_id, e),
            }
        }

        Ok(msgs)
    }

    fn publish_pump_rpm(&mut self, rpm: u16) -> Result<(), FieldBusError> {
        let (can_id, data) = cyphal::encode_natural16(
            self.local_node_id,
            self.pump_rpm_subject_id,
            self.pump_transfer_id,
            rpm,
        )?;
        self.pump_transfer_id = cyphal::next_transfer_id(self.pump_transfer_id);

        let frame = ExtendedId::new(can_id)
            .and_then(|id| CanFrame::new(id, &data))
            .ok_or(FieldBusError::FrameBuildError(can_id))?;

        trace!("Pump setpoint {} RPM", rpm);

        self.socket
            .write_frame(&frame)
            .map_err(FieldBusError::IoError)
    }
}
