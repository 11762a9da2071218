//! # dtr-proto
//!
//! Wire model for the Dynamic Token Ring (DTR) protocol: the frame
//! layout shared by every peer on the broadcast channel, plus the
//! compile-time constants derived from it.
//!
//! The format is deliberately minimal. Every scalar is a single byte, so
//! there are no endianness concerns, and a whole frame is:
//!
//! ```text
//! [packet_size, message_type, source_id, target_id, data_size, data...]
//! ```
//!
//! with `packet_size == PACKET_HEADER_SIZE + data_size`.

pub mod constants;
pub mod time;

use constants::{MAX_PACKET_SIZE, PACKET_HEADER_SIZE};
use std::fmt;
use thiserror::Error;

/// Frame classes of the DTR protocol, with their wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Application payload, acknowledged by the target.
    Data = 1,
    /// Acknowledgement for a received `Data` frame. Fire-and-forget.
    DataAck = 2,
    /// Offer of the token to the successor.
    Token = 3,
    /// The successor accepting a token offer.
    Rts = 4,
    /// The predecessor clearing the new holder to send. Fire-and-forget.
    Cts = 5,
    /// Discovery announcement carrying the known peer set.
    Handshake = 6,
    /// Distribution of a new ring membership, acknowledged like data.
    TopologyReconfig = 7,
}

impl MessageType {
    /// Parses the wire value of a message type.
    pub fn from_wire(value: u8) -> Option<MessageType> {
        match value {
            1 => Some(MessageType::Data),
            2 => Some(MessageType::DataAck),
            3 => Some(MessageType::Token),
            4 => Some(MessageType::Rts),
            5 => Some(MessageType::Cts),
            6 => Some(MessageType::Handshake),
            7 => Some(MessageType::TopologyReconfig),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Data => "DATA",
            MessageType::DataAck => "DATA_ACK",
            MessageType::Token => "TOKEN",
            MessageType::Rts => "RTS",
            MessageType::Cts => "CTS",
            MessageType::Handshake => "HANDSHAKE",
            MessageType::TopologyReconfig => "TOPOLOGY_RECONFIG",
        };
        f.write_str(name)
    }
}

/// Errors rejecting a frame at decode time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame shorter than the packet header: {0} bytes")]
    Truncated(usize),
    #[error("reported size {reported} exceeds the {received} received bytes")]
    LengthExceedsFrame { reported: usize, received: usize },
    #[error("reported size {0} exceeds the maximum frame size")]
    FrameTooLarge(usize),
    #[error("header declares {data_size} payload bytes but {reported} total")]
    SizeMismatch { reported: usize, data_size: usize },
    #[error("unknown message type {0}")]
    UnknownType(u8),
}

/// The sole on-wire unit of the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub message_type: MessageType,
    pub source_id: u8,
    pub target_id: u8,
    pub data: Vec<u8>,
}

impl Packet {
    /// A frame carrying a payload. Payloads are validated against
    /// `MAX_PAYLOAD_SIZE` at the API boundary, before a frame reaches
    /// the wire.
    pub fn new(message_type: MessageType, source_id: u8, target_id: u8, data: Vec<u8>) -> Packet {
        Packet {
            message_type,
            source_id,
            target_id,
            data,
        }
    }

    /// A header-only service frame (TOKEN, RTS, CTS, DATA_ACK).
    pub fn service(message_type: MessageType, source_id: u8, target_id: u8) -> Packet {
        Packet::new(message_type, source_id, target_id, Vec::new())
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Total serialized size, header included.
    pub fn packet_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.data.len()
    }

    /// Serializes the frame into its fixed layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.packet_size());
        frame.push(self.packet_size() as u8);
        frame.push(self.message_type as u8);
        frame.push(self.source_id);
        frame.push(self.target_id);
        frame.push(self.data.len() as u8);
        frame.extend_from_slice(&self.data);
        frame
    }

    /// Parses a received frame. The radio may deliver trailing bytes past
    /// `packet_size` (fixed-size air frames); those are ignored.
    pub fn decode(frame: &[u8]) -> Result<Packet, DecodeError> {
        if frame.len() < PACKET_HEADER_SIZE {
            return Err(DecodeError::Truncated(frame.len()));
        }

        let reported = frame[0] as usize;
        if reported > frame.len() {
            return Err(DecodeError::LengthExceedsFrame {
                reported,
                received: frame.len(),
            });
        }
        if reported > MAX_PACKET_SIZE {
            return Err(DecodeError::FrameTooLarge(reported));
        }
        if reported < PACKET_HEADER_SIZE {
            return Err(DecodeError::Truncated(reported));
        }

        let message_type =
            MessageType::from_wire(frame[1]).ok_or(DecodeError::UnknownType(frame[1]))?;

        let data_size = frame[4] as usize;
        if reported != PACKET_HEADER_SIZE + data_size {
            return Err(DecodeError::SizeMismatch {
                reported,
                data_size,
            });
        }

        Ok(Packet {
            message_type,
            source_id: frame[2],
            target_id: frame[3],
            data: frame[PACKET_HEADER_SIZE..reported].to_vec(),
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} ({} bytes)",
            self.message_type,
            self.source_id,
            self.target_id,
            self.data.len()
        )
    }
}
