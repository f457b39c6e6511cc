//! Messages exchanged between master and slave

pub use header::Header;

use self::header::HEADER_LEN;
use super::{
    common::{PortIdentity, WireTimestamp},
    WireFormat, WireFormatError,
};
use crate::time::TimeValue;

mod control_field;
mod header;

/// Maximum length of a packet
///
/// This can be used to preallocate buffers that can always fit packets sent by
/// `chronoloop`.
pub const MAX_DATA_LEN: usize = 64;

const TIMESTAMP_LEN: usize = 10;
const PORT_IDENTITY_LEN: usize = 10;

/// The message types taking part in the delay request-response exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    Sync = 0x0,
    DelayReq = 0x1,
    FollowUp = 0x8,
    DelayResp = 0x9,
}

#[cfg(feature = "fuzz")]
pub use fuzz::FuzzMessage;

#[cfg(feature = "fuzz")]
mod fuzz {
    #![allow(missing_docs)] // These are only used for internal fuzzing
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct FuzzMessage {
        inner: Message,
    }

    impl FuzzMessage {
        pub fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
            Ok(FuzzMessage {
                inner: Message::deserialize(buffer)?,
            })
        }

        pub fn serialize(&self, buffer: &mut [u8]) -> Result<usize, WireFormatError> {
            self.inner.serialize(buffer)
        }
    }
}

/// A single decoded message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub body: MessageBody,
}

/// Message specific content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageBody {
    /// Origin timestamp, exact in one-step operation, approximate otherwise
    Sync(WireTimestamp),
    /// Origin timestamp of the request, informational only
    DelayReq(WireTimestamp),
    /// Precise origin timestamp of the Sync with the same sequence id
    FollowUp(WireTimestamp),
    DelayResp {
        receive_timestamp: WireTimestamp,
        requesting_port_identity: PortIdentity,
    },
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Sync(_) => MessageType::Sync,
            MessageBody::DelayReq(_) => MessageType::DelayReq,
            MessageBody::FollowUp(_) => MessageType::FollowUp,
            MessageBody::DelayResp { .. } => MessageType::DelayResp,
        }
    }

    fn content_size(&self) -> usize {
        match self {
            MessageBody::DelayResp { .. } => TIMESTAMP_LEN + PORT_IDENTITY_LEN,
            _ => TIMESTAMP_LEN,
        }
    }

    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        match self {
            MessageBody::Sync(timestamp)
            | MessageBody::DelayReq(timestamp)
            | MessageBody::FollowUp(timestamp) => timestamp.serialize(buffer),
            MessageBody::DelayResp {
                receive_timestamp,
                requesting_port_identity,
            } => {
                receive_timestamp.serialize(buffer)?;
                requesting_port_identity.serialize(
                    buffer
                        .get_mut(TIMESTAMP_LEN..)
                        .ok_or(WireFormatError::BufferTooShort)?,
                )
            }
        }
    }

    fn deserialize(message_type: MessageType, buffer: &[u8]) -> Result<Self, WireFormatError> {
        let timestamp = WireTimestamp::deserialize(buffer)?;
        Ok(match message_type {
            MessageType::Sync => MessageBody::Sync(timestamp),
            MessageType::DelayReq => MessageBody::DelayReq(timestamp),
            MessageType::FollowUp => MessageBody::FollowUp(timestamp),
            MessageType::DelayResp => MessageBody::DelayResp {
                receive_timestamp: timestamp,
                requesting_port_identity: PortIdentity::deserialize(
                    buffer
                        .get(TIMESTAMP_LEN..)
                        .ok_or(WireFormatError::BufferTooShort)?,
                )?,
            },
        })
    }
}

impl Message {
    pub fn sync(header: Header, origin: TimeValue) -> Self {
        Message {
            header,
            body: MessageBody::Sync(origin.into()),
        }
    }

    pub fn follow_up(header: Header, precise_origin: TimeValue) -> Self {
        Message {
            header,
            body: MessageBody::FollowUp(precise_origin.into()),
        }
    }

    pub fn delay_req(header: Header, origin: TimeValue) -> Self {
        Message {
            header,
            body: MessageBody::DelayReq(origin.into()),
        }
    }

    pub fn delay_resp(header: Header, receive: TimeValue, requester: PortIdentity) -> Self {
        Message {
            header,
            body: MessageBody::DelayResp {
                receive_timestamp: receive.into(),
                requesting_port_identity: requester,
            },
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Whether this message gets a hardware timestamp when it crosses the wire
    pub fn is_event(&self) -> bool {
        matches!(self.message_type(), MessageType::Sync | MessageType::DelayReq)
    }

    pub fn wire_size(&self) -> usize {
        HEADER_LEN + self.body.content_size()
    }

    /// Serializes the message into the PTP wire format.
    ///
    /// Returns the used buffer size that contains the message or an error.
    pub fn serialize(&self, buffer: &mut [u8]) -> Result<usize, WireFormatError> {
        if buffer.len() < HEADER_LEN {
            return Err(WireFormatError::BufferTooShort);
        }
        let (header, rest) = buffer.split_at_mut(HEADER_LEN);
        self.header.serialize_header(
            self.body.message_type(),
            self.body.content_size(),
            header,
        )?;
        self.body.serialize(rest)?;

        Ok(self.wire_size())
    }

    /// Deserializes a message from the PTP wire format.
    ///
    /// Bytes past the declared message length (e.g. TLVs) are ignored.
    pub fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        let header_data = Header::deserialize_header(buffer)?;

        let length = header_data.message_length as usize;
        if length > buffer.len() {
            return Err(WireFormatError::BufferTooShort);
        }
        let content = buffer
            .get(HEADER_LEN..length)
            .ok_or(WireFormatError::Invalid)?;

        Ok(Message {
            header: header_data.header,
            body: MessageBody::deserialize(header_data.message_type, content)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructures::common::ClockIdentity;

    fn identity(port_number: u16) -> PortIdentity {
        PortIdentity {
            clock_identity: ClockIdentity([1, 2, 3, 4, 5, 6, 7, 8]),
            port_number,
        }
    }

    #[test]
    fn delay_resp_layout() {
        let mut header = Header::new(identity(1));
        header.sequence_id = 7;
        let message = Message::delay_resp(header, TimeValue::new(3, 500), identity(9));

        let mut buffer = [0u8; MAX_DATA_LEN];
        let len = message.serialize(&mut buffer).unwrap();
        assert_eq!(len, 54);
        assert_eq!(buffer[0] & 0x0f, 0x9);
        assert_eq!(&buffer[2..4], &[0, 54]);
        assert_eq!(&buffer[34..44], &[0, 0, 0, 0, 0, 3, 0, 0, 0x01, 0xf4]);
        assert_eq!(&buffer[44..52], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&buffer[52..54], &[0, 9]);

        assert_eq!(Message::deserialize(&buffer[..len]).unwrap(), message);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut header = Header::new(identity(1));
        header.two_step_flag = true;
        let message = Message::sync(header, TimeValue::new(10, 20));

        let mut buffer = [0xaau8; MAX_DATA_LEN];
        let len = message.serialize(&mut buffer).unwrap();
        assert_eq!(len, 44);
        assert_eq!(Message::deserialize(&buffer).unwrap(), message);
    }

    #[test]
    fn truncated_messages_are_rejected() {
        let message = Message::follow_up(Header::new(identity(1)), TimeValue::new(1, 1));
        let mut buffer = [0u8; MAX_DATA_LEN];
        let len = message.serialize(&mut buffer).unwrap();

        assert_eq!(
            Message::deserialize(&buffer[..len - 1]),
            Err(WireFormatError::BufferTooShort)
        );
        assert_eq!(
            message.serialize(&mut [0u8; 20]),
            Err(WireFormatError::BufferTooShort)
        );
    }

    #[test]
    fn unknown_message_types_are_rejected() {
        let message = Message::sync(Header::new(identity(1)), TimeValue::ZERO);
        let mut buffer = [0u8; MAX_DATA_LEN];
        let len = message.serialize(&mut buffer).unwrap();
        // announce
        buffer[0] = 0x0b;
        assert_eq!(
            Message::deserialize(&buffer[..len]),
            Err(WireFormatError::EnumConversionError)
        );
    }
}
