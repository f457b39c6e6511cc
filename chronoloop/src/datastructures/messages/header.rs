use super::{control_field::ControlField, MessageType};
use crate::datastructures::{
    common::{PortIdentity, TimeInterval},
    read_array, write_slice, WireFormat, WireFormatError,
};

pub(crate) const HEADER_LEN: usize = 34;
const PTP_VERSION: u8 = 2;
const TWO_STEP_FLAG: u16 = 1 << 9;

/// The common header in front of every message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// 12-bit sdo id, split over the major and minor sdo fields
    pub sdo_id: u16,
    pub domain_number: u8,
    /// Set when the precise origin timestamp follows in a Follow_Up
    pub two_step_flag: bool,
    pub correction_field: TimeInterval,
    pub source_port_identity: PortIdentity,
    pub sequence_id: u16,
    pub log_message_interval: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeserializedHeader {
    pub(crate) header: Header,
    pub(crate) message_type: MessageType,
    pub(crate) message_length: u16,
}

impl Header {
    /// A header for messages sent from `source_port_identity`, with all
    /// other fields at their defaults.
    ///
    /// # Example
    /// ```
    /// # use chronoloop::{config::{ClockIdentity, PortIdentity}, Header, Message, TimeValue};
    /// let identity = PortIdentity {
    ///     clock_identity: ClockIdentity([1; 8]),
    ///     port_number: 1,
    /// };
    /// let mut header = Header::new(identity);
    /// header.sequence_id = 7;
    ///
    /// let mut buffer = [0; 64];
    /// let len = Message::delay_req(header, TimeValue::ZERO).serialize(&mut buffer).unwrap();
    /// let parsed = Message::deserialize(&buffer[..len]).unwrap();
    /// assert_eq!(parsed.header, header);
    /// ```
    pub fn new(source_port_identity: PortIdentity) -> Self {
        Self {
            sdo_id: 0,
            domain_number: 0,
            two_step_flag: false,
            correction_field: TimeInterval::ZERO,
            source_port_identity,
            sequence_id: 0,
            log_message_interval: 0x7f,
        }
    }

    pub(crate) fn serialize_header(
        &self,
        message_type: MessageType,
        content_length: usize,
        buffer: &mut [u8],
    ) -> Result<(), WireFormatError> {
        let message_length = u16::try_from(HEADER_LEN + content_length)
            .map_err(|_| WireFormatError::CapacityError)?;
        let header = write_slice(buffer, 0, HEADER_LEN)?;

        header[0] = ((self.sdo_id >> 8) as u8 & 0x0f) << 4 | message_type as u8;
        header[1] = PTP_VERSION;
        header[2..4].copy_from_slice(&message_length.to_be_bytes());
        header[4] = self.domain_number;
        header[5] = self.sdo_id as u8;
        let flags = if self.two_step_flag { TWO_STEP_FLAG } else { 0 };
        header[6..8].copy_from_slice(&flags.to_be_bytes());
        self.correction_field.serialize(&mut header[8..16])?;
        header[16..20].fill(0);
        self.source_port_identity.serialize(&mut header[20..30])?;
        header[30..32].copy_from_slice(&self.sequence_id.to_be_bytes());
        header[32] = ControlField::from(message_type) as u8;
        header[33] = self.log_message_interval as u8;

        Ok(())
    }

    pub(crate) fn deserialize_header(buffer: &[u8]) -> Result<DeserializedHeader, WireFormatError> {
        let header: [u8; HEADER_LEN] = read_array(buffer, 0)?;

        if header[1] & 0x0f != PTP_VERSION {
            return Err(WireFormatError::Invalid);
        }

        let flags = u16::from_be_bytes([header[6], header[7]]);

        Ok(DeserializedHeader {
            header: Self {
                sdo_id: ((header[0] & 0xf0) as u16) << 4 | header[5] as u16,
                domain_number: header[4],
                two_step_flag: flags & TWO_STEP_FLAG != 0,
                correction_field: TimeInterval::deserialize(&header[8..16])?,
                source_port_identity: PortIdentity::deserialize(&header[20..30])?,
                sequence_id: u16::from_be_bytes([header[30], header[31]]),
                log_message_interval: header[33] as i8,
            },
            message_type: MessageType::try_from(header[0] & 0x0f)?,
            message_length: u16::from_be_bytes([header[2], header[3]]),
        })
    }
}
