use super::MessageType;

/// Legacy control field, still filled in for the message types we send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum ControlField {
    Sync = 0x00,
    DelayReq = 0x01,
    FollowUp = 0x02,
    DelayResp = 0x03,
}

impl From<MessageType> for ControlField {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Sync => ControlField::Sync,
            MessageType::DelayReq => ControlField::DelayReq,
            MessageType::FollowUp => ControlField::FollowUp,
            MessageType::DelayResp => ControlField::DelayResp,
        }
    }
}
