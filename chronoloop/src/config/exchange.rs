use crate::time::{Interval, TimeValue};

/// Configuration of the slave side of a delay request-response exchange
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ExchangeConfig {
    /// Identity placed in our Delay_Req messages. Delay_Resp messages for
    /// other requesters are ignored.
    pub port_identity: crate::config::PortIdentity,

    /// An exchange that has not completed this long after the first poll that
    /// saw it in flight is abandoned.
    pub timeout: TimeValue,

    /// The estimated asymmetry of the link: how much longer the master to
    /// slave direction takes than the mean path delay.
    pub delay_asymmetry: TimeValue,
}

/// Configuration of the master side of the exchange
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct MasterConfig {
    pub port_identity: crate::config::PortIdentity,

    /// Time between two sync messages
    pub sync_interval: Interval,

    /// Send the precise origin timestamp in a Follow_Up instead of inline
    pub two_step: bool,
}
