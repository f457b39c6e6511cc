use crate::datastructures::{read_array, write_slice, WireFormat, WireFormatError};

/// The identity of a node taking part in an exchange.
///
/// A common approach is to derive it from a mac address of the device (see
/// [`from_mac_address`](`Self::from_mac_address`)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Hash)]
pub struct ClockIdentity(pub [u8; 8]);

impl ClockIdentity {
    /// Create a [`ClockIdentity`] from a mac address.
    ///
    /// Fills the first six bytes with the mac address and the rest with zeroes.
    ///
    /// # Example
    /// ```
    /// # use chronoloop::config::ClockIdentity;
    /// let id = ClockIdentity::from_mac_address([0xA, 0xB, 0xC, 0xD, 0xE, 0xF]);
    /// assert_eq!(id.0, [0xA, 0xB, 0xC, 0xD, 0xE, 0xF, 0x0, 0x0]);
    /// ```
    pub fn from_mac_address(addr: [u8; 6]) -> Self {
        let mut this = Self([0; 8]);
        this.0[0..6].copy_from_slice(&addr);
        this
    }
}

impl core::fmt::Display for ClockIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, val) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, ":")?;
            }

            write!(f, "{:02x}", val)?;
        }

        Ok(())
    }
}

/// Clock identity plus port number, carried in the header of every message
/// and in the body of a Delay_Resp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Hash)]
pub struct PortIdentity {
    pub clock_identity: ClockIdentity,
    pub port_number: u16,
}

impl WireFormat for PortIdentity {
    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        write_slice(buffer, 0, 8)?.copy_from_slice(&self.clock_identity.0);
        write_slice(buffer, 8, 2)?.copy_from_slice(&self.port_number.to_be_bytes());
        Ok(())
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        Ok(Self {
            clock_identity: ClockIdentity(read_array(buffer, 0)?),
            port_number: u16::from_be_bytes(read_array(buffer, 8)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_identity_wireformat() {
        let identity = PortIdentity {
            clock_identity: ClockIdentity([0, 1, 2, 3, 4, 5, 6, 7]),
            port_number: 0x5555,
        };

        let mut buffer = [0u8; 10];
        identity.serialize(&mut buffer).unwrap();
        assert_eq!(buffer, [0, 1, 2, 3, 4, 5, 6, 7, 0x55, 0x55]);
        assert_eq!(PortIdentity::deserialize(&buffer).unwrap(), identity);
        assert_eq!(
            PortIdentity::deserialize(&buffer[..9]),
            Err(WireFormatError::BufferTooShort)
        );
    }
}
