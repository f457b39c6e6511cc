use crate::{
    datastructures::{read_array, write_slice, WireFormat, WireFormatError},
    time::TimeValue,
};

/// An 80-bit timestamp as carried in message bodies: signed 48-bit seconds
/// followed by unsigned 32-bit nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Hash)]
pub struct WireTimestamp {
    /// The seconds field of the timestamp, sign extended from 48 bits
    pub seconds: i64,
    /// The nanoseconds field of the timestamp.
    /// Must be less than 10^9
    pub nanos: u32,
}

const SECONDS_MIN: i64 = -(1 << 47);
const SECONDS_MAX: i64 = (1 << 47) - 1;

impl WireFormat for WireTimestamp {
    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        let seconds = self.seconds.to_be_bytes();
        write_slice(buffer, 0, 6)?.copy_from_slice(&seconds[2..8]);
        write_slice(buffer, 6, 4)?.copy_from_slice(&self.nanos.to_be_bytes());
        Ok(())
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        let raw: [u8; 6] = read_array(buffer, 0)?;
        let mut seconds = [0u8; 8];
        seconds[2..8].copy_from_slice(&raw);
        // sign extend the 48 bit field
        let seconds = i64::from_be_bytes(seconds) << 16 >> 16;

        Ok(Self {
            seconds,
            nanos: u32::from_be_bytes(read_array(buffer, 6)?),
        })
    }
}

impl From<TimeValue> for WireTimestamp {
    /// Truncates the sub-nanosecond fraction and saturates seconds to the
    /// 48-bit range.
    fn from(value: TimeValue) -> Self {
        let seconds = value.secs();
        if seconds > SECONDS_MAX {
            Self {
                seconds: SECONDS_MAX,
                nanos: 999_999_999,
            }
        } else if seconds < SECONDS_MIN {
            Self {
                seconds: SECONDS_MIN,
                nanos: 0,
            }
        } else {
            Self {
                seconds,
                nanos: value.nanos(),
            }
        }
    }
}

impl From<WireTimestamp> for TimeValue {
    /// Out of range nanoseconds are carried into the seconds.
    fn from(ts: WireTimestamp) -> Self {
        TimeValue::new(ts.seconds, ts.nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_wireformat() {
        let representations = [
            (
                [0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01u8],
                WireTimestamp {
                    seconds: 2,
                    nanos: 1,
                },
            ),
            (
                [0x10, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x01u8],
                WireTimestamp {
                    seconds: 0x0000_1000_0000_0002,
                    nanos: 0x0001_0001,
                },
            ),
            (
                [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x05u8],
                WireTimestamp {
                    seconds: -1,
                    nanos: 5,
                },
            ),
        ];

        for (byte_representation, object_representation) in representations {
            // Test the serialization output
            let mut serialization_buffer = [0; 10];
            object_representation
                .serialize(&mut serialization_buffer)
                .unwrap();
            assert_eq!(serialization_buffer, byte_representation);

            // Test the deserialization output
            let deserialized_data = WireTimestamp::deserialize(&byte_representation).unwrap();
            assert_eq!(deserialized_data, object_representation);
        }
    }

    #[test]
    fn time_value_conversion() {
        let value = TimeValue::from_parts(-2, 1_234 * 65_536 + 17);
        let wire = WireTimestamp::from(value);
        assert_eq!(wire.seconds, -2);
        assert_eq!(wire.nanos, 1_234);
        assert_eq!(TimeValue::from(wire), TimeValue::new(-2, 1_234));

        let far = WireTimestamp::from(TimeValue::from_secs(1 << 50));
        assert_eq!(far.seconds, (1 << 47) - 1);
    }
}
