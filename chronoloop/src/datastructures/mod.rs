//! Wire datastructures as defined by IEEE 1588

use core::fmt::Debug;

pub mod common;
pub mod messages;

pub(crate) trait WireFormat: Debug + Clone + Eq {
    /// Serializes the object into the PTP wire format.
    ///
    /// The buffer must be at least as long as the wire size of the object.
    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError>;

    /// Deserializes the object from the PTP wire format.
    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError>;
}

/// Errors that can occur while reading or writing a message
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum WireFormatError {
    #[cfg_attr(feature = "std", error("enum conversion failed"))]
    EnumConversionError,
    #[cfg_attr(feature = "std", error("a buffer is too short"))]
    BufferTooShort,
    #[cfg_attr(feature = "std", error("a container has insufficient capacity"))]
    CapacityError,
    #[cfg_attr(feature = "std", error("a nested invalid wireformat"))]
    Invalid,
}

impl From<arrayvec::CapacityError> for WireFormatError {
    fn from(_: arrayvec::CapacityError) -> Self {
        WireFormatError::CapacityError
    }
}

impl<T: num_enum::TryFromPrimitive> From<num_enum::TryFromPrimitiveError<T>> for WireFormatError {
    fn from(_: num_enum::TryFromPrimitiveError<T>) -> Self {
        WireFormatError::EnumConversionError
    }
}

/// Read a fixed size field at `offset`
pub(crate) fn read_array<const N: usize>(
    buffer: &[u8],
    offset: usize,
) -> Result<[u8; N], WireFormatError> {
    buffer
        .get(offset..offset + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(WireFormatError::BufferTooShort)
}

/// Borrow `len` bytes at `offset` for writing
pub(crate) fn write_slice(
    buffer: &mut [u8],
    offset: usize,
    len: usize,
) -> Result<&mut [u8], WireFormatError> {
    buffer
        .get_mut(offset..offset + len)
        .ok_or(WireFormatError::BufferTooShort)
}
