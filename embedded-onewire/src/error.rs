use core::fmt;

/// One wire communication error type.
#[derive(Debug)]
pub enum OneWireError<E> {
    /// Encapsulates the error type from the underlying hardware.
    Other(E),
    /// Indicates that no device is present on the bus.
    NoDevicePresent,
    /// Indicates that a short circuit was detected on the bus.
    ShortCircuit,
    /// Indicates that the operation is not implemented, such as reading a triplet when not supported.
    Unimplemented,
    /// Computed CRC of a ROM or data block is invalid.
    InvalidCrc,
    /// A DS2409 coupler did not echo the confirmation byte of a branch command.
    CouplerNotConfirmed,
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::Other(other)
    }
}

impl<E: fmt::Debug> fmt::Display for OneWireError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(e) => write!(f, "bus master error: {e:?}"),
            Self::NoDevicePresent => f.write_str("no device present on the bus"),
            Self::ShortCircuit => f.write_str("short circuit on the bus"),
            Self::Unimplemented => f.write_str("operation not supported by the bus master"),
            Self::InvalidCrc => f.write_str("CRC check failed"),
            Self::CouplerNotConfirmed => f.write_str("coupler did not confirm the branch command"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for OneWireError<E> {}
