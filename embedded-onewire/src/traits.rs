use crate::{OneWireError, OneWireResult};

/// Status of the bus after a reset pulse.
pub trait OneWireStatus {
    /// Whether at least one device answered the reset with a presence pulse.
    fn presence(&self) -> bool;
    /// Whether the bus master detected a short circuit during the reset.
    fn shortcircuit(&self) -> bool;
}

/// Drive level of the bus between time slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerLevel {
    /// Resistive pull-up only.
    #[default]
    Normal,
    /// Strong pull-up, sustains parasite-powered devices during conversions.
    Strong,
}

/// Trait for 1-Wire communication.
/// This trait defines the basic operations required for 1-Wire communication, such as resetting the bus,
/// writing and reading bytes, and writing and reading bits.
pub trait OneWire {
    /// The status type returned by the reset operation.
    /// This type must implement the [OneWireStatus] trait.
    type Status: OneWireStatus;
    /// The error type returned by the operations of this trait.
    /// This type is used to indicate errors in the underlying hardware or communication.
    type BusError;

    /// Resets the 1-Wire bus and returns the status of the bus.
    ///
    /// # Errors
    /// This method returns an error if the reset operation fails.
    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Writes a byte to the 1-Wire bus, least significant bit first.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Reads a byte from the 1-Wire bus.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError>;

    /// Writes a single bit to the 1-Wire bus.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError>;

    /// Reads a single bit from the 1-Wire bus.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Generates three time slots used by the search algorithm: two read
    /// slots (id bit and its complement) and one write slot carrying the
    /// branch direction chosen by the bus master.
    ///
    /// # Returns
    /// `(id_bit, complement_bit, direction_taken)`.
    ///
    /// Bus masters without hardware support keep the default, which makes the
    /// search fall back to [read_bit](OneWire::read_bit) and [write_bit](OneWire::write_bit).
    fn read_triplet(&mut self, _direction: bool) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Switches the drive level of the bus.
    ///
    /// Bus masters without a strong pull-up keep the default.
    fn set_power_level(&mut self, _level: PowerLevel) -> OneWireResult<(), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Writes a byte and engages the strong pull-up right after its last bit.
    ///
    /// Masters that cannot supply a strong pull-up still write the byte.
    fn write_byte_power(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        self.write_byte(byte)?;
        match self.set_power_level(PowerLevel::Strong) {
            Ok(()) | Err(OneWireError::Unimplemented) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Exchanges one byte: every `1` bit is sent as a read slot and
    /// reports what the bus returned, every `0` bit is written.
    fn touch_byte(&mut self, byte: u8) -> OneWireResult<u8, Self::BusError> {
        let mut out = 0;
        for bit in 0..8 {
            let mask = 1 << bit;
            if byte & mask != 0 {
                if self.read_bit()? {
                    out |= mask;
                }
            } else {
                self.write_bit(false)?;
            }
        }
        Ok(out)
    }
}
