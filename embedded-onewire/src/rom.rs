use crate::OneWireCrc;
use core::fmt;

/// The 64-bit registration number of a 1-Wire device.
///
/// | Byte | Description |
/// |------|-------------|
/// | 0 | Family code (e.g., 0x28 for DS18B20) |
/// | 1-6 | Serial number |
/// | 7 | CRC-8 of bytes 0-6 |
///
/// Displayed as 16 upper-case hex digits in bus order, the format used in
/// log lines and database rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Rom([u8; 8]);

impl Rom {
    /// Creates an address from its bytes in bus order.
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Family code of the device.
    pub const fn family(&self) -> u8 {
        self.0[0]
    }

    /// The address bytes in bus order.
    pub const fn bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Whether byte 7 is the CRC of the first seven bytes.
    pub fn crc_valid(&self) -> bool {
        OneWireCrc::validate(&self.0)
    }
}

impl From<[u8; 8]> for Rom {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl From<Rom> for [u8; 8] {
    fn from(rom: Rom) -> Self {
        rom.0
    }
}

impl From<u64> for Rom {
    fn from(value: u64) -> Self {
        Self(value.to_le_bytes())
    }
}

impl From<Rom> for u64 {
    fn from(rom: Rom) -> Self {
        u64::from_le_bytes(rom.0)
    }
}

impl fmt::Display for Rom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}
