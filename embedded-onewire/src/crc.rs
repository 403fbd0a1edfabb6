/// Calculate CRC-8 used in 1-Wire communications.
///
/// Reflected polynomial `0x8c` (x⁸ + x⁵ + x⁴ + 1). Running a block whose last
/// byte is the CRC of the preceding bytes through the engine leaves `0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OneWireCrc(u8);

impl OneWireCrc {
    /// Creates an engine with a zero accumulator.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Get the current CRC value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Update the CRC with the incoming byte.
    #[cfg(not(feature = "crc-table"))]
    pub fn update(&mut self, byte: u8) {
        self.0 = dallas_round(self.0 ^ byte);
    }

    /// Update the CRC with the incoming byte.
    #[cfg(feature = "crc-table")]
    pub fn update(&mut self, byte: u8) {
        self.0 = DALLAS_TABLE[(self.0 ^ byte) as usize];
    }

    /// Feeds every byte of `bytes` and returns the accumulator.
    pub fn checksum(bytes: &[u8]) -> u8 {
        let mut crc = OneWireCrc::new();
        for &byte in bytes {
            crc.update(byte);
        }
        crc.0
    }

    /// Validate a sequence of bytes where the last byte is the 1-Wire CRC of
    /// the previous bytes.
    pub fn validate(sequence: &[u8]) -> bool {
        Self::checksum(sequence) == 0x0
    }
}

const fn dallas_round(mut crc: u8) -> u8 {
    let mut i = 0;
    while i < 8 {
        if crc & 0x1 == 0x1 {
            crc = (crc >> 1) ^ 0x8c;
        } else {
            crc >>= 1;
        }
        i += 1;
    }
    crc
}

#[cfg(feature = "crc-table")]
const DALLAS_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = dallas_round(i as u8);
        i += 1;
    }
    table
};

/// CRC-8 with the non-reflected polynomial `0x31` (x⁸ + x⁵ + x⁴ + 1),
/// processed most significant bit first.
///
/// Sensirion SHT humidity sensors protect their measurement words with it.
/// SHT2x parts checksum the two data bytes from a zero seed. SHT1x/SHT7x
/// parts seed the accumulator with the measurement command and transmit the
/// result bit-reversed, see [reverse8].
#[derive(Debug, Default, Clone, Copy)]
pub struct ShtCrc(u8);

impl ShtCrc {
    /// Creates an engine with a zero accumulator.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Creates an engine that has already consumed `command`.
    pub const fn seeded(command: u8) -> Self {
        Self(Self::round(0, command))
    }

    /// One round of the CRC: `acc ^= byte`, then eight shift/xor steps.
    pub const fn round(acc: u8, byte: u8) -> u8 {
        let mut acc = acc ^ byte;
        let mut i = 0;
        while i < 8 {
            if acc & 0x80 != 0 {
                acc = (acc << 1) ^ 0x31;
            } else {
                acc <<= 1;
            }
            i += 1;
        }
        acc
    }

    /// Update the CRC with the incoming byte.
    pub fn update(&mut self, byte: u8) {
        self.0 = Self::round(self.0, byte);
    }

    /// Get the current CRC value
    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Reverses the bit order of a byte.
pub const fn reverse8(v: u8) -> u8 {
    v.reverse_bits()
}
