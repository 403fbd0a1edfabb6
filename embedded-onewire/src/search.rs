use crate::{
    OneWire, OneWireError, OneWireStatus, Rom,
    consts::{ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_SEARCH_CMD},
    crc::OneWireCrc,
};

/// State of the search for devices on a 1-Wire bus.
///
/// The state does not borrow the bus, so other commands (for example DS2409
/// branch switching) may be issued between two calls to
/// [next](OneWireSearch::next).
#[derive(Debug, Clone)]
pub struct OneWireSearch {
    cmd: u8,
    last_device: bool,
    last_discrepancy: u8,
    last_family_discrepancy: u8,
    family: u8,
    rom: [u8; 8],
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Type of search performed using [`OneWireSearch`].
pub enum OneWireSearchKind {
    /// Normal search
    Normal = ONEWIRE_SEARCH_CMD,
    /// Search only for devicess with alarm
    Alarmed = ONEWIRE_CONDITIONAL_SEARCH_CMD,
}

impl OneWireSearch {
    /// Creates a new [`OneWireSearch`] instance.
    pub fn new(cmd: OneWireSearchKind) -> Self {
        Self::with_family(cmd, 0)
    }

    /// Creates a new [`OneWireSearch`] that only reports devices of `family`.
    pub fn with_family(cmd: OneWireSearchKind, family: u8) -> Self {
        let mut search = Self {
            cmd: cmd as _,
            last_device: false,
            last_discrepancy: 0,
            last_family_discrepancy: 0,
            family,
            rom: [0; 8],
        };
        search.reset();
        search
    }

    /// Resets the search state so the next call starts from the first device.
    pub fn reset(&mut self) {
        self.last_device = false;
        self.last_family_discrepancy = 0;
        self.rom = [self.family, 0, 0, 0, 0, 0, 0, 0];
        // a targeted search follows the family bits for the whole first pass
        self.last_discrepancy = if self.family != 0 { 64 } else { 0 };
    }

    /// Whether the last device has already been reported.
    pub fn exhausted(&self) -> bool {
        self.last_device
    }

    /// Finds the next device on the bus.
    ///
    /// When `bus_reset` is false the search command is sent without a reset
    /// pulse first. This is required on a DS2409 branch, where the smart-on
    /// command already reset the branch and a main bus reset would disconnect it.
    ///
    /// Returns `None` once every device has been reported, or when nothing
    /// answers the reset.
    #[allow(clippy::should_implement_trait)]
    pub fn next<T: OneWire>(
        &mut self,
        onewire: &mut T,
        bus_reset: bool,
    ) -> Result<Option<Rom>, OneWireError<T::BusError>> {
        if self.last_device {
            return Ok(None);
        }
        if bus_reset {
            let status = match onewire.reset() {
                Ok(status) => status,
                Err(OneWireError::NoDevicePresent) => {
                    self.last_device = true;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            if status.shortcircuit() {
                return Err(OneWireError::ShortCircuit);
            }
            if !status.presence() {
                self.last_device = true;
                return Ok(None);
            }
        }
        let mut id_bit_num: u8 = 1;
        let mut last_zero: u8 = 0;
        let mut idx: usize = 0;
        let mut rom_mask: u8 = 1;
        onewire.write_byte(self.cmd)?;
        let res = loop {
            let dir = if id_bit_num < self.last_discrepancy {
                self.rom[idx] & rom_mask > 0
            } else {
                id_bit_num == self.last_discrepancy
            };
            // Use the triplet slot if the master has one, otherwise read both
            // bits and write the chosen direction afterwards.
            let (id_bit, complement_bit, write) = match onewire.read_triplet(dir) {
                Ok(triplet) => (triplet.0, triplet.1, false),
                Err(OneWireError::Unimplemented) => {
                    let id_bit = onewire.read_bit()?;
                    let complement_bit = onewire.read_bit()?;
                    (id_bit, complement_bit, true)
                }
                Err(e) => return Err(e),
            };
            if id_bit && complement_bit {
                // nobody answered
                break false;
            }
            let set = if id_bit != complement_bit {
                id_bit
            } else {
                if !dir {
                    last_zero = id_bit_num;
                    if last_zero < 9 {
                        self.last_family_discrepancy = last_zero;
                    }
                }
                dir
            };
            if set {
                self.rom[idx] |= rom_mask;
            } else {
                self.rom[idx] &= !rom_mask;
            }

            if write {
                onewire.write_bit(set)?;
            }

            id_bit_num += 1;
            rom_mask <<= 1;

            if rom_mask == 0 {
                idx += 1;
                rom_mask = 1;
            }
            if id_bit_num > 64 {
                self.last_discrepancy = last_zero;
                self.last_device = self.last_discrepancy == 0;
                break true;
            }
        };

        if !res || self.rom[0] == 0 {
            self.last_device = true;
            return Ok(None);
        }
        if !OneWireCrc::validate(&self.rom) {
            return Err(OneWireError::InvalidCrc);
        }
        if self.family != 0 && self.rom[0] != self.family {
            self.last_device = true;
            return Ok(None);
        }
        Ok(Some(Rom::new(self.rom)))
    }
}
