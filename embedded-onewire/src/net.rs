use core::fmt::Debug;

use crate::{
    Branch, CouplerCommand, OneWire, OneWireError, OneWireResult, OneWireSearch,
    OneWireSearchKind, OneWireStatus, PowerLevel, Rom, consts::ONEWIRE_MATCH_ROM_CMD,
};

/// Where a device search is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// The main bus, with every hub branch in its current state.
    Main,
    /// One output of a DS2409 hub. The branch is switched on with a smart-on
    /// command before every search step.
    Branch {
        /// Address of the hub.
        coupler: Rom,
        /// Output of the hub to search.
        branch: Branch,
    },
}

/// Network-level 1-Wire transport.
///
/// The transport remembers the address of the currently selected device.
/// It is updated by [search](OneWireNet::search) and [set_rom](OneWireNet::set_rom)
/// and used by [access](OneWireNet::access).
pub trait OneWireNet {
    /// Error reported by the underlying bus master.
    type BusError: Debug;

    /// Resets the bus. Returns `true` when at least one device answered with
    /// a presence pulse.
    fn reset(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Address of the currently selected device.
    fn rom(&self) -> Rom;

    /// Selects the device addressed by later calls to [access](OneWireNet::access).
    fn set_rom(&mut self, rom: Rom);

    /// Resets the bus and addresses the selected device with MATCH ROM.
    /// Returns `false` when nothing answered the reset.
    fn access(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Writes a byte.
    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Writes a byte and engages the strong pull-up right after it.
    fn write_byte_power(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Reads a byte.
    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError>;

    /// Exchanges a block in place. `0xff` bytes act as read slots and are
    /// replaced with what the device sent.
    fn block(&mut self, buf: &mut [u8]) -> OneWireResult<(), Self::BusError>;

    /// Switches the drive level of the bus.
    fn set_power_level(&mut self, level: PowerLevel) -> OneWireResult<(), Self::BusError>;

    /// Finds the next device in `scope`. With `restart`, or when the scope
    /// differs from the previous call, the search starts from the first device.
    ///
    /// A found device also becomes the selected device.
    fn search(
        &mut self,
        scope: SearchScope,
        restart: bool,
    ) -> OneWireResult<Option<Rom>, Self::BusError>;

    /// Sends a control command to the DS2409 hub at `coupler`.
    ///
    /// Returns `true` when the hub echoed the confirmation byte.
    fn switch_coupler(
        &mut self,
        coupler: Rom,
        cmd: CouplerCommand,
    ) -> OneWireResult<bool, Self::BusError>;
}

/// [OneWireNet] on top of a bit-level [OneWire] bus master.
#[derive(Debug)]
pub struct Network<T> {
    bus: T,
    rom: Rom,
    search: OneWireSearch,
    scope: SearchScope,
}

impl<T: OneWire> Network<T> {
    /// Wraps a bus master.
    pub fn new(bus: T) -> Self {
        Self {
            bus,
            rom: Rom::default(),
            search: OneWireSearch::new(OneWireSearchKind::Normal),
            scope: SearchScope::Main,
        }
    }

    /// Releases the bus master.
    pub fn into_inner(self) -> T {
        self.bus
    }

    /// Direct access to the bus master.
    pub fn bus_mut(&mut self) -> &mut T {
        &mut self.bus
    }
}

impl<T> Network<T>
where
    T: OneWire,
    T::BusError: Debug,
{
    fn match_rom(&mut self, rom: Rom) -> OneWireResult<bool, T::BusError> {
        if !OneWireNet::reset(self)? {
            return Ok(false);
        }
        self.bus.write_byte(ONEWIRE_MATCH_ROM_CMD)?;
        for &b in rom.bytes() {
            self.bus.write_byte(b)?;
        }
        Ok(true)
    }
}

impl<T> OneWireNet for Network<T>
where
    T: OneWire,
    T::BusError: Debug,
{
    type BusError = T::BusError;

    fn reset(&mut self) -> OneWireResult<bool, T::BusError> {
        match self.bus.reset() {
            Ok(status) if status.shortcircuit() => Err(OneWireError::ShortCircuit),
            Ok(status) => Ok(status.presence()),
            Err(OneWireError::NoDevicePresent) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn rom(&self) -> Rom {
        self.rom
    }

    fn set_rom(&mut self, rom: Rom) {
        self.rom = rom;
    }

    fn access(&mut self) -> OneWireResult<bool, T::BusError> {
        self.match_rom(self.rom)
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), T::BusError> {
        self.bus.write_byte(byte)
    }

    fn write_byte_power(&mut self, byte: u8) -> OneWireResult<(), T::BusError> {
        self.bus.write_byte_power(byte)
    }

    fn read_byte(&mut self) -> OneWireResult<u8, T::BusError> {
        self.bus.read_byte()
    }

    fn block(&mut self, buf: &mut [u8]) -> OneWireResult<(), T::BusError> {
        for b in buf.iter_mut() {
            *b = self.bus.touch_byte(*b)?;
        }
        Ok(())
    }

    fn set_power_level(&mut self, level: PowerLevel) -> OneWireResult<(), T::BusError> {
        match self.bus.set_power_level(level) {
            // nothing to release on a master without strong pull-up
            Err(OneWireError::Unimplemented) if level == PowerLevel::Normal => Ok(()),
            other => other,
        }
    }

    fn search(
        &mut self,
        scope: SearchScope,
        restart: bool,
    ) -> OneWireResult<Option<Rom>, T::BusError> {
        if restart || scope != self.scope {
            self.search.reset();
            self.scope = scope;
        }
        if self.search.exhausted() {
            return Ok(None);
        }
        let found = match scope {
            SearchScope::Main => self.search.next(&mut self.bus, true)?,
            SearchScope::Branch { coupler, branch } => {
                if !self.switch_coupler(coupler, branch.search_command())? {
                    return Err(OneWireError::CouplerNotConfirmed);
                }
                // the smart-on command already reset the branch
                self.search.next(&mut self.bus, false)?
            }
        };
        if let Some(rom) = found {
            self.rom = rom;
        }
        Ok(found)
    }

    fn switch_coupler(
        &mut self,
        coupler: Rom,
        cmd: CouplerCommand,
    ) -> OneWireResult<bool, T::BusError> {
        if !self.match_rom(coupler)? {
            return Ok(false);
        }
        self.bus.write_byte(cmd as u8)?;
        if cmd.is_smart() {
            // reset stimulus, answered with the branch presence byte
            self.bus.touch_byte(0xff)?;
        }
        let confirm = self.bus.touch_byte(0xff)?;
        Ok(confirm == cmd as u8)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::{Network, OneWireNet, SearchScope};
    use crate::search::tests::{Presence, WiredAnd, rom_with_crc};
    use crate::{Branch, CouplerCommand, OneWire, OneWireResult, Rom};
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Byte-level bus that logs what is written and replays scripted replies.
    struct Script {
        present: bool,
        written: Vec<u8>,
        replies: VecDeque<u8>,
    }

    impl OneWire for Script {
        type Status = Presence;
        type BusError = ();

        fn reset(&mut self) -> OneWireResult<Presence, ()> {
            Ok(Presence(self.present))
        }

        fn write_byte(&mut self, byte: u8) -> OneWireResult<(), ()> {
            self.written.push(byte);
            Ok(())
        }

        fn read_byte(&mut self) -> OneWireResult<u8, ()> {
            Ok(self.replies.pop_front().unwrap_or(0xff))
        }

        fn write_bit(&mut self, _bit: bool) -> OneWireResult<(), ()> {
            Ok(())
        }

        fn read_bit(&mut self) -> OneWireResult<bool, ()> {
            Ok(true)
        }

        fn touch_byte(&mut self, byte: u8) -> OneWireResult<u8, ()> {
            self.written.push(byte);
            Ok(self.replies.pop_front().unwrap_or(0xff) & byte)
        }
    }

    const HUB: Rom = Rom::new([0x1f, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);

    fn script(replies: &[u8]) -> Network<Script> {
        Network::new(Script {
            present: true,
            written: Vec::new(),
            replies: replies.iter().copied().collect(),
        })
    }

    #[test]
    fn access_sends_match_rom() {
        let mut net = script(&[]);
        net.set_rom(HUB);
        assert!(net.access().unwrap());
        let mut expected = std::vec![0x55];
        expected.extend_from_slice(HUB.bytes());
        assert_eq!(net.bus_mut().written, expected);
    }

    #[test]
    fn access_without_presence_fails() {
        let mut net = script(&[]);
        net.bus_mut().present = false;
        assert!(!net.access().unwrap());
        assert!(net.bus_mut().written.is_empty());
    }

    #[test]
    fn smart_on_reads_presence_then_confirmation() {
        let mut net = script(&[0x00, 0x33]);
        assert!(net.switch_coupler(HUB, CouplerCommand::SmartOnAux).unwrap());
        let written = &net.bus_mut().written;
        assert_eq!(&written[9..], &[0x33, 0xff, 0xff]);
    }

    #[test]
    fn direct_command_needs_matching_confirmation() {
        let mut net = script(&[0xa5]);
        assert!(net.switch_coupler(HUB, CouplerCommand::DirectMainOn).unwrap());
        let mut net = script(&[0x5a]);
        assert!(!net.switch_coupler(HUB, CouplerCommand::AllLinesOff).unwrap());
    }

    #[test]
    fn block_replaces_read_slots() {
        let mut net = script(&[0x00, 0x12, 0x34]);
        let mut buf = [0xbe, 0xff, 0xff];
        net.block(&mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x12, 0x34]);
    }

    #[test]
    fn main_search_selects_found_device() {
        let roms = std::vec![rom_with_crc(0x28, 0x05), rom_with_crc(0x10, 0x06)];
        let mut net = Network::new(WiredAnd::new(roms.clone()));
        let mut found = Vec::new();
        let mut restart = true;
        while let Some(rom) = net.search(SearchScope::Main, restart).unwrap() {
            assert_eq!(net.rom(), rom);
            found.push(rom);
            restart = false;
        }
        assert_eq!(found.len(), 2);
        // a restart starts over
        assert!(net.search(SearchScope::Main, true).unwrap().is_some());
    }

    #[test]
    fn branch_search_fails_on_silent_hub() {
        let mut net = script(&[]);
        let scope = SearchScope::Branch { coupler: HUB, branch: Branch::Main };
        assert!(net.search(scope, true).is_err());
    }
}
