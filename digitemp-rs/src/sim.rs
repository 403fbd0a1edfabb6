//! Simulated 1-Wire network for tests.
//!
//! Devices live on the main bus or behind one output of a hub. Only one hub
//! output is connected at a time, and a connected output also exposes its
//! devices to main bus searches. Read blocks and read bytes are replayed from
//! per-device scripts; everything written to the bus is logged.

use std::collections::{HashMap, VecDeque};

use embedded_onewire::{
    Branch, CouplerCommand, OneWireError, OneWireNet, OneWireResult, PowerLevel, Rom,
    SearchScope,
};

#[derive(Debug, Default)]
struct Device {
    blocks: VecDeque<Vec<u8>>,
    bytes: VecDeque<u8>,
}

#[derive(Debug, Default)]
struct Hub {
    main: Vec<Rom>,
    aux: Vec<Rom>,
    broken: bool,
}

#[derive(Debug, Default)]
pub(crate) struct SimNet {
    main: Vec<Rom>,
    hubs: HashMap<Rom, Hub>,
    devices: HashMap<Rom, Device>,
    silent: Vec<Rom>,
    active: Option<(Rom, Branch)>,
    selected: Rom,
    addressed: Option<Rom>,
    pending: VecDeque<Rom>,
    scope: Option<SearchScope>,
    pub(crate) commands: Vec<(Rom, CouplerCommand)>,
    pub(crate) written: Vec<u8>,
    pub(crate) power: Vec<PowerLevel>,
    /// Strong pull-up writes fail.
    pub(crate) power_fails: bool,
    pub(crate) resets: usize,
}

impl SimNet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_device(mut self, rom: Rom) -> Self {
        self.main.push(rom);
        self
    }

    pub(crate) fn with_hub(mut self, rom: Rom) -> Self {
        self.main.push(rom);
        self.hubs.insert(rom, Hub::default());
        self
    }

    pub(crate) fn with_branch_device(mut self, hub: Rom, branch: Branch, rom: Rom) -> Self {
        let node = self.hubs.entry(hub).or_default();
        match branch {
            Branch::Main => node.main.push(rom),
            Branch::Aux => node.aux.push(rom),
        }
        self
    }

    /// Makes every command to `hub` go unconfirmed.
    pub(crate) fn break_hub(&mut self, hub: Rom) {
        if let Some(node) = self.hubs.get_mut(&hub) {
            node.broken = true;
        }
    }

    /// Makes `rom` ignore every MATCH ROM.
    pub(crate) fn silence(&mut self, rom: Rom) {
        self.silent.push(rom);
    }

    /// Queues a reply to the next block exchanged with `rom`.
    pub(crate) fn script_block(&mut self, rom: Rom, block: &[u8]) {
        self.devices.entry(rom).or_default().blocks.push_back(block.to_vec());
    }

    /// Queues bytes returned by [read_byte](OneWireNet::read_byte) while `rom` is addressed.
    pub(crate) fn script_bytes(&mut self, rom: Rom, bytes: &[u8]) {
        self.devices.entry(rom).or_default().bytes.extend(bytes);
    }

    /// Number of times `byte` was written to the bus.
    pub(crate) fn count_written(&self, byte: u8) -> usize {
        self.written.iter().filter(|&&b| b == byte).count()
    }

    pub(crate) fn active(&self) -> Option<(Rom, Branch)> {
        self.active
    }

    fn reachable(&self, rom: Rom) -> bool {
        if self.silent.contains(&rom) {
            return false;
        }
        self.main.contains(&rom) || self.connected().contains(&rom)
    }

    fn connected(&self) -> Vec<Rom> {
        match self.active {
            Some((hub, branch)) => self
                .hubs
                .get(&hub)
                .map(|node| match branch {
                    Branch::Main => node.main.clone(),
                    Branch::Aux => node.aux.clone(),
                })
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }
}

impl OneWireNet for SimNet {
    type BusError = ();

    fn reset(&mut self) -> OneWireResult<bool, ()> {
        self.resets += 1;
        self.addressed = None;
        Ok(!self.main.is_empty())
    }

    fn rom(&self) -> Rom {
        self.selected
    }

    fn set_rom(&mut self, rom: Rom) {
        self.selected = rom;
    }

    fn access(&mut self) -> OneWireResult<bool, ()> {
        self.reset()?;
        if self.reachable(self.selected) {
            self.addressed = Some(self.selected);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), ()> {
        self.written.push(byte);
        Ok(())
    }

    fn write_byte_power(&mut self, byte: u8) -> OneWireResult<(), ()> {
        if self.power_fails {
            return Err(OneWireError::Other(()));
        }
        self.written.push(byte);
        self.power.push(PowerLevel::Strong);
        Ok(())
    }

    fn read_byte(&mut self) -> OneWireResult<u8, ()> {
        let byte = self
            .addressed
            .and_then(|rom| self.devices.get_mut(&rom))
            .and_then(|dev| dev.bytes.pop_front())
            .unwrap_or(0xff);
        Ok(byte)
    }

    fn block(&mut self, buf: &mut [u8]) -> OneWireResult<(), ()> {
        self.written.extend_from_slice(buf);
        let reply = self
            .addressed
            .and_then(|rom| self.devices.get_mut(&rom))
            .and_then(|dev| dev.blocks.pop_front());
        if let Some(reply) = reply {
            for (b, r) in buf.iter_mut().zip(reply) {
                *b = r;
            }
        }
        Ok(())
    }

    fn set_power_level(&mut self, level: PowerLevel) -> OneWireResult<(), ()> {
        self.power.push(level);
        Ok(())
    }

    fn search(&mut self, scope: SearchScope, restart: bool) -> OneWireResult<Option<Rom>, ()> {
        if let SearchScope::Branch { coupler, branch } = scope {
            if !self.switch_coupler(coupler, branch.search_command())? {
                return Err(embedded_onewire::OneWireError::CouplerNotConfirmed);
            }
        }
        if restart || self.scope != Some(scope) {
            self.scope = Some(scope);
            self.pending = match scope {
                SearchScope::Main => {
                    let mut all = self.main.clone();
                    all.extend(self.connected());
                    all.into()
                }
                SearchScope::Branch { .. } => self.connected().into(),
            };
        }
        let found = self.pending.pop_front();
        if let Some(rom) = found {
            self.selected = rom;
        }
        Ok(found)
    }

    fn switch_coupler(&mut self, coupler: Rom, cmd: CouplerCommand) -> OneWireResult<bool, ()> {
        self.commands.push((coupler, cmd));
        self.reset()?;
        let Some(node) = self.hubs.get(&coupler) else {
            return Ok(false);
        };
        if node.broken || !self.main.contains(&coupler) {
            return Ok(false);
        }
        self.active = match cmd {
            CouplerCommand::AllLinesOff | CouplerCommand::Discharge => match self.active {
                Some((hub, _)) if hub == coupler => None,
                other => other,
            },
            CouplerCommand::DirectMainOn | CouplerCommand::SmartOnMain => {
                Some((coupler, Branch::Main))
            }
            CouplerCommand::SmartOnAux => Some((coupler, Branch::Aux)),
        };
        Ok(true)
    }
}

/// Address with a valid CRC.
pub(crate) fn rom(family: u8, serial: u8) -> Rom {
    let mut bytes = [family, serial, 0x34, 0x12, 0, 0, 0, 0];
    bytes[7] = embedded_onewire::OneWireCrc::checksum(&bytes[..7]);
    Rom::new(bytes)
}

/// Appends the Dallas CRC of `data[1..]` to a read block.
pub(crate) fn with_crc(data: &[u8]) -> Vec<u8> {
    let mut block = data.to_vec();
    block.push(embedded_onewire::OneWireCrc::checksum(&data[1..]));
    block
}
