//! In-memory model of the sensor network.
//!
//! Sensors on the main bus come first in the flat index space, followed by
//! the devices of every hub in insertion order: main branch, then aux branch.
//! Discovery, the persisted topology file and sensor lookup all go through
//! [Topology::iter] and [Topology::locate], so they cannot disagree.

use std::collections::TryReserveError;

use embedded_onewire::{Branch, Rom};

/// A DS2409 hub on the main bus and the devices behind its two outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coupler {
    /// Address of the hub itself.
    pub rom: Rom,
    /// Devices on the main output.
    pub main: Vec<Rom>,
    /// Devices on the auxiliary output.
    pub aux: Vec<Rom>,
}

impl Coupler {
    pub fn new(rom: Rom) -> Self {
        Self {
            rom,
            main: Vec::new(),
            aux: Vec::new(),
        }
    }

    pub fn branch(&self, branch: Branch) -> &[Rom] {
        match branch {
            Branch::Main => &self.main,
            Branch::Aux => &self.aux,
        }
    }

    fn branch_mut(&mut self, branch: Branch) -> &mut Vec<Rom> {
        match branch {
            Branch::Main => &mut self.main,
            Branch::Aux => &mut self.aux,
        }
    }

    /// Number of devices behind both outputs.
    pub fn len(&self) -> usize {
        self.main.len() + self.aux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Physical position of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Position in the main bus sensor list.
    Main(usize),
    /// Position on one output of a hub.
    Branch {
        /// Index of the hub in [Topology::couplers].
        coupler: usize,
        branch: Branch,
        position: usize,
    },
}

/// One entry of the flat index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub index: usize,
    pub rom: Rom,
    pub location: Location,
}

/// The sensor network: main bus sensors plus hubs with their branch devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub sensors: Vec<Rom>,
    pub couplers: Vec<Coupler>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of devices in the flat index space. Hubs do not count.
    pub fn len(&self) -> usize {
        self.sensors.len() + self.couplers.iter().map(Coupler::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of devices reached through hubs.
    pub fn branch_len(&self) -> usize {
        self.len() - self.sensors.len()
    }

    /// Maps a flat index to the position of the device.
    pub fn locate(&self, index: usize) -> Option<Location> {
        if index < self.sensors.len() {
            return Some(Location::Main(index));
        }
        let mut rest = index - self.sensors.len();
        for (coupler, node) in self.couplers.iter().enumerate() {
            for branch in [Branch::Main, Branch::Aux] {
                let devices = node.branch(branch);
                if rest < devices.len() {
                    return Some(Location::Branch {
                        coupler,
                        branch,
                        position: rest,
                    });
                }
                rest -= devices.len();
            }
        }
        None
    }

    /// Address of the device at `location`.
    pub fn rom_at(&self, location: Location) -> Option<Rom> {
        match location {
            Location::Main(position) => self.sensors.get(position).copied(),
            Location::Branch {
                coupler,
                branch,
                position,
            } => self
                .couplers
                .get(coupler)?
                .branch(branch)
                .get(position)
                .copied(),
        }
    }

    /// Address of the device with flat index `index`.
    pub fn get(&self, index: usize) -> Option<Rom> {
        self.rom_at(self.locate(index)?)
    }

    /// Every device in flat index order.
    pub fn iter(&self) -> impl Iterator<Item = Entry> + '_ {
        let main = self
            .sensors
            .iter()
            .enumerate()
            .map(|(position, &rom)| (rom, Location::Main(position)));
        let branches = self
            .couplers
            .iter()
            .enumerate()
            .flat_map(|(coupler, node)| {
                [Branch::Main, Branch::Aux].into_iter().flat_map(move |branch| {
                    node.branch(branch)
                        .iter()
                        .enumerate()
                        .map(move |(position, &rom)| {
                            (
                                rom,
                                Location::Branch {
                                    coupler,
                                    branch,
                                    position,
                                },
                            )
                        })
                })
            });
        main.chain(branches)
            .enumerate()
            .map(|(index, (rom, location))| Entry {
                index,
                rom,
                location,
            })
    }

    /// Appends a main bus sensor.
    pub fn push_sensor(&mut self, rom: Rom) -> Result<(), TryReserveError> {
        self.sensors.try_reserve(1)?;
        self.sensors.push(rom);
        Ok(())
    }

    /// Appends a hub and returns its index.
    pub fn push_coupler(&mut self, rom: Rom) -> Result<usize, TryReserveError> {
        self.couplers.try_reserve(1)?;
        self.couplers.push(Coupler::new(rom));
        Ok(self.couplers.len() - 1)
    }

    /// Appends a device to one output of the hub at `coupler`.
    ///
    /// Returns `Ok(false)` when there is no such hub.
    pub fn push_branch(
        &mut self,
        coupler: usize,
        branch: Branch,
        rom: Rom,
    ) -> Result<bool, TryReserveError> {
        let Some(node) = self.couplers.get_mut(coupler) else {
            return Ok(false);
        };
        let devices = node.branch_mut(branch);
        devices.try_reserve(1)?;
        devices.push(rom);
        Ok(true)
    }

    /// Drops every device and hub.
    pub fn clear(&mut self) {
        self.sensors.clear();
        self.couplers.clear();
    }
}
