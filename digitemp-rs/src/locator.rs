//! Device location and network discovery.
//!
//! Only one hub output can be connected at a time. The [Locator] remembers
//! which one it last switched on and only talks to a hub when the next device
//! lives behind a different output.

use embedded_onewire::{Branch, CouplerCommand, OneWireError, OneWireNet, Rom, SearchScope};

use crate::error::Error;
use crate::family::Family;
use crate::topology::{Location, Topology};

/// The hub output switched on last, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchCache(Option<(Rom, Branch)>);

impl BranchCache {
    pub fn get(&self) -> Option<(Rom, Branch)> {
        self.0
    }

    pub fn is_active(&self, coupler: Rom, branch: Branch) -> bool {
        self.0 == Some((coupler, branch))
    }

    fn set(&mut self, coupler: Rom, branch: Branch) {
        self.0 = Some((coupler, branch));
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }
}

/// Resolves flat indices to devices and builds topologies from the bus.
#[derive(Debug, Default)]
pub struct Locator {
    cache: BranchCache,
}

impl Locator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> BranchCache {
        self.cache
    }

    /// Forgets the active hub output, forcing a switch on the next branch device.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// Selects the device with flat index `index`, connecting its hub output
    /// first when needed.
    pub fn resolve<N: OneWireNet>(
        &mut self,
        net: &mut N,
        topo: &Topology,
        index: usize,
    ) -> Result<Rom, Error<N::BusError>> {
        let out_of_range = || Error::IndexOutOfRange {
            index,
            total: topo.len(),
        };
        let location = topo.locate(index).ok_or_else(out_of_range)?;
        let rom = topo.rom_at(location).ok_or_else(out_of_range)?;

        if let Location::Branch {
            coupler, branch, ..
        } = location
        {
            let hub = topo.couplers[coupler].rom;
            if !self.cache.is_active(hub, branch) {
                self.switch(net, hub, branch)?;
            }
        }
        net.set_rom(rom);
        Ok(rom)
    }

    fn switch<N: OneWireNet>(
        &mut self,
        net: &mut N,
        hub: Rom,
        branch: Branch,
    ) -> Result<(), Error<N::BusError>> {
        log::debug!("switching {hub} to its {branch} output");
        match net.switch_coupler(hub, branch.select_command()) {
            Ok(true) => {
                self.cache.set(hub, branch);
                Ok(())
            }
            Ok(false) => {
                self.cache.clear();
                Err(Error::CouplerSwitch {
                    coupler: hub,
                    branch,
                })
            }
            Err(e) => {
                self.cache.clear();
                Err(e.into())
            }
        }
    }

    /// Builds the topology from scratch.
    ///
    /// Every hub is switched off before the main bus is classified, so no
    /// branch device shows up as a main bus sensor. Hubs behind hubs are not
    /// descended into.
    pub fn discover<N: OneWireNet>(&mut self, net: &mut N) -> Result<Topology, Error<N::BusError>> {
        let result = build(net);
        self.cache.clear();
        result
    }

    /// Lists every device on the bus, supported or not. Hubs appear both in
    /// [Topology::sensors] and in [Topology::couplers].
    pub fn walk<N: OneWireNet>(&mut self, net: &mut N) -> Result<Topology, Error<N::BusError>> {
        let result = list(net);
        self.cache.clear();
        result
    }

    /// Switches every hub of `topo` off. Failures are logged.
    pub fn release<N: OneWireNet>(&mut self, net: &mut N, topo: &Topology) {
        for coupler in &topo.couplers {
            turn_off(net, coupler.rom);
        }
        self.cache.clear();
    }
}

fn build<N: OneWireNet>(net: &mut N) -> Result<Topology, Error<N::BusError>> {
    all_lines_off(net)?;

    let mut topo = Topology::new();
    for rom in enumerate(net, SearchScope::Main)? {
        match Family::of(rom) {
            Some(Family::Ds2409) => {
                topo.push_coupler(rom)?;
            }
            Some(_) => topo.push_sensor(rom)?,
            None => log::debug!("skipping unsupported device {rom}"),
        }
    }

    for idx in 0..topo.couplers.len() {
        let hub = topo.couplers[idx].rom;
        for branch in [Branch::Main, Branch::Aux] {
            for rom in enumerate_branch(net, hub, branch)? {
                match Family::of(rom) {
                    Some(family) if family.is_sensor() => {
                        topo.push_branch(idx, branch, rom)?;
                    }
                    Some(_) => log::info!("hub {rom} behind {hub} is not searched"),
                    None => log::debug!("skipping unsupported device {rom}"),
                }
            }
        }
        turn_off(net, hub);
    }
    log::info!(
        "found {} sensors on the main bus and {} behind {} hubs",
        topo.sensors.len(),
        topo.branch_len(),
        topo.couplers.len()
    );
    Ok(topo)
}

fn list<N: OneWireNet>(net: &mut N) -> Result<Topology, Error<N::BusError>> {
    all_lines_off(net)?;
    let mut topo = Topology::new();
    for rom in enumerate(net, SearchScope::Main)? {
        topo.push_sensor(rom)?;
        if Family::of(rom) == Some(Family::Ds2409) {
            topo.push_coupler(rom)?;
        }
    }
    for idx in 0..topo.couplers.len() {
        let hub = topo.couplers[idx].rom;
        for branch in [Branch::Main, Branch::Aux] {
            for rom in enumerate_branch(net, hub, branch)? {
                topo.push_branch(idx, branch, rom)?;
            }
        }
        turn_off(net, hub);
    }
    Ok(topo)
}

/// Every device answering a search in `scope`.
fn enumerate<N: OneWireNet>(
    net: &mut N,
    scope: SearchScope,
) -> Result<Vec<Rom>, Error<N::BusError>> {
    let mut found = Vec::new();
    let mut restart = true;
    while let Some(rom) = net.search(scope, restart)? {
        restart = false;
        found.try_reserve(1)?;
        found.push(rom);
    }
    Ok(found)
}

fn enumerate_branch<N: OneWireNet>(
    net: &mut N,
    coupler: Rom,
    branch: Branch,
) -> Result<Vec<Rom>, Error<N::BusError>> {
    enumerate(net, SearchScope::Branch { coupler, branch }).map_err(|e| match e {
        Error::Bus(OneWireError::CouplerNotConfirmed) => Error::CouplerSwitch { coupler, branch },
        other => other,
    })
}

/// Switches off every hub found on the main bus.
fn all_lines_off<N: OneWireNet>(net: &mut N) -> Result<(), Error<N::BusError>> {
    let hubs: Vec<Rom> = enumerate(net, SearchScope::Main)?
        .into_iter()
        .filter(|&rom| Family::of(rom) == Some(Family::Ds2409))
        .collect();
    for hub in hubs {
        if !net.switch_coupler(hub, CouplerCommand::AllLinesOff)? {
            return Err(Error::CouplerOff(hub));
        }
    }
    Ok(())
}

fn turn_off<N: OneWireNet>(net: &mut N, hub: Rom) {
    match net.switch_coupler(hub, CouplerCommand::AllLinesOff) {
        Ok(true) => {}
        Ok(false) => log::warn!("hub {hub} did not confirm all lines off"),
        Err(e) => log::warn!("turning off hub {hub} failed: {e}"),
    }
}
