//! An acquisition run over one bus.

use std::path::Path;

use chrono::{DateTime, Local};
use embedded_hal::delay::DelayNs;
use embedded_onewire::{Branch, OneWireNet};

use crate::error::{AcquireError, Error};
use crate::family::{self, Acquisition, Options, device_name};
use crate::locator::Locator;
use crate::rcfile;
use crate::settings::Settings;
use crate::sink::Sink;
use crate::topology::Topology;

/// What to read in each pass, and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampling {
    /// A single sensor to read.
    pub sensor: Option<usize>,
    /// Read every sensor.
    pub all: bool,
    /// Number of passes, 0 for no end.
    pub passes: u32,
    /// Seconds between pass starts.
    pub interval_s: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            sensor: None,
            all: true,
            passes: 1,
            interval_s: 0,
        }
    }
}

/// Owns the bus, the topology and the output for the length of a run.
pub struct Session<N, D> {
    net: N,
    delay: D,
    settings: Settings,
    topology: Topology,
    locator: Locator,
    sink: Sink,
    options: Options,
    quiet: bool,
    clock: fn() -> DateTime<Local>,
}

impl<N: OneWireNet, D: DelayNs> Session<N, D> {
    pub fn new(net: N, delay: D, settings: Settings, sink: Sink) -> Self {
        let options = Options {
            read_time_ms: settings.read_time_ms,
            ..Options::default()
        };
        Self {
            net,
            delay,
            settings,
            topology: Topology::new(),
            locator: Locator::new(),
            sink,
            options,
            quiet: false,
            clock: Local::now,
        }
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Reads the DS2438 as an A/D converter and the DS28EA00 as a PIO.
    pub fn with_ad_mode(mut self, ad_mode: bool) -> Self {
        self.options.ad_mode = ad_mode;
        self
    }

    /// Prints every scratchpad read.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.options.verbose = verbose;
        self
    }

    /// Leaves out listing headers.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.clock = clock;
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sink_mut(&mut self) -> &mut Sink {
        &mut self.sink
    }

    pub fn net_mut(&mut self) -> &mut N {
        &mut self.net
    }

    /// Reads sensor `index` and records the outcome. A failed read is
    /// recorded too, as is a sensor behind a hub that cannot be switched or
    /// a bus that fails while addressing it. Only a bad index and output
    /// problems are errors.
    pub fn read_sensor(&mut self, index: usize) -> Result<(), Error<N::BusError>> {
        let acquisition = match self.locator.resolve(&mut self.net, &self.topology, index) {
            Ok(rom) => family::acquire(&mut self.net, &mut self.delay, self.options, rom),
            Err(e @ (Error::CouplerSwitch { .. } | Error::Bus(_))) => {
                log::error!("sensor {index}: {e}");
                let Some(rom) = self.topology.get(index) else {
                    return Err(e);
                };
                Acquisition::failed(rom, self.options, AcquireError::Unreachable(rom))
            }
            Err(e) => return Err(e),
        };
        if let Err(e) = &acquisition.result {
            log::warn!("sensor {index}: {e}");
        }
        let now = (self.clock)();
        self.sink.record(index, &acquisition, &now)?;
        Ok(())
    }

    /// Reads every sensor in flat index order.
    pub fn read_all(&mut self) -> Result<(), Error<N::BusError>> {
        for index in 0..self.topology.len() {
            self.read_sensor(index)?;
        }
        Ok(())
    }

    /// Runs the sampling loop.
    pub fn run(&mut self, sampling: Sampling) -> Result<(), Error<N::BusError>> {
        self.sink.start(&(self.clock)());
        let mut pass = 0u32;
        while sampling.passes == 0 || pass < sampling.passes {
            let begun = (self.clock)();
            self.sink.begin_pass(&begun)?;
            if let Some(index) = sampling.sensor {
                self.read_sensor(index)?;
            }
            if sampling.all {
                self.read_all()?;
            }
            self.sink.end_pass()?;

            if sampling.interval_s > 0 {
                let took = u64::try_from(((self.clock)() - begun).num_seconds()).unwrap_or(0);
                let interval = u64::from(sampling.interval_s);
                if took > interval {
                    log::warn!(
                        "delay ({interval} s) is shorter than a pass, reading the sensors took {took} s"
                    );
                }
                for _ in took..interval {
                    self.delay.delay_ms(1000);
                }
            }
            pass = pass.wrapping_add(1);
        }
        Ok(())
    }

    /// Searches the bus and stores the result as the new topology, printing
    /// the flat index list. The topology file at `path` is rewritten when
    /// anything was found.
    pub fn init(&mut self, path: &Path) -> Result<(), Error<N::BusError>> {
        self.topology = self.locator.discover(&mut self.net)?;
        let mut text = String::new();
        for entry in self.topology.iter() {
            text.push_str(&format!("ROM #{} : {}\n", entry.index, entry.rom));
        }
        self.sink.console().write_str(&text)?;
        if !self.topology.is_empty() {
            rcfile::write(path, &self.settings, &self.topology)?;
        }
        Ok(())
    }

    /// Prints every device on the bus with its name. The stored topology is
    /// left alone.
    pub fn walk(&mut self) -> Result<Topology, Error<N::BusError>> {
        let listing = self.locator.walk(&mut self.net)?;
        let mut text = String::new();
        if !self.quiet {
            text.push_str("Devices on the Main LAN\n");
        }
        for rom in &listing.sensors {
            text.push_str(&format!("{rom} : {}\n", device_name(rom.family())));
        }
        for coupler in &listing.couplers {
            for branch in [Branch::Main, Branch::Aux] {
                if !self.quiet {
                    let side = match branch {
                        Branch::Main => "Main",
                        Branch::Aux => "Aux",
                    };
                    text.push_str(&format!("\nDevices on {side} Branch of Coupler : {}\n", coupler.rom));
                }
                for rom in coupler.branch(branch) {
                    text.push_str(&format!("{rom} : {}\n", device_name(rom.family())));
                }
            }
        }
        self.sink.console().write_str(&text)?;
        Ok(listing)
    }

    /// Switches every hub off and forgets the topology.
    pub fn close(&mut self) {
        self.locator.release(&mut self.net, &self.topology);
        self.topology.clear();
    }
}
