//! Device families and their read sequences.
//!
//! The family code in byte 0 of a device address selects one of a closed set
//! of protocols. Thermometers and the owslave humidity sensor share the
//! convert / settle / read scratchpad / validate cycle driven by the
//! [Dispatcher]. The other families have their own short sequences but use
//! the same retry budget, [MAX_READ_TRIES].

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWireError, OneWireNet, Rom};

use crate::error::AcquireError;

mod counter;
pub mod dispatcher;
mod ds1923;
mod ds2438;
mod owslave;
mod pio;
mod thermometer;

pub use dispatcher::{Decoded, Dispatcher, Erratum, MAX_READ_TRIES, Scratchpad, State};
pub use ds2438::Ds2438Config;
pub use pio::{ChannelControl, ChannelInfo};

/// Supported 1-Wire device families, by family code.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Ds1820 = 0x10,
    Ds2406 = 0x12,
    Ds2422 = 0x1b,
    Ds2423 = 0x1d,
    Ds2409 = 0x1f,
    Ds1822 = 0x22,
    Ds2438 = 0x26,
    Ds18b20 = 0x28,
    Ds2413 = 0x3a,
    Ds1923 = 0x41,
    Ds28ea00 = 0x42,
    /// AVR based 1-Wire slave bridging a Sensirion SHT humidity sensor.
    Owslave = 0xf0,
}

impl TryFrom<u8> for Family {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Family::*;
        Ok(match value {
            0x10 => Ds1820,
            0x12 => Ds2406,
            0x1b => Ds2422,
            0x1d => Ds2423,
            0x1f => Ds2409,
            0x22 => Ds1822,
            0x26 => Ds2438,
            0x28 => Ds18b20,
            0x3a => Ds2413,
            0x41 => Ds1923,
            0x42 => Ds28ea00,
            0xf0 => Owslave,
            _ => return Err(value),
        })
    }
}

impl Family {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Family of the device at `rom`, if supported.
    pub fn of(rom: Rom) -> Option<Self> {
        Self::try_from(rom.family()).ok()
    }

    /// Whether the family is read as a sensor. Hubs are not.
    pub const fn is_sensor(self) -> bool {
        !matches!(self, Self::Ds2409)
    }

    /// Columns a read of this family fills in the tabular log types. The
    /// DS28EA00 reports its PIO status in A/D mode.
    pub const fn columns(self, ad_mode: bool) -> Option<Columns> {
        use Family::*;
        match self {
            Ds28ea00 if ad_mode => Some(Columns::Status),
            Ds2413 => Some(Columns::Status),
            Ds2406 => Some(Columns::Switch),
            Ds2422 | Ds2423 => Some(Columns::Counters),
            Ds2409 => None,
            Ds1820 | Ds1822 | Ds18b20 | Ds28ea00 | Ds2438 | Ds1923 | Owslave => {
                Some(Columns::Degrees)
            }
        }
    }

    pub const fn name(self) -> &'static str {
        use Family::*;
        match self {
            Ds1820 => "DS1820/DS18S20 Temperature Sensor",
            Ds2406 => "DS2406 Dual Addressable Switch",
            Ds2422 => "DS2422 Counter",
            Ds2423 => "DS2423 4k RAM with Counter",
            Ds2409 => "DS2409 MicroLAN Coupler",
            Ds1822 => "DS1822 Econo Temperature Sensor",
            Ds2438 => "DS2438 Smart Battery Monitor",
            Ds18b20 => "DS18B20 Temperature Sensor",
            Ds2413 => "DS2413 Dual Channel Addressable Switch",
            Ds1923 => "DS1923 Hygrochron Temperature/Humidity Logger",
            Ds28ea00 => "DS28EA00 Temperature Sensor with PIO",
            Owslave => "owslave SHT Humidity Sensor",
        }
    }

    /// Field names of the scratchpad bytes, by offset in the read block.
    pub(crate) const fn labels(self) -> &'static [(usize, &'static str)] {
        use Family::*;
        match self {
            Ds1820 => &[
                (1, "Temperature"),
                (2, "Sign"),
                (3, "TH"),
                (4, "TL"),
                (7, "Remain"),
                (8, "Count Per C"),
                (9, "CRC"),
            ],
            Ds18b20 | Ds1822 | Ds28ea00 => &[
                (1, "Temp. LSB"),
                (2, "Temp. MSB"),
                (3, "TH"),
                (4, "TL"),
                (5, "Config Reg."),
                (9, "CRC"),
            ],
            Owslave => &[
                (1, "Hum. MSB"),
                (2, "Hum. LSB"),
                (3, "Hum. CRC"),
                (4, "Temp. MSB"),
                (5, "Temp. LSB"),
                (6, "Temp. CRC"),
                (7, "SHT type"),
            ],
            Ds2438 => &[
                (2, "Status/Config"),
                (3, "Temp. LSB"),
                (4, "Temp. MSB"),
                (5, "Voltage LSB"),
                (6, "Voltage MSB"),
                (7, "Current LSB"),
                (8, "Current MSB"),
                (10, "CRC"),
            ],
            _ => &[],
        }
    }
}

/// Human readable name for a family code, as shown by the bus walk.
pub fn device_name(code: u8) -> &'static str {
    Family::try_from(code).map_or("Unknown device", Family::name)
}

/// Counters on a DS2422/DS2423.
pub const COUNTERS_PER_DEVICE: u8 = 2;

/// Shape of a device's share of a tabular line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Columns {
    /// One temperature.
    Degrees,
    /// One value per counter.
    Counters,
    /// PIO status byte.
    Status,
    /// DS2406 channel info and data byte.
    Switch,
}

impl Columns {
    /// Filler written when the read failed.
    pub const fn placeholder(self) -> &'static str {
        match self {
            Self::Degrees => "\t0.00",
            Self::Counters => "\t0\t0",
            Self::Status => "\t00",
            Self::Switch => "\t00,00",
        }
    }
}

/// One counter of a DS2422/DS2423.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    /// Counter number, 0 or 1.
    pub number: u8,
    pub value: u32,
}

/// Decoded result of one device read.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Temperature {
        celsius: f64,
    },
    Humidity {
        celsius: f64,
        /// Relative humidity, %.
        humidity: f64,
    },
    /// DS2438 read as a plain A/D converter.
    Analog {
        celsius: f64,
        /// Supply voltage, V.
        vdd: f64,
        /// A/D input voltage, V.
        vad: f64,
        /// Raw current register.
        cad: i16,
    },
    /// Counters that could be read. Unreadable pages are left out.
    Counters(Vec<Counter>),
    /// DS2413/DS28EA00 PIO status byte.
    Pio {
        status: u8,
    },
    /// DS2406 channel info and data byte.
    Switch {
        info: ChannelInfo,
        data: u8,
    },
}

impl Reading {
    /// Temperature carried by the reading, if any.
    pub fn celsius(&self) -> Option<f64> {
        match self {
            Self::Temperature { celsius }
            | Self::Humidity { celsius, .. }
            | Self::Analog { celsius, .. } => Some(*celsius),
            _ => None,
        }
    }
}

/// Knobs of a device read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Settle time after a conversion command, ms.
    pub read_time_ms: u32,
    /// Read the DS2438 as an A/D converter and the DS28EA00 as a PIO.
    pub ad_mode: bool,
    /// Keep a copy of every scratchpad read.
    pub verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            read_time_ms: 1000,
            ad_mode: false,
            verbose: false,
        }
    }
}

/// Raw scratchpad kept for verbose output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchpadDump {
    pub family: Family,
    pub bytes: Vec<u8>,
}

impl fmt::Display for ScratchpadDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &(offset, label) in self.family.labels() {
            if let Some(b) = self.bytes.get(offset) {
                writeln!(f, "  {label:<14}: 0x{b:02X}")?;
            }
        }
        for (i, b) in self.bytes.iter().enumerate() {
            writeln!(f, "scratchpad[{i}] = 0x{b:02X}")?;
        }
        Ok(())
    }
}

/// Outcome of reading one device.
#[derive(Debug)]
pub struct Acquisition<E: fmt::Debug> {
    pub rom: Rom,
    pub family: Option<Family>,
    pub result: Result<Reading, AcquireError<E>>,
    /// Columns held in tabular output, filled with placeholders on failure.
    pub columns: Columns,
    /// Scratchpads read along the way, only with [Options::verbose].
    pub dumps: Vec<ScratchpadDump>,
}

/// Bus, delay and bookkeeping shared by every read sequence.
pub struct Context<'a, N, D> {
    pub(crate) net: &'a mut N,
    pub(crate) delay: &'a mut D,
    pub(crate) options: Options,
    pub(crate) rom: Rom,
    pub(crate) dumps: Vec<ScratchpadDump>,
}

impl<'a, N: OneWireNet, D: DelayNs> Context<'a, N, D> {
    pub fn new(net: &'a mut N, delay: &'a mut D, options: Options, rom: Rom) -> Self {
        Self {
            net,
            delay,
            options,
            rom,
            dumps: Vec::new(),
        }
    }

    pub(crate) fn bus_error(&self, error: OneWireError<N::BusError>) -> AcquireError<N::BusError> {
        AcquireError::Bus {
            rom: self.rom,
            error,
        }
    }

    /// Addresses the device. Bus errors count as no answer.
    pub(crate) fn access(&mut self) -> bool {
        self.net.set_rom(self.rom);
        match self.net.access() {
            Ok(present) => present,
            Err(e) => {
                log::debug!("{}: access failed: {e}", self.rom);
                false
            }
        }
    }

    pub(crate) fn settle(&mut self) {
        self.delay.delay_ms(self.options.read_time_ms);
    }

    /// Resets the bus and waits a settle time before the next attempt.
    pub(crate) fn recover(&mut self) {
        if let Err(e) = self.net.reset() {
            log::debug!("{}: bus reset failed: {e}", self.rom);
        }
        self.settle();
    }

    pub(crate) fn dump(&mut self, family: Family, bytes: &[u8]) {
        if self.options.verbose {
            self.dumps.push(ScratchpadDump {
                family,
                bytes: bytes.to_vec(),
            });
        }
    }
}

/// Reads the device at `rom` with the protocol of its family.
pub fn acquire<N: OneWireNet, D: DelayNs>(
    net: &mut N,
    delay: &mut D,
    options: Options,
    rom: Rom,
) -> Acquisition<N::BusError> {
    let family = Family::of(rom);
    let mut ctx = Context::new(net, delay, options, rom);
    let result = match family {
        Some(family) => read(&mut ctx, family),
        None => Err(AcquireError::Unsupported {
            rom,
            family: rom.family(),
        }),
    };
    Acquisition {
        rom,
        family,
        result,
        columns: Acquisition::<N::BusError>::columns_of(family, options),
        dumps: ctx.dumps,
    }
}

impl<E: fmt::Debug> Acquisition<E> {
    /// A read that never reached the device.
    pub fn failed(rom: Rom, options: Options, error: AcquireError<E>) -> Self {
        let family = Family::of(rom);
        Self {
            rom,
            family,
            result: Err(error),
            columns: Self::columns_of(family, options),
            dumps: Vec::new(),
        }
    }

    /// Unknown devices keep a single column.
    fn columns_of(family: Option<Family>, options: Options) -> Columns {
        family
            .and_then(|f| f.columns(options.ad_mode))
            .unwrap_or(Columns::Degrees)
    }
}

fn read<N: OneWireNet, D: DelayNs>(
    ctx: &mut Context<'_, N, D>,
    family: Family,
) -> Result<Reading, AcquireError<N::BusError>> {
    use Family::*;
    match family {
        Ds28ea00 if ctx.options.ad_mode => pio::read_status(ctx),
        Ds2413 => pio::read_status(ctx),
        Ds1820 | Ds1822 | Ds18b20 | Ds28ea00 => {
            Dispatcher::new(thermometer::Thermometer::new(family)).run(ctx)
        }
        Owslave => Dispatcher::new(owslave::Owslave).run(ctx),
        Ds1923 => ds1923::read(ctx),
        Ds2422 | Ds2423 => counter::read(ctx, family),
        Ds2438 => ds2438::read(ctx),
        Ds2406 => pio::read_switch(ctx),
        Ds2409 => Err(AcquireError::Unsupported {
            rom: ctx.rom,
            family: family.code(),
        }),
    }
}
