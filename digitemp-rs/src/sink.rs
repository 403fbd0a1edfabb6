//! Where readings end up.
//!
//! The [LogType] picks one of three renderings: a template line per reading,
//! one tab separated line per sampling pass, or an SQL `INSERT` statement per
//! reading. The text goes to an [Output].

use core::fmt::{self, Debug};
use std::{
    fs::OpenOptions,
    io::{self, Write},
};

use chrono::{DateTime, TimeZone, Utc};
use embedded_onewire::Rom;

use crate::dbconf::{Column, DbConfig};
use crate::error::ConfigError;
use crate::family::{Acquisition, COUNTERS_PER_DEVICE, Reading};
use crate::settings::{Formats, Settings};
use crate::template::{Values, strftime};

/// Output line layout, by the code used in the topology file and on the
/// command line.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogType {
    /// Template line with a custom temperature pattern.
    Custom = 0,
    /// Template line.
    #[default]
    Template = 1,
    /// Seconds since the start of the run, then °C per sensor.
    ElapsedCelsius = 2,
    /// Seconds since the start of the run, then °F per sensor.
    ElapsedFahrenheit = 3,
    /// Unix time, then °C per sensor.
    EpochCelsius = 4,
    /// Unix time, then °F per sensor.
    EpochFahrenheit = 5,
    /// SQL `INSERT` statements.
    Database = 6,
}

impl TryFrom<u8> for LogType {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use LogType::*;
        Ok(match value {
            0 => Custom,
            1 => Template,
            2 => ElapsedCelsius,
            3 => ElapsedFahrenheit,
            4 => EpochCelsius,
            5 => EpochFahrenheit,
            6 => Database,
            _ => return Err(ConfigError::BadLogType(value)),
        })
    }
}

impl LogType {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// One line per sampling pass.
    pub const fn is_tabular(self) -> bool {
        matches!(
            self,
            Self::ElapsedCelsius
                | Self::ElapsedFahrenheit
                | Self::EpochCelsius
                | Self::EpochFahrenheit
        )
    }

    pub const fn is_fahrenheit(self) -> bool {
        matches!(self, Self::ElapsedFahrenheit | Self::EpochFahrenheit)
    }

    /// Pass lines start with Unix time rather than elapsed time.
    pub const fn is_epoch(self) -> bool {
        matches!(self, Self::EpochCelsius | Self::EpochFahrenheit)
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Destination of rendered text.
#[derive(Debug)]
pub enum Output {
    Stdout,
    /// Appends to a file whose path is a strftime pattern, expanded in UTC
    /// at every write.
    File { pattern: String },
    /// Kept in memory.
    Buffer(Vec<u8>),
}

impl Output {
    pub fn file(pattern: impl Into<String>) -> Self {
        Self::File {
            pattern: pattern.into(),
        }
    }

    pub fn buffer() -> Self {
        Self::Buffer(Vec::new())
    }

    pub fn write_str(&mut self, text: &str) -> io::Result<()> {
        match self {
            Self::Stdout => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(text.as_bytes())?;
                stdout.flush()
            }
            Self::File { pattern } => {
                let path = strftime(pattern, &Utc::now());
                let mut options = OpenOptions::new();
                options.append(true).create(true);
                #[cfg(unix)]
                {
                    use std::os::unix::fs::OpenOptionsExt;
                    options.mode(0o644);
                }
                let mut file = options.open(&path).map_err(|e| {
                    log::error!("unable to open log file {path}: {e}");
                    e
                })?;
                file.write_all(text.as_bytes())
            }
            Self::Buffer(buf) => {
                buf.extend_from_slice(text.as_bytes());
                Ok(())
            }
        }
    }

    /// Buffered text, lossily decoded. Empty for the other outputs.
    pub fn contents(&self) -> String {
        match self {
            Self::Buffer(buf) => String::from_utf8_lossy(buf).into_owned(),
            _ => String::new(),
        }
    }

    /// Takes the buffered text, leaving the buffer empty.
    pub fn take(&mut self) -> String {
        match self {
            Self::Buffer(buf) => String::from_utf8_lossy(&core::mem::take(buf)).into_owned(),
            _ => String::new(),
        }
    }
}

/// Builds the `INSERT` statement for one reading. `humidity` is `None` for
/// plain thermometers.
pub fn insert_statement<Tz: TimeZone>(
    db: &DbConfig,
    sensor: usize,
    rom: Rom,
    celsius: f64,
    humidity: Option<f64>,
    time: &DateTime<Tz>,
) -> String
where
    Tz::Offset: fmt::Display,
{
    let serial = rom.to_string();
    let timestamp = time.format("%Y-%m-%d %H:%M:%S").to_string();
    let fahrenheit = crate::c2f(celsius);
    let values = if db.columns.is_empty() {
        format!("'{sensor}','{celsius:.6}','{fahrenheit:.6}','{serial}','{timestamp}'")
    } else {
        db.columns
            .iter()
            .map(|column| match column {
                Column::Blank => "''".to_string(),
                Column::Humi => humidity.map_or_else(
                    || "NULL".to_string(),
                    |h| format!("'{}'", h.trunc() as i64),
                ),
                Column::TempC => format!("'{celsius:.6}'"),
                Column::TempF => format!("'{fahrenheit:.6}'"),
                Column::Serial => format!("'{serial}'"),
                Column::Timestamp => format!("'{timestamp}'"),
                Column::Sensor => format!("'{sensor}'"),
            })
            .collect::<Vec<_>>()
            .join(",")
    };
    format!("INSERT INTO {} VALUES({values})", db.table())
}

/// Renders readings in the configured layout.
#[derive(Debug)]
pub struct Sink {
    log_type: LogType,
    formats: Formats,
    db: DbConfig,
    output: Output,
    /// Listings and scratchpad dumps.
    console: Output,
    /// Origin of the pass time stamps, Unix seconds.
    start: i64,
}

impl Sink {
    pub fn new(log_type: LogType, formats: Formats, output: Output) -> Self {
        Self {
            log_type,
            formats,
            db: DbConfig::default(),
            output,
            console: Output::Stdout,
            start: 0,
        }
    }

    /// Sink for the log type, patterns and log file of `settings`. Writes to
    /// stdout when no log file is set.
    pub fn for_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let output = match &settings.log_file {
            Some(pattern) => Output::file(pattern.as_str()),
            None => Output::Stdout,
        };
        Ok(Self::new(settings.log_type, settings.formats()?, output))
    }

    pub fn with_database(mut self, db: DbConfig) -> Self {
        self.db = db;
        self
    }

    pub fn with_console(mut self, console: Output) -> Self {
        self.console = console;
        self
    }

    pub fn log_type(&self) -> LogType {
        self.log_type
    }

    pub fn set_log_type(&mut self, log_type: LogType) {
        self.log_type = log_type;
    }

    pub fn output(&mut self) -> &mut Output {
        &mut self.output
    }

    pub fn console(&mut self) -> &mut Output {
        &mut self.console
    }

    /// Marks the start of the run. Unix time modes count from the epoch.
    pub fn start<Tz: TimeZone>(&mut self, time: &DateTime<Tz>) {
        self.start = if self.log_type.is_epoch() {
            0
        } else {
            time.timestamp()
        };
    }

    /// Starts a pass line with the elapsed or Unix seconds.
    pub fn begin_pass<Tz: TimeZone>(&mut self, time: &DateTime<Tz>) -> io::Result<()> {
        if self.log_type.is_tabular() {
            let elapsed = time.timestamp() - self.start;
            self.output.write_str(&elapsed.to_string())?;
        }
        Ok(())
    }

    pub fn end_pass(&mut self) -> io::Result<()> {
        if self.log_type.is_tabular() {
            self.output.write_str("\n")?;
        }
        Ok(())
    }

    /// Renders the outcome of reading sensor `index`, then any scratchpad
    /// dumps.
    pub fn record<E: Debug, Tz: TimeZone>(
        &mut self,
        index: usize,
        acquisition: &Acquisition<E>,
        time: &DateTime<Tz>,
    ) -> io::Result<()>
    where
        Tz::Offset: fmt::Display,
    {
        let text = match self.log_type {
            LogType::Database => self.statement(index, acquisition, time),
            t if t.is_tabular() => self.columns(acquisition),
            _ => self.lines(index, acquisition, time),
        };
        if !text.is_empty() {
            self.output.write_str(&text)?;
        }
        for dump in &acquisition.dumps {
            self.console.write_str(&dump.to_string())?;
        }
        Ok(())
    }

    fn statement<E: Debug, Tz: TimeZone>(
        &self,
        index: usize,
        acquisition: &Acquisition<E>,
        time: &DateTime<Tz>,
    ) -> String
    where
        Tz::Offset: fmt::Display,
    {
        let humidity = match acquisition.result {
            Ok(Reading::Humidity { humidity, .. }) => Some(humidity),
            _ => None,
        };
        match acquisition.result.as_ref().ok().and_then(Reading::celsius) {
            Some(celsius) => {
                let mut sql =
                    insert_statement(&self.db, index, acquisition.rom, celsius, humidity, time);
                sql.push_str(";\n");
                sql
            }
            None => {
                log::debug!("sensor {index}: nothing to insert");
                String::new()
            }
        }
    }

    fn columns<E: Debug>(&self, acquisition: &Acquisition<E>) -> String {
        let degrees = |celsius: f64| {
            let value = if self.log_type.is_fahrenheit() {
                crate::c2f(celsius)
            } else {
                celsius
            };
            format!("\t{value:3.2}")
        };
        match &acquisition.result {
            Ok(Reading::Temperature { celsius })
            | Ok(Reading::Humidity { celsius, .. })
            | Ok(Reading::Analog { celsius, .. }) => degrees(*celsius),
            // Missing pages keep their column.
            Ok(Reading::Counters(counters)) => (0..COUNTERS_PER_DEVICE)
                .map(|n| match counters.iter().find(|c| c.number == n) {
                    Some(c) => format!("\t{}", c.value),
                    None => "\t0".to_string(),
                })
                .collect(),
            Ok(Reading::Pio { status }) => format!("\t{status:02x}"),
            Ok(Reading::Switch { info, data }) => {
                format!("\t{:02x},{data:02x}", info.into_bits())
            }
            Err(_) => acquisition.columns.placeholder().to_string(),
        }
    }

    fn lines<E: Debug, Tz: TimeZone>(
        &self,
        index: usize,
        acquisition: &Acquisition<E>,
        time: &DateTime<Tz>,
    ) -> String
    where
        Tz::Offset: fmt::Display,
    {
        let rom = acquisition.rom;
        let Ok(reading) = &acquisition.result else {
            return String::new();
        };
        let fixed = |layout: String| format!("{}\n", strftime(&layout, time));
        match *reading {
            Reading::Temperature { celsius } => {
                let values = Values::temperature(index, rom, celsius);
                format!("{}\n", self.formats.temperature.render(&values, time))
            }
            Reading::Humidity { celsius, humidity } => {
                let values = Values::humidity(index, rom, celsius, humidity);
                format!("{}\n", self.formats.humidity.render(&values, time))
            }
            Reading::Counters(ref counters) => counters
                .iter()
                .map(|&counter| {
                    let values = Values::counter(index, rom, counter);
                    format!("{}\n", self.formats.counter.render(&values, time))
                })
                .collect(),
            Reading::Analog {
                celsius,
                vdd,
                vad,
                cad,
            } => fixed(format!(
                "%b %d %H:%M:%S Sensor {index} VDD: {vdd:.2} AD: {vad:.2} CAD: {cad} C: {celsius:.2}"
            )),
            Reading::Pio { status } => {
                let level = |mask: u8| if status & mask != 0 { "ON " } else { "OFF" };
                fixed(format!(
                    "%b %d %H:%M:%S Sensor {index} PIO: {status:02x}, PIO-A: {} PIO-B: {}",
                    level(0x01),
                    level(0x04)
                ))
            }
            Reading::Switch { info, data } => {
                let state = |latch: bool, level: bool| match (latch, level) {
                    (true, true) => "ON",
                    (true, false) => "on",
                    (false, _) => "off",
                };
                let b = if info.two_channels() {
                    format!(" PIO-B: {}", state(info.latch_b(), info.level_b()))
                } else {
                    String::new()
                };
                fixed(format!(
                    "%b %d %H:%M:%S Sensor {index} PIO: {:02x},{data:02x}, PIO-A: {}{b}",
                    info.into_bits(),
                    state(info.latch_a(), info.level_a())
                ))
            }
        }
    }
}
