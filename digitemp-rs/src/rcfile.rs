//! The persisted topology file.
//!
//! ```text
//! TTY /dev/ttyS0
//! READ_TIME 1000
//! LOG_TYPE 1
//! LOG_FORMAT "%b %d %H:%M:%S Sensor %s C: %.2C F: %.2F"
//! CNT_FORMAT "%b %d %H:%M:%S Sensor %s #%n %C"
//! HUM_FORMAT "%b %d %H:%M:%S Sensor %s C: %.2C F: %.2F H: %h%%"
//! SENSORS 1
//! ROM 0 0x28 0x8A 0xB1 0x40 0x04 0x00 0x00 0x9C
//! COUPLER 0 0x1F 0x5D 0x2B 0x05 0x00 0x00 0x00 0x6B
//! CROM 1 0 M 0x10 0xA1 0x2F 0x3C 0x00 0x08 0x00 0x5E
//! ```
//!
//! `CROM` lines carry the flat index, the hub index and the branch. Reading
//! relies on the hub index and branch; the flat index is only checked.

use core::fmt::Write;
use std::{fs, io, path::Path};

use embedded_onewire::{Branch, Rom};

use crate::error::ConfigError;
use crate::settings::Settings;
use crate::sink::LogType;
use crate::topology::{Location, Topology};

/// Contents of a topology file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RcFile {
    pub settings: Settings,
    pub topology: Topology,
}

struct Line<'a> {
    number: usize,
    keyword: &'static str,
    words: core::str::SplitWhitespace<'a>,
}

impl<'a> Line<'a> {
    fn bad(&self, value: &str) -> ConfigError {
        ConfigError::BadValue {
            line: self.number,
            keyword: self.keyword,
            value: value.to_string(),
        }
    }

    fn word(&mut self) -> Result<&'a str, ConfigError> {
        let keyword = self.keyword;
        let number = self.number;
        self.words.next().ok_or(ConfigError::BadValue {
            line: number,
            keyword,
            value: String::new(),
        })
    }

    fn number<T: core::str::FromStr>(&mut self) -> Result<T, ConfigError> {
        let word = self.word()?;
        word.parse().map_err(|_| self.bad(word))
    }

    /// Eight address bytes, each `0x` hex or decimal.
    fn rom(&mut self) -> Result<Rom, ConfigError> {
        let mut bytes = [0u8; 8];
        for b in bytes.iter_mut() {
            let word = self.word()?;
            let parsed = match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
                Some(hex) => u8::from_str_radix(hex, 16),
                None => word.parse(),
            };
            *b = parsed.map_err(|_| self.bad(word))?;
        }
        Ok(Rom::new(bytes))
    }
}

/// Text between the first pair of double quotes, or the rest of the line.
fn quoted(rest: &str) -> &str {
    let rest = rest.trim_start().trim_start_matches('"');
    rest.split('"').next().unwrap_or("").trim_end()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Tty,
    Log,
    ReadTime,
    LogType,
    LogFormat,
    CntFormat,
    HumFormat,
    Sensors,
    Rom,
    Coupler,
    Crom,
    FailTime,
}

impl Keyword {
    const ALL: [Keyword; 12] = [
        Keyword::Tty,
        Keyword::Log,
        Keyword::ReadTime,
        Keyword::LogType,
        Keyword::LogFormat,
        Keyword::CntFormat,
        Keyword::HumFormat,
        Keyword::Sensors,
        Keyword::Rom,
        Keyword::Coupler,
        Keyword::Crom,
        Keyword::FailTime,
    ];

    const fn name(self) -> &'static str {
        match self {
            Keyword::Tty => "TTY",
            Keyword::Log => "LOG",
            Keyword::ReadTime => "READ_TIME",
            Keyword::LogType => "LOG_TYPE",
            Keyword::LogFormat => "LOG_FORMAT",
            Keyword::CntFormat => "CNT_FORMAT",
            Keyword::HumFormat => "HUM_FORMAT",
            Keyword::Sensors => "SENSORS",
            Keyword::Rom => "ROM",
            Keyword::Coupler => "COUPLER",
            Keyword::Crom => "CROM",
            Keyword::FailTime => "FAIL_TIME",
        }
    }

    fn find(word: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(word))
    }
}

impl RcFile {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        let mut sensors: Option<Vec<Option<Rom>>> = None;
        let mut topology = Topology::new();
        let mut crom: Vec<(usize, usize, Rom)> = Vec::new();

        for (n, raw) in text.lines().enumerate() {
            let number = n + 1;
            if raw.trim().is_empty() || raw.starts_with('#') {
                continue;
            }
            let raw = raw.trim_start();
            let (head, rest) = raw
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((raw, ""));
            let Some(keyword) = Keyword::find(head) else {
                return Err(ConfigError::UnknownKeyword {
                    line: number,
                    keyword: head.to_string(),
                });
            };
            let mut line = Line {
                number,
                keyword: keyword.name(),
                words: rest.split_whitespace(),
            };

            match keyword {
                Keyword::Tty => settings.port = line.words.next().unwrap_or_default().to_string(),
                Keyword::Log => settings.log_file = Some(line.word()?.to_string()),
                Keyword::ReadTime => settings.read_time_ms = line.number()?,
                Keyword::LogType => settings.log_type = LogType::try_from(line.number::<u8>()?)?,
                Keyword::LogFormat => settings.temp_format = quoted(rest).to_string(),
                Keyword::CntFormat => settings.counter_format = quoted(rest).to_string(),
                Keyword::HumFormat => settings.humidity_format = quoted(rest).to_string(),
                Keyword::FailTime => {}
                Keyword::Sensors => {
                    if sensors.is_some() {
                        return Err(line.bad(rest.trim()));
                    }
                    let count: usize = line.number()?;
                    let mut slots = Vec::new();
                    slots.try_reserve_exact(count)?;
                    slots.resize(count, None);
                    sensors = Some(slots);
                }
                Keyword::Rom => {
                    let Some(slots) = sensors.as_mut() else {
                        return Err(ConfigError::RomBeforeSensors { line: number });
                    };
                    let index: usize = line.number()?;
                    let declared = slots.len();
                    let slot = slots.get_mut(index).ok_or(ConfigError::TooManyRoms {
                        line: number,
                        index,
                        declared,
                    })?;
                    *slot = Some(line.rom()?);
                }
                Keyword::Coupler => {
                    // Hubs are numbered by their order in the file.
                    line.word()?;
                    topology.push_coupler(line.rom()?)?;
                }
                Keyword::Crom => {
                    let flat: usize = line.number()?;
                    let hub: usize = line.number()?;
                    let side = line.word()?;
                    let branch = match side {
                        s if s.eq_ignore_ascii_case("M") => Branch::Main,
                        s if s.eq_ignore_ascii_case("A") => Branch::Aux,
                        s => return Err(line.bad(s)),
                    };
                    let rom = line.rom()?;
                    if !topology.push_branch(hub, branch, rom)? {
                        log::warn!("line {number}: no coupler {hub}, {rom} ignored");
                        continue;
                    }
                    crom.try_reserve(1)?;
                    crom.push((number, flat, rom));
                }
            }
        }

        let slots = sensors.unwrap_or_default();
        let declared = slots.len();
        topology.sensors = slots
            .into_iter()
            .enumerate()
            .map(|(missing, slot)| slot.ok_or(ConfigError::TooFewRoms { declared, missing }))
            .collect::<Result<Vec<_>, _>>()?;

        for (number, flat, rom) in crom {
            let actual = topology
                .iter()
                .find(|e| e.rom == rom && matches!(e.location, Location::Branch { .. }))
                .map(|e| e.index);
            if actual != Some(flat) {
                return Err(ConfigError::BranchIndex {
                    line: number,
                    rom,
                    listed: flat,
                    actual,
                });
            }
        }

        Ok(Self { settings, topology })
    }

    /// Loads `path`. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

fn push_rom(out: &mut String, rom: &Rom) {
    for b in rom.bytes() {
        let _ = write!(out, " 0x{b:02X}");
    }
    out.push('\n');
}

/// Renders the settings and topology in the file grammar.
pub fn render(settings: &Settings, topology: &Topology) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "TTY {}", settings.port);
    if let Some(log) = &settings.log_file {
        let _ = writeln!(out, "LOG {log}");
    }
    let _ = writeln!(out, "READ_TIME {}", settings.read_time_ms);
    let _ = writeln!(out, "LOG_TYPE {}", settings.log_type.code());
    let _ = writeln!(out, "LOG_FORMAT \"{}\"", settings.temp_format);
    let _ = writeln!(out, "CNT_FORMAT \"{}\"", settings.counter_format);
    let _ = writeln!(out, "HUM_FORMAT \"{}\"", settings.humidity_format);
    let _ = writeln!(out, "SENSORS {}", topology.sensors.len());

    for entry in topology.iter() {
        if let Location::Main(position) = entry.location {
            let _ = write!(out, "ROM {position}");
            push_rom(&mut out, &entry.rom);
        }
    }
    for (i, coupler) in topology.couplers.iter().enumerate() {
        let _ = write!(out, "COUPLER {i}");
        push_rom(&mut out, &coupler.rom);
    }
    for entry in topology.iter() {
        if let Location::Branch {
            coupler, branch, ..
        } = entry.location
        {
            let _ = write!(out, "CROM {} {coupler} {}", entry.index, branch.letter());
            push_rom(&mut out, &entry.rom);
        }
    }
    out
}

/// Writes the file at `path`, replacing any previous contents.
pub fn write(path: &Path, settings: &Settings, topology: &Topology) -> Result<(), ConfigError> {
    fs::write(path, render(settings, topology)).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("wrote {}", path.display());
    Ok(())
}
