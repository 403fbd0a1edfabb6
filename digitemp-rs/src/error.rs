use std::{collections::TryReserveError, fmt::Debug, io, path::PathBuf};

use embedded_onewire::{Branch, OneWireError, Rom};
use thiserror::Error;

/// Problems found while loading configuration, before any bus traffic.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: unknown keyword {keyword}")]
    UnknownKeyword { line: usize, keyword: String },
    #[error("line {line}: invalid value for {keyword}: {value:?}")]
    BadValue {
        line: usize,
        keyword: &'static str,
        value: String,
    },
    #[error("line {line}: ROM line before SENSORS")]
    RomBeforeSensors { line: usize },
    #[error("line {line}: ROM {index} is beyond the {declared} declared sensors")]
    TooManyRoms {
        line: usize,
        index: usize,
        declared: usize,
    },
    #[error("{declared} sensors declared, ROM {missing} is missing")]
    TooFewRoms { declared: usize, missing: usize },
    #[error("line {line}: {rom} is listed as sensor {listed} but is sensor {actual:?}")]
    BranchIndex {
        line: usize,
        rom: Rom,
        listed: usize,
        actual: Option<usize>,
    },
    #[error("out of memory while loading the sensor list: {0}")]
    Allocation(#[from] TryReserveError),
    #[error("unknown database column {token:?} at position {position}")]
    BadColumn { token: String, position: usize },
    #[error("malformed pattern {pattern:?}: {reason}")]
    BadPattern {
        pattern: String,
        reason: &'static str,
    },
    #[error("unknown log type {0}")]
    BadLogType(u8),
}

/// Failures that end an acquisition session.
#[derive(Debug, Error)]
pub enum Error<E: Debug> {
    #[error("bus error: {0}")]
    Bus(OneWireError<E>),
    #[error("sensor {index} does not exist, {total} sensors known")]
    IndexOutOfRange { index: usize, total: usize },
    #[error("switching on the {branch} branch of coupler {coupler} failed")]
    CouplerSwitch { coupler: Rom, branch: Branch },
    #[error("turning off coupler {0} failed")]
    CouplerOff(Rom),
    #[error("out of memory while building the topology: {0}")]
    Allocation(#[from] TryReserveError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unable to write output: {0}")]
    Output(#[from] io::Error),
}

impl<E: Debug> From<OneWireError<E>> for Error<E> {
    fn from(e: OneWireError<E>) -> Self {
        Self::Bus(e)
    }
}

/// A single device read failed. The session carries on with the next device.
#[derive(Debug, Error)]
pub enum AcquireError<E: Debug> {
    #[error("{0} did not answer")]
    NoResponse(Rom),
    #[error("{0} cannot be reached")]
    Unreachable(Rom),
    #[error("{0}: scratchpad CRC mismatch")]
    InvalidCrc(Rom),
    #[error("{rom}: no valid reading after {attempts} attempts")]
    Exhausted { rom: Rom, attempts: u8 },
    #[error("{rom}: PIO self-check failed, status {status:02x}")]
    SelfCheck { rom: Rom, status: u8 },
    #[error("{rom}: {error}")]
    Bus { rom: Rom, error: OneWireError<E> },
    #[error("{rom}: family {family:02x} cannot be read")]
    Unsupported { rom: Rom, family: u8 },
}
