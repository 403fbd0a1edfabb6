#![no_std]
#![deny(missing_docs)]
//! # embedded-onewire
//! A no-std implementation of a 1-Wire network layer.
//!
//! The crate is split in two levels:
//!
//! - [OneWire] is the bit-level bus: reset, byte and bit time slots, and
//!   optionally strong pull-up. Bus master drivers implement it.
//! - [OneWireNet] is the network-level transport consumed by applications:
//!   select the addressed device, exchange blocks, switch power levels,
//!   enumerate devices on the main bus or on a DS2409 hub branch, and switch
//!   hub branches. [Network] lifts any [OneWire] bus to a [OneWireNet].
//!
//! It also provides the [Rom] device address, the Dallas CRC-8 engine
//! ([OneWireCrc]), the CRC-8 used by Sensirion humidity sensors ([ShtCrc]) and
//! the [1-Wire search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html)
//! in [OneWireSearch].

pub mod consts;
mod coupler;
mod crc;
mod error;
mod net;
mod rom;
mod search;
mod traits;

pub use coupler::{Branch, CouplerCommand};
pub use crc::{OneWireCrc, ShtCrc, reverse8};
pub use error::OneWireError;
pub use net::{Network, OneWireNet, SearchScope};
pub use rom::Rom;
pub use search::{OneWireSearch, OneWireSearchKind};
pub use traits::{OneWire, OneWireStatus, PowerLevel};

/// Error type for 1-Wire operations.
pub type OneWireResult<T, E> = Result<T, OneWireError<E>>;
