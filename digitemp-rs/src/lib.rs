//! # digitemp
//! Sensor acquisition for 1-Wire networks.
//!
//! A network is a main bus plus any number of DS2409 hubs, each with a main
//! and an auxiliary output. Every supported device gets a place in a flat
//! index space ([Topology]). A [Session] resolves an index to a device,
//! switching hub branches only when needed ([Locator]), runs the family
//! specific read sequence ([family]) and hands the result to a [Sink], which
//! renders it as a template line ([Template]), a tabular column or an SQL
//! `INSERT` statement.
//!
//! The bus itself is any [OneWireNet](embedded_onewire::OneWireNet)
//! implementation. Delays go through [DelayNs](embedded_hal::delay::DelayNs).

pub mod dbconf;
pub mod error;
pub mod family;
pub mod locator;
pub mod rcfile;
pub mod session;
pub mod settings;
pub mod sink;
pub mod template;
pub mod topology;

#[cfg(test)]
pub(crate) mod sim;

pub use dbconf::{Column, DbConfig};
pub use error::{AcquireError, ConfigError, Error};
pub use family::{Acquisition, Columns, Counter, Family, Reading};
pub use locator::{BranchCache, Locator};
pub use rcfile::RcFile;
pub use session::{Sampling, Session};
pub use settings::{Formats, OutputChoice, Overrides, Settings};
pub use sink::{LogType, Output, Sink};
pub use template::Template;
pub use topology::{Coupler, Location, Topology};

/// Converts degrees Celsius to degrees Fahrenheit.
pub fn c2f(celsius: f64) -> f64 {
    32.0 + celsius * 9.0 / 5.0
}
