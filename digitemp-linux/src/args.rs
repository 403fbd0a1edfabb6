use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use digitemp::{ConfigError, OutputChoice, Overrides, Sampling};

/// Read temperature, humidity, counter and switch devices on a 1-Wire bus
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .multiple(true)
        .args(["walk", "init", "sensor", "all", "database"])
))]
pub struct Args {
    /// Serial port of the bus adapter (e.g., /dev/ttyUSB0)
    #[arg(short = 's', long)]
    pub port: Option<String>,
    /// Configuration file holding the sensor list
    #[arg(short = 'c', long, default_value = "/etc/digitemprc")]
    pub config: PathBuf,
    /// Database sink configuration file
    #[arg(long, default_value = "/etc/digitemprc_mysql")]
    pub db_config: PathBuf,
    /// Settle time after a conversion command, in ms
    #[arg(short = 'r', long)]
    pub read_time: Option<u32>,
    /// Log file, may hold strftime specifiers
    #[arg(short = 'l', long)]
    pub log_file: Option<String>,
    /// Print every scratchpad read
    #[arg(short = 'v', long)]
    pub verbose: bool,
    /// Leave out headers
    #[arg(short = 'q', long)]
    pub quiet: bool,
    /// Read one sensor
    #[arg(short = 't', long, value_name = "N")]
    pub sensor: Option<usize>,
    /// Read all sensors
    #[arg(short = 'a', long)]
    pub all: bool,
    /// Read all sensors and print SQL INSERT statements
    #[arg(short = 'e', long)]
    pub database: bool,
    /// List every device on the bus
    #[arg(short = 'w', long)]
    pub walk: bool,
    /// Search the bus and rewrite the configuration file
    #[arg(short = 'i', long)]
    pub init: bool,
    /// Seconds between the starts of two passes
    #[arg(short = 'd', long, default_value_t = 0)]
    pub delay: u32,
    /// Number of passes, 0 for no end
    #[arg(short = 'n', long, default_value_t = 1)]
    pub passes: u32,
    /// Read the DS2438 as an A/D converter and the DS28EA00 as a PIO
    #[arg(short = 'A', long)]
    pub ad_mode: bool,
    /// Log type 0-6, or a custom temperature pattern
    #[arg(short = 'o', long, value_name = "TYPE|PATTERN")]
    pub output: Option<String>,
    /// Counter output pattern
    #[arg(short = 'O', long, value_name = "PATTERN")]
    pub counter_format: Option<String>,
    /// Humidity output pattern
    #[arg(short = 'H', long, value_name = "PATTERN")]
    pub humidity_format: Option<String>,
}

impl Args {
    /// Values that replace those read from the configuration file.
    pub fn overrides(&self) -> Result<Overrides, ConfigError> {
        Ok(Overrides {
            port: self.port.clone(),
            log_file: self.log_file.clone(),
            read_time_ms: self.read_time,
            output: self.output.as_deref().map(OutputChoice::parse).transpose()?,
            counter_format: self.counter_format.clone(),
            humidity_format: self.humidity_format.clone(),
        })
    }

    /// Whether any sensor is read.
    pub fn reads(&self) -> bool {
        self.sensor.is_some() || self.all || self.database
    }

    pub fn sampling(&self) -> Sampling {
        Sampling {
            sensor: self.sensor,
            all: self.all || self.database,
            passes: self.passes,
            interval_s: self.delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Args;

    use clap::{CommandFactory, Parser};
    use digitemp::{LogType, OutputChoice};

    #[test]
    fn check_cli_debug_asserts() {
        Args::command().debug_assert();
    }

    #[test]
    fn an_action_is_required() {
        assert!(Args::try_parse_from(["digitemp", "-s", "/dev/ttyS0"]).is_err());
        assert!(Args::try_parse_from(["digitemp", "-w"]).is_ok());
    }

    #[test]
    fn reading_flags() {
        let args = Args::try_parse_from(["digitemp", "-t", "2", "-e", "-d", "30", "-n", "0"]).unwrap();
        let sampling = args.sampling();
        assert_eq!(sampling.sensor, Some(2));
        assert!(sampling.all);
        assert_eq!(sampling.passes, 0);
        assert_eq!(sampling.interval_s, 30);
        assert!(args.reads());
    }

    #[test]
    fn output_override() {
        let args = Args::try_parse_from(["digitemp", "-a", "-o", "2", "-r", "750"]).unwrap();
        let overrides = args.overrides().unwrap();
        assert_eq!(
            overrides.output,
            Some(OutputChoice::Type(LogType::ElapsedCelsius))
        );
        assert_eq!(overrides.read_time_ms, Some(750));

        let args = Args::try_parse_from(["digitemp", "-a", "-o", "7"]).unwrap();
        assert!(args.overrides().is_err());
    }
}
