//! Run settings shared by the topology file, the command line and the session.

use crate::error::ConfigError;
use crate::sink::LogType;
use crate::template::Template;

pub const DEFAULT_TEMP_FORMAT: &str = "%b %d %H:%M:%S Sensor %s C: %.2C F: %.2F";
pub const DEFAULT_COUNTER_FORMAT: &str = "%b %d %H:%M:%S Sensor %s #%n %C";
pub const DEFAULT_HUMIDITY_FORMAT: &str = "%b %d %H:%M:%S Sensor %s C: %.2C F: %.2F H: %h%%";

/// Settle time after a conversion command, ms.
pub const DEFAULT_READ_TIME_MS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Serial port of the bus adapter. Empty until configured.
    pub port: String,
    /// Log file path, may hold strftime specifiers.
    pub log_file: Option<String>,
    pub read_time_ms: u32,
    pub log_type: LogType,
    pub temp_format: String,
    pub counter_format: String,
    pub humidity_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: String::new(),
            log_file: None,
            read_time_ms: DEFAULT_READ_TIME_MS,
            log_type: LogType::Template,
            temp_format: DEFAULT_TEMP_FORMAT.to_string(),
            counter_format: DEFAULT_COUNTER_FORMAT.to_string(),
            humidity_format: DEFAULT_HUMIDITY_FORMAT.to_string(),
        }
    }
}

/// Value of `-o`: a log type code or a custom temperature pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChoice {
    Type(LogType),
    Pattern(String),
}

impl OutputChoice {
    /// A leading digit selects a log type.
    pub fn parse(arg: &str) -> Result<Self, ConfigError> {
        if arg.starts_with(|c: char| c.is_ascii_digit()) {
            let code: u8 = arg.parse().map_err(|_| ConfigError::BadValue {
                line: 0,
                keyword: "-o",
                value: arg.to_string(),
            })?;
            Ok(Self::Type(LogType::try_from(code)?))
        } else {
            Ok(Self::Pattern(arg.to_string()))
        }
    }
}

/// Command line values that take precedence over the topology file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub port: Option<String>,
    pub log_file: Option<String>,
    pub read_time_ms: Option<u32>,
    pub output: Option<OutputChoice>,
    pub counter_format: Option<String>,
    pub humidity_format: Option<String>,
}

impl Settings {
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(log_file) = overrides.log_file {
            self.log_file = Some(log_file);
        }
        if let Some(ms) = overrides.read_time_ms.filter(|&ms| ms > 0) {
            self.read_time_ms = ms;
        }
        match overrides.output {
            Some(OutputChoice::Type(log_type)) => self.log_type = log_type,
            Some(OutputChoice::Pattern(pattern)) => {
                self.log_type = LogType::Custom;
                self.temp_format = pattern;
            }
            None => {}
        }
        if let Some(format) = overrides.counter_format {
            self.counter_format = format;
        }
        if let Some(format) = overrides.humidity_format {
            self.humidity_format = format;
        }
    }

    /// Parses the three output patterns.
    pub fn formats(&self) -> Result<Formats, ConfigError> {
        Ok(Formats {
            temperature: Template::parse(&self.temp_format)?,
            counter: Template::parse(&self.counter_format)?,
            humidity: Template::parse(&self.humidity_format)?,
        })
    }
}

/// Parsed output patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formats {
    pub temperature: Template,
    pub counter: Template,
    pub humidity: Template,
}

#[cfg(test)]
mod tests {
    use super::{OutputChoice, Overrides, Settings};
    use crate::error::ConfigError;
    use crate::sink::LogType;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.read_time_ms, 1000);
        assert_eq!(settings.log_type, LogType::Template);
        assert!(settings.log_file.is_none());
        assert!(settings.formats().is_ok());
    }

    #[test]
    fn output_choice() {
        assert_eq!(
            OutputChoice::parse("3").unwrap(),
            OutputChoice::Type(LogType::ElapsedFahrenheit)
        );
        assert_eq!(
            OutputChoice::parse("%s %C").unwrap(),
            OutputChoice::Pattern("%s %C".into())
        );
        assert!(matches!(
            OutputChoice::parse("9"),
            Err(ConfigError::BadLogType(9))
        ));
    }

    #[test]
    fn overrides_win() {
        let mut settings = Settings {
            port: "/dev/ttyS0".into(),
            read_time_ms: 750,
            ..Settings::default()
        };
        settings.apply(Overrides {
            port: Some("/dev/ttyUSB0".into()),
            read_time_ms: Some(0),
            output: Some(OutputChoice::Pattern("%s %.1C".into())),
            counter_format: Some("%s %C".into()),
            ..Overrides::default()
        });
        assert_eq!(settings.port, "/dev/ttyUSB0");
        assert_eq!(settings.read_time_ms, 750);
        assert_eq!(settings.log_type, LogType::Custom);
        assert_eq!(settings.temp_format, "%s %.1C");
        assert_eq!(settings.counter_format, "%s %C");
        assert_eq!(settings.humidity_format, super::DEFAULT_HUMIDITY_FORMAT);
    }

    #[test]
    fn bad_pattern_is_a_config_error() {
        let settings = Settings {
            humidity_format: "%*h".into(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.formats(),
            Err(ConfigError::BadPattern { .. })
        ));
    }
}
