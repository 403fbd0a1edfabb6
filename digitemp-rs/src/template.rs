//! Output line templates.
//!
//! A template is strftime text with a few extra conversions:
//!
//! | Token | Value |
//! |-------|-------|
//! | `%s` | sensor index |
//! | `%C` | temperature in °C, or the counter value for counters |
//! | `%F` | temperature in °F, nothing for counters |
//! | `%h` | relative humidity, whole percent |
//! | `%n` | counter number |
//! | `%R` | device address, 16 hex digits |
//! | `%N` | seconds since the Unix epoch |
//!
//! Width, zero padding and precision are accepted in the printf manner, as
//! in `%.2C` or `%03s`. Everything else is left to [strftime].

use core::fmt::{self, Write};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone};
use embedded_onewire::Rom;

use crate::error::ConfigError;
use crate::family::Counter;

/// Values a template can refer to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Values {
    pub sensor: usize,
    pub celsius: f64,
    pub humidity: Option<f64>,
    pub rom: Rom,
    /// Set when rendering a counter line.
    pub counter: Option<Counter>,
}

impl Values {
    pub fn temperature(sensor: usize, rom: Rom, celsius: f64) -> Self {
        Self {
            sensor,
            celsius,
            humidity: None,
            rom,
            counter: None,
        }
    }

    pub fn humidity(sensor: usize, rom: Rom, celsius: f64, humidity: f64) -> Self {
        Self {
            humidity: Some(humidity),
            ..Self::temperature(sensor, rom, celsius)
        }
    }

    pub fn counter(sensor: usize, rom: Rom, counter: Counter) -> Self {
        Self {
            counter: Some(counter),
            ..Self::temperature(sensor, rom, 0.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Directive {
    zero: bool,
    width: usize,
    precision: Option<usize>,
}

impl Directive {
    fn parse(body: &str) -> Option<Self> {
        let (width, precision) = match body.split_once('.') {
            Some((w, p)) => (w, Some(p)),
            None => (body, None),
        };
        let number = |s: &str| -> Option<usize> {
            if s.is_empty() {
                Some(0)
            } else if s.bytes().all(|b| b.is_ascii_digit()) {
                s.parse().ok()
            } else {
                None
            }
        };
        Some(Self {
            zero: width.starts_with('0'),
            width: number(width)?,
            precision: match precision {
                Some(p) => Some(number(p)?),
                None => None,
            },
        })
    }

    fn pad(&self, text: &str, out: &mut String) {
        let fill = self.width.saturating_sub(text.chars().count());
        if self.zero {
            let (sign, digits) = match text.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => ("", text),
            };
            out.push_str(sign);
            out.extend(core::iter::repeat_n('0', fill));
            out.push_str(digits);
        } else {
            out.extend(core::iter::repeat_n(' ', fill));
            out.push_str(text);
        }
    }

    fn int(&self, value: i64, out: &mut String) {
        self.pad(&value.to_string(), out);
    }

    fn float(&self, value: f64, out: &mut String) {
        let precision = self.precision.unwrap_or(6);
        self.pad(&format!("{value:.precision$}"), out);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Sensor,
    Celsius,
    Fahrenheit,
    Humidity,
    CounterNumber,
    Address,
}

impl Conversion {
    fn from_letter(letter: char) -> Option<Self> {
        Some(match letter {
            's' => Self::Sensor,
            'C' => Self::Celsius,
            'F' => Self::Fahrenheit,
            'h' => Self::Humidity,
            'n' => Self::CounterNumber,
            'R' => Self::Address,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Literal text and strftime specifiers, copied as is.
    Text(String),
    Token {
        directive: Directive,
        conversion: Conversion,
        /// The specifier as written, used where the conversion does not apply.
        raw: String,
    },
}

/// A parsed output template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

/// Splits `pattern` into text and conversion specifiers. A specifier is `%`
/// followed by a run of alphanumerics, `.`, `*` and `%`, ending right after
/// the first letter.
fn lex(pattern: &str) -> Vec<(bool, &str)> {
    let mut pieces = Vec::new();
    let mut rest = pattern;
    while !rest.is_empty() {
        match rest.find('%') {
            Some(0) => {
                let mut end = 0;
                for (i, c) in rest.char_indices() {
                    if !(c.is_ascii_alphanumeric() || matches!(c, '.' | '*' | '%')) {
                        break;
                    }
                    end = i + c.len_utf8();
                    if c.is_ascii_alphabetic() {
                        break;
                    }
                }
                pieces.push((true, &rest[..end]));
                rest = &rest[end..];
            }
            Some(at) => {
                pieces.push((false, &rest[..at]));
                rest = &rest[at..];
            }
            None => {
                pieces.push((false, rest));
                rest = "";
            }
        }
    }
    pieces
}

impl Template {
    /// Parses `pattern`. Conversions with unsupported modifiers and
    /// strftime specifiers chrono does not know are rejected.
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        let bad = |reason| ConfigError::BadPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let mut segments: Vec<Segment> = Vec::new();
        for (is_directive, piece) in lex(pattern) {
            let conversion = piece
                .chars()
                .last()
                .filter(|_| is_directive)
                .and_then(Conversion::from_letter);
            let body = piece.get(1..piece.len().saturating_sub(1)).unwrap_or("");
            match conversion {
                Some(_) if body.contains('%') => push_text(&mut segments, piece),
                Some(conversion) => {
                    let directive = Directive::parse(body).ok_or_else(|| bad("unsupported conversion modifier"))?;
                    segments.push(Segment::Token {
                        directive,
                        conversion,
                        raw: piece.to_string(),
                    });
                }
                None if is_directive && piece.ends_with('N') => {
                    // Epoch seconds come from the time pass.
                    push_text(&mut segments, &format!("{}s", &piece[..piece.len() - 1]));
                }
                None => push_text(&mut segments, piece),
            }
        }

        let template = Self {
            source: pattern.to_string(),
            segments,
        };
        let probe = template.expand(&Values::temperature(0, Rom::default(), 0.0));
        if StrftimeItems::new(&probe).any(|item| matches!(item, Item::Error)) {
            return Err(bad("unsupported time format specifier"));
        }
        Ok(template)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Substitutes the conversions, leaving strftime specifiers for [render](Self::render).
    pub fn expand(&self, values: &Values) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Token {
                    directive,
                    conversion,
                    raw,
                } => match (conversion, values.counter) {
                    (Conversion::Sensor, _) => directive.int(values.sensor as i64, &mut out),
                    (Conversion::Address, _) => directive.pad(&values.rom.to_string(), &mut out),
                    (Conversion::Celsius, None) => directive.float(values.celsius, &mut out),
                    (Conversion::Fahrenheit, None) => directive.float(crate::c2f(values.celsius), &mut out),
                    (Conversion::Humidity, None) => {
                        let humidity = values.humidity.map_or(-1, |h| h.trunc() as i64);
                        directive.int(humidity, &mut out);
                    }
                    (Conversion::CounterNumber, None) | (Conversion::Humidity, Some(_)) => {
                        out.push_str(raw)
                    }
                    (Conversion::Celsius, Some(counter)) => {
                        directive.int(i64::from(counter.value), &mut out)
                    }
                    (Conversion::CounterNumber, Some(counter)) => {
                        directive.int(i64::from(counter.number), &mut out)
                    }
                    (Conversion::Fahrenheit, Some(_)) => {}
                },
            }
        }
        out
    }

    /// Expands the template and formats the result at `time`.
    pub fn render<Tz: TimeZone>(&self, values: &Values, time: &DateTime<Tz>) -> String
    where
        Tz::Offset: fmt::Display,
    {
        strftime(&self.expand(values), time)
    }
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if let Some(Segment::Text(last)) = segments.last_mut() {
        last.push_str(text);
    } else {
        segments.push(Segment::Text(text.to_string()));
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Formats `time` with a strftime pattern. A pattern chrono cannot format is
/// returned unchanged.
pub fn strftime<Tz: TimeZone>(pattern: &str, time: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    let items = StrftimeItems::new(pattern);
    let mut out = String::new();
    match write!(out, "{}", time.format_with_items(items)) {
        Ok(()) => out,
        Err(_) => {
            log::warn!("cannot format time with {pattern:?}");
            pattern.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use embedded_onewire::Rom;

    use super::{Template, Values, strftime};
    use crate::error::ConfigError;
    use crate::family::Counter;

    const ROM: Rom = Rom::new([0x10, 0xa1, 0x2f, 0x3c, 0x00, 0x08, 0x00, 0x5e]);

    fn expand(pattern: &str, values: &Values) -> String {
        Template::parse(pattern).unwrap().expand(values)
    }

    #[test]
    fn substitutes_sensor_and_celsius() {
        let values = Values::temperature(3, ROM, 23.66);
        assert_eq!(expand("%s C: %.2C", &values), "3 C: 23.66");
        assert_eq!(
            expand("%b %d %H:%M:%S Sensor %s C: %.2C F: %.2F", &values),
            "%b %d %H:%M:%S Sensor 3 C: 23.66 F: 74.59"
        );
    }

    #[test]
    fn printf_modifiers() {
        let values = Values::temperature(7, ROM, -3.14159);
        assert_eq!(expand("[%03s]", &values), "[007]");
        assert_eq!(expand("[%8.3C]", &values), "[  -3.142]");
        assert_eq!(expand("[%08.1C]", &values), "[-00003.1]");
        assert_eq!(expand("[%C]", &values), "[-3.141590]");
    }

    #[test]
    fn address_and_humidity() {
        let values = Values::humidity(0, ROM, 21.0, 45.7);
        assert_eq!(expand("%R H: %h%%", &values), "10A12F3C0008005E H: 45%%");
        let values = Values::temperature(0, ROM, 21.0);
        assert_eq!(expand("%h", &values), "-1");
    }

    #[test]
    fn counter_conversions() {
        let values = Values::counter(
            2,
            ROM,
            Counter {
                number: 1,
                value: 12345,
            },
        );
        assert_eq!(
            expand("%b %d %H:%M:%S Sensor %s #%n %C%F", &values),
            "%b %d %H:%M:%S Sensor 2 #1 12345"
        );
    }

    #[test]
    fn render_with_time() {
        let time = Utc.with_ymd_and_hms(2024, 1, 5, 8, 3, 9).unwrap();
        let template = Template::parse("%b %d %H:%M:%S Sensor %s C: %.2C").unwrap();
        let line = template.render(&Values::temperature(0, ROM, 19.5), &time);
        assert_eq!(line, "Jan 05 08:03:09 Sensor 0 C: 19.50");

        let template = Template::parse("%N %R").unwrap();
        let line = template.render(&Values::temperature(0, ROM, 19.5), &time);
        assert_eq!(line, format!("{} 10A12F3C0008005E", time.timestamp()));
    }

    #[test]
    fn temperature_context_keeps_counter_number_for_strftime() {
        let time = Utc.with_ymd_and_hms(2024, 1, 5, 8, 3, 9).unwrap();
        let template = Template::parse("a%nb").unwrap();
        assert_eq!(template.render(&Values::temperature(0, ROM, 0.0), &time), "a\nb");
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        assert!(matches!(
            Template::parse("C: %*C"),
            Err(ConfigError::BadPattern { .. })
        ));
        assert!(matches!(
            Template::parse("%1.2.3C"),
            Err(ConfigError::BadPattern { .. })
        ));
        assert!(matches!(
            Template::parse("trailing %"),
            Err(ConfigError::BadPattern { .. })
        ));
        assert!(Template::parse("100%% at %H").is_ok());
    }

    #[test]
    fn strftime_passes_plain_text() {
        let time = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 1).unwrap();
        assert_eq!(strftime("%Y-%m-%d %H:%M:%S", &time), "2024-12-31 23:59:01");
        assert_eq!(strftime("no tokens", &time), "no tokens");
    }
}
