//! DS1820/DS18S20, DS18B20, DS1822 and DS28EA00 thermometers.

use embedded_onewire::OneWireCrc;
use fixed::types::I12F4;

use super::{Decoded, Erratum, Family, Reading, Scratchpad};

/// Read block: READ SCRATCHPAD command followed by 8 data bytes and the CRC.
const BLOCK_LEN: usize = 10;

/// Scratchpad left by a DS18S20 that lost power during a conversion.
const POWER_ON_PATTERN: [(usize, u8); 4] = [(1, 0xaa), (2, 0x00), (7, 0x0c), (8, 0x10)];

#[derive(Debug)]
pub(crate) struct Thermometer {
    family: Family,
    glitch_seen: bool,
    pattern_seen: bool,
}

impl Thermometer {
    pub(crate) fn new(family: Family) -> Self {
        Self {
            family,
            glitch_seen: false,
            pattern_seen: false,
        }
    }

    fn ds1820(&mut self, pad: &[u8]) -> Decoded {
        let remain = pad[7];
        let per_c = pad[8];

        if per_c.wrapping_sub(remain) == 1 && !self.glitch_seen {
            self.glitch_seen = true;
            return Decoded::Erratum(Erratum::CountGlitch);
        }
        if POWER_ON_PATTERN.iter().all(|&(i, v)| pad[i] == v) && !self.pattern_seen {
            self.pattern_seen = true;
            return Decoded::Erratum(Erratum::PowerOnPattern);
        }

        let mut raw = pad[1] as i16;
        if pad[2] != 0 {
            raw -= 0x100;
        }
        let mut celsius = f64::from(raw >> 1) - 0.25;
        if per_c != 0 {
            celsius += f64::from(i16::from(per_c) - i16::from(remain)) / f64::from(per_c);
        } else {
            log::warn!("DS1820 count per degree is 0, using the 0.5 °C reading");
        }
        Decoded::Reading(Reading::Temperature { celsius })
    }
}

impl Scratchpad for Thermometer {
    fn family(&self) -> Family {
        self.family
    }

    fn block_len(&self) -> usize {
        BLOCK_LEN
    }

    fn validate(&self, pad: &[u8]) -> bool {
        let valid = OneWireCrc::validate(&pad[1..]);
        if !valid {
            log::warn!(
                "{}: scratchpad CRC mismatch, got 0x{:02X}",
                self.family.name(),
                pad[BLOCK_LEN - 1]
            );
        }
        valid
    }

    fn decode(&mut self, pad: &[u8]) -> Decoded {
        match self.family {
            Family::Ds1820 => self.ds1820(pad),
            _ => {
                let celsius = I12F4::from_le_bytes([pad[1], pad[2]]);
                Decoded::Reading(Reading::Temperature {
                    celsius: celsius.to_num(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_onewire::PowerLevel;

    use super::Thermometer;
    use crate::error::AcquireError;
    use crate::family::{Context, Dispatcher, Family, MAX_READ_TRIES, Options, Reading, State, acquire};
    use crate::sim::{SimNet, rom, with_crc};

    fn ds1820(t: u8, sign: u8, remain: u8, per_c: u8) -> Vec<u8> {
        with_crc(&[0xbe, t, sign, 0x4b, 0x46, 0xff, 0xff, remain, per_c])
    }

    fn read(net: &mut SimNet, family: Family) -> (Result<Reading, AcquireError<()>>, u8, State) {
        let mut delay = NoopDelay::new();
        let mut ctx = Context::new(net, &mut delay, Options::default(), rom(family.code(), 1));
        let mut dispatcher = Dispatcher::new(Thermometer::new(family));
        let result = dispatcher.run(&mut ctx);
        (result, dispatcher.attempts(), dispatcher.state())
    }

    #[test]
    fn ds18b20_decodes_fixed_point() {
        let dev = rom(0x28, 1);
        let mut net = SimNet::new().with_device(dev);
        net.script_block(dev, &with_crc(&[0xbe, 0x91, 0x01, 0x4b, 0x46, 0x7f, 0xff, 0x0f, 0x10]));
        let (result, attempts, state) = read(&mut net, Family::Ds18b20);
        assert_eq!(result.unwrap(), Reading::Temperature { celsius: 25.0625 });
        assert_eq!(attempts, 1);
        assert_eq!(state, State::Decoded);
        assert_eq!(net.count_written(0x44), 1);
        assert_eq!(net.power, [PowerLevel::Strong, PowerLevel::Normal]);
    }

    #[test]
    fn ds18b20_negative() {
        let dev = rom(0x28, 1);
        let mut net = SimNet::new().with_device(dev);
        net.script_block(dev, &with_crc(&[0xbe, 0x5e, 0xff, 0x4b, 0x46, 0x7f, 0xff, 0x0f, 0x10]));
        let (result, ..) = read(&mut net, Family::Ds18b20);
        assert_eq!(result.unwrap(), Reading::Temperature { celsius: -10.125 });
    }

    #[test]
    fn ds1820_interpolates_count_remaining() {
        let dev = rom(0x10, 1);
        let mut net = SimNet::new().with_device(dev);
        net.script_block(dev, &ds1820(0x32, 0x00, 0x0c, 0x10));
        let (result, ..) = read(&mut net, Family::Ds1820);
        assert_eq!(result.unwrap(), Reading::Temperature { celsius: 25.0 });

        net.script_block(dev, &ds1820(0xce, 0xff, 0x08, 0x10));
        let (result, ..) = read(&mut net, Family::Ds1820);
        assert_eq!(result.unwrap(), Reading::Temperature { celsius: -25.25 + 0.5 });
    }

    #[test]
    fn ds1820_zero_count_per_degree() {
        let dev = rom(0x10, 1);
        let mut net = SimNet::new().with_device(dev);
        net.script_block(dev, &ds1820(0x32, 0x00, 0x00, 0x00));
        let (result, ..) = read(&mut net, Family::Ds1820);
        assert_eq!(result.unwrap(), Reading::Temperature { celsius: 24.75 });
    }

    #[test]
    fn glitch_retries_once_without_spending_an_attempt() {
        let dev = rom(0x10, 1);
        let mut net = SimNet::new().with_device(dev);
        net.script_block(dev, &ds1820(0x32, 0x00, 0x0f, 0x10));
        net.script_block(dev, &ds1820(0x32, 0x00, 0x0c, 0x10));
        let (result, attempts, _) = read(&mut net, Family::Ds1820);
        assert_eq!(result.unwrap(), Reading::Temperature { celsius: 25.0 });
        assert_eq!(attempts, 1);
        assert_eq!(net.count_written(0x44), 2);
    }

    #[test]
    fn repeated_glitch_is_accepted() {
        let dev = rom(0x10, 1);
        let mut net = SimNet::new().with_device(dev);
        net.script_block(dev, &ds1820(0x32, 0x00, 0x0f, 0x10));
        net.script_block(dev, &ds1820(0x32, 0x00, 0x0f, 0x10));
        let (result, ..) = read(&mut net, Family::Ds1820);
        assert_eq!(result.unwrap(), Reading::Temperature { celsius: 24.8125 });
    }

    #[test]
    fn glitch_then_bad_crcs_keeps_full_budget() {
        let dev = rom(0x10, 1);
        let mut net = SimNet::new().with_device(dev);
        net.script_block(dev, &ds1820(0x32, 0x00, 0x0f, 0x10));
        let mut corrupt = ds1820(0x32, 0x00, 0x0c, 0x10);
        corrupt[9] ^= 0x01;
        for _ in 0..MAX_READ_TRIES - 1 {
            net.script_block(dev, &corrupt);
        }
        net.script_block(dev, &ds1820(0x32, 0x00, 0x0c, 0x10));
        let (result, attempts, _) = read(&mut net, Family::Ds1820);
        assert_eq!(result.unwrap(), Reading::Temperature { celsius: 25.0 });
        assert_eq!(attempts, MAX_READ_TRIES);
    }

    #[test]
    fn power_on_pattern_is_read_again() {
        let dev = rom(0x10, 1);
        let mut net = SimNet::new().with_device(dev);
        net.script_block(dev, &ds1820(0xaa, 0x00, 0x0c, 0x10));
        net.script_block(dev, &ds1820(0x30, 0x00, 0x0c, 0x10));
        let (result, attempts, _) = read(&mut net, Family::Ds1820);
        assert_eq!(result.unwrap(), Reading::Temperature { celsius: 24.0 });
        assert_eq!(attempts, 1);
    }

    #[test]
    fn bad_crc_exhausts_the_budget() {
        let dev = rom(0x28, 1);
        let mut net = SimNet::new().with_device(dev);
        for _ in 0..MAX_READ_TRIES + 1 {
            net.script_block(dev, &[0xbe, 0, 0, 0, 0, 0, 0, 0, 0, 0x01]);
        }
        let (result, attempts, state) = read(&mut net, Family::Ds18b20);
        assert!(matches!(
            result,
            Err(AcquireError::Exhausted { attempts: MAX_READ_TRIES, .. })
        ));
        assert_eq!(attempts, MAX_READ_TRIES);
        assert_eq!(state, State::Failed);
        assert_eq!(net.count_written(0x44), usize::from(MAX_READ_TRIES));
    }

    #[test]
    fn conversion_power_failure_is_not_retried() {
        let dev = rom(0x28, 1);
        let mut net = SimNet::new().with_device(dev);
        net.power_fails = true;
        let (result, attempts, state) = read(&mut net, Family::Ds18b20);
        assert!(matches!(result, Err(AcquireError::Bus { .. })));
        assert_eq!(attempts, 1);
        assert_eq!(state, State::Failed);
    }

    #[test]
    fn missing_device_is_retried_then_reported() {
        let dev = rom(0x22, 1);
        let mut net = SimNet::new().with_device(dev);
        net.silence(dev);
        let mut delay = NoopDelay::new();
        let acq = acquire(&mut net, &mut delay, Options::default(), dev);
        assert_eq!(acq.family, Some(Family::Ds1822));
        assert!(matches!(acq.result, Err(AcquireError::Exhausted { .. })));
        assert_eq!(net.count_written(0x44), 0);
    }

    #[test]
    fn verbose_keeps_every_scratchpad() {
        let dev = rom(0x28, 1);
        let mut net = SimNet::new().with_device(dev);
        net.script_block(dev, &[0xbe, 0, 0, 0, 0, 0, 0, 0, 0, 0x01]);
        net.script_block(dev, &with_crc(&[0xbe, 0x91, 0x01, 0x4b, 0x46, 0x7f, 0xff, 0x0f, 0x10]));
        let mut delay = NoopDelay::new();
        let options = Options {
            verbose: true,
            ..Options::default()
        };
        let acq = acquire(&mut net, &mut delay, options, dev);
        assert!(acq.result.is_ok());
        assert_eq!(acq.dumps.len(), 2);
        assert_eq!(acq.dumps[1].bytes[1], 0x91);
    }
}
