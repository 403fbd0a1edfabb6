//! owslave humidity bridge: an AVR 1-Wire slave in front of a Sensirion SHT
//! sensor. Scratchpad bytes 1..=3 hold the humidity word and its CRC, 4..=6
//! the temperature word and its CRC, byte 7 the SHT generation.

use embedded_onewire::{ShtCrc, reverse8};

use super::{Decoded, Family, Reading, Scratchpad};

const BLOCK_LEN: usize = 8;

/// SHT2x parts, I²C interface.
const SHT2X: u8 = 2;

const MEASURE_HUMIDITY: u8 = 0x05;
const MEASURE_TEMPERATURE: u8 = 0x03;

// SHT1x/SHT7x linearisation and temperature compensation.
const C1: f64 = -2.0468;
const C2: f64 = 0.0367;
const C3: f64 = -1.5955e-6;
const T1: f64 = 0.01;
const T2: f64 = 0.00008;

#[derive(Debug)]
pub(crate) struct Owslave;

fn checksum(sensor_type: u8, command: u8, word: &[u8]) -> u8 {
    if sensor_type == SHT2X {
        let mut crc = ShtCrc::new();
        word.iter().for_each(|&b| crc.update(b));
        crc.value()
    } else {
        let mut crc = ShtCrc::seeded(command);
        word.iter().for_each(|&b| crc.update(b));
        reverse8(crc.value())
    }
}

impl Scratchpad for Owslave {
    fn family(&self) -> Family {
        Family::Owslave
    }

    fn block_len(&self) -> usize {
        BLOCK_LEN
    }

    fn validate(&self, pad: &[u8]) -> bool {
        let sensor_type = pad[7];
        let hcrc = checksum(sensor_type, MEASURE_HUMIDITY, &pad[1..3]);
        let tcrc = checksum(sensor_type, MEASURE_TEMPERATURE, &pad[4..6]);
        if hcrc != pad[3] {
            log::warn!("humidity CRC is 0x{:02X} instead of 0x{hcrc:02X}", pad[3]);
        }
        if tcrc != pad[6] {
            log::warn!("temperature CRC is 0x{:02X} instead of 0x{tcrc:02X}", pad[6]);
        }
        hcrc == pad[3] && tcrc == pad[6]
    }

    fn decode(&mut self, pad: &[u8]) -> Decoded {
        let rh = f64::from(u16::from_be_bytes([pad[1], pad[2] & !0x3]));
        let t = f64::from(u16::from_be_bytes([pad[4], pad[5] & !0x3]));

        let (celsius, humidity) = if pad[7] == SHT2X {
            (175.72 * t / 65536.0 - 46.85, 125.0 * rh / 65536.0 - 6.0)
        } else {
            let celsius = t * 0.01 - 40.1;
            let linear = C3 * rh * rh + C2 * rh + C1;
            let humidity = (celsius - 25.0) * (T1 + T2 * rh) + linear;
            (celsius, humidity.clamp(0.1, 100.0))
        };
        Decoded::Reading(Reading::Humidity { celsius, humidity })
    }
}
