//! DS2438 smart battery monitor, read either as a temperature/humidity
//! sensor with a HIH-3610 on its A/D input or as a plain A/D converter.

use bitfield_struct::bitfield;
use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWireCrc, OneWireNet};

use super::{Context, Family, MAX_READ_TRIES, Reading};
use crate::error::AcquireError;

const CONVERT_T: u8 = 0x44;
const CONVERT_V: u8 = 0xb4;
const RECALL_MEMORY: u8 = 0xb8;
const READ_SCRATCHPAD: u8 = 0xbe;
const WRITE_SCRATCHPAD: u8 = 0x4e;
const COPY_SCRATCHPAD: u8 = 0x48;
const PAGE_0: u8 = 0x00;

/// Conversion and copy time, ms.
const CONVERSION_MS: u32 = 10;

/// Read block: command, page number, then the 8 page bytes and their CRC.
const BLOCK_LEN: usize = 11;

/// Status/configuration register, byte 0 of page 0.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct Ds2438Config {
    /// Current A/D and ICA integration enabled.
    pub iad: bool,
    /// Current accumulator enabled.
    pub ca: bool,
    /// Shadow the current accumulator to EEPROM.
    pub ee: bool,
    /// Voltage conversions measure VDD when set, VAD otherwise.
    pub ad: bool,
    /// Temperature conversion in progress.
    pub tb: bool,
    /// EEPROM copy in progress.
    pub nvb: bool,
    /// Voltage conversion in progress.
    pub adb: bool,
    #[bits(1)]
    __: u8,
}

/// Recalls page 0 to the scratchpad and reads it back.
fn read_page0<N: OneWireNet, D: DelayNs>(
    ctx: &mut Context<'_, N, D>,
) -> Result<[u8; BLOCK_LEN], AcquireError<N::BusError>> {
    command(ctx, &[RECALL_MEMORY, PAGE_0])?;
    if !ctx.access() {
        return Err(AcquireError::NoResponse(ctx.rom));
    }
    let mut block = [0xff; BLOCK_LEN];
    block[0] = READ_SCRATCHPAD;
    block[1] = PAGE_0;
    ctx.net.block(&mut block).map_err(|e| ctx.bus_error(e))?;
    ctx.dump(Family::Ds2438, &block);

    if !OneWireCrc::validate(&block[2..]) {
        log::debug!("{}: page 0 CRC mismatch", ctx.rom);
        return Err(AcquireError::InvalidCrc(ctx.rom));
    }
    Ok(block)
}

/// Sends `bytes` to the addressed device.
fn command<N: OneWireNet, D: DelayNs>(
    ctx: &mut Context<'_, N, D>,
    bytes: &[u8],
) -> Result<(), AcquireError<N::BusError>> {
    if !ctx.access() {
        return Err(AcquireError::NoResponse(ctx.rom));
    }
    for &b in bytes {
        ctx.net.write_byte(b).map_err(|e| ctx.bus_error(e))?;
    }
    Ok(())
}

pub(crate) fn read_temperature<N: OneWireNet, D: DelayNs>(
    ctx: &mut Context<'_, N, D>,
) -> Result<f64, AcquireError<N::BusError>> {
    command(ctx, &[CONVERT_T])?;
    ctx.delay.delay_ms(CONVERSION_MS);
    let page = read_page0(ctx)?;
    let raw = i16::from_le_bytes([page[3], page[4]]) >> 3;
    Ok(f64::from(raw) * 0.03125)
}

/// Reads VDD (`supply`) or VAD, in volts, along with the current register.
pub(crate) fn read_voltage<N: OneWireNet, D: DelayNs>(
    ctx: &mut Context<'_, N, D>,
    supply: bool,
) -> Result<(f64, i16), AcquireError<N::BusError>> {
    let page = read_page0(ctx)?;
    let config = Ds2438Config::from_bits(page[2]).with_ad(supply);
    command(ctx, &[WRITE_SCRATCHPAD, PAGE_0, config.into_bits()])?;
    command(ctx, &[COPY_SCRATCHPAD, PAGE_0])?;
    ctx.delay.delay_ms(CONVERSION_MS);

    command(ctx, &[CONVERT_V])?;
    ctx.delay.delay_ms(CONVERSION_MS);
    let page = read_page0(ctx)?;

    let volts = f64::from(u16::from_le_bytes([page[5], page[6]]) & 0x3ff) / 100.0;
    let current = i16::from_le_bytes([page[7], page[8]]);
    Ok((volts, current))
}

/// HIH-3610 relative humidity from its output and supply voltage.
fn hih3610(vad: f64, vdd: f64, celsius: f64) -> f64 {
    let humidity = ((vad / vdd) - 0.16) * 161.29 / (1.0546 - 0.00216 * celsius);
    humidity.clamp(0.0, 100.0)
}

pub(crate) fn read<N: OneWireNet, D: DelayNs>(
    ctx: &mut Context<'_, N, D>,
) -> Result<Reading, AcquireError<N::BusError>> {
    for attempt in 1..=MAX_READ_TRIES {
        let celsius = read_temperature(ctx)?;
        let voltages = read_voltage(ctx, true)
            .and_then(|(vdd, cad)| read_voltage(ctx, false).map(|(vad, _)| (vdd, vad, cad)));
        match voltages {
            Ok((vdd, vad, cad)) if ctx.options.ad_mode => {
                return Ok(Reading::Analog {
                    celsius,
                    vdd,
                    vad,
                    cad,
                });
            }
            Ok((vdd, vad, _)) => {
                return Ok(Reading::Humidity {
                    celsius,
                    humidity: hih3610(vad, vdd, celsius),
                });
            }
            Err(e) => {
                log::debug!("{}: voltage read attempt {attempt} failed: {e}", ctx.rom);
                ctx.recover();
            }
        }
    }
    Err(AcquireError::Exhausted {
        rom: ctx.rom,
        attempts: MAX_READ_TRIES,
    })
}

#[cfg(test)]
mod tests {
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_onewire::OneWireCrc;

    use super::{Ds2438Config, hih3610};
    use crate::error::AcquireError;
    use crate::family::{Options, Reading, acquire};
    use crate::sim::{SimNet, rom};

    fn page(config: u8, celsius: f64, volts: f64, current: i16) -> Vec<u8> {
        let t = (((celsius / 0.03125) as i16) << 3).to_le_bytes();
        let v = ((volts * 100.0).round() as u16).to_le_bytes();
        let c = current.to_le_bytes();
        let mut block = vec![0xbe, 0x00, config, t[0], t[1], v[0], v[1], c[0], c[1], 0x00];
        block.push(OneWireCrc::checksum(&block[2..]));
        block
    }

    fn script(net: &mut SimNet, dev: embedded_onewire::Rom, celsius: f64, vdd: f64, vad: f64) {
        net.script_block(dev, &page(0x00, celsius, 0.0, 0));
        net.script_block(dev, &page(0x00, celsius, 0.0, 0));
        net.script_block(dev, &page(0x08, celsius, vdd, -12));
        net.script_block(dev, &page(0x08, celsius, 0.0, 0));
        net.script_block(dev, &page(0x00, celsius, vad, 0));
    }

    #[test]
    fn config_register_bits() {
        let config = Ds2438Config::new().with_iad(true).with_ad(true);
        assert_eq!(config.into_bits(), 0x09);
        assert!(Ds2438Config::from_bits(0x40).adb());
    }

    #[test]
    fn humidity_from_both_voltages() {
        let dev = rom(0x26, 1);
        let mut net = SimNet::new().with_device(dev);
        script(&mut net, dev, 25.0, 5.0, 2.0);
        let acq = acquire(&mut net, &mut NoopDelay::new(), Options::default(), dev);
        let (celsius, humidity) = match acq.result {
            Ok(Reading::Humidity { celsius, humidity }) => (celsius, humidity),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(celsius, 25.0);
        assert!((humidity - hih3610(2.0, 5.0, 25.0)).abs() < 1e-9);
        assert!(net.written.windows(3).any(|w| w == [0x4e, 0x00, 0x08]));
        assert!(net.written.windows(3).any(|w| w == [0x4e, 0x00, 0x00]));
    }

    #[test]
    fn analog_mode_reports_raw_voltages() {
        let dev = rom(0x26, 1);
        let mut net = SimNet::new().with_device(dev);
        script(&mut net, dev, -10.5, 4.98, 1.23);
        let options = Options {
            ad_mode: true,
            ..Options::default()
        };
        let acq = acquire(&mut net, &mut NoopDelay::new(), options, dev);
        let (celsius, vdd, vad, cad) = match acq.result {
            Ok(Reading::Analog { celsius, vdd, vad, cad }) => (celsius, vdd, vad, cad),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(celsius, -10.5);
        assert!((vdd - 4.98).abs() < 1e-9);
        assert!((vad - 1.23).abs() < 1e-9);
        assert_eq!(cad, -12);
    }

    #[test]
    fn humidity_is_clamped() {
        assert_eq!(hih3610(0.1, 5.0, 25.0), 0.0);
        assert_eq!(hih3610(5.0, 5.0, 25.0), 100.0);
    }

    #[test]
    fn temperature_failure_is_immediate() {
        let dev = rom(0x26, 1);
        let mut net = SimNet::new().with_device(dev);
        let mut bad = page(0x00, 25.0, 0.0, 0);
        bad[10] ^= 0x55;
        net.script_block(dev, &bad);
        let acq = acquire(&mut net, &mut NoopDelay::new(), Options::default(), dev);
        assert!(matches!(acq.result, Err(AcquireError::InvalidCrc(_))));
        assert_eq!(net.count_written(0x44), 1);
    }

    #[test]
    fn voltage_failures_are_retried() {
        let dev = rom(0x26, 1);
        let mut net = SimNet::new().with_device(dev);
        net.script_block(dev, &page(0x00, 25.0, 0.0, 0));
        let mut bad = page(0x00, 25.0, 0.0, 0);
        bad[10] ^= 0x55;
        net.script_block(dev, &bad);
        script(&mut net, dev, 25.0, 5.0, 2.0);
        let acq = acquire(&mut net, &mut NoopDelay::new(), Options::default(), dev);
        assert!(matches!(acq.result, Ok(Reading::Humidity { .. })));
        assert_eq!(net.count_written(0x44), 2);
    }
}
