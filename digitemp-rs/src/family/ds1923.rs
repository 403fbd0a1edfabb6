//! DS1923 Hygrochron temperature/humidity logger.

use embedded_hal::delay::DelayNs;
use embedded_onewire::OneWireNet;

use super::{Context, MAX_READ_TRIES, Reading};
use crate::error::AcquireError;

const FORCED_CONVERSION: [u8; 2] = [0x55, 0x55];
const READ_MEMORY_WITH_PASSWORD: u8 = 0x69;
/// Latest temperature and humidity results, `0x020C..=0x020F`.
const RESULTS_ADDRESS: [u8; 2] = [0x0c, 0x02];
const DUMMY_PASSWORD: u8 = 0x04;

/// Worst case forced conversion time, ms.
const CONVERSION_MS: u32 = 666;

fn temperature(lsb: u8, msb: u8) -> f64 {
    f64::from(i16::from(msb / 2) - 41) + f64::from(lsb) / 512.0
}

fn humidity(lsb: u8, msb: u8) -> f64 {
    let ival = u16::from_le_bytes([lsb, msb]) / 16;
    let volts = f64::from(ival) * 5.02 / 4096.0;
    (volts - 0.958) / 0.0307
}

fn read_results<N: OneWireNet, D: DelayNs>(
    ctx: &mut Context<'_, N, D>,
) -> Result<Option<Reading>, AcquireError<N::BusError>> {
    if !ctx.access() {
        return Ok(None);
    }
    for b in FORCED_CONVERSION {
        ctx.net.write_byte(b).map_err(|e| ctx.bus_error(e))?;
    }
    ctx.delay.delay_ms(CONVERSION_MS);

    if !ctx.access() {
        return Ok(None);
    }
    ctx.net
        .write_byte(READ_MEMORY_WITH_PASSWORD)
        .map_err(|e| ctx.bus_error(e))?;
    let mut address = RESULTS_ADDRESS;
    ctx.net.block(&mut address).map_err(|e| ctx.bus_error(e))?;
    if address != RESULTS_ADDRESS {
        log::debug!("{}: address echo {address:02x?}", ctx.rom);
        return Ok(None);
    }
    for _ in 0..8 {
        ctx.net
            .write_byte(DUMMY_PASSWORD)
            .map_err(|e| ctx.bus_error(e))?;
    }

    let mut results = [0u8; 4];
    for b in results.iter_mut() {
        *b = ctx.net.read_byte().map_err(|e| ctx.bus_error(e))?;
    }
    let [t_lsb, t_msb, h_lsb, h_msb] = results;
    Ok(Some(Reading::Humidity {
        celsius: temperature(t_lsb, t_msb),
        humidity: humidity(h_lsb, h_msb),
    }))
}

pub(crate) fn read<N: OneWireNet, D: DelayNs>(
    ctx: &mut Context<'_, N, D>,
) -> Result<Reading, AcquireError<N::BusError>> {
    for _ in 0..MAX_READ_TRIES {
        if let Some(reading) = read_results(ctx)? {
            return Ok(reading);
        }
        ctx.recover();
    }
    Err(AcquireError::Exhausted {
        rom: ctx.rom,
        attempts: MAX_READ_TRIES,
    })
}
