//! DS2422/DS2423 counters, read with Read Memory + Counter.

use embedded_hal::delay::DelayNs;
use embedded_onewire::OneWireNet;

use super::{Context, Counter, Family, Reading};
use crate::error::AcquireError;

const READ_MEMORY_COUNTER: u8 = 0xa5;

/// Command, two address bytes, the last data byte of the page and the
/// 32 bit counter.
const BLOCK_LEN: usize = 8;

/// First and last memory page carrying a counter.
fn pages(family: Family) -> (u16, u16) {
    match family {
        Family::Ds2422 => (2, 3),
        _ => (14, 15),
    }
}

fn read_page<N: OneWireNet, D: DelayNs>(
    ctx: &mut Context<'_, N, D>,
    page: u16,
) -> Result<u32, AcquireError<N::BusError>> {
    if !ctx.access() {
        return Err(AcquireError::NoResponse(ctx.rom));
    }
    let [lo, hi] = (page * 32 + 31).to_le_bytes();
    let mut block = [0xff; BLOCK_LEN];
    block[..3].copy_from_slice(&[READ_MEMORY_COUNTER, lo, hi]);
    ctx.net.block(&mut block).map_err(|e| ctx.bus_error(e))?;
    Ok(u32::from_le_bytes([block[4], block[5], block[6], block[7]]))
}

pub(crate) fn read<N: OneWireNet, D: DelayNs>(
    ctx: &mut Context<'_, N, D>,
    family: Family,
) -> Result<Reading, AcquireError<N::BusError>> {
    let (first, last) = pages(family);
    let mut counters = Vec::with_capacity(2);
    for page in first..=last {
        match read_page(ctx, page) {
            Ok(value) => counters.push(Counter {
                number: (page - first) as u8,
                value,
            }),
            Err(e) => log::warn!("counter page {page}: {e}"),
        }
    }
    Ok(Reading::Counters(counters))
}
