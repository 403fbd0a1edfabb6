//! Addressable switches: DS2413 and DS28EA00 PIO status, DS2406 channel access.

use bitfield_struct::bitfield;
use embedded_hal::delay::DelayNs;
use embedded_onewire::OneWireNet;

use super::{Context, Reading};
use crate::error::AcquireError;

const PIO_ACCESS_READ: u8 = 0xf5;
const CHANNEL_ACCESS: u8 = 0xf5;

/// DS2406 channel control byte 1.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct ChannelControl {
    /// CRC generation: 0 none, 1 per byte, 2 per 8 bytes, 3 per 32 bytes.
    #[bits(2)]
    pub crc: u8,
    /// Channel select: 1 A, 2 B, 3 both.
    #[bits(2)]
    pub chs: u8,
    /// Interleave mode.
    pub ic: bool,
    /// Toggle between read and write.
    pub tog: bool,
    /// Inverts the default access direction.
    pub im: bool,
    /// Activity latch reset.
    pub alr: bool,
}

impl ChannelControl {
    /// Reads channel A asynchronously and clears the activity latches.
    pub const fn read_latches() -> Self {
        Self::new()
            .with_alr(true)
            .with_ic(true)
            .with_chs(1)
    }
}

/// DS2406 channel info byte.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct ChannelInfo {
    pub flipflop_a: bool,
    pub flipflop_b: bool,
    /// Sensed level of PIO-A.
    pub level_a: bool,
    pub level_b: bool,
    /// PIO-A saw activity since the last latch reset.
    pub latch_a: bool,
    pub latch_b: bool,
    /// The package has a PIO-B.
    pub two_channels: bool,
    /// VCC is supplied.
    pub powered: bool,
}

/// PIO status byte of a DS2413 or DS28EA00. The upper nibble is the
/// complement of the lower one.
pub(crate) fn read_status<N: OneWireNet, D: DelayNs>(
    ctx: &mut Context<'_, N, D>,
) -> Result<Reading, AcquireError<N::BusError>> {
    if !ctx.access() {
        return Err(AcquireError::NoResponse(ctx.rom));
    }
    ctx.net
        .write_byte(PIO_ACCESS_READ)
        .map_err(|e| ctx.bus_error(e))?;
    let status = ctx.net.read_byte().map_err(|e| ctx.bus_error(e))?;
    if !ctx.access() {
        return Err(AcquireError::NoResponse(ctx.rom));
    }

    if (status ^ (status >> 4)) & 0x0f != 0x0f {
        return Err(AcquireError::SelfCheck {
            rom: ctx.rom,
            status,
        });
    }
    Ok(Reading::Pio { status })
}

/// Channel info and one data byte of a DS2406.
pub(crate) fn read_switch<N: OneWireNet, D: DelayNs>(
    ctx: &mut Context<'_, N, D>,
) -> Result<Reading, AcquireError<N::BusError>> {
    if !ctx.access() {
        return Err(AcquireError::NoResponse(ctx.rom));
    }
    let mut block = [
        CHANNEL_ACCESS,
        ChannelControl::read_latches().into_bits(),
        0xff,
        0xff,
        0xff,
    ];
    ctx.net.block(&mut block).map_err(|e| ctx.bus_error(e))?;
    Ok(Reading::Switch {
        info: ChannelInfo::from_bits(block[3]),
        data: block[4],
    })
}
