//! Retry state machine for families read through a scratchpad.

use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWireNet, PowerLevel};

use super::{Context, Family, Reading};
use crate::error::AcquireError;

/// Attempts per read, not counting erratum retries.
pub const MAX_READ_TRIES: u8 = 5;

const CONVERT: u8 = 0x44;
const READ_SCRATCHPAD: u8 = 0xbe;

/// Progress of one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Addressed,
    Converting,
    Settling,
    ReadingScratchpad,
    Validating,
    Decoded,
    Retrying,
    Failed,
}

/// Known silicon errata that invalidate a scratchpad with a good CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Erratum {
    /// DS1820: count per °C minus count remaining is 1.
    CountGlitch,
    /// DS18S20: the `0xAA 0x00 .. 0x0C 0x10` power-on pattern.
    PowerOnPattern,
}

/// Result of decoding a scratchpad that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Reading(Reading),
    /// Discard the scratchpad and read again without spending an attempt.
    Erratum(Erratum),
}

/// Layout and decode rules of a family read through a scratchpad.
pub trait Scratchpad {
    fn family(&self) -> Family;

    /// Length of the read block, the command byte at offset 0 included.
    fn block_len(&self) -> usize;

    /// Whether the checksums in `pad` are correct.
    fn validate(&self, pad: &[u8]) -> bool;

    fn decode(&mut self, pad: &[u8]) -> Decoded;
}

/// Runs convert, settle, read scratchpad, validate and decode until a
/// reading is obtained or [MAX_READ_TRIES] attempts failed.
#[derive(Debug)]
pub struct Dispatcher<P> {
    protocol: P,
    state: State,
    attempts: u8,
    free_retry: bool,
}

impl<P: Scratchpad> Dispatcher<P> {
    pub fn new(protocol: P) -> Self {
        Self {
            protocol,
            state: State::Addressed,
            attempts: 0,
            free_retry: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Attempts spent so far.
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    pub fn run<N: OneWireNet, D: DelayNs>(
        &mut self,
        ctx: &mut Context<'_, N, D>,
    ) -> Result<Reading, AcquireError<N::BusError>> {
        let mut pad = vec![0xff; self.protocol.block_len()];
        loop {
            self.state = match self.state {
                State::Addressed => {
                    if !core::mem::take(&mut self.free_retry) {
                        self.attempts += 1;
                    }
                    if ctx.access() {
                        State::Converting
                    } else {
                        log::debug!("{}: no answer to attempt {}", ctx.rom, self.attempts);
                        State::Retrying
                    }
                }
                State::Converting => {
                    // A master that cannot power the conversion fails the
                    // read without spending the retry budget.
                    if let Err(e) = ctx.net.write_byte_power(CONVERT) {
                        self.state = State::Failed;
                        return Err(ctx.bus_error(e));
                    }
                    State::Settling
                }
                State::Settling => {
                    ctx.settle();
                    if let Err(e) = ctx.net.set_power_level(PowerLevel::Normal) {
                        log::warn!("{}: releasing strong pull-up failed: {e}", ctx.rom);
                    }
                    State::ReadingScratchpad
                }
                State::ReadingScratchpad => {
                    pad.fill(0xff);
                    pad[0] = READ_SCRATCHPAD;
                    if !ctx.access() {
                        State::Retrying
                    } else if let Err(e) = ctx.net.block(&mut pad) {
                        log::debug!("{}: scratchpad read failed: {e}", ctx.rom);
                        State::Retrying
                    } else {
                        State::Validating
                    }
                }
                State::Validating => {
                    ctx.dump(self.protocol.family(), &pad);
                    if !self.protocol.validate(&pad) {
                        State::Retrying
                    } else {
                        match self.protocol.decode(&pad) {
                            Decoded::Reading(reading) => {
                                self.state = State::Decoded;
                                return Ok(reading);
                            }
                            Decoded::Erratum(erratum) => {
                                log::debug!("{}: {erratum:?}, reading again", ctx.rom);
                                self.free_retry = true;
                                State::Addressed
                            }
                        }
                    }
                }
                State::Retrying => {
                    if self.attempts >= MAX_READ_TRIES {
                        State::Failed
                    } else {
                        ctx.recover();
                        State::Addressed
                    }
                }
                State::Decoded | State::Failed => {
                    return Err(AcquireError::Exhausted {
                        rom: ctx.rom,
                        attempts: self.attempts,
                    });
                }
            };
        }
    }
}
