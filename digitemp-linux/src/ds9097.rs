//! Passive DS9097-style serial adapter.
//!
//! The UART line is tied to the 1-Wire data line, so every byte written is
//! read back as the bus saw it. A reset is a 0xF0 byte at 9600 baud: the
//! presence pulse of any device shortens the echo. A time slot is one byte
//! at 115200 baud, 0xFF for a read slot or a written 1, 0x00 for a written 0.
//! A device that answers 0 pulls the start of the echo low.

use std::io::{self, Read, Write};
use std::time::Duration;

use embedded_onewire::{OneWire, OneWireResult, OneWireStatus};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

const RESET_BAUD: u32 = 9600;
const SLOT_BAUD: u32 = 115_200;
const RESET_PULSE: u8 = 0xF0;
const SLOT_HIGH: u8 = 0xFF;
const SLOT_LOW: u8 = 0x00;
const TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum Ds9097Error {
    #[error("serial port: {0}")]
    Port(#[from] serialport::Error),
    #[error("serial I/O: {0}")]
    Io(#[from] io::Error),
}

/// The parts of a serial port the adapter needs.
pub trait Line: Read + Write {
    fn set_baud(&mut self, baud: u32) -> Result<(), Ds9097Error>;
    /// Drops anything still buffered in either direction.
    fn discard(&mut self) -> Result<(), Ds9097Error>;
}

impl Line for Box<dyn SerialPort> {
    fn set_baud(&mut self, baud: u32) -> Result<(), Ds9097Error> {
        Ok(self.set_baud_rate(baud)?)
    }

    fn discard(&mut self) -> Result<(), Ds9097Error> {
        Ok(self.clear(ClearBuffer::All)?)
    }
}

/// Echo of the reset byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetEcho(pub u8);

impl OneWireStatus for ResetEcho {
    fn presence(&self) -> bool {
        self.0 != RESET_PULSE && self.0 != 0x00
    }

    fn shortcircuit(&self) -> bool {
        self.0 == 0x00
    }
}

pub struct Ds9097<L = Box<dyn SerialPort>> {
    line: L,
}

impl Ds9097 {
    /// Opens the adapter on `path`, 8N1 at slot speed.
    pub fn open(path: &str) -> Result<Self, Ds9097Error> {
        let port = serialport::new(path, SLOT_BAUD)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(TIMEOUT)
            .open()?;
        log::debug!("opened {path} at {SLOT_BAUD} baud");
        Ok(Self { line: port })
    }
}

impl<L: Line> Ds9097<L> {
    pub fn new(line: L) -> Self {
        Self { line }
    }

    pub fn into_inner(self) -> L {
        self.line
    }

    fn pulse(&mut self) -> Result<u8, Ds9097Error> {
        self.line.discard()?;
        self.line.set_baud(RESET_BAUD)?;
        let echo = self.echo(&[RESET_PULSE]);
        // back to slot speed even when the echo never came
        self.line.set_baud(SLOT_BAUD)?;
        Ok(echo?[0])
    }

    fn echo<const N: usize>(&mut self, out: &[u8; N]) -> Result<[u8; N], Ds9097Error> {
        self.line.write_all(out)?;
        self.line.flush()?;
        let mut back = [0u8; N];
        self.line.read_exact(&mut back)?;
        Ok(back)
    }

    /// Runs eight slots, least significant bit first. A 1 bit is a read slot.
    fn slots(&mut self, byte: u8) -> Result<u8, Ds9097Error> {
        let mut out = [SLOT_LOW; 8];
        for (bit, slot) in out.iter_mut().enumerate() {
            if byte & (1u8 << bit) != 0 {
                *slot = SLOT_HIGH;
            }
        }
        let mut read = 0u8;
        for (bit, echo) in self.echo(&out)?.into_iter().enumerate() {
            if echo & 0x01 != 0 {
                read |= 1 << bit;
            }
        }
        Ok(read)
    }

    fn slot(&mut self, high: bool) -> Result<bool, Ds9097Error> {
        let [echo] = self.echo(&[if high { SLOT_HIGH } else { SLOT_LOW }])?;
        Ok(echo & 0x01 != 0)
    }
}

impl<L: Line> OneWire for Ds9097<L> {
    type Status = ResetEcho;
    type BusError = Ds9097Error;

    fn reset(&mut self) -> OneWireResult<ResetEcho, Ds9097Error> {
        let echo = self.pulse()?;
        log::trace!("reset echo {echo:02x}");
        Ok(ResetEcho(echo))
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Ds9097Error> {
        self.slots(byte)?;
        Ok(())
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Ds9097Error> {
        Ok(self.slots(0xFF)?)
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Ds9097Error> {
        self.slot(bit)?;
        Ok(())
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Ds9097Error> {
        Ok(self.slot(true)?)
    }

    fn touch_byte(&mut self, byte: u8) -> OneWireResult<u8, Ds9097Error> {
        Ok(self.slots(byte)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};

    use embedded_onewire::{OneWire, OneWireError, OneWireNet, Network, OneWireStatus};

    use super::{Ds9097, Ds9097Error, Line, ResetEcho};

    /// Loopback line with one scripted device.
    #[derive(Default)]
    struct Wire {
        baud: u32,
        /// Echo of the next reset byte.
        reset_echo: u8,
        /// Bits the device drives during read slots.
        answers: VecDeque<bool>,
        echoed: VecDeque<u8>,
        sent: Vec<u8>,
        bauds: Vec<u32>,
        mute: bool,
    }

    impl Wire {
        fn new(reset_echo: u8) -> Self {
            Self {
                baud: 115_200,
                reset_echo,
                ..Self::default()
            }
        }
    }

    impl Write for Wire {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            for &byte in buf {
                self.sent.push(byte);
                if self.mute {
                    continue;
                }
                let echo = match (self.baud, byte) {
                    (9600, _) => self.reset_echo,
                    (_, 0xFF) => match self.answers.pop_front() {
                        Some(false) => 0xFE,
                        _ => 0xFF,
                    },
                    (_, other) => other,
                };
                self.echoed.push_back(echo);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Read for Wire {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut n = 0;
            while n < buf.len() {
                match self.echoed.pop_front() {
                    Some(b) => buf[n] = b,
                    None => break,
                }
                n += 1;
            }
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no echo"));
            }
            Ok(n)
        }
    }

    impl Line for Wire {
        fn set_baud(&mut self, baud: u32) -> Result<(), Ds9097Error> {
            self.baud = baud;
            self.bauds.push(baud);
            Ok(())
        }

        fn discard(&mut self) -> Result<(), Ds9097Error> {
            self.echoed.clear();
            Ok(())
        }
    }

    #[test]
    fn reset_echo_decodes_presence() {
        assert!(ResetEcho(0xE0).presence());
        assert!(!ResetEcho(0xF0).presence());
        assert!(!ResetEcho(0x00).presence());
        assert!(ResetEcho(0x00).shortcircuit());
        assert!(!ResetEcho(0x90).shortcircuit());
    }

    #[test]
    fn reset_switches_baud_and_back() {
        let mut adapter = Ds9097::new(Wire::new(0xE0));
        assert!(adapter.reset().unwrap().presence());
        let wire = adapter.into_inner();
        assert_eq!(wire.sent, [0xF0]);
        assert_eq!(wire.bauds, [9600, 115_200]);
    }

    #[test]
    fn silent_adapter_restores_baud() {
        let mut wire = Wire::new(0xE0);
        wire.mute = true;
        let mut adapter = Ds9097::new(wire);
        assert!(matches!(
            adapter.reset(),
            Err(OneWireError::Other(Ds9097Error::Io(_)))
        ));
        assert_eq!(adapter.into_inner().baud, 115_200);
    }

    #[test]
    fn write_byte_sends_lsb_first() {
        let mut adapter = Ds9097::new(Wire::new(0xE0));
        adapter.write_byte(0x55).unwrap();
        assert_eq!(
            adapter.into_inner().sent,
            [0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00]
        );
    }

    #[test]
    fn read_byte_collects_device_bits() {
        let mut wire = Wire::new(0xE0);
        // 0x28, least significant bit first
        wire.answers = [false, false, false, true, false, true, false, false].into();
        let mut adapter = Ds9097::new(wire);
        assert_eq!(adapter.read_byte().unwrap(), 0x28);
    }

    #[test]
    fn touch_byte_only_reads_high_bits() {
        let mut wire = Wire::new(0xE0);
        // bits 0 and 1 are read slots, the device pulls bit 1 low
        wire.answers = [true, false].into();
        let mut adapter = Ds9097::new(wire);
        assert_eq!(adapter.touch_byte(0x03).unwrap(), 0x01);
        assert!(adapter.read_bit().unwrap());
    }

    #[test]
    fn network_reports_shorts_and_empty_buses() {
        let mut net = Network::new(Ds9097::new(Wire::new(0x00)));
        assert!(matches!(
            OneWireNet::reset(&mut net),
            Err(OneWireError::ShortCircuit)
        ));
        let mut net = Network::new(Ds9097::new(Wire::new(0xF0)));
        assert!(!OneWireNet::reset(&mut net).unwrap());
    }
}
