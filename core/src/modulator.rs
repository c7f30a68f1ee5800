//! AFSK1200 transmitter: HDLC framing plus a phase-continuous FSK tone
//! generator.
//!
//! Transmission is pull-driven. The caller repeatedly asks for the next
//! chunk of samples and hands them to whatever audio sink it uses; one call
//! expands one flag or data byte into tone samples, so a chunk never
//! exceeds ten symbol periods (eight data bits plus up to two stuffed
//! zeros in pathological runs).

use std::f32::consts::PI;

use crate::error::{ModemError, Result};
use crate::packet::Packet;
use crate::{BIT_RATE, HDLC_FLAG, MARK_FREQUENCY, SPACE_FREQUENCY};

const TWO_PI: f32 = 2.0 * PI;

/// Seconds per transmitted byte at 1200 baud.
const BYTE_PERIOD: f64 = 8.0 / 1200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Idle,
    Preamble,
    Data,
    Trailer,
}

/// The two Bell 202 tones. NRZI encoding toggles between them on every
/// zero data bit and holds on every one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Mark,
    Space,
}

impl Tone {
    fn toggled(self) -> Tone {
        match self {
            Tone::Mark => Tone::Space,
            Tone::Space => Tone::Mark,
        }
    }
}

pub struct Modulator {
    sample_rate: u32,
    phase_inc_mark: f32,
    phase_inc_space: f32,
    phase_inc_symbol: f32,

    state: TxState,
    tx_bytes: Option<Vec<u8>>,
    tx_index: usize,
    tx_delay: u32, // preamble length in 10 ms units
    tx_tail: u32,  // trailer length in 10 ms units; 0 means two flags

    symbol_phase: f32,
    dds_phase: f32,
    last_tone: Tone,
    stuff_count: u8,
}

impl Modulator {
    pub fn new(sample_rate: u32) -> Self {
        Modulator {
            sample_rate,
            phase_inc_mark: TWO_PI * MARK_FREQUENCY / sample_rate as f32,
            phase_inc_space: TWO_PI * SPACE_FREQUENCY / sample_rate as f32,
            phase_inc_symbol: TWO_PI * BIT_RATE / sample_rate as f32,
            state: TxState::Idle,
            tx_bytes: None,
            tx_index: 0,
            tx_delay: 20, // 200 ms of preamble flags
            tx_tail: 0,
            symbol_phase: 0.0,
            dds_phase: 0.0,
            last_tone: Tone::Mark,
            stuff_count: 0,
        }
    }

    /// Preamble length before the data, in units of 10 ms.
    pub fn set_tx_delay(&mut self, delay: u32) {
        self.tx_delay = delay;
    }

    /// Trailer length after the data, in units of 10 ms. Zero keeps the
    /// minimal two closing flags.
    pub fn set_tx_tail(&mut self, tail: u32) {
        self.tx_tail = tail;
    }

    pub fn is_idle(&self) -> bool {
        self.state == TxState::Idle
    }

    /// Smallest sample buffer [`next_samples`] accepts: ten symbol periods
    /// of audio.
    ///
    /// [`next_samples`]: Modulator::next_samples
    pub fn buffer_size(&self) -> usize {
        (10.0 / 1200.0 * self.sample_rate as f64).ceil() as usize + 1
    }

    /// Begin transmitting a packet: tx-delay worth of preamble flags, the
    /// frame bytes including FCS with bit stuffing, then closing flags.
    ///
    /// Rejected with a logged warning while a transmission is in progress;
    /// queueing belongs to the caller.
    pub fn prepare_to_transmit(&mut self, packet: &Packet) {
        if self.state != TxState::Idle {
            log::warn!("modulator busy, discarding transmission request");
            return;
        }
        self.tx_bytes = Some(packet.bytes_with_crc().to_vec());
        self.state = TxState::Preamble;
        self.tx_index = ((self.tx_delay as f64 * 0.01 / BYTE_PERIOD).ceil() as usize).max(1);
        self.symbol_phase = 0.0;
        self.dds_phase = 0.0;
    }

    /// Transmit flags only, for the given duration, to adjust a
    /// transmitter's deviation and audio levels.
    pub fn prepare_to_transmit_flags(&mut self, seconds: f32) {
        if self.state != TxState::Idle {
            log::warn!("modulator busy, discarding flags request");
            return;
        }
        self.tx_bytes = None;
        self.state = TxState::Preamble;
        self.tx_index = ((seconds as f64 / BYTE_PERIOD).ceil() as usize).max(1);
        self.symbol_phase = 0.0;
        self.dds_phase = 0.0;
    }

    /// Generate the next chunk of transmit audio into `buf`, returning the
    /// number of samples produced. Zero means the transmission is done and
    /// the modulator is idle again.
    pub fn next_samples(&mut self, buf: &mut [f32]) -> Result<usize> {
        if buf.len() < self.buffer_size() {
            return Err(ModemError::BufferTooSmall(buf.len(), self.buffer_size()));
        }

        let count = match self.state {
            TxState::Idle => 0,
            TxState::Preamble => {
                let n = self.byte_to_symbols(HDLC_FLAG, false, buf);
                self.tx_index -= 1;
                if self.tx_index == 0 {
                    self.state = TxState::Data;
                    self.tx_index = 0;
                    self.stuff_count = 0;
                }
                n
            }
            TxState::Data => match self.tx_bytes.take() {
                // A flags-only transmission carries no data.
                None => {
                    self.state = TxState::Idle;
                    0
                }
                Some(bytes) => {
                    let n = self.byte_to_symbols(bytes[self.tx_index], true, buf);
                    self.tx_index += 1;
                    if self.tx_index == bytes.len() {
                        self.state = TxState::Trailer;
                        self.tx_index = if self.tx_tail == 0 {
                            2
                        } else {
                            ((self.tx_tail as f64 * 0.01 / BYTE_PERIOD).ceil() as usize).max(2)
                        };
                    } else {
                        self.tx_bytes = Some(bytes);
                    }
                    n
                }
            },
            TxState::Trailer => {
                let n = self.byte_to_symbols(HDLC_FLAG, false, buf);
                self.tx_index -= 1;
                if self.tx_index == 0 {
                    self.state = TxState::Idle;
                }
                n
            }
        };

        Ok(count)
    }

    /// Expand one byte, LSB first, into FSK symbols. A zero bit toggles the
    /// tone, a one holds it; after five held ones a stuffed toggle is
    /// inserted (data bytes only, flags are exempt).
    fn byte_to_symbols(&mut self, byte: u8, stuff: bool, buf: &mut [f32]) -> usize {
        let mut bits = byte;
        let mut position = 0;
        for _ in 0..8 {
            let bit = bits & 1;
            bits >>= 1;
            if bit == 0 {
                let tone = self.last_tone.toggled();
                position += self.generate_symbol_samples(tone, buf, position);
                if stuff {
                    self.stuff_count = 0;
                }
                self.last_tone = tone;
            } else {
                position += self.generate_symbol_samples(self.last_tone, buf, position);
                if stuff {
                    self.stuff_count += 1;
                    if self.stuff_count == 5 {
                        let tone = self.last_tone.toggled();
                        position += self.generate_symbol_samples(tone, buf, position);
                        self.stuff_count = 0;
                        self.last_tone = tone;
                    }
                }
            }
        }
        position
    }

    /// Emit one symbol period of the given tone. The symbol clock phase
    /// carries the fractional remainder across symbols so the average
    /// symbol length is exact even when samples-per-bit is not an integer,
    /// and the oscillator phase carries across tone changes (CPFSK).
    fn generate_symbol_samples(&mut self, tone: Tone, buf: &mut [f32], position: usize) -> usize {
        let inc = match tone {
            Tone::Mark => self.phase_inc_mark,
            Tone::Space => self.phase_inc_space,
        };
        let mut count = 0;
        while self.symbol_phase < TWO_PI {
            buf[position + count] = self.dds_phase.sin();
            self.dds_phase += inc;
            if self.dds_phase > TWO_PI {
                self.dds_phase -= TWO_PI;
            }
            self.symbol_phase += self.phase_inc_symbol;
            count += 1;
        }
        self.symbol_phase -= TWO_PI;
        count
    }
}
