//! AFSK1200 receiver.
//!
//! Every incoming sample is band-limited by a time-domain FIR, correlated
//! against free-running mark and space oscillators over a sliding window of
//! one bit period, and the low-passed difference of the two correlation
//! magnitudes gives the demodulated polarity. Symbol timing is recovered
//! from polarity transitions alone: the gap between transitions, rounded to
//! bit periods, yields the NRZI bit count directly, so the decoder is
//! insensitive to absolute tone phase and frequency offsets.
//!
//! Completed frames are queued internally and drained with
//! [`take_frame`](Demodulator::take_frame); the per-sample loop never calls
//! out and never blocks.

use std::collections::VecDeque;
use std::f32::consts::PI;

use crate::error::{ModemError, Result};
use crate::filter::{bandpass, filter_len, fir, lowpass};
use crate::packet::{Packet, SignalStats};
use crate::{BIT_RATE, MARK_FREQUENCY, SPACE_FREQUENCY, SUPPORTED_SAMPLE_RATES};

const TWO_PI: f32 = 2.0 * PI;

/// Receive filter profile. Radios differ in whether the audio path has
/// already de-emphasized the higher space tone; one profile usually locks
/// much more reliably than the other for a given hardware chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeEmphasis {
    /// Flat (discriminator) audio: the input is used as-is.
    None,
    /// 6 dB/octave de-emphasized audio: band-limit around the two tones.
    Db6,
}

impl DeEmphasis {
    pub fn db(self) -> u32 {
        match self {
            DeEmphasis::None => 0,
            DeEmphasis::Db6 => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Waiting,
    JustSeenFlag,
    Decoding,
}

/// Per-packet signal quality accumulators, reset at every flag that starts
/// a new reception.
#[derive(Debug, Default)]
struct QualityAccum {
    mark_period_count: u32,
    space_period_count: u32,
    mark_extreme_sum: f32,
    space_extreme_sum: f32,
    mark_current_max: f32,
    space_current_min: f32,
    max_period_error: f32,
}

impl QualityAccum {
    fn reset(&mut self) {
        *self = QualityAccum::default();
    }

    fn finalize(&self, emphasis: DeEmphasis) -> SignalStats {
        let mark_avg = self.mark_extreme_sum / self.mark_period_count.max(1) as f32;
        let space_avg = self.space_extreme_sum / self.space_period_count.max(1) as f32;
        let tone_ratio = if space_avg != 0.0 {
            mark_avg / -space_avg
        } else {
            0.0
        };
        SignalStats {
            emphasis_db: emphasis.db(),
            tone_ratio,
            max_period_error: self.max_period_error,
        }
    }
}

pub struct Demodulator {
    samples_per_bit: f32,
    emphasis: DeEmphasis,

    // 8 kHz input is upsampled 2x by averaging with the previous sample;
    // the filters are designed for 16 kHz and up.
    interpolate: bool,
    interpolate_last: f32,
    interpolate_original: bool,

    td_filter: Vec<f32>,
    cd_filter: Vec<f32>,

    // cyclic buffers for the per-sample pipeline
    raw: Vec<f32>,
    filtered: Vec<f32>,
    c0_real: Vec<f32>,
    c0_imag: Vec<f32>,
    c1_real: Vec<f32>,
    c1_imag: Vec<f32>,
    diff: Vec<f32>,
    j_td: usize,
    j_cd: usize,
    j_corr: usize,

    phase_mark: f32,
    phase_space: f32,
    phase_inc_mark: f32,
    phase_inc_space: f32,

    previous_fdiff: f32,
    t: u64,
    last_transition: u64,

    // differential-bit shift register and HDLC framing state
    data: u8,
    bitcount: u8,
    state: State,
    flag_count: u32,
    flag_separator_seen: bool,
    data_carrier: bool,

    packet: Option<Packet>,
    quality: QualityAccum,
    frames: VecDeque<Packet>,
    frame_count: u64,
}

impl Demodulator {
    pub fn new(sample_rate: u32, emphasis: DeEmphasis) -> Result<Self> {
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
            return Err(ModemError::UnsupportedSampleRate(sample_rate));
        }
        let interpolate = sample_rate == 8000;
        let rate = if interpolate { 16000 } else { sample_rate };

        let len = filter_len(rate);
        let td_filter = match emphasis {
            DeEmphasis::None => vec![1.0],
            DeEmphasis::Db6 => bandpass(len, 900.0, 2500.0, rate as f32),
        };
        let cd_filter = lowpass(len, BIT_RATE, rate as f32);

        let samples_per_bit = rate as f32 / BIT_RATE;
        let window = samples_per_bit as usize;

        Ok(Demodulator {
            samples_per_bit,
            emphasis,
            interpolate,
            interpolate_last: 0.0,
            interpolate_original: false,
            raw: vec![0.0; td_filter.len()],
            filtered: vec![0.0; td_filter.len()],
            c0_real: vec![0.0; window],
            c0_imag: vec![0.0; window],
            c1_real: vec![0.0; window],
            c1_imag: vec![0.0; window],
            diff: vec![0.0; cd_filter.len()],
            j_td: 0,
            j_cd: 0,
            j_corr: 0,
            phase_mark: 0.0,
            phase_space: 0.0,
            phase_inc_mark: TWO_PI * MARK_FREQUENCY / rate as f32,
            phase_inc_space: TWO_PI * SPACE_FREQUENCY / rate as f32,
            previous_fdiff: 0.0,
            t: 0,
            last_transition: 0,
            data: 0,
            bitcount: 0,
            state: State::Waiting,
            flag_count: 0,
            flag_separator_seen: false,
            data_carrier: false,
            packet: None,
            quality: QualityAccum::default(),
            frames: VecDeque::new(),
            frame_count: 0,
            td_filter,
            cd_filter,
        })
    }

    /// Data carrier detect: true whenever the decoder holds HDLC flag
    /// lock. Says nothing about frame validity, only channel activity;
    /// hosts use it for half-duplex collision avoidance.
    pub fn dcd(&self) -> bool {
        self.data_carrier
    }

    /// Frames decoded since construction.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Pop the oldest completed frame, if any.
    pub fn take_frame(&mut self) -> Option<Packet> {
        self.frames.pop_front()
    }

    /// Feed received audio through the demodulator. Completed CRC-correct
    /// frames become available via [`take_frame`](Demodulator::take_frame).
    pub fn add_samples(&mut self, samples: &[f32]) {
        let mut i = 0;
        while i < samples.len() {
            let sample = if self.interpolate {
                if self.interpolate_original {
                    let s = samples[i];
                    self.interpolate_last = s;
                    self.interpolate_original = false;
                    i += 1;
                    s
                } else {
                    self.interpolate_original = true;
                    0.5 * (samples[i] + self.interpolate_last)
                }
            } else {
                i += 1;
                samples[i - 1]
            };
            self.process_sample(sample);
        }
    }

    fn process_sample(&mut self, sample: f32) {
        self.raw[self.j_td] = sample;
        let x = fir(&self.raw, self.j_td, &self.td_filter);
        self.filtered[self.j_td] = x;

        // running I/Q correlation against both tone oscillators
        self.c0_real[self.j_corr] = x * self.phase_mark.cos();
        self.c0_imag[self.j_corr] = x * self.phase_mark.sin();
        self.c1_real[self.j_corr] = x * self.phase_space.cos();
        self.c1_imag[self.j_corr] = x * self.phase_space.sin();

        self.phase_mark += self.phase_inc_mark;
        if self.phase_mark > TWO_PI {
            self.phase_mark -= TWO_PI;
        }
        self.phase_space += self.phase_inc_space;
        if self.phase_space > TWO_PI {
            self.phase_space -= TWO_PI;
        }

        let cr: f32 = self.c0_real.iter().sum();
        let ci: f32 = self.c0_imag.iter().sum();
        let c0 = (cr * cr + ci * ci).sqrt();
        let cr: f32 = self.c1_real.iter().sum();
        let ci: f32 = self.c1_imag.iter().sum();
        let c1 = (cr * cr + ci * ci).sqrt();

        self.diff[self.j_cd] = c0 - c1;
        let fdiff = fir(&self.diff, self.j_cd, &self.cd_filter);

        if self.previous_fdiff * fdiff < 0.0 || self.previous_fdiff == 0.0 {
            self.handle_transition(fdiff);
        }

        self.previous_fdiff = fdiff;
        self.t += 1;

        self.j_td = (self.j_td + 1) % self.td_filter.len();
        self.j_cd = (self.j_cd + 1) % self.cd_filter.len();
        self.j_corr = (self.j_corr + 1) % self.c0_real.len();
    }

    fn handle_transition(&mut self, fdiff: f32) {
        let gap = self.t - self.last_transition;
        self.last_transition = self.t;

        let periods = gap as f64 / self.samples_per_bit as f64;
        let bits = periods.round() as u64;

        // quality bookkeeping for the period that just ended
        let err = (bits as f64 - periods).abs() as f32;
        if err > self.quality.max_period_error {
            self.quality.max_period_error = err;
        }
        if fdiff < 0.0 {
            // the ended period rode the mark tone
            self.quality.mark_period_count += 1;
            self.quality.mark_extreme_sum += self.quality.mark_current_max;
            self.quality.space_current_min = fdiff;
        } else {
            self.quality.space_period_count += 1;
            self.quality.space_extreme_sum += self.quality.space_current_min;
            self.quality.mark_current_max = fdiff;
        }

        if bits == 0 || bits > 7 {
            // spurious transition or lost carrier
            self.state = State::Waiting;
            self.data_carrier = false;
            self.flag_count = 0;
            self.packet = None;
        } else if bits == 7 {
            self.saw_flag();
        } else {
            self.saw_data_bits(bits as u8);
        }
    }

    /// Six same-polarity periods framed by transitions is the HDLC flag.
    fn saw_flag(&mut self) {
        self.flag_count += 1;
        self.flag_separator_seen = false;
        self.data = 0;
        self.bitcount = 0;

        match self.state {
            State::Waiting => {
                self.state = State::JustSeenFlag;
                self.data_carrier = true;
                self.quality.reset();
            }
            State::JustSeenFlag => {}
            State::Decoding => {
                if let Some(mut packet) = self.packet.take() {
                    if packet.is_valid() {
                        let stats = self.quality.finalize(self.emphasis);
                        packet.set_stats(stats);
                        log::debug!(
                            "decoded frame ({} dB profile, tone ratio {:.2}, period err {:.2})",
                            stats.emphasis_db,
                            stats.tone_ratio,
                            stats.max_period_error
                        );
                        self.frame_count += 1;
                        self.frames.push_back(packet);
                    }
                }
                self.state = State::JustSeenFlag;
            }
        }
    }

    /// A gap of 1..=6 periods: `bits - 1` ones followed by the zero that
    /// caused the transition, unless the run of five ones marks the zero as
    /// stuffing, in which case it is dropped.
    fn saw_data_bits(&mut self, bits: u8) {
        if self.state == State::JustSeenFlag {
            self.state = State::Decoding;
        }
        if self.state != State::Decoding {
            return;
        }

        // Track flag separation so back-to-back flags with a single bit
        // between them keep the flag run alive.
        if bits != 1 {
            self.flag_count = 0;
        } else if self.flag_count > 0 && !self.flag_separator_seen {
            self.flag_separator_seen = true;
        } else {
            self.flag_count = 0;
        }

        for _ in 0..bits - 1 {
            self.push_bit(true);
        }
        if bits - 1 != 5 {
            self.push_bit(false);
        }
    }

    fn push_bit(&mut self, one: bool) {
        self.bitcount += 1;
        self.data >>= 1;
        if one {
            self.data |= 0x80;
        }
        if self.bitcount == 8 {
            let packet = self.packet.get_or_insert_with(Packet::new);
            if !packet.add_byte(self.data) {
                // oversized frame, drop it and wait for the next flag
                self.packet = None;
                self.state = State::Waiting;
                self.data_carrier = false;
            }
            self.data = 0;
            self.bitcount = 0;
        }
    }
}
