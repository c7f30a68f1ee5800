//! Decode diversity: two demodulators with different de-emphasis
//! assumptions over one sample stream.
//!
//! Different radios and audio paths pre-filter the tones differently, and
//! usually only one receive profile locks reliably for a given hardware
//! combination. Running both and merging their output roughly doubles the
//! chance of a decode; when both succeed on the same over-the-air frame the
//! duplicate is suppressed.

use std::collections::VecDeque;

use crate::demodulator::{DeEmphasis, Demodulator};
use crate::error::Result;
use crate::packet::Packet;

/// Duplicate-suppression window in seconds of input audio. Two identical
/// decodes further apart than this are distinct over-the-air frames.
const DUP_WINDOW_SECS: f64 = 0.5;

/// Per-session decode counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiversityStats {
    /// Frames only the flat profile decoded.
    pub flat_only: u64,
    /// Frames only the de-emphasized profile decoded.
    pub emphasized_only: u64,
    /// Frames both profiles decoded.
    pub both: u64,
    /// Total frames forwarded.
    pub forwarded: u64,
}

struct LastFrame {
    bytes: Vec<u8>,
    profile: DeEmphasis,
    sample_count: u64,
}

pub struct MultiDemodulator {
    flat: Demodulator,
    emphasized: Demodulator,
    last: Option<LastFrame>,
    sample_count: u64,
    dup_window: u64,
    stats: DiversityStats,
    frames: VecDeque<Packet>,
}

impl MultiDemodulator {
    pub fn new(sample_rate: u32) -> Result<Self> {
        Ok(MultiDemodulator {
            flat: Demodulator::new(sample_rate, DeEmphasis::None)?,
            emphasized: Demodulator::new(sample_rate, DeEmphasis::Db6)?,
            last: None,
            sample_count: 0,
            dup_window: (sample_rate as f64 * DUP_WINDOW_SECS) as u64,
            stats: DiversityStats::default(),
            frames: VecDeque::new(),
        })
    }

    /// Feed received audio to both demodulators and merge their decodes.
    pub fn add_samples(&mut self, samples: &[f32]) {
        self.sample_count += samples.len() as u64;

        self.flat.add_samples(samples);
        while let Some(packet) = self.flat.take_frame() {
            self.merge(packet, DeEmphasis::None);
        }
        self.emphasized.add_samples(samples);
        while let Some(packet) = self.emphasized.take_frame() {
            self.merge(packet, DeEmphasis::Db6);
        }
    }

    /// True while either demodulator holds flag lock.
    pub fn dcd(&self) -> bool {
        self.flat.dcd() || self.emphasized.dcd()
    }

    /// Pop the oldest forwarded frame, if any.
    pub fn take_frame(&mut self) -> Option<Packet> {
        self.frames.pop_front()
    }

    pub fn stats(&self) -> DiversityStats {
        self.stats
    }

    /// Forward a decode unless the other profile already delivered the same
    /// bytes within the duplicate window.
    fn merge(&mut self, packet: Packet, profile: DeEmphasis) {
        let is_dup = self.last.as_ref().is_some_and(|last| {
            last.profile != profile
                && self.sample_count <= last.sample_count + self.dup_window
                && last.bytes == packet.bytes_without_crc()
        });

        if is_dup {
            // reclassify the earlier forward as a both-profiles decode
            match self.last.as_ref().map(|l| l.profile) {
                Some(DeEmphasis::None) => self.stats.flat_only -= 1,
                Some(DeEmphasis::Db6) => self.stats.emphasized_only -= 1,
                None => {}
            }
            self.stats.both += 1;
            return;
        }

        match profile {
            DeEmphasis::None => self.stats.flat_only += 1,
            DeEmphasis::Db6 => self.stats.emphasized_only += 1,
        }
        self.stats.forwarded += 1;
        self.last = Some(LastFrame {
            bytes: packet.bytes_without_crc().to_vec(),
            profile,
            sample_count: self.sample_count,
        });
        self.frames.push_back(packet);
    }
}
