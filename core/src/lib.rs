//! Software AFSK1200 modem with AX.25 HDLC framing
//!
//! Bell 202 tones (1200 Hz mark / 2200 Hz space) at 1200 baud, as used by
//! APRS packet radio. The demodulator is correlation-based with dual-filter
//! decode diversity; framing is AX.25 with CRC-16/CCITT and bit stuffing.

pub mod demodulator;
pub mod error;
pub mod filter;
pub mod modulator;
pub mod multi;
pub mod packet;

pub use demodulator::{DeEmphasis, Demodulator};
pub use error::{ModemError, Result};
pub use modulator::Modulator;
pub use multi::MultiDemodulator;
pub use packet::Packet;

// Bell 202 / AX.25 signal parameters
pub const MARK_FREQUENCY: f32 = 1200.0; // Hz
pub const SPACE_FREQUENCY: f32 = 2200.0; // Hz
pub const BIT_RATE: f32 = 1200.0; // baud

/// HDLC frame delimiter.
pub const HDLC_FLAG: u8 = 0x7E;

/// Sample rates the demodulator accepts. 8000 Hz input is upsampled to
/// 16000 Hz internally because the receive filters need headroom above the
/// 2200 Hz space tone.
pub const SUPPORTED_SAMPLE_RATES: [u32; 3] = [8000, 16000, 48000];

// AX.25 frame limits, not counting the delimiting flags:
// two address blocks + up to 8 digipeaters + control + PID + info + FCS.
pub const MAX_PATH_ENTRIES: usize = 8;
pub const MAX_PAYLOAD_SIZE: usize = 256;
pub const MAX_FRAME_SIZE: usize = 7 + 7 + MAX_PATH_ENTRIES * 7 + 1 + 1 + MAX_PAYLOAD_SIZE + 2;

/// The shortest acceptable frame: two addresses, control, PID and FCS.
pub const MIN_FRAME_SIZE: usize = 18;
