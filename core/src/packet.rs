//! AX.25 frame container.
//!
//! A frame is an ordered byte buffer with a running CRC-16/CCITT
//! accumulator. Frames are either filled byte-by-byte as the demodulator
//! destuffs the bitstream, or built in one shot from addressing fields and
//! a payload for transmission. The CRC runs over every byte including the
//! two FCS bytes themselves, so a complete frame always leaves the register
//! at the fixed residue 0xF0B8.

use std::fmt;

use crate::error::{ModemError, Result};
use crate::{MAX_FRAME_SIZE, MAX_PATH_ENTRIES, MAX_PAYLOAD_SIZE, MIN_FRAME_SIZE};

/// CRC register value after a frame's own FCS has been folded in.
const AX25_CRC_CORRECT: u16 = 0xF0B8;
const CRC_CCITT_INIT_VAL: u16 = 0xFFFF;

// AX.25 control and PID values
pub const AX25_CONTROL_APRS: u8 = 0x03;
pub const AX25_PROTOCOL_COMPRESSED_TCPIP: u8 = 0x06;
pub const AX25_PROTOCOL_UNCOMPRESSED_TCPIP: u8 = 0x07;
pub const AX25_PROTOCOL_NO_LAYER_3: u8 = 0xF0; // used for APRS

#[rustfmt::skip]
const CRC_CCITT_TAB: [u16; 256] = [
    0x0000, 0x1189, 0x2312, 0x329b, 0x4624, 0x57ad, 0x6536, 0x74bf,
    0x8c48, 0x9dc1, 0xaf5a, 0xbed3, 0xca6c, 0xdbe5, 0xe97e, 0xf8f7,
    0x1081, 0x0108, 0x3393, 0x221a, 0x56a5, 0x472c, 0x75b7, 0x643e,
    0x9cc9, 0x8d40, 0xbfdb, 0xae52, 0xdaed, 0xcb64, 0xf9ff, 0xe876,
    0x2102, 0x308b, 0x0210, 0x1399, 0x6726, 0x76af, 0x4434, 0x55bd,
    0xad4a, 0xbcc3, 0x8e58, 0x9fd1, 0xeb6e, 0xfae7, 0xc87c, 0xd9f5,
    0x3183, 0x200a, 0x1291, 0x0318, 0x77a7, 0x662e, 0x54b5, 0x453c,
    0xbdcb, 0xac42, 0x9ed9, 0x8f50, 0xfbef, 0xea66, 0xd8fd, 0xc974,
    0x4204, 0x538d, 0x6116, 0x709f, 0x0420, 0x15a9, 0x2732, 0x36bb,
    0xce4c, 0xdfc5, 0xed5e, 0xfcd7, 0x8868, 0x99e1, 0xab7a, 0xbaf3,
    0x5285, 0x430c, 0x7197, 0x601e, 0x14a1, 0x0528, 0x37b3, 0x263a,
    0xdecd, 0xcf44, 0xfddf, 0xec56, 0x98e9, 0x8960, 0xbbfb, 0xaa72,
    0x6306, 0x728f, 0x4014, 0x519d, 0x2522, 0x34ab, 0x0630, 0x17b9,
    0xef4e, 0xfec7, 0xcc5c, 0xddd5, 0xa96a, 0xb8e3, 0x8a78, 0x9bf1,
    0x7387, 0x620e, 0x5095, 0x411c, 0x35a3, 0x242a, 0x16b1, 0x0738,
    0xffcf, 0xee46, 0xdcdd, 0xcd54, 0xb9eb, 0xa862, 0x9af9, 0x8b70,
    0x8408, 0x9581, 0xa71a, 0xb693, 0xc22c, 0xd3a5, 0xe13e, 0xf0b7,
    0x0840, 0x19c9, 0x2b52, 0x3adb, 0x4e64, 0x5fed, 0x6d76, 0x7cff,
    0x9489, 0x8500, 0xb79b, 0xa612, 0xd2ad, 0xc324, 0xf1bf, 0xe036,
    0x18c1, 0x0948, 0x3bd3, 0x2a5a, 0x5ee5, 0x4f6c, 0x7df7, 0x6c7e,
    0xa50a, 0xb483, 0x8618, 0x9791, 0xe32e, 0xf2a7, 0xc03c, 0xd1b5,
    0x2942, 0x38cb, 0x0a50, 0x1bd9, 0x6f66, 0x7eef, 0x4c74, 0x5dfd,
    0xb58b, 0xa402, 0x9699, 0x8710, 0xf3af, 0xe226, 0xd0bd, 0xc134,
    0x39c3, 0x284a, 0x1ad1, 0x0b58, 0x7fe7, 0x6e6e, 0x5cf5, 0x4d7c,
    0xc60c, 0xd785, 0xe51e, 0xf497, 0x8028, 0x91a1, 0xa33a, 0xb2b3,
    0x4a44, 0x5bcd, 0x6956, 0x78df, 0x0c60, 0x1de9, 0x2f72, 0x3efb,
    0xd68d, 0xc704, 0xf59f, 0xe416, 0x90a9, 0x8120, 0xb3bb, 0xa232,
    0x5ac5, 0x4b4c, 0x79d7, 0x685e, 0x1ce1, 0x0d68, 0x3ff3, 0x2e7a,
    0xe70e, 0xf687, 0xc41c, 0xd595, 0xa12a, 0xb0a3, 0x8238, 0x93b1,
    0x6b46, 0x7acf, 0x4854, 0x59dd, 0x2d62, 0x3ceb, 0x0e70, 0x1ff9,
    0xf78f, 0xe606, 0xd49d, 0xc514, 0xb1ab, 0xa022, 0x92b9, 0x8330,
    0x7bc7, 0x6a4e, 0x58d5, 0x495c, 0x3de3, 0x2c6a, 0x1ef1, 0x0f78,
];

/// Demodulator link-quality measurements attached to a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalStats {
    /// De-emphasis of the receive filter that decoded the frame, in dB.
    pub emphasis_db: u32,
    /// Average mark extreme over average space extreme in the filtered
    /// correlation difference; near 1.0 means well-balanced tones.
    pub tone_ratio: f32,
    /// Worst rounding error when snapping transition gaps to bit periods.
    pub max_period_error: f32,
}

/// Addressing fields and payload recovered from a raw frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub destination: String,
    pub source: String,
    pub path: Vec<String>,
    pub payload: Vec<u8>,
}

/// An AX.25 frame, stored with its FCS.
#[derive(Clone)]
pub struct Packet {
    bytes: [u8; MAX_FRAME_SIZE],
    size: usize,
    crc: u16,
    stats: Option<SignalStats>,
}

impl Packet {
    /// An empty packet, to be filled byte-by-byte during reception.
    pub fn new() -> Self {
        Packet {
            bytes: [0; MAX_FRAME_SIZE],
            size: 0,
            crc: CRC_CCITT_INIT_VAL,
            stats: None,
        }
    }

    /// Build a frame from pre-assembled raw bytes (addresses through
    /// payload); the FCS is computed and appended.
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        if raw.len() + 2 > MAX_FRAME_SIZE {
            return Err(ModemError::FrameTooLarge(raw.len() + 2));
        }
        let mut packet = Packet::new();
        for &b in raw {
            packet.push_crc(b);
        }
        packet.append_fcs();
        Ok(packet)
    }

    /// Build an APRS/AX.25 frame from addressing fields and a payload.
    ///
    /// Callsigns are up to 6 alphanumeric characters with an optional
    /// `-N` SSID suffix, N in 0..=15. The terminator bit lands on the last
    /// path entry, or on the source if the path is empty.
    pub fn from_parts(
        destination: &str,
        source: &str,
        path: &[&str],
        control: u8,
        protocol: u8,
        payload: &[u8],
    ) -> Result<Self> {
        if path.len() > MAX_PATH_ENTRIES {
            return Err(ModemError::PathTooLong(path.len()));
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ModemError::PayloadTooLarge(payload.len()));
        }

        let mut raw = Vec::with_capacity(7 * (2 + path.len()) + 2 + payload.len());
        add_call(&mut raw, destination, false)?;
        add_call(&mut raw, source, path.is_empty())?;
        for (i, via) in path.iter().enumerate() {
            add_call(&mut raw, via, i == path.len() - 1)?;
        }
        raw.push(control);
        raw.push(protocol);
        raw.extend_from_slice(payload);

        Self::from_raw(&raw)
    }

    /// Append one received byte. Returns false once the frame would exceed
    /// the maximum AX.25 size, in which case the byte is dropped.
    pub fn add_byte(&mut self, b: u8) -> bool {
        if self.size >= MAX_FRAME_SIZE {
            return false;
        }
        self.push_crc(b);
        true
    }

    /// The sole acceptance gate for a decoded frame: long enough to hold
    /// both addresses, control, PID and FCS, and the CRC residue correct.
    pub fn is_valid(&self) -> bool {
        self.size >= MIN_FRAME_SIZE && self.crc == AX25_CRC_CORRECT
    }

    /// Frame bytes including the two FCS bytes, as sent over the air.
    pub fn bytes_with_crc(&self) -> &[u8] {
        &self.bytes[..self.size]
    }

    /// Frame bytes with the FCS stripped.
    pub fn bytes_without_crc(&self) -> &[u8] {
        &self.bytes[..self.size.saturating_sub(2)]
    }

    /// Decode the addressing fields and payload. Frames too short to hold
    /// both address blocks parse as empty.
    pub fn parse(&self) -> ParsedFrame {
        let frame = self.bytes_without_crc();
        if frame.len() < 14 {
            return ParsedFrame {
                destination: String::new(),
                source: String::new(),
                path: Vec::new(),
                payload: Vec::new(),
            };
        }
        let mut offset = 0;
        let destination = parse_call(&frame[offset..]);
        offset += 7;
        let source = parse_call(&frame[offset..]);
        offset += 7;

        let mut path = Vec::new();
        while offset + 7 <= frame.len() && frame[offset - 1] & 0x01 == 0 {
            if path.len() >= MAX_PATH_ENTRIES {
                break; // missing terminator bit, bail out of the path walk
            }
            path.push(parse_call(&frame[offset..]));
            offset += 7;
        }

        offset += 2; // control and PID
        let payload = if offset <= frame.len() {
            frame[offset..].to_vec()
        } else {
            Vec::new()
        };

        ParsedFrame {
            destination,
            source,
            path,
            payload,
        }
    }

    pub fn stats(&self) -> Option<&SignalStats> {
        self.stats.as_ref()
    }

    pub(crate) fn set_stats(&mut self, stats: SignalStats) {
        self.stats = Some(stats);
    }

    fn push_crc(&mut self, b: u8) {
        self.crc = (self.crc >> 8) ^ CRC_CCITT_TAB[((self.crc ^ b as u16) & 0xff) as usize];
        self.bytes[self.size] = b;
        self.size += 1;
    }

    fn append_fcs(&mut self) {
        let crcl = (self.crc & 0xff) as u8 ^ 0xff;
        let crch = (self.crc >> 8) as u8 ^ 0xff;
        self.push_crc(crcl);
        self.push_crc(crch);
        debug_assert_eq!(self.crc, AX25_CRC_CORRECT);
    }

    #[cfg(test)]
    pub(crate) fn crc_register(&self) -> u16 {
        self.crc
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("size", &self.size)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl fmt::Display for Packet {
    /// TNC2-style rendering: `SRC>DST,VIA1,VIA2:payload`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parsed = self.parse();
        write!(f, "{}>{}", parsed.source, parsed.destination)?;
        for via in &parsed.path {
            write!(f, ",{}", via)?;
        }
        write!(f, ":")?;
        for &b in &parsed.payload {
            if (0x20..=0x7e).contains(&b) {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

/// Encode one callsign into a 7-byte AX.25 address block: six space-padded
/// uppercase characters shifted left one bit, then the SSID byte with the
/// terminator flag in the LSB.
fn add_call(out: &mut Vec<u8>, call: &str, last: bool) -> Result<()> {
    let (base, ssid_part) = match call.split_once('-') {
        Some((b, s)) => (b, Some(s)),
        None => (call, None),
    };

    if base.is_empty() || base.len() > 6 || !base.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ModemError::InvalidCallsign(call.to_string()));
    }
    let ssid: u8 = match ssid_part {
        Some(s) => s
            .parse()
            .ok()
            .filter(|n| *n <= 15)
            .ok_or_else(|| ModemError::InvalidSsid(call.to_string()))?,
        None => 0,
    };

    for i in 0..6 {
        let c = base
            .as_bytes()
            .get(i)
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or(b' ');
        out.push(c << 1);
    }
    out.push((ssid << 1) | 0x60 | if last { 0x01 } else { 0x00 });
    Ok(())
}

/// Decode a 7-byte address block back into callsign form, appending `-N`
/// when the SSID nibble is nonzero.
fn parse_call(block: &[u8]) -> String {
    let mut call = String::new();
    for &b in &block[..6] {
        let c = (b >> 1) as char;
        if c != ' ' {
            call.push(c);
        }
    }
    let ssid = (block[6] >> 1) & 0x0f;
    if ssid != 0 {
        call.push_str(&format!("-{}", ssid));
    }
    call
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aprs_packet(path: &[&str], payload: &[u8]) -> Packet {
        Packet::from_parts(
            "APRS",
            "N0CALL-9",
            path,
            AX25_CONTROL_APRS,
            AX25_PROTOCOL_NO_LAYER_3,
            payload,
        )
        .unwrap()
    }

    #[test]
    fn crc_register_lands_on_the_magic_residue() {
        let packet = aprs_packet(&["WIDE1-1"], b"test payload");
        assert_eq!(packet.crc_register(), AX25_CRC_CORRECT);
        assert!(packet.is_valid());
    }

    #[test]
    fn any_single_bit_flip_is_rejected() {
        let packet = aprs_packet(&[], b"hello");
        let encoded = packet.bytes_with_crc().to_vec();

        for bit in 0..encoded.len() * 8 {
            let mut corrupted = encoded.clone();
            corrupted[bit / 8] ^= 1 << (bit % 8);

            let mut rx = Packet::new();
            for &b in &corrupted {
                assert!(rx.add_byte(b));
            }
            assert!(!rx.is_valid(), "bit flip at {} not detected", bit);
        }
    }

    #[test]
    fn final_path_entry_carries_the_terminator() {
        let packet = aprs_packet(&["N0CALL-9"], b"x");
        let bytes = packet.bytes_with_crc();
        // Third address block: destination, source, then the path entry.
        let ssid_byte = bytes[14 + 6];
        assert_eq!(ssid_byte, 0x60 | (9 << 1) | 0x01);
        assert_eq!(ssid_byte, 0x73);
        // Neither destination nor source may terminate the address field.
        assert_eq!(bytes[6] & 0x01, 0);
        assert_eq!(bytes[13] & 0x01, 0);
    }

    #[test]
    fn source_terminates_when_path_is_empty() {
        let packet = aprs_packet(&[], b"x");
        let bytes = packet.bytes_with_crc();
        assert_eq!(bytes[6] & 0x01, 0);
        assert_eq!(bytes[13] & 0x01, 1);
    }

    #[test]
    fn parse_reverses_encode() {
        let packet = aprs_packet(&["WIDE1-1", "WIDE2-2"], b"!4903.50N/07201.75W-Test");
        let parsed = packet.parse();
        assert_eq!(parsed.destination, "APRS");
        assert_eq!(parsed.source, "N0CALL-9");
        assert_eq!(parsed.path, vec!["WIDE1-1", "WIDE2-2"]);
        assert_eq!(parsed.payload, b"!4903.50N/07201.75W-Test");
    }

    #[test]
    fn callsign_encoding_is_shifted_ascii() {
        let packet = aprs_packet(&[], b"x");
        let bytes = packet.bytes_with_crc();
        // "APRS  " left-shifted one bit
        assert_eq!(&bytes[..6], &[b'A' << 1, b'P' << 1, b'R' << 1, b'S' << 1, b' ' << 1, b' ' << 1]);
        // lowercase input is uppercased
        let lower = Packet::from_parts("aprs", "n0call", &[], 0x03, 0xF0, b"").unwrap();
        assert_eq!(&lower.bytes_with_crc()[..6], &bytes[..6]);
    }

    #[test]
    fn invalid_callsigns_are_hard_errors() {
        let e = Packet::from_parts("TOOLONG7", "N0CALL", &[], 0x03, 0xF0, b"");
        assert!(matches!(e, Err(ModemError::InvalidCallsign(_))));
        let e = Packet::from_parts("AP_RS", "N0CALL", &[], 0x03, 0xF0, b"");
        assert!(matches!(e, Err(ModemError::InvalidCallsign(_))));
        let e = Packet::from_parts("APRS", "N0CALL-16", &[], 0x03, 0xF0, b"");
        assert!(matches!(e, Err(ModemError::InvalidSsid(_))));
        let e = Packet::from_parts("APRS", "N0CALL-x", &[], 0x03, 0xF0, b"");
        assert!(matches!(e, Err(ModemError::InvalidSsid(_))));
    }

    #[test]
    fn oversize_inputs_are_hard_errors() {
        let path = ["W1", "W2", "W3", "W4", "W5", "W6", "W7", "W8", "W9"];
        let e = Packet::from_parts("APRS", "N0CALL", &path, 0x03, 0xF0, b"");
        assert!(matches!(e, Err(ModemError::PathTooLong(9))));
        let big = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let e = Packet::from_parts("APRS", "N0CALL", &[], 0x03, 0xF0, &big);
        assert!(matches!(e, Err(ModemError::PayloadTooLarge(_))));
    }

    #[test]
    fn add_byte_refuses_oversized_frames() {
        let mut packet = Packet::new();
        for _ in 0..MAX_FRAME_SIZE {
            assert!(packet.add_byte(0xAA));
        }
        assert!(!packet.add_byte(0xAA));
    }

    #[test]
    fn short_frames_are_invalid_even_with_correct_residue() {
        // 10 body bytes plus the FCS is still under the 18-byte minimum.
        let packet = Packet::from_raw(b"0123456789").unwrap();
        assert_eq!(packet.crc_register(), AX25_CRC_CORRECT);
        assert!(!packet.is_valid());
    }

    #[test]
    fn eight_path_entries_parse() {
        let path = ["W1-1", "W2-2", "W3-3", "W4-4", "W5-5", "W6-6", "W7-7", "W8-8"];
        let packet = aprs_packet(&path, b"x");
        assert_eq!(packet.parse().path.len(), 8);
    }

    #[test]
    fn display_renders_tnc2_form() {
        let packet = aprs_packet(&["WIDE1-1"], b">status \x01");
        assert_eq!(packet.to_string(), "N0CALL-9>APRS,WIDE1-1:>status \\x01");
    }
}
