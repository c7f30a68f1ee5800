//! FIR primitives for the demodulator.
//!
//! The per-sample receive path keeps its history in fixed-length cyclic
//! buffers; [`fir`] evaluates a filter against such a buffer without any
//! copying. Coefficients are designed once at demodulator construction with
//! a Hamming-windowed sinc and are immutable afterwards.

use std::f32::consts::PI;

const TWO_PI: f32 = 2.0 * PI;

/// Filter a signal stored in a cyclic buffer with a FIR filter.
///
/// `j` is the index of the newest sample; the filter walks backwards in
/// time with wraparound. The buffer must be at least as long as the filter.
pub fn fir(x: &[f32], j: usize, coeffs: &[f32]) -> f32 {
    debug_assert!(x.len() >= coeffs.len());
    let mut c = 0.0;
    let mut j = j;
    for &f in coeffs {
        c += x[j] * f;
        j = if j == 0 { x.len() - 1 } else { j - 1 };
    }
    c
}

/// Hamming-windowed sinc low-pass, normalized to unity DC gain.
pub fn lowpass(len: usize, cutoff: f32, sample_rate: f32) -> Vec<f32> {
    debug_assert!(len % 2 == 1, "linear phase needs an odd length");
    let m = (len - 1) as f32;
    let fc = cutoff / sample_rate;
    let mut h = Vec::with_capacity(len);
    for i in 0..len {
        let x = i as f32 - m / 2.0;
        let s = if x == 0.0 {
            2.0 * fc
        } else {
            (TWO_PI * fc * x).sin() / (PI * x)
        };
        let w = 0.54 - 0.46 * (TWO_PI * i as f32 / m).cos();
        h.push(s * w);
    }
    let gain: f32 = h.iter().sum();
    for c in h.iter_mut() {
        *c /= gain;
    }
    h
}

/// Band-pass as the difference of two low-pass designs.
pub fn bandpass(len: usize, low: f32, high: f32, sample_rate: f32) -> Vec<f32> {
    let hp = lowpass(len, high, sample_rate);
    let lp = lowpass(len, low, sample_rate);
    hp.iter().zip(lp.iter()).map(|(a, b)| a - b).collect()
}

/// Receive filter length for a given sample rate, scaled from the 39-tap
/// reference design at 48 kHz and forced odd.
pub fn filter_len(sample_rate: u32) -> usize {
    let n = (39 * sample_rate as usize + 24000) / 48000;
    if n % 2 == 1 {
        n
    } else {
        n + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone_response(coeffs: &[f32], freq: f32, rate: f32) -> f32 {
        // Steady-state amplitude of a sine pushed through the filter.
        let mut buf = vec![0.0f32; coeffs.len()];
        let mut j = 0;
        let mut peak = 0.0f32;
        for i in 0..(rate / 10.0) as usize {
            buf[j] = (TWO_PI * freq * i as f32 / rate).sin();
            let y = fir(&buf, j, coeffs).abs();
            if i > 2 * coeffs.len() && y > peak {
                peak = y;
            }
            j = (j + 1) % buf.len();
        }
        peak
    }

    #[test]
    fn fir_matches_direct_convolution() {
        let coeffs = [0.25, 0.5, 0.25];
        let mut buf = [0.0f32; 8];
        let input = [1.0, 2.0, 3.0, 4.0];
        let mut out = Vec::new();
        for (i, &s) in input.iter().enumerate() {
            buf[i] = s;
            out.push(fir(&buf, i, &coeffs));
        }
        assert_eq!(out, vec![0.25, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn fir_wraps_around_the_buffer() {
        let coeffs = [1.0, 1.0];
        let mut buf = [0.0f32; 3];
        // Fill past the end so the window spans the wrap point.
        for (i, s) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            buf[i % 3] = *s;
        }
        // Newest sample 4.0 sits at index 0, previous 3.0 at index 2.
        assert_eq!(fir(&buf, 0, &coeffs), 7.0);
    }

    #[test]
    fn lowpass_has_unity_dc_gain() {
        let h = lowpass(39, 1200.0, 48000.0);
        let dc: f32 = h.iter().sum();
        assert!((dc - 1.0).abs() < 1e-6);
    }

    #[test]
    fn bandpass_passes_tones_and_rejects_out_of_band() {
        let h = bandpass(39, 900.0, 2500.0, 48000.0);
        let mark = tone_response(&h, 1200.0, 48000.0);
        let space = tone_response(&h, 2200.0, 48000.0);
        let hum = tone_response(&h, 60.0, 48000.0);
        assert!(mark > 0.25, "mark tone attenuated: {mark}");
        assert!(space > 0.25, "space tone attenuated: {space}");
        assert!(hum < 0.1 * mark, "60 Hz not rejected: {hum}");
    }

    #[test]
    fn filter_len_scales_with_rate() {
        assert_eq!(filter_len(48000), 39);
        assert_eq!(filter_len(16000), 13);
        assert!(filter_len(16000) % 2 == 1);
    }
}
