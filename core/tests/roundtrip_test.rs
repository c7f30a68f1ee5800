// Full modulate -> demodulate round trips through the AFSK1200 modem.
//
// These run the per-sample correlation receiver over hundreds of
// thousands of samples; release mode is noticeably faster:
//   cargo test -p ax25modem-core --test roundtrip_test --release

use ax25modem_core::packet::{AX25_CONTROL_APRS, AX25_PROTOCOL_NO_LAYER_3};
use ax25modem_core::{
    DeEmphasis, Demodulator, Modulator, MultiDemodulator, Packet, SUPPORTED_SAMPLE_RATES,
};

fn modulate(rate: u32, packet: &Packet) -> Vec<f32> {
    let mut modulator = Modulator::new(rate);
    modulator.prepare_to_transmit(packet);
    let mut buf = vec![0.0f32; modulator.buffer_size()];
    let mut audio = Vec::new();
    loop {
        let n = modulator.next_samples(&mut buf).expect("buffer too small");
        if n == 0 {
            break;
        }
        audio.extend_from_slice(&buf[..n]);
    }
    audio.extend(std::iter::repeat(0.0).take(rate as usize / 4));
    audio
}

fn aprs_packet(payload: &[u8]) -> Packet {
    Packet::from_parts(
        "APRS",
        "N0CALL-9",
        &["WIDE1-1", "WIDE2-2"],
        AX25_CONTROL_APRS,
        AX25_PROTOCOL_NO_LAYER_3,
        payload,
    )
    .expect("failed to build packet")
}

#[test]
fn round_trip_at_every_supported_rate() {
    let payload = b"=4903.50N/07201.75W-Test station with AFSK1200";
    for &rate in &SUPPORTED_SAMPLE_RATES {
        let packet = aprs_packet(payload);
        let audio = modulate(rate, &packet);

        let mut demodulator = Demodulator::new(rate, DeEmphasis::Db6).unwrap();
        demodulator.add_samples(&audio);

        let decoded = demodulator
            .take_frame()
            .unwrap_or_else(|| panic!("no frame decoded at {} Hz", rate));
        assert_eq!(decoded.bytes_with_crc(), packet.bytes_with_crc());
        assert_eq!(decoded.parse().payload, payload);
        assert!(
            demodulator.take_frame().is_none(),
            "duplicate frame delivered at {} Hz",
            rate
        );
    }
}

#[test]
fn round_trip_of_random_binary_payloads() {
    use rand::{Rng, SeedableRng};
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x1200_2200);

    for len in [1usize, 64, 256] {
        let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let packet = aprs_packet(&payload);
        let audio = modulate(48000, &packet);

        let mut demodulator = Demodulator::new(48000, DeEmphasis::None).unwrap();
        demodulator.add_samples(&audio);
        let decoded = demodulator
            .take_frame()
            .unwrap_or_else(|| panic!("no frame for {}-byte payload", len));
        assert_eq!(decoded.parse().payload, payload);
    }
}

#[test]
fn all_ones_payload_is_destuffed_exactly_once() {
    let packet = aprs_packet(&[0xFF; 32]);
    let audio = modulate(48000, &packet);

    let mut demodulator = Demodulator::new(48000, DeEmphasis::None).unwrap();
    demodulator.add_samples(&audio);
    let decoded = demodulator.take_frame().expect("no frame decoded");
    assert_eq!(decoded.parse().payload, vec![0xFF; 32]);
}

#[test]
fn diversity_receiver_delivers_each_frame_once() {
    let payloads: [&[u8]; 3] = [b"first beacon", b":N0CALL-9 :ack01", b"!4903.50N/07201.75W-"];
    let mut multi = MultiDemodulator::new(48000).unwrap();

    for payload in payloads {
        let packet = aprs_packet(payload);
        multi.add_samples(&modulate(48000, &packet));
    }

    for payload in payloads {
        let frame = multi.take_frame().expect("missing frame");
        assert_eq!(frame.parse().payload, payload);
    }
    assert!(multi.take_frame().is_none());
    assert_eq!(multi.stats().forwarded, 3);
    assert_eq!(multi.stats().both, 3);
}

#[test]
fn gain_does_not_affect_the_decode() {
    let packet = aprs_packet(b"gain invariance");
    let audio = modulate(16000, &packet);

    for gain in [0.05f32, 0.5, 1.0] {
        let scaled: Vec<f32> = audio.iter().map(|s| s * gain).collect();
        let mut demodulator = Demodulator::new(16000, DeEmphasis::Db6).unwrap();
        demodulator.add_samples(&scaled);
        let decoded = demodulator
            .take_frame()
            .unwrap_or_else(|| panic!("no frame at gain {}", gain));
        assert_eq!(decoded.bytes_with_crc(), packet.bytes_with_crc());
    }
}
