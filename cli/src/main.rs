use clap::{Parser, Subcommand};
use hound::{SampleFormat, WavSpec};
use std::path::PathBuf;

use ax25modem_core::packet::{AX25_CONTROL_APRS, AX25_PROTOCOL_NO_LAYER_3};
use ax25modem_core::{Modulator, MultiDemodulator, Packet};

#[derive(Parser)]
#[command(name = "ax25modem")]
#[command(about = "AFSK1200 packet-radio modem for AX.25/APRS over WAV audio")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an AX.25 frame and modulate it into a WAV file
    Encode {
        /// Destination callsign (e.g. APRS)
        #[arg(long, default_value = "APRS")]
        dest: String,

        /// Source callsign with optional SSID (e.g. N0CALL-9)
        #[arg(long)]
        source: String,

        /// Digipeater path entry; repeat for multiple hops
        #[arg(long = "via")]
        path: Vec<String>,

        /// Payload text
        #[arg(value_name = "PAYLOAD")]
        payload: String,

        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Output sample rate in Hz
        #[arg(long, default_value = "48000")]
        sample_rate: u32,

        /// Preamble length in 10 ms units
        #[arg(long, default_value = "20")]
        tx_delay: u32,
    },

    /// Demodulate a WAV file and print the decoded frames
    Decode {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Encode {
            dest,
            source,
            path,
            payload,
            output,
            sample_rate,
            tx_delay,
        } => encode_command(&dest, &source, &path, &payload, &output, sample_rate, tx_delay),
        Commands::Decode { input } => decode_command(&input),
    }
}

fn encode_command(
    dest: &str,
    source: &str,
    path: &[String],
    payload: &str,
    output: &PathBuf,
    sample_rate: u32,
    tx_delay: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let path: Vec<&str> = path.iter().map(String::as_str).collect();
    let packet = Packet::from_parts(
        dest,
        source,
        &path,
        AX25_CONTROL_APRS,
        AX25_PROTOCOL_NO_LAYER_3,
        payload.as_bytes(),
    )?;
    println!("Encoding {}", packet);

    let mut modulator = Modulator::new(sample_rate);
    modulator.set_tx_delay(tx_delay);
    modulator.prepare_to_transmit(&packet);

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output, spec)?;

    let mut buf = vec![0.0f32; modulator.buffer_size()];
    let mut total = 0usize;
    loop {
        let n = modulator.next_samples(&mut buf)?;
        if n == 0 {
            break;
        }
        for &sample in &buf[..n] {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * 32767.0) as i16)?;
        }
        total += n;
    }
    writer.finalize()?;

    println!(
        "Wrote {} samples ({:.2} s) to {}",
        total,
        total as f64 / sample_rate as f64,
        output.display()
    );
    Ok(())
}

fn decode_command(input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = hound::WavReader::open(input)?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(format!("expected mono audio, got {} channels", spec.channels).into());
    }

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };
    println!(
        "Read {} samples at {} Hz from {}",
        samples.len(),
        spec.sample_rate,
        input.display()
    );

    let mut multi = MultiDemodulator::new(spec.sample_rate)?;
    let mut count = 0usize;
    for chunk in samples.chunks(4096) {
        multi.add_samples(chunk);
        while let Some(frame) = multi.take_frame() {
            count += 1;
            print!("{}: {}", count, frame);
            if let Some(stats) = frame.stats() {
                print!(
                    "  [{} dB, tone ratio {:.2}, period err {:.2}]",
                    stats.emphasis_db, stats.tone_ratio, stats.max_period_error
                );
            }
            println!();
        }
    }

    let stats = multi.stats();
    println!(
        "Decoded {} frame(s): flat only {}, emphasized only {}, both {}",
        stats.forwarded, stats.flat_only, stats.emphasized_only, stats.both
    );
    Ok(())
}
