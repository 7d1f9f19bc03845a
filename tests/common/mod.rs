//! Fixtures generated at test time.

#![allow(dead_code)]

use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write a 16-bit PCM WAV file holding a 440 Hz tone on every channel.
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: usize) {
    let block_align = u32::from(channels) * 2;
    let data_len = samples as u32 * block_align;

    let mut out = BufWriter::new(File::create(path).expect("Failed to create WAV fixture"));
    out.write_all(b"RIFF").unwrap();
    out.write_all(&(36 + data_len).to_le_bytes()).unwrap();
    out.write_all(b"WAVEfmt ").unwrap();
    out.write_all(&16_u32.to_le_bytes()).unwrap();
    out.write_all(&1_u16.to_le_bytes()).unwrap();
    out.write_all(&channels.to_le_bytes()).unwrap();
    out.write_all(&sample_rate.to_le_bytes()).unwrap();
    out.write_all(&(sample_rate * block_align).to_le_bytes()).unwrap();
    out.write_all(&(block_align as u16).to_le_bytes()).unwrap();
    out.write_all(&16_u16.to_le_bytes()).unwrap();
    out.write_all(b"data").unwrap();
    out.write_all(&data_len.to_le_bytes()).unwrap();

    for n in 0..samples {
        let t = n as f64 / f64::from(sample_rate);
        let value = ((2.0 * PI * 440.0 * t).sin() * 12_000.0) as i16;
        for _ in 0..channels {
            out.write_all(&value.to_le_bytes()).unwrap();
        }
    }
    out.flush().unwrap();
}

/// Write a SubRip file: a container with a subtitle stream and no audio.
pub fn write_srt(path: &Path) {
    std::fs::write(
        path,
        "1\n00:00:00,000 --> 00:00:01,500\nHello there.\n\n2\n00:00:02,000 --> 00:00:03,000\nGoodbye.\n",
    )
    .expect("Failed to write SRT fixture");
}

/// Every packet payload of the output's audio stream, in order.
pub fn audio_payloads(path: &Path) -> Vec<Vec<u8>> {
    let mut source = audioconv::MediaSource::open(path).expect("Failed to reopen output");
    source.select_audio_stream().expect("Output has no audio stream");
    let mut payloads = Vec::new();
    while let Some(packet) = source.read_packet().expect("Failed to read output packet") {
        if !packet.is_skip() {
            payloads.push(packet.data().to_vec());
        }
    }
    payloads
}

/// Whether the FFmpeg build can encode AAC. Tests that convert return
/// early otherwise.
pub fn can_encode() -> bool {
    audioconv::is_aac_encoder_available()
}
