//! # audioconv
//!
//! Streaming audio transcoding to AAC, powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! A conversion reads packets from the first audio stream of any container
//! FFmpeg can demux, decodes them, converts sample format, rate and channel
//! layout as the encoder requires, encodes to AAC and muxes the result into
//! ADTS, MP4/M4A or Matroska. Everything happens in one pass, one packet at
//! a time, so memory use does not grow with the input.
//!
//! ## Quick Start
//!
//! ```no_run
//! use audioconv::Converter;
//!
//! let summary = Converter::new("input.flac", "output.m4a").run()?;
//! println!("{} packets, {:.1}s", summary.packets_written, summary.duration().as_secs_f64());
//! # Ok::<(), audioconv::ConvertError>(())
//! ```
//!
//! Or, with nothing but a status code:
//!
//! ```no_run
//! let status = audioconv::convert_audio("input.wav", "output.aac", 2);
//! std::process::exit(status);
//! ```
//!
//! ## Stages
//!
//! | Stage | Type |
//! |-------|------|
//! | Container reader | [`MediaSource`] |
//! | Decoder | [`AudioDecoder`] |
//! | Resampler | [`Resampler`] |
//! | Encoder | [`AacEncoder`] |
//! | Container writer | [`MediaSink`] |
//! | Driver | [`Pipeline`] |
//!
//! Each stage can be used on its own; [`Converter`] wires them together.
//!
//! ## Errors
//!
//! Every failure is a [`ConvertError`] whose message names the stage that
//! failed ([`ConvertError::stage`]). Corrupt packets are skipped with a
//! warning until a configurable number fail in a row; every other error
//! aborts the job, releases all handles and deletes the partial output.
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | [`Converter::run_async`] and `ConversionFuture` via Tokio |
//! | `rayon` | `convert_batch` runs independent jobs on the rayon pool |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries (libavcodec, libavformat, libavutil,
//! libswresample) must be installed on your system.

#[cfg(feature = "rayon")]
pub mod batch;
pub mod configuration;
pub mod convert;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod packet;
pub mod pipeline;
pub mod progress;
pub mod reader;
pub mod resampler;
#[cfg(feature = "async")]
pub mod stream;
pub mod writer;

#[cfg(feature = "rayon")]
pub use batch::convert_batch;
pub use configuration::{
    ChannelPolicy, ConvertOptions, DEFAULT_BIT_RATE, DEFAULT_MAX_DECODE_ERRORS, MAX_SAMPLE_RATE,
    ThreadCount,
};
pub use convert::{Converter, convert_audio};
pub use decoder::AudioDecoder;
pub use encoder::{AacEncoder, EncoderSettings, FrameChunker, is_aac_encoder_available};
pub use error::{ConvertError, Stage};
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use frame::{RawFrame, SampleSpec};
pub use packet::EncodedPacket;
pub use pipeline::{
    ConversionSummary, FrameDecoder, FrameEncoder, FrameResampler, PacketSource, PacketWriter,
    Pipeline, PipelineState,
};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use reader::{MediaKind, MediaSource, StreamInfo};
pub use resampler::Resampler;
#[cfg(feature = "async")]
pub use stream::ConversionFuture;
pub use writer::{MediaSink, OutputContainer};
