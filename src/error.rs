//! Error types for the `audioconv` crate.
//!
//! [`ConvertError`] is the single error type returned by every fallible
//! operation. Each variant names the pipeline [`Stage`] it came from, so a
//! message such as `Writer: failed to write trailer: ...` tells the caller
//! which stage and operation failed without extra logging at the call site.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io::Error as IoError,
    path::PathBuf,
};

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

use crate::pipeline::PipelineState;

/// The pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Container reader (demuxer).
    Reader,
    /// Audio decoder.
    Decoder,
    /// Sample format / rate / layout converter.
    Resampler,
    /// Target codec encoder.
    Encoder,
    /// Container writer (muxer).
    Writer,
    /// The driver loop itself (state, options, cancellation).
    Driver,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Stage::Reader => write!(f, "Reader"),
            Stage::Decoder => write!(f, "Decoder"),
            Stage::Resampler => write!(f, "Resampler"),
            Stage::Encoder => write!(f, "Encoder"),
            Stage::Writer => write!(f, "Writer"),
            Stage::Driver => write!(f, "Driver"),
        }
    }
}

/// The unified error type for all `audioconv` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConvertError {
    /// The input could not be opened: missing, unreadable, or not a
    /// recognised container.
    #[error("Reader: failed to open input {path}: {reason}")]
    Open {
        /// Path passed to [`MediaSource::open`](crate::MediaSource::open).
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The container opened but its stream headers are unusable.
    #[error("Reader: failed to probe {path}: {reason}")]
    Probe {
        /// Input path.
        path: PathBuf,
        /// What was wrong with the stream headers.
        reason: String,
    },

    /// The container holds no audio stream.
    #[error("Reader: no audio stream found in {path}")]
    NoAudioStream {
        /// Input path.
        path: PathBuf,
    },

    /// Reading the next packet from the container failed.
    #[error("Reader: failed to read packet: {0}")]
    Read(String),

    /// The FFmpeg build has no decoder for the input codec.
    #[error("Decoder: no decoder available for codec {codec}")]
    DecoderNotFound {
        /// Codec name as reported by the container.
        codec: String,
    },

    /// The FFmpeg build has no encoder for the target codec.
    #[error("Encoder: no encoder available for codec {codec}")]
    EncoderNotFound {
        /// Target codec name.
        codec: String,
    },

    /// A decoder or encoder context could not be configured or opened.
    #[error("{stage}: failed to open codec: {reason}")]
    CodecOpen {
        /// [`Stage::Decoder`] or [`Stage::Encoder`].
        stage: Stage,
        /// Underlying reason.
        reason: String,
    },

    /// A single packet could not be decoded. Recoverable: the driver skips
    /// the packet unless the consecutive-error limit is reached.
    #[error("Decoder: failed to decode packet on stream {stream_index}: {reason}")]
    Decode {
        /// Stream the packet belonged to.
        stream_index: usize,
        /// Underlying reason.
        reason: String,
    },

    /// Too many consecutive packets failed to decode.
    #[error("Decoder: aborting after {consecutive} consecutive decode errors (last: {reason})")]
    DecodeErrorLimit {
        /// Number of consecutive failures observed.
        consecutive: usize,
        /// Message of the last failure.
        reason: String,
    },

    /// Sample conversion failed.
    #[error("Resampler: {0}")]
    Resample(String),

    /// The encoder rejected a frame or failed to produce a packet.
    #[error("Encoder: failed to encode frame: {0}")]
    Encode(String),

    /// The output container could not be created.
    #[error("Writer: failed to create output {path}: {reason}")]
    Create {
        /// Output path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Declaring the output stream or writing the container header failed.
    #[error("Writer: failed to write header: {0}")]
    Header(String),

    /// Writing an encoded packet failed (I/O fault, disk full).
    #[error("Writer: failed to write packet: {0}")]
    Write(String),

    /// Writing the container trailer failed. The output file is invalid.
    #[error("Writer: failed to write trailer: {0}")]
    Trailer(String),

    /// A buffer, frame, or context could not be allocated.
    #[error("{stage}: allocation failed: {reason}")]
    Allocation {
        /// Stage that ran out of resources.
        stage: Stage,
        /// Underlying reason.
        reason: String,
    },

    /// Input was fed to a stage after it had been flushed.
    #[error("{stage}: stage was already flushed")]
    StageFlushed {
        /// The flushed stage.
        stage: Stage,
    },

    /// [`Pipeline::run`](crate::Pipeline::run) was called from a state other
    /// than `Opened`.
    #[error("Driver: pipeline cannot run from state {0:?}")]
    InvalidState(PipelineState),

    /// No AAC-compatible container could be inferred from the output path.
    #[error("Writer: cannot infer an output container for {path} (use .aac, .m4a, .mp4 or .mka)")]
    UnsupportedContainer {
        /// Output path.
        path: PathBuf,
    },

    /// A configuration value was out of range.
    #[error("Driver: invalid option: {0}")]
    InvalidOption(String),

    /// The job was cancelled through a
    /// [`CancellationToken`](crate::CancellationToken).
    #[error("Driver: conversion cancelled")]
    Cancelled,

    /// An I/O error outside FFmpeg (e.g. removing a partial output).
    #[error("Driver: I/O error: {0}")]
    Io(#[from] IoError),

    /// An FFmpeg error that was not attributed to a specific stage.
    #[error("Driver: FFmpeg error: {0}")]
    Ffmpeg(String),
}

impl ConvertError {
    /// Whether the driver may skip past this error and keep streaming.
    ///
    /// Only per-packet decode failures are recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ConvertError::Decode { .. })
    }

    /// The stage this error is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            ConvertError::Open { .. }
            | ConvertError::Probe { .. }
            | ConvertError::NoAudioStream { .. }
            | ConvertError::Read(_) => Stage::Reader,
            ConvertError::DecoderNotFound { .. }
            | ConvertError::Decode { .. }
            | ConvertError::DecodeErrorLimit { .. } => Stage::Decoder,
            ConvertError::Resample(_) => Stage::Resampler,
            ConvertError::EncoderNotFound { .. } | ConvertError::Encode(_) => Stage::Encoder,
            ConvertError::Create { .. }
            | ConvertError::Header(_)
            | ConvertError::Write(_)
            | ConvertError::Trailer(_)
            | ConvertError::UnsupportedContainer { .. } => Stage::Writer,
            ConvertError::CodecOpen { stage, .. }
            | ConvertError::Allocation { stage, .. }
            | ConvertError::StageFlushed { stage } => *stage,
            ConvertError::InvalidState(_)
            | ConvertError::InvalidOption(_)
            | ConvertError::Cancelled
            | ConvertError::Io(_)
            | ConvertError::Ffmpeg(_) => Stage::Driver,
        }
    }

    /// Map an FFmpeg error to [`ConvertError::Allocation`] when it signals
    /// memory exhaustion, otherwise to the variant built by `otherwise`.
    pub(crate) fn from_ffmpeg(
        stage: Stage,
        error: FfmpegError,
        otherwise: impl FnOnce(String) -> ConvertError,
    ) -> ConvertError {
        match error {
            FfmpegError::Other { errno } if errno == ffmpeg_next::error::ENOMEM => {
                ConvertError::Allocation {
                    stage,
                    reason: error.to_string(),
                }
            }
            other => otherwise(other.to_string()),
        }
    }
}

impl From<FfmpegError> for ConvertError {
    fn from(error: FfmpegError) -> Self {
        ConvertError::Ffmpeg(error.to_string())
    }
}
