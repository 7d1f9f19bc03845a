//! Conversion configuration.
//!
//! [`ConvertOptions`] is a builder that carries the encoding policy
//! (codec, bit rate, threads, channel handling), the decode-error budget,
//! and the progress/cancellation hooks of a conversion job.
//!
//! # Example
//!
//! ```no_run
//! use audioconv::{CancellationToken, ChannelPolicy, ConvertOptions, ThreadCount};
//!
//! let token = CancellationToken::new();
//! let options = ConvertOptions::new()
//!     .with_bit_rate(128_000)
//!     .with_threads(ThreadCount::new(4)?)
//!     .with_channel_policy(ChannelPolicy::Stereo)
//!     .with_cancellation(token.clone());
//! # Ok::<(), audioconv::ConvertError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;

use ffmpeg_next::codec::Id;

use crate::error::ConvertError;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};
use crate::writer::OutputContainer;

/// Default target bit rate in bits per second.
pub const DEFAULT_BIT_RATE: usize = 64_000;

/// Default number of consecutive decode errors that aborts a job.
pub const DEFAULT_MAX_DECODE_ERRORS: usize = 3;

/// Highest sample rate [`ConvertOptions::with_sample_rate`] accepts.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Codec thread count: a positive integer forwarded to FFmpeg's threading
/// configuration for both the decoder and the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadCount(NonZeroUsize);

impl ThreadCount {
    /// A single codec thread.
    pub const ONE: ThreadCount = ThreadCount(NonZeroUsize::MIN);

    /// Validate a thread count. Zero is rejected with
    /// [`ConvertError::InvalidOption`].
    pub fn new(count: usize) -> Result<Self, ConvertError> {
        NonZeroUsize::new(count)
            .map(ThreadCount)
            .ok_or_else(|| ConvertError::InvalidOption("thread count must be at least 1".to_string()))
    }

    /// The thread count as a plain integer.
    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for ThreadCount {
    fn default() -> Self {
        Self::ONE
    }
}

impl TryFrom<i64> for ThreadCount {
    type Error = ConvertError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let count = usize::try_from(value).map_err(|_| {
            ConvertError::InvalidOption(format!("thread count must be at least 1, got {value}"))
        })?;
        ThreadCount::new(count)
    }
}

/// How the decoder's channel layout is reconciled with the encoder input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPolicy {
    /// Keep the source layout when it has 1 to 8 channels; wider sources
    /// are downmixed to stereo.
    #[default]
    Preserve,
    /// Downmix (or pass through) to a single channel.
    Mono,
    /// Down- or upmix to two channels.
    Stereo,
}

impl FromStr for ChannelPolicy {
    type Err = ConvertError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "preserve" => Ok(ChannelPolicy::Preserve),
            "mono" => Ok(ChannelPolicy::Mono),
            "stereo" => Ok(ChannelPolicy::Stereo),
            other => Err(ConvertError::InvalidOption(format!(
                "unknown channel policy '{other}' (expected preserve, mono or stereo)"
            ))),
        }
    }
}

/// Settings for a single conversion job.
///
/// A default-constructed value encodes AAC at 64 kb/s with one codec
/// thread, preserves the source channel layout, and aborts after three
/// consecutive undecodable packets.
#[derive(Clone)]
pub struct ConvertOptions {
    pub(crate) codec: Id,
    pub(crate) bit_rate: usize,
    pub(crate) threads: ThreadCount,
    pub(crate) channel_policy: ChannelPolicy,
    pub(crate) sample_rate: Option<u32>,
    pub(crate) container: Option<OutputContainer>,
    pub(crate) max_decode_errors: usize,
    pub(crate) keep_partial_output: bool,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
}

impl Debug for ConvertOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ConvertOptions")
            .field("codec", &self.codec)
            .field("bit_rate", &self.bit_rate)
            .field("threads", &self.threads.get())
            .field("channel_policy", &self.channel_policy)
            .field("sample_rate", &self.sample_rate)
            .field("container", &self.container)
            .field("max_decode_errors", &self.max_decode_errors)
            .field("keep_partial_output", &self.keep_partial_output)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvertOptions {
    /// Create options with the default encoding policy.
    pub fn new() -> Self {
        Self {
            codec: Id::AAC,
            bit_rate: DEFAULT_BIT_RATE,
            threads: ThreadCount::ONE,
            channel_policy: ChannelPolicy::Preserve,
            sample_rate: None,
            container: None,
            max_decode_errors: DEFAULT_MAX_DECODE_ERRORS,
            keep_partial_output: false,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
        }
    }

    /// Override the target codec. The output container must be able to
    /// carry it.
    #[must_use]
    pub fn with_codec(mut self, codec: Id) -> Self {
        self.codec = codec;
        self
    }

    /// Set the target bit rate in bits per second.
    #[must_use]
    pub fn with_bit_rate(mut self, bit_rate: usize) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    /// Set the codec thread count.
    #[must_use]
    pub fn with_threads(mut self, threads: ThreadCount) -> Self {
        self.threads = threads;
        self
    }

    /// Choose how the source channel layout maps onto the encoder.
    #[must_use]
    pub fn with_channel_policy(mut self, policy: ChannelPolicy) -> Self {
        self.channel_policy = policy;
        self
    }

    /// Force an output sample rate instead of negotiating one.
    #[must_use]
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Force an output container instead of inferring it from the output
    /// path's extension.
    #[must_use]
    pub fn with_container(mut self, container: OutputContainer) -> Self {
        self.container = Some(container);
        self
    }

    /// Number of consecutive undecodable packets that aborts the job.
    /// Clamped to a minimum of 1.
    #[must_use]
    pub fn with_max_decode_errors(mut self, limit: usize) -> Self {
        self.max_decode_errors = limit.max(1);
        self
    }

    /// Keep the partially written output when a job aborts after the
    /// output file was created. By default it is deleted.
    #[must_use]
    pub fn with_keep_partial_output(mut self, keep: bool) -> Self {
        self.keep_partial_output = keep;
        self
    }

    /// Attach a progress callback, invoked every
    /// [`batch_size`](ConvertOptions::with_batch_size) packets.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token, polled before each packet read.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires (every N packets).
    /// Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Target codec.
    pub fn codec(&self) -> Id {
        self.codec
    }

    /// Target bit rate in bits per second.
    pub fn bit_rate(&self) -> usize {
        self.bit_rate
    }

    /// Codec thread count.
    pub fn threads(&self) -> ThreadCount {
        self.threads
    }

    /// Consecutive decode-error limit.
    pub fn max_decode_errors(&self) -> usize {
        self.max_decode_errors
    }

    pub(crate) fn validate(&self) -> Result<(), ConvertError> {
        if self.bit_rate == 0 {
            return Err(ConvertError::InvalidOption(
                "bit rate must be greater than zero".to_string(),
            ));
        }
        match self.sample_rate {
            Some(0) => {
                return Err(ConvertError::InvalidOption(
                    "sample rate must be greater than zero".to_string(),
                ));
            }
            Some(rate) if rate > MAX_SAMPLE_RATE => {
                return Err(ConvertError::InvalidOption(format!(
                    "sample rate {rate} Hz is above the {MAX_SAMPLE_RATE} Hz limit"
                )));
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
