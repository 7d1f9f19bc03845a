//! Target codec encoding.
//!
//! [`AacEncoder`] opens the target encoder with parameters negotiated from
//! the decoder's output and the encoder's advertised capabilities, re-chunks
//! incoming frames to the codec's fixed frame size, and stamps a gapless
//! sample-count PTS on everything it sends.
//!
//! The negotiation rules are plain functions so they can be exercised
//! without an encoder:
//!
//! - sample format: [`select_sample_format`]
//! - sample rate: [`select_sample_rate`]
//! - channel layout: [`select_channel_layout`]

use ffmpeg_next::{
    ChannelLayout, Codec, Error as FfmpegError, Packet, Rational,
    codec::{Capabilities, Id, context::Context as CodecContext},
    encoder::Audio as FfmpegAudioEncoder,
    format::{Sample, sample::Type as SampleType},
    frame::Audio as AudioFrame,
    threading::{Config as ThreadingConfig, Type as ThreadingType},
};

use crate::configuration::{ChannelPolicy, ConvertOptions, ThreadCount};
use crate::error::{ConvertError, Stage};
use crate::frame::{RawFrame, SampleSpec};
use crate::packet::EncodedPacket;

/// Sample format used when the encoder advertises none.
pub const FALLBACK_SAMPLE_FORMAT: Sample = Sample::F32(SampleType::Planar);

/// Widest layout passed through unchanged under [`ChannelPolicy::Preserve`].
pub const MAX_PRESERVED_CHANNELS: u16 = 8;

/// Everything needed to open an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub codec: Id,
    pub sample_rate: u32,
    pub layout: ChannelLayout,
    pub format: Sample,
    /// Bits per second.
    pub bit_rate: usize,
    pub threads: ThreadCount,
    /// Put codec extradata in the container header instead of in-band.
    /// Required by MP4 and Matroska.
    pub global_header: bool,
}

impl EncoderSettings {
    /// The frame format the encoder will accept.
    pub fn input_spec(&self) -> SampleSpec {
        SampleSpec {
            format: self.format,
            rate: self.sample_rate,
            layout: self.layout,
        }
    }

    /// Negotiate settings for encoding `source` with `codec`.
    pub fn negotiate(
        codec: Codec,
        source: SampleSpec,
        options: &ConvertOptions,
        global_header: bool,
    ) -> Self {
        let (formats, rates) = match codec.audio() {
            Ok(audio) => (
                audio.formats().map(|formats| formats.collect::<Vec<_>>()),
                audio.rates().map(|rates| {
                    rates
                        .filter(|&rate| rate > 0)
                        .map(|rate| rate as u32)
                        .collect::<Vec<_>>()
                }),
            ),
            Err(_) => (None, None),
        };

        let sample_rate = options
            .sample_rate
            .unwrap_or_else(|| select_sample_rate(source.rate, rates.as_deref()));

        Self {
            codec: codec.id(),
            sample_rate,
            layout: select_channel_layout(source.layout, options.channel_policy),
            format: select_sample_format(formats.as_deref()),
            bit_rate: options.bit_rate,
            threads: options.threads,
            global_header,
        }
    }
}

/// The encoder's first advertised sample format, else planar float.
pub fn select_sample_format(advertised: Option<&[Sample]>) -> Sample {
    advertised
        .and_then(|formats| formats.iter().copied().find(|&format| format != Sample::None))
        .unwrap_or(FALLBACK_SAMPLE_FORMAT)
}

/// Keep the source rate if the encoder accepts it (or lists no rates);
/// otherwise the smallest advertised rate above it, else the highest
/// advertised rate.
pub fn select_sample_rate(source: u32, advertised: Option<&[u32]>) -> u32 {
    let Some(rates) = advertised.filter(|rates| !rates.is_empty()) else {
        return source;
    };
    if rates.contains(&source) {
        return source;
    }
    rates
        .iter()
        .copied()
        .filter(|&rate| rate >= source)
        .min()
        .or_else(|| rates.iter().copied().max())
        .unwrap_or(source)
}

/// Reconcile the decoder's channel layout with the encoder.
///
/// `Preserve` keeps layouts of 1 to 8 channels and downmixes anything wider
/// to stereo. The resampler performs the actual remix.
pub fn select_channel_layout(source: ChannelLayout, policy: ChannelPolicy) -> ChannelLayout {
    match policy {
        ChannelPolicy::Mono => ChannelLayout::MONO,
        ChannelPolicy::Stereo => ChannelLayout::STEREO,
        ChannelPolicy::Preserve => {
            let channels = u16::try_from(source.channels()).unwrap_or(0);
            if (1..=MAX_PRESERVED_CHANNELS).contains(&channels) {
                source
            } else {
                ChannelLayout::STEREO
            }
        }
    }
}

/// Look up an encoder for `codec`.
pub fn find_encoder(codec: Id) -> Result<Codec, ConvertError> {
    ffmpeg_next::encoder::find(codec).ok_or_else(|| ConvertError::EncoderNotFound {
        codec: codec.name().to_string(),
    })
}

/// Whether this FFmpeg build ships an AAC encoder.
pub fn is_aac_encoder_available() -> bool {
    ffmpeg_next::init().is_ok() && ffmpeg_next::encoder::find(Id::AAC).is_some()
}

/// An open target encoder.
pub struct AacEncoder {
    encoder: FfmpegAudioEncoder,
    codec: Codec,
    settings: EncoderSettings,
    chunker: FrameChunker,
    time_base: Rational,
    next_pts: i64,
    flushed: bool,
}

impl AacEncoder {
    /// Open an encoder with fixed settings.
    ///
    /// # Errors
    ///
    /// - [`ConvertError::EncoderNotFound`] if FFmpeg lacks the codec.
    /// - [`ConvertError::CodecOpen`] if the encoder rejects the settings.
    /// - [`ConvertError::InvalidOption`] if the sample rate does not fit
    ///   FFmpeg's signed rate field.
    pub fn open(settings: &EncoderSettings) -> Result<Self, ConvertError> {
        let codec = find_encoder(settings.codec)?;
        let rate = i32::try_from(settings.sample_rate)
            .ok()
            .filter(|rate| *rate > 0)
            .ok_or_else(|| {
                ConvertError::InvalidOption(format!(
                    "sample rate {} Hz is out of range",
                    settings.sample_rate
                ))
            })?;
        let time_base = Rational(1, rate);

        let mut context = CodecContext::new_with_codec(codec);
        context.set_threading(ThreadingConfig {
            kind: ThreadingType::Frame,
            count: settings.threads.get(),
            ..Default::default()
        });

        let mut encoder = context
            .encoder()
            .audio()
            .map_err(open_error)?;

        encoder.set_rate(rate);
        encoder.set_channel_layout(settings.layout);
        encoder.set_format(settings.format);
        encoder.set_bit_rate(settings.bit_rate);
        encoder.set_time_base(time_base);

        if settings.global_header {
            unsafe {
                (*encoder.as_mut_ptr()).flags |= ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let encoder = encoder.open_as(codec).map_err(open_error)?;

        let variable_frames = codec.capabilities().contains(Capabilities::VARIABLE_FRAME_SIZE);
        let frame_size = if variable_frames {
            0
        } else {
            encoder.frame_size() as usize
        };
        let pad_last = !codec.capabilities().contains(Capabilities::SMALL_LAST_FRAME);
        let chunker = FrameChunker::new(settings.input_spec(), frame_size, pad_last);

        log::debug!(
            "Opened {} encoder: {}, {} b/s, frame size {}, {} thread(s)",
            codec.name(),
            settings.input_spec(),
            settings.bit_rate,
            frame_size,
            settings.threads.get()
        );

        Ok(Self {
            encoder,
            codec,
            settings: *settings,
            chunker,
            time_base,
            next_pts: 0,
            flushed: false,
        })
    }

    /// Negotiate settings for `source` and open the encoder.
    ///
    /// If the encoder refuses a preserved multichannel layout the open is
    /// retried once with stereo, which the resampler then downmixes to.
    pub fn open_for_source(
        source: SampleSpec,
        options: &ConvertOptions,
        global_header: bool,
    ) -> Result<Self, ConvertError> {
        let codec = find_encoder(options.codec)?;
        let settings = EncoderSettings::negotiate(codec, source, options, global_header);

        match Self::open(&settings) {
            Err(ConvertError::CodecOpen { reason, .. })
                if options.channel_policy == ChannelPolicy::Preserve
                    && settings.layout != ChannelLayout::STEREO
                    && settings.layout != ChannelLayout::MONO =>
            {
                log::warn!(
                    "Encoder rejected {}-channel layout ({reason}), downmixing to stereo",
                    settings.layout.channels()
                );
                Self::open(&EncoderSettings {
                    layout: ChannelLayout::STEREO,
                    ..settings
                })
            }
            result => result,
        }
    }

    /// The frame format [`encode`](AacEncoder::encode) accepts.
    pub fn input_spec(&self) -> SampleSpec {
        self.settings.input_spec()
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Samples per frame the codec consumes, 0 if variable.
    pub fn frame_size(&self) -> usize {
        self.chunker.frame_size()
    }

    /// Time base of produced packets (`1 / sample_rate`).
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Priming samples the codec inserts before the first real sample.
    pub fn initial_padding(&self) -> i64 {
        i64::from(unsafe { (*self.encoder.as_ptr()).initial_padding })
    }

    pub(crate) fn codec(&self) -> Codec {
        self.codec
    }

    pub(crate) fn encoder(&self) -> &FfmpegAudioEncoder {
        &self.encoder
    }

    /// Encode one frame into zero or more packets.
    ///
    /// # Errors
    ///
    /// - [`ConvertError::Encode`] if the frame's format differs from
    ///   [`input_spec`](AacEncoder::input_spec) or the codec fails.
    /// - [`ConvertError::StageFlushed`] after [`flush`](AacEncoder::flush).
    pub fn encode(&mut self, frame: RawFrame) -> Result<Vec<EncodedPacket>, ConvertError> {
        if self.flushed {
            return Err(ConvertError::StageFlushed {
                stage: Stage::Encoder,
            });
        }
        let spec = frame.spec();
        if spec != self.input_spec() {
            return Err(ConvertError::Encode(format!(
                "frame format {spec} does not match encoder input {}",
                self.input_spec()
            )));
        }

        let mut packets = Vec::new();
        for chunk in self.chunker.push(frame) {
            self.send(chunk, &mut packets)?;
        }
        Ok(packets)
    }

    /// Encode the buffered remainder and drain the codec.
    ///
    /// A second call is a no-op returning no packets.
    pub fn flush(&mut self) -> Result<Vec<EncodedPacket>, ConvertError> {
        if self.flushed {
            log::debug!("Encoder already flushed");
            return Ok(Vec::new());
        }
        self.flushed = true;

        let mut packets = Vec::new();
        if let Some(tail) = self.chunker.finish() {
            self.send(tail, &mut packets)?;
        }

        match self.encoder.send_eof() {
            Ok(()) | Err(FfmpegError::Eof) => {}
            Err(error) => return Err(encode_error(error)),
        }
        self.receive(&mut packets)?;

        log::debug!("Encoder flushed, {} trailing packet(s)", packets.len());
        Ok(packets)
    }

    fn send(&mut self, mut frame: RawFrame, packets: &mut Vec<EncodedPacket>) -> Result<(), ConvertError> {
        frame.set_pts(Some(self.next_pts));
        self.next_pts += frame.samples() as i64;

        self.encoder
            .send_frame(frame.as_frame())
            .map_err(encode_error)?;
        self.receive(packets)
    }

    fn receive(&mut self, packets: &mut Vec<EncodedPacket>) -> Result<(), ConvertError> {
        loop {
            let mut packet = Packet::empty();
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => packets.push(EncodedPacket::new(packet, 0, self.time_base)),
                Err(FfmpegError::Eof) => return Ok(()),
                Err(FfmpegError::Other { errno }) if errno == ffmpeg_next::error::EAGAIN => return Ok(()),
                Err(error) => return Err(encode_error(error)),
            }
        }
    }
}

impl std::fmt::Debug for AacEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AacEncoder")
            .field("settings", &self.settings)
            .field("frame_size", &self.frame_size())
            .field("flushed", &self.flushed)
            .finish()
    }
}

fn open_error(error: FfmpegError) -> ConvertError {
    ConvertError::from_ffmpeg(Stage::Encoder, error, |reason| ConvertError::CodecOpen {
        stage: Stage::Encoder,
        reason,
    })
}

fn encode_error(error: FfmpegError) -> ConvertError {
    ConvertError::from_ffmpeg(Stage::Encoder, error, ConvertError::Encode)
}

/// Re-chunks frames of arbitrary length into frames of exactly
/// `frame_size` samples.
///
/// With a frame size of 0 frames pass through unchanged.
pub struct FrameChunker {
    spec: SampleSpec,
    frame_size: usize,
    pad_last: bool,
    planes: Vec<Vec<u8>>,
    buffered: usize,
}

impl FrameChunker {
    /// `pad_last` pads the final partial chunk with silence up to a full
    /// frame, for codecs that cannot take a short last frame.
    pub fn new(spec: SampleSpec, frame_size: usize, pad_last: bool) -> Self {
        Self {
            spec,
            frame_size,
            pad_last,
            planes: vec![Vec::new(); spec.planes()],
            buffered: 0,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples per channel held back waiting for a full frame.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Bytes one sample occupies in one plane.
    fn stride(&self) -> usize {
        if self.spec.format.is_planar() {
            self.spec.bytes_per_sample()
        } else {
            self.spec.bytes_per_sample() * self.spec.channels() as usize
        }
    }

    /// Append `frame` and return every complete frame now available.
    pub fn push(&mut self, frame: RawFrame) -> Vec<RawFrame> {
        if self.frame_size == 0 {
            return vec![frame];
        }

        for (index, plane) in self.planes.iter_mut().enumerate() {
            plane.extend_from_slice(frame.plane(index));
        }
        self.buffered += frame.samples();

        let mut chunks = Vec::with_capacity(self.buffered / self.frame_size);
        while self.buffered >= self.frame_size {
            chunks.push(self.take(self.frame_size));
        }
        chunks
    }

    /// Return the remaining partial frame, if any.
    pub fn finish(&mut self) -> Option<RawFrame> {
        if self.frame_size == 0 || self.buffered == 0 {
            return None;
        }
        let samples = self.buffered;
        let mut tail = self.take(samples);
        if self.pad_last && samples < self.frame_size {
            let mut padded = RawFrame::silence(self.spec, self.frame_size);
            let stride = self.stride();
            for index in 0..self.planes.len() {
                let len = samples * stride;
                padded.as_frame_mut().data_mut(index)[..len].copy_from_slice(&tail.plane(index)[..len]);
            }
            tail = padded;
        }
        Some(tail)
    }

    fn take(&mut self, samples: usize) -> RawFrame {
        let len = samples * self.stride();
        let mut frame = AudioFrame::new(self.spec.format, samples, self.spec.layout);
        frame.set_rate(self.spec.rate);
        for (index, plane) in self.planes.iter_mut().enumerate() {
            frame.data_mut(index)[..len].copy_from_slice(&plane[..len]);
            plane.drain(..len);
        }
        self.buffered -= samples;
        RawFrame::new(frame)
    }
}
