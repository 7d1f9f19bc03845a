//! Container reading (demuxing).
//!
//! [`MediaSource`] opens an input container, describes its streams, picks
//! the audio stream to convert, and yields packets in container order.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::{Id, Parameters, context::Context as CodecContext},
    format::{Sample, context::Input},
    media::Type,
};

use crate::error::ConvertError;
use crate::packet::EncodedPacket;

/// The kind of data a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Subtitle,
    Data,
    Attachment,
    Unknown,
}

impl From<Type> for MediaKind {
    fn from(medium: Type) -> Self {
        match medium {
            Type::Audio => MediaKind::Audio,
            Type::Video => MediaKind::Video,
            Type::Subtitle => MediaKind::Subtitle,
            Type::Data => MediaKind::Data,
            Type::Attachment => MediaKind::Attachment,
            _ => MediaKind::Unknown,
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Subtitle => "subtitle",
            MediaKind::Data => "data",
            MediaKind::Attachment => "attachment",
            MediaKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Metadata for one stream of an input container.
///
/// Audio fields are zero / `None` for non-audio streams.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Zero-based stream index in the container.
    pub index: usize,
    pub kind: MediaKind,
    /// Codec identifier.
    pub codec_id: Id,
    /// Short codec name (e.g. `"pcm_s16le"`, `"aac"`).
    pub codec_name: String,
    /// Timestamp unit of the stream's packets.
    pub time_base: Rational,
    pub sample_rate: u32,
    pub channels: u16,
    /// Sample format the decoder will produce, if the container says.
    pub sample_format: Option<Sample>,
    /// Declared bit rate in bits per second, 0 if unknown.
    pub bit_rate: u64,
    /// Stream duration, if declared.
    pub duration: Option<Duration>,
}

/// An open input container.
///
/// Dropping it closes the underlying file.
pub struct MediaSource {
    input: Input,
    path: PathBuf,
    time_bases: Vec<Rational>,
    streams: Vec<StreamInfo>,
    selected: Option<usize>,
}

impl MediaSource {
    /// Open an input container.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Open`] if the file does not exist, cannot be
    /// read, or is not a container FFmpeg recognises.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use audioconv::{ConvertError, MediaSource};
    ///
    /// let mut source = MediaSource::open("input.wav")?;
    /// let stream = source.select_audio_stream()?;
    /// println!("{} Hz, {} channels", stream.sample_rate, stream.channels);
    /// # Ok::<(), ConvertError>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConvertError> {
        let path = path.as_ref().to_path_buf();

        log::debug!("Opening input: {}", path.display());

        ffmpeg_next::init().map_err(|error| ConvertError::Open {
            path: path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        if !path.exists() {
            return Err(ConvertError::Open {
                path,
                reason: "No such file or directory".to_string(),
            });
        }

        let input = ffmpeg_next::format::input(&path).map_err(|error| ConvertError::Open {
            path: path.clone(),
            reason: error.to_string(),
        })?;

        let time_bases = input.streams().map(|stream| stream.time_base()).collect();

        Ok(Self {
            input,
            path,
            time_bases,
            streams: Vec::new(),
            selected: None,
        })
    }

    /// Describe every stream in the container.
    ///
    /// The result is cached; later calls return the same slice.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Probe`] if the container has no streams, or if
    /// none of them has a recognisable media type.
    pub fn probe(&mut self) -> Result<&[StreamInfo], ConvertError> {
        if self.streams.is_empty() {
            let mut streams = Vec::with_capacity(self.time_bases.len());
            for stream in self.input.streams() {
                streams.push(describe_stream(
                    &self.path,
                    stream.index(),
                    stream.time_base(),
                    stream.duration(),
                    stream.parameters(),
                )?);
            }

            if streams.is_empty() {
                return Err(ConvertError::Probe {
                    path: self.path.clone(),
                    reason: "container has no streams".to_string(),
                });
            }
            if streams.iter().all(|stream| stream.kind == MediaKind::Unknown) {
                return Err(ConvertError::Probe {
                    path: self.path.clone(),
                    reason: "no stream has a recognisable media type".to_string(),
                });
            }

            log::debug!(
                "Probed {} stream(s) in {} ({})",
                streams.len(),
                self.path.display(),
                self.format_name()
            );
            self.streams = streams;
        }
        Ok(&self.streams)
    }

    /// Select the audio stream to convert: the first one in container order.
    ///
    /// Probes the container first if that has not happened yet.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::NoAudioStream`] if no stream carries audio,
    /// or the errors of [`probe`](MediaSource::probe).
    pub fn select_audio_stream(&mut self) -> Result<StreamInfo, ConvertError> {
        self.probe()?;
        let stream = self
            .streams
            .iter()
            .filter(|stream| stream.kind == MediaKind::Audio)
            .min_by_key(|stream| stream.index)
            .cloned()
            .ok_or_else(|| ConvertError::NoAudioStream {
                path: self.path.clone(),
            })?;

        log::debug!(
            "Selected audio stream {} ({}, {} Hz, {} ch)",
            stream.index,
            stream.codec_name,
            stream.sample_rate,
            stream.channels
        );
        self.selected = Some(stream.index);
        Ok(stream)
    }

    /// Read the next packet in container order.
    ///
    /// Returns `Ok(None)` at end of stream. Packets of streams other than the
    /// selected audio stream are returned tagged for skip.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Read`] on an I/O fault or unreadable packet.
    pub fn read_packet(&mut self) -> Result<Option<EncodedPacket>, ConvertError> {
        loop {
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    let index = packet.stream();
                    let time_base = self
                        .time_bases
                        .get(index)
                        .copied()
                        .unwrap_or(Rational(1, 1));
                    let encoded = EncodedPacket::new(packet, index, time_base);
                    return Ok(Some(if Some(index) == self.selected {
                        encoded
                    } else {
                        encoded.skipped()
                    }));
                }
                Err(FfmpegError::Eof) => return Ok(None),
                Err(FfmpegError::Other { errno }) if errno == ffmpeg_next::error::EAGAIN => continue,
                Err(error) => return Err(ConvertError::Read(error.to_string())),
            }
        }
    }

    /// Index of the selected audio stream, if one has been selected.
    pub fn selected_stream(&self) -> Option<usize> {
        self.selected
    }

    /// Container duration, if known.
    pub fn duration(&self) -> Option<Duration> {
        let micros = self.input.duration();
        (micros > 0).then(|| Duration::from_micros(micros as u64))
    }

    /// Short name of the container format (e.g. `"wav"`, `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub fn format_name(&self) -> &str {
        self.input.format().name()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Codec parameters of a stream, used to configure its decoder.
    pub(crate) fn stream_parameters(&self, index: usize) -> Option<Parameters> {
        self.input.stream(index).map(|stream| stream.parameters())
    }
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MediaSource")
            .field("path", &self.path)
            .field("streams", &self.time_bases.len())
            .field("selected", &self.selected)
            .finish()
    }
}

fn describe_stream(
    path: &Path,
    index: usize,
    time_base: Rational,
    duration: i64,
    parameters: Parameters,
) -> Result<StreamInfo, ConvertError> {
    let kind = MediaKind::from(parameters.medium());
    let codec_id = parameters.id();

    let duration = (duration > 0 && time_base.denominator() != 0).then(|| {
        Duration::from_secs_f64(duration as f64 * f64::from(time_base))
    });

    let mut info = StreamInfo {
        index,
        kind,
        codec_id,
        codec_name: codec_id.name().to_string(),
        time_base,
        sample_rate: 0,
        channels: 0,
        sample_format: None,
        bit_rate: 0,
        duration,
    };

    if kind == MediaKind::Audio {
        // Read the audio fields from an unopened codec context, so streams
        // whose decoder is missing can still be described.
        let context = CodecContext::from_parameters(parameters).map_err(|error| ConvertError::Probe {
            path: path.to_path_buf(),
            reason: format!("unreadable codec parameters for stream {index}: {error}"),
        })?;
        let raw = unsafe { &*context.as_ptr() };
        info.sample_rate = raw.sample_rate.max(0) as u32;
        info.channels = raw.ch_layout.nb_channels.max(0) as u16;
        info.bit_rate = raw.bit_rate.max(0) as u64;
        let format = Sample::from(raw.sample_fmt);
        info.sample_format = (format != Sample::None).then_some(format);
    }

    Ok(info)
}
