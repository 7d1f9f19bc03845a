//! Audio decoding.

use ffmpeg_next::{
    Error as FfmpegError,
    codec::context::Context as CodecContext,
    decoder::Audio as FfmpegAudioDecoder,
    frame::Audio as AudioFrame,
    threading::{Config as ThreadingConfig, Type as ThreadingType},
};

use crate::configuration::ThreadCount;
use crate::error::{ConvertError, Stage};
use crate::frame::{RawFrame, SampleSpec, layout_for_channels};
use crate::packet::EncodedPacket;
use crate::reader::{MediaSource, StreamInfo};

/// An open decoder for the selected audio stream.
///
/// Every call to [`decode`](AudioDecoder::decode) drains all frames the
/// codec can produce for that packet. [`flush`](AudioDecoder::flush) drains
/// the codec's lookahead once the input is exhausted; after that the decoder
/// accepts no more packets.
pub struct AudioDecoder {
    decoder: FfmpegAudioDecoder,
    stream_index: usize,
    flushed: bool,
}

impl AudioDecoder {
    /// Open a decoder for `stream` of `source`.
    ///
    /// # Errors
    ///
    /// - [`ConvertError::DecoderNotFound`] if FFmpeg has no decoder for the
    ///   stream's codec.
    /// - [`ConvertError::CodecOpen`] if the decoder rejects the stream
    ///   parameters.
    pub fn open(
        source: &MediaSource,
        stream: &StreamInfo,
        threads: ThreadCount,
    ) -> Result<Self, ConvertError> {
        let parameters =
            source
                .stream_parameters(stream.index)
                .ok_or_else(|| ConvertError::CodecOpen {
                    stage: Stage::Decoder,
                    reason: format!("stream {} does not exist", stream.index),
                })?;

        let codec = ffmpeg_next::decoder::find(stream.codec_id).ok_or_else(|| {
            ConvertError::DecoderNotFound {
                codec: stream.codec_name.clone(),
            }
        })?;

        let mut context = CodecContext::from_parameters(parameters).map_err(|error| {
            ConvertError::from_ffmpeg(Stage::Decoder, error, |reason| ConvertError::CodecOpen {
                stage: Stage::Decoder,
                reason,
            })
        })?;
        context.set_threading(ThreadingConfig {
            kind: ThreadingType::Frame,
            count: threads.get(),
            ..Default::default()
        });

        let decoder = context
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.audio())
            .map_err(|error| {
                ConvertError::from_ffmpeg(Stage::Decoder, error, |reason| {
                    ConvertError::CodecOpen {
                        stage: Stage::Decoder,
                        reason,
                    }
                })
            })?;

        log::debug!(
            "Opened {} decoder for stream {} with {} thread(s)",
            codec.name(),
            stream.index,
            threads.get()
        );

        Ok(Self {
            decoder,
            stream_index: stream.index,
            flushed: false,
        })
    }

    /// The format of the frames this decoder produces, as negotiated at
    /// open time.
    pub fn output_spec(&self) -> SampleSpec {
        SampleSpec::new(
            self.decoder.format(),
            self.decoder.rate(),
            self.decoder.channel_layout(),
            self.decoder.channels(),
        )
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Decode one packet into zero or more frames.
    ///
    /// # Errors
    ///
    /// - [`ConvertError::Decode`] if the packet is corrupt. The driver treats
    ///   this as recoverable.
    /// - [`ConvertError::StageFlushed`] after [`flush`](AudioDecoder::flush).
    pub fn decode(&mut self, packet: &EncodedPacket) -> Result<Vec<RawFrame>, ConvertError> {
        if self.flushed {
            return Err(ConvertError::StageFlushed {
                stage: Stage::Decoder,
            });
        }

        self.decoder
            .send_packet(packet.as_packet())
            .map_err(|error| self.decode_error(error))?;
        self.drain()
    }

    /// Drain buffered frames at end of input.
    ///
    /// A second call is a no-op returning no frames.
    pub fn flush(&mut self) -> Result<Vec<RawFrame>, ConvertError> {
        if self.flushed {
            log::debug!("Decoder already flushed");
            return Ok(Vec::new());
        }
        self.flushed = true;

        match self.decoder.send_eof() {
            Ok(()) | Err(FfmpegError::Eof) => {}
            Err(FfmpegError::Other { errno }) if errno == ffmpeg_next::error::EAGAIN => {}
            Err(error) => return Err(self.decode_error(error)),
        }
        let frames = self.drain()?;
        log::debug!("Decoder flushed {} buffered frame(s)", frames.len());
        Ok(frames)
    }

    /// Receive every frame the codec has ready.
    ///
    /// A failure after some frames were received stops the drain and keeps
    /// those frames; a failure before any frame is the packet's error.
    fn drain(&mut self) -> Result<Vec<RawFrame>, ConvertError> {
        let decoder = &mut self.decoder;
        let (frames, error) = receive_all(|| {
            let mut frame = AudioFrame::empty();
            decoder.receive_frame(&mut frame).map(|()| frame)
        });

        if let Some(error) = error {
            if frames.is_empty() {
                return Err(self.decode_error(error));
            }
            log::warn!(
                "Stream {}: decoder failed after {} frame(s), keeping them: {error}",
                self.stream_index,
                frames.len()
            );
        }
        Ok(frames.into_iter().map(|frame| self.normalise(frame)).collect())
    }

    /// Give frames with an unspecified channel order a concrete layout so
    /// the resampler sees the same layout it was configured with.
    fn normalise(&self, mut frame: AudioFrame) -> RawFrame {
        let channels = frame.channels();
        if frame.channel_layout().is_empty() && channels > 0 {
            frame.set_channel_layout(layout_for_channels(channels));
        }
        if frame.rate() == 0 {
            frame.set_rate(self.decoder.rate());
        }
        RawFrame::new(frame)
    }

    fn decode_error(&self, error: FfmpegError) -> ConvertError {
        let stream_index = self.stream_index;
        ConvertError::from_ffmpeg(Stage::Decoder, error, |reason| ConvertError::Decode {
            stream_index,
            reason,
        })
    }
}

/// Call `receive` until the codec reports EOF or EAGAIN, returning what it
/// produced and the error that cut the drain short, if any.
fn receive_all<T>(
    mut receive: impl FnMut() -> Result<T, FfmpegError>,
) -> (Vec<T>, Option<FfmpegError>) {
    let mut received = Vec::new();
    loop {
        match receive() {
            Ok(item) => received.push(item),
            Err(FfmpegError::Eof) => return (received, None),
            Err(FfmpegError::Other { errno }) if errno == ffmpeg_next::error::EAGAIN => {
                return (received, None);
            }
            Err(error) => return (received, Some(error)),
        }
    }
}

impl std::fmt::Debug for AudioDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDecoder")
            .field("stream_index", &self.stream_index)
            .field("spec", &self.output_spec())
            .field("flushed", &self.flushed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use ffmpeg_next::{
        Rational,
        format::{Sample, sample::Type},
    };

    use super::*;

    /// A silent 16-bit PCM WAV file.
    fn write_wav(path: &Path, rate: u32, channels: u16, samples: usize) {
        let block_align = channels * 2;
        let data_len = (samples * usize::from(block_align)) as u32;

        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * u32::from(block_align)).to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&16_u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(44 + data_len as usize, 0);
        std::fs::write(path, bytes).unwrap();
    }

    fn open(path: &Path) -> (MediaSource, AudioDecoder) {
        let mut source = MediaSource::open(path).unwrap();
        let stream = source.select_audio_stream().unwrap();
        let decoder = AudioDecoder::open(&source, &stream, ThreadCount::default()).unwrap();
        (source, decoder)
    }

    /// Decode every packet, returning the frame count and total samples.
    fn decode_all(source: &mut MediaSource, decoder: &mut AudioDecoder) -> (usize, usize) {
        let mut frames = 0;
        let mut samples = 0;
        while let Some(packet) = source.read_packet().unwrap() {
            if packet.is_skip() {
                continue;
            }
            for frame in decoder.decode(&packet).unwrap() {
                frames += 1;
                samples += frame.samples();
            }
        }
        (frames, samples)
    }

    fn scripted(
        results: Vec<Result<u32, FfmpegError>>,
    ) -> impl FnMut() -> Result<u32, FfmpegError> {
        let mut results = results.into_iter();
        move || results.next().unwrap_or(Err(FfmpegError::Eof))
    }

    #[test]
    fn drain_stops_at_eagain_and_eof() {
        let again = FfmpegError::Other {
            errno: ffmpeg_next::error::EAGAIN,
        };
        let (frames, error) = receive_all(scripted(vec![Ok(1), Ok(2), Err(again)]));
        assert_eq!(frames, vec![1, 2]);
        assert!(error.is_none());

        let (frames, error) = receive_all(scripted(vec![Err(FfmpegError::Eof)]));
        assert!(frames.is_empty());
        assert!(error.is_none());
    }

    #[test]
    fn failure_mid_drain_keeps_earlier_frames() {
        let (frames, error) = receive_all(scripted(vec![
            Ok(1),
            Ok(2),
            Err(FfmpegError::InvalidData),
            Ok(3),
        ]));
        assert_eq!(frames, vec![1, 2]);
        assert_eq!(error, Some(FfmpegError::InvalidData));

        let (frames, error) = receive_all(scripted(vec![Err(FfmpegError::InvalidData)]));
        assert!(frames.is_empty());
        assert_eq!(error, Some(FfmpegError::InvalidData));
    }

    #[test]
    fn decodes_then_flushes_exactly_once() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("silence.wav");
        write_wav(&path, 22_050, 2, 4_410);
        let (mut source, mut decoder) = open(&path);

        let spec = decoder.output_spec();
        assert_eq!(spec.format, Sample::I16(Type::Packed));
        assert_eq!(spec.rate, 22_050);
        assert_eq!(spec.channels(), 2);

        let (frames, mut samples) = decode_all(&mut source, &mut decoder);
        assert!(frames > 0);

        samples += decoder.flush().unwrap().iter().map(RawFrame::samples).sum::<usize>();
        assert_eq!(samples, 4_410);

        assert!(decoder.flush().unwrap().is_empty());
        let packet = EncodedPacket::from_bytes(&[0; 4], decoder.stream_index(), Rational(1, 22_050), Some(0));
        assert!(matches!(
            decoder.decode(&packet),
            Err(ConvertError::StageFlushed { stage: Stage::Decoder })
        ));
    }

    #[test]
    fn wide_unlabelled_input_keeps_its_channel_count() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("wide.wav");
        write_wav(&path, 48_000, 10, 960);
        let (mut source, mut decoder) = open(&path);

        assert_eq!(decoder.output_spec().channels(), 10);
        while let Some(packet) = source.read_packet().unwrap() {
            for frame in decoder.decode(&packet).unwrap() {
                assert_eq!(frame.spec().channels(), 10);
                assert_eq!(frame.spec(), decoder.output_spec());
            }
        }
    }
}
